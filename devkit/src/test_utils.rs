/*!
Test Harness pour le relais VitalSync

- mock MQTT prêt à l'emploi
- injection de trames sur le topic de synchro
- assertions sur les trames publiées
*/

use crate::mqtt_stub::MockMqttClient;
use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

pub struct TestHarness {
    pub mqtt_client: MockMqttClient,
    pub sync_topic: String,
}

impl TestHarness {
    /// Harness pour le canal `channel` (topic vitalsync/{channel}/sync@v1)
    pub fn new(channel: &str) -> Self {
        env_logger::try_init().ok();

        Self {
            mqtt_client: MockMqttClient::new(),
            sync_topic: format!("vitalsync/{channel}/sync@v1"),
        }
    }

    /// Injecte une trame comme si elle venait du broker
    pub async fn send_frame(&self, frame: &Value) -> Result<()> {
        let payload = serde_json::to_vec(frame)?;
        self.mqtt_client.simulate_incoming(self.sync_topic.clone(), payload).await?;
        log::info!("📨 sent test frame on {}", self.sync_topic);
        Ok(())
    }

    /// Attend au moins `count` trames publiées sur le topic de synchro
    pub async fn wait_for_frames(&self, count: usize, timeout_ms: u64) -> Result<Vec<Value>> {
        let start = std::time::Instant::now();

        loop {
            let frames = self.published_frames()?;
            if frames.len() >= count {
                return Ok(frames);
            }
            if start.elapsed() >= Duration::from_millis(timeout_ms) {
                anyhow::bail!(
                    "timeout waiting for {} frames on {}, got {}",
                    count,
                    self.sync_topic,
                    frames.len()
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub fn published_frames(&self) -> Result<Vec<Value>> {
        self.mqtt_client
            .find_messages_by_topic(&self.sync_topic)
            .iter()
            .map(|msg| Ok(serde_json::from_slice(&msg.payload)?))
            .collect()
    }

    /// Assert qu'un champ (chemin pointé, ex: "message.kind") a une valeur donnée
    /// dans la dernière trame publiée
    pub fn assert_field_equals(&self, field_path: &str, expected: &Value) -> Result<()> {
        let Some(frame) = self.mqtt_client.get_last_json_message::<Value>(&self.sync_topic)? else {
            anyhow::bail!("no frame published on {}", self.sync_topic);
        };
        match get_nested_field(&frame, field_path) {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => anyhow::bail!(
                "field '{}' mismatch: expected {:?}, got {:?}",
                field_path,
                expected,
                actual
            ),
            None => anyhow::bail!("field '{}' not found in {}", field_path, self.sync_topic),
        }
    }

    pub fn get_stats(&self) -> TestStats {
        let messages = self.mqtt_client.get_published_messages();
        let mut topic_counts = HashMap::new();
        for msg in &messages {
            *topic_counts.entry(msg.topic.clone()).or_insert(0) += 1;
        }

        TestStats {
            total_messages: messages.len(),
            topic_counts,
        }
    }
}

fn get_nested_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, part| match current {
        Value::Object(obj) => obj.get(part),
        _ => None,
    })
}

#[derive(Debug)]
pub struct TestStats {
    pub total_messages: usize,
    pub topic_counts: HashMap<String, usize>,
}
