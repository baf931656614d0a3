/*!
Mock MQTT Client pour tester le relais VitalSync sans broker

Enregistre tous les messages publiés et permet de simuler la réception.
Les `SyncFrameBuilder` fabriquent des trames au format du relais
(`{ node, origin, message: { kind, payload } }`).
*/

use anyhow::Result;
use rumqttc::QoS;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Mock MQTT Client qui simule rumqttc::AsyncClient
#[derive(Clone)]
pub struct MockMqttClient {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    message_sender: Arc<Mutex<Option<mpsc::UnboundedSender<MockMessage>>>>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self {
            published_messages: Arc::new(Mutex::new(Vec::new())),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            message_sender: Arc::new(Mutex::new(None)),
        }
    }

    /// Channel recevant les messages injectés par `simulate_incoming`
    pub fn setup_receiver(&self) -> mpsc::UnboundedReceiver<MockMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.message_sender.lock().unwrap() = Some(sender);
        receiver
    }

    /// Même signature que AsyncClient::publish
    pub async fn publish<S, V>(&self, topic: S, qos: QoS, retain: bool, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let message = MockMessage {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain,
        };
        log::debug!("📤 [MOCK] published to {}: {} bytes", message.topic, message.payload.len());
        self.published_messages.lock().unwrap().push(message);
        Ok(())
    }

    pub async fn subscribe<S: Into<String>>(&self, topic: S, _qos: QoS) -> Result<()> {
        let topic = topic.into();
        log::debug!("📥 [MOCK] subscribed to {}", topic);
        self.subscriptions.lock().unwrap().push(topic);
        Ok(())
    }

    /// Simule une trame arrivant du broker
    pub async fn simulate_incoming<S, V>(&self, topic: S, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let message = MockMessage {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtLeastOnce,
            retain: false,
        };

        if let Some(sender) = self.message_sender.lock().unwrap().as_ref() {
            sender
                .send(message.clone())
                .map_err(|e| anyhow::anyhow!("send error: {}", e))?;
        }

        log::debug!("📨 [MOCK] simulated incoming: {}", message.topic);
        Ok(())
    }

    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().unwrap().clone()
    }

    pub fn get_subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Parse le dernier message d'un topic en JSON
    pub fn get_last_json_message<T>(&self, topic: &str) -> Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        match self.find_messages_by_topic(topic).last() {
            Some(last) => Ok(Some(serde_json::from_slice(&last.payload)?)),
            None => Ok(None),
        }
    }

    pub fn clear(&self) {
        self.published_messages.lock().unwrap().clear();
        self.subscriptions.lock().unwrap().clear();
    }
}

impl Default for MockMqttClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Trames de relais prêtes à injecter
pub struct SyncFrameBuilder;

impl SyncFrameBuilder {
    /// Trame brute, `kind` non vérifié (utile pour tester les rejets)
    pub fn raw(node: &str, origin: &str, kind: &str, payload: Value) -> Value {
        serde_json::json!({
            "node": node,
            "origin": origin,
            "message": { "kind": kind, "payload": payload }
        })
    }

    /// Relevé au repos avec fréquence cardiaque et SpO2 imposées
    pub fn vitals(node: &str, origin: &str, heart_rate: u32, blood_oxygen: u32) -> Value {
        Self::raw(node, origin, "VITALS_UPDATE", serde_json::json!({
            "capturedAt": chrono::Utc::now().to_rfc3339(),
            "heartRate": heart_rate,
            "bloodOxygen": blood_oxygen,
            "temperature": 36.6,
            "systolic": 120,
            "diastolic": 80,
            "stepCount": 1240,
            "stressIndex": 25,
            "sleeping": false
        }))
    }

    pub fn emergency(node: &str, origin: &str, active: bool) -> Value {
        Self::raw(node, origin, "EMERGENCY_TRIGGER", Value::Bool(active))
    }

    pub fn analysis(node: &str, origin: &str, status: &str, summary: &str) -> Value {
        Self::raw(node, origin, "ANALYSIS_UPDATE", serde_json::json!({
            "status": status,
            "summary": summary,
            "recommendation": "Rest and hydrate.",
            "anomaliesDetected": []
        }))
    }
}
