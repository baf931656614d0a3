/**
 * RELAIS MQTT - Pont entre le canal de synchro local et le broker
 *
 * RÔLE :
 * Permet à une montre et à un compagnon lancés dans deux processus distincts de
 * converger : chaque enveloppe locale part sur le topic du canal, chaque trame
 * d'un autre nœud est réinjectée localement.
 *
 * FONCTIONNEMENT :
 * - topic : vitalsync/{canal}/sync@v1, QoS AtLeastOnce
 * - trame JSON : { node, origin, message }
 * - sortant : enveloppes non relayées uniquement (pas de boucle)
 * - entrant : trames de notre propre nœud ignorées (écho du broker)
 * - health : vitalsync/{nœud}/health@v1 toutes les 30s
 * - erreur broker : warn + statut "reconnecting" + pause 2s, rumqttc reconnecte
 */

use crate::config::MqttConf;
use crate::health::HealthTracker;
use crate::models::SyncMessage;
use crate::surface::SharedSurface;
use crate::sync::{Envelope, Subscription, SyncChannel};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const HEALTH_PERIOD: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("invalid frame: {0}")]
    Frame(#[from] serde_json::Error),
}

/// Ce dont le relais a besoin côté client MQTT
pub trait FramePublisher: Clone + Send + Sync + 'static {
    fn publish_frame(&self, topic: String, payload: Vec<u8>) -> impl Future<Output = Result<(), RelayError>> + Send;
}

impl FramePublisher for AsyncClient {
    async fn publish_frame(&self, topic: String, payload: Vec<u8>) -> Result<(), RelayError> {
        self.publish(topic, QoS::AtLeastOnce, false, payload).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayFrame {
    pub node: String,
    pub origin: String,
    pub message: SyncMessage,
}

pub fn sync_topic(channel: &str) -> String {
    format!("vitalsync/{channel}/sync@v1")
}

pub fn health_topic(node: &str) -> String {
    format!("vitalsync/{node}/health@v1")
}

pub fn encode_frame(node: &str, envelope: &Envelope) -> Result<Vec<u8>, RelayError> {
    let frame = RelayFrame {
        node: node.to_string(),
        origin: envelope.origin.clone(),
        message: envelope.message.clone(),
    };
    Ok(serde_json::to_vec(&frame)?)
}

/// Trame entrante -> enveloppe locale ; None pour nos propres échos
pub fn decode_frame(payload: &[u8], own_node: &str) -> Result<Option<Envelope>, RelayError> {
    let frame: RelayFrame = serde_json::from_slice(payload)?;
    if frame.node == own_node {
        return Ok(None);
    }
    Ok(Some(Envelope {
        origin: format!("{}/{}", frame.node, frame.origin),
        relayed: true,
        message: frame.message,
    }))
}

/// Injecte une trame reçue du broker dans le canal local
pub fn handle_incoming(channel: &SyncChannel, payload: &[u8], own_node: &str) {
    match decode_frame(payload, own_node) {
        Ok(Some(envelope)) => {
            tracing::debug!(origin = %envelope.origin, kind = envelope.message.kind(), "[relay] inbound frame");
            channel.forward(envelope);
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("[relay] trame invalide ignorée: {e}"),
    }
}

/// Tâche sortante : abonnement au canal + file vers le client MQTT
pub struct Outbound {
    _subscription: Subscription,
    task: JoinHandle<()>,
}

impl Drop for Outbound {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn spawn_outbound<P: FramePublisher>(channel: &SyncChannel, publisher: P, node: String) -> Outbound {
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
    let subscription = channel.subscribe_envelopes(move |envelope| {
        if envelope.relayed {
            return;
        }
        let _ = tx.send(envelope);
    });

    let topic = sync_topic(channel.name());
    let task = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            let payload = match encode_frame(&node, &envelope) {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!("[relay] encodage impossible: {e}");
                    continue;
                }
            };
            if let Err(e) = publisher.publish_frame(topic.clone(), payload).await {
                tracing::warn!("[relay] publish failed: {e}");
            }
        }
    });

    Outbound { _subscription: subscription, task }
}

/// Démarre le relais complet. Le canal passé doit avoir sa propre origine (ex: "relay").
pub fn spawn_relay(
    channel: SyncChannel,
    conf: &MqttConf,
    node: String,
    surface: SharedSurface,
    health: HealthTracker,
) -> JoinHandle<()> {
    let mut opts = MqttOptions::new(format!("vitalsync-{node}"), &conf.host, conf.port);
    opts.set_keep_alive(Duration::from_secs(15));
    let (client, mut eventloop) = AsyncClient::new(opts, 64);
    health.mark_relay_connecting();
    tracing::info!("[relay] broker {}:{} (node {node})", conf.host, conf.port);

    tokio::spawn(async move {
        let _outbound = spawn_outbound(&channel, client.clone(), node.clone());
        let topic = sync_topic(channel.name());
        let mut ticker = tokio::time::interval(HEALTH_PERIOD);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = health.get_health(&surface);
                    if let Ok(payload) = serde_json::to_vec(&report) {
                        if let Err(e) = client.try_publish(health_topic(&node), QoS::AtLeastOnce, false, payload) {
                            tracing::debug!("[relay] health publish skipped: {e}");
                        }
                    }
                }
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        // session propre : réabonnement à chaque connexion
                        if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                            tracing::warn!("[relay] subscribe failed: {e}");
                        }
                        health.mark_relay_connected();
                        tracing::info!("[relay] connected, listening on {topic}");
                    }
                    Ok(Event::Incoming(Incoming::Publish(p))) if p.topic == topic => {
                        handle_incoming(&channel, &p.payload, &node);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("[relay] MQTT erreur: {e}");
                        health.increment_reconnects();
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        }
    })
}
