/**
 * CANAL DE SYNCHRO - Bus publish/subscribe entre surfaces
 *
 * RÔLE :
 * Diffuse chaque changement d'état produit localement (constantes, urgence, analyse)
 * vers toutes les autres surfaces abonnées au même canal nommé.
 *
 * FONCTIONNEMENT :
 * - SyncBus = registre des canaux nommés (un tokio::broadcast par nom)
 * - SyncChannel = poignée d'une surface sur un canal, liée à son identité (origin)
 * - publish() : fire-and-forget, message perdu si personne n'écoute
 * - subscribe() : handler exécuté sur une tâche dédiée, jamais pour ses propres messages
 * - Subscription : libérée au drop (abort de la tâche), pas de rejeu
 *
 * GARANTIES :
 * FIFO par émetteur ; best-effort (un abonné trop lent perd les plus anciens).
 */

use crate::models::SyncMessage;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

pub const DEFAULT_CHANNEL_NAME: &str = "vitals_sync_channel";
pub const DEFAULT_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub origin: String,
    /// true si le message vient d'un autre processus via le relais
    pub relayed: bool,
    pub message: SyncMessage,
}

pub struct SyncBus {
    channels: Mutex<HashMap<String, broadcast::Sender<Envelope>>>,
    buffer: usize,
}

pub type SharedBus = Arc<SyncBus>;

impl SyncBus {
    pub fn new(buffer: usize) -> SharedBus {
        Arc::new(Self {
            channels: Mutex::new(HashMap::new()),
            buffer: buffer.max(1),
        })
    }

    /// Ouvre (ou rejoint) le canal `name` pour l'émetteur `origin`
    pub fn open(&self, name: &str, origin: impl Into<String>) -> SyncChannel {
        let sender = self
            .channels
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer).0)
            .clone();

        SyncChannel {
            name: name.to_string(),
            origin: origin.into(),
            sender,
        }
    }
}

#[derive(Clone)]
pub struct SyncChannel {
    name: String,
    origin: String,
    sender: broadcast::Sender<Envelope>,
}

impl SyncChannel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn publish(&self, message: SyncMessage) {
        self.forward(Envelope {
            origin: self.origin.clone(),
            relayed: false,
            message,
        });
    }

    /// Injecte une enveloppe telle quelle (utilisé par le relais MQTT)
    pub fn forward(&self, envelope: Envelope) {
        let kind = envelope.message.kind();
        match self.sender.send(envelope) {
            Ok(receivers) => tracing::trace!(channel = %self.name, kind, receivers, "published"),
            Err(_) => tracing::debug!(channel = %self.name, kind, "no listener, message dropped"),
        }
    }

    pub fn subscribe<F>(&self, mut handler: F) -> Subscription
    where
        F: FnMut(SyncMessage) + Send + 'static,
    {
        self.subscribe_envelopes(move |envelope| handler(envelope.message))
    }

    /// Comme `subscribe` mais expose l'enveloppe complète (origine, relais)
    pub fn subscribe_envelopes<F>(&self, mut handler: F) -> Subscription
    where
        F: FnMut(Envelope) + Send + 'static,
    {
        let mut receiver = self.sender.subscribe();
        let origin = self.origin.clone();
        let name = self.name.clone();

        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(envelope) => {
                        if envelope.origin == origin {
                            continue;
                        }
                        handler(envelope);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(channel = %name, %origin, skipped, "subscriber lagging, messages lost");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Subscription { task }
    }
}

/// Jeton d'abonnement : la tâche de réception s'arrête au drop
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
