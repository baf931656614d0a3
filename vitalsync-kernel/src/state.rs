use crate::contacts::ContactBook;
use crate::history::HistoryLog;
use crate::models::{HealthAnalysis, SyncMessage, VitalsReading};
use crate::simulator::EmergencyLatch;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// État local d'une surface (montre ou compagnon). Chaque surface possède
/// le sien ; la convergence passe uniquement par le canal de synchro.
#[derive(Debug, Clone)]
pub struct SurfaceState {
    pub current: VitalsReading,
    pub history: HistoryLog,
    pub emergency: EmergencyLatch,
    pub analysis: Option<HealthAnalysis>,
    pub contacts: ContactBook,
    pub analysing: bool,
}

impl SurfaceState {
    pub fn new(initial: VitalsReading, history_capacity: usize) -> Self {
        let mut history = HistoryLog::new(history_capacity);
        history.push(initial.clone());
        Self {
            current: initial,
            history,
            emergency: EmergencyLatch::default(),
            analysis: None,
            contacts: ContactBook::with_seed(),
            analysing: false,
        }
    }

    /// Applique un message de synchro, qu'il vienne d'une autre surface ou
    /// de la surface elle-même juste avant publication.
    pub fn apply(&mut self, message: &SyncMessage) {
        match message {
            SyncMessage::VitalsUpdate(reading) => {
                self.current = reading.clone();
                self.history.push(reading.clone());
            }
            SyncMessage::EmergencyTrigger(active) => self.emergency.set(*active),
            SyncMessage::AnalysisUpdate(analysis) => self.analysis = Some(analysis.clone()),
        }
    }

    pub fn snapshot(&self) -> SurfaceSnapshot {
        SurfaceSnapshot {
            current: self.current.clone(),
            history_len: self.history.len(),
            history_capacity: self.history.capacity(),
            emergency: self.emergency.is_active(),
            analysis: self.analysis.clone(),
            analysing: self.analysing,
        }
    }
}

/// Vue cohérente pour la présentation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceSnapshot {
    pub current: VitalsReading,
    pub history_len: usize,
    pub history_capacity: usize,
    pub emergency: bool,
    pub analysis: Option<HealthAnalysis>,
    pub analysing: bool,
}
