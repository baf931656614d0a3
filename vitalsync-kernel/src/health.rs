use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::surface::Surface;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayStatus {
    /// pas de broker configuré : mode mono-processus
    Disabled,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub surface_id: String,
    pub mode: String,
    pub attached: bool,
    pub simulating: bool,
    pub history_len: usize,
    pub emergency: bool,
    pub readings_produced: u64,
    pub messages_received: u64,
    pub memory_usage_mb: f32,
    pub relay_status: RelayStatus,
    pub relay_reconnects: u32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    relay_reconnects: Arc<AtomicU32>,
    relay_status: Arc<Mutex<RelayStatus>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            relay_reconnects: Arc::new(AtomicU32::new(0)),
            relay_status: Arc::new(Mutex::new(RelayStatus::Disabled)),
        }
    }

    pub fn mark_relay_connecting(&self) {
        *self.relay_status.lock() = RelayStatus::Connecting;
    }

    pub fn mark_relay_connected(&self) {
        *self.relay_status.lock() = RelayStatus::Connected;
    }

    pub fn increment_reconnects(&self) {
        self.relay_reconnects.fetch_add(1, Ordering::Relaxed);
        *self.relay_status.lock() = RelayStatus::Reconnecting;
    }

    pub fn relay_status(&self) -> RelayStatus {
        *self.relay_status.lock()
    }

    pub fn get_health(&self, surface: &Surface) -> KernelHealth {
        let snapshot = surface.snapshot();
        let counters = surface.counters();

        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            surface_id: surface.id().to_string(),
            mode: surface.mode().to_string(),
            attached: surface.is_attached(),
            simulating: surface.is_simulating(),
            history_len: snapshot.history_len,
            emergency: snapshot.emergency,
            readings_produced: counters.produced.load(Ordering::Relaxed),
            messages_received: counters.received.load(Ordering::Relaxed),
            memory_usage_mb: get_memory_usage_mb(),
            relay_status: self.relay_status(),
            relay_reconnects: self.relay_reconnects.load(Ordering::Relaxed),
        }
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = rss_kb {
                return kb as f32 / 1024.0;
            }
        }
    }

    0.0
}
