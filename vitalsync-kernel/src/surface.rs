/**
 * SURFACES - Montre simulée et tableau de bord compagnon
 *
 * RÔLE :
 * Une surface possède son état local (relevé courant, historique, urgence, analyse,
 * contacts) et ne le partage qu'en passant par le canal de synchro.
 *
 * FONCTIONNEMENT :
 * - attach() : abonnement au canal, chaque message reçu est appliqué à l'état local
 * - start_wearable() : tâche simulateur (seule à faire avancer les constantes),
 *   arrêt explicite et attendu, aucun tick après stop
 * - intentions utilisateur : appliquées localement PUIS publiées
 * - trigger_analysis() : drapeau "occupé" pour interdire les analyses concurrentes
 */

use crate::analysis::AnalysisGateway;
use crate::config::SurfaceMode;
use crate::contacts::NewContact;
use crate::models::{EmergencyContact, HealthAnalysis, SyncMessage, VitalsReading};
use crate::simulator::{self, Simulator};
use crate::state::{new_state, Shared, SurfaceSnapshot, SurfaceState};
use crate::sync::{Subscription, SyncChannel};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub const MIN_ANALYSIS_HISTORY: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("not enough history for analysis ({have} readings, need {need})")]
    NotEnoughHistory { have: usize, need: usize },
    #[error("an analysis is already in flight")]
    AnalysisInFlight,
    #[error("surface is not in wearable mode")]
    NotWearable,
}

/// Compteurs exposés par /system/health
#[derive(Debug, Default)]
pub struct SyncCounters {
    pub produced: AtomicU64,
    pub received: AtomicU64,
}

struct SimulatorHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

pub struct Surface {
    id: String,
    mode: SurfaceMode,
    state: Shared<SurfaceState>,
    channel: SyncChannel,
    counters: Arc<SyncCounters>,
    subscription: Mutex<Option<Subscription>>,
    simulator: Mutex<Option<SimulatorHandle>>,
}

pub type SharedSurface = Arc<Surface>;

impl Surface {
    pub fn new(mode: SurfaceMode, channel: SyncChannel, initial: VitalsReading, history_capacity: usize) -> Self {
        Self {
            id: channel.origin().to_string(),
            mode,
            state: new_state(SurfaceState::new(initial, history_capacity)),
            channel,
            counters: Arc::new(SyncCounters::default()),
            subscription: Mutex::new(None),
            simulator: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> SurfaceMode {
        self.mode
    }

    pub fn counters(&self) -> &SyncCounters {
        &self.counters
    }

    /// S'abonne au canal : les messages des autres surfaces convergent dans l'état local
    pub fn attach(&self) {
        let mut slot = self.subscription.lock();
        if slot.is_some() {
            return;
        }

        let state = self.state.clone();
        let counters = self.counters.clone();
        let id = self.id.clone();
        let sub = self.channel.subscribe(move |message| {
            counters.received.fetch_add(1, Ordering::Relaxed);
            if let SyncMessage::EmergencyTrigger(true) = message {
                tracing::warn!(surface = %id, "🚨 emergency raised by another surface");
            }
            tracing::debug!(surface = %id, kind = message.kind(), "sync message applied");
            state.lock().apply(&message);
        });

        tracing::info!(surface = %self.id, channel = %self.channel.name(), "surface attached");
        *slot = Some(sub);
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.lock().is_some()
    }

    // ============ LECTURE ============

    pub fn snapshot(&self) -> SurfaceSnapshot {
        self.state.lock().snapshot()
    }

    pub fn current(&self) -> VitalsReading {
        self.state.lock().current.clone()
    }

    pub fn history(&self) -> Vec<VitalsReading> {
        self.state.lock().history.to_vec()
    }

    pub fn recent_history(&self, n: usize) -> Vec<VitalsReading> {
        self.state.lock().history.recent(n)
    }

    pub fn emergency_active(&self) -> bool {
        self.state.lock().emergency.is_active()
    }

    pub fn analysis(&self) -> Option<HealthAnalysis> {
        self.state.lock().analysis.clone()
    }

    // ============ SIMULATEUR ============

    pub fn start_wearable(&self, period: Duration) -> Result<(), SurfaceError> {
        self.start_wearable_with(period, Simulator::from_entropy())
    }

    pub fn start_wearable_with<R>(&self, period: Duration, simulator: Simulator<R>) -> Result<(), SurfaceError>
    where
        R: Rng + Send + 'static,
    {
        self.ensure_wearable()?;
        let mut slot = self.simulator.lock();
        if slot.is_some() {
            return Ok(());
        }

        // interval_at refuse une période nulle
        let period = period.max(Duration::from_millis(1));
        let (stop, mut stop_rx) = oneshot::channel();
        let state = self.state.clone();
        let channel = self.channel.clone();
        let counters = self.counters.clone();
        let mut simulator = simulator;

        let task = tokio::spawn(async move {
            // premier relevé après une période complète, comme un setInterval
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        tick(&state, &channel, &mut simulator, OffsetDateTime::now_utc());
                        counters.produced.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        });

        tracing::info!(surface = %self.id, period_ms = period.as_millis() as u64, "simulator started");
        *slot = Some(SimulatorHandle { stop, task });
        Ok(())
    }

    /// Arrête le simulateur et attend la fin de la tâche
    pub async fn stop_wearable(&self) {
        let handle = self.simulator.lock().take();
        if let Some(handle) = handle {
            let _ = handle.stop.send(());
            if let Err(e) = handle.task.await {
                tracing::error!(surface = %self.id, "simulator task ended abnormally: {e}");
            }
            tracing::info!(surface = %self.id, "simulator stopped");
        }
    }

    pub fn is_simulating(&self) -> bool {
        self.simulator.lock().is_some()
    }

    // ============ INTENTIONS MONTRE ============

    pub fn toggle_sleep(&self) -> Result<VitalsReading, SurfaceError> {
        self.ensure_wearable()?;
        Ok(self.update_vitals(simulator::toggle_sleep))
    }

    pub fn force_anomaly(&self) -> Result<VitalsReading, SurfaceError> {
        self.ensure_wearable()?;
        tracing::warn!(surface = %self.id, "forcing anomaly spike");
        Ok(self.update_vitals(simulator::force_anomaly))
    }

    /// Seule façon de lever une urgence ; remet aussi les constantes au repos
    pub fn cancel_emergency(&self) -> Result<VitalsReading, SurfaceError> {
        self.ensure_wearable()?;
        let cancel = SyncMessage::EmergencyTrigger(false);
        self.state.lock().apply(&cancel);
        self.channel.publish(cancel);
        tracing::info!(surface = %self.id, "emergency cancelled");

        Ok(self.update_vitals(simulator::resting))
    }

    // ============ ANALYSE ============

    pub async fn trigger_analysis(&self, gateway: &AnalysisGateway) -> Result<HealthAnalysis, SurfaceError> {
        let history = {
            let mut st = self.state.lock();
            let have = st.history.len();
            if have < MIN_ANALYSIS_HISTORY {
                return Err(SurfaceError::NotEnoughHistory { have, need: MIN_ANALYSIS_HISTORY });
            }
            if st.analysing {
                return Err(SurfaceError::AnalysisInFlight);
            }
            st.analysing = true;
            st.history.to_vec()
        };
        // remis à false même si l'appelant abandonne le futur
        let _busy = BusyGuard(self.state.clone());

        let analysis = gateway.analyze(&history).await;
        let message = SyncMessage::AnalysisUpdate(analysis.clone());
        self.state.lock().apply(&message);
        self.channel.publish(message);
        Ok(analysis)
    }

    // ============ CONTACTS (locaux, non synchronisés) ============

    pub fn add_contact(&self, contact: NewContact) -> Option<EmergencyContact> {
        self.state.lock().contacts.add(contact)
    }

    pub fn remove_contact(&self, id: &str) -> bool {
        self.state.lock().contacts.remove(id)
    }

    pub fn contacts(&self) -> Vec<EmergencyContact> {
        self.state.lock().contacts.list()
    }

    /// Démontage : simulateur arrêté, abonnement libéré
    pub async fn close(&self) {
        self.stop_wearable().await;
        if let Some(sub) = self.subscription.lock().take() {
            sub.unsubscribe();
        }
        tracing::info!(surface = %self.id, "surface closed");
    }

    fn ensure_wearable(&self) -> Result<(), SurfaceError> {
        match self.mode {
            SurfaceMode::Wearable => Ok(()),
            SurfaceMode::Companion => Err(SurfaceError::NotWearable),
        }
    }

    fn update_vitals(&self, change: impl FnOnce(&VitalsReading) -> VitalsReading) -> VitalsReading {
        let reading = {
            let mut st = self.state.lock();
            let reading = change(&st.current);
            st.apply(&SyncMessage::VitalsUpdate(reading.clone()));
            reading
        };
        self.channel.publish(SyncMessage::VitalsUpdate(reading.clone()));
        reading
    }
}

/// Un tick du simulateur : état local mis à jour avant toute publication
fn tick<R: Rng>(state: &Shared<SurfaceState>, channel: &SyncChannel, simulator: &mut Simulator<R>, now: OffsetDateTime) {
    let (reading, escalated) = {
        let mut st = state.lock();
        let next = simulator.next_reading(&st.current, now);
        let escalated = st.emergency.observe(&next);
        st.apply(&SyncMessage::VitalsUpdate(next.clone()));
        (next, escalated)
    };

    if escalated {
        tracing::warn!(
            heart_rate = reading.heart_rate,
            blood_oxygen = reading.blood_oxygen,
            systolic = reading.systolic,
            "🚨 critical vitals, emergency triggered"
        );
        channel.publish(SyncMessage::EmergencyTrigger(true));
    }
    channel.publish(SyncMessage::VitalsUpdate(reading));
}

struct BusyGuard(Shared<SurfaceState>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.lock().analysing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConf;
    use crate::models::AnalysisStatus;
    use crate::sync::{SyncBus, DEFAULT_CHANNEL_NAME};
    use tokio::sync::mpsc;
    use tokio::time::{sleep, timeout};

    fn initial() -> VitalsReading {
        VitalsReading::initial(OffsetDateTime::UNIX_EPOCH)
    }

    fn pair() -> (Surface, Surface) {
        let bus = SyncBus::new(256);
        let wearable = Surface::new(
            SurfaceMode::Wearable,
            bus.open(DEFAULT_CHANNEL_NAME, "wearable"),
            initial(),
            100,
        );
        let companion = Surface::new(
            SurfaceMode::Companion,
            bus.open(DEFAULT_CHANNEL_NAME, "companion"),
            initial(),
            100,
        );
        wearable.attach();
        companion.attach();
        (wearable, companion)
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        timeout(Duration::from_secs(2), async {
            while !check() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_force_anomaly_then_cancel_converges() {
        let (wearable, companion) = pair();

        let spiked = wearable.force_anomaly().unwrap();
        assert_eq!(
            (spiked.heart_rate, spiked.blood_oxygen, spiked.stress_index, spiked.systolic, spiked.diastolic),
            (160, 88, 95, 175, 105)
        );
        assert_eq!(spiked.temperature, 39.2);
        assert_eq!(spiked.step_count, 1240);
        assert!(!spiked.sleeping);
        // vue locale jamais en retard sur ce qui est publié
        assert_eq!(wearable.current(), spiked);

        eventually(|| companion.current() == spiked).await;

        wearable.state.lock().emergency.set(true);
        let reset = wearable.cancel_emergency().unwrap();
        assert!(!wearable.emergency_active());
        assert_eq!(
            (reset.heart_rate, reset.blood_oxygen, reset.stress_index, reset.systolic, reset.diastolic),
            (75, 98, 20, 120, 80)
        );
        assert_eq!(reset.temperature, 36.6);
        eventually(|| companion.current() == reset && !companion.emergency_active()).await;
    }

    #[tokio::test]
    async fn test_published_reading_grows_subscriber_history() {
        let bus = SyncBus::new(256);
        let publisher = bus.open(DEFAULT_CHANNEL_NAME, "other-tab");
        let companion = Surface::new(
            SurfaceMode::Companion,
            bus.open(DEFAULT_CHANNEL_NAME, "companion"),
            initial(),
            100,
        );
        companion.attach();

        let reading = VitalsReading { heart_rate: 155, blood_oxygen: 85, ..initial() };
        publisher.publish(SyncMessage::VitalsUpdate(reading.clone()));
        eventually(|| companion.history().len() == 2).await;
        assert_eq!(companion.current(), reading);

        for _ in 0..150 {
            publisher.publish(SyncMessage::VitalsUpdate(reading.clone()));
        }
        eventually(|| companion.counters().received.load(Ordering::Relaxed) == 151).await;
        assert_eq!(companion.history().len(), 100);
    }

    #[tokio::test]
    async fn test_wearable_ticks_and_escalates_once() {
        let (wearable, companion) = pair();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let observer = companion.channel.clone();
        let _sub = observer.subscribe(move |msg| {
            if let SyncMessage::EmergencyTrigger(active) = msg {
                let _ = tx.send(active);
            }
        });

        wearable.force_anomaly().unwrap();
        wearable
            .start_wearable_with(Duration::from_millis(10), Simulator::seeded(5))
            .unwrap();
        assert!(wearable.is_simulating());

        eventually(|| companion.emergency_active() && companion.history().len() >= 6).await;
        wearable.stop_wearable().await;
        assert!(!wearable.is_simulating());

        // un seul front montant malgré plusieurs ticks critiques
        let first = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(first, Some(true));
        assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
        assert!(wearable.emergency_active());
    }

    #[tokio::test]
    async fn test_forced_spike_escalates_only_when_a_tick_runs() {
        let (wearable, companion) = pair();

        let spiked = wearable.force_anomaly().unwrap();
        assert!(simulator::is_critical(&spiked));
        eventually(|| companion.current() == spiked).await;
        assert!(!wearable.emergency_active());
        assert!(!companion.emergency_active());

        wearable
            .start_wearable_with(Duration::from_millis(10), Simulator::seeded(9))
            .unwrap();
        eventually(|| wearable.emergency_active() && companion.emergency_active()).await;
        wearable.stop_wearable().await;
    }

    #[tokio::test]
    async fn test_no_tick_after_stop() {
        let (wearable, _companion) = pair();
        wearable
            .start_wearable_with(Duration::from_millis(5), Simulator::seeded(1))
            .unwrap();
        sleep(Duration::from_millis(30)).await;
        wearable.stop_wearable().await;

        let produced = wearable.counters().produced.load(Ordering::Relaxed);
        let len = wearable.history().len();
        sleep(Duration::from_millis(40)).await;
        assert_eq!(wearable.counters().produced.load(Ordering::Relaxed), produced);
        assert_eq!(wearable.history().len(), len);
    }

    #[tokio::test]
    async fn test_companion_rejects_wearable_intents() {
        let (_wearable, companion) = pair();
        assert!(matches!(companion.force_anomaly(), Err(SurfaceError::NotWearable)));
        assert!(matches!(companion.toggle_sleep(), Err(SurfaceError::NotWearable)));
        assert!(matches!(companion.cancel_emergency(), Err(SurfaceError::NotWearable)));
        assert!(matches!(
            companion.start_wearable(Duration::from_millis(10)),
            Err(SurfaceError::NotWearable)
        ));
    }

    #[tokio::test]
    async fn test_toggle_sleep_syncs_flag_only() {
        let (wearable, companion) = pair();
        let before = wearable.current();
        let after = wearable.toggle_sleep().unwrap();
        assert!(after.sleeping);
        assert_eq!(after.heart_rate, before.heart_rate);
        eventually(|| companion.current().sleeping).await;
    }

    #[tokio::test]
    async fn test_analysis_requires_history_and_syncs_result() {
        let (wearable, companion) = pair();
        let gateway = AnalysisGateway::new(&AnalysisConf::default(), None);

        assert!(matches!(
            companion.trigger_analysis(&gateway).await,
            Err(SurfaceError::NotEnoughHistory { have: 1, need: 5 })
        ));

        for _ in 0..4 {
            wearable.toggle_sleep().unwrap();
        }
        eventually(|| companion.history().len() == 5).await;

        let result = companion.trigger_analysis(&gateway).await.unwrap();
        assert_eq!(result.status, AnalysisStatus::Normal);
        assert_eq!(companion.analysis(), Some(result.clone()));
        assert!(!companion.snapshot().analysing);
        eventually(|| wearable.analysis() == Some(result.clone())).await;
    }

    #[tokio::test]
    async fn test_overlapping_analysis_rejected() {
        let (_wearable, companion) = pair();
        {
            let mut st = companion.state.lock();
            for _ in 0..5 {
                let current = st.current.clone();
                st.history.push(current);
            }
            st.analysing = true;
        }
        let gateway = AnalysisGateway::new(&AnalysisConf::default(), None);
        assert!(matches!(
            companion.trigger_analysis(&gateway).await,
            Err(SurfaceError::AnalysisInFlight)
        ));
    }

    #[tokio::test]
    async fn test_contacts_are_local_to_surface() {
        let (wearable, companion) = pair();
        let added = companion
            .add_contact(NewContact {
                id: None,
                display_name: "Mom".into(),
                phone_number: "555-9999".into(),
                auto_dial_enabled: Some(false),
            })
            .unwrap();
        assert_eq!(companion.contacts().len(), 2);
        assert_eq!(wearable.contacts().len(), 1);
        assert!(companion.remove_contact(&added.id));
        assert!(!companion.remove_contact(&added.id));
    }

    #[tokio::test]
    async fn test_close_releases_subscription() {
        let (wearable, companion) = pair();
        companion.close().await;
        assert!(!companion.is_attached());

        wearable.force_anomaly().unwrap();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(companion.current().heart_rate, 75);
    }
}
