/**
 * SIMULATEUR DE CONSTANTES - Générateur de relevés pour la montre simulée
 *
 * RÔLE :
 * Produit une série temporelle plausible (FC, SpO2, température, tension, stress, pas)
 * sans capteur réel, capable de montrer des anomalies et des urgences.
 *
 * FONCTIONNEMENT :
 * - Mode anomalie recalculé à chaque tick à partir du relevé PRÉCÉDENT (pas d'état stocké)
 * - Mode normal : marche aléatoire autour des valeurs de repos, amplitude large
 * - Mode anomalie : marche aléatoire autour des valeurs courantes, amplitude étroite
 * - Urgence détectée sur front montant seulement, levée uniquement par l'utilisateur
 */

use crate::models::VitalsReading;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use time::OffsetDateTime;

pub const RESTING_HEART_RATE: f64 = 75.0;
pub const RESTING_BLOOD_OXYGEN: f64 = 98.0;
pub const RESTING_TEMPERATURE: f64 = 36.6;
pub const RESTING_SYSTOLIC: f64 = 120.0;
pub const RESTING_DIASTOLIC: f64 = 80.0;

pub const NORMAL_STRESS: f64 = 25.0;
pub const ANOMALY_STRESS: f64 = 85.0;
pub const STRESS_RANGE: f64 = 10.0;

/// Largeur totale de la perturbation uniforme, par métrique
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JitterRanges {
    pub heart_rate: f64,
    pub blood_oxygen: f64,
    pub temperature: f64,
    pub systolic: f64,
    pub diastolic: f64,
}

pub const NORMAL_RANGES: JitterRanges = JitterRanges {
    heart_rate: 10.0,
    blood_oxygen: 2.0,
    temperature: 0.3,
    systolic: 8.0,
    diastolic: 5.0,
};

// plus étroit que NORMAL_RANGES : une anomalie décroît lentement
pub const ANOMALY_RANGES: JitterRanges = JitterRanges {
    heart_rate: 5.0,
    blood_oxygen: 1.0,
    temperature: 0.2,
    systolic: 5.0,
    diastolic: 3.0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Anomaly,
}

impl Mode {
    pub fn ranges(self) -> JitterRanges {
        match self {
            Mode::Normal => NORMAL_RANGES,
            Mode::Anomaly => ANOMALY_RANGES,
        }
    }
}

/// Perturbation uniforme centrée sur `base`, de largeur totale `range`.
/// `sample` doit être dans [0, 1).
pub fn jitter(base: f64, range: f64, sample: f64) -> f64 {
    base + (sample * range - range / 2.0)
}

pub fn is_anomalous(reading: &VitalsReading) -> bool {
    reading.heart_rate > 130
        || reading.blood_oxygen < 90
        || reading.temperature > 38.0
        || reading.systolic > 140
}

pub fn is_critical(reading: &VitalsReading) -> bool {
    (reading.heart_rate > 150 && reading.blood_oxygen < 90) || reading.systolic > 180
}

pub fn mode_for(previous: &VitalsReading) -> Mode {
    if is_anomalous(previous) {
        Mode::Anomaly
    } else {
        Mode::Normal
    }
}

fn to_metric(value: f64) -> u32 {
    // `as` sature à 0 pour les négatifs
    value.round() as u32
}

pub struct Simulator<R: Rng = StdRng> {
    rng: R,
}

impl Simulator<StdRng> {
    pub fn from_entropy() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> Simulator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Calcule le relevé suivant à partir du précédent
    pub fn next_reading(&mut self, previous: &VitalsReading, now: OffsetDateTime) -> VitalsReading {
        let mode = mode_for(previous);
        let ranges = mode.ranges();

        let (hr_base, spo2_base, temp_base, sys_base, dia_base, stress_base) = match mode {
            Mode::Anomaly => (
                previous.heart_rate as f64,
                previous.blood_oxygen as f64,
                previous.temperature,
                previous.systolic as f64,
                previous.diastolic as f64,
                ANOMALY_STRESS,
            ),
            Mode::Normal => (
                RESTING_HEART_RATE,
                RESTING_BLOOD_OXYGEN,
                RESTING_TEMPERATURE,
                RESTING_SYSTOLIC,
                RESTING_DIASTOLIC,
                NORMAL_STRESS,
            ),
        };

        let heart_rate = jitter(hr_base, ranges.heart_rate, self.sample());
        let blood_oxygen = jitter(spo2_base, ranges.blood_oxygen, self.sample()).min(100.0);
        let temperature = jitter(temp_base, ranges.temperature, self.sample());
        let systolic = jitter(sys_base, ranges.systolic, self.sample());
        let diastolic = jitter(dia_base, ranges.diastolic, self.sample());
        let stress = jitter(stress_base, STRESS_RANGE, self.sample()).clamp(0.0, 100.0);

        let step_count = if previous.sleeping {
            previous.step_count
        } else if self.sample() > 0.5 {
            previous.step_count + 1
        } else {
            previous.step_count
        };

        VitalsReading {
            captured_at: now,
            heart_rate: to_metric(heart_rate),
            blood_oxygen: to_metric(blood_oxygen),
            temperature,
            systolic: to_metric(systolic),
            diastolic: to_metric(diastolic),
            step_count,
            stress_index: to_metric(stress),
            sleeping: previous.sleeping,
        }
    }

    fn sample(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Pic déterministe pour démontrer le chemin anomalie/urgence
pub fn force_anomaly(current: &VitalsReading) -> VitalsReading {
    VitalsReading {
        heart_rate: 160,
        blood_oxygen: 88,
        stress_index: 95,
        temperature: 39.2,
        systolic: 175,
        diastolic: 105,
        ..current.clone()
    }
}

/// Retour aux valeurs de repos après annulation d'une urgence
pub fn resting(current: &VitalsReading) -> VitalsReading {
    VitalsReading {
        heart_rate: 75,
        blood_oxygen: 98,
        stress_index: 20,
        temperature: 36.6,
        systolic: 120,
        diastolic: 80,
        ..current.clone()
    }
}

pub fn toggle_sleep(current: &VitalsReading) -> VitalsReading {
    VitalsReading {
        sleeping: !current.sleeping,
        ..current.clone()
    }
}

/// Drapeau d'urgence à déclenchement sur front : une fois levé il reste levé
/// jusqu'à `set(false)` (annulation explicite).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmergencyLatch {
    active: bool,
}

impl EmergencyLatch {
    /// Retourne true uniquement sur la transition false -> true
    pub fn observe(&mut self, reading: &VitalsReading) -> bool {
        if is_critical(reading) && !self.active {
            self.active = true;
            return true;
        }
        false
    }

    pub fn set(&mut self, active: bool) {
        self.active = active;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn start() -> VitalsReading {
        VitalsReading::initial(OffsetDateTime::UNIX_EPOCH)
    }

    fn within(value: f64, base: f64, range: f64) -> bool {
        (value - base).abs() <= range / 2.0 + 1e-9
    }

    #[test]
    fn test_jitter_bounds() {
        assert_eq!(jitter(75.0, 10.0, 0.0), 70.0);
        assert_eq!(jitter(75.0, 10.0, 0.5), 75.0);
        assert!(jitter(75.0, 10.0, 0.999_999) < 80.0);
    }

    #[test]
    fn test_normal_mode_stays_within_half_range() {
        let mut sim = Simulator::seeded(7);
        let mut prev = start();
        for _ in 0..2_000 {
            assert_eq!(mode_for(&prev), Mode::Normal);
            let next = sim.next_reading(&prev, OffsetDateTime::UNIX_EPOCH);
            assert!(within(next.heart_rate as f64, RESTING_HEART_RATE, NORMAL_RANGES.heart_rate));
            assert!(within(next.blood_oxygen as f64, RESTING_BLOOD_OXYGEN, NORMAL_RANGES.blood_oxygen));
            assert!(within(next.temperature, RESTING_TEMPERATURE, NORMAL_RANGES.temperature));
            assert!(within(next.systolic as f64, RESTING_SYSTOLIC, NORMAL_RANGES.systolic));
            assert!(within(next.diastolic as f64, RESTING_DIASTOLIC, NORMAL_RANGES.diastolic));
            assert!(within(next.stress_index as f64, NORMAL_STRESS, STRESS_RANGE));
            prev = next;
        }
    }

    #[test]
    fn test_anomaly_mode_walks_around_previous_values() {
        let mut sim = Simulator::seeded(11);
        let prev = force_anomaly(&start());
        assert_eq!(mode_for(&prev), Mode::Anomaly);

        let next = sim.next_reading(&prev, OffsetDateTime::UNIX_EPOCH);
        assert!(within(next.heart_rate as f64, 160.0, ANOMALY_RANGES.heart_rate));
        assert!(within(next.blood_oxygen as f64, 88.0, ANOMALY_RANGES.blood_oxygen));
        assert!(within(next.temperature, 39.2, ANOMALY_RANGES.temperature));
        assert!(within(next.systolic as f64, 175.0, ANOMALY_RANGES.systolic));
        assert!(within(next.diastolic as f64, 105.0, ANOMALY_RANGES.diastolic));
        assert!(within(next.stress_index as f64, ANOMALY_STRESS, STRESS_RANGE));
    }

    #[test]
    fn test_each_predicate_alone_enters_anomaly_mode() {
        let base = start();
        let cases = [
            VitalsReading { heart_rate: 131, ..base.clone() },
            VitalsReading { blood_oxygen: 89, ..base.clone() },
            VitalsReading { temperature: 38.01, ..base.clone() },
            VitalsReading { systolic: 141, ..base.clone() },
        ];
        for case in &cases {
            assert_eq!(mode_for(case), Mode::Anomaly, "{:?}", case);
        }

        let edge = VitalsReading { heart_rate: 130, blood_oxygen: 90, temperature: 38.0, systolic: 140, ..base };
        assert_eq!(mode_for(&edge), Mode::Normal);
    }

    #[test]
    fn test_blood_oxygen_never_above_100() {
        // échantillon maximal : la marche autour de 100 dépasserait sans clamp
        let mut sim = Simulator::with_rng(StepRng::new(u64::MAX, 0));
        let prev = VitalsReading { blood_oxygen: 100, heart_rate: 140, ..start() };
        let next = sim.next_reading(&prev, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(next.blood_oxygen, 100);

        let mut sim = Simulator::seeded(3);
        let mut prev = prev;
        for _ in 0..1_000 {
            prev = sim.next_reading(&prev, OffsetDateTime::UNIX_EPOCH);
            assert!(prev.blood_oxygen <= 100);
        }
    }

    #[test]
    fn test_steps_frozen_while_sleeping() {
        let mut sim = Simulator::with_rng(StepRng::new(u64::MAX, 0));
        let awake = start();
        let next = sim.next_reading(&awake, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(next.step_count, 1241);

        let asleep = toggle_sleep(&awake);
        let next = sim.next_reading(&asleep, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(next.step_count, 1240);
        assert!(next.sleeping);
    }

    #[test]
    fn test_stress_clamped() {
        let mut sim = Simulator::with_rng(StepRng::new(0, 0));
        let next = sim.next_reading(&start(), OffsetDateTime::UNIX_EPOCH);
        assert_eq!(next.stress_index, 20);
        assert!(next.stress_index <= 100);
    }

    #[test]
    fn test_force_anomaly_snapshot() {
        let before = start();
        let after = force_anomaly(&before);
        assert_eq!(after.heart_rate, 160);
        assert_eq!(after.blood_oxygen, 88);
        assert_eq!(after.stress_index, 95);
        assert_eq!(after.temperature, 39.2);
        assert_eq!(after.systolic, 175);
        assert_eq!(after.diastolic, 105);
        assert_eq!(after.step_count, before.step_count);
        assert_eq!(after.sleeping, before.sleeping);
        assert_eq!(after.captured_at, before.captured_at);
    }

    #[test]
    fn test_resting_after_anomaly() {
        let reset = resting(&force_anomaly(&start()));
        assert_eq!(
            (reset.heart_rate, reset.blood_oxygen, reset.stress_index, reset.systolic, reset.diastolic),
            (75, 98, 20, 120, 80)
        );
        assert_eq!(reset.temperature, 36.6);
    }

    #[test]
    fn test_toggle_sleep_only_flips_flag() {
        let before = start();
        let after = toggle_sleep(&before);
        assert!(after.sleeping);
        assert_eq!(VitalsReading { sleeping: false, ..after.clone() }, before);
        assert!(!toggle_sleep(&after).sleeping);
    }

    #[test]
    fn test_emergency_latch_fires_once_per_crossing() {
        let critical = VitalsReading { systolic: 185, ..start() };
        let calm = start();
        let mut latch = EmergencyLatch::default();

        let fired: Vec<bool> = [&calm, &critical, &critical, &critical, &calm, &critical]
            .iter()
            .map(|r| latch.observe(r))
            .collect();
        assert_eq!(fired, vec![false, true, false, false, false, false]);
        // jamais levé automatiquement
        assert!(latch.is_active());

        latch.set(false);
        assert!(!latch.is_active());
        assert!(latch.observe(&critical));
    }

    #[test]
    fn test_critical_predicate() {
        let base = start();
        assert!(is_critical(&VitalsReading { heart_rate: 151, blood_oxygen: 89, ..base.clone() }));
        assert!(!is_critical(&VitalsReading { heart_rate: 151, blood_oxygen: 90, ..base.clone() }));
        assert!(!is_critical(&VitalsReading { heart_rate: 150, blood_oxygen: 80, ..base.clone() }));
        assert!(is_critical(&VitalsReading { systolic: 181, ..base.clone() }));
        // le pic forcé est critique, mais l'escalade n'est évaluée qu'au tick
        assert!(is_critical(&force_anomaly(&base)));
    }

    #[test]
    fn test_forced_anomaly_escalates_on_next_tick() {
        let mut sim = Simulator::seeded(42);
        let mut latch = EmergencyLatch::default();
        let spike = force_anomaly(&start());
        let next = sim.next_reading(&spike, OffsetDateTime::UNIX_EPOCH);
        assert!(latch.observe(&next));
    }
}
