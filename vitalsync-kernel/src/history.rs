use crate::models::VitalsReading;
use std::collections::VecDeque;

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Journal FIFO borné des relevés : au-delà de la capacité, le plus ancien sort.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    entries: VecDeque<VitalsReading>,
    capacity: usize,
}

impl HistoryLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, reading: VitalsReading) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(reading);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Les `n` relevés les plus récents, dans l'ordre chronologique
    pub fn recent(&self, n: usize) -> Vec<VitalsReading> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn to_vec(&self) -> Vec<VitalsReading> {
        self.entries.iter().cloned().collect()
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn reading(steps: u64) -> VitalsReading {
        VitalsReading {
            step_count: steps,
            ..VitalsReading::initial(OffsetDateTime::UNIX_EPOCH)
        }
    }

    #[test]
    fn test_never_exceeds_capacity_and_evicts_oldest() {
        let mut log = HistoryLog::default();
        for i in 0..250 {
            log.push(reading(i));
            assert!(log.len() <= 100);
        }
        assert_eq!(log.len(), 100);
        let all = log.to_vec();
        assert_eq!(all[0].step_count, 150);
        assert_eq!(all[99].step_count, 249);
    }

    #[test]
    fn test_recent_window_keeps_order() {
        let mut log = HistoryLog::new(10);
        for i in 0..7 {
            log.push(reading(i));
        }
        let steps: Vec<u64> = log.recent(3).iter().map(|r| r.step_count).collect();
        assert_eq!(steps, vec![4, 5, 6]);
        assert_eq!(log.recent(50).len(), 7);
    }

    #[test]
    fn test_zero_capacity_is_bumped_to_one() {
        let mut log = HistoryLog::new(0);
        log.push(reading(1));
        log.push(reading(2));
        assert_eq!(log.len(), 1);
        assert_eq!(log.capacity(), 1);
    }
}
