//! Fixed-capacity, oldest-first rolling buffer of tick snapshots.

use std::collections::VecDeque;

use crate::error::HistoryError;
use crate::models::HistorySnapshot;

/// Number of snapshots kept for the "last 24 steps" trend views.
pub const DEFAULT_CAPACITY: usize = 24;

#[derive(Debug, Clone)]
pub struct RollingHistory {
    capacity: usize,
    entries: VecDeque<HistorySnapshot>,
}

impl Default for RollingHistory {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            entries: VecDeque::with_capacity(DEFAULT_CAPACITY),
        }
    }
}

impl RollingHistory {
    pub fn new(capacity: usize) -> Result<Self, HistoryError> {
        if capacity == 0 {
            return Err(HistoryError::ZeroCapacity);
        }
        Ok(Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        })
    }

    /// Append a snapshot, evicting the oldest entries once over capacity.
    ///
    /// A rejected snapshot leaves the buffer untouched.
    pub fn append(&mut self, snapshot: HistorySnapshot) -> Result<(), HistoryError> {
        self.check(&snapshot)?;
        self.entries.push_back(snapshot);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        Ok(())
    }

    fn check(&self, snapshot: &HistorySnapshot) -> Result<(), HistoryError> {
        let agg = &snapshot.aggregates;
        if !agg.avg.is_finite() || !agg.max.is_finite() {
            return Err(HistoryError::InvalidSnapshot(format!(
                "non-finite aggregates (avg {}, max {})",
                agg.avg, agg.max
            )));
        }
        if agg.alert_count > snapshot.scores.len() {
            return Err(HistoryError::InvalidSnapshot(format!(
                "alert count {} exceeds {} sector scores",
                agg.alert_count,
                snapshot.scores.len()
            )));
        }
        if let Some(latest) = self.entries.back() {
            if snapshot.timestamp < latest.timestamp {
                return Err(HistoryError::InvalidSnapshot(format!(
                    "timestamp {} precedes latest {}",
                    snapshot.timestamp, latest.timestamp
                )));
            }
        }
        Ok(())
    }

    pub fn latest(&self) -> Option<&HistorySnapshot> {
        self.entries.back()
    }

    /// Snapshots oldest-first.
    pub fn as_series(&self) -> impl ExactSizeIterator<Item = &HistorySnapshot> + '_ {
        self.entries.iter()
    }

    /// Change in average score between the two newest snapshots.
    pub fn avg_delta(&self) -> Option<f64> {
        let mut newest = self.entries.iter().rev();
        let latest = newest.next()?;
        let previous = newest.next()?;
        Some(latest.aggregates.avg - previous.aggregates.avg)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Aggregates, RiskBand, Sector, SectorScore};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use proptest::prelude::*;

    fn t(step: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap() + Duration::hours(step)
    }

    fn snapshot(step: i64, avg: f64) -> HistorySnapshot {
        HistorySnapshot {
            timestamp: t(step),
            scores: vec![SectorScore {
                sector: Sector::new("A1"),
                raw_score: avg / 120.0,
                scaled_score: avg,
                band: RiskBand::Low,
            }],
            aggregates: Aggregates {
                avg,
                max: avg,
                alert_count: 0,
            },
        }
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert_eq!(RollingHistory::new(0).unwrap_err(), HistoryError::ZeroCapacity);
    }

    #[test]
    fn default_keeps_twenty_four() {
        let mut history = RollingHistory::default();
        for step in 0..30 {
            history.append(snapshot(step, 10.0)).unwrap();
        }
        assert_eq!(history.len(), DEFAULT_CAPACITY);
        assert_eq!(history.as_series().next().unwrap().timestamp, t(6));
    }

    #[test]
    fn evicts_oldest_first() {
        let mut history = RollingHistory::new(3).unwrap();
        for step in 1..=4 {
            history.append(snapshot(step, step as f64)).unwrap();
        }
        let stamps: Vec<_> = history.as_series().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![t(2), t(3), t(4)]);
        assert_eq!(history.latest().unwrap().timestamp, t(4));
    }

    #[test]
    fn empty_history_has_no_latest() {
        let history = RollingHistory::new(5).unwrap();
        assert!(history.latest().is_none());
        assert!(history.is_empty());
        assert_eq!(history.avg_delta(), None);
    }

    #[test]
    fn avg_delta_compares_two_newest() {
        let mut history = RollingHistory::new(5).unwrap();
        history.append(snapshot(0, 40.0)).unwrap();
        assert_eq!(history.avg_delta(), None);
        history.append(snapshot(1, 55.0)).unwrap();
        history.append(snapshot(2, 50.0)).unwrap();
        assert_eq!(history.avg_delta(), Some(-5.0));
    }

    #[test]
    fn malformed_snapshots_leave_buffer_unchanged() {
        let mut history = RollingHistory::new(3).unwrap();
        history.append(snapshot(5, 30.0)).unwrap();

        let mut nan = snapshot(6, 30.0);
        nan.aggregates.avg = f64::NAN;
        assert!(matches!(
            history.append(nan),
            Err(HistoryError::InvalidSnapshot(_))
        ));

        let mut overcounted = snapshot(6, 30.0);
        overcounted.aggregates.alert_count = 2;
        assert!(history.append(overcounted).is_err());

        assert!(history.append(snapshot(4, 30.0)).is_err());

        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().unwrap().timestamp, t(5));
    }

    #[test]
    fn equal_timestamps_are_accepted() {
        let mut history = RollingHistory::new(3).unwrap();
        history.append(snapshot(1, 1.0)).unwrap();
        history.append(snapshot(1, 2.0)).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.latest().unwrap().aggregates.avg, 2.0);
    }

    proptest! {
        #[test]
        fn length_is_min_of_appends_and_capacity(capacity in 1usize..40, appends in 0usize..100) {
            let mut history = RollingHistory::new(capacity).unwrap();
            for step in 0..appends {
                history.append(snapshot(step as i64, 1.0)).unwrap();
            }
            prop_assert_eq!(history.len(), appends.min(capacity));

            let stamps: Vec<_> = history.as_series().map(|s| s.timestamp).collect();
            prop_assert!(stamps.windows(2).all(|w| w[0] < w[1]));
            if appends > 0 {
                prop_assert_eq!(history.latest().unwrap().timestamp, t(appends as i64 - 1));
            }
        }
    }
}
