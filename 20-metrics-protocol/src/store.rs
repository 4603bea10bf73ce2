//! In-memory sample storage shared by every connection.
//!
//! The table maps a metric name to its samples keyed by timestamp. Both
//! levels are `BTreeMap`s so snapshots iterate in the order the wire format
//! needs: metric names ascending, then timestamps ascending.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Token that selects every metric in [`MetricStore::get`].
pub const WILDCARD: &str = "*";

/// Samples of a single metric, keyed by timestamp.
pub type Series = BTreeMap<i64, f64>;

/// Owned copy of part (or all) of the store.
pub type Snapshot = BTreeMap<String, Series>;

/// Volatile metric table.
///
/// Construct one per server and hand it to handlers behind an `Arc`. The lock
/// is only taken for the duration of a single `put` or `get`, never across an
/// await point, which keeps every mutation serialized.
#[derive(Debug, Default)]
pub struct MetricStore {
    metrics: Mutex<Snapshot>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the sample, overwriting any value already stored at `timestamp`.
    pub fn put(&self, name: &str, value: f64, timestamp: i64) {
        let mut metrics = self.lock();
        match metrics.get_mut(name) {
            Some(series) => {
                series.insert(timestamp, value);
            }
            None => {
                metrics.insert(name.to_string(), Series::from([(timestamp, value)]));
            }
        }
    }

    /// Returns a copy of the requested metric, or of every metric for [`WILDCARD`].
    ///
    /// An unknown name yields an empty snapshot rather than an error.
    pub fn get(&self, name: &str) -> Snapshot {
        let metrics = self.lock();
        if name == WILDCARD {
            return metrics.clone();
        }

        metrics
            .get_key_value(name)
            .map(|(name, series)| Snapshot::from([(name.clone(), series.clone())]))
            .unwrap_or_default()
    }

    pub fn metric_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        // A panic while holding the guard cannot leave a half-written sample,
        // so a poisoned table is still consistent.
        self.metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_returns_the_sample() {
        let store = MetricStore::new();
        store.put("cpu", 0.5, 1000);

        let snapshot = store.get("cpu");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["cpu"], Series::from([(1000, 0.5)]));
    }

    #[test]
    fn put_overwrites_existing_timestamp() {
        let store = MetricStore::new();
        store.put("cpu", 0.5, 1000);
        store.put("cpu", 0.9, 1000);

        assert_eq!(store.get("cpu")["cpu"], Series::from([(1000, 0.9)]));
    }

    #[test]
    fn wildcard_returns_every_metric() {
        let store = MetricStore::new();
        store.put("a", 1.0, 1);
        store.put("b", 2.0, 2);
        store.put("b", 3.0, 3);

        let snapshot = store.get(WILDCARD);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["a"], Series::from([(1, 1.0)]));
        assert_eq!(snapshot["b"], Series::from([(2, 2.0), (3, 3.0)]));
    }

    #[test]
    fn unknown_metric_is_empty() {
        let store = MetricStore::new();
        store.put("cpu", 0.5, 1000);

        assert!(store.get("memory").is_empty());
        assert!(MetricStore::new().get(WILDCARD).is_empty());
    }

    #[test]
    fn snapshot_is_detached_from_the_store() {
        let store = MetricStore::new();
        store.put("cpu", 0.5, 1000);

        let before = store.get(WILDCARD);
        store.put("cpu", 0.7, 1000);
        store.put("cpu", 0.8, 2000);
        store.put("disk", 1.0, 1);

        assert_eq!(before.len(), 1);
        assert_eq!(before["cpu"], Series::from([(1000, 0.5)]));
        assert_eq!(store.metric_count(), 2);
    }

    #[test]
    fn timestamps_iterate_in_ascending_order() {
        let store = MetricStore::new();
        for ts in [300, 100, 200] {
            store.put("load", ts as f64, ts);
        }

        let timestamps: Vec<i64> = store.get("load")["load"].keys().copied().collect();
        assert_eq!(timestamps, vec![100, 200, 300]);
    }
}
