use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use super::{AggregatedValue, Aggregator};

/// Counts admitted measurements. The sample's numeric value is ignored; each
/// `update` call counts as exactly one admission, matching OpenCensus-style
/// `Count` views (as opposed to a `Sum`, which this engine does not expose
/// as a distinct aggregation).
#[derive(Debug, Default)]
pub(crate) struct CountAggregator {
    count: AtomicU64,
}

impl CountAggregator {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl Aggregator for CountAggregator {
    fn update(&self, _value: f64, _recorded_at: Instant) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> AggregatedValue {
        AggregatedValue::Count(self.count.load(Ordering::Relaxed))
    }

    fn snapshot_and_reset(&self) -> AggregatedValue {
        AggregatedValue::Count(self.count.swap(0, Ordering::Relaxed))
    }
}
