use std::sync::Mutex;
use std::time::Instant;

use super::{AggregatedValue, Aggregator};

#[derive(Debug, Clone, Copy)]
struct Reading {
    value: f64,
    recorded_at: Instant,
}

/// Last-write-wins on `(value, sample-time)`. A sample recorded with an
/// older `recorded_at` than the currently held reading is dropped, so
/// concurrent admissions resolve deterministically regardless of which
/// thread's `update` call actually runs last.
#[derive(Debug)]
pub(crate) struct GaugeAggregator {
    state: Mutex<Option<Reading>>,
}

impl GaugeAggregator {
    pub(crate) fn new() -> Self {
        GaugeAggregator {
            state: Mutex::new(None),
        }
    }
}

impl Aggregator for GaugeAggregator {
    fn update(&self, value: f64, recorded_at: Instant) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.map_or(true, |current| recorded_at >= current.recorded_at) {
            *state = Some(Reading { value, recorded_at });
        }
    }

    fn snapshot(&self) -> AggregatedValue {
        let value = self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map(|r| r.value);
        AggregatedValue::Gauge { value }
    }

    fn snapshot_and_reset(&self) -> AggregatedValue {
        let value = self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .map(|r| r.value);
        AggregatedValue::Gauge { value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn later_sample_time_wins_even_if_applied_first() {
        let agg = GaugeAggregator::new();
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(10);

        agg.update(2.0, t1);
        agg.update(1.0, t0);

        assert_eq!(agg.snapshot(), AggregatedValue::Gauge { value: Some(2.0) });
    }

    #[test]
    fn empty_gauge_has_no_value() {
        let agg = GaugeAggregator::new();
        assert_eq!(agg.snapshot(), AggregatedValue::Gauge { value: None });
    }
}
