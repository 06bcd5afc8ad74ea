use std::sync::Mutex;
use std::time::Instant;

use super::{AggregatedValue, Aggregator};

#[derive(Debug, Clone)]
struct Buckets {
    count: u64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    bucket_counts: Vec<u64>,
}

impl Buckets {
    fn zeroed(num_buckets: usize) -> Self {
        Buckets {
            count: 0,
            sum: 0.0,
            min: None,
            max: None,
            bucket_counts: vec![0; num_buckets],
        }
    }

    fn bin(&mut self, bounds: &[f64], value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        let idx = bounds.partition_point(|&b| b <= value);
        self.bucket_counts[idx] += 1;
    }

    fn as_value(&self) -> AggregatedValue {
        AggregatedValue::Distribution {
            count: self.count,
            sum: self.sum,
            mean: if self.count > 0 {
                Some(self.sum / self.count as f64)
            } else {
                None
            },
            min: self.min,
            max: self.max,
            bucket_counts: self.bucket_counts.clone(),
        }
    }
}

/// Count, sum, min, max, and per-bucket counts over fixed boundaries.
///
/// Updates take a single mutex rather than lock-free atomics per field,
/// since min/max/sum/bucket-increment must be applied as one unit per
/// sample; this mirrors how the teacher's own histogram aggregator guards
/// its `Buckets` state.
#[derive(Debug)]
pub(crate) struct DistributionAggregator {
    bounds: Vec<f64>,
    state: Mutex<Buckets>,
}

impl DistributionAggregator {
    pub(crate) fn new(bounds: Vec<f64>) -> Self {
        let num_buckets = bounds.len() + 1;
        DistributionAggregator {
            bounds,
            state: Mutex::new(Buckets::zeroed(num_buckets)),
        }
    }
}

impl Aggregator for DistributionAggregator {
    fn update(&self, value: f64, _recorded_at: Instant) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.bin(&self.bounds, value);
    }

    fn snapshot(&self) -> AggregatedValue {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).as_value()
    }

    fn snapshot_and_reset(&self) -> AggregatedValue {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let snapshot = state.as_value();
        *state = Buckets::zeroed(self.bounds.len() + 1);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bins_values_into_expected_buckets() {
        // bounds [0, 10) -> buckets: (-inf,0), [0,10), [10,inf)
        let agg = DistributionAggregator::new(vec![0.0, 10.0]);
        for v in [-1.0, 0.0, 5.0, 10.0, 20.0] {
            agg.update(v, Instant::now());
        }
        match agg.snapshot() {
            AggregatedValue::Distribution {
                count,
                sum,
                mean,
                min,
                max,
                bucket_counts,
            } => {
                assert_eq!(count, 5);
                assert_eq!(sum, 34.0);
                assert_eq!(mean, Some(34.0 / 5.0));
                assert_eq!(min, Some(-1.0));
                assert_eq!(max, Some(20.0));
                assert_eq!(bucket_counts, vec![1, 2, 2]);
            }
            other => panic!("unexpected snapshot: {other:?}"),
        }
    }

    #[test]
    fn empty_bounds_is_a_single_catch_all_bucket() {
        let agg = DistributionAggregator::new(Vec::new());
        agg.update(42.0, Instant::now());
        match agg.snapshot() {
            AggregatedValue::Distribution { bucket_counts, .. } => {
                assert_eq!(bucket_counts, vec![1]);
            }
            other => panic!("unexpected snapshot: {other:?}"),
        }
    }
}
