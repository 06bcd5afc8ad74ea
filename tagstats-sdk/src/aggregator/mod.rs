//! The aggregator kernel: per-signature accumulators realizing an
//! [`Aggregation`] (what combines) independent of [`Window`] (how long it
//! stays visible). [`crate::value_map::ValueMap`] owns one aggregator per
//! distinct tag signature; [`crate::window::WindowedAggregator`] wraps one
//! in the time-rotation logic a view's [`Window`] requires.

mod count;
mod distribution;
mod gauge;

use std::time::Instant;

use tagstats::Aggregation;

pub(crate) use count::CountAggregator;
pub(crate) use distribution::DistributionAggregator;
pub(crate) use gauge::GaugeAggregator;

/// A read-only snapshot of an aggregator's current state.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregatedValue {
    /// The number of measurements admitted.
    Count(u64),
    /// Distribution statistics: count, sum, mean, min, max, and per-bucket
    /// counts.
    Distribution {
        /// Number of samples admitted.
        count: u64,
        /// Sum of all admitted sample values.
        sum: f64,
        /// Arithmetic mean of admitted values (`sum / count`), or `None`
        /// if none were admitted.
        mean: Option<f64>,
        /// Minimum admitted value, if any were admitted.
        min: Option<f64>,
        /// Maximum admitted value, if any were admitted.
        max: Option<f64>,
        /// Per-bucket counts, one more than `bounds.len()`.
        bucket_counts: Vec<u64>,
    },
    /// The most recently admitted value and when it was recorded.
    Gauge {
        /// The last-written value, or `None` if nothing has been recorded.
        value: Option<f64>,
    },
}

/// A single bucket's worth of aggregation state for one tag signature.
///
/// Implementors must be safe to update concurrently from multiple admitting
/// threads; [`Self::update`] is called under a shared reference.
pub(crate) trait Aggregator: Send + Sync + std::fmt::Debug {
    /// Admit a sample. `recorded_at` is used by [`GaugeAggregator`] to
    /// resolve last-write-wins; other aggregators ignore it.
    fn update(&self, value: f64, recorded_at: Instant);

    /// A read-only snapshot of the current state; does not reset.
    fn snapshot(&self) -> AggregatedValue;

    /// Snapshot and reset to the zero state, atomically enough that no
    /// update is lost (it lands in either the old or the new state).
    fn snapshot_and_reset(&self) -> AggregatedValue;

    /// Merge another snapshot of the same aggregation kind into this one's
    /// current snapshot; used to combine sub-interval buckets into one
    /// window-wide view. Returns the merged value.
    fn merge_snapshot(&self, other: &AggregatedValue) -> AggregatedValue {
        merge(self.snapshot(), other.clone())
    }
}

/// Construct a fresh, zeroed aggregator for `aggregation`.
pub(crate) fn new_aggregator(aggregation: &Aggregation) -> Box<dyn Aggregator> {
    match aggregation {
        Aggregation::Count => Box::new(CountAggregator::new()),
        Aggregation::Distribution { bounds } => Box::new(DistributionAggregator::new(bounds.clone())),
        Aggregation::Gauge => Box::new(GaugeAggregator::new()),
    }
}

/// Combine two snapshots of the same shape. Used when a window spans
/// several sub-interval buckets that each hold an independent aggregator.
pub(crate) fn merge(a: AggregatedValue, b: AggregatedValue) -> AggregatedValue {
    match (a, b) {
        (AggregatedValue::Count(x), AggregatedValue::Count(y)) => AggregatedValue::Count(x + y),
        (
            AggregatedValue::Distribution {
                count: c1,
                sum: s1,
                min: min1,
                max: max1,
                bucket_counts: mut bc1,
                ..
            },
            AggregatedValue::Distribution {
                count: c2,
                sum: s2,
                min: min2,
                max: max2,
                bucket_counts: bc2,
                ..
            },
        ) => {
            for (a, b) in bc1.iter_mut().zip(bc2.iter()) {
                *a += b;
            }
            let count = c1 + c2;
            let sum = s1 + s2;
            AggregatedValue::Distribution {
                count,
                sum,
                mean: if count > 0 { Some(sum / count as f64) } else { None },
                min: min_option(min1, min2),
                max: max_option(max1, max2),
                bucket_counts: bc1,
            }
        }
        (AggregatedValue::Gauge { value: v1 }, AggregatedValue::Gauge { value: v2 }) => {
            AggregatedValue::Gauge { value: v2.or(v1) }
        }
        (a, _) => a,
    }
}

/// Merge `bucket` into `acc`, first scaling `bucket` by `weight` (the
/// fraction of `bucket`'s sub-interval that still intersects the sliding
/// window). `weight <= 0.0` drops `bucket` entirely; `weight >= 1.0` is a
/// plain [`merge`]. Used by [`crate::window::IntervalRing`] to weight the
/// oldest sub-bucket proportionally instead of retaining or discarding it
/// whole.
pub(crate) fn weighted_merge(acc: AggregatedValue, bucket: AggregatedValue, weight: f64) -> AggregatedValue {
    if weight <= 0.0 {
        acc
    } else if weight >= 1.0 {
        merge(acc, bucket)
    } else {
        merge(acc, scale(bucket, weight))
    }
}

fn scale(value: AggregatedValue, weight: f64) -> AggregatedValue {
    match value {
        AggregatedValue::Count(c) => AggregatedValue::Count(((c as f64) * weight).round() as u64),
        AggregatedValue::Distribution {
            count,
            sum,
            min,
            max,
            bucket_counts,
            ..
        } => {
            let count = ((count as f64) * weight).round() as u64;
            let sum = sum * weight;
            AggregatedValue::Distribution {
                count,
                sum,
                mean: if count > 0 { Some(sum / count as f64) } else { None },
                min,
                max,
                bucket_counts: bucket_counts
                    .into_iter()
                    .map(|b| ((b as f64) * weight).round() as u64)
                    .collect(),
            }
        }
        gauge @ AggregatedValue::Gauge { .. } => gauge,
    }
}

fn min_option(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, b) => b,
    }
}

fn max_option(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, b) => b,
    }
}
