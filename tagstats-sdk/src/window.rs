//! Wraps a bare [`Aggregator`] in the time-rotation logic a view's
//! [`Window`] requires: [`Window::Cumulative`] never resets,
//! [`Window::Interval`] rotates through a ring of sub-buckets so old
//! samples age out, and [`Window::MultiInterval`] runs several such rings
//! off the same admission.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tagstats::{Aggregation, Window};

use crate::aggregator::{self, AggregatedValue, Aggregator};

/// A single signature's aggregator state, shaped by its view's [`Window`].
#[derive(Debug)]
pub(crate) struct WindowedAggregator {
    runtime: WindowRuntime,
}

#[derive(Debug)]
enum WindowRuntime {
    Cumulative(Box<dyn Aggregator>),
    Interval(IntervalRing),
    MultiInterval(Vec<IntervalRing>),
}

impl WindowedAggregator {
    pub(crate) fn new(aggregation: &Aggregation, window: &Window) -> Self {
        let runtime = match window {
            Window::Cumulative => WindowRuntime::Cumulative(aggregator::new_aggregator(aggregation)),
            Window::Interval {
                duration,
                sub_intervals,
            } => WindowRuntime::Interval(IntervalRing::new(aggregation, *duration, *sub_intervals)),
            Window::MultiInterval {
                durations,
                sub_intervals,
            } => WindowRuntime::MultiInterval(
                durations
                    .iter()
                    .map(|d| IntervalRing::new(aggregation, *d, *sub_intervals))
                    .collect(),
            ),
        };
        WindowedAggregator { runtime }
    }

    /// Admit a sample recorded at `recorded_at`.
    pub(crate) fn update(&self, value: f64, recorded_at: Instant) {
        match &self.runtime {
            WindowRuntime::Cumulative(agg) => agg.update(value, recorded_at),
            WindowRuntime::Interval(ring) => ring.update(value, recorded_at),
            WindowRuntime::MultiInterval(rings) => {
                for ring in rings {
                    ring.update(value, recorded_at);
                }
            }
        }
    }

    /// A read-only snapshot of this signature's currently visible state.
    /// For [`Window::MultiInterval`] this returns one snapshot per
    /// configured duration, in the same order the window was declared.
    pub(crate) fn snapshot(&self) -> Vec<AggregatedValue> {
        match &self.runtime {
            WindowRuntime::Cumulative(agg) => vec![agg.snapshot()],
            WindowRuntime::Interval(ring) => vec![ring.snapshot()],
            WindowRuntime::MultiInterval(rings) => rings.iter().map(|r| r.snapshot()).collect(),
        }
    }
}

struct RingState {
    head: usize,
    bucket_start: Instant,
}

/// A ring of `sub_intervals + 1` aggregator buckets spanning `duration`
/// total, each covering `duration / sub_intervals` wall time. The extra
/// bucket beyond `sub_intervals` absorbs the bucket currently filling so a
/// full `duration` of completed history is always available to merge.
struct IntervalRing {
    aggregation: Aggregation,
    bucket_duration: Duration,
    buckets: Vec<Box<dyn Aggregator>>,
    state: Mutex<RingState>,
}

impl std::fmt::Debug for IntervalRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntervalRing")
            .field("bucket_duration", &self.bucket_duration)
            .field("num_buckets", &self.buckets.len())
            .finish()
    }
}

impl IntervalRing {
    fn new(aggregation: &Aggregation, duration: Duration, sub_intervals: u32) -> Self {
        let num_buckets = sub_intervals as usize + 1;
        let bucket_duration = duration / sub_intervals.max(1);
        let buckets = (0..num_buckets)
            .map(|_| aggregator::new_aggregator(aggregation))
            .collect();
        IntervalRing {
            aggregation: aggregation.clone(),
            bucket_duration,
            buckets,
            state: Mutex::new(RingState {
                head: 0,
                bucket_start: Instant::now(),
            }),
        }
    }

    /// Advance the ring so the active bucket covers `now`, resetting any
    /// buckets that have aged fully out of the window, then admit `value`
    /// into the now-current bucket.
    fn update(&self, value: f64, now: Instant) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.rotate(&mut state, now);
        self.buckets[state.head].update(value, now);
    }

    fn rotate(&self, state: &mut RingState, now: Instant) {
        let len = self.buckets.len();
        let elapsed = now.saturating_duration_since(state.bucket_start);
        let elapsed_buckets = (elapsed.as_nanos() / self.bucket_duration.as_nanos().max(1)) as usize;

        if elapsed_buckets == 0 {
            return;
        }
        if elapsed_buckets >= len {
            // The gap since the last sample spans the whole window: every
            // bucket's contents are stale, so reset them all in one pass
            // instead of stepping through each one individually.
            for bucket in &self.buckets {
                bucket.snapshot_and_reset();
            }
            state.bucket_start = now;
            return;
        }
        for _ in 0..elapsed_buckets {
            state.head = (state.head + 1) % len;
            self.buckets[state.head].snapshot_and_reset();
            state.bucket_start += self.bucket_duration;
        }
    }

    /// Merge every completed-or-filling bucket into one window-wide
    /// snapshot, oldest to newest so last-write-wins aggregations (gauges)
    /// resolve to the most recent reading.
    ///
    /// Rotates first so a snapshot taken long after the last `update` still
    /// reflects buckets having aged out, rather than only evicting stale
    /// data the next time a sample happens to be recorded.
    ///
    /// The ring holds `sub_intervals + 1` buckets so the currently-filling
    /// bucket never has to be torn in two, but merging all of them whole
    /// would retain the oldest bucket's contents for up to one extra
    /// `bucket_duration` beyond the window. Instead the oldest bucket is
    /// weighted by the fraction of its span still inside `[now-D, now]`,
    /// which reaches zero exactly `bucket_duration` after its last sample
    /// could have been admitted.
    fn snapshot(&self) -> AggregatedValue {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        self.rotate(&mut state, now);

        let len = self.buckets.len();
        let oldest = (state.head + 1) % len;
        let elapsed_in_head = now.saturating_duration_since(state.bucket_start);
        let weight = 1.0
            - (elapsed_in_head.as_secs_f64() / self.bucket_duration.as_secs_f64().max(f64::MIN_POSITIVE))
                .min(1.0);

        let mut acc = aggregator::new_aggregator(&self.aggregation).snapshot();
        for i in 0..len {
            let idx = (oldest + i) % len;
            let bucket = self.buckets[idx].snapshot();
            acc = if idx == oldest {
                aggregator::weighted_merge(acc, bucket, weight)
            } else {
                aggregator::merge(acc, bucket)
            };
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn cumulative_never_resets_across_snapshots() {
        let w = WindowedAggregator::new(&Aggregation::count(), &Window::cumulative());
        w.update(1.0, Instant::now());
        assert_eq!(w.snapshot(), vec![AggregatedValue::Count(1)]);
        w.update(1.0, Instant::now());
        assert_eq!(w.snapshot(), vec![AggregatedValue::Count(2)]);
    }

    #[test]
    fn interval_ring_sees_samples_recorded_within_the_window() {
        let ring = WindowedAggregator::new(
            &Aggregation::count(),
            &Window::interval(Duration::from_secs(60), 4),
        );
        ring.update(1.0, Instant::now());
        ring.update(1.0, Instant::now());
        assert_eq!(ring.snapshot(), vec![AggregatedValue::Count(2)]);
    }

    #[test]
    fn oldest_bucket_is_weighted_down_as_it_approaches_expiry() {
        use std::thread;

        // duration=1s, 10 sub-intervals -> bucket_duration=100ms.
        let ring = WindowedAggregator::new(
            &Aggregation::count(),
            &Window::interval(Duration::from_secs(1), 10),
        );
        ring.update(1.0, Instant::now());
        // By 1.08s the sample's bucket has become the ring's oldest
        // completed bucket with only ~20% of its span still overlapping
        // the window; proportional weighting rounds that down to zero
        // well before the bucket is fully evicted at 1.1s.
        thread::sleep(Duration::from_millis(1080));
        assert_eq!(ring.snapshot(), vec![AggregatedValue::Count(0)]);
    }

    #[test]
    fn multi_interval_fans_a_single_admission_into_every_duration() {
        let w = WindowedAggregator::new(
            &Aggregation::count(),
            &Window::multi_interval(vec![Duration::from_secs(60), Duration::from_secs(600)], 4),
        );
        w.update(1.0, Instant::now());
        assert_eq!(
            w.snapshot(),
            vec![AggregatedValue::Count(1), AggregatedValue::Count(1)]
        );
    }
}
