//! Aggregation base combinators and the time windows that wrap them.
//!
//! A view's effective aggregator kind is the pair `(Aggregation, Window)`:
//! [`Aggregation`] decides how samples landing in the same bucket combine
//! (count, distribution, last-write-wins gauge); [`Window`] decides how long
//! admitted samples stay visible (forever, or a rotating sliding interval).
//! The aggregator kernel in `tagstats-sdk` realizes every combination.

use std::fmt;
use std::time::Duration;

/// How multiple samples landing in the same bucket combine.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Aggregation {
    /// An integer counter. Each admitted sample increments the count.
    Count,
    /// Count, min, max, sum, mean, and per-bucket counts over fixed
    /// boundaries. `bounds.len() + 1` buckets are formed:
    /// `(-∞,b₀), [b₀,b₁), …, [bₙ₋₁,+∞)`. An empty `bounds` yields a single
    /// bucket that catches every sample.
    Distribution {
        /// Sorted, finite bucket boundaries.
        bounds: Vec<f64>,
    },
    /// Last-write-wins on `(value, sample-time)`; no memory across samples.
    Gauge,
}

/// Errors returned by [`Aggregation::validate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    /// [`Aggregation::Distribution`] bounds were not strictly increasing.
    #[error("distribution bounds must be strictly increasing, got {bounds:?}")]
    NonMonotonicBounds {
        /// The offending bounds.
        bounds: Vec<f64>,
    },
    /// A bound was NaN.
    #[error("distribution bounds must not contain NaN")]
    NanBound,
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Count => f.write_str("Count"),
            Aggregation::Distribution { .. } => f.write_str("Distribution"),
            Aggregation::Gauge => f.write_str("Gauge"),
        }
    }
}

impl Aggregation {
    /// A counting aggregation.
    pub fn count() -> Self {
        Aggregation::Count
    }

    /// A distribution aggregation over the given bucket boundaries. They
    /// must already be strictly increasing; [`Self::validate`] rejects
    /// bounds that are not (it does not sort them).
    pub fn distribution(bounds: impl Into<Vec<f64>>) -> Self {
        Aggregation::Distribution {
            bounds: bounds.into(),
        }
    }

    /// A last-write-wins gauge aggregation.
    pub fn gauge() -> Self {
        Aggregation::Gauge
    }

    /// Validate that this aggregation is well-formed, e.g. that
    /// distribution bounds are finite and strictly increasing.
    pub fn validate(&self) -> Result<(), AggregationError> {
        if let Aggregation::Distribution { bounds } = self {
            if bounds.iter().any(|b| b.is_nan()) {
                return Err(AggregationError::NanBound);
            }
            for pair in bounds.windows(2) {
                if pair[0] >= pair[1] {
                    return Err(AggregationError::NonMonotonicBounds {
                        bounds: bounds.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// How long admitted samples stay visible to a snapshot.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Window {
    /// Samples are never forgotten; the aggregator only grows (or, for
    /// [`Aggregation::Gauge`], only overwrites) for the view's lifetime.
    Cumulative,
    /// A ring of `sub_intervals + 1` sub-buckets each covering
    /// `duration / sub_intervals` wall time. A sample recorded at `t` is
    /// visible to snapshots taken in `[t, t+duration)` and invisible at
    /// `t+duration` or later.
    Interval {
        /// The total window duration `D`.
        duration: Duration,
        /// The number of sub-buckets `N` the window is divided into.
        sub_intervals: u32,
    },
    /// One [`Window::Interval`] per listed duration, fed from a single
    /// admission; used when a view must report several rollup windows
    /// (e.g. 1m and 10m) simultaneously.
    MultiInterval {
        /// The set of window durations to maintain in parallel.
        durations: Vec<Duration>,
        /// The sub-bucket count shared by every interval.
        sub_intervals: u32,
    },
}

/// Errors returned by [`Window::validate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    /// `sub_intervals` was zero.
    #[error("sub_intervals must be at least 1")]
    ZeroSubIntervals,
    /// `duration` was zero.
    #[error("interval duration must be non-zero")]
    ZeroDuration,
    /// `durations` was empty.
    #[error("multi_interval requires at least one duration")]
    NoDurations,
}

impl Window {
    /// Samples accumulate forever.
    pub fn cumulative() -> Self {
        Window::Cumulative
    }

    /// A single sliding window of `duration` split into `sub_intervals`
    /// sub-buckets.
    pub fn interval(duration: Duration, sub_intervals: u32) -> Self {
        Window::Interval {
            duration,
            sub_intervals,
        }
    }

    /// Several sliding windows, one per duration in `durations`, each split
    /// into `sub_intervals` sub-buckets.
    pub fn multi_interval(durations: impl Into<Vec<Duration>>, sub_intervals: u32) -> Self {
        Window::MultiInterval {
            durations: durations.into(),
            sub_intervals,
        }
    }

    /// Validate that this window's parameters are usable.
    pub fn validate(&self) -> Result<(), WindowError> {
        match self {
            Window::Cumulative => Ok(()),
            Window::Interval {
                duration,
                sub_intervals,
            } => {
                if *sub_intervals == 0 {
                    Err(WindowError::ZeroSubIntervals)
                } else if duration.is_zero() {
                    Err(WindowError::ZeroDuration)
                } else {
                    Ok(())
                }
            }
            Window::MultiInterval {
                durations,
                sub_intervals,
            } => {
                if *sub_intervals == 0 {
                    Err(WindowError::ZeroSubIntervals)
                } else if durations.is_empty() {
                    Err(WindowError::NoDurations)
                } else if durations.iter().any(Duration::is_zero) {
                    Err(WindowError::ZeroDuration)
                } else {
                    Ok(())
                }
            }
        }
    }
}
