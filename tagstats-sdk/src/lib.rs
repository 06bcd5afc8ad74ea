//! The tagstats in-process stats collection engine.
//!
//! Applications register [`tagstats::MeasureDescriptor`]s and
//! [`tagstats::ViewDescriptor`]s against a [`StatsEngine`], record
//! measurements as they happen, and either pull a view's current
//! aggregation state on demand ([`StatsEngine::retrieve_view`]) or
//! subscribe to receive a snapshot on every reporting tick
//! ([`StatsEngine::subscribe`]).
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

mod aggregator;
mod engine;
mod registry;
mod reporting;
mod subscription;
mod value_map;
mod view_engine;
mod window;

pub use aggregator::AggregatedValue;
pub use engine::{EngineBuilder, StatsEngine};
pub use registry::MeasureRegistryError;
pub use subscription::{SubscribeError, SubscriptionId, DEFAULT_SUBSCRIBER_BUFFER};
pub use view_engine::{ViewEngineError, ViewSnapshot};
