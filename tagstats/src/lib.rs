//! Typed tag keys, tag sets, ambient tag context, and the wire encoding used
//! to carry tag sets across process boundaries.
//!
//! This crate is the API surface of the tagstats stats collection engine: it
//! defines the data model (keys, tag sets, measures, aggregation/window
//! descriptors, views) that application code and the [`tagstats-sdk`] engine
//! both build on. It contains no mutable global state beyond the key and
//! ambient-context registries described below; the engine itself lives in
//! `tagstats-sdk`.
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod aggregation;
pub mod context;
pub mod encoding;
pub mod key;
pub mod measure;
pub mod tag;
pub mod value;
pub mod view;

pub use aggregation::{Aggregation, Window};
pub use context::Context;
pub use key::{Key, KeyError, KeyKind};
pub use measure::{MeasureDescriptor, MeasureError, MeasureKind, MeasureValue, Measurement};
pub use tag::{Behavior, Mutation, TagSet, TagSetBuilder};
pub use value::Value;
pub use view::{ViewDescriptor, ViewError};
