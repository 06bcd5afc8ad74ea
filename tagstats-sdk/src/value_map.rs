//! Sharded signature → aggregator table.
//!
//! Mirrors the teacher's `ValueMap<A>`: a lock-free fast path for
//! signatures already seen, a mutex-guarded slow path for first-sight
//! insertion (with a cardinality-limit overflow bucket), and an
//! `RwLock`-guarded lookup table kept in sync with the insertion-order map
//! so readers never block writers for longer than a hash lookup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Instant;

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use tagstats::{Aggregation, Key, TagSet, Value, Window};

use crate::aggregator::AggregatedValue;
use crate::window::WindowedAggregator;

/// Maximum distinct tag signatures a single view will track before
/// additional signatures are folded into the overflow bucket.
const CARDINALITY_LIMIT: usize = 2_000;

static OVERFLOW_SIGNATURE: Lazy<Signature> = Lazy::new(|| Signature(Vec::new()));

/// A canonicalized, hashable projection of a [`TagSet`] onto a view's
/// ordered tag key list: one slot per key, `None` if the tag set has no
/// value for that key.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Signature(Vec<Option<SigValue>>);

impl Signature {
    pub(crate) fn derive(tag_keys: &[Key], tag_set: &TagSet) -> Self {
        Signature(
            tag_keys
                .iter()
                .map(|k| tag_set.get(k).map(SigValue::from))
                .collect(),
        )
    }

    /// The tag set this signature corresponds to, reconstructed for
    /// reporting. `None` slots are omitted.
    pub(crate) fn to_tag_values(&self, tag_keys: &[Key]) -> Vec<(Key, Value)> {
        tag_keys
            .iter()
            .zip(self.0.iter())
            .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.to_value())))
            .collect()
    }
}

impl Eq for Signature {}

impl std::hash::Hash for Signature {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SigValue {
    String(String),
    Int64(i64),
    Float64Bits(u64),
    Bool(bool),
}

impl SigValue {
    fn to_value(&self) -> Value {
        match self {
            SigValue::String(s) => Value::String(s.clone()),
            SigValue::Int64(i) => Value::Int64(*i),
            SigValue::Float64Bits(bits) => Value::Float64(f64::from_bits(*bits)),
            SigValue::Bool(b) => Value::Bool(*b),
        }
    }
}

impl From<&Value> for SigValue {
    fn from(v: &Value) -> Self {
        match v {
            Value::String(s) => SigValue::String(s.clone()),
            Value::Int64(i) => SigValue::Int64(*i),
            Value::Float64(f) => SigValue::Float64Bits(f.to_bits()),
            Value::Bool(b) => SigValue::Bool(*b),
        }
    }
}

impl Eq for SigValue {}

impl std::hash::Hash for SigValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            SigValue::String(s) => s.hash(state),
            SigValue::Int64(i) => i.hash(state),
            SigValue::Float64Bits(b) => b.hash(state),
            SigValue::Bool(b) => b.hash(state),
        }
    }
}

/// The per-view table mapping each distinct tag signature to its own
/// [`WindowedAggregator`].
#[derive(Debug)]
pub(crate) struct ValueMap {
    aggregation: Aggregation,
    window: Window,
    table: RwLock<FxHashMap<Signature, std::sync::Arc<WindowedAggregator>>>,
    insertion_lock: Mutex<()>,
    overflowed: AtomicBool,
}

impl ValueMap {
    pub(crate) fn new(aggregation: Aggregation, window: Window) -> Self {
        ValueMap {
            aggregation,
            window,
            table: RwLock::new(FxHashMap::default()),
            insertion_lock: Mutex::new(()),
            overflowed: AtomicBool::new(false),
        }
    }

    /// Admit `value` for `signature`, creating a fresh aggregator on first
    /// sight. Once [`CARDINALITY_LIMIT`] distinct signatures have been
    /// created, further unseen signatures are folded into a shared
    /// overflow bucket and a one-time warning is logged.
    pub(crate) fn measure(&self, signature: Signature, value: f64, recorded_at: Instant) {
        if let Some(agg) = self.table.read().unwrap_or_else(|e| e.into_inner()).get(&signature) {
            agg.update(value, recorded_at);
            return;
        }

        let _guard = self.insertion_lock.lock().unwrap_or_else(|e| e.into_inner());
        // Re-check: another thread may have inserted while we waited for the lock.
        if let Some(agg) = self.table.read().unwrap_or_else(|e| e.into_inner()).get(&signature) {
            agg.update(value, recorded_at);
            return;
        }

        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        let effective_signature = if table.len() >= CARDINALITY_LIMIT && !table.contains_key(&signature) {
            if !self.overflowed.swap(true, Ordering::AcqRel) {
                tracing::warn!(
                    limit = CARDINALITY_LIMIT,
                    "view exceeded tag signature cardinality limit; folding into overflow bucket"
                );
            }
            OVERFLOW_SIGNATURE.clone()
        } else {
            signature
        };

        let agg = table
            .entry(effective_signature)
            .or_insert_with(|| std::sync::Arc::new(WindowedAggregator::new(&self.aggregation, &self.window)));
        agg.update(value, recorded_at);
    }

    /// A read-only snapshot of every tracked signature's current state.
    pub(crate) fn collect(&self) -> Vec<(Signature, Vec<AggregatedValue>)> {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        table
            .iter()
            .map(|(sig, agg)| (sig.clone(), agg.snapshot()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagstats::{Behavior, TagSetBuilder};

    #[test]
    fn distinct_signatures_get_distinct_aggregators() {
        let k = tagstats::key::new_key("value_map_test_key", tagstats::KeyKind::String).unwrap();
        let vm = ValueMap::new(Aggregation::count(), Window::cumulative());

        let ts_a = TagSetBuilder::start_empty()
            .upsert(k.clone(), "a", Behavior::AddOrReplace)
            .unwrap()
            .build();
        let ts_b = TagSetBuilder::start_empty()
            .upsert(k.clone(), "b", Behavior::AddOrReplace)
            .unwrap()
            .build();

        vm.measure(Signature::derive(&[k.clone()], &ts_a), 1.0, Instant::now());
        vm.measure(Signature::derive(&[k.clone()], &ts_a), 1.0, Instant::now());
        vm.measure(Signature::derive(&[k.clone()], &ts_b), 1.0, Instant::now());

        let collected = vm.collect();
        assert_eq!(collected.len(), 2);
        for (sig, snapshot) in collected {
            let values = sig.to_tag_values(&[k.clone()]);
            let expected = if values[0].1 == Value::String("a".into()) {
                2
            } else {
                1
            };
            assert_eq!(snapshot, vec![AggregatedValue::Count(expected)]);
        }
    }

    #[test]
    fn same_signature_reuses_the_same_aggregator() {
        let k = tagstats::key::new_key("value_map_reuse_key", tagstats::KeyKind::String).unwrap();
        let vm = ValueMap::new(Aggregation::count(), Window::cumulative());
        let ts = TagSetBuilder::start_empty()
            .upsert(k.clone(), "same", Behavior::AddOrReplace)
            .unwrap()
            .build();

        for _ in 0..5 {
            vm.measure(Signature::derive(&[k.clone()], &ts), 1.0, Instant::now());
        }

        let collected = vm.collect();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].1, vec![AggregatedValue::Count(5)]);
    }
}
