//! Tag sets: immutable, typed key/value maps carried in the ambient context.

use std::collections::BTreeMap;

use crate::encoding::{self, DecodeError};
use crate::key::Key;
use crate::value::Value;

/// How a [`Mutation`] should treat an already-present key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Insert only if the key is absent; a no-op if it is already present.
    Add,
    /// Overwrite only if the key is present; a no-op if it is absent.
    Replace,
    /// Unconditional upsert.
    AddOrReplace,
}

/// A single `(key, value, behavior)` triple applied by a [`TagSetBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    /// The key to mutate.
    pub key: Key,
    /// The value to apply, subject to `behavior`.
    pub value: Value,
    /// How the mutation interacts with an already-present value.
    pub behavior: Behavior,
}

/// Error surfaced when a mutation's value does not match its key's kind.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("value kind {value_kind} does not match key {key_name:?} kind {key_kind}")]
pub struct TypeMismatch {
    key_name: String,
    key_kind: crate::key::KeyKind,
    value_kind: crate::key::KeyKind,
}

/// An immutable mapping from [`Key`] to [`Value`], ordered by key name.
///
/// `TagSet`s are built once via [`TagSetBuilder`] and never mutated
/// afterwards; cloning is `O(n)` in the number of entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    entries: BTreeMap<Key, Value>,
}

impl TagSet {
    /// An empty tag set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The value bound to `key`, if any.
    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Iterate entries in canonical (key-name-sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether this tag set has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A fluent, validating builder for [`TagSet`]s.
#[derive(Debug, Clone, Default)]
pub struct TagSetBuilder {
    entries: BTreeMap<Key, Value>,
}

impl TagSetBuilder {
    /// Start with no entries.
    pub fn start_empty() -> Self {
        Self::default()
    }

    /// Start from a previously [`encoding::encode`]d byte sequence.
    ///
    /// Per the round-trip invariant, calling [`Self::build`] immediately
    /// after this with no further mutations reproduces the original
    /// `TagSet` bit-for-bit.
    pub fn start_from_encoded(bytes: &[u8]) -> Result<Self, DecodeError> {
        let tag_set = encoding::decode(bytes)?;
        Ok(Self {
            entries: tag_set.entries,
        })
    }

    /// Apply a mutation, validating that `value`'s kind matches `key`'s kind.
    pub fn upsert(
        mut self,
        key: Key,
        value: impl Into<Value>,
        behavior: Behavior,
    ) -> Result<Self, TypeMismatch> {
        let value = value.into();
        if value.kind() != key.kind() {
            return Err(TypeMismatch {
                key_name: key.name().to_owned(),
                key_kind: key.kind(),
                value_kind: value.kind(),
            });
        }
        match behavior {
            Behavior::Add => {
                self.entries.entry(key).or_insert(value);
            }
            Behavior::Replace => {
                if let Some(slot) = self.entries.get_mut(&key) {
                    *slot = value;
                }
            }
            Behavior::AddOrReplace => {
                self.entries.insert(key, value);
            }
        }
        Ok(self)
    }

    /// Apply a batch of mutations in order, short-circuiting on the first
    /// [`TypeMismatch`].
    pub fn apply_all(
        mut self,
        mutations: impl IntoIterator<Item = Mutation>,
    ) -> Result<Self, TypeMismatch> {
        for m in mutations {
            self = self.upsert(m.key, m.value, m.behavior)?;
        }
        Ok(self)
    }

    /// Finalize the builder into an immutable [`TagSet`].
    pub fn build(self) -> TagSet {
        TagSet {
            entries: self.entries,
        }
    }
}
