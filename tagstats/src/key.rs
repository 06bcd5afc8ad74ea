//! Typed, process-interned tag keys.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

/// The primitive type a [`Key`]'s values must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// UTF-8 string values.
    String,
    /// 64-bit signed integer values.
    Int64,
    /// 64-bit floating point values.
    Float64,
    /// Boolean values.
    Bool,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KeyKind::String => "string",
            KeyKind::Int64 => "int64",
            KeyKind::Float64 => "float64",
            KeyKind::Bool => "bool",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
struct KeyInner {
    name: Box<str>,
    kind: KeyKind,
}

/// A typed, globally-unique-by-name tag key.
///
/// Keys are cheap to clone (`Arc`-backed) and compare equal iff they were
/// produced by the same [`new_key`] call for the same name — since names are
/// unique within a process, comparing by name is equivalent to comparing by
/// identity.
#[derive(Clone)]
pub struct Key(Arc<KeyInner>);

impl Key {
    /// The key's name.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The key's value kind.
    pub fn kind(&self) -> KeyKind {
        self.0.kind
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("name", &self.0.name)
            .field("kind", &self.0.kind)
            .finish()
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.0.name == other.0.name && self.0.kind == other.0.kind
    }
}
impl Eq for Key {}

impl std::hash::Hash for Key {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.name.hash(state);
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Key {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.name.cmp(&other.0.name)
    }
}

/// Errors returned by [`new_key`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// A key with this name already exists with a different [`KeyKind`].
    #[error("key {name:?} already registered with kind {existing}, requested kind {requested}")]
    Conflict {
        /// The conflicting key's name.
        name: String,
        /// The kind the key was originally registered with.
        existing: KeyKind,
        /// The kind that was requested.
        requested: KeyKind,
    },
}

static KEY_REGISTRY: OnceLock<RwLock<HashMap<String, Key>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<String, Key>> {
    KEY_REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Create (or fetch) the process-wide [`Key`] for `name` with the given
/// [`KeyKind`].
///
/// Idempotent: calling this again with the same `(name, kind)` returns a
/// `Key` equal to the one already registered. Calling it with the same name
/// but a different kind is a [`KeyError::Conflict`].
pub fn new_key(name: impl Into<String>, kind: KeyKind) -> Result<Key, KeyError> {
    let name = name.into();

    if let Some(existing) = registry().read().unwrap_or_else(|e| e.into_inner()).get(&name) {
        return if existing.kind() == kind {
            Ok(existing.clone())
        } else {
            Err(KeyError::Conflict {
                name,
                existing: existing.kind(),
                requested: kind,
            })
        };
    }

    let mut write = registry().write().unwrap_or_else(|e| e.into_inner());
    // Re-check under the write lock: another thread may have inserted
    // between our read and this write.
    if let Some(existing) = write.get(&name) {
        return if existing.kind() == kind {
            Ok(existing.clone())
        } else {
            Err(KeyError::Conflict {
                name,
                existing: existing.kind(),
                requested: kind,
            })
        };
    }

    let key = Key(Arc::new(KeyInner {
        name: name.clone().into_boxed_str(),
        kind,
    }));
    write.insert(name, key.clone());
    tracing::debug!(key = %key.name(), kind = %kind, "registered tag key");
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent_for_same_kind() {
        let a = new_key("device_id", KeyKind::String).unwrap();
        let b = new_key("device_id", KeyKind::String).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn conflict_on_kind_mismatch() {
        new_key("conflict_test_key", KeyKind::String).unwrap();
        let err = new_key("conflict_test_key", KeyKind::Int64).unwrap_err();
        assert!(matches!(err, KeyError::Conflict { .. }));
    }

    #[test]
    fn distinct_names_are_distinct() {
        let a = new_key("key_a", KeyKind::String).unwrap();
        let b = new_key("key_b", KeyKind::String).unwrap();
        assert_ne!(a, b);
    }
}
