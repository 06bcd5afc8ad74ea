//! View descriptors: the declaration of how a measure's recorded values are
//! aggregated and sliced by tag key into a reportable stream.

use std::sync::Arc;

use crate::aggregation::{Aggregation, AggregationError, Window, WindowError};
use crate::key::Key;

/// The declaration of a view: which measure to aggregate, which tag keys to
/// slice by, and which [`Aggregation`]/[`Window`] combination to apply.
///
/// A `ViewDescriptor` is pure data; registering it against a running engine
/// (and enforcing name/measure/key uniqueness) is `tagstats-sdk`'s job.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewDescriptor {
    name: Arc<str>,
    description: Arc<str>,
    measure_name: Arc<str>,
    tag_keys: Vec<Key>,
    aggregation: Aggregation,
    window: Window,
}

/// Errors returned by [`ViewDescriptor::validate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ViewError {
    /// The view's aggregation failed [`Aggregation::validate`].
    #[error("view {name:?}: invalid aggregation: {source}")]
    InvalidAggregation {
        /// The offending view's name.
        name: String,
        /// The underlying aggregation error.
        #[source]
        source: AggregationError,
    },
    /// The view's window failed [`Window::validate`].
    #[error("view {name:?}: invalid window: {source}")]
    InvalidWindow {
        /// The offending view's name.
        name: String,
        /// The underlying window error.
        #[source]
        source: WindowError,
    },
    /// The same tag key was listed more than once in `tag_keys`.
    #[error("view {name:?}: duplicate tag key {key_name:?}")]
    DuplicateTagKey {
        /// The offending view's name.
        name: String,
        /// The repeated key's name.
        key_name: String,
    },
}

impl ViewDescriptor {
    /// Construct a new view descriptor. Does not validate; call
    /// [`Self::validate`] (the engine does this at registration time).
    pub fn new(
        name: impl Into<Arc<str>>,
        description: impl Into<Arc<str>>,
        measure_name: impl Into<Arc<str>>,
        tag_keys: impl Into<Vec<Key>>,
        aggregation: Aggregation,
        window: Window,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            measure_name: measure_name.into(),
            tag_keys: tag_keys.into(),
            aggregation,
            window,
        }
    }

    /// The view's name. Globally unique within an engine once registered.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A human-readable description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The name of the measure this view aggregates.
    pub fn measure_name(&self) -> &str {
        &self.measure_name
    }

    /// The tag keys this view slices by. An empty slice means the view
    /// reports a single, un-sliced stream.
    pub fn tag_keys(&self) -> &[Key] {
        &self.tag_keys
    }

    /// The base combinator applied to samples in each slice.
    pub fn aggregation(&self) -> &Aggregation {
        &self.aggregation
    }

    /// The time window samples remain visible for.
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Validate this descriptor's aggregation, window, and tag key list.
    pub fn validate(&self) -> Result<(), ViewError> {
        self.aggregation
            .validate()
            .map_err(|source| ViewError::InvalidAggregation {
                name: self.name.to_string(),
                source,
            })?;
        self.window
            .validate()
            .map_err(|source| ViewError::InvalidWindow {
                name: self.name.to_string(),
                source,
            })?;

        let mut seen = std::collections::HashSet::with_capacity(self.tag_keys.len());
        for key in &self.tag_keys {
            if !seen.insert(key.name()) {
                return Err(ViewError::DuplicateTagKey {
                    name: self.name.to_string(),
                    key_name: key.name().to_owned(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{new_key, KeyKind};

    #[test]
    fn rejects_duplicate_tag_keys() {
        let k = new_key("view_test_dup_key", KeyKind::String).unwrap();
        let view = ViewDescriptor::new(
            "test/view/dup",
            "desc",
            "test/measure",
            vec![k.clone(), k],
            Aggregation::count(),
            Window::cumulative(),
        );
        assert!(matches!(
            view.validate(),
            Err(ViewError::DuplicateTagKey { .. })
        ));
    }

    #[test]
    fn rejects_invalid_aggregation() {
        let view = ViewDescriptor::new(
            "test/view/bad_bounds",
            "desc",
            "test/measure",
            Vec::new(),
            Aggregation::distribution(vec![1.0, 0.0]),
            Window::cumulative(),
        );
        assert!(matches!(
            view.validate(),
            Err(ViewError::InvalidAggregation { .. })
        ));
    }

    #[test]
    fn accepts_well_formed_view() {
        let k = new_key("view_test_ok_key", KeyKind::String).unwrap();
        let view = ViewDescriptor::new(
            "test/view/ok",
            "desc",
            "test/measure",
            vec![k],
            Aggregation::distribution(vec![0.0, 1.0, 2.0]),
            Window::interval(std::time::Duration::from_secs(60), 4),
        );
        assert!(view.validate().is_ok());
    }
}
