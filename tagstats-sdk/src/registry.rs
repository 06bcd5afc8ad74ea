//! The engine's measure registry: enforces name-uniqueness for
//! [`MeasureDescriptor`]s recorded against a [`crate::StatsEngine`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tagstats::MeasureDescriptor;

/// Errors returned by [`MeasureRegistry::register`] and
/// [`MeasureRegistry::get`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MeasureRegistryError {
    /// A measure with this name is already registered with a different
    /// description, unit, or kind.
    #[error("measure {name:?} already registered with a different definition")]
    Conflict {
        /// The measure's name.
        name: String,
    },
    /// No measure with this name has been registered.
    #[error("no measure named {name:?} is registered")]
    NotFound {
        /// The measure's name.
        name: String,
    },
}

#[derive(Debug, Default)]
pub(crate) struct MeasureRegistry {
    measures: RwLock<HashMap<String, Arc<MeasureDescriptor>>>,
}

impl MeasureRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register `measure`, or return the already-registered descriptor if
    /// an equal one was registered before. Returns
    /// [`MeasureRegistryError::Conflict`] if the name is taken by a
    /// different definition.
    pub(crate) fn register(
        &self,
        measure: MeasureDescriptor,
    ) -> Result<Arc<MeasureDescriptor>, MeasureRegistryError> {
        let name = measure.name().to_owned();

        if let Some(existing) = self.measures.read().unwrap_or_else(|e| e.into_inner()).get(&name) {
            return if **existing == measure {
                Ok(existing.clone())
            } else {
                Err(MeasureRegistryError::Conflict { name })
            };
        }

        let mut write = self.measures.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = write.get(&name) {
            return if **existing == measure {
                Ok(existing.clone())
            } else {
                Err(MeasureRegistryError::Conflict { name })
            };
        }

        let measure = Arc::new(measure);
        write.insert(name.clone(), measure.clone());
        tracing::debug!(measure = %name, "registered measure");
        Ok(measure)
    }

    pub(crate) fn get(&self, name: &str) -> Result<Arc<MeasureDescriptor>, MeasureRegistryError> {
        self.measures
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| MeasureRegistryError::NotFound {
                name: name.to_owned(),
            })
    }
}
