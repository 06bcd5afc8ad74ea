//! The view engine: registration, measurement admission, and snapshot
//! retrieval for [`ViewDescriptor`]s.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use tagstats::{Measurement, TagSet, ViewDescriptor, ViewError};

use crate::aggregator::AggregatedValue;
use crate::registry::MeasureRegistry;
use crate::value_map::{Signature, ValueMap};

/// Errors returned while registering or looking up views.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ViewEngineError {
    /// The view descriptor itself was malformed.
    #[error(transparent)]
    InvalidView(#[from] ViewError),
    /// A view with this name is already registered.
    #[error("view {name:?} already registered")]
    DuplicateName {
        /// The duplicated view name.
        name: String,
    },
    /// The view's measure has not been registered with the engine.
    #[error("view {view_name:?} references unregistered measure {measure_name:?}")]
    UnknownMeasure {
        /// The view's name.
        view_name: String,
        /// The unregistered measure's name.
        measure_name: String,
    },
    /// No view with this name is registered.
    #[error("no view named {name:?} is registered")]
    NotFound {
        /// The requested view name.
        name: String,
    },
}

struct RegisteredView {
    descriptor: ViewDescriptor,
    value_map: ValueMap,
}

/// A point-in-time view snapshot: one row per distinct tag signature seen.
#[derive(Debug, Clone)]
pub struct ViewSnapshot {
    /// The view this snapshot belongs to.
    pub view_name: String,
    /// One entry per distinct combination of the view's tag keys observed
    /// so far, each paired with its aggregated value(s). A view with
    /// [`tagstats::Window::MultiInterval`] carries one [`AggregatedValue`]
    /// per configured duration, in declaration order; all others carry one.
    pub rows: Vec<(Vec<(tagstats::Key, tagstats::Value)>, Vec<AggregatedValue>)>,
}

#[derive(Default)]
pub(crate) struct ViewEngine {
    views: RwLock<HashMap<String, Arc<RegisteredView>>>,
    by_measure: RwLock<HashMap<String, Vec<String>>>,
}

impl ViewEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(
        &self,
        descriptor: ViewDescriptor,
        measures: &MeasureRegistry,
    ) -> Result<(), ViewEngineError> {
        descriptor.validate()?;

        let name = descriptor.name().to_owned();
        if self.views.read().unwrap_or_else(|e| e.into_inner()).contains_key(&name) {
            return Err(ViewEngineError::DuplicateName { name });
        }

        measures
            .get(descriptor.measure_name())
            .map_err(|_| ViewEngineError::UnknownMeasure {
                view_name: name.clone(),
                measure_name: descriptor.measure_name().to_owned(),
            })?;

        let value_map = ValueMap::new(descriptor.aggregation().clone(), descriptor.window().clone());
        let measure_name = descriptor.measure_name().to_owned();
        let registered = Arc::new(RegisteredView {
            descriptor,
            value_map,
        });

        self.views
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.clone(), registered);
        self.by_measure
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(measure_name)
            .or_default()
            .push(name.clone());

        tracing::info!(view = %name, "registered view");
        Ok(())
    }

    pub(crate) fn unregister(&self, name: &str) -> Result<(), ViewEngineError> {
        let removed = self
            .views
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
            .ok_or_else(|| ViewEngineError::NotFound {
                name: name.to_owned(),
            })?;

        if let Some(names) = self
            .by_measure
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(removed.descriptor.measure_name())
        {
            names.retain(|n| n != name);
        }
        Ok(())
    }

    /// Route `measurement`, admitted alongside `tag_set`, to every view
    /// registered against its measure.
    pub(crate) fn record(&self, measurement: &Measurement, tag_set: &TagSet, recorded_at: Instant) {
        let view_names = {
            let by_measure = self.by_measure.read().unwrap_or_else(|e| e.into_inner());
            by_measure
                .get(measurement.measure.name())
                .cloned()
                .unwrap_or_default()
        };
        if view_names.is_empty() {
            return;
        }

        let views = self.views.read().unwrap_or_else(|e| e.into_inner());
        let value = measurement.value.as_f64();
        for name in view_names {
            if let Some(view) = views.get(&name) {
                let signature = Signature::derive(view.descriptor.tag_keys(), tag_set);
                view.value_map.measure(signature, value, recorded_at);
            }
        }
    }

    /// A snapshot of `name`, or [`None`] if no such view is registered.
    pub(crate) fn retrieve(&self, name: &str) -> Option<ViewSnapshot> {
        let views = self.views.read().unwrap_or_else(|e| e.into_inner());
        let view = views.get(name)?;
        Some(Self::snapshot_of(view))
    }

    /// A snapshot of every registered view.
    pub(crate) fn force_collect(&self) -> Vec<ViewSnapshot> {
        let views = self.views.read().unwrap_or_else(|e| e.into_inner());
        views.values().map(|v| Self::snapshot_of(v)).collect()
    }

    /// Confirm `name` is registered. This implementation always retains
    /// aggregator state for every registered view regardless of
    /// subscribers, so marking a view "retainable on demand" reduces to
    /// checking it exists.
    pub(crate) fn ensure_exists(&self, name: &str) -> Result<(), ViewEngineError> {
        let views = self.views.read().unwrap_or_else(|e| e.into_inner());
        if views.contains_key(name) {
            Ok(())
        } else {
            Err(ViewEngineError::NotFound {
                name: name.to_owned(),
            })
        }
    }

    fn snapshot_of(view: &RegisteredView) -> ViewSnapshot {
        let tag_keys = view.descriptor.tag_keys();
        let rows = view
            .value_map
            .collect()
            .into_iter()
            .map(|(sig, values)| (sig.to_tag_values(tag_keys), values))
            .collect();
        ViewSnapshot {
            view_name: view.descriptor.name().to_owned(),
            rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagstats::{Aggregation, MeasureDescriptor, MeasureKind, Window};

    fn setup() -> (MeasureRegistry, ViewEngine, Arc<MeasureDescriptor>) {
        let measures = MeasureRegistry::new();
        let measure = measures
            .register(MeasureDescriptor::new(
                "test/measure/view_engine",
                "desc",
                "1",
                MeasureKind::Int64,
            ))
            .unwrap();
        (measures, ViewEngine::new(), measure)
    }

    #[test]
    fn record_updates_only_views_for_the_matching_measure() {
        let (measures, engine, measure) = setup();
        engine
            .register(
                ViewDescriptor::new(
                    "test/view/matching",
                    "desc",
                    measure.name(),
                    Vec::new(),
                    Aggregation::count(),
                    Window::cumulative(),
                ),
                &measures,
            )
            .unwrap();

        let m = measure.measurement(1_i64).unwrap();
        engine.record(&m, &TagSet::empty(), Instant::now());

        let snapshot = engine.retrieve("test/view/matching").unwrap();
        assert_eq!(snapshot.rows.len(), 1);
        assert_eq!(snapshot.rows[0].1, vec![AggregatedValue::Count(1)]);
    }

    #[test]
    fn duplicate_view_name_is_rejected() {
        let (measures, engine, measure) = setup();
        let view = || {
            ViewDescriptor::new(
                "test/view/dup",
                "desc",
                measure.name(),
                Vec::new(),
                Aggregation::count(),
                Window::cumulative(),
            )
        };
        engine.register(view(), &measures).unwrap();
        let err = engine.register(view(), &measures).unwrap_err();
        assert!(matches!(err, ViewEngineError::DuplicateName { .. }));
    }

    #[test]
    fn ensure_exists_reports_not_found_for_unregistered_views() {
        let (_measures, engine, _measure) = setup();
        assert!(matches!(
            engine.ensure_exists("test/view/nope").unwrap_err(),
            ViewEngineError::NotFound { .. }
        ));
    }

    #[test]
    fn unknown_measure_is_rejected() {
        let (measures, engine, _measure) = setup();
        let err = engine
            .register(
                ViewDescriptor::new(
                    "test/view/unknown_measure",
                    "desc",
                    "no/such/measure",
                    Vec::new(),
                    Aggregation::count(),
                    Window::cumulative(),
                ),
                &measures,
            )
            .unwrap_err();
        assert!(matches!(err, ViewEngineError::UnknownMeasure { .. }));
    }
}
