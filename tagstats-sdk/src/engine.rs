//! The top-level stats engine: ties the measure registry, view engine,
//! subscriptions, and periodic reporting worker into a single handle.

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tagstats::{Context, MeasureDescriptor, MeasureValue, Measurement, TagSet, ViewDescriptor};

use crate::registry::{MeasureRegistry, MeasureRegistryError};
use crate::reporting::{self, ReportingWorker};
use crate::subscription::{SubscribeError, SubscriptionId, SubscriptionTable, DEFAULT_SUBSCRIBER_BUFFER};
use crate::view_engine::{ViewEngine, ViewEngineError, ViewSnapshot};

/// Builds a [`StatsEngine`] with an optional explicit reporting interval.
///
/// Without [`Self::with_reporting_interval`], the interval is taken from
/// the `STATS_REPORTING_PERIOD_MS` environment variable, falling back to
/// 10 seconds.
#[derive(Debug, Default)]
pub struct EngineBuilder {
    reporting_interval: Option<Duration>,
}

impl EngineBuilder {
    /// Start a new builder with no overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the periodic reporting cadence, ignoring any
    /// `STATS_REPORTING_PERIOD_MS` environment setting.
    pub fn with_reporting_interval(mut self, interval: Duration) -> Self {
        self.reporting_interval = Some(interval);
        self
    }

    /// Build the engine and start its reporting worker thread.
    pub fn build(self) -> StatsEngine {
        let measures = Arc::new(MeasureRegistry::new());
        let views = Arc::new(ViewEngine::new());
        let subscriptions = Arc::new(SubscriptionTable::new());
        let interval = reporting::resolve_interval(self.reporting_interval);
        let worker = ReportingWorker::spawn(views.clone(), subscriptions.clone(), interval);

        StatsEngine {
            measures,
            views,
            subscriptions,
            worker: std::sync::Mutex::new(worker),
        }
    }
}

/// The running in-process stats engine: a measure registry, a view engine,
/// a subscription table, and a reporting worker bundled behind one handle.
///
/// Cloning is not supported — share a `StatsEngine` behind an `Arc` if
/// multiple owners need it. Dropping it (or calling [`Self::shutdown`])
/// stops the reporting worker after one final collection pass.
#[derive(Debug)]
pub struct StatsEngine {
    measures: Arc<MeasureRegistry>,
    views: Arc<ViewEngine>,
    subscriptions: Arc<SubscriptionTable>,
    worker: std::sync::Mutex<ReportingWorker>,
}

impl StatsEngine {
    /// Start a new engine with default configuration.
    pub fn new() -> Self {
        EngineBuilder::new().build()
    }

    /// Register `measure`, returning the shared descriptor to record
    /// measurements against. Registering the same name with an identical
    /// definition again is a no-op that returns the existing descriptor.
    pub fn register_measure(
        &self,
        measure: MeasureDescriptor,
    ) -> Result<Arc<MeasureDescriptor>, MeasureRegistryError> {
        self.measures.register(measure)
    }

    /// Register `view`. The view's measure must already be registered.
    pub fn register_view(&self, view: ViewDescriptor) -> Result<(), ViewEngineError> {
        self.views.register(view, &self.measures)
    }

    /// Stop aggregating `view_name`. Already-collected data is discarded.
    pub fn unregister_view(&self, view_name: &str) -> Result<(), ViewEngineError> {
        self.views.unregister(view_name)
    }

    /// Record `value` against `measure`, tagged with the ambient context's
    /// current tag set (see [`tagstats::Context::current`]).
    pub fn record(
        &self,
        measure: &Arc<MeasureDescriptor>,
        value: impl Into<MeasureValue>,
    ) -> Result<(), tagstats::MeasureError> {
        let measurement = measure.measurement(value)?;
        self.record_measurement(measurement, Context::current().tagset());
        Ok(())
    }

    /// Record a pre-built [`Measurement`] against an explicit [`TagSet`],
    /// bypassing the ambient context. Used when the caller already holds
    /// the tag set it wants applied (e.g. a decoded RPC header).
    pub fn record_measurement(&self, measurement: Measurement, tag_set: TagSet) {
        self.views.record(&measurement, &tag_set, Instant::now());
    }

    /// A snapshot of `view_name`'s current aggregation state, independent
    /// of the periodic reporting cadence.
    pub fn retrieve_view(&self, view_name: &str) -> Option<ViewSnapshot> {
        self.views.retrieve(view_name)
    }

    /// Mark `view_name` retainable on demand even with no subscribers.
    /// This implementation always retains every registered view's
    /// aggregator state regardless of subscriber count, so this only
    /// validates that the view exists.
    pub fn force_collect(&self, view_name: &str) -> Result<(), ViewEngineError> {
        self.views.ensure_exists(view_name)
    }

    /// Subscribe to `view_name`'s periodic snapshots. The returned
    /// receiver fills at the engine's reporting cadence (or on
    /// [`Self::force_flush`]); a subscriber that falls behind has old
    /// snapshots dropped rather than delivery blocking the reporting
    /// worker.
    pub fn subscribe(&self, view_name: &str) -> (SubscriptionId, Receiver<ViewSnapshot>) {
        self.subscriptions
            .subscribe(view_name, DEFAULT_SUBSCRIBER_BUFFER)
    }

    /// Subscribe with an explicit channel buffer size.
    pub fn subscribe_with_buffer(
        &self,
        view_name: &str,
        buffer: usize,
    ) -> (SubscriptionId, Receiver<ViewSnapshot>) {
        self.subscriptions.subscribe(view_name, buffer)
    }

    /// Cancel a previously created subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<(), SubscribeError> {
        self.subscriptions.unsubscribe(id)
    }

    /// Change the periodic reporting cadence. Takes effect starting with
    /// the next tick. Clamped to a minimum of 1ms. Returns `false` if the
    /// engine has already been shut down.
    pub fn set_reporting_period(&self, period: Duration) -> bool {
        let period = period.max(Duration::from_millis(1));
        self.worker.lock().unwrap_or_else(|e| e.into_inner()).set_period(period)
    }

    /// Force an out-of-band collect-and-dispatch pass, independent of the
    /// reporting cadence. Blocks until the pass completes. Returns `false`
    /// if the engine has already been shut down.
    pub fn force_flush(&self) -> bool {
        self.worker.lock().unwrap_or_else(|e| e.into_inner()).force_flush()
    }

    /// Perform one final collect-and-dispatch pass and stop the reporting
    /// worker. Idempotent.
    pub fn shutdown(&self) -> bool {
        self.worker.lock().unwrap_or_else(|e| e.into_inner()).shutdown()
    }
}

impl Default for StatsEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagstats::{Aggregation, MeasureKind, Window};

    #[test]
    fn end_to_end_record_and_retrieve() {
        let engine = StatsEngine::new();
        let measure = engine
            .register_measure(MeasureDescriptor::new(
                "test/measure/engine_e2e",
                "desc",
                "1",
                MeasureKind::Int64,
            ))
            .unwrap();
        engine
            .register_view(ViewDescriptor::new(
                "test/view/engine_e2e",
                "desc",
                measure.name(),
                Vec::new(),
                Aggregation::count(),
                Window::cumulative(),
            ))
            .unwrap();

        engine.record(&measure, 1_i64).unwrap();
        engine.record(&measure, 1_i64).unwrap();

        let snapshot = engine.retrieve_view("test/view/engine_e2e").unwrap();
        assert_eq!(snapshot.rows.len(), 1);

        engine.shutdown();
    }

    #[test]
    fn force_collect_validates_the_view_exists() {
        let engine = StatsEngine::new();
        let measure = engine
            .register_measure(MeasureDescriptor::new(
                "test/measure/engine_force_collect",
                "desc",
                "1",
                MeasureKind::Int64,
            ))
            .unwrap();
        engine
            .register_view(ViewDescriptor::new(
                "test/view/engine_force_collect",
                "desc",
                measure.name(),
                Vec::new(),
                Aggregation::count(),
                Window::cumulative(),
            ))
            .unwrap();

        assert!(engine.force_collect("test/view/engine_force_collect").is_ok());
        assert!(matches!(
            engine.force_collect("test/view/no_such_view").unwrap_err(),
            ViewEngineError::NotFound { .. }
        ));

        engine.shutdown();
    }

    #[test]
    fn set_reporting_period_changes_the_worker_cadence() {
        let engine = EngineBuilder::new()
            .with_reporting_interval(Duration::from_secs(60))
            .build();
        let measure = engine
            .register_measure(MeasureDescriptor::new(
                "test/measure/engine_period",
                "desc",
                "1",
                MeasureKind::Int64,
            ))
            .unwrap();
        engine
            .register_view(ViewDescriptor::new(
                "test/view/engine_period",
                "desc",
                measure.name(),
                Vec::new(),
                Aggregation::count(),
                Window::cumulative(),
            ))
            .unwrap();
        let (_id, rx) = engine.subscribe("test/view/engine_period");

        assert!(engine.set_reporting_period(Duration::from_millis(20)));
        engine.record(&measure, 1_i64).unwrap();

        // With the 60s initial cadence this would never arrive in time;
        // it only does because set_reporting_period took effect.
        let snapshot = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(snapshot.view_name, "test/view/engine_period");

        engine.shutdown();
    }

    #[test]
    fn force_flush_delivers_to_subscribers() {
        let engine = StatsEngine::new();
        let measure = engine
            .register_measure(MeasureDescriptor::new(
                "test/measure/engine_flush",
                "desc",
                "1",
                MeasureKind::Int64,
            ))
            .unwrap();
        engine
            .register_view(ViewDescriptor::new(
                "test/view/engine_flush",
                "desc",
                measure.name(),
                Vec::new(),
                Aggregation::count(),
                Window::cumulative(),
            ))
            .unwrap();
        let (_id, rx) = engine.subscribe("test/view/engine_flush");

        engine.record(&measure, 1_i64).unwrap();
        assert!(engine.force_flush());

        let snapshot = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(snapshot.view_name, "test/view/engine_flush");

        engine.shutdown();
    }
}
