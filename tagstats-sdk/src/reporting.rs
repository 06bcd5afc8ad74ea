//! The periodic reporting worker: wakes on a fixed cadence, collects every
//! registered view, and dispatches each snapshot to its subscribers.
//!
//! Grounded on the teacher's `PeriodicReader`: a dedicated thread driven by
//! `mpsc::Receiver::recv_timeout`, with `Flush`/`Shutdown` messages that
//! jump the queue ahead of the next scheduled tick.

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::subscription::SubscriptionTable;
use crate::view_engine::ViewEngine;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
const REPORTING_PERIOD_ENV: &str = "STATS_REPORTING_PERIOD_MS";
const FLUSH_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

enum Message {
    Flush(SyncSender<bool>),
    Shutdown(SyncSender<bool>),
    SetPeriod(Duration),
}

/// Resolve the reporting interval from an explicit override, then the
/// `STATS_REPORTING_PERIOD_MS` environment variable, then the built-in
/// default of 10 seconds.
pub(crate) fn resolve_interval(explicit: Option<Duration>) -> Duration {
    explicit
        .or_else(|| {
            env::var(REPORTING_PERIOD_ENV)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
        })
        .unwrap_or(DEFAULT_INTERVAL)
}

/// Drives the periodic collect-and-dispatch loop on a dedicated thread.
pub(crate) struct ReportingWorker {
    message_sender: Sender<Message>,
    handle: Option<JoinHandle<()>>,
    is_shutdown: AtomicBool,
}

impl std::fmt::Debug for ReportingWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportingWorker")
            .field("is_shutdown", &self.is_shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

impl ReportingWorker {
    pub(crate) fn spawn(
        view_engine: Arc<ViewEngine>,
        subscriptions: Arc<SubscriptionTable>,
        interval: Duration,
    ) -> Self {
        let (message_sender, message_receiver): (Sender<Message>, Receiver<Message>) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("tagstats-reporting".into())
            .spawn(move || run(view_engine, subscriptions, interval, message_receiver))
            .expect("failed to spawn tagstats reporting thread");

        ReportingWorker {
            message_sender,
            handle: Some(handle),
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// Change the reporting cadence. Takes effect starting with the next
    /// tick; any wait already in progress is cut short immediately.
    pub(crate) fn set_period(&self, period: Duration) -> bool {
        if self.is_shutdown.load(Ordering::Acquire) {
            return false;
        }
        self.message_sender.send(Message::SetPeriod(period)).is_ok()
    }

    /// Collect and dispatch immediately, out of band from the regular
    /// cadence, blocking until the ad-hoc pass completes or times out.
    pub(crate) fn force_flush(&self) -> bool {
        if self.is_shutdown.load(Ordering::Acquire) {
            return false;
        }
        let (tx, rx) = mpsc::sync_channel(1);
        if self.message_sender.send(Message::Flush(tx)).is_err() {
            return false;
        }
        rx.recv_timeout(FLUSH_RESPONSE_TIMEOUT).unwrap_or(false)
    }

    /// Perform one final collect-and-dispatch pass and stop the worker
    /// thread. Idempotent: a second call is a no-op returning `false`.
    pub(crate) fn shutdown(&mut self) -> bool {
        if self.is_shutdown.swap(true, Ordering::AcqRel) {
            return false;
        }
        let (tx, rx) = mpsc::sync_channel(1);
        let sent = self.message_sender.send(Message::Shutdown(tx)).is_ok();
        let ok = sent && rx.recv_timeout(FLUSH_RESPONSE_TIMEOUT).unwrap_or(false);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        ok
    }
}

impl Drop for ReportingWorker {
    fn drop(&mut self) {
        if !self.is_shutdown.load(Ordering::Acquire) {
            self.shutdown();
        }
    }
}

fn run(
    view_engine: Arc<ViewEngine>,
    subscriptions: Arc<SubscriptionTable>,
    interval: Duration,
    message_receiver: Receiver<Message>,
) {
    let mut interval = interval;
    let mut remaining = interval;
    let mut tick_start = Instant::now();

    loop {
        match message_receiver.recv_timeout(remaining) {
            Ok(Message::Flush(response)) => {
                collect_and_dispatch(&view_engine, &subscriptions);
                let _ = response.send(true);

                let elapsed = tick_start.elapsed();
                if elapsed < interval {
                    remaining = interval - elapsed;
                } else {
                    tick_start = Instant::now();
                    remaining = interval;
                }
            }
            Ok(Message::Shutdown(response)) => {
                collect_and_dispatch(&view_engine, &subscriptions);
                let _ = response.send(true);
                break;
            }
            Ok(Message::SetPeriod(period)) => {
                interval = period;
                tick_start = Instant::now();
                remaining = interval;
                tracing::debug!(?interval, "tagstats reporting period changed");
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                collect_and_dispatch(&view_engine, &subscriptions);
                tick_start = Instant::now();
                remaining = interval;
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::debug!("tagstats reporting worker stopped");
}

fn collect_and_dispatch(view_engine: &ViewEngine, subscriptions: &SubscriptionTable) {
    for snapshot in view_engine.force_collect() {
        subscriptions.dispatch(&snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_interval_prefers_explicit_override() {
        assert_eq!(
            resolve_interval(Some(Duration::from_millis(5))),
            Duration::from_millis(5)
        );
    }

    #[test]
    fn resolve_interval_falls_back_to_default() {
        // Assumes the env var is unset in the test process; CI runners
        // don't set it for arbitrary crates.
        if env::var(REPORTING_PERIOD_ENV).is_err() {
            assert_eq!(resolve_interval(None), DEFAULT_INTERVAL);
        }
    }

    #[test]
    fn set_period_is_rejected_after_shutdown() {
        let view_engine = Arc::new(ViewEngine::new());
        let subscriptions = Arc::new(SubscriptionTable::new());
        let mut worker = ReportingWorker::spawn(view_engine, subscriptions, Duration::from_secs(60));
        assert!(worker.set_period(Duration::from_millis(5)));
        assert!(worker.shutdown());
        assert!(!worker.set_period(Duration::from_millis(5)));
    }
}
