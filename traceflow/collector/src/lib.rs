#![deny(rust_2018_idioms, clippy::disallowed_methods, clippy::disallowed_types)]
#![forbid(unsafe_code)]

//! Span ingestion.
//!
//! A [`Collector`] accepts spans into a bounded queue without blocking the
//! caller and persists them asynchronously from a pool of workers. Callers
//! see backpressure as an error rather than latency; acceptance is
//! best-effort, and spans that fail validation downstream are counted, not
//! surfaced.

mod metrics;

pub use self::metrics::{Metrics, Report, Snapshot};

use parking_lot::{Mutex, RwLock};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info, warn};
use traceflow_model::Span;
use traceflow_store::Store;

/// Collector configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of worker tasks draining the queue.
    pub workers: usize,
    /// Capacity of the pending-span queue.
    pub buffer: usize,
}

/// Receives spans and persists them via a worker pool.
pub struct Collector {
    store: Arc<dyn Store>,
    workers: usize,
    metrics: Metrics,

    /// The queue's send side. Taken on shutdown: a missing sender refuses
    /// new submissions, and dropping it closes the queue so workers drain
    /// and exit.
    tx: RwLock<Option<mpsc::Sender<Span>>>,
    /// The queue's receive side, taken by `start`.
    rx: Mutex<Option<mpsc::Receiver<Span>>>,
    /// Released when every worker has exited: workers hold clones of the
    /// send side and never send on it; `recv` yields `None` once the last
    /// clone drops.
    exited: Mutex<Option<mpsc::Receiver<Infallible>>>,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum SubmitError {
    /// The collector is shutting down and accepts no further spans.
    #[error("collector is stopping")]
    ShuttingDown,
    /// The queue is full; the caller may retry later.
    #[error("span queue full, try again later")]
    QueueFull,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ShutdownError {
    /// The drain deadline expired; spans still queued may be lost.
    #[error("shutdown deadline exceeded; queued spans may be lost")]
    DeadlineExceeded,
}

// === impl Config ===

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 10,
            buffer: 1000,
        }
    }
}

// === impl Collector ===

impl Collector {
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        let (tx, rx) = mpsc::channel(config.buffer);
        Self {
            store,
            workers: config.workers,
            metrics: Metrics::default(),
            tx: RwLock::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            exited: Mutex::new(None),
        }
    }

    /// Spawns the worker pool. Must be called once before spans are
    /// processed; submissions made earlier simply wait in the queue.
    pub fn start(&self) {
        let rx = match self.rx.lock().take() {
            Some(rx) => rx,
            None => {
                warn!("Collector workers already started");
                return;
            }
        };

        info!(workers = self.workers, "Starting collector workers");

        let (exited_tx, exited_rx) = mpsc::channel::<Infallible>(1);
        *self.exited.lock() = Some(exited_rx);

        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        for id in 0..self.workers {
            let store = self.store.clone();
            let metrics = self.metrics.clone();
            let rx = rx.clone();
            let exited = exited_tx.clone();
            tokio::spawn(async move {
                worker(id, store, rx, metrics).await;
                drop(exited);
            });
        }
    }

    /// Queues a span for asynchronous processing.
    ///
    /// Never blocks: a full queue is reported as [`SubmitError::QueueFull`]
    /// so the caller can shed load, and a stopped collector as
    /// [`SubmitError::ShuttingDown`].
    pub fn submit(&self, span: Span) -> Result<(), SubmitError> {
        let tx = self.tx.read();
        let tx = tx.as_ref().ok_or(SubmitError::ShuttingDown)?;
        match tx.try_send(span) {
            Ok(()) => {
                self.metrics.incr_received();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(SubmitError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SubmitError::ShuttingDown),
        }
    }

    /// Stops accepting spans, then waits up to `grace` for workers to drain
    /// the queue and exit.
    ///
    /// If the deadline expires first, spans still in the queue may be lost;
    /// this is deliberate, and the only error this method returns.
    pub async fn shutdown(&self, grace: Duration) -> Result<(), ShutdownError> {
        info!("Stopping collector");

        // Refuse further submissions and close the queue so workers see
        // end-of-stream once it is drained.
        self.tx.write().take();

        let exited = self.exited.lock().take();
        let Some(mut exited) = exited else {
            return Ok(());
        };

        match time::timeout(grace, exited.recv()).await {
            Ok(None) => {
                info!("All collector workers stopped gracefully");
                Ok(())
            }
            Ok(Some(never)) => match never {},
            Err(_) => {
                warn!("Shutdown deadline exceeded, some spans may be lost");
                Err(ShutdownError::DeadlineExceeded)
            }
        }
    }

    /// A point-in-time copy of the received/stored/error counters.
    pub fn metrics(&self) -> Snapshot {
        self.metrics.snapshot()
    }

    /// The counters in Prometheus-exposable form.
    pub fn report(&self) -> Report {
        self.metrics.report()
    }
}

/// Drains the queue until it is closed and empty.
async fn worker(
    id: usize,
    store: Arc<dyn Store>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Span>>>,
    metrics: Metrics,
) {
    debug!(worker.id = id, "Worker started");
    loop {
        let span = { rx.lock().await.recv().await };
        let Some(span) = span else {
            // Queue closed and fully drained.
            debug!(worker.id = id, "Worker exiting");
            return;
        };

        if let Err(error) = process(&*store, span) {
            warn!(worker.id = id, %error, "Failed to process span");
            metrics.incr_errors();
        } else {
            metrics.incr_stored();
        }
    }
}

/// Validates and persists a single span.
fn process(store: &dyn Store, span: Span) -> Result<(), traceflow_store::Error> {
    // The store validates as well; checking here fails fast with the
    // span's identifiers still on hand for the log line.
    span.validate()?;
    store.write_span(span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta};
    use traceflow_model::ids;
    use traceflow_store::{MemoryStore, Query};

    fn span(trace_id: &str, service: &str) -> Span {
        Span {
            trace_id: trace_id.to_string(),
            span_id: ids::new_span_id(),
            service_name: service.to_string(),
            operation_name: "op".to_string(),
            start_time: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            duration: TimeDelta::milliseconds(100),
            status: "ok".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn submitted_span_is_stored_and_queryable() {
        let store = Arc::new(MemoryStore::new(100));
        let collector = Collector::new(store.clone(), Config::default());
        collector.start();

        let trace_id = ids::new_trace_id();
        collector.submit(span(&trace_id, "frontend")).unwrap();
        collector
            .shutdown(Duration::from_secs(5))
            .await
            .expect("drain must complete");

        let trace = store.get_trace(&trace_id).unwrap().expect("trace");
        assert_eq!(trace.services, vec!["frontend"]);
        assert_eq!(trace.duration, TimeDelta::milliseconds(100));

        let metrics = collector.metrics();
        assert_eq!(metrics.spans_received, 1);
        assert_eq!(metrics.spans_stored, 1);
        assert_eq!(metrics.span_errors, 0);
    }

    #[tokio::test]
    async fn full_queue_signals_backpressure() {
        let store = Arc::new(MemoryStore::new(100));
        let collector = Collector::new(
            store,
            Config {
                workers: 2,
                buffer: 2,
            },
        );
        // Workers are not started, so the queue cannot drain.

        collector.submit(span(&ids::new_trace_id(), "a")).unwrap();
        collector.submit(span(&ids::new_trace_id(), "b")).unwrap();
        assert_eq!(
            collector.submit(span(&ids::new_trace_id(), "c")),
            Err(SubmitError::QueueFull)
        );

        // The failed submission does not count as received.
        assert_eq!(collector.metrics().spans_received, 2);
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_refused() {
        let store = Arc::new(MemoryStore::new(100));
        let collector = Collector::new(store, Config::default());
        collector.start();

        collector.shutdown(Duration::from_secs(5)).await.unwrap();
        assert_eq!(
            collector.submit(span(&ids::new_trace_id(), "late")),
            Err(SubmitError::ShuttingDown)
        );
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let store = Arc::new(MemoryStore::new(100));
        let collector = Collector::new(store, Config::default());
        collector.start();

        collector.shutdown(Duration::from_secs(5)).await.unwrap();
        collector.shutdown(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_drains_pending_spans() {
        let store = Arc::new(MemoryStore::new(100));
        let collector = Collector::new(
            store.clone(),
            Config {
                workers: 4,
                buffer: 100,
            },
        );
        collector.start();

        for _ in 0..10 {
            collector.submit(span(&ids::new_trace_id(), "svc")).unwrap();
        }
        collector
            .shutdown(Duration::from_secs(5))
            .await
            .expect("drain must complete");

        let metrics = collector.metrics();
        assert_eq!(metrics.spans_received, 10);
        assert_eq!(metrics.spans_stored, 10);
        assert_eq!(
            store
                .find_traces(&Query::new().with_pagination(0, 0))
                .unwrap()
                .len(),
            10
        );
    }

    #[tokio::test]
    async fn invalid_spans_are_counted_not_surfaced() {
        let store = Arc::new(MemoryStore::new(100));
        let collector = Collector::new(store, Config::default());
        collector.start();

        let mut bad = span(&ids::new_trace_id(), "svc");
        bad.status = "perhaps".to_string();
        collector.submit(bad).expect("submission itself succeeds");
        collector.shutdown(Duration::from_secs(5)).await.unwrap();

        let metrics = collector.metrics();
        assert_eq!(metrics.spans_received, 1);
        assert_eq!(metrics.spans_stored, 0);
        assert_eq!(metrics.span_errors, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shutdown_deadline_bounds_the_drain() {
        struct SlowStore;

        impl Store for SlowStore {
            fn write_span(&self, _: Span) -> Result<(), traceflow_store::Error> {
                std::thread::sleep(Duration::from_millis(100));
                Ok(())
            }
            fn get_trace(
                &self,
                _: &str,
            ) -> Result<Option<traceflow_model::Trace>, traceflow_store::Error> {
                Ok(None)
            }
            fn find_traces(
                &self,
                _: &Query,
            ) -> Result<Vec<traceflow_model::Trace>, traceflow_store::Error> {
                Ok(Vec::new())
            }
            fn services(&self) -> Result<Vec<String>, traceflow_store::Error> {
                Ok(Vec::new())
            }
            fn close(&self) -> Result<(), traceflow_store::Error> {
                Ok(())
            }
        }

        let collector = Collector::new(
            Arc::new(SlowStore),
            Config {
                workers: 1,
                buffer: 100,
            },
        );
        collector.start();

        for _ in 0..20 {
            collector.submit(span(&ids::new_trace_id(), "svc")).unwrap();
        }
        assert_eq!(
            collector.shutdown(Duration::from_millis(50)).await,
            Err(ShutdownError::DeadlineExceeded)
        );

        let metrics = collector.metrics();
        assert!(metrics.spans_stored < metrics.spans_received);
    }
}
