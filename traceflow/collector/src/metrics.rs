use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use traceflow_metrics::{metrics, Counter, FmtMetrics};

metrics! {
    traceflow_spans_received_total: Counter {
        "Total number of spans received"
    },
    traceflow_spans_stored_total: Counter {
        "Total number of spans stored"
    },
    traceflow_span_errors_total: Counter {
        "Total number of span processing errors"
    }
}

/// Collector counters, shared by the submit path and the workers.
#[derive(Clone, Debug, Default)]
pub struct Metrics(Arc<Inner>);

#[derive(Debug, Default)]
struct Inner {
    received: Counter,
    stored: Counter,
    errors: Counter,
}

/// A point-in-time copy of the collector counters.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct Snapshot {
    pub spans_received: u64,
    pub spans_stored: u64,
    pub span_errors: u64,
}

/// Formats the collector counters for Prometheus exposition.
#[derive(Clone, Debug)]
pub struct Report(Metrics);

// === impl Metrics ===

impl Metrics {
    pub(crate) fn incr_received(&self) {
        self.0.received.incr();
    }

    pub(crate) fn incr_stored(&self) {
        self.0.stored.incr();
    }

    pub(crate) fn incr_errors(&self) {
        self.0.errors.incr();
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            spans_received: self.0.received.value(),
            spans_stored: self.0.stored.value(),
            span_errors: self.0.errors.value(),
        }
    }

    pub fn report(&self) -> Report {
        Report(self.clone())
    }
}

// === impl Report ===

impl FmtMetrics for Report {
    fn fmt_metrics(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = &(self.0).0;

        traceflow_spans_received_total.fmt_help(f)?;
        traceflow_spans_received_total.fmt_metric(f, &inner.received)?;

        traceflow_spans_stored_total.fmt_help(f)?;
        traceflow_spans_stored_total.fmt_metric(f, &inner.stored)?;

        traceflow_span_errors_total.fmt_help(f)?;
        traceflow_span_errors_total.fmt_metric(f, &inner.errors)?;

        Ok(())
    }
}
