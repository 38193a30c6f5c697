use super::fmt::FmtMetric;
use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing metric value.
///
/// Counters wrap to zero once the value overflows 2^53, since Prometheus
/// represents counters as 64-bit floats and `rate()`/`irate()` handle breaks
/// in monotonicity gracefully.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

// === impl Counter ===

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter by one.
    pub fn incr(&self) {
        self.add(1)
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Release);
    }

    pub fn value(&self) -> u64 {
        self.0
            .load(Ordering::Acquire)
            .wrapping_rem(crate::MAX_PRECISE_UINT64 + 1)
    }
}

impl From<u64> for Counter {
    fn from(n: u64) -> Self {
        Counter(n.into())
    }
}

impl From<Counter> for u64 {
    fn from(counter: Counter) -> u64 {
        counter.value()
    }
}

impl FmtMetric for Counter {
    const KIND: &'static str = "counter";

    fn fmt_metric<N: Display>(&self, f: &mut fmt::Formatter<'_>, name: N) -> fmt::Result {
        writeln!(f, "{} {}", name, self.value())
    }
}
