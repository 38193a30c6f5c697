use std::fmt::{self, Display};
use std::marker::PhantomData;

/// A single metric value that knows its Prometheus kind.
pub trait FmtMetric {
    /// The metric's `TYPE` in help messages.
    const KIND: &'static str;

    /// Writes a metric with the given name.
    fn fmt_metric<N: Display>(&self, f: &mut fmt::Formatter<'_>, name: N) -> fmt::Result;
}

/// Describes a metric statically.
///
/// Typically constructed via the `metrics!` macro.
pub struct Metric<'a, N: Display, M> {
    pub name: N,
    pub help: &'a str,
    pub _p: PhantomData<M>,
}

/// Formats a collection of metrics for Prometheus text exposition.
pub trait FmtMetrics {
    fn fmt_metrics(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;

    fn as_display(&self) -> DisplayMetrics<'_, Self>
    where
        Self: Sized,
    {
        DisplayMetrics(self)
    }
}

#[derive(Clone, Debug)]
pub struct DisplayMetrics<'a, M>(&'a M);

// === impl Metric ===

impl<'a, N: Display, M: FmtMetric> Metric<'a, N, M> {
    pub fn new(name: N, help: &'a str) -> Self {
        Self {
            name,
            help,
            _p: PhantomData,
        }
    }

    /// Writes the `# HELP` and `# TYPE` headers for this metric.
    pub fn fmt_help(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# HELP {} {}", self.name, self.help)?;
        writeln!(f, "# TYPE {} {}", self.name, M::KIND)?;
        Ok(())
    }

    /// Writes a metric value with this metric's name.
    pub fn fmt_metric(&self, f: &mut fmt::Formatter<'_>, metric: &M) -> fmt::Result {
        metric.fmt_metric(f, &self.name)
    }
}

// === impl FmtMetrics ===

impl<M: FmtMetrics> FmtMetrics for &M {
    fn fmt_metrics(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (*self).fmt_metrics(f)
    }
}

// === impl DisplayMetrics ===

impl<M: FmtMetrics> fmt::Display for DisplayMetrics<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt_metrics(f)
    }
}
