#![deny(rust_2018_idioms, clippy::disallowed_methods, clippy::disallowed_types)]
#![forbid(unsafe_code)]

//! Utilities for exposing metrics to Prometheus.

mod counter;
mod fmt;
mod serve;

pub use self::{
    counter::Counter,
    fmt::{FmtMetric, FmtMetrics, Metric},
    serve::Serve,
};

/// Declares `Metric` constants for a set of named metrics.
#[macro_export]
macro_rules! metrics {
    { $( $name:ident : $kind:ty { $help:expr } ),+ } => {
        $(
            #[allow(non_upper_case_globals)]
            const $name: $crate::Metric<'static, &str, $kind> =
                $crate::Metric {
                    name: stringify!($name),
                    help: $help,
                    _p: ::std::marker::PhantomData,
                };
        )+
    }
}

/// Largest `u64` that can fit without loss of precision in `f64` (2^53).
///
/// Prometheus models values as f64 (52-bit mantissa), so integer values over
/// 2^53 are not guaranteed to be exposed correctly.
pub(crate) const MAX_PRECISE_UINT64: u64 = 0x20_0000_0000_0000;
