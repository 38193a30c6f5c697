#![deny(rust_2018_idioms, clippy::disallowed_methods, clippy::disallowed_types)]
#![forbid(unsafe_code)]

//! Trace storage.
//!
//! The [`Store`] trait is the capability set the collector and query layers
//! depend on; [`MemoryStore`] is the bounded in-memory implementation.

mod memory;
mod query;

pub use self::{memory::MemoryStore, query::Query};

use traceflow_model::{Span, Trace};

pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// Trace storage operations.
///
/// Implementations must be safe for concurrent use; all methods take `&self`
/// and the trait is object-safe so callers can hold an `Arc<dyn Store>`.
pub trait Store: Send + Sync {
    /// Validates and stores a single span, updating every index.
    fn write_span(&self, span: Span) -> Result<(), Error>;

    /// Retrieves a complete trace by ID, assembling all of its spans.
    ///
    /// Returns `Ok(None)` when the trace is unknown.
    fn get_trace(&self, trace_id: &str) -> Result<Option<Trace>, Error>;

    /// Searches for traces matching the query, newest first, paginated by
    /// `query.limit` and `query.offset`.
    fn find_traces(&self, query: &Query) -> Result<Vec<Trace>, Error>;

    /// All unique service names that have reported spans, sorted.
    fn services(&self) -> Result<Vec<String>, Error>;

    /// Cleanly shuts down the storage, flushing any pending writes.
    fn close(&self) -> Result<(), Error>;
}
