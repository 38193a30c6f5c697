use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use traceflow_model::nanos;

/// Search criteria for finding traces.
///
/// Every filter is optional: empty or zero values are ignored, and duration
/// and cost bounds apply only when greater than zero.
#[derive(Clone, Debug, Serialize)]
pub struct Query {
    /// Matches traces that include this service.
    pub service: String,

    #[serde(with = "nanos")]
    pub min_duration: TimeDelta,
    #[serde(with = "nanos")]
    pub max_duration: TimeDelta,

    pub min_cost: f64,
    pub max_cost: f64,

    /// Matches traces starting at or after this instant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Matches traces starting at or before this instant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    /// Declared for API compatibility; the filter does not consult it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_profile: Option<bool>,

    /// Maximum results to return; 0 disables the bound.
    pub limit: usize,
    /// Results to skip.
    pub offset: usize,
}

// === impl Query ===

impl Default for Query {
    fn default() -> Self {
        Self {
            service: String::new(),
            min_duration: TimeDelta::zero(),
            max_duration: TimeDelta::zero(),
            min_cost: 0.0,
            max_cost: 0.0,
            start_time: None,
            end_time: None,
            has_profile: None,
            limit: 100,
            offset: 0,
        }
    }
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn with_duration_range(mut self, min: TimeDelta, max: TimeDelta) -> Self {
        self.min_duration = min;
        self.max_duration = max;
        self
    }

    pub fn with_cost_range(mut self, min: f64, max: f64) -> Self {
        self.min_cost = min;
        self.max_cost = max;
        self
    }

    pub fn with_time_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    pub fn with_pagination(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}
