#![deny(rust_2018_idioms, clippy::disallowed_methods, clippy::disallowed_types)]
#![forbid(unsafe_code)]

//! Core span and trace records.
//!
//! A [`Span`] is a single unit of work reported by an instrumented service; a
//! [`Trace`] is the derived view over all spans sharing a trace ID. Spans
//! decode leniently (absent fields default) and are checked semantically by
//! [`Span::validate`], so a malformed span is a processing error rather than
//! a decode error.

pub mod ids;
pub mod nanos;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The set of recognized `span_kind` values, per W3C trace context.
pub const SPAN_KINDS: [&str; 5] = ["client", "server", "internal", "producer", "consumer"];

/// A single unit of work in a distributed trace.
///
/// Carries deployment metadata so that per-version performance can be
/// compared, and optional cost attribution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Span {
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub span_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent_span_id: String,

    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub operation_name: String,

    /// Wall-clock start, RFC3339 on the wire. The Unix epoch stands in for
    /// the unset value.
    #[serde(default = "zero_time")]
    pub start_time: DateTime<Utc>,
    /// Integer nanoseconds on the wire; signed so that a negative duration
    /// decodes and is rejected by validation.
    #[serde(default = "TimeDelta::zero", with = "nanos")]
    pub duration: TimeDelta,

    /// The role of this span: one of [`SPAN_KINDS`], or empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub span_kind: String,

    /// "ok" or "error".
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status_message: String,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deployment_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub git_sha: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub environment: String,

    #[serde(default, skip_serializing_if = "is_zero_cost")]
    pub cost: f64,

    #[serde(default, skip_serializing_if = "is_false")]
    pub has_profile: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub profile_id: String,
}

/// A complete trace assembled from all spans sharing a trace ID.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: String,
    pub spans: Vec<Span>,
    pub start_time: DateTime<Utc>,
    #[serde(with = "nanos")]
    pub duration: TimeDelta,

    /// Unique service names, sorted lexicographically.
    pub services: Vec<String>,

    /// Service name to deployment ID, for spans that reported one.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub deployments: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "is_zero_cost")]
    pub total_cost: f64,
    /// Service name to summed span cost.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub cost_breakdown: HashMap<String, f64>,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ValidationError {
    #[error("trace_id is required")]
    MissingTraceId,
    #[error("span_id is required")]
    MissingSpanId,
    #[error("service_name is required")]
    MissingServiceName,
    #[error("operation_name is required")]
    MissingOperationName,
    #[error("trace_id must be 32 hex characters")]
    InvalidTraceId,
    #[error("span_id must be 16 hex characters")]
    InvalidSpanId,
    #[error("duration cannot be negative")]
    NegativeDuration,
    #[error("start_time is required")]
    MissingStartTime,
    #[error("status must be 'ok' or 'error'")]
    InvalidStatus,
    #[error("span_kind must be one of: client, server, internal, producer, consumer")]
    InvalidSpanKind,
}

/// The sentinel for an unset wall-clock instant.
pub fn zero_time() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

fn is_zero_cost(cost: &f64) -> bool {
    *cost == 0.0
}

fn is_false(b: &bool) -> bool {
    !*b
}

// === impl Span ===

impl Span {
    /// Checks that the span has all required fields and valid values.
    ///
    /// Called before a span is stored to ensure data integrity.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.trace_id.is_empty() {
            return Err(ValidationError::MissingTraceId);
        }
        if self.span_id.is_empty() {
            return Err(ValidationError::MissingSpanId);
        }
        if self.service_name.is_empty() {
            return Err(ValidationError::MissingServiceName);
        }
        if self.operation_name.is_empty() {
            return Err(ValidationError::MissingOperationName);
        }

        if !ids::is_valid_trace_id(&self.trace_id) {
            return Err(ValidationError::InvalidTraceId);
        }
        if !ids::is_valid_span_id(&self.span_id) {
            return Err(ValidationError::InvalidSpanId);
        }

        if self.duration < TimeDelta::zero() {
            return Err(ValidationError::NegativeDuration);
        }
        if self.start_time == zero_time() {
            return Err(ValidationError::MissingStartTime);
        }

        if self.status != "ok" && self.status != "error" {
            return Err(ValidationError::InvalidStatus);
        }

        if !self.span_kind.is_empty() && !SPAN_KINDS.contains(&self.span_kind.as_str()) {
            return Err(ValidationError::InvalidSpanKind);
        }

        Ok(())
    }

    /// The instant this span ended.
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + self.duration
    }

    /// Whether this span represents a failed operation.
    pub fn is_error(&self) -> bool {
        self.status == "error"
    }

    /// Retrieves a tag value, or empty when unset.
    pub fn tag(&self, key: &str) -> &str {
        self.tags.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }
}

impl Default for Span {
    fn default() -> Self {
        Self {
            trace_id: String::new(),
            span_id: String::new(),
            parent_span_id: String::new(),
            service_name: String::new(),
            operation_name: String::new(),
            start_time: zero_time(),
            duration: TimeDelta::zero(),
            span_kind: String::new(),
            status: String::new(),
            status_message: String::new(),
            tags: HashMap::new(),
            deployment_id: String::new(),
            git_sha: String::new(),
            environment: String::new(),
            cost: 0.0,
            has_profile: false,
            profile_id: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_span() -> Span {
        Span {
            trace_id: ids::new_trace_id(),
            span_id: ids::new_span_id(),
            service_name: "frontend".to_string(),
            operation_name: "GET /checkout".to_string(),
            start_time: Utc::now(),
            duration: TimeDelta::milliseconds(100),
            status: "ok".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn validate_accepts_complete_span() {
        assert_eq!(valid_span().validate(), Ok(()));
    }

    #[test]
    fn validate_required_fields() {
        let mut s = valid_span();
        s.trace_id.clear();
        assert_eq!(s.validate(), Err(ValidationError::MissingTraceId));

        let mut s = valid_span();
        s.span_id.clear();
        assert_eq!(s.validate(), Err(ValidationError::MissingSpanId));

        let mut s = valid_span();
        s.service_name.clear();
        assert_eq!(s.validate(), Err(ValidationError::MissingServiceName));

        let mut s = valid_span();
        s.operation_name.clear();
        assert_eq!(s.validate(), Err(ValidationError::MissingOperationName));
    }

    #[test]
    fn validate_id_formats() {
        let mut s = valid_span();
        s.trace_id = "not-hex".to_string();
        assert_eq!(s.validate(), Err(ValidationError::InvalidTraceId));

        let mut s = valid_span();
        s.trace_id = "abc123".to_string();
        assert_eq!(s.validate(), Err(ValidationError::InvalidTraceId));

        let mut s = valid_span();
        s.span_id = "zzzzzzzzzzzzzzzz".to_string();
        assert_eq!(s.validate(), Err(ValidationError::InvalidSpanId));
    }

    #[test]
    fn validate_timing() {
        let mut s = valid_span();
        s.duration = TimeDelta::nanoseconds(-1);
        assert_eq!(s.validate(), Err(ValidationError::NegativeDuration));

        let mut s = valid_span();
        s.duration = TimeDelta::zero();
        assert_eq!(s.validate(), Ok(()));

        let mut s = valid_span();
        s.start_time = zero_time();
        assert_eq!(s.validate(), Err(ValidationError::MissingStartTime));
    }

    #[test]
    fn validate_status_and_kind() {
        let mut s = valid_span();
        s.status = "success".to_string();
        assert_eq!(s.validate(), Err(ValidationError::InvalidStatus));

        let mut s = valid_span();
        s.status = "error".to_string();
        s.status_message = "connection refused".to_string();
        assert_eq!(s.validate(), Ok(()));

        for kind in SPAN_KINDS {
            let mut s = valid_span();
            s.span_kind = kind.to_string();
            assert_eq!(s.validate(), Ok(()));
        }

        let mut s = valid_span();
        s.span_kind = "gateway".to_string();
        assert_eq!(s.validate(), Err(ValidationError::InvalidSpanKind));
    }

    #[test]
    fn end_time_adds_duration() {
        let mut s = valid_span();
        s.start_time = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        s.duration = TimeDelta::milliseconds(250);
        assert_eq!(
            s.end_time(),
            DateTime::from_timestamp(1_700_000_000, 250_000_000).unwrap()
        );
    }

    #[test]
    fn tags_round_trip() {
        let mut s = valid_span();
        assert_eq!(s.tag("missing"), "");
        s.set_tag("http.method", "GET");
        assert_eq!(s.tag("http.method"), "GET");
    }

    #[test]
    fn span_json_wire_format() {
        let mut s = valid_span();
        s.start_time = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        s.duration = TimeDelta::milliseconds(42);

        let json: serde_json::Value = serde_json::to_value(&s).unwrap();
        // Durations are integer nanoseconds; timestamps are RFC3339.
        assert_eq!(json["duration"], serde_json::json!(42_000_000i64));
        assert_eq!(json["start_time"], serde_json::json!("2023-11-14T22:13:20Z"));
        // Unset optional fields are omitted.
        assert!(json.get("parent_span_id").is_none());
        assert!(json.get("cost").is_none());
        assert!(json.get("has_profile").is_none());

        let back: Span = serde_json::from_value(json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn span_decodes_leniently() {
        // A bare object decodes; validation reports what is missing.
        let s: Span = serde_json::from_str("{}").unwrap();
        assert_eq!(s.validate(), Err(ValidationError::MissingTraceId));

        // Negative durations decode and fail validation, not decoding.
        let s: Span = serde_json::from_str(r#"{"duration": -5}"#).unwrap();
        assert_eq!(s.duration, TimeDelta::nanoseconds(-5));
    }
}
