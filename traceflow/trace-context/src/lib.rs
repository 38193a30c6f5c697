#![deny(rust_2018_idioms, clippy::disallowed_methods, clippy::disallowed_types)]
#![forbid(unsafe_code)]

//! W3C trace context propagation.
//!
//! The `traceparent` header carries `version-trace_id-parent_id-flags`, e.g.
//! `00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`.
//! <https://www.w3.org/TR/trace-context-1/>

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// The `traceparent` header name.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// The `tracestate` header name.
pub const TRACESTATE_HEADER: &str = "tracestate";

const VERSION_00: &str = "00";
const FLAGS_SAMPLED: &str = "01";

static TRACEPARENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9a-f]{2})-([0-9a-f]{32})-([0-9a-f]{16})-([0-9a-f]{2})$")
        .expect("traceparent regex")
});

/// A parsed W3C trace context.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TraceContext {
    pub version: String,
    pub trace_id: String,
    pub span_id: String,
    pub flags: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ContextError {
    #[error("traceparent header is empty")]
    Empty,
    #[error("invalid traceparent format: {0}")]
    Malformed(String),
}

// === impl TraceContext ===

impl TraceContext {
    pub fn is_sampled(&self) -> bool {
        u8::from_str_radix(&self.flags, 16)
            .map(|flags| flags & 1 == 1)
            .unwrap_or(false)
    }
}

/// Formats a `traceparent` header value.
///
/// The version is always "00"; empty flags default to "01" (sampled).
pub fn encode(trace_id: &str, span_id: &str, flags: &str) -> String {
    let flags = if flags.is_empty() {
        FLAGS_SAMPLED
    } else {
        flags
    };
    format!("{VERSION_00}-{trace_id}-{span_id}-{flags}")
}

/// Parses a `traceparent` header value.
pub fn decode(header: &str) -> Result<TraceContext, ContextError> {
    if header.is_empty() {
        return Err(ContextError::Empty);
    }

    let caps = TRACEPARENT_RE
        .captures(header)
        .ok_or_else(|| ContextError::Malformed(header.to_string()))?;

    Ok(TraceContext {
        version: caps[1].to_string(),
        trace_id: caps[2].to_string(),
        span_id: caps[3].to_string(),
        flags: caps[4].to_string(),
    })
}

/// Whether a header value is a well-formed traceparent.
pub fn is_valid(header: &str) -> bool {
    TRACEPARENT_RE.is_match(header)
}

#[test]
fn traceparent_parsed_successfully() {
    let input = "00-94d7f6ec6b95f3e916179cb6cfd01390-55ccfce77f972614-01";
    let context = decode(input).expect("well-formed header must parse");
    assert_eq!(context.version, "00");
    assert_eq!(context.trace_id, "94d7f6ec6b95f3e916179cb6cfd01390");
    assert_eq!(context.span_id, "55ccfce77f972614");
    assert_eq!(context.flags, "01");
    assert!(context.is_sampled());
}

#[test]
fn traceparent_round_trip() {
    let encoded = encode("94d7f6ec6b95f3e916179cb6cfd01390", "55ccfce77f972614", "01");
    let context = decode(&encoded).unwrap();
    assert_eq!(context.trace_id, "94d7f6ec6b95f3e916179cb6cfd01390");
    assert_eq!(context.span_id, "55ccfce77f972614");
    assert_eq!(context.flags, "01");
    assert_eq!(encode(&context.trace_id, &context.span_id, &context.flags), encoded);
}

#[test]
fn traceparent_default_flags() {
    let encoded = encode("94d7f6ec6b95f3e916179cb6cfd01390", "55ccfce77f972614", "");
    assert!(encoded.ends_with("-01"));
    assert!(decode(&encoded).unwrap().is_sampled());
}

#[test]
fn traceparent_invalid_lengths() {
    // Trace ID one nibble long.
    let input = "00-94d7f6ec6b95f3e916179cb6cfd013901-55ccfce77f972614-01";
    assert!(decode(input).is_err());
    assert!(!is_valid(input));

    // Span ID truncated.
    let input = "00-94d7f6ec6b95f3e916179cb6cfd01390-55ccfce77f9726-01";
    assert!(decode(input).is_err());

    // Flags too wide.
    let input = "00-94d7f6ec6b95f3e916179cb6cfd01390-55ccfce77f972614-011";
    assert!(decode(input).is_err());

    // Missing flags entirely.
    let input = "00-94d7f6ec6b95f3e916179cb6cfd01390-55ccfce77f972614";
    assert!(decode(input).is_err());
}

#[test]
fn traceparent_invalid_hex() {
    let input = "00-94d7f6ec6b95f3e916179cb6cfd0139g-55ccfce77f972614-01";
    assert_eq!(
        decode(input),
        Err(ContextError::Malformed(input.to_string()))
    );

    assert_eq!(decode(""), Err(ContextError::Empty));
}

#[test]
fn unsampled_flags() {
    let context = decode("00-94d7f6ec6b95f3e916179cb6cfd01390-55ccfce77f972614-00").unwrap();
    assert!(!context.is_sampled());
}
