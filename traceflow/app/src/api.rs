//! The collector's HTTP surface.
//!
//! * `POST /api/v1/spans` -- submit a single span; 202 on acceptance, 503
//!   under backpressure.
//! * `POST /api/v1/spans/batch` -- submit many spans; 206 when only some
//!   are accepted.
//! * `GET /api/v1/traces/{id}` -- retrieve an assembled trace.
//! * `GET /api/v1/traces` -- search traces by service, duration, cost, and
//!   time window.
//! * `GET /api/v1/services` -- list services that have reported spans.
//! * `GET /health` -- liveness plus collector counters.
//! * `GET /metrics` -- Prometheus text exposition.
//!
//! The router owns no business logic: it decodes requests, delegates to the
//! collector and store, and encodes responses.

mod json;

use crate::Error;
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use http::{header, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use traceflow_collector::{Collector, Report};
use traceflow_metrics::Serve;
use traceflow_model::Span;
use traceflow_store::{Query, Store};

const TRACE_PATH_PREFIX: &str = "/api/v1/traces/";

/// Routes collector API requests.
#[derive(Clone)]
pub struct Api {
    collector: Arc<Collector>,
    store: Arc<dyn Store>,
    metrics: Serve<Report>,
}

pub type ResponseFuture =
    Pin<Box<dyn Future<Output = Result<Response<Full<Bytes>>, Error>> + Send + 'static>>;

// === impl Api ===

impl Api {
    pub fn new(collector: Arc<Collector>, store: Arc<dyn Store>) -> Self {
        let metrics = Serve::new(collector.report());
        Self {
            collector,
            store,
            metrics,
        }
    }

    async fn route<B>(self, req: Request<B>) -> Result<Response<Full<Bytes>>, Error>
    where
        B: http_body::Body + Send,
        B::Error: Into<Error>,
    {
        if req.method() == Method::OPTIONS {
            // CORS preflight; headers are applied to every response below.
            return Ok(Response::builder()
                .status(StatusCode::OK)
                .body(Full::default())
                .expect("builder with known status code must not fail"));
        }

        let path = req.uri().path().to_string();
        match path.as_str() {
            "/api/v1/spans" => {
                if req.method() == Method::POST {
                    self.post_span(req).await
                } else {
                    Ok(json::method_not_allowed())
                }
            }

            "/api/v1/spans/batch" => {
                if req.method() == Method::POST {
                    self.post_spans_batch(req).await
                } else {
                    Ok(json::method_not_allowed())
                }
            }

            "/api/v1/traces" => {
                if req.method() == Method::GET {
                    self.find_traces(req.uri().query())
                } else {
                    Ok(json::method_not_allowed())
                }
            }

            "/api/v1/services" => {
                if req.method() == Method::GET {
                    self.get_services()
                } else {
                    Ok(json::method_not_allowed())
                }
            }

            "/health" => {
                if req.method() == Method::GET {
                    self.health()
                } else {
                    Ok(json::method_not_allowed())
                }
            }

            "/metrics" => {
                if req.method() == Method::GET {
                    Ok(self.metrics.serve(req)?)
                } else {
                    Ok(json::method_not_allowed())
                }
            }

            path if path.starts_with(TRACE_PATH_PREFIX) => {
                if req.method() == Method::GET {
                    let trace_id = path[TRACE_PATH_PREFIX.len()..].to_string();
                    self.get_trace(&trace_id)
                } else {
                    Ok(json::method_not_allowed())
                }
            }

            _ => Ok(json::not_found()),
        }
    }

    async fn post_span<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>, Error>
    where
        B: http_body::Body + Send,
        B::Error: Into<Error>,
    {
        let span: Span = match read_json(req).await {
            Ok(span) => span,
            Err(rsp) => return Ok(rsp),
        };

        match self.collector.submit(span) {
            Ok(()) => Ok(json::mk_rsp(
                StatusCode::ACCEPTED,
                &serde_json::json!({ "status": "accepted" }),
            )),
            Err(err) => {
                warn!(error = %err, "Failed to submit span");
                Ok(json::error_rsp(err, StatusCode::SERVICE_UNAVAILABLE))
            }
        }
    }

    async fn post_spans_batch<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>, Error>
    where
        B: http_body::Body + Send,
        B::Error: Into<Error>,
    {
        let spans: Vec<Span> = match read_json(req).await {
            Ok(spans) => spans,
            Err(rsp) => return Ok(rsp),
        };

        let total = spans.len();
        let mut accepted = 0;
        let mut failed = 0;
        for (index, span) in spans.into_iter().enumerate() {
            match self.collector.submit(span) {
                Ok(()) => accepted += 1,
                Err(err) => {
                    warn!(span.index = index, error = %err, "Failed to submit span in batch");
                    failed += 1;
                }
            }
        }

        let status = if failed > 0 {
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::ACCEPTED
        };
        Ok(json::mk_rsp(
            status,
            &serde_json::json!({
                "accepted": accepted,
                "failed": failed,
                "total": total,
            }),
        ))
    }

    fn get_trace(&self, trace_id: &str) -> Result<Response<Full<Bytes>>, Error> {
        if trace_id.is_empty() {
            return Ok(json::error_rsp("trace ID required", StatusCode::BAD_REQUEST));
        }

        match self.store.get_trace(trace_id) {
            Ok(Some(trace)) => Ok(json::json_rsp(&trace)),
            Ok(None) => Ok(json::error_rsp("trace not found", StatusCode::NOT_FOUND)),
            Err(err) => {
                error!(trace.id = trace_id, error = %err, "Failed to get trace");
                Ok(json::error_rsp(
                    "internal error",
                    StatusCode::INTERNAL_SERVER_ERROR,
                ))
            }
        }
    }

    fn find_traces(&self, raw_query: Option<&str>) -> Result<Response<Full<Bytes>>, Error> {
        let query = parse_query(raw_query);

        let start = Instant::now();
        let traces = match self.store.find_traces(&query) {
            Ok(traces) => traces,
            Err(err) => {
                error!(error = %err, "Failed to find traces");
                return Ok(json::error_rsp(
                    "internal error",
                    StatusCode::INTERNAL_SERVER_ERROR,
                ));
            }
        };
        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            results = traces.len(),
            "Query executed"
        );

        Ok(json::json_rsp(&serde_json::json!({
            "traces": traces,
            "total": traces.len(),
            "query": query,
        })))
    }

    fn get_services(&self) -> Result<Response<Full<Bytes>>, Error> {
        match self.store.services() {
            Ok(services) => Ok(json::json_rsp(&serde_json::json!({
                "total": services.len(),
                "services": services,
            }))),
            Err(err) => {
                error!(error = %err, "Failed to list services");
                Ok(json::error_rsp(
                    "internal error",
                    StatusCode::INTERNAL_SERVER_ERROR,
                ))
            }
        }
    }

    fn health(&self) -> Result<Response<Full<Bytes>>, Error> {
        let metrics = self.collector.metrics();
        Ok(json::json_rsp(&serde_json::json!({
            "status": "healthy",
            "spans_received": metrics.spans_received,
            "spans_stored": metrics.spans_stored,
            "span_errors": metrics.span_errors,
        })))
    }
}

impl<B> tower::Service<Request<B>> for Api
where
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Error>,
{
    type Response = Response<Full<Bytes>>;
    type Error = Error;
    type Future = ResponseFuture;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let api = self.clone();
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let start = Instant::now();

        Box::pin(async move {
            let mut rsp = api.route(req).await?;
            allow_cross_origin(rsp.headers_mut());
            info!(
                method = %method,
                path = %path,
                status = rsp.status().as_u16(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "HTTP request"
            );
            Ok(rsp)
        })
    }
}

/// Reads and decodes a JSON request body, or produces the error response.
async fn read_json<B, T>(req: Request<B>) -> Result<T, Response<Full<Bytes>>>
where
    B: http_body::Body + Send,
    B::Error: Into<Error>,
    T: serde::de::DeserializeOwned,
{
    let bytes = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            let err = err.into();
            warn!(error = %err, "Failed to read request body");
            return Err(json::error_rsp("failed to read body", StatusCode::BAD_REQUEST));
        }
    };

    serde_json::from_slice(&bytes).map_err(|err| {
        warn!(error = %err, "Failed to parse request JSON");
        json::error_rsp("invalid JSON", StatusCode::BAD_REQUEST)
    })
}

fn allow_cross_origin(headers: &mut http::HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        http::HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        http::HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        http::HeaderValue::from_static("Content-Type"),
    );
}

/// Parses recognized search parameters into a `Query`.
///
/// Unrecognized parameters and unparseable values are ignored, leaving the
/// corresponding filter unset.
fn parse_query(raw: Option<&str>) -> Query {
    let mut query = Query::new();
    let Some(raw) = raw else { return query };

    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        match &*key {
            "service" => {
                if !value.is_empty() {
                    query.service = value.into_owned();
                }
            }
            "min_duration" => {
                if let Some(d) = parse_duration(&value) {
                    query.min_duration = d;
                }
            }
            "max_duration" => {
                if let Some(d) = parse_duration(&value) {
                    query.max_duration = d;
                }
            }
            "min_cost" => {
                if let Ok(cost) = value.parse() {
                    query.min_cost = cost;
                }
            }
            "max_cost" => {
                if let Ok(cost) = value.parse() {
                    query.max_cost = cost;
                }
            }
            "start_time" => {
                if let Ok(t) = DateTime::parse_from_rfc3339(&value) {
                    query.start_time = Some(t.with_timezone(&Utc));
                }
            }
            "end_time" => {
                if let Ok(t) = DateTime::parse_from_rfc3339(&value) {
                    query.end_time = Some(t.with_timezone(&Utc));
                }
            }
            "limit" => {
                if let Ok(limit) = value.parse::<usize>() {
                    if limit > 0 {
                        query.limit = limit;
                    }
                }
            }
            "offset" => {
                if let Ok(offset) = value.parse::<usize>() {
                    query.offset = offset;
                }
            }
            _ => {}
        }
    }

    query
}

static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)?)(ns|us|µs|ms|s|m|h)$").expect("duration regex"));

/// Parses a duration literal such as `50ms`, `1.5s`, or `2m`.
fn parse_duration(s: &str) -> Option<TimeDelta> {
    let cap = DURATION_RE.captures(s.trim())?;
    let magnitude: f64 = cap[1].parse().ok()?;
    let nanos_per_unit: f64 = match &cap[2] {
        "ns" => 1.0,
        "us" | "µs" => 1e3,
        "ms" => 1e6,
        "s" => 1e9,
        "m" => 60.0 * 1e9,
        "h" => 3600.0 * 1e9,
        _ => return None,
    };
    Some(TimeDelta::nanoseconds((magnitude * nanos_per_unit) as i64))
}
