use bytes::Bytes;
use http::{header, StatusCode};
use http_body_util::Full;

static JSON_MIME: &str = "application/json";

pub(crate) fn json_rsp(val: &impl serde::Serialize) -> http::Response<Full<Bytes>> {
    mk_rsp(StatusCode::OK, val)
}

pub(crate) fn error_rsp(
    error: impl ToString,
    status: StatusCode,
) -> http::Response<Full<Bytes>> {
    mk_rsp(
        status,
        &serde_json::json!({
            "error": error.to_string(),
            "status": status.as_u16(),
        }),
    )
}

pub(crate) fn not_found() -> http::Response<Full<Bytes>> {
    http::Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Full::default())
        .expect("builder with known status code must not fail")
}

pub(crate) fn method_not_allowed() -> http::Response<Full<Bytes>> {
    http::Response::builder()
        .status(StatusCode::METHOD_NOT_ALLOWED)
        .body(Full::default())
        .expect("builder with known status code must not fail")
}

pub(crate) fn mk_rsp(
    status: StatusCode,
    val: &impl serde::Serialize,
) -> http::Response<Full<Bytes>> {
    match serde_json::to_vec(val) {
        Ok(json) => http::Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, JSON_MIME)
            .body(Full::new(Bytes::from(json)))
            .expect("builder with known status code must not fail"),
        Err(error) => {
            tracing::warn!(?error, "Failed to serialize JSON value");
            http::Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::from(format!(
                    "failed to serialize JSON value: {error}"
                ))))
                .expect("builder with known status code must not fail")
        }
    }
}
