use super::FmtMetrics;
use bytes::Bytes;
use http_body_util::Full;
use std::io::Write;
use tracing::trace;

/// Serve Prometheus metrics.
#[derive(Debug, Clone)]
pub struct Serve<M> {
    metrics: M,
}

// === impl Serve ===

impl<M> Serve<M> {
    pub fn new(metrics: M) -> Self {
        Self { metrics }
    }
}

impl<M: FmtMetrics> Serve<M> {
    pub fn serve<B>(&self, _req: http::Request<B>) -> std::io::Result<http::Response<Full<Bytes>>> {
        let mut writer = Vec::<u8>::new();
        write!(&mut writer, "{}", self.metrics.as_display())?;
        trace!(bytes = writer.len(), "Formatted metrics");
        Ok(http::Response::builder()
            .header(http::header::CONTENT_TYPE, "text/plain")
            .body(Full::new(Bytes::from(writer)))
            .expect("Response must be valid"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{metrics, Counter, FmtMetrics};
    use std::fmt;

    metrics! {
        test_widgets_total: Counter { "Total number of widgets" }
    }

    struct Report(Counter);

    impl FmtMetrics for Report {
        fn fmt_metrics(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            test_widgets_total.fmt_help(f)?;
            test_widgets_total.fmt_metric(f, &self.0)
        }
    }

    #[test]
    fn text_exposition_format() {
        let report = Report(Counter::from(3));
        assert_eq!(
            format!("{}", report.as_display()),
            "# HELP test_widgets_total Total number of widgets\n\
             # TYPE test_widgets_total counter\n\
             test_widgets_total 3\n"
        );
    }

    #[test]
    fn serves_text_plain() {
        let serve = Serve::new(Report(Counter::new()));
        let rsp = serve
            .serve(http::Request::new(()))
            .expect("metrics must format");
        assert_eq!(rsp.status(), http::StatusCode::OK);
        assert_eq!(
            rsp.headers().get(http::header::CONTENT_TYPE).unwrap(),
            "text/plain"
        );
    }
}
