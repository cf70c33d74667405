use http::{HeaderMap, HeaderName, HeaderValue, Request};
use opentelemetry::{
    global,
    propagation::{Extractor, Injector},
};
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::{context, record::TrackingRecord};

/// Header carrying the tracking id to downstream services.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Read access to the headers of an inbound request.
pub trait HttpHeaderProvider {
    fn get(&self, key: &str) -> Option<&str>;

    fn keys(&self) -> impl Iterator<Item = &str>;
}

impl<T> HttpHeaderProvider for Request<T> {
    fn get(&self, key: &str) -> Option<&str> {
        self.headers().get(key).and_then(|h| h.to_str().ok())
    }

    fn keys(&self) -> impl Iterator<Item = &str> {
        self.headers().keys().map(|s| s.as_str())
    }
}

/// Injects the current tracking id and [`opentelemetry::Context`] into the
/// headers of an outbound [`Request`].
pub fn inject_tracking_into_request<T>(request: &mut Request<T>) -> &mut Request<T> {
    let otel_context = Span::current().context();

    let mut headers = HeaderInjector(request.headers_mut());
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(&otel_context, &mut headers)
    });
    if let Some(record) = context::current_tracking_record() {
        headers.set(REQUEST_ID_HEADER, record.req_id().to_string());
    }

    request
}

/// Builds the span of an inbound request. Its parent is the
/// [`opentelemetry::Context`] found in the request headers.
#[track_caller]
pub fn extract_request_span<H: HttpHeaderProvider>(request: &H, record: &TrackingRecord) -> Span {
    let context = global::get_text_map_propagator(|extractor| {
        extractor.extract(&RequestExtractor::new(request))
    });

    let span = tracing::info_span!("request", req_id = %record.req_id());
    span.set_parent(context);

    span
}

/// Writes propagation fields into a header map. Fields that are not valid
/// header names or values are skipped, the outbound request still goes out.
struct HeaderInjector<'a>(&'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        let Ok(key) = key.parse::<HeaderName>() else {
            tracing::debug!(%key, "skipping propagation field, invalid header name");
            return;
        };
        let Ok(value) = HeaderValue::try_from(value) else {
            tracing::debug!(%key, "skipping propagation field, invalid header value");
            return;
        };
        self.0.insert(key, value);
    }
}

struct RequestExtractor<'a, H> {
    request: &'a H,
}

impl<'a, H> RequestExtractor<'a, H> {
    pub fn new(request: &'a H) -> Self {
        RequestExtractor { request }
    }
}

impl<'a, H: HttpHeaderProvider> Extractor for RequestExtractor<'a, H> {
    fn get(&self, key: &str) -> Option<&str> {
        self.request.get(key)
    }

    fn keys(&self) -> Vec<&str> {
        self.request.keys().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::run_scoped_sync;

    #[test]
    fn injects_the_current_req_id() {
        let mut request = Request::builder().uri("/downstream").body(()).unwrap();

        run_scoped_sync(TrackingRecord::new("abc"), || {
            inject_tracking_into_request(&mut request);
        });

        assert_eq!(HttpHeaderProvider::get(&request, REQUEST_ID_HEADER), Some("abc"));
    }

    #[test]
    fn leaves_headers_alone_outside_a_cell() {
        let mut request = Request::builder().uri("/downstream").body(()).unwrap();
        inject_tracking_into_request(&mut request);

        assert!(request.headers().get(REQUEST_ID_HEADER).is_none());
    }

    #[test]
    fn skips_ids_that_are_not_header_values() {
        let mut request = Request::builder().uri("/downstream").body(()).unwrap();

        run_scoped_sync(TrackingRecord::new("line\nbreak"), || {
            inject_tracking_into_request(&mut request);
        });

        assert!(request.headers().get(REQUEST_ID_HEADER).is_none());
    }

    #[test]
    fn header_injector_overwrites_previous_values() {
        let mut headers = HeaderMap::new();
        let mut injector = HeaderInjector(&mut headers);
        injector.set(REQUEST_ID_HEADER, "first".to_string());
        injector.set(REQUEST_ID_HEADER, "second".to_string());
        injector.set("bad header", "ignored".to_string());

        assert_eq!(headers.len(), 1);
        assert_eq!(headers[REQUEST_ID_HEADER], "second");
    }

    #[test]
    fn extractor_sees_request_headers() {
        let request = Request::builder()
            .header("traceparent", "00-abc")
            .body(())
            .unwrap();
        let extractor = RequestExtractor::new(&request);

        assert_eq!(Extractor::get(&extractor, "traceparent"), Some("00-abc"));
        assert_eq!(extractor.keys(), vec!["traceparent"]);
    }
}
