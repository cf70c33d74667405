use std::task::{Context, Poll};

use http::Request;
use tower::Service;
use tower_layer::Layer;
use tracing::instrument::Instrumented;

use crate::{
    context::{ContextCell, Scoped},
    http_injector,
};

/// Runs route handlers inside a tracking context of their own.
///
/// Generally, the middleware should be used on every http route, this usually
/// means that it can be registered globally and in the last position, to be the
/// first to run, even before general logging layers.
///
/// The `TrackingLayer` will not log http requests. For that, use a
/// [`crate::NamedLogger`] inside the handlers.
///
/// ```ignore
/// let app = Router::new()
///     .route("/foo", get(|| async {}))
///     .route("/bar", get(|| async {}))
///     .layer(TrackingLayer);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackingLayer;

impl<S> Layer<S> for TrackingLayer {
    type Service = TrackingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        TrackingService { service }
    }
}

/// This service implements the tracking behavior
#[derive(Debug, Clone)]
pub struct TrackingService<S> {
    service: S,
}

impl<S, Body> Service<Request<Body>> for TrackingService<S>
where
    S: Service<Request<Body>>,
{
    type Error = S::Error;
    type Future = Instrumented<Scoped<S::Future>>;
    type Response = S::Response;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let cell = ContextCell::for_request(&request);
        let span = http_injector::extract_request_span(&request, cell.record());

        tracing::Instrument::instrument(cell.scope(self.service.call(request)), span)
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use tower::{service_fn, ServiceExt};

    use super::*;
    use crate::{
        context::current_tracking_record,
        events::{ConnectionEvent, ConnectionInfo},
        record::{fingerprint, ReqId},
    };

    async fn echo_req_id(_: Request<()>) -> Result<Option<ReqId>, Infallible> {
        tokio::task::yield_now().await;
        Ok(current_tracking_record().map(|record| record.req_id().clone()))
    }

    fn request(path: &str, connection: &ConnectionInfo) -> Request<()> {
        let mut request = Request::builder().uri(path).body(()).unwrap();
        request.extensions_mut().insert(connection.clone());
        request
    }

    #[tokio::test]
    async fn handler_sees_the_request_fingerprint() {
        let connection = ConnectionInfo::new(None);
        let req = request("/a", &connection);
        let expected = ReqId::Digest(fingerprint(&req));

        let seen = TrackingLayer
            .layer(service_fn(echo_req_id))
            .oneshot(req)
            .await
            .unwrap();

        assert_eq!(seen, Some(expected));
        assert!(current_tracking_record().is_none());
    }

    #[tokio::test]
    async fn connection_events_resolve_to_the_request() {
        let connection = ConnectionInfo::new(None);
        let req = request("/b", &connection);
        let expected = ReqId::Digest(fingerprint(&req));

        TrackingLayer
            .layer(service_fn(echo_req_id))
            .oneshot(req)
            .await
            .unwrap();

        let seen = std::sync::Arc::new(parking_lot::Mutex::new(None));
        let sink = std::sync::Arc::clone(&seen);
        connection.events().on(move |_| {
            *sink.lock() = current_tracking_record().map(|record| record.req_id().clone());
        });
        connection.events().emit(&ConnectionEvent::End);

        assert_eq!(*seen.lock(), Some(expected));
    }
}
