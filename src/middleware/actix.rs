use std::{future, future::Ready};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpRequest,
};
use tracing::instrument::Instrumented;

use crate::{
    context::{ContextCell, Scoped},
    events::ConnectionInfo,
    http_injector::{self, HttpHeaderProvider},
    request::{RequestDump, RequestLike},
};

/// Runs route handlers inside a tracking context of their own.
///
/// Generally, the middleware should be used on every http route, this usually
/// means that it can be registered globally and in the last position, to be the
/// first to run, even before general logging layers.
///
/// ```ignore
/// let app = App::new()
///     .route("/foo", web::get().to(foo))
///     .wrap(TrackingLayer);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackingLayer;

impl<S, B> Transform<S, ServiceRequest> for TrackingLayer
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = TrackingService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        future::ready(Ok(TrackingService { service }))
    }
}

/// This service implements the tracking behavior
pub struct TrackingService<S> {
    service: S,
}

impl<S, Body> Service<ServiceRequest> for TrackingService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<Body>, Error = Error>,
    S::Future: 'static,
    Body: 'static,
{
    type Error = Error;
    type Future = Instrumented<Scoped<S::Future>>;
    type Response = ServiceResponse<Body>;

    // This service is ready when its next service is ready
    forward_ready!(service);

    fn call(&self, request: ServiceRequest) -> Self::Future {
        let cell = ContextCell::for_request(request.request());
        let span = http_injector::extract_request_span(request.request(), cell.record());

        tracing::Instrument::instrument(cell.scope(self.service.call(request)), span)
    }
}

impl HttpHeaderProvider for HttpRequest {
    fn get(&self, key: &str) -> Option<&str> {
        self.headers().get(key).and_then(|x| x.to_str().ok())
    }

    fn keys(&self) -> impl Iterator<Item = &str> {
        self.headers().keys().map(|x| x.as_str())
    }
}

impl RequestLike for HttpRequest {
    fn describe(&self) -> String {
        let mut dump = RequestDump::new(self.method(), self.uri(), self.version());
        for (name, value) in self.headers() {
            dump.header(name.as_str(), value.as_bytes());
        }
        if let Some(peer) = self.peer_addr() {
            dump.peer(peer);
        }
        if let Some(connection) = self.extensions().get::<ConnectionInfo>() {
            dump.connection(connection);
        }
        dump.finish()
    }

    fn bind_event_sources(&self, cell: &ContextCell) {
        if let Some(connection) = self.extensions().get::<ConnectionInfo>() {
            crate::context::bind_external_event_source(cell, connection.events());
        }
    }
}
