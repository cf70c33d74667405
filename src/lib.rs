//! # Request tracking for logs
//! This crate ties every log line emitted while handling a request to a stable
//! identifier of that request, across every asynchronous continuation of the
//! handler, without threading the identifier through function signatures.
//!
//! ## Setup
//! The underlying `tracing` subscriber and the per-category thresholds are set
//! up using [`setup::setup`]. This should be the first call of any server
//! binary.
//!
//! ## Tracking
//! [`context::start_tracking`] derives a [`record::TrackingRecord`] from a raw
//! id, a field map or an inbound request, and runs the handler inside a
//! [`context::ContextCell`] holding it. Any code reachable from the handler,
//! including tasks spawned with [`context::spawn`] and handlers of bound
//! [`events::EventSource`]s, can read it back with
//! [`context::current_tracking_record`].
//!
//! ## Logging
//! [`get_logger`] hands out one cached [`NamedLogger`] per channel. Each
//! message is prefixed with the active tracking record:
//!
//! ```text
//! {"reqId":"5d41402abc4b2a76b9719d911017c592","user":"bob"} request finished
//! ```
//!
//! ## Http Propagation
//! [`http_injector`] forwards the tracking id and the OpenTelemetry context to
//! downstream services. When using `tower` based http frameworks like
//! [`axum`](https://docs.rs/axum/latest/axum), the middleware
//! `middleware::tower::TrackingLayer` gives every inbound request its own
//! tracking context; `middleware::actix::TrackingLayer` does the same for
//! actix-web.

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod http_injector;
pub mod logger;
pub mod middleware;
pub mod record;
pub mod request;
pub mod setup;

pub use config::Level;
pub use context::{current_tracking_record, run_scoped, start_tracking};
pub use error::{ConfigError, TrackingError};
pub use logger::{get_logger, NamedLogger};
pub use record::{derive_tracking_record, ReqId, TrackingInput, TrackingRecord};
