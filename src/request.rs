use std::{fmt, net::SocketAddr};

use http::Request;

use crate::{context::ContextCell, events::ConnectionInfo};

/// An inbound request that can be fingerprinted and whose event sources can be
/// bound to a tracking context.
pub trait RequestLike {
    /// Deterministic textual dump of the request.
    fn describe(&self) -> String;

    /// Binds the event sources hanging off this request to `cell`.
    fn bind_event_sources(&self, _cell: &ContextCell) {}
}

impl<B> RequestLike for Request<B> {
    fn describe(&self) -> String {
        let mut dump = RequestDump::new(self.method(), self.uri(), self.version());
        for (name, value) in self.headers() {
            dump.header(name.as_str(), value.as_bytes());
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

/// Line oriented request dump shared by the [`RequestLike`] implementations.
pub(crate) struct RequestDump(String);

impl RequestDump {
    pub(crate) fn new(
        method: impl fmt::Display,
        uri: impl fmt::Display,
        version: impl fmt::Debug,
    ) -> Self {
        RequestDump(format!("{method} {uri} {version:?}\n"))
    }

    pub(crate) fn header(&mut self, name: &str, value: &[u8]) {
        self.line(format_args!("{name}: {}", String::from_utf8_lossy(value)));
    }

    #[cfg_attr(not(feature = "actix"), allow(dead_code))]
    pub(crate) fn peer(&mut self, addr: SocketAddr) {
        self.line(format_args!("peer: {addr}"));
    }

    pub(crate) fn connection(&mut self, connection: &ConnectionInfo) {
        let serial = connection.serial();
        match connection.remote_addr() {
            Some(addr) => self.line(format_args!("connection: #{serial} from {addr}")),
            None => self.line(format_args!("connection: #{serial}")),
        }
    }

    fn line(&mut self, line: fmt::Arguments<'_>) {
        self.0.push_str(&line.to_string());
        self.0.push('\n');
    }

    pub(crate) fn finish(self) -> String {
        self.0
    }
}
