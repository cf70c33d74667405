//! Event sources whose handlers run inside a tracking context even when the
//! event is fired by code outside of it, e.g. a transport layer delivering
//! bytes for a connection.

use std::{
    fmt,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;

use crate::context::{self, ContextCell};

/// Something that can be associated with a [`ContextCell`].
pub trait EventSource {
    /// Associates `cell` with this source, replacing any previous binding.
    fn bind_context(&self, cell: ContextCell);
}

impl<T: EventSource + ?Sized> EventSource for Arc<T> {
    fn bind_context(&self, cell: ContextCell) {
        (**self).bind_context(cell);
    }
}

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle of a registered handler, see [`Emitter::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener<E> {
    id: ListenerId,
    handler: Handler<E>,
    registered_in: Option<ContextCell>,
    once: bool,
}

impl<E> Clone for Listener<E> {
    fn clone(&self) -> Self {
        Listener {
            id: self.id,
            handler: Arc::clone(&self.handler),
            registered_in: self.registered_in.clone(),
            once: self.once,
        }
    }
}

/// A minimal event emitter.
///
/// A handler runs inside the cell that was active when it was registered. A
/// handler registered outside of any cell runs inside the cell the emitter is
/// bound to, if any.
///
/// Each emit runs a snapshot of the handlers taken when it starts, so emits may
/// nest or race from several threads.
pub struct Emitter<E> {
    listeners: Mutex<Vec<Listener<E>>>,
    bound: Mutex<Option<ContextCell>>,
    next_id: AtomicU64,
}

impl<E> Emitter<E> {
    pub fn new() -> Self {
        Emitter {
            listeners: Mutex::new(Vec::new()),
            bound: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn on<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(Arc::new(handler), false)
    }

    /// Registers a handler that is removed before it runs for the first time.
    pub fn once<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(Arc::new(handler), true)
    }

    /// Removes a handler, releasing the cell it was registered in. Returns
    /// whether it was still registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|listener| listener.id != id);
        listeners.len() != before
    }

    fn register(&self, handler: Handler<E>, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push(Listener {
            id,
            handler,
            registered_in: context::current_cell(),
            once,
        });
        id
    }

    /// Runs every handler for `event` and returns how many ran.
    pub fn emit(&self, event: &E) -> usize {
        let bound = self.bound.lock().clone();
        let snapshot = {
            let mut listeners = self.listeners.lock();
            let snapshot = listeners.clone();
            listeners.retain(|listener| !listener.once);
            snapshot
        };

        for listener in &snapshot {
            match listener.registered_in.as_ref().or(bound.as_ref()) {
                Some(cell) => cell.enter(|| (listener.handler)(event)),
                None => (listener.handler)(event),
            }
        }
        snapshot.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn bound_cell(&self) -> Option<ContextCell> {
        self.bound.lock().clone()
    }
}

impl<E> Default for Emitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventSource for Emitter<E> {
    fn bind_context(&self, cell: ContextCell) {
        if let Some(previous) = self.bound.lock().replace(cell) {
            tracing::debug!(req_id = %previous.record().req_id(), "rebinding event source");
        }
    }
}

impl<E> fmt::Debug for Emitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listener_count())
            .field("bound", &self.bound_cell())
            .finish()
    }
}

/// Events of an inbound connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Data(Vec<u8>),
    End,
    Close,
    Error(String),
}

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Metadata of the connection a request arrived on.
///
/// Servers attach it to requests through their extensions. It feeds the
/// request fingerprint, and its event emitter is bound to the request's
/// tracking context.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    serial: u64,
    remote_addr: Option<SocketAddr>,
    events: Arc<Emitter<ConnectionEvent>>,
}

impl ConnectionInfo {
    pub fn new(remote_addr: Option<SocketAddr>) -> Self {
        ConnectionInfo {
            serial: NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed),
            remote_addr,
            events: Arc::new(Emitter::new()),
        }
    }

    /// Process-unique number of this connection.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn events(&self) -> &Arc<Emitter<ConnectionEvent>> {
        &self.events
    }
}
