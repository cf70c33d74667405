//! Context cells: the tracking record of one logical request, visible from
//! every continuation causally descended from the point tracking started.
//!
//! A cell travels with the futures it is attached to. [`run_scoped`] wraps a
//! future so the cell is current on each of its polls, [`spawn`] tags a new
//! task with the cell active at schedule time, and bound event sources carry
//! it into callbacks fired from outside. Lookups read the tag of the running
//! future, so interleaved requests never observe each other's record.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures_util::Stream;
use tokio::task::{futures::TaskLocalFuture, JoinHandle};

use crate::{
    error::TrackingError,
    events::EventSource,
    record::{derive_tracking_record, TrackingInput, TrackingRecord},
    request::RequestLike,
};

tokio::task_local! {
    static ACTIVE_CELL: ContextCell;
}

/// A future running with a [`ContextCell`] as the current context.
pub type Scoped<F> = TaskLocalFuture<ContextCell, F>;

/// Isolated storage of one request's [`TrackingRecord`].
///
/// Clones share the record. The cell lives as long as any continuation that
/// holds it.
#[derive(Clone)]
pub struct ContextCell {
    record: Arc<TrackingRecord>,
}

impl ContextCell {
    pub fn new(record: TrackingRecord) -> Self {
        ContextCell {
            record: Arc::new(record),
        }
    }

    /// Cell for an inbound request. The request's event sources are bound to
    /// it.
    pub fn for_request<R: RequestLike + ?Sized>(request: &R) -> Self {
        let cell = ContextCell::new(TrackingRecord::from_request(request));
        request.bind_event_sources(&cell);
        cell
    }

    pub fn record(&self) -> &Arc<TrackingRecord> {
        &self.record
    }

    /// Runs `work` with this cell current for every poll.
    pub fn scope<F: Future>(&self, work: F) -> Scoped<F> {
        ACTIVE_CELL.scope(self.clone(), work)
    }

    /// Runs `f` synchronously with this cell current.
    pub fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        ACTIVE_CELL.sync_scope(self.clone(), f)
    }

    /// Spawns `future` on the tokio runtime as a continuation of this cell.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(self.scope(future))
    }

    /// Wraps `stream` so that it is polled inside this cell.
    pub fn bind_stream<S: Stream + Unpin>(&self, stream: S) -> BoundStream<S> {
        BoundStream {
            cell: self.clone(),
            inner: stream,
        }
    }

    /// Whether both handles refer to the same cell.
    pub fn ptr_eq(&self, other: &ContextCell) -> bool {
        Arc::ptr_eq(&self.record, &other.record)
    }
}

impl fmt::Debug for ContextCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContextCell")
            .field(&self.record.req_id())
            .finish()
    }
}

/// Runs `work` inside a new cell holding `record`.
///
/// The returned future must be awaited (or spawned) for the cell to become
/// current. Nested calls shadow the outer cell for their own extent only.
pub fn run_scoped<F: Future>(record: TrackingRecord, work: F) -> Scoped<F> {
    ContextCell::new(record).scope(work)
}

/// Synchronous counterpart of [`run_scoped`].
pub fn run_scoped_sync<R>(record: TrackingRecord, f: impl FnOnce() -> R) -> R {
    ContextCell::new(record).enter(f)
}

/// Derives the tracking record for `input` and runs `work` inside a new cell
/// holding it. When `input` carries a request, its event sources are bound to
/// the cell.
///
/// `work` is dropped without running if `input` cannot identify a request.
pub fn start_tracking<F: Future>(
    input: TrackingInput<'_>,
    work: F,
) -> Result<Scoped<F>, TrackingError> {
    let cell = ContextCell::new(derive_tracking_record(&input)?);
    if let Some(request) = input.request_like() {
        request.bind_event_sources(&cell);
    }
    tracing::debug!(req_id = %cell.record().req_id(), "tracking started");

    Ok(cell.scope(work))
}

/// The cell active at the call site.
pub fn current_cell() -> Option<ContextCell> {
    ACTIVE_CELL.try_with(ContextCell::clone).ok()
}

/// The tracking record of the cell active at the call site, `None` outside of
/// any cell.
pub fn current_tracking_record() -> Option<Arc<TrackingRecord>> {
    ACTIVE_CELL
        .try_with(|cell| Arc::clone(&cell.record))
        .ok()
}

/// Spawns `future` as a continuation of the current cell, or untracked when no
/// cell is active.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match current_cell() {
        Some(cell) => cell.spawn(future),
        None => tokio::spawn(future),
    }
}

/// Associates an externally created event source with `cell`, so handlers run
/// for its later events observe the cell's record.
pub fn bind_external_event_source<S: EventSource + ?Sized>(cell: &ContextCell, source: &S) {
    source.bind_context(cell.clone());
}

/// Binds `source` to the cell active at the call site.
pub fn bind_to_current<S: EventSource + ?Sized>(source: &S) -> Result<(), TrackingError> {
    let cell = current_cell().ok_or(TrackingError::NoActiveContext)?;
    source.bind_context(cell);
    Ok(())
}

/// A stream polled inside a [`ContextCell`], see [`ContextCell::bind_stream`].
#[derive(Debug)]
pub struct BoundStream<S> {
    cell: ContextCell,
    inner: S,
}

impl<S> BoundStream<S> {
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Stream + Unpin> Stream for BoundStream<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S::Item>> {
        let this = self.get_mut();
        let inner = &mut this.inner;
        this.cell.enter(|| Pin::new(inner).poll_next(cx))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
