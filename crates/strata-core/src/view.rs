// ── View snapshots and subscription handles ──
//
// Each synchronized store publishes an immutable snapshot through a
// `watch` channel after every reconciliation. Reads are synchronous and
// allocation-light (the item list is behind an `Arc`), so render paths
// can call `current()` freely. Reactive consumers await `changed()` or
// convert to a `Stream`.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::{Administrator, EntityId, Notification};

/// Snapshot of the notification store.
#[derive(Debug, Clone)]
pub struct NotificationView {
    /// Visible (non-deleted) notifications in window order.
    pub items: Arc<Vec<Notification>>,
    /// Server-reported total for the active filter set -- not the window
    /// size.
    pub total_count: u64,
    /// Derived: visible AND unread. Recomputed on every change, never
    /// independently settable.
    pub unread_count: usize,
    pub page: u32,
    pub page_size: u32,
    pub is_loading: bool,
    pub last_error: Option<String>,
}

impl NotificationView {
    pub(crate) fn empty(page_size: u32) -> Self {
        Self {
            items: Arc::new(Vec::new()),
            total_count: 0,
            unread_count: 0,
            page: 1,
            page_size,
            is_loading: false,
            last_error: None,
        }
    }
}

/// Snapshot of the administrator store.
#[derive(Debug, Clone)]
pub struct AdministratorView {
    /// Visible administrators in window order.
    pub items: Arc<Vec<Administrator>>,
    pub total_count: u64,
    /// The active administrator, once data has loaded. Constrained to be
    /// a member of `items` (or `None` when the set is empty).
    pub active_id: Option<EntityId>,
    pub page: u32,
    pub page_size: u32,
    pub is_loading: bool,
    pub last_error: Option<String>,
}

impl AdministratorView {
    pub(crate) fn empty(page_size: u32) -> Self {
        Self {
            items: Arc::new(Vec::new()),
            total_count: 0,
            active_id: None,
            page: 1,
            page_size,
            is_loading: false,
            last_error: None,
        }
    }
}

/// A subscription to one store's snapshots.
///
/// Provides both point-in-time access and reactive change notification
/// via `changed()` or by converting to a `Stream`.
pub struct ViewHandle<V: Clone + Send + Sync + 'static> {
    receiver: watch::Receiver<V>,
}

impl<V: Clone + Send + Sync + 'static> ViewHandle<V> {
    pub(crate) fn new(receiver: watch::Receiver<V>) -> Self {
        Self { receiver }
    }

    /// Get the latest snapshot. Safe to call from a render path.
    pub fn current(&self) -> V {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` if the owning store has shut down.
    pub async fn changed(&mut self) -> Option<V> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> ViewStream<V> {
        ViewStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
///
/// Yields a new snapshot each time the underlying store is mutated.
pub struct ViewStream<V: Clone + Send + Sync + 'static> {
    inner: WatchStream<V>,
}

impl<V: Clone + Send + Sync + 'static> Stream for ViewStream<V> {
    type Item = V;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // WatchStream is Unpin when the inner type is Unpin, and our
        // snapshot types always are.
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
