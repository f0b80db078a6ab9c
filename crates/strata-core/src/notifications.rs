// ── Notification center ──
//
// The action surface and sync task for the notification store. All cache
// mutation -- fetch results, feed events, optimistic edits, write
// resolutions -- flows through one mpsc channel into a single ordered
// handler; consumers read immutable snapshots from a watch channel.
//
// Optimistic actions never wait on the server: the cache mutates first,
// the write is fired in the background, and a failed write triggers a
// corrective refetch of the affected entity instead of a rollback.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use strata_api::{NotificationPatch, PageQuery, PortalClient};

use crate::error::CoreError;
use crate::model::{Entity, EntityId, Notification, NotificationCategory};
use crate::reconcile::{EventOutcome, Reconciler};
use crate::store::EditKind;
use crate::view::{NotificationView, ViewHandle};

// ── Messages ─────────────────────────────────────────────────────────

/// Everything that can mutate the notification store. One channel, one
/// ordered handler.
pub(crate) enum NotificationMsg {
    // User intents
    Refresh,
    SetPage { page: u32 },
    SetCategory { category: Option<NotificationCategory> },
    SetUnreadOnly { unread_only: bool },
    MarkRead { id: EntityId },
    SoftDelete { id: EntityId },
    Restored { id: EntityId },

    // Feed events (routed by the portal bridge)
    FeedInsert(Notification),
    FeedUpdate(Notification),

    // Async results from spawned fetches/writes
    PageLoaded {
        page: u32,
        items: Vec<Notification>,
        total_count: u64,
    },
    FetchFailed { error: CoreError },
    WriteResolved {
        id: EntityId,
        result: Result<(), CoreError>,
    },
    EntityRefetched { entity: Box<Notification> },
    EntityMissing { id: EntityId },
}

// ── Undo token ───────────────────────────────────────────────────────

/// Handle to undo a soft-delete, valid for a grace window.
///
/// A token is invalidated by its deadline passing or by a newer
/// soft-delete being issued (one undo affordance at a time, like the
/// snackbar it backs). An expired token makes [`NotificationCenter::undo`]
/// a no-op -- though the portal honors a late restore if one is sent, so
/// retrying is always safe.
#[derive(Debug, Clone)]
pub struct UndoToken {
    id: EntityId,
    epoch: u64,
    deadline: Instant,
}

impl UndoToken {
    pub fn entity_id(&self) -> &EntityId {
        &self.id
    }

    /// `true` once the grace window has elapsed. The UI should disable
    /// the undo affordance when this flips.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

// ── Action surface ───────────────────────────────────────────────────

/// Public API of the notification store, consumed by UI components.
///
/// Cheaply cloneable. Reads are synchronous; every action returns as
/// soon as the intent is enqueued -- the only method that awaits a
/// server round-trip is [`undo`](Self::undo), which is an explicit
/// user-initiated retryable action.
#[derive(Clone)]
pub struct NotificationCenter {
    tx: mpsc::Sender<NotificationMsg>,
    view_rx: watch::Receiver<NotificationView>,
    api: Arc<PortalClient>,
    undo_grace: Duration,
    undo_epoch: Arc<AtomicU64>,
}

impl NotificationCenter {
    pub(crate) fn new(
        tx: mpsc::Sender<NotificationMsg>,
        view_rx: watch::Receiver<NotificationView>,
        api: Arc<PortalClient>,
        undo_grace: Duration,
    ) -> Self {
        Self {
            tx,
            view_rx,
            api,
            undo_grace,
            undo_epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Latest snapshot. Safe to call from a render path.
    pub fn view(&self) -> NotificationView {
        self.view_rx.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    pub fn watch(&self) -> ViewHandle<NotificationView> {
        ViewHandle::new(self.view_rx.clone())
    }

    /// Reload the current page from the server.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        self.send(NotificationMsg::Refresh).await
    }

    /// Jump to a page (1-based) and fetch it.
    pub async fn go_to_page(&self, page: u32) -> Result<(), CoreError> {
        self.send(NotificationMsg::SetPage { page: page.max(1) })
            .await
    }

    /// Filter by category (`None` clears) and refetch from page 1.
    pub async fn set_category(
        &self,
        category: Option<NotificationCategory>,
    ) -> Result<(), CoreError> {
        self.send(NotificationMsg::SetCategory { category }).await
    }

    /// Show only unread notifications, and refetch from page 1.
    pub async fn set_unread_only(&self, unread_only: bool) -> Result<(), CoreError> {
        self.send(NotificationMsg::SetUnreadOnly { unread_only })
            .await
    }

    /// Optimistically mark a notification read.
    ///
    /// The unread count drops before the server write is even issued;
    /// a failed write corrects the cache via refetch. Idempotent: a
    /// second call on an already-read notification does nothing.
    pub async fn mark_read(&self, id: EntityId) -> Result<(), CoreError> {
        self.send(NotificationMsg::MarkRead { id }).await
    }

    /// Optimistically soft-delete a notification and arm undo.
    ///
    /// The entity disappears from listings immediately but stays
    /// resident until the next full refetch, so the returned token can
    /// bring it back.
    pub async fn soft_delete(&self, id: EntityId) -> Result<UndoToken, CoreError> {
        let epoch = self.undo_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.send(NotificationMsg::SoftDelete { id: id.clone() })
            .await?;
        Ok(UndoToken {
            id,
            epoch,
            deadline: Instant::now() + self.undo_grace,
        })
    }

    /// Undo a soft-delete.
    ///
    /// Returns `Ok(false)` without contacting the server when the token
    /// has expired or been superseded by a newer delete. Otherwise
    /// issues the restore write and, on success, re-inserts the entity
    /// at the head of the list. Failures surface to the caller -- this
    /// is the one action a user explicitly retries.
    pub async fn undo(&self, token: &UndoToken) -> Result<bool, CoreError> {
        if token.is_expired() || token.epoch != self.undo_epoch.load(Ordering::SeqCst) {
            return Ok(false);
        }

        self.api
            .restore_notification(&token.id.to_string())
            .await?;
        self.send(NotificationMsg::Restored {
            id: token.id.clone(),
        })
        .await?;
        Ok(true)
    }

    async fn send(&self, msg: NotificationMsg) -> Result<(), CoreError> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| CoreError::PortalDisconnected)
    }
}

// ── Sync task ────────────────────────────────────────────────────────

/// Single ordered handler for the notification store.
///
/// Every await on server I/O happens in a spawned subtask that reports
/// back through the same channel, so the handler itself never blocks and
/// message order is the only ordering.
pub(crate) async fn notification_sync_task(
    api: Arc<PortalClient>,
    msg_tx: mpsc::Sender<NotificationMsg>,
    mut rx: mpsc::Receiver<NotificationMsg>,
    view_tx: watch::Sender<NotificationView>,
    page_size: u32,
    cancel: CancellationToken,
) {
    let mut state = NotificationState {
        api,
        msg_tx,
        view_tx,
        reconciler: Reconciler::new(page_size),
        requested_page: 1,
        page_size,
        is_loading: false,
        last_error: None,
    };

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                state.handle(msg);
            }
        }
    }

    debug!("notification sync task exiting");
}

struct NotificationState {
    api: Arc<PortalClient>,
    msg_tx: mpsc::Sender<NotificationMsg>,
    view_tx: watch::Sender<NotificationView>,
    reconciler: Reconciler<Notification>,
    requested_page: u32,
    page_size: u32,
    is_loading: bool,
    last_error: Option<String>,
}

impl NotificationState {
    fn handle(&mut self, msg: NotificationMsg) {
        match msg {
            NotificationMsg::Refresh => self.start_fetch(),
            NotificationMsg::SetPage { page } => {
                self.requested_page = page;
                self.start_fetch();
            }
            NotificationMsg::SetCategory { category } => {
                self.reconciler
                    .set_filter("category", category.map(|c| c.to_string()));
                self.requested_page = 1;
                self.start_fetch();
            }
            NotificationMsg::SetUnreadOnly { unread_only } => {
                self.reconciler
                    .set_filter("unread", unread_only.then(|| "true".to_owned()));
                self.requested_page = 1;
                self.start_fetch();
            }

            NotificationMsg::MarkRead { id } => self.mark_read(&id),
            NotificationMsg::SoftDelete { id } => self.soft_delete(&id),
            NotificationMsg::Restored { id } => {
                if self.reconciler.confirm_restore(&id) {
                    self.publish();
                }
            }

            NotificationMsg::FeedInsert(entity) => {
                if self.reconciler.apply_insert(entity) != EventOutcome::Ignored {
                    self.publish();
                }
            }
            NotificationMsg::FeedUpdate(entity) => match self.reconciler.apply_update(entity) {
                EventOutcome::Applied => self.publish(),
                EventOutcome::Ignored => {}
                EventOutcome::Diverged => {
                    self.publish();
                    self.start_fetch();
                }
            },

            NotificationMsg::PageLoaded {
                page,
                items,
                total_count,
            } => {
                if page != self.requested_page {
                    // A newer request is in flight; drop the stale result.
                    return;
                }
                self.reconciler.apply_page(page, items, total_count);
                self.is_loading = false;
                self.last_error = None;
                self.publish();
            }
            NotificationMsg::FetchFailed { error } => {
                warn!(error = %error, "notification fetch failed");
                self.is_loading = false;
                self.last_error = Some(error.to_string());
                self.publish();
            }

            NotificationMsg::WriteResolved { id, result } => match result {
                Ok(()) => self.reconciler.resolve_write(&id),
                Err(error) => self.write_failed(&id, &error),
            },
            NotificationMsg::EntityRefetched { entity } => {
                self.reconciler.apply_refetched(*entity);
                self.publish();
            }
            NotificationMsg::EntityMissing { id } => {
                self.reconciler.remove_missing(&id);
                self.publish();
            }
        }
    }

    // ── Optimistic actions ───────────────────────────────────────────

    fn mark_read(&mut self, id: &EntityId) {
        // Idempotent: already read, already deleted, or not resident
        // means nothing to do -- and no second write, so the aggregate
        // cannot be double-decremented.
        let actionable = self
            .reconciler
            .cache()
            .get(id)
            .is_some_and(|n| !n.is_read && !n.is_soft_deleted());
        if !actionable {
            return;
        }

        self.reconciler
            .apply_optimistic(id, EditKind::MarkRead, |n| n.is_read = true);
        self.publish();

        let patch = NotificationPatch {
            is_read: Some(true),
            ..NotificationPatch::default()
        };
        self.spawn_write(id.clone(), patch);
    }

    fn soft_delete(&mut self, id: &EntityId) {
        let actionable = self
            .reconciler
            .cache()
            .get(id)
            .is_some_and(|n| !n.is_soft_deleted());
        if !actionable {
            return;
        }

        let now = Utc::now();
        self.reconciler
            .apply_optimistic(id, EditKind::SoftDelete, |n| n.deleted_at = Some(now));
        self.publish();

        let patch = NotificationPatch {
            deleted: Some(true),
            ..NotificationPatch::default()
        };
        self.spawn_write(id.clone(), patch);
    }

    // ── Failure handling ─────────────────────────────────────────────

    /// A fire-and-forget write failed. Authorization failures surface;
    /// everything else is absorbed by refetching the affected entity --
    /// the corrected state re-rendering is the only user-visible signal.
    fn write_failed(&mut self, id: &EntityId, error: &CoreError) {
        if error.is_fatal() {
            warn!(id = %id, error = %error, "notification write rejected, authorization required");
            self.last_error = Some(error.to_string());
            self.publish();
            return;
        }

        debug!(id = %id, error = %error, "notification write failed, refetching entity");
        let api = Arc::clone(&self.api);
        let tx = self.msg_tx.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let msg = match api.get_notification(&id.to_string()).await {
                Ok(record) => NotificationMsg::EntityRefetched {
                    entity: Box::new(Notification::from(record)),
                },
                Err(e) if e.is_not_found() => NotificationMsg::EntityMissing { id },
                Err(e) => {
                    // Transient on top of transient: give up quietly, the
                    // next refresh or feed event reconciles.
                    debug!(error = %e, "corrective refetch failed");
                    return;
                }
            };
            let _ = tx.send(msg).await;
        });
    }

    // ── Spawned I/O ──────────────────────────────────────────────────

    fn start_fetch(&mut self) {
        self.is_loading = true;
        self.publish();

        let mut query = PageQuery::new(self.requested_page, self.page_size);
        query.filters = self
            .reconciler
            .cache()
            .filters()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let api = Arc::clone(&self.api);
        let tx = self.msg_tx.clone();
        let page = self.requested_page;
        tokio::spawn(async move {
            let msg = match api.list_notifications(&query).await {
                Ok(result) => NotificationMsg::PageLoaded {
                    page,
                    items: result.items.into_iter().map(Notification::from).collect(),
                    total_count: result.total_count,
                },
                Err(e) => NotificationMsg::FetchFailed { error: e.into() },
            };
            let _ = tx.send(msg).await;
        });
    }

    fn spawn_write(&self, id: EntityId, patch: NotificationPatch) {
        let api = Arc::clone(&self.api);
        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            let result = api
                .update_notification(&id.to_string(), &patch)
                .await
                .map_err(CoreError::from);
            let _ = tx.send(NotificationMsg::WriteResolved { id, result }).await;
        });
    }

    // ── Snapshot publication ─────────────────────────────────────────

    fn publish(&self) {
        let cache = self.reconciler.cache();
        let items: Vec<Notification> = cache.visible().cloned().collect();
        let unread_count = items.iter().filter(|n| !n.is_read).count();
        let info = cache.page_info();

        let view = NotificationView {
            items: Arc::new(items),
            total_count: info.total_count,
            unread_count,
            page: info.page,
            page_size: info.page_size,
            is_loading: self.is_loading,
            last_error: self.last_error.clone(),
        };
        // send_replace updates unconditionally, even with zero receivers.
        let _ = self.view_tx.send_replace(view);
    }
}
