// ── Administrator directory ──
//
// The action surface and sync task for the tenant-selection store. Same
// single-ordered-handler shape as the notification center; the derived
// state here is the active administrator id, which must stay a member of
// the visible set and is persisted server-side on every transition the
// coordinator makes.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use strata_api::{PageQuery, PortalClient};

use crate::error::CoreError;
use crate::model::{Administrator, EntityId};
use crate::reconcile::{EventOutcome, Reconciler};
use crate::select::{SelectionCoordinator, SelectionOutcome};
use crate::view::{AdministratorView, ViewHandle};

// ── Messages ─────────────────────────────────────────────────────────

/// Everything that can mutate the administrator store.
pub(crate) enum AdministratorMsg {
    // User intents
    Refresh,
    SetPage { page: u32 },
    SetSearch { query: Option<String> },
    Select { id: EntityId },

    // Feed events (routed by the portal bridge)
    FeedInsert(Administrator),
    FeedUpdate(Administrator),

    // Async results from spawned fetches/writes
    PreferredLoaded { preferred: Option<EntityId> },
    PageLoaded {
        page: u32,
        items: Vec<Administrator>,
        total_count: u64,
    },
    FetchFailed { error: CoreError },
    PersistResolved {
        id: Option<EntityId>,
        result: Result<(), CoreError>,
    },
}

// ── Action surface ───────────────────────────────────────────────────

/// Public API of the administrator store, consumed by UI components.
///
/// Cheaply cloneable; reads are synchronous. `select` transitions the
/// local state immediately and persists in the background -- a failed
/// persist is logged but never rolled back, the next reconciliation is
/// authoritative.
#[derive(Clone)]
pub struct AdministratorDirectory {
    tx: mpsc::Sender<AdministratorMsg>,
    view_rx: watch::Receiver<AdministratorView>,
}

impl AdministratorDirectory {
    pub(crate) fn new(
        tx: mpsc::Sender<AdministratorMsg>,
        view_rx: watch::Receiver<AdministratorView>,
    ) -> Self {
        Self { tx, view_rx }
    }

    /// Latest snapshot. Safe to call from a render path.
    pub fn view(&self) -> AdministratorView {
        self.view_rx.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    pub fn watch(&self) -> ViewHandle<AdministratorView> {
        ViewHandle::new(self.view_rx.clone())
    }

    /// The active administrator id, if any.
    pub fn active_id(&self) -> Option<EntityId> {
        self.view_rx.borrow().active_id.clone()
    }

    /// Make an administrator the active one and persist the choice.
    pub async fn select(&self, id: EntityId) -> Result<(), CoreError> {
        self.send(AdministratorMsg::Select { id }).await
    }

    /// Reload the current page from the server.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        self.send(AdministratorMsg::Refresh).await
    }

    /// Jump to a page (1-based) and fetch it.
    pub async fn go_to_page(&self, page: u32) -> Result<(), CoreError> {
        self.send(AdministratorMsg::SetPage { page: page.max(1) })
            .await
    }

    /// Filter by name substring (`None` clears) and refetch from page 1.
    pub async fn set_search(&self, query: Option<String>) -> Result<(), CoreError> {
        self.send(AdministratorMsg::SetSearch { query }).await
    }

    async fn send(&self, msg: AdministratorMsg) -> Result<(), CoreError> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| CoreError::PortalDisconnected)
    }
}

// ── Sync task ────────────────────────────────────────────────────────

/// Single ordered handler for the administrator store.
pub(crate) async fn administrator_sync_task(
    api: Arc<PortalClient>,
    msg_tx: mpsc::Sender<AdministratorMsg>,
    mut rx: mpsc::Receiver<AdministratorMsg>,
    view_tx: watch::Sender<AdministratorView>,
    page_size: u32,
    cancel: CancellationToken,
) {
    let mut state = AdministratorState {
        api,
        msg_tx,
        view_tx,
        reconciler: Reconciler::new(page_size),
        coordinator: SelectionCoordinator::new(),
        preferred: None,
        loaded: false,
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

    debug!("administrator sync task exiting");
}

struct AdministratorState {
    api: Arc<PortalClient>,
    msg_tx: mpsc::Sender<AdministratorMsg>,
    view_tx: watch::Sender<AdministratorView>,
    reconciler: Reconciler<Administrator>,
    coordinator: SelectionCoordinator,
    /// Server-declared preferred selection, used as the fallback when
    /// the current selection disappears from the visible set.
    preferred: Option<EntityId>,
    /// Membership constraints only apply once data has loaded.
    loaded: bool,
    requested_page: u32,
    page_size: u32,
    is_loading: bool,
    last_error: Option<String>,
}

impl AdministratorState {
    fn handle(&mut self, msg: AdministratorMsg) {
        match msg {
            AdministratorMsg::Refresh => self.start_fetch(),
            AdministratorMsg::SetPage { page } => {
                self.requested_page = page;
                self.start_fetch();
            }
            AdministratorMsg::SetSearch { query } => {
                self.reconciler.set_filter("search", query);
                self.requested_page = 1;
                self.start_fetch();
            }

            AdministratorMsg::Select { id } => {
                // Optimistic local transition; persist in the background.
                if self.coordinator.select(id.clone()) {
                    self.preferred = Some(id.clone());
                    self.publish();
                    self.spawn_persist(Some(id));
                }
            }

            AdministratorMsg::FeedInsert(entity) => {
                if self.reconciler.apply_insert(entity) != EventOutcome::Ignored {
                    self.after_reconcile();
                }
            }
            AdministratorMsg::FeedUpdate(entity) => match self.reconciler.apply_update(entity) {
                EventOutcome::Applied => self.after_reconcile(),
                EventOutcome::Ignored => {}
                EventOutcome::Diverged => {
                    self.after_reconcile();
                    self.start_fetch();
                }
            },

            AdministratorMsg::PreferredLoaded { preferred } => {
                self.preferred = preferred.clone();
                // Server-driven transition: adopt the preference locally
                // without echoing it back as a persist. Membership is
                // validated once data loads.
                if let Some(id) = preferred {
                    self.coordinator.select(id);
                }
                if self.loaded {
                    self.after_reconcile();
                } else {
                    self.publish();
                }
            }
            AdministratorMsg::PageLoaded {
                page,
                items,
                total_count,
            } => {
                if page != self.requested_page {
                    return;
                }
                self.reconciler.apply_page(page, items, total_count);
                self.loaded = true;
                self.is_loading = false;
                self.last_error = None;
                self.after_reconcile();
            }
            AdministratorMsg::FetchFailed { error } => {
                warn!(error = %error, "administrator fetch failed");
                self.is_loading = false;
                self.last_error = Some(error.to_string());
                self.publish();
            }

            AdministratorMsg::PersistResolved { id, result } => {
                if let Err(error) = result {
                    if error.is_fatal() {
                        self.last_error = Some(error.to_string());
                        self.publish();
                    }
                    // No rollback: the next full reconciliation (e.g. on
                    // next session load) is authoritative.
                    warn!(
                        selection = ?id,
                        error = %error,
                        "selection persist failed, leaving local state"
                    );
                }
            }
        }
    }

    /// Re-validate the selection after any cache change, then publish.
    /// Corrections the coordinator makes are persisted server-side.
    fn after_reconcile(&mut self) {
        if self.loaded {
            match self
                .coordinator
                .reconcile(&self.reconciler.cache().visible_ids(), self.preferred.as_ref())
            {
                SelectionOutcome::Unchanged => {}
                SelectionOutcome::Corrected(id) => {
                    debug!(active = %id, "selection corrected after reconciliation");
                    self.spawn_persist(Some(id));
                }
                SelectionOutcome::Cleared => {
                    debug!("selection cleared, no administrators visible");
                    self.spawn_persist(None);
                }
            }
        }
        self.publish();
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
            let msg = match api.list_administrators(&query).await {
                Ok(result) => AdministratorMsg::PageLoaded {
                    page,
                    items: result.items.into_iter().map(Administrator::from).collect(),
                    total_count: result.total_count,
                },
                Err(e) => AdministratorMsg::FetchFailed { error: e.into() },
            };
            let _ = tx.send(msg).await;
        });
    }

    fn spawn_persist(&self, id: Option<EntityId>) {
        let api = Arc::clone(&self.api);
        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            let id_str = id.as_ref().map(ToString::to_string);
            let result = api
                .set_active_administrator(id_str.as_deref())
                .await
                .map_err(CoreError::from);
            let _ = tx
                .send(AdministratorMsg::PersistResolved { id, result })
                .await;
        });
    }

    // ── Snapshot publication ─────────────────────────────────────────

    fn publish(&self) {
        let cache = self.reconciler.cache();
        let items: Vec<Administrator> = cache.visible().cloned().collect();
        let info = cache.page_info();

        let view = AdministratorView {
            items: Arc::new(items),
            total_count: info.total_count,
            active_id: self.coordinator.active_id().cloned(),
            page: info.page,
            page_size: info.page_size,
            is_loading: self.is_loading,
            last_error: self.last_error.clone(),
        };
        let _ = self.view_tx.send_replace(view);
    }
}
