// ── Portal facade ──
//
// Full lifecycle management for one portal session. Wires the REST
// client, the change feed, and the two synchronized stores together:
// authentication probe, initial load, feed bridging, periodic refresh,
// and teardown.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use strata_api::feed::{ChangeAction, ChangeKind, FeedMessage};
use strata_api::{
    AdministratorRecord, ChangeFeedHandle, NotificationRecord, PortalClient, ReconnectConfig,
    TlsMode, TransportConfig,
};

use crate::administrators::{
    AdministratorDirectory, AdministratorMsg, administrator_sync_task,
};
use crate::config::{PortalConfig, TlsVerification};
use crate::error::CoreError;
use crate::model::{Administrator, EntityId, Notification};
use crate::notifications::{NotificationCenter, NotificationMsg, notification_sync_task};
use crate::view::{AdministratorView, NotificationView};

const STORE_CHANNEL_SIZE: usize = 64;

// ── ConnectionState ──────────────────────────────────────────────────

/// Connection state observable by consumers.
///
/// The change feed reconnects on its own; this state only tracks the
/// session lifecycle. `Failed` means authorization is gone and the user
/// must sign in again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

// ── Portal ───────────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<PortalInner>`. [`connect()`](Self::connect)
/// probes authorization, kicks off the initial load, and spawns the
/// background machinery; the store handles stay valid across
/// disconnect/reconnect cycles.
#[derive(Clone)]
pub struct Portal {
    inner: Arc<PortalInner>,
}

struct PortalInner {
    config: PortalConfig,
    api: Arc<PortalClient>,
    connection_state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    /// Child token for the current connection -- cancelled on disconnect,
    /// replaced on reconnect (avoids permanent cancellation).
    cancel_child: Mutex<CancellationToken>,
    feed_handle: Mutex<Option<ChangeFeedHandle>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    last_feed_event: watch::Sender<Option<DateTime<Utc>>>,

    notifications: NotificationCenter,
    administrators: AdministratorDirectory,
    notif_tx: mpsc::Sender<NotificationMsg>,
    admin_tx: mpsc::Sender<AdministratorMsg>,
    /// Consumed by the store tasks on first connect.
    store_rx: Mutex<Option<StoreReceivers>>,
}

struct StoreReceivers {
    notif_rx: mpsc::Receiver<NotificationMsg>,
    notif_view_tx: watch::Sender<NotificationView>,
    admin_rx: mpsc::Receiver<AdministratorMsg>,
    admin_view_tx: watch::Sender<AdministratorView>,
}

impl Portal {
    /// Create a new Portal from configuration. Does NOT connect --
    /// call [`connect()`](Self::connect) to start the session.
    pub fn new(config: PortalConfig) -> Result<Self, CoreError> {
        let transport = build_transport(&config);
        let api = Arc::new(PortalClient::new(
            config.url.clone(),
            &config.token,
            &transport,
        )?);

        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let (last_feed_event, _) = watch::channel(None);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        let (notif_tx, notif_rx) = mpsc::channel(STORE_CHANNEL_SIZE);
        let (notif_view_tx, notif_view_rx) =
            watch::channel(NotificationView::empty(config.page_size));
        let (admin_tx, admin_rx) = mpsc::channel(STORE_CHANNEL_SIZE);
        let (admin_view_tx, admin_view_rx) =
            watch::channel(AdministratorView::empty(config.page_size));

        let notifications = NotificationCenter::new(
            notif_tx.clone(),
            notif_view_rx,
            Arc::clone(&api),
            config.undo_grace,
        );
        let administrators = AdministratorDirectory::new(admin_tx.clone(), admin_view_rx);

        Ok(Self {
            inner: Arc::new(PortalInner {
                config,
                api,
                connection_state,
                cancel,
                cancel_child: Mutex::new(cancel_child),
                feed_handle: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
                last_feed_event,
                notifications,
                administrators,
                notif_tx,
                admin_tx,
                store_rx: Mutex::new(Some(StoreReceivers {
                    notif_rx,
                    notif_view_tx,
                    admin_rx,
                    admin_view_tx,
                })),
            }),
        })
    }

    /// Access the session configuration.
    pub fn config(&self) -> &PortalConfig {
        &self.inner.config
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Connect to the portal.
    ///
    /// Probes authorization (and loads the persisted selection in the
    /// same round-trip), spawns the store tasks, kicks off the initial
    /// page loads, and starts the change-feed bridge and the periodic
    /// refresh task.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let _ = self
            .inner
            .connection_state
            .send(ConnectionState::Connecting);

        // Fresh child token for this connection (supports reconnect).
        let child = self.inner.cancel.child_token();
        *self.inner.cancel_child.lock().await = child.clone();

        // Auth probe doubles as the preferred-selection load.
        let preferred = match self.inner.api.get_active_administrator().await {
            Ok(id) => id.map(EntityId::from),
            Err(e) => {
                let err = CoreError::from(e);
                let _ = self.inner.connection_state.send(if err.is_fatal() {
                    ConnectionState::Failed
                } else {
                    ConnectionState::Disconnected
                });
                return Err(err);
            }
        };
        debug!(preferred = ?preferred, "authorization probe succeeded");

        // Store tasks live for the Portal's whole lifetime; spawn on
        // first connect only.
        if let Some(receivers) = self.inner.store_rx.lock().await.take() {
            let api = Arc::clone(&self.inner.api);
            let page_size = self.inner.config.page_size;

            tokio::spawn(notification_sync_task(
                Arc::clone(&api),
                self.inner.notif_tx.clone(),
                receivers.notif_rx,
                receivers.notif_view_tx,
                page_size,
                self.inner.cancel.clone(),
            ));
            tokio::spawn(administrator_sync_task(
                api,
                self.inner.admin_tx.clone(),
                receivers.admin_rx,
                receivers.admin_view_tx,
                page_size,
                self.inner.cancel.clone(),
            ));
        }

        // Initial load: selection first so the first page reconciliation
        // can honor the server preference, then both page-1 fetches.
        let _ = self
            .inner
            .admin_tx
            .send(AdministratorMsg::PreferredLoaded { preferred })
            .await;
        let _ = self.inner.admin_tx.send(AdministratorMsg::Refresh).await;
        let _ = self.inner.notif_tx.send(NotificationMsg::Refresh).await;

        let mut handles = self.inner.task_handles.lock().await;

        if self.inner.config.feed_enabled {
            self.spawn_feed(&child, &mut handles).await;
        }

        let interval_secs = self.inner.config.refresh_interval_secs;
        if interval_secs > 0 {
            let portal = self.clone();
            let cancel = child.clone();
            handles.push(tokio::spawn(refresh_task(portal, interval_secs, cancel)));
        }

        drop(handles);

        let _ = self.inner.connection_state.send(ConnectionState::Connected);
        info!("connected to portal");
        Ok(())
    }

    /// Spawn the change-feed stream and the bridge task that routes
    /// events into the store channels.
    ///
    /// Non-fatal on failure -- the stores fall back to refresh cycles.
    async fn spawn_feed(&self, cancel: &CancellationToken, handles: &mut Vec<JoinHandle<()>>) {
        let feed_url = match self.inner.api.feed_url() {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "invalid feed URL, continuing without feed");
                return;
            }
        };

        let reconnect = ReconnectConfig {
            gap_threshold: self.inner.config.reconnect_gap,
            ..ReconnectConfig::default()
        };
        let feed_cancel = cancel.child_token();
        let bearer = self.inner.config.token.expose_secret().to_owned();

        let handle = match ChangeFeedHandle::connect(
            feed_url,
            reconnect,
            feed_cancel.clone(),
            Some(bearer),
        ) {
            Ok(h) => h,
            Err(e) => {
                warn!(error = %e, "feed connection failed (non-fatal)");
                return;
            }
        };

        // Bridge task: feed messages → typed events → store channels.
        // A Resync means the feed was down long enough that events may
        // have been missed; both stores refetch.
        let mut feed_rx = handle.subscribe();
        let notif_tx = self.inner.notif_tx.clone();
        let admin_tx = self.inner.admin_tx.clone();
        let last_event = self.inner.last_feed_event.clone();
        let bridge_cancel = feed_cancel;

        handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = bridge_cancel.cancelled() => break,
                    result = feed_rx.recv() => {
                        match result {
                            Ok(FeedMessage::Change(event)) => {
                                let _ = last_event.send(Some(Utc::now()));
                                route_change(&notif_tx, &admin_tx, event).await;
                            }
                            Ok(FeedMessage::Resync) => {
                                warn!("feed resync requested, refetching both stores");
                                let _ = admin_tx.send(AdministratorMsg::Refresh).await;
                                let _ = notif_tx.send(NotificationMsg::Refresh).await;
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "feed bridge lagged, refetching both stores");
                                let _ = admin_tx.send(AdministratorMsg::Refresh).await;
                                let _ = notif_tx.send(NotificationMsg::Refresh).await;
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        }));

        *self.inner.feed_handle.lock().await = Some(handle);
        info!("change feed spawned (handshake in progress)");
    }

    /// Disconnect from the portal.
    ///
    /// Stops the feed and periodic refresh; the store tasks and all
    /// vended handles stay alive so a later [`connect()`](Self::connect)
    /// resumes where it left off.
    pub async fn disconnect(&self) {
        // Cancel the child token (not the parent -- allows reconnect).
        self.inner.cancel_child.lock().await.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        if let Some(handle) = self.inner.feed_handle.lock().await.take() {
            handle.shutdown();
        }

        let _ = self
            .inner
            .connection_state
            .send(ConnectionState::Disconnected);
        debug!("disconnected");
    }

    /// Tear down everything, including the store tasks. The portal
    /// cannot be reconnected afterwards.
    pub async fn shutdown(&self) {
        self.disconnect().await;
        self.inner.cancel.cancel();
    }

    // ── Store access ─────────────────────────────────────────────────

    /// The notification store's action surface.
    pub fn notifications(&self) -> NotificationCenter {
        self.inner.notifications.clone()
    }

    /// The administrator store's action surface.
    pub fn administrators(&self) -> AdministratorDirectory {
        self.inner.administrators.clone()
    }

    // ── State observation ────────────────────────────────────────────

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    /// When the last feed event arrived, for staleness display.
    pub fn last_feed_event(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.inner.last_feed_event.subscribe()
    }
}

// ── Feed routing ─────────────────────────────────────────────────────

/// Deserialize a change event's entity by kind and hand it to the
/// owning store. Malformed payloads are logged and dropped -- one bad
/// event must not wedge the bridge.
async fn route_change(
    notif_tx: &mpsc::Sender<NotificationMsg>,
    admin_tx: &mpsc::Sender<AdministratorMsg>,
    event: strata_api::ChangeEvent,
) {
    match event.kind {
        ChangeKind::Notification => {
            match serde_json::from_value::<NotificationRecord>(event.entity) {
                Ok(record) => {
                    let entity = Notification::from(record);
                    let msg = match event.action {
                        ChangeAction::Insert => NotificationMsg::FeedInsert(entity),
                        ChangeAction::Update => NotificationMsg::FeedUpdate(entity),
                    };
                    let _ = notif_tx.send(msg).await;
                }
                Err(e) => debug!(error = %e, "undecodable notification event dropped"),
            }
        }
        ChangeKind::Administrator => {
            match serde_json::from_value::<AdministratorRecord>(event.entity) {
                Ok(record) => {
                    let entity = Administrator::from(record);
                    let msg = match event.action {
                        ChangeAction::Insert => AdministratorMsg::FeedInsert(entity),
                        ChangeAction::Update => AdministratorMsg::FeedUpdate(entity),
                    };
                    let _ = admin_tx.send(msg).await;
                }
                Err(e) => debug!(error = %e, "undecodable administrator event dropped"),
            }
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Periodic full refresh of both stores.
async fn refresh_task(portal: Portal, interval_secs: u64, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                debug!("periodic refresh");
                let _ = portal.inner.admin_tx.send(AdministratorMsg::Refresh).await;
                let _ = portal.inner.notif_tx.send(NotificationMsg::Refresh).await;
            }
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn build_transport(config: &PortalConfig) -> TransportConfig {
    TransportConfig {
        tls: tls_to_transport(&config.tls),
        timeout: config.timeout,
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}
