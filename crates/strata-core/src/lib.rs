//! Synchronized entity stores between `strata-api` and UI consumers.
//!
//! This crate owns the client-side consistency layer for the portal:
//! derived, shared UI state kept correct under three concurrent write
//! sources -- optimistic local mutations, change-feed push events, and
//! bulk refetches. There is exactly one writer of record (the server);
//! all local state is a provisional, reconciled cache.
//!
//! - **[`Portal`]** — Central facade managing the session lifecycle:
//!   [`connect()`](Portal::connect) probes authorization, kicks off the
//!   initial load, and spawns the change-feed bridge plus periodic
//!   refresh. Store handles stay valid across reconnects.
//!
//! - **[`EntityCache`]** / **[`Reconciler`]** — The core pattern, generic
//!   over [`Entity`]. The cache is a pure, insertion-ordered page window
//!   whose version-checked `upsert` is the sole concurrency control; the
//!   reconciler merges fetch results, feed events, and optimistic edits
//!   under a deterministic conflict policy.
//!
//! - **[`NotificationCenter`]** — Action surface for the inbox store:
//!   optimistic mark-read, soft-delete with an [`UndoToken`], and a
//!   derived unread count that is recomputed on every change, never
//!   stored.
//!
//! - **[`AdministratorDirectory`]** — Action surface for the
//!   tenant-selection store: the active administrator id, optimistically
//!   switched, server-persisted, and corrected whenever reconciliation
//!   drops it from the visible set.
//!
//! - **[`ViewHandle`]** — Subscription handle vended by both stores.
//!   `current()` is safe to call from a render path; `changed()` powers
//!   reactive consumers.

pub mod administrators;
pub mod config;
pub mod error;
pub mod model;
pub mod notifications;
pub mod portal;
pub mod reconcile;
pub mod select;
pub mod store;
pub mod view;

// ── Primary re-exports ──────────────────────────────────────────────
pub use administrators::AdministratorDirectory;
pub use config::{PortalConfig, TlsVerification};
pub use error::CoreError;
pub use notifications::{NotificationCenter, UndoToken};
pub use portal::{ConnectionState, Portal};
pub use reconcile::{EventOutcome, Reconciler};
pub use select::{Selection, SelectionCoordinator, SelectionOutcome};
pub use store::{EditKind, EntityCache, PageInfo, PendingEdits, UpsertOutcome};
pub use view::{AdministratorView, NotificationView, ViewHandle, ViewStream};

// Re-export model types at the crate root for ergonomics.
pub use model::{Administrator, Entity, EntityId, Notification, NotificationCategory};
