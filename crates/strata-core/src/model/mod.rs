// ── Domain model ──
//
// Canonical entity types for the two synchronized stores, plus the
// `Entity` trait the generic cache and reconciler are written against.

mod administrator;
mod entity_id;
mod notification;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

pub use administrator::Administrator;
pub use entity_id::EntityId;
pub use notification::{Notification, NotificationCategory};

/// One record in a synchronized store.
///
/// Created server-side only; the client first observes an entity via a
/// paged fetch or a feed insert, then keeps it reconciled. The version
/// marker is the server's last-write time and is the sole ordering
/// authority -- arrival order means nothing.
pub trait Entity: Clone + Send + Sync + 'static {
    fn id(&self) -> &EntityId;

    /// Server-assigned last-write time, used for tie-breaks and for
    /// rejecting stale updates.
    fn version_marker(&self) -> DateTime<Utc>;

    /// When set, the entity is hidden from listings and aggregates but
    /// stays resident to support undo.
    fn soft_deleted_at(&self) -> Option<DateTime<Utc>>;

    fn set_soft_deleted_at(&mut self, at: Option<DateTime<Utc>>);

    /// Does this entity satisfy the given filter set?
    ///
    /// Unknown filter names are ignored -- the server is the authority on
    /// filtering; this predicate only gates which feed inserts are
    /// materialized into the current page window.
    fn matches(&self, filters: &BTreeMap<String, String>) -> bool;

    fn is_soft_deleted(&self) -> bool {
        self.soft_deleted_at().is_some()
    }
}
