// ── Reconciler ──
//
// Serializes the three write sources -- paged fetch results, change-feed
// events, and optimistic local edits -- into the entity cache under one
// deterministic policy:
//
//   * fetch results replace the window wholesale and supersede all
//     pending optimistic edits;
//   * feed inserts materialize only on page 1 under the active filter
//     set, but always adjust the server total;
//   * feed updates are version-checked, and are discarded outright when
//     a pending optimistic edit on the same entity is at least as fresh;
//   * conflicts the client cannot resolve defer to the server state and
//     ask the owner to re-run the affected query.
//
// The reconciler itself is pure: no I/O, no channels. The owning sync
// task feeds it messages in arrival order and publishes snapshots after
// every call.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::model::{Entity, EntityId};
use crate::store::{EditKind, EntityCache, PendingEdits, UpsertOutcome};

/// What the reconciler did with a feed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The cache changed; publish a new snapshot.
    Applied,
    /// Stale, shadowed by a pending edit, or not resident -- no change.
    Ignored,
    /// The server state contradicts what a pending optimistic edit
    /// assumed. The cache now holds the server state, but the owner
    /// should re-run the affected query to be sure.
    Diverged,
}

pub struct Reconciler<T: Entity> {
    cache: EntityCache<T>,
    pending: PendingEdits,
}

impl<T: Entity> Reconciler<T> {
    pub fn new(page_size: u32) -> Self {
        Self {
            cache: EntityCache::new(page_size),
            pending: PendingEdits::new(),
        }
    }

    pub fn cache(&self) -> &EntityCache<T> {
        &self.cache
    }

    pub fn set_filter(&mut self, name: &str, value: Option<String>) {
        self.cache.set_filter(name, value);
    }

    // ── Fetch results ────────────────────────────────────────────────

    /// Apply a full page fetch. The window is replaced wholesale and
    /// every outstanding optimistic edit is superseded -- the fetch is
    /// authoritative for everything it covers.
    pub fn apply_page(&mut self, page: u32, items: Vec<T>, total_count: u64) {
        self.pending.clear();
        self.cache.set_page(page, items, total_count);
    }

    /// Apply a corrective single-entity refetch (after a failed or
    /// conflicted write). The refetched state supersedes the optimistic
    /// edit entirely; no patch-level rollback.
    pub fn apply_refetched(&mut self, entity: T) {
        self.pending.resolve(entity.id());
        if self.cache.contains(entity.id()) {
            // Version check still applies: a feed update may have raced
            // in with something newer than this refetch response.
            self.cache.upsert(entity);
        }
    }

    /// A corrective refetch came back 404: the entity no longer exists
    /// server-side. Drop it and shrink the total.
    pub fn remove_missing(&mut self, id: &EntityId) {
        self.pending.resolve(id);
        if self.cache.remove(id).is_some() {
            self.cache.adjust_total(-1);
        }
    }

    // ── Feed events ──────────────────────────────────────────────────

    /// Apply a feed `insert` event.
    ///
    /// Delivery is at-least-once, so an insert for a resident id is
    /// treated as an update rather than double-counted.
    pub fn apply_insert(&mut self, entity: T) -> EventOutcome {
        if self.cache.contains(entity.id()) {
            return self.apply_update(entity);
        }

        self.cache.adjust_total(1);

        let info = self.cache.page_info();
        if info.page == 1 && !entity.is_soft_deleted() && entity.matches(self.cache.filters()) {
            self.cache.insert_first(entity);
            self.cache.truncate_to_page();
        } else {
            // Off-window: only the total moved. The entity is fetched
            // lazily if and when it pages in.
            debug!(id = %entity.id(), "insert outside window, total adjusted only");
        }
        EventOutcome::Applied
    }

    /// Apply a feed `update` event (version-checked).
    ///
    /// An event that does not strictly postdate a pending optimistic
    /// edit on the same entity is discarded -- the edit is the freshest
    /// known intent. A strictly newer event resolves the edit in favor
    /// of the server state; if that state contradicts what the edit
    /// assumed, the owner is told to re-run the query.
    pub fn apply_update(&mut self, entity: T) -> EventOutcome {
        let id = entity.id().clone();
        let marker = entity.version_marker();

        if self.pending.shadows(&id, marker) {
            debug!(id = %id, %marker, "update predates pending optimistic edit, discarded");
            return EventOutcome::Ignored;
        }

        let resolved = self.pending.resolve(&id);

        if !self.cache.contains(&id) {
            // Only entities already materialized in the UI reflect feed
            // updates; off-page entities arrive via fetch.
            return EventOutcome::Ignored;
        }

        let diverged = resolved.is_some_and(|edit| !edit.kind.agrees_with(&entity));

        match self.cache.upsert(entity) {
            UpsertOutcome::Stale => EventOutcome::Ignored,
            _ if diverged => {
                debug!(id = %id, "server state contradicts optimistic edit, query re-run needed");
                EventOutcome::Diverged
            }
            _ => EventOutcome::Applied,
        }
    }

    // ── Optimistic edits ─────────────────────────────────────────────

    /// Apply a local mutation ahead of server confirmation.
    ///
    /// Returns `false` if the entity is not resident (nothing to edit).
    pub fn apply_optimistic(
        &mut self,
        id: &EntityId,
        kind: EditKind,
        mutate: impl FnOnce(&mut T),
    ) -> bool {
        if self.cache.apply_optimistic(id, mutate) {
            self.pending.note(id.clone(), kind);
            true
        } else {
            false
        }
    }

    /// As [`apply_optimistic`](Self::apply_optimistic) with an explicit
    /// edit timestamp, for deterministic tests.
    pub fn apply_optimistic_at(
        &mut self,
        id: &EntityId,
        kind: EditKind,
        applied_at: DateTime<Utc>,
        mutate: impl FnOnce(&mut T),
    ) -> bool {
        if self.cache.apply_optimistic(id, mutate) {
            self.pending.note_at(id.clone(), kind, applied_at);
            true
        } else {
            false
        }
    }

    /// The server confirmed a write: the pending edit is resolved, the
    /// optimistic state stands until the next upsert or refetch.
    pub fn resolve_write(&mut self, id: &EntityId) {
        self.pending.resolve(id);
    }

    /// The server confirmed a restore: clear the soft-delete and move
    /// the entity back to the head of the list.
    pub fn confirm_restore(&mut self, id: &EntityId) -> bool {
        self.pending.resolve(id);
        match self.cache.remove(id) {
            Some(mut entity) => {
                entity.set_soft_deleted_at(None);
                self.cache.insert_first(entity);
                self.cache.truncate_to_page();
                true
            }
            None => false,
        }
    }

    /// Is an optimistic edit still awaiting resolution for this entity?
    pub fn has_pending(&self, id: &EntityId) -> bool {
        self.pending.contains(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{Notification, NotificationCategory};
    use chrono::{DateTime, Utc};

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn notification(id: &str, updated_at: &str) -> Notification {
        Notification {
            id: EntityId::from(id),
            title: format!("notification {id}"),
            body: None,
            category: NotificationCategory::System,
            is_read: false,
            created_at: at("2026-03-01T00:00:00Z"),
            updated_at: at(updated_at),
            deleted_at: None,
        }
    }

    fn loaded(page_size: u32, ids: &[&str]) -> Reconciler<Notification> {
        let mut r = Reconciler::new(page_size);
        let items = ids
            .iter()
            .map(|id| notification(id, "2026-03-01T09:00:00Z"))
            .collect::<Vec<_>>();
        let total = u64::try_from(items.len()).unwrap();
        r.apply_page(1, items, total);
        r
    }

    #[test]
    fn insert_on_page_one_materializes_and_bumps_total() {
        let mut r = loaded(10, &["n-1", "n-2"]);

        let outcome = r.apply_insert(notification("n-0", "2026-03-01T10:00:00Z"));
        assert_eq!(outcome, EventOutcome::Applied);

        let order: Vec<String> = r.cache().visible().map(|n| n.id.to_string()).collect();
        assert_eq!(order, vec!["n-0", "n-1", "n-2"]);
        assert_eq!(r.cache().page_info().total_count, 3);
    }

    #[test]
    fn insert_off_page_one_adjusts_total_only() {
        let mut r = Reconciler::new(10);
        r.apply_page(
            2,
            vec![notification("n-11", "2026-03-01T09:00:00Z")],
            20,
        );

        r.apply_insert(notification("n-0", "2026-03-01T10:00:00Z"));

        assert!(!r.cache().contains(&EntityId::from("n-0")));
        assert_eq!(r.cache().page_info().total_count, 21);
    }

    #[test]
    fn insert_not_matching_filter_adjusts_total_only() {
        let mut r = loaded(10, &["n-1"]);
        r.set_filter("category", Some("payment".to_owned()));

        // System-category entity does not satisfy the active filter.
        r.apply_insert(notification("n-2", "2026-03-01T10:00:00Z"));

        assert!(!r.cache().contains(&EntityId::from("n-2")));
        assert_eq!(r.cache().page_info().total_count, 2);
    }

    #[test]
    fn insert_redelivery_does_not_double_count() {
        let mut r = loaded(10, &["n-1"]);

        let fresh = notification("n-0", "2026-03-01T10:00:00Z");
        r.apply_insert(fresh.clone());
        assert_eq!(r.cache().page_info().total_count, 2);

        // The feed redelivers the same insert after a reconnect.
        r.apply_insert(fresh);
        assert_eq!(r.cache().page_info().total_count, 2);
        assert_eq!(r.cache().len(), 2);
    }

    #[test]
    fn insert_overflow_trims_window() {
        let mut r = Reconciler::new(2);
        r.apply_page(
            1,
            vec![
                notification("n-1", "2026-03-01T09:00:00Z"),
                notification("n-2", "2026-03-01T09:00:00Z"),
            ],
            2,
        );

        r.apply_insert(notification("n-0", "2026-03-01T10:00:00Z"));

        let order: Vec<String> = r.cache().visible().map(|n| n.id.to_string()).collect();
        assert_eq!(order, vec!["n-0", "n-1"]);
        assert_eq!(r.cache().page_info().total_count, 3);
    }

    #[test]
    fn update_for_resident_entity_applies() {
        let mut r = loaded(10, &["n-1"]);

        let mut newer = notification("n-1", "2026-03-01T10:00:00Z");
        newer.is_read = true;
        assert_eq!(r.apply_update(newer), EventOutcome::Applied);
        assert!(r.cache().get(&EntityId::from("n-1")).unwrap().is_read);
    }

    #[test]
    fn update_for_off_window_entity_is_ignored() {
        let mut r = loaded(10, &["n-1"]);

        let outcome = r.apply_update(notification("n-99", "2026-03-01T10:00:00Z"));
        assert_eq!(outcome, EventOutcome::Ignored);
        assert!(!r.cache().contains(&EntityId::from("n-99")));
    }

    #[test]
    fn stale_update_is_ignored() {
        let mut r = Reconciler::new(10);
        r.apply_page(
            1,
            vec![notification("n-1", "2026-03-01T10:00:00Z")],
            1,
        );

        let outcome = r.apply_update(notification("n-1", "2026-03-01T09:00:00Z"));
        assert_eq!(outcome, EventOutcome::Ignored);
    }

    // Scenario: late push update after optimistic edit. The client marks
    // "n-1" read; a push update with an older marker and is_read=false
    // arrives; "n-1" must stay read.
    #[test]
    fn late_push_update_after_optimistic_edit_is_discarded() {
        let mut r = loaded(10, &["n-1"]);
        let id = EntityId::from("n-1");

        r.apply_optimistic_at(&id, EditKind::MarkRead, at("2026-03-01T09:30:00Z"), |n| {
            n.is_read = true;
        });

        let late = notification("n-1", "2026-03-01T09:10:00Z");
        assert_eq!(r.apply_update(late), EventOutcome::Ignored);

        assert!(r.cache().get(&id).unwrap().is_read);
        assert!(r.has_pending(&id));
    }

    #[test]
    fn newer_push_update_resolves_pending_edit() {
        let mut r = loaded(10, &["n-1"]);
        let id = EntityId::from("n-1");

        r.apply_optimistic_at(&id, EditKind::MarkRead, at("2026-03-01T09:30:00Z"), |n| {
            n.is_read = true;
        });

        let mut newer = notification("n-1", "2026-03-01T09:45:00Z");
        newer.is_read = true;
        assert_eq!(r.apply_update(newer), EventOutcome::Applied);
        assert!(!r.has_pending(&id));
    }

    #[test]
    fn concurrent_restore_against_pending_soft_delete_diverges() {
        let mut r = loaded(10, &["n-1"]);
        let id = EntityId::from("n-1");

        r.apply_optimistic_at(&id, EditKind::SoftDelete, at("2026-03-01T09:30:00Z"), |n| {
            n.deleted_at = Some(at("2026-03-01T09:30:00Z"));
        });

        // Another session restored the entity meanwhile: newer marker,
        // not deleted -- contradicts what the pending soft-delete assumed.
        let restored = notification("n-1", "2026-03-01T09:45:00Z");
        assert_eq!(r.apply_update(restored), EventOutcome::Diverged);

        // Server state won locally either way.
        assert!(r.cache().get(&id).unwrap().deleted_at.is_none());
        assert!(!r.has_pending(&id));
    }

    #[test]
    fn page_fetch_supersedes_pending_edits() {
        let mut r = loaded(10, &["n-1"]);
        let id = EntityId::from("n-1");

        r.apply_optimistic(&id, EditKind::MarkRead, |n| n.is_read = true);
        assert!(r.has_pending(&id));

        r.apply_page(
            1,
            vec![notification("n-1", "2026-03-01T11:00:00Z")],
            1,
        );

        assert!(!r.has_pending(&id));
        assert!(!r.cache().get(&id).unwrap().is_read);
    }

    #[test]
    fn refetch_supersedes_optimistic_state() {
        let mut r = loaded(10, &["n-1"]);
        let id = EntityId::from("n-1");

        r.apply_optimistic(&id, EditKind::MarkRead, |n| n.is_read = true);

        // Server still says unread (write failed); same marker as stored.
        let server_state = notification("n-1", "2026-03-01T09:00:00Z");
        r.apply_refetched(server_state);

        assert!(!r.cache().get(&id).unwrap().is_read);
        assert!(!r.has_pending(&id));
    }

    #[test]
    fn refetch_missing_drops_entity_and_total() {
        let mut r = loaded(10, &["n-1", "n-2"]);
        let id = EntityId::from("n-1");

        r.remove_missing(&id);

        assert!(!r.cache().contains(&id));
        assert_eq!(r.cache().page_info().total_count, 1);
    }

    #[test]
    fn confirm_restore_reinserts_at_head() {
        let mut r = loaded(10, &["n-1", "n-2"]);
        let id = EntityId::from("n-2");

        r.apply_optimistic(&id, EditKind::SoftDelete, |n| {
            n.deleted_at = Some(at("2026-03-01T09:30:00Z"));
        });
        assert_eq!(r.cache().visible().count(), 1);

        assert!(r.confirm_restore(&id));

        let order: Vec<String> = r.cache().visible().map(|n| n.id.to_string()).collect();
        assert_eq!(order, vec!["n-2", "n-1"]);
        assert!(!r.has_pending(&id));
    }
}
