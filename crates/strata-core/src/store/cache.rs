// ── Entity cache ──
//
// Pure in-memory page window for one entity kind. No I/O, no channels,
// no knowledge of the network. Insertion order is preserved so listings
// stay stable across upserts.
//
// Concurrency control is exactly one rule: `upsert` replaces an entry
// only when the incoming version marker is >= the stored one. A stale
// marker is a silent no-op. All mutation happens from a single owning
// task, so this check is the only ordering mechanism the store needs.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::model::{Entity, EntityId};

/// Pagination state for the current window.
///
/// `total_count` reflects the last server-reported count for the active
/// filter set -- NOT the window size. The window holds at most one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    /// 1-based page index.
    pub page: u32,
    pub page_size: u32,
    pub total_count: u64,
}

/// What `upsert` did with the incoming entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The id was new; the entity was appended to the window.
    Inserted,
    /// An existing entry was replaced (incoming marker >= stored).
    Replaced,
    /// The incoming marker was strictly older; nothing changed.
    Stale,
}

/// In-memory keyed collection for a single entity kind.
pub struct EntityCache<T: Entity> {
    items: IndexMap<EntityId, T>,
    page_info: PageInfo,
    filters: BTreeMap<String, String>,
}

impl<T: Entity> EntityCache<T> {
    pub fn new(page_size: u32) -> Self {
        Self {
            items: IndexMap::new(),
            page_info: PageInfo {
                page: 1,
                page_size,
                total_count: 0,
            },
            filters: BTreeMap::new(),
        }
    }

    // ── Mutation primitives ──────────────────────────────────────────

    /// Insert or version-checked replace.
    ///
    /// Last-writer-wins by server timestamp, never by arrival time: an
    /// incoming marker strictly older than the stored one is dropped.
    /// This is what keeps an in-flight optimistic mark-read from being
    /// clobbered by a late-arriving, older "unread" push event.
    pub fn upsert(&mut self, entity: T) -> UpsertOutcome {
        match self.items.get(entity.id()) {
            None => {
                self.items.insert(entity.id().clone(), entity);
                UpsertOutcome::Inserted
            }
            Some(existing) if entity.version_marker() >= existing.version_marker() => {
                self.items.insert(entity.id().clone(), entity);
                UpsertOutcome::Replaced
            }
            Some(_) => UpsertOutcome::Stale,
        }
    }

    /// Prepend an entity at the head of the window (feed inserts on
    /// page 1, undo re-insert). No version check -- the caller decides.
    pub fn insert_first(&mut self, entity: T) {
        self.items.shift_remove(entity.id());
        self.items.shift_insert(0, entity.id().clone(), entity);
    }

    /// Remove an entity by id. Returns the removed entity if it existed.
    pub fn remove(&mut self, id: &EntityId) -> Option<T> {
        self.items.shift_remove(id)
    }

    /// Replace the current page window wholesale with a fetch result.
    pub fn set_page(&mut self, page: u32, items: Vec<T>, total_count: u64) {
        self.items = items
            .into_iter()
            .map(|e| {
                let id = e.id().clone();
                (id, e)
            })
            .collect();
        self.page_info.page = page;
        self.page_info.total_count = total_count;
    }

    /// Apply a local-only change without a version check.
    ///
    /// Optimistic edits always win locally until superseded by a real
    /// upsert or a refetch. Returns `false` if the id is not resident.
    pub fn apply_optimistic(&mut self, id: &EntityId, mutate: impl FnOnce(&mut T)) -> bool {
        match self.items.get_mut(id) {
            Some(entity) => {
                mutate(entity);
                true
            }
            None => false,
        }
    }

    /// Adjust the server-reported total by a delta, clamped at zero.
    pub fn adjust_total(&mut self, delta: i64) {
        let total = i64::try_from(self.page_info.total_count).unwrap_or(i64::MAX);
        self.page_info.total_count = u64::try_from(total.saturating_add(delta)).unwrap_or(0);
    }

    /// Drop entries past the page size, oldest-position last.
    ///
    /// Evicted entities simply stop being resident; they re-enter via a
    /// future fetch if they page back in.
    pub fn truncate_to_page(&mut self) {
        let limit = usize::try_from(self.page_info.page_size).unwrap_or(usize::MAX);
        self.items.truncate(limit);
    }

    // ── Filters ──────────────────────────────────────────────────────

    pub fn filters(&self) -> &BTreeMap<String, String> {
        &self.filters
    }

    /// Set or clear one filter. Callers refetch afterwards -- the filter
    /// map describes the *current* server query, it does not re-filter
    /// resident items.
    pub fn set_filter(&mut self, name: &str, value: Option<String>) {
        match value {
            Some(v) => {
                self.filters.insert(name.to_owned(), v);
            }
            None => {
                self.filters.remove(name);
            }
        }
    }

    // ── Read access ──────────────────────────────────────────────────

    pub fn get(&self, id: &EntityId) -> Option<&T> {
        self.items.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.items.contains_key(id)
    }

    /// Number of resident entities, including hidden soft-deleted ones.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn page_info(&self) -> PageInfo {
        self.page_info
    }

    /// All user-visible entities in window order. Soft-deleted entities
    /// are excluded here but stay resident for undo.
    pub fn visible(&self) -> impl Iterator<Item = &T> {
        self.items.values().filter(|e| !e.is_soft_deleted())
    }

    pub fn visible_ids(&self) -> Vec<EntityId> {
        self.visible().map(|e| e.id().clone()).collect()
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

    #[test]
    fn upsert_inserts_new_id() {
        let mut cache = EntityCache::new(10);
        let outcome = cache.upsert(notification("n-1", "2026-03-01T09:00:00Z"));
        assert_eq!(outcome, UpsertOutcome::Inserted);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn upsert_replaces_on_newer_marker() {
        let mut cache = EntityCache::new(10);
        cache.upsert(notification("n-1", "2026-03-01T09:00:00Z"));

        let mut newer = notification("n-1", "2026-03-01T09:05:00Z");
        newer.is_read = true;
        assert_eq!(cache.upsert(newer), UpsertOutcome::Replaced);
        assert!(cache.get(&EntityId::from("n-1")).unwrap().is_read);
    }

    #[test]
    fn upsert_rejects_stale_marker() {
        let mut cache = EntityCache::new(10);
        let mut current = notification("n-1", "2026-03-01T09:05:00Z");
        current.is_read = true;
        cache.upsert(current);

        // Older event claiming unread must not change any visible field.
        let stale = notification("n-1", "2026-03-01T09:00:00Z");
        assert_eq!(cache.upsert(stale), UpsertOutcome::Stale);
        assert!(cache.get(&EntityId::from("n-1")).unwrap().is_read);
    }

    #[test]
    fn upsert_accepts_equal_marker() {
        let mut cache = EntityCache::new(10);
        cache.upsert(notification("n-1", "2026-03-01T09:00:00Z"));

        let mut same_time = notification("n-1", "2026-03-01T09:00:00Z");
        same_time.is_read = true;
        assert_eq!(cache.upsert(same_time), UpsertOutcome::Replaced);
    }

    #[test]
    fn version_marker_is_monotonic_across_any_order() {
        let mut cache = EntityCache::new(10);
        let markers = [
            "2026-03-01T09:03:00Z",
            "2026-03-01T09:01:00Z",
            "2026-03-01T09:05:00Z",
            "2026-03-01T09:02:00Z",
        ];

        let mut high_water = at("2026-03-01T00:00:00Z");
        for marker in markers {
            cache.upsert(notification("n-1", marker));
            let stored = cache
                .get(&EntityId::from("n-1"))
                .unwrap()
                .version_marker();
            assert!(stored >= high_water, "marker regressed to {stored}");
            high_water = stored;
        }
        assert_eq!(high_water, at("2026-03-01T09:05:00Z"));
    }

    #[test]
    fn set_page_replaces_window_but_total_is_server_count() {
        let mut cache = EntityCache::new(10);
        cache.upsert(notification("old", "2026-03-01T09:00:00Z"));

        let items = (1..=5)
            .map(|i| notification(&format!("n-{i}"), "2026-03-01T09:00:00Z"))
            .collect();
        cache.set_page(1, items, 37);

        assert_eq!(cache.len(), 5);
        assert_eq!(cache.page_info().total_count, 37);
        assert!(!cache.contains(&EntityId::from("old")));
    }

    #[test]
    fn insertion_order_is_stable_across_upserts() {
        let mut cache = EntityCache::new(10);
        cache.set_page(
            1,
            vec![
                notification("n-1", "2026-03-01T09:00:00Z"),
                notification("n-2", "2026-03-01T09:00:00Z"),
                notification("n-3", "2026-03-01T09:00:00Z"),
            ],
            3,
        );

        // Updating the middle entity must not move it.
        cache.upsert(notification("n-2", "2026-03-01T10:00:00Z"));

        let order: Vec<String> = cache.visible().map(|n| n.id.to_string()).collect();
        assert_eq!(order, vec!["n-1", "n-2", "n-3"]);
    }

    #[test]
    fn insert_first_prepends() {
        let mut cache = EntityCache::new(10);
        cache.set_page(
            1,
            vec![notification("n-1", "2026-03-01T09:00:00Z")],
            1,
        );
        cache.insert_first(notification("n-0", "2026-03-01T09:30:00Z"));

        let order: Vec<String> = cache.visible().map(|n| n.id.to_string()).collect();
        assert_eq!(order, vec!["n-0", "n-1"]);
    }

    #[test]
    fn truncate_to_page_drops_tail() {
        let mut cache = EntityCache::new(2);
        cache.set_page(
            1,
            vec![
                notification("n-1", "2026-03-01T09:00:00Z"),
                notification("n-2", "2026-03-01T09:00:00Z"),
            ],
            5,
        );
        cache.insert_first(notification("n-0", "2026-03-01T09:30:00Z"));
        cache.truncate_to_page();

        assert_eq!(cache.len(), 2);
        let order: Vec<String> = cache.visible().map(|n| n.id.to_string()).collect();
        assert_eq!(order, vec!["n-0", "n-1"]);
    }

    #[test]
    fn soft_deleted_hidden_but_resident() {
        let mut cache = EntityCache::new(10);
        cache.set_page(
            1,
            vec![
                notification("n-1", "2026-03-01T09:00:00Z"),
                notification("n-2", "2026-03-01T09:00:00Z"),
            ],
            2,
        );

        cache.apply_optimistic(&EntityId::from("n-1"), |n| {
            n.deleted_at = Some(at("2026-03-01T10:00:00Z"));
        });

        assert_eq!(cache.visible().count(), 1);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&EntityId::from("n-1")));
    }

    #[test]
    fn apply_optimistic_ignores_version() {
        let mut cache = EntityCache::new(10);
        cache.upsert(notification("n-1", "2026-03-01T09:00:00Z"));

        let applied = cache.apply_optimistic(&EntityId::from("n-1"), |n| n.is_read = true);
        assert!(applied);
        assert!(cache.get(&EntityId::from("n-1")).unwrap().is_read);

        let missing = cache.apply_optimistic(&EntityId::from("n-404"), |n| n.is_read = true);
        assert!(!missing);
    }

    #[test]
    fn adjust_total_clamps_at_zero() {
        let mut cache: EntityCache<Notification> = EntityCache::new(10);
        cache.adjust_total(-3);
        assert_eq!(cache.page_info().total_count, 0);

        cache.adjust_total(2);
        assert_eq!(cache.page_info().total_count, 2);
    }

    #[test]
    fn filters_set_and_clear() {
        let mut cache: EntityCache<Notification> = EntityCache::new(10);
        cache.set_filter("category", Some("payment".to_owned()));
        assert_eq!(
            cache.filters().get("category").map(String::as_str),
            Some("payment")
        );

        cache.set_filter("category", None);
        assert!(cache.filters().is_empty());
    }
}
