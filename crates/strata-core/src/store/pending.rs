// ── Pending optimistic edits ──
//
// One entry per entity with an optimistic mutation awaiting server
// confirmation. Created synchronously with the cache mutation it
// represents; discarded when the server write succeeds, when a newer
// server state supersedes it, or when a reconciling refetch replaces the
// window. Never partially rolled back.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::{Entity, EntityId};

/// The kind of local mutation a pending edit represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    MarkRead,
    SoftDelete,
    Restore,
    Select,
}

impl EditKind {
    /// What this edit assumes about the entity's soft-delete state once
    /// the server has applied it, if it assumes anything at all.
    fn assumes_deleted(self) -> Option<bool> {
        match self {
            Self::SoftDelete => Some(true),
            Self::Restore => Some(false),
            Self::MarkRead | Self::Select => None,
        }
    }

    /// Does a confirmed server state agree with what this edit assumed?
    ///
    /// A disagreement (e.g. a soft-delete racing a concurrent restore
    /// from another session) cannot be resolved locally -- the caller
    /// defers to the server and re-runs the affected query.
    pub fn agrees_with<T: Entity>(self, entity: &T) -> bool {
        match self.assumes_deleted() {
            Some(expected) => entity.is_soft_deleted() == expected,
            None => true,
        }
    }
}

/// A single optimistic edit awaiting resolution.
#[derive(Debug, Clone, Copy)]
pub struct PendingEdit {
    pub kind: EditKind,
    /// Local wall-clock time the edit was applied. Push events with a
    /// version marker at or before this are discarded -- the edit is the
    /// freshest known intent.
    pub applied_at: DateTime<Utc>,
}

/// The pending-edit set for one store, keyed by entity id.
///
/// At most one pending edit per entity: a second optimistic action on
/// the same entity replaces the first (the newer intent wins).
#[derive(Debug, Default)]
pub struct PendingEdits {
    edits: HashMap<EntityId, PendingEdit>,
}

impl PendingEdits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an edit applied now.
    pub fn note(&mut self, id: EntityId, kind: EditKind) {
        self.note_at(id, kind, Utc::now());
    }

    /// Record an edit with an explicit timestamp (tests, replays).
    pub fn note_at(&mut self, id: EntityId, kind: EditKind, applied_at: DateTime<Utc>) {
        self.edits.insert(id, PendingEdit { kind, applied_at });
    }

    pub fn get(&self, id: &EntityId) -> Option<&PendingEdit> {
        self.edits.get(id)
    }

    /// Does a pending edit shadow an incoming event with this marker?
    ///
    /// True when an edit exists and the event does not strictly postdate
    /// it -- the optimistic edit is the freshest known intent, so the
    /// event is discarded. A strictly newer event resolves the edit
    /// instead (the caller removes it via [`resolve`](Self::resolve)).
    pub fn shadows(&self, id: &EntityId, marker: DateTime<Utc>) -> bool {
        self.edits
            .get(id)
            .is_some_and(|edit| marker <= edit.applied_at)
    }

    /// Discard the pending edit for an entity, returning it if present.
    pub fn resolve(&mut self, id: &EntityId) -> Option<PendingEdit> {
        self.edits.remove(id)
    }

    /// Discard everything. A full window refetch supersedes all
    /// outstanding optimistic edits.
    pub fn clear(&mut self) {
        self.edits.clear();
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.edits.contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn shadows_event_at_or_before_edit() {
        let mut pending = PendingEdits::new();
        let id = EntityId::from("n-1");
        pending.note_at(id.clone(), EditKind::MarkRead, at("2026-03-01T09:00:00Z"));

        assert!(pending.shadows(&id, at("2026-03-01T08:59:00Z")));
        assert!(pending.shadows(&id, at("2026-03-01T09:00:00Z")));
        assert!(!pending.shadows(&id, at("2026-03-01T09:00:01Z")));
    }

    #[test]
    fn no_shadow_without_pending_edit() {
        let pending = PendingEdits::new();
        assert!(!pending.shadows(&EntityId::from("n-1"), at("2026-03-01T09:00:00Z")));
    }

    #[test]
    fn second_edit_replaces_first() {
        let mut pending = PendingEdits::new();
        let id = EntityId::from("n-1");
        pending.note_at(id.clone(), EditKind::MarkRead, at("2026-03-01T09:00:00Z"));
        pending.note_at(id.clone(), EditKind::SoftDelete, at("2026-03-01T09:01:00Z"));

        assert_eq!(pending.get(&id).unwrap().kind, EditKind::SoftDelete);
    }

    #[test]
    fn resolve_removes_edit() {
        let mut pending = PendingEdits::new();
        let id = EntityId::from("n-1");
        pending.note(id.clone(), EditKind::MarkRead);

        assert!(pending.resolve(&id).is_some());
        assert!(pending.resolve(&id).is_none());
        assert!(pending.is_empty());
    }
}
