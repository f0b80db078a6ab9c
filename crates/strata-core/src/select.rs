// ── Active-selection coordinator ──
//
// The tenant store's globally relevant derived state: which administrator
// is in scope for the whole manager UI. The state machine is deliberately
// tiny -- {unselected, selected(id)} -- and every correction it makes
// after a reconciliation must be persisted server-side by the owner.
//
// The notification store's aggregate (unread count) has no state machine
// at all: it is recomputed from the cache on every change, never stored.

use crate::model::EntityId;

/// Selection state for the active administrator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    Unselected,
    Selected(EntityId),
}

impl Selection {
    pub fn id(&self) -> Option<&EntityId> {
        match self {
            Self::Selected(id) => Some(id),
            Self::Unselected => None,
        }
    }
}

/// What a reconciliation pass did to the selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// Current selection is still a member of the visible set.
    Unchanged,
    /// Selection moved to a new id -- persist it.
    Corrected(EntityId),
    /// The visible set is empty; selection dropped -- persist the clear.
    Cleared,
}

/// State machine for the active administrator.
#[derive(Debug, Default)]
pub struct SelectionCoordinator {
    state: Selection,
}

impl SelectionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &Selection {
        &self.state
    }

    pub fn active_id(&self) -> Option<&EntityId> {
        self.state.id()
    }

    /// User- or server-driven transition. Returns `true` if the state
    /// actually changed.
    pub fn select(&mut self, id: EntityId) -> bool {
        if self.state.id() == Some(&id) {
            return false;
        }
        self.state = Selection::Selected(id);
        true
    }

    /// Re-validate the selection against the visible membership after a
    /// reconciliation.
    ///
    /// Once data has loaded, the selected id must be a member of the
    /// visible set; otherwise fall back to the server-declared preferred
    /// id, then the first listed item, then unselected. Any transition
    /// this makes is a correction the owner persists.
    pub fn reconcile(
        &mut self,
        visible: &[EntityId],
        preferred: Option<&EntityId>,
    ) -> SelectionOutcome {
        if let Selection::Selected(ref id) = self.state {
            if visible.contains(id) {
                return SelectionOutcome::Unchanged;
            }
        }

        let fallback = preferred
            .filter(|p| visible.contains(*p))
            .or_else(|| visible.first());

        match fallback {
            Some(id) => {
                self.state = Selection::Selected(id.clone());
                SelectionOutcome::Corrected(id.clone())
            }
            None => {
                if self.state == Selection::Unselected {
                    SelectionOutcome::Unchanged
                } else {
                    self.state = Selection::Unselected;
                    SelectionOutcome::Cleared
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<EntityId> {
        raw.iter().map(|s| EntityId::from(*s)).collect()
    }

    #[test]
    fn select_transitions_and_reports_change() {
        let mut c = SelectionCoordinator::new();
        assert!(c.select(EntityId::from("a-1")));
        assert!(!c.select(EntityId::from("a-1")));
        assert_eq!(c.active_id(), Some(&EntityId::from("a-1")));
    }

    #[test]
    fn reconcile_keeps_member_selection() {
        let mut c = SelectionCoordinator::new();
        c.select(EntityId::from("a-1"));

        let outcome = c.reconcile(&ids(&["a-1", "a-2"]), None);
        assert_eq!(outcome, SelectionOutcome::Unchanged);
    }

    // Scenario: the active tenant is deleted remotely. items = [A, B],
    // active = A; after the next reconciliation A is gone; the selection
    // must move to B and the correction must be persisted.
    #[test]
    fn deleted_active_falls_back_to_first_visible() {
        let mut c = SelectionCoordinator::new();
        c.select(EntityId::from("a-A"));

        let outcome = c.reconcile(&ids(&["a-B"]), None);
        assert_eq!(outcome, SelectionOutcome::Corrected(EntityId::from("a-B")));
        assert_eq!(c.active_id(), Some(&EntityId::from("a-B")));
    }

    #[test]
    fn preferred_id_beats_first_visible() {
        let mut c = SelectionCoordinator::new();

        let preferred = EntityId::from("a-2");
        let outcome = c.reconcile(&ids(&["a-1", "a-2"]), Some(&preferred));
        assert_eq!(outcome, SelectionOutcome::Corrected(EntityId::from("a-2")));
    }

    #[test]
    fn stale_preferred_id_falls_back_to_first() {
        let mut c = SelectionCoordinator::new();

        let preferred = EntityId::from("a-404");
        let outcome = c.reconcile(&ids(&["a-1", "a-2"]), Some(&preferred));
        assert_eq!(outcome, SelectionOutcome::Corrected(EntityId::from("a-1")));
    }

    #[test]
    fn empty_set_clears_selection() {
        let mut c = SelectionCoordinator::new();
        c.select(EntityId::from("a-1"));

        assert_eq!(c.reconcile(&[], None), SelectionOutcome::Cleared);
        assert_eq!(c.active_id(), None);

        // Already unselected + still empty: nothing to do or persist.
        assert_eq!(c.reconcile(&[], None), SelectionOutcome::Unchanged);
    }
}
