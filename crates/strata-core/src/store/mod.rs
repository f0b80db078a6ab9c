// ── Synchronized store internals ──
//
// The page-window cache and the pending optimistic edit set. Both are
// pure in-memory structures; the reconciler composes them.

mod cache;
mod pending;

pub use cache::{EntityCache, PageInfo, UpsertOutcome};
pub use pending::{EditKind, PendingEdit, PendingEdits};
