// ── Administrator entity ──

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use strata_api::AdministratorRecord;

use super::{Entity, EntityId};

/// A condominium-management entity visible to the signed-in manager.
///
/// One administrator is "active" at any time -- the selection shared
/// across the whole manager UI and persisted server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Administrator {
    pub id: EntityId,
    pub name: String,
    pub email: Option<String>,
    pub suburb: Option<String>,
    pub building_count: Option<u32>,
    /// Server last-write time -- the version marker.
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity for Administrator {
    fn id(&self) -> &EntityId {
        &self.id
    }

    fn version_marker(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn soft_deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn set_soft_deleted_at(&mut self, at: Option<DateTime<Utc>>) {
        self.deleted_at = at;
    }

    fn matches(&self, filters: &BTreeMap<String, String>) -> bool {
        if let Some(search) = filters.get("search") {
            let needle = search.to_lowercase();
            if !self.name.to_lowercase().contains(&needle) {
                return false;
            }
        }
        true
    }
}

impl From<AdministratorRecord> for Administrator {
    fn from(record: AdministratorRecord) -> Self {
        Self {
            id: EntityId::from(record.id),
            name: record.name,
            email: record.email,
            suburb: record.suburb,
            building_count: record.building_count,
            updated_at: record.updated_at,
            deleted_at: record.deleted_at,
        }
    }
}
