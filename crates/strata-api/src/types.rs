// Wire types for the portal REST API.
//
// These mirror the JSON the portal sends verbatim. `strata-core` converts
// them into its own domain types -- consumers of this crate only need them
// if they call the client directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Page envelope ────────────────────────────────────────────────────

/// One page of a listing endpoint.
///
/// `total_count` is the size of the full result set for the active filter
/// set, NOT the number of items in this page.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
}

/// Query parameters shared by every listing endpoint.
#[derive(Debug, Clone)]
pub struct PageQuery {
    /// 1-based page index.
    pub page: u32,
    pub page_size: u32,
    /// Filter name → value pairs, appended verbatim as query parameters.
    pub filters: Vec<(String, String)>,
}

impl PageQuery {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page,
            page_size,
            filters: Vec::new(),
        }
    }

    /// Render as `reqwest` query pairs.
    pub(crate) fn params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("page".to_owned(), self.page.to_string()),
            ("page_size".to_owned(), self.page_size.to_string()),
        ];
        params.extend(self.filters.iter().cloned());
        params
    }
}

// ── Notification records ─────────────────────────────────────────────

/// A notification as the portal serializes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub body: Option<String>,

    /// Category slug: "payment", "maintenance", "lease", "announcement", "system".
    pub category: String,

    #[serde(default)]
    pub is_read: bool,

    pub created_at: DateTime<Utc>,

    /// Server last-write time -- the version marker for reconciliation.
    pub updated_at: DateTime<Utc>,

    /// Set when the notification has been soft-deleted.
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Partial update body for `PATCH /notifications/{id}`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NotificationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
}

// ── Administrator records ────────────────────────────────────────────

/// A condominium-management entity as the portal serializes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdministratorRecord {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub suburb: Option<String>,

    #[serde(default)]
    pub building_count: Option<u32>,

    /// Server last-write time -- the version marker for reconciliation.
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

// ── Selection persistence ────────────────────────────────────────────

/// Body of `GET`/`PUT /me/active-administrator`.
///
/// The portal is the source of truth for the active selection across
/// devices and sessions; `None` means no preference recorded yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveAdministrator {
    pub administrator_id: Option<String>,
}
