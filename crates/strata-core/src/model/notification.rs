// ── Notification entity ──

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use strata_api::NotificationRecord;

use super::{Entity, EntityId};

/// Inbox notification category, matching the portal's category slugs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NotificationCategory {
    Payment,
    Maintenance,
    Lease,
    Announcement,
    #[default]
    System,
}

/// An inbox item fed by both paged fetches and the change feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: EntityId,
    pub title: String,
    pub body: Option<String>,
    pub category: NotificationCategory,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    /// Server last-write time -- the version marker.
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Notification {
    /// Unread and visible: the predicate behind the unread aggregate.
    pub fn is_unread(&self) -> bool {
        !self.is_read && self.deleted_at.is_none()
    }
}

impl Entity for Notification {
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
        if let Some(category) = filters.get("category") {
            if self.category.to_string() != *category {
                return false;
            }
        }
        if let Some(unread) = filters.get("unread") {
            if unread == "true" && self.is_read {
                return false;
            }
        }
        true
    }
}

impl From<NotificationRecord> for Notification {
    fn from(record: NotificationRecord) -> Self {
        Self {
            id: EntityId::from(record.id),
            title: record.title,
            body: record.body,
            category: record.category.parse().unwrap_or_default(),
            is_read: record.is_read,
            created_at: record.created_at,
            updated_at: record.updated_at,
            deleted_at: record.deleted_at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn notification(category: NotificationCategory, is_read: bool) -> Notification {
        Notification {
            id: EntityId::from("n-1"),
            title: "Levy notice issued".into(),
            body: None,
            category,
            is_read,
            created_at: "2026-03-01T09:00:00Z".parse().unwrap(),
            updated_at: "2026-03-01T09:00:00Z".parse().unwrap(),
            deleted_at: None,
        }
    }

    #[test]
    fn category_filter_matches_slug() {
        let n = notification(NotificationCategory::Payment, false);

        let mut filters = BTreeMap::new();
        filters.insert("category".to_owned(), "payment".to_owned());
        assert!(n.matches(&filters));

        filters.insert("category".to_owned(), "maintenance".to_owned());
        assert!(!n.matches(&filters));
    }

    #[test]
    fn unread_filter() {
        let unread = notification(NotificationCategory::System, false);
        let read = notification(NotificationCategory::System, true);

        let mut filters = BTreeMap::new();
        filters.insert("unread".to_owned(), "true".to_owned());
        assert!(unread.matches(&filters));
        assert!(!read.matches(&filters));
    }

    #[test]
    fn unknown_category_slug_defaults_to_system() {
        let record = NotificationRecord {
            id: "n-9".into(),
            title: "t".into(),
            body: None,
            category: "mystery".into(),
            is_read: false,
            created_at: "2026-03-01T09:00:00Z".parse().unwrap(),
            updated_at: "2026-03-01T09:00:00Z".parse().unwrap(),
            deleted_at: None,
        };
        let n = Notification::from(record);
        assert_eq!(n.category, NotificationCategory::System);
    }

    #[test]
    fn soft_deleted_is_not_unread() {
        let mut n = notification(NotificationCategory::Payment, false);
        assert!(n.is_unread());
        n.deleted_at = Some(Utc::now());
        assert!(!n.is_unread());
    }
}
