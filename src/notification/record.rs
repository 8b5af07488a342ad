//! Notification record - one user-visible feed entry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::category::Category;

/// Feed entry. Immutable once created; read state lives in its own store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    /// `<category>:<entity id>:<marker>`
    pub id: String,
    pub category: Category,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    /// Role-scoped dashboard deep link
    pub href: String,
}

/// Deterministic id of the notification for one fact
pub fn notification_id(category: Category, entity_id: &str, marker: &str) -> String {
    format!("{}:{}:{}", category.as_str(), entity_id, marker)
}

/// Record paired with its read flag, as shown to the user
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    #[serde(flatten)]
    pub record: NotificationRecord,
    pub read: bool,
}

/// Feed plus unread count
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedView {
    pub items: Vec<FeedItem>,
    pub unread: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_shape() {
        let record = NotificationRecord {
            id: notification_id(Category::NewQuestions, "m1", "5"),
            category: Category::NewQuestions,
            title: "Soal Baru".to_string(),
            message: "2 soal baru di Aljabar".to_string(),
            created_at: DateTime::parse_from_rfc3339("2026-03-01T08:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            href: "/student/classes/c1/materials/m1".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "new_questions:m1:5");
        assert_eq!(json["category"], "new_questions");
        assert_eq!(json["createdAt"], "2026-03-01T08:00:00Z");

        let item = FeedItem { record, read: true };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["read"], true);
        assert_eq!(json["title"], "Soal Baru");
    }
}
