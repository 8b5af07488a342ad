//! Output formatting for CLI commands

use chrono::Local;
use serde::Serialize;

use crate::notification::{Category, CycleReport, FeedItem, FeedView, NotificationRecord};

/// Pretty JSON; falls back to `{}` if serialization fails
pub fn to_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

/// One feed line: `● [time] Title - message`
pub fn format_item(item: &FeedItem) -> String {
    let marker = if item.read { " " } else { "●" };
    format!("{} {}", marker, format_record(&item.record))
}

pub fn format_record(record: &NotificationRecord) -> String {
    format!(
        "[{}] {} - {}\n    {} ({})",
        record.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        record.title,
        record.message,
        record.href,
        record.id
    )
}

pub fn format_feed(view: &FeedView, unread_only: bool) -> String {
    let items: Vec<&FeedItem> = view
        .items
        .iter()
        .filter(|i| !unread_only || !i.read)
        .collect();
    if items.is_empty() {
        return "Tidak ada notifikasi".to_string();
    }
    let mut out = format!("{} notifikasi, {} belum dibaca:\n", view.items.len(), view.unread);
    for item in items {
        out.push('\n');
        out.push_str(&format_item(item));
    }
    out
}

pub fn format_report(report: &CycleReport) -> String {
    let mut out = format!(
        "Polling selesai: {} kategori, {} event, {} notifikasi baru, {} belum dibaca",
        report.categories.len(),
        report.events,
        report.new_records.len(),
        report.unread
    );
    if !report.failed.is_empty() {
        let failed: Vec<String> = report.failed.iter().map(|r| r.to_string()).collect();
        out.push_str(&format!("\n⚠️  Gagal diambil (dilewati): {}", failed.join(", ")));
    }
    for record in &report.new_records {
        out.push_str("\n  ");
        out.push_str(&format_record(record));
    }
    out
}

pub fn format_preferences(prefs: &[(Category, bool)]) -> String {
    prefs
        .iter()
        .map(|(category, enabled)| {
            format!(
                "  [{}] {:<26} {}",
                if *enabled { "x" } else { " " },
                category.as_str(),
                category.label()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(id: &str, read: bool) -> FeedItem {
        FeedItem {
            record: NotificationRecord {
                id: id.to_string(),
                category: Category::AiGrading,
                title: "Penilaian AI Selesai".to_string(),
                message: "Jawaban dinilai".to_string(),
                created_at: Utc::now(),
                href: "/student/classes/c1".to_string(),
            },
            read,
        }
    }

    #[test]
    fn test_format_feed_unread_filter() {
        let view = FeedView {
            items: vec![item("a", true), item("b", false)],
            unread: 1,
        };
        let all = format_feed(&view, false);
        assert!(all.contains("(a)") && all.contains("(b)"));

        let unread = format_feed(&view, true);
        assert!(!unread.contains("(a)"));
        assert!(unread.contains("● ["));

        assert_eq!(format_feed(&FeedView::default(), false), "Tidak ada notifikasi");
    }

    #[test]
    fn test_format_preferences() {
        let out = format_preferences(&[(Category::AiGrading, false)]);
        assert!(out.starts_with("  [ ] ai_grading"));
        assert!(out.ends_with("Penilaian AI"));
    }
}
