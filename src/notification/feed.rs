//! Feed assembler - merge, order and cap

use std::collections::HashSet;

use super::record::NotificationRecord;

pub const DEFAULT_FEED_CAP: usize = 50;

/// Merge `new` into `existing` by id (existing wins), newest first, ties by id,
/// truncated to `cap`. Re-merging the same records is a no-op.
pub fn assemble(
    existing: &[NotificationRecord],
    new: &[NotificationRecord],
    cap: usize,
) -> Vec<NotificationRecord> {
    let mut seen = HashSet::new();
    let mut feed: Vec<NotificationRecord> = existing
        .iter()
        .chain(new.iter())
        .filter(|r| seen.insert(r.id.as_str()))
        .cloned()
        .collect();

    feed.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    feed.truncate(cap);
    feed
}
