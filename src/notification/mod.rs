//! Notification synthesis - snapshots in, deduplicated feed out
//!
//! # Pipeline
//! 1. `source::fetch_snapshots` fetches every resource the enabled categories need
//! 2. `diff` compares each category against its seen-state
//! 3. `synthesizer` turns events into records with deterministic ids
//! 4. `feed` merges records into the capped feed
//! 5. `engine` commits seen-state and feed together
//!
//! # Example
//! ```ignore
//! use lms_notify::notification::{EngineConfig, NotificationEngine, Role, Trigger};
//!
//! let engine = NotificationEngine::new(backend, kv, "user-1", Role::Student, EngineConfig::default());
//! engine.run_cycle(Trigger::Manual, &CancellationToken::new()).await?;
//! println!("{} unread", engine.feed_view().unread);
//! ```

pub mod category;
pub mod diff;
pub mod engine;
pub mod event;
pub mod feed;
pub mod record;
pub mod synthesizer;

pub use category::{Category, DiffPolicy, Role};
pub use diff::{diff_category, CategoryDiff};
pub use engine::{
    CycleOutcome, CycleReport, EngineConfig, NotificationEngine, PollPhase, Trigger,
    DEFAULT_FETCH_TIMEOUT,
};
pub use event::{Event, EventKind, QuestionRef};
pub use feed::{assemble, DEFAULT_FEED_CAP};
pub use record::{notification_id, FeedItem, FeedView, NotificationRecord};
pub use synthesizer::synthesize;
