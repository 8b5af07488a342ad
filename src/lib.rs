//! LMS notifications - polls a role-scoped LMS backend and synthesizes a
//! deduplicated, categorized notification feed from state changes

pub mod cli;
pub mod config;
pub mod error;
pub mod notification;
pub mod scheduler;
pub mod source;
pub mod store;

pub use config::Config;
pub use error::FetchError;
pub use notification::{
    Category, CycleOutcome, CycleReport, EngineConfig, FeedView, NotificationEngine,
    NotificationRecord, PollPhase, Role, Trigger,
};
pub use scheduler::{PollScheduler, SchedulerHandle};
pub use source::{FixtureBackend, HttpBackend, LmsBackend};
pub use store::{FileStore, KvStore, MemoryStore};
