use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::sprint::{DailySprintRecord, SprintTaskRecord};
use crate::models::stats::UserStatsRecord;
use crate::models::track::{TrackBundle, TrackDraft, TrackRecord};

pub mod memory;
pub mod mongo;

pub use memory::MemorySprintStore;
pub use mongo::MongoSprintStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("row already exists")]
    AlreadyExists,

    #[error("row not found")]
    NotFound,

    #[error("track {track_id} was persisted partially: {detail}")]
    PartialSynthesis { track_id: String, detail: String },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Result of a conditional completion. `Replay` means the row was already
/// completed and carries the XP that was awarded the first time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    First,
    Replay { xp_earned: i64 },
}

/// Persistence seam for the sprint engine. Mongo backs production, the
/// in-memory implementation backs tests; both honor the same contracts.
#[async_trait]
pub trait SprintStore: Send + Sync {
    /// Sprint already generated for this user and day, if any.
    async fn cached_sprint(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailySprintRecord>, StoreError>;

    /// Inserts a fresh sprint. `AlreadyExists` means another call won the
    /// per-day uniqueness race and the caller should re-read.
    async fn insert_sprint(&self, record: &DailySprintRecord) -> Result<(), StoreError>;

    async fn sprint(&self, sprint_id: &str) -> Result<Option<DailySprintRecord>, StoreError>;

    /// Marks the sprint completed if it was still open. Exactly one caller
    /// ever observes `First` for a given row.
    async fn complete_sprint(
        &self,
        sprint_id: &str,
        user_id: &str,
        xp_earned: i64,
    ) -> Result<CompletionOutcome, StoreError>;

    /// Reverts a completion whose reward never landed, so a retry observes
    /// `First` again instead of replaying an unapplied reward.
    async fn reopen_sprint(&self, sprint_id: &str, user_id: &str) -> Result<(), StoreError>;

    async fn insert_task(&self, record: &SprintTaskRecord) -> Result<(), StoreError>;

    async fn task(&self, task_id: &str) -> Result<Option<SprintTaskRecord>, StoreError>;

    async fn complete_task(
        &self,
        task_id: &str,
        user_id: &str,
    ) -> Result<CompletionOutcome, StoreError>;

    async fn reopen_task(&self, task_id: &str, user_id: &str) -> Result<(), StoreError>;

    /// Persists a normalized draft as one track row plus its lessons and
    /// questions. A failure after the track row landed reports
    /// `PartialSynthesis` with the track id instead of rolling back.
    async fn insert_track(&self, draft: &TrackDraft) -> Result<TrackRecord, StoreError>;

    async fn track_bundle(&self, track_id: &str) -> Result<Option<TrackBundle>, StoreError>;

    async fn user_stats(&self, user_id: &str) -> Result<Option<UserStatsRecord>, StoreError>;

    /// Atomic read-modify-write of the user's progression row.
    async fn apply_reward(
        &self,
        user_id: &str,
        xp_delta: i64,
        combo_max: u32,
        today: NaiveDate,
    ) -> Result<UserStatsRecord, StoreError>;
}
