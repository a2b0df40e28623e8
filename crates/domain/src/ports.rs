//! Narrow interfaces the rest of the workspace implements or consumes
//! (C2 Store, C3 Vault, C8 JobRegistry, C12 DispatchPort). Grounded in the
//! `async_trait`, mockall-testable port style used for repository traits
//! elsewhere in this family of services.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::entities::{
    AccountabilityProfile, CheckIn, LifeWeeksSettings, NoteType, Rating, Retention, ScheduledJob,
    SrsCard, Tracker,
};
use crate::error::DomainError;
use crate::srs::VaultPatch;

/// A transactional unit of work scoped to a single atomic operation. Every
/// write that touches two tables must go through one `StoreTx` and either
/// commit fully or not at all (§4.2 contract).
#[async_trait]
pub trait StoreTx: Send {
    async fn card_by_note_path(&mut self, note_path: &str) -> Result<SrsCard, DomainError>;

    async fn upsert_card(&mut self, card: &SrsCard) -> Result<(), DomainError>;

    async fn update_card(&mut self, card: &SrsCard) -> Result<(), DomainError>;

    async fn append_review_history(
        &mut self,
        card_id: Uuid,
        rating: Rating,
        interval_before: i64,
        interval_after: i64,
        ease_before: f64,
        ease_after: f64,
    ) -> Result<(), DomainError>;

    async fn insert_check_in(&mut self, check_in: &CheckIn) -> Result<(), DomainError>;

    async fn commit(self: Box<Self>) -> Result<(), DomainError>;
}

/// A transactional relational facade with CRUD per entity and the small set
/// of composite query primitives the core needs (§4.2).
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, DomainError>;

    async fn active_trackers_for_user(&self, user_id: &str) -> Result<Vec<Tracker>, DomainError>;

    async fn completed_check_ins_for(
        &self,
        user_id: &str,
        tracker_id: Uuid,
    ) -> Result<Vec<CheckIn>, DomainError>;

    async fn card_by_note_path(&self, note_path: &str) -> Result<SrsCard, DomainError>;

    /// Looks a card up by its opaque id, so inbound action tokens (§4.10,
    /// §6) never have to carry a note path over the wire.
    async fn card_by_id(&self, id: Uuid) -> Result<SrsCard, DomainError>;

    async fn due_cards(
        &self,
        today: NaiveDate,
        limit: usize,
        note_type: Option<NoteType>,
    ) -> Result<Vec<SrsCard>, DomainError>;

    /// Every configured accountability profile, for startup rehydration.
    async fn accountability_profiles(&self) -> Result<Vec<AccountabilityProfile>, DomainError>;

    /// Every user with `life_weeks_settings.enabled`, for startup rehydration.
    async fn life_weeks_settings_for_enabled_users(
        &self,
    ) -> Result<Vec<LifeWeeksSettings>, DomainError>;

    /// Cascading delete of a User and everything it exclusively owns —
    /// Trackers, CheckIns, privacy/accountability/life-weeks settings, and
    /// all ReviewHistory rows linked to that user's cards (§3 ownership
    /// rules). SRS cards themselves are never removed by user erasure.
    async fn erase_user(&self, user_id: &str) -> Result<(), DomainError>;
}

/// Metadata parsed from a vault file's fenced front-matter block (§4.3).
#[derive(Debug, Clone, Default)]
pub struct VaultMetadata {
    pub srs_enabled: bool,
    pub srs_next_review: Option<NaiveDate>,
    pub srs_last_review: Option<NaiveDate>,
    pub srs_interval: Option<i64>,
    pub srs_ease_factor: Option<f64>,
    pub srs_repetitions: Option<i64>,
    pub note_type: Option<NoteType>,
    pub title: Option<String>,
    /// Keys present in the file but not recognised by the core; preserved
    /// verbatim on write.
    pub unknown: Vec<(String, String)>,
}

impl VaultMetadata {
    /// `srs_enabled ∨ (note_type ∈ {trail, moc} ∧ has a review date)`, the
    /// eligibility rule `sync_vault` applies per file (§4.5).
    pub fn is_srs_eligible(&self) -> bool {
        self.srs_enabled
            || (matches!(self.note_type, Some(NoteType::Trail) | Some(NoteType::Moc))
                && self.srs_next_review.is_some())
    }
}

/// Read/write scoped text files with a fenced metadata header + body (§4.3).
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait]
pub trait Vault: Send + Sync {
    async fn read(&self, path: &str) -> Result<(VaultMetadata, String), DomainError>;

    /// Atomic rename-from-temp-file write of the six SRS keys. Unknown keys
    /// and the body are preserved exactly.
    async fn update_metadata(&self, path: &str, patch: &VaultPatch) -> Result<(), DomainError>;

    async fn list_files(&self, dir: &str) -> Result<Vec<String>, DomainError>;
}

/// Persistent index of `(job-name, owner_user, metadata)` so schedules
/// survive restart (§4.8).
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait]
pub trait JobRegistry: Send + Sync {
    /// Idempotently writes a row naming the check-in and struggle jobs for
    /// this user.
    async fn schedule_user(&self, user_id: &str, chat_id: &str) -> Result<(), DomainError>;

    async fn clear_user(&self, user_id: &str) -> Result<(), DomainError>;

    /// All users with a row in the registry, for startup rehydration.
    async fn all_scheduled_users(&self) -> Result<Vec<(String, String)>, DomainError>;
}

/// A single inline action row entry: a label and an opaque token the
/// transport round-trips back to the core verbatim (§4.12, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineAction {
    pub label: String,
    pub action_token: String,
}

impl InlineAction {
    pub const MAX_TOKEN_BYTES: usize = 64;

    pub fn new(label: impl Into<String>, action_token: impl Into<String>) -> Result<Self, DomainError> {
        let action_token = action_token.into();
        if action_token.len() > Self::MAX_TOKEN_BYTES {
            return Err(DomainError::invalid_schedule(format!(
                "inline action token `{action_token}` exceeds {} bytes",
                Self::MAX_TOKEN_BYTES
            )));
        }
        Ok(Self {
            label: label.into(),
            action_token,
        })
    }
}

/// Outbound event payload (§4.12, §6). The core never constructs
/// transport-native types; the adapter translates.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text {
        body: String,
        inline_actions: Vec<Vec<InlineAction>>,
    },
    Voice {
        body: String,
        audio_bytes: Vec<u8>,
        inline_actions: Vec<Vec<InlineAction>>,
    },
    Photo {
        body: String,
        image_bytes: Vec<u8>,
        inline_actions: Vec<Vec<InlineAction>>,
    },
}

/// Narrow outbound interface the core uses to hand a rendered event to the
/// chat transport (§4.12).
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait]
pub trait DispatchPort: Send + Sync {
    async fn deliver(&self, recipient_id: &str, payload: Payload) -> Result<(), DomainError>;
}

/// Re-exported for `scheduler` crates that need the plain job description
/// without importing `entities` directly.
pub type JobDescription = ScheduledJob;

/// Row counts deleted by one retention sweep pass over one user (§4.13).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionSweepCounts {
    pub messages: u64,
    pub poll_responses: u64,
    pub check_ins: u64,
}

/// The narrow query surface `RetentionSweeper` needs, isolated from `Store`
/// because its deletes must keep the Message (database-primary-key join)
/// and PollResponse (external-chat-identifier join) paths textually
/// distinct (§4.13, §9 ID-space hazard).
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait]
pub trait RetentionStore: Send + Sync {
    async fn users_with_retention(&self) -> Result<Vec<(String, Retention)>, DomainError>;

    /// Deletes Message/PollResponse/CheckIn rows older than `cutoff` for
    /// `user_id`. Never touches Tracker rows.
    async fn purge_before(
        &self,
        user_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<RetentionSweepCounts, DomainError>;
}
