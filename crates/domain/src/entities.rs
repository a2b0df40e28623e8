//! Persistent entities of the scheduling & accountability core (§3).

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub locale: String,
    pub consent_flags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerType {
    Habit,
    Medication,
    Value,
    Commitment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerFrequency {
    Daily,
    Weekly,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tracker {
    pub id: Uuid,
    pub owner: String,
    pub tracker_type: TrackerType,
    pub name: String,
    pub frequency: TrackerFrequency,
    pub check_time: Option<NaiveTime>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInStatus {
    Completed,
    Skipped,
    Partial,
}

impl CheckInStatus {
    /// Whether this status counts toward a streak (§3 streak definition).
    pub fn counts_toward_streak(self) -> bool {
        matches!(self, Self::Completed | Self::Partial)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckIn {
    pub id: Uuid,
    pub tracker_id: Uuid,
    pub owner: String,
    pub status: CheckInStatus,
    pub created_at: DateTime<Utc>,
    pub note: Option<String>,
}

impl CheckIn {
    pub fn calendar_date(&self) -> NaiveDate {
        self.created_at.date_naive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    Idea,
    Trail,
    Moc,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrsCard {
    pub id: Uuid,
    pub note_path: String,
    pub note_type: NoteType,
    pub title: String,
    pub srs_enabled: bool,
    pub next_review_date: NaiveDate,
    pub last_review_date: Option<NaiveDate>,
    pub interval_days: i64,
    pub ease_factor: f64,
    pub repetitions: i64,
    pub is_due: bool,
    pub total_reviews: i64,
}

/// Rating applied during an SRS review (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Rating {
    Again = 0,
    Hard = 1,
    Good = 2,
    Easy = 3,
}

impl Rating {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Again),
            1 => Some(Self::Hard),
            2 => Some(Self::Good),
            3 => Some(Self::Easy),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewHistory {
    pub id: Uuid,
    pub card_id: Uuid,
    pub rating: Rating,
    pub interval_before: i64,
    pub interval_after: i64,
    pub ease_before: f64,
    pub ease_after: f64,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retention {
    OneMonth,
    SixMonths,
    OneYear,
    Forever,
}

impl Retention {
    /// `None` for `Forever`, matching "retention ≠ forever" in §4.13.
    pub fn window(self) -> Option<chrono::Duration> {
        match self {
            Self::OneMonth => Some(chrono::Duration::days(30)),
            Self::SixMonths => Some(chrono::Duration::days(180)),
            Self::OneYear => Some(chrono::Duration::days(365)),
            Self::Forever => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacySettings {
    pub user_id: String,
    pub retention: Retention,
    pub consent_health_data: bool,
    pub tts_provider_override: Option<String>,
    pub stt_provider_override: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Personality {
    Gentle,
    Supportive,
    Direct,
    Assertive,
    ToughLove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CelebrationStyle {
    Quiet,
    Moderate,
    Enthusiastic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountabilityProfile {
    pub user_id: String,
    pub personality: Personality,
    pub struggle_threshold: i64,
    pub celebration_style: CelebrationStyle,
    pub voice_override: Option<String>,
    pub check_time: NaiveTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifeWeeksDestination {
    DailyNote,
    JournalFolder,
    Chat,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifeWeeksSettings {
    pub user_id: String,
    pub enabled: bool,
    pub date_of_birth: NaiveDate,
    pub time_of_day: NaiveTime,
    pub weekday: chrono::Weekday,
    pub destination: LifeWeeksDestination,
    pub custom_path: Option<String>,
}

/// In-memory, optionally snapshotted job description (§4.7/§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Schedule {
    Interval { interval_seconds: u64 },
    Daily { times: Vec<NaiveTime> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub name: String,
    pub callback_tag: String,
    pub schedule: Schedule,
    pub first_delay_seconds: u64,
    pub enabled: bool,
    pub data: serde_json::Value,
}

impl ScheduledJob {
    /// §3 invariants: INTERVAL requires `interval_seconds > 0`; DAILY
    /// requires a non-empty set of times.
    pub fn validate(&self) -> Result<(), crate::error::DomainError> {
        match &self.schedule {
            Schedule::Interval { interval_seconds } if *interval_seconds == 0 => {
                Err(crate::error::DomainError::invalid_schedule(
                    "interval_seconds must be > 0",
                ))
            }
            Schedule::Daily { times } if times.is_empty() => Err(
                crate::error::DomainError::invalid_schedule("daily schedule requires at least one time"),
            ),
            _ => Ok(()),
        }
    }
}
