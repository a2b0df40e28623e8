//! The single error type threaded through every fallible core operation.

use thiserror::Error;

/// Named error kinds surfaced by the scheduling & accountability core. Every
/// operation that can fail returns one of these instead of a sentinel value.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("tracker {tracker_id} already has a check-in for {date}")]
    DuplicateCheckIn {
        tracker_id: uuid::Uuid,
        date: chrono::NaiveDate,
    },

    #[error("ownership mismatch: {detail}")]
    OwnershipMismatch { detail: String },

    #[error("invalid schedule spec: {detail}")]
    InvalidScheduleSpec { detail: String },

    #[error("transient failure: {cause}")]
    Transient { cause: String },

    #[error("cancelled")]
    Cancelled,

    #[error("configuration error for key {key}")]
    ConfigError { key: String },
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn ownership_mismatch(detail: impl Into<String>) -> Self {
        Self::OwnershipMismatch {
            detail: detail.into(),
        }
    }

    pub fn invalid_schedule(detail: impl Into<String>) -> Self {
        Self::InvalidScheduleSpec {
            detail: detail.into(),
        }
    }

    pub fn transient(cause: impl std::fmt::Display) -> Self {
        Self::Transient {
            cause: cause.to_string(),
        }
    }

    /// A short machine-readable tag for the `error:<kind>` outcome label and
    /// for the per-kind rolling counters behind the health endpoint.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::DuplicateCheckIn { .. } => "duplicate_check_in",
            Self::OwnershipMismatch { .. } => "ownership_mismatch",
            Self::InvalidScheduleSpec { .. } => "invalid_schedule_spec",
            Self::Transient { .. } => "transient",
            Self::Cancelled => "cancelled",
            Self::ConfigError { .. } => "config_error",
        }
    }

    /// Whether the propagation policy (§7) allows retrying this error a
    /// bounded number of times within the same fire.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Whether this error should be surfaced to the user as a friendly
    /// acknowledgement rather than logged as a bug.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::DuplicateCheckIn { .. })
    }
}

impl From<anyhow::Error> for DomainError {
    fn from(err: anyhow::Error) -> Self {
        Self::Transient {
            cause: err.to_string(),
        }
    }
}
