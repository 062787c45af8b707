//! Error types for Lode economy operations

use crate::amount::{format_coins, Amount};
use thiserror::Error;

/// Result type alias for economy operations
pub type Result<T> = std::result::Result<T, EconomyError>;

/// Errors that can occur in economy operations
///
/// Every variant except `StoreUnavailable` is a validation outcome: an
/// expected, user-presentable reason why an action did not happen. Only
/// `StoreUnavailable` represents a genuine failure of the system itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EconomyError {
    /// Non-positive or malformed amount in user input
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    /// Balance below what the operation requires
    #[error("Insufficient balance: need {}, have {}", format_coins(*need), format_coins(*have))]
    InsufficientBalance { need: Amount, have: Amount },

    /// Claim attempted on an empty buffer
    #[error("Nothing has accrued in the buffer yet")]
    InsufficientBuffer,

    /// Upgrade attempted past the level cap
    #[error("Already at the maximum level ({max})")]
    MaxLevelReached { max: u8 },

    /// Task already has an approved submission for this user
    #[error("Task already completed")]
    AlreadyCompleted,

    /// Task already has a submission awaiting review for this user
    #[error("A submission for this task is already awaiting review")]
    AlreadySubmitted,

    /// Resubmission of a rejected task without the explicit retry step
    #[error("Task was rejected; retry it before submitting again")]
    RetryRequired,

    /// Unknown submission / request / task / user id
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Admin acted twice on the same request
    #[error("Request has already been resolved")]
    AlreadyResolved,

    /// Underlying persistence failure after retry
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl EconomyError {
    /// Stable error code for API responses
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidAmount => 2001,
            Self::InsufficientBalance { .. } => 2002,
            Self::InsufficientBuffer => 2003,
            Self::MaxLevelReached { .. } => 2004,
            Self::AlreadyCompleted => 2005,
            Self::AlreadySubmitted => 2006,
            Self::NotFound { .. } => 2007,
            Self::AlreadyResolved => 2008,
            Self::RetryRequired => 2009,
            Self::StoreUnavailable(_) => 2999,
        }
    }

    /// True for expected outcomes that are shown to the end user as-is
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::StoreUnavailable(_))
    }

    /// Human-readable reason for the presentation layer
    ///
    /// Store failures are reported generically; the detail goes to the log,
    /// not to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::StoreUnavailable(_) => "Something went wrong, please try again".to_string(),
            other => other.to_string(),
        }
    }

    /// Convenience constructor for unknown-id failures
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}
