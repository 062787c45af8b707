//! Domain documents persisted in the ledger
//!
//! Every struct here maps one-to-one onto a ledger document. Instants use
//! the normalizing serde adapters from [`crate::time`], so documents written
//! by older revisions of the app (epoch seconds, RFC 3339 strings) load
//! without per-call-site shape handling.

use crate::amount::{Amount, SignedAmount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chat-platform user identifier
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Task identifier (admin-assigned)
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Generate a fresh random document id
pub fn fresh_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Per-user economy snapshot
///
/// Owned by the user, created on first login, never deleted. Mutated only
/// through the engine reducers and the workflow services; all mutation is
/// serialized per user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEconomy {
    /// Owner
    pub user_id: UserId,

    /// Spendable balance
    pub total_balance: Amount,

    /// Buffer capacity level (1-based, never decreases)
    pub buffer_level: u8,

    /// Accrual rate level (1-based, never decreases)
    pub rate_level: u8,

    /// Amount currently accrued in the buffer
    pub buffer_fill: Amount,

    /// Instant the buffer was last advanced
    #[serde(with = "crate::time::instant")]
    pub last_sync: DateTime<Utc>,

    /// Projected instant the buffer reaches capacity; frozen once full
    /// until the next claim
    #[serde(with = "crate::time::instant_opt", default)]
    pub buffer_full_at: Option<DateTime<Utc>>,

    /// Permanent additive accrual boost earned from referrals, per hour
    #[serde(default)]
    pub rate_bonus_per_hour: Amount,

    /// Referrer, set at most once
    #[serde(default)]
    pub referred_by: Option<UserId>,

    /// Number of users this account referred (monotonically increasing)
    #[serde(default)]
    pub referral_count: u32,
}

impl UserEconomy {
    /// Fresh account at level 1 with an empty buffer
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            total_balance: 0,
            buffer_level: 1,
            rate_level: 1,
            buffer_fill: 0,
            last_sync: now,
            buffer_full_at: None,
            rate_bonus_per_hour: 0,
            referred_by: None,
            referral_count: 0,
        }
    }
}

/// How a task is verified
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Approved immediately on confirmation
    Auto,
    /// Queued for admin review
    Manual,
}

/// Admin-owned task definition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: TaskId,
    pub name: String,
    pub description: String,
    /// Reward credited on approval (positive)
    pub reward: Amount,
    /// Link or channel the user must visit
    pub target: String,
    pub kind: TaskKind,
    pub active: bool,
}

/// Task submission lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    PendingApproval,
    Approved,
    Rejected,
}

/// A user's attempt at a task
///
/// At most one per (user, task) pair while non-terminal. Reward, name and
/// target are snapshotted at submission time so resolution survives task
/// deletion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSubmission {
    pub id: String,
    pub user_id: UserId,
    pub task_id: TaskId,
    /// Reward at submission time
    pub reward: Amount,
    /// Task name at submission time
    pub task_name: String,
    /// Task target at submission time
    pub target: String,
    pub status: SubmissionStatus,
    /// Set only when rejected
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(with = "crate::time::instant")]
    pub submitted_at: DateTime<Utc>,
    #[serde(with = "crate::time::instant_opt", default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Transfer direction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Withdrawal,
    Deposit,
}

/// Transfer request lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Approved,
    Rejected,
}

/// Withdrawal or deposit request awaiting admin resolution
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub id: String,
    pub user_id: UserId,
    pub kind: TransferKind,
    pub amount: Amount,
    /// Payout address (withdrawals)
    #[serde(default)]
    pub address: Option<String>,
    /// External transaction hash (deposits)
    #[serde(default)]
    pub tx_hash: Option<String>,
    pub status: TransferStatus,
    #[serde(default)]
    pub reject_reason: Option<String>,
    #[serde(with = "crate::time::instant")]
    pub requested_at: DateTime<Utc>,
    #[serde(with = "crate::time::instant_opt", default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Balance-affecting operation category
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Claim,
    ClaimFee,
    RateUpgrade,
    CapacityUpgrade,
    TaskReward,
    ReferralBonus,
    ReferralFriendBonus,
    ReferralShare,
    WithdrawalRequest,
    WithdrawalRefund,
    Deposit,
}

/// Append-only audit entry
///
/// Never mutated after creation. The balance field on `UserEconomy` is
/// authoritative; records exist for user-facing history and reconciliation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub user_id: UserId,
    pub kind: TransactionKind,
    /// Signed delta applied to the balance
    pub amount: SignedAmount,
    #[serde(with = "crate::time::instant")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: Option<String>,
    /// Submission / request / level this record relates to
    #[serde(default)]
    pub related_id: Option<String>,
}

impl TransactionRecord {
    pub fn new(
        user_id: UserId,
        kind: TransactionKind,
        amount: SignedAmount,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: fresh_id(),
            user_id,
            kind,
            amount,
            timestamp,
            status: None,
            related_id: None,
        }
    }

    pub fn with_related(mut self, related_id: impl Into<String>) -> Self {
        self.related_id = Some(related_id.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

/// Append-only referral signup record, one per successful referral
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralRecord {
    pub referrer_id: UserId,
    pub referred_user_id: UserId,
    pub bonus_amount: Amount,
    pub friend_bonus_amount: Amount,
    #[serde(with = "crate::time::instant")]
    pub timestamp: DateTime<Utc>,
}
