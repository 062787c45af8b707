//! # Lode Ledger
//!
//! The ledger store port: a generic document store keyed by collection and
//! id, with point reads, merge-patch writes, append-only records and change
//! subscriptions. The economy services are written against this trait; the
//! real persistence engine lives behind it, and the in-memory
//! implementation in [`memory`] backs tests and single-process deployments.

pub mod memory;

pub use memory::MemoryLedger;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

/// Collection names used by the economy services
pub mod collections {
    /// `UserEconomy` documents, keyed by user id
    pub const USERS: &str = "users";
    /// `TaskDefinition` documents, keyed by task id
    pub const TASKS: &str = "tasks";
    /// `TaskSubmission` documents, keyed by submission id
    pub const TASK_SUBMISSIONS: &str = "task_submissions";
    /// Append-only `TransactionRecord` log
    pub const TRANSACTIONS: &str = "transactions";
    /// Append-only `ReferralRecord` log
    pub const REFERRALS: &str = "referrals";
    /// `TransferRequest` documents, keyed by request id
    pub const TRANSFER_REQUESTS: &str = "transfer_requests";
}

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors surfaced by a ledger backend
#[derive(Clone, Debug, thiserror::Error)]
pub enum LedgerError {
    /// Backend unreachable or refusing the operation
    #[error("Ledger backend unavailable: {0}")]
    Unavailable(String),

    /// Document content could not be encoded or decoded
    #[error("Ledger serialization error: {0}")]
    Serialization(String),
}

/// A stored document together with its id
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// Change notification delivered to subscribers of a collection
#[derive(Clone, Debug)]
pub struct ChangeEvent {
    pub collection: String,
    pub id: String,
    /// Document state after the change; `Null` for deletions
    pub data: Value,
}

/// Generic document store consumed by the economy services
///
/// Semantics expected of implementations:
/// - `set_document` replaces the whole document
/// - `merge_update` deep-merges an object patch into the existing document,
///   creating it when absent
/// - `append_record` assigns a fresh id and never overwrites
/// - `subscribe` delivers every committed change in a collection;
///   dropping the receiver unsubscribes
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Point read; `None` when the document does not exist
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// Full write, replacing any existing document
    async fn set_document(&self, collection: &str, id: &str, data: Value) -> Result<()>;

    /// Merge-patch write (recursive object merge), upserting
    async fn merge_update(&self, collection: &str, id: &str, patch: Value) -> Result<()>;

    /// Remove a document; returns whether it existed
    async fn delete_document(&self, collection: &str, id: &str) -> Result<bool>;

    /// All documents whose top-level `field` equals `value`
    async fn query_by_field(&self, collection: &str, field: &str, value: &Value)
        -> Result<Vec<Document>>;

    /// Every document in a collection
    async fn list_documents(&self, collection: &str) -> Result<Vec<Document>>;

    /// Append to a log collection under a fresh id; returns the id
    async fn append_record(&self, collection: &str, data: Value) -> Result<String>;

    /// Count documents whose top-level `field` equals `value`
    async fn count_matching(&self, collection: &str, field: &str, value: &Value) -> Result<u64>;

    /// Receive every subsequent change in a collection
    fn subscribe(&self, collection: &str) -> broadcast::Receiver<ChangeEvent>;
}

/// Recursive JSON object merge used by `merge_update` implementations.
/// Non-object patch values replace the target wholesale; `Null` removes
/// the key.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                if patch_value.is_null() {
                    target_map.remove(key);
                } else {
                    merge_patch(
                        target_map.entry(key.clone()).or_insert(Value::Null),
                        patch_value,
                    );
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}
