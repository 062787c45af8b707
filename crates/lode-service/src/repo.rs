//! Typed document access over the ledger port
//!
//! Every ledger call gets a bounded timeout and a single retry before the
//! failure surfaces as `EconomyError::StoreUnavailable`. Audit-record and
//! referral-record appends are best-effort: balances are authoritative and
//! already committed by the time a record is written, so an append failure
//! is logged distinctly and never rolled back.

use chrono::{DateTime, Utc};
use lode_core::{
    EconomyError, ReferralRecord, Result, TaskDefinition, TaskId, TaskSubmission,
    TransactionRecord, TransferRequest, UserEconomy, UserId,
};
use lode_ledger::{collections, Document, LedgerStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct Repo {
    store: Arc<dyn LedgerStore>,
    timeout: Duration,
}

impl Repo {
    pub fn new(store: Arc<dyn LedgerStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn store(&self) -> Arc<dyn LedgerStore> {
        self.store.clone()
    }

    /// Run a ledger call with a timeout and one retry
    async fn call<T, F, Fut>(&self, op: &'static str, make: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = lode_ledger::Result<T>>,
    {
        let mut last_error = String::new();
        for attempt in 0..2u32 {
            match tokio::time::timeout(self.timeout, make()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => {
                    tracing::warn!(op, attempt, error = %err, "ledger call failed");
                    last_error = err.to_string();
                }
                Err(_) => {
                    tracing::warn!(op, attempt, timeout_ms = self.timeout.as_millis() as u64, "ledger call timed out");
                    last_error = format!("{op} timed out");
                }
            }
        }
        Err(EconomyError::StoreUnavailable(last_error))
    }

    fn decode<T: DeserializeOwned>(op: &'static str, value: Value) -> Result<T> {
        serde_json::from_value(value).map_err(|err| {
            tracing::error!(op, error = %err, "undecodable ledger document");
            EconomyError::StoreUnavailable(format!("{op}: bad document: {err}"))
        })
    }

    fn encode<T: Serialize>(op: &'static str, value: &T) -> Result<Value> {
        serde_json::to_value(value).map_err(|err| {
            tracing::error!(op, error = %err, "unencodable document");
            EconomyError::StoreUnavailable(format!("{op}: bad document: {err}"))
        })
    }

    async fn get_typed<T: DeserializeOwned>(
        &self,
        op: &'static str,
        collection: &'static str,
        id: &str,
    ) -> Result<Option<T>> {
        let store = self.store.clone();
        let id = id.to_string();
        let raw = self
            .call(op, || {
                let store = store.clone();
                let id = id.clone();
                async move { store.get_document(collection, &id).await }
            })
            .await?;
        raw.map(|value| Self::decode(op, value)).transpose()
    }

    async fn query_typed<T: DeserializeOwned>(
        &self,
        op: &'static str,
        collection: &'static str,
        field: &'static str,
        value: Value,
    ) -> Result<Vec<T>> {
        let store = self.store.clone();
        let docs = self
            .call(op, || {
                let store = store.clone();
                let value = value.clone();
                async move { store.query_by_field(collection, field, &value).await }
            })
            .await?;
        docs.into_iter()
            .map(|Document { data, .. }| Self::decode(op, data))
            .collect()
    }

    // === Users ===

    pub async fn load_user(&self, user: &UserId) -> Result<Option<UserEconomy>> {
        self.get_typed("load_user", collections::USERS, user.as_str())
            .await
    }

    /// Merge-patch the full snapshot
    pub async fn save_user(&self, econ: &UserEconomy) -> Result<()> {
        let store = self.store.clone();
        let id = econ.user_id.as_str().to_string();
        let patch = Self::encode("save_user", econ)?;
        self.call("save_user", || {
            let store = store.clone();
            let id = id.clone();
            let patch = patch.clone();
            async move { store.merge_update(collections::USERS, &id, patch).await }
        })
        .await
    }

    /// Merge-patch only the accrual fields (scheduler writes)
    pub async fn persist_accrual(&self, econ: &UserEconomy) -> Result<()> {
        let store = self.store.clone();
        let id = econ.user_id.as_str().to_string();
        let patch = json!({
            "buffer_fill": econ.buffer_fill,
            "last_sync": econ.last_sync.timestamp_millis(),
            "buffer_full_at": econ.buffer_full_at.map(|dt| dt.timestamp_millis()),
        });
        self.call("persist_accrual", || {
            let store = store.clone();
            let id = id.clone();
            let patch = patch.clone();
            async move { store.merge_update(collections::USERS, &id, patch).await }
        })
        .await
    }

    // === Tasks ===

    pub async fn get_task(&self, task: &TaskId) -> Result<Option<TaskDefinition>> {
        self.get_typed("get_task", collections::TASKS, task.as_str())
            .await
    }

    pub async fn save_task(&self, task: &TaskDefinition) -> Result<()> {
        let store = self.store.clone();
        let id = task.id.as_str().to_string();
        let doc = Self::encode("save_task", task)?;
        self.call("save_task", || {
            let store = store.clone();
            let id = id.clone();
            let doc = doc.clone();
            async move { store.set_document(collections::TASKS, &id, doc).await }
        })
        .await
    }

    pub async fn delete_task(&self, task: &TaskId) -> Result<bool> {
        let store = self.store.clone();
        let id = task.as_str().to_string();
        self.call("delete_task", || {
            let store = store.clone();
            let id = id.clone();
            async move { store.delete_document(collections::TASKS, &id).await }
        })
        .await
    }

    pub async fn list_tasks(&self) -> Result<Vec<TaskDefinition>> {
        let store = self.store.clone();
        let docs = self
            .call("list_tasks", || {
                let store = store.clone();
                async move { store.list_documents(collections::TASKS).await }
            })
            .await?;
        docs.into_iter()
            .map(|Document { data, .. }| Self::decode("list_tasks", data))
            .collect()
    }

    // === Submissions ===

    pub async fn get_submission(&self, id: &str) -> Result<Option<TaskSubmission>> {
        self.get_typed("get_submission", collections::TASK_SUBMISSIONS, id)
            .await
    }

    pub async fn save_submission(&self, submission: &TaskSubmission) -> Result<()> {
        let store = self.store.clone();
        let id = submission.id.clone();
        let doc = Self::encode("save_submission", submission)?;
        self.call("save_submission", || {
            let store = store.clone();
            let id = id.clone();
            let doc = doc.clone();
            async move {
                store
                    .set_document(collections::TASK_SUBMISSIONS, &id, doc)
                    .await
            }
        })
        .await
    }

    pub async fn submissions_for(&self, user: &UserId) -> Result<Vec<TaskSubmission>> {
        self.query_typed(
            "submissions_for",
            collections::TASK_SUBMISSIONS,
            "user_id",
            json!(user.as_str()),
        )
        .await
    }

    pub async fn find_submission(
        &self,
        user: &UserId,
        task: &TaskId,
    ) -> Result<Option<TaskSubmission>> {
        let all = self.submissions_for(user).await?;
        Ok(all.into_iter().find(|s| &s.task_id == task))
    }

    pub async fn pending_submissions(&self) -> Result<Vec<TaskSubmission>> {
        self.query_typed(
            "pending_submissions",
            collections::TASK_SUBMISSIONS,
            "status",
            json!("pending_approval"),
        )
        .await
    }

    // === Transfer requests ===

    pub async fn get_transfer(&self, id: &str) -> Result<Option<TransferRequest>> {
        self.get_typed("get_transfer", collections::TRANSFER_REQUESTS, id)
            .await
    }

    pub async fn save_transfer(&self, request: &TransferRequest) -> Result<()> {
        let store = self.store.clone();
        let id = request.id.clone();
        let doc = Self::encode("save_transfer", request)?;
        self.call("save_transfer", || {
            let store = store.clone();
            let id = id.clone();
            let doc = doc.clone();
            async move {
                store
                    .set_document(collections::TRANSFER_REQUESTS, &id, doc)
                    .await
            }
        })
        .await
    }

    pub async fn pending_transfers(&self) -> Result<Vec<TransferRequest>> {
        self.query_typed(
            "pending_transfers",
            collections::TRANSFER_REQUESTS,
            "status",
            json!("pending"),
        )
        .await
    }

    pub async fn transfers_for(&self, user: &UserId) -> Result<Vec<TransferRequest>> {
        let mut requests: Vec<TransferRequest> = self
            .query_typed(
                "transfers_for",
                collections::TRANSFER_REQUESTS,
                "user_id",
                json!(user.as_str()),
            )
            .await?;
        requests.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(requests)
    }

    // === Append-only logs ===

    /// Best-effort audit append. The balance mutation is already committed;
    /// a failure here is logged and accepted, never propagated.
    pub async fn append_audit(&self, record: &TransactionRecord) {
        let Ok(doc) = Self::encode("append_audit", record) else {
            return;
        };
        if let Err(err) = self
            .store
            .append_record(collections::TRANSACTIONS, doc)
            .await
        {
            tracing::error!(
                user = %record.user_id,
                kind = ?record.kind,
                amount = record.amount as i64,
                error = %err,
                "audit append failed; balance already committed"
            );
        }
    }

    /// Best-effort referral-record append, same policy as audit records
    pub async fn append_referral(&self, record: &ReferralRecord) {
        let Ok(doc) = Self::encode("append_referral", record) else {
            return;
        };
        if let Err(err) = self.store.append_record(collections::REFERRALS, doc).await {
            tracing::error!(
                referrer = %record.referrer_id,
                referred = %record.referred_user_id,
                error = %err,
                "referral record append failed; balances already committed"
            );
        }
    }

    pub async fn transactions_for(&self, user: &UserId) -> Result<Vec<TransactionRecord>> {
        let mut records: Vec<TransactionRecord> = self
            .query_typed(
                "transactions_for",
                collections::TRANSACTIONS,
                "user_id",
                json!(user.as_str()),
            )
            .await?;
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    pub async fn referrals_for(&self, referrer: &UserId) -> Result<Vec<ReferralRecord>> {
        let mut records: Vec<ReferralRecord> = self
            .query_typed(
                "referrals_for",
                collections::REFERRALS,
                "referrer_id",
                json!(referrer.as_str()),
            )
            .await?;
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }
}

/// The current wall-clock instant, truncated to milliseconds so persisted
/// and in-memory forms round-trip exactly.
pub(crate) fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
