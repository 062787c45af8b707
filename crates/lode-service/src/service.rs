//! Economy service facade
//!
//! `EconomyService` owns the injected collaborators (ledger store,
//! notifier), the per-user session registry and the tunable parameters, and
//! exposes the full command/query surface: session open, claim, upgrades,
//! task actions, referral propagation, transfer requests and the admin
//! resolutions, plus the read accessors the presentation layer needs.
//!
//! Command methods return `Result<_, EconomyError>`; validation failures
//! are expected outcomes and convert to [`ActionOutcome`] for display.

use crate::config::ServiceConfig;
use crate::notify::Notifier;
use crate::repo::{now_millis, Repo};
use crate::session::{SessionState, Sessions};
use chrono::{DateTime, Utc};
use lode_core::{
    EconomyError, ReferralRecord, Result, TransactionKind, TransactionRecord, UserEconomy, UserId,
};
use lode_economy::{engine, ClaimOutcome, EconomyParams, UpgradeOutcome};
use lode_ledger::{ChangeEvent, LedgerStore};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

pub(crate) struct ServiceInner {
    pub repo: Repo,
    pub notifier: Arc<dyn Notifier>,
    pub sessions: Sessions,
    pub config: ServiceConfig,
}

/// The economy state machine behind the mini-app
#[derive(Clone)]
pub struct EconomyService {
    pub(crate) inner: Arc<ServiceInner>,
}

/// Success-flag-plus-reason shape consumed by the presentation layer
#[derive(Clone, Debug, Serialize)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
}

impl ActionOutcome {
    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self {
                success: true,
                reason: None,
                code: None,
            },
            Err(err) => Self {
                success: false,
                reason: Some(err.user_message()),
                code: Some(err.code()),
            },
        }
    }
}

impl EconomyService {
    /// Build the service around injected collaborators
    pub fn new(
        store: Arc<dyn LedgerStore>,
        notifier: Arc<dyn Notifier>,
        config: ServiceConfig,
    ) -> anyhow::Result<Self> {
        config.economy.validate()?;
        let repo = Repo::new(store, config.store.timeout());
        Ok(Self {
            inner: Arc::new(ServiceInner {
                repo,
                notifier,
                sessions: Sessions::new(),
                config,
            }),
        })
    }

    pub(crate) fn params(&self) -> &EconomyParams {
        &self.inner.config.economy
    }

    pub(crate) fn admin_channel(&self) -> &str {
        &self.inner.config.notify.admin_channel
    }

    /// Fire-and-forget notification; failures are logged and swallowed
    pub(crate) async fn notify(&self, target: &str, text: &str) {
        if let Err(err) = self.inner.notifier.send_message(target, text).await {
            tracing::warn!(target, error = %err, "notification dropped");
        }
    }

    /// Latest snapshot for a locked session, advanced to `now`.
    /// Loads from the ledger when the cache is cold (process restart), so
    /// accrual is correct across arbitrarily long offline gaps.
    pub(crate) async fn current_econ(
        &self,
        state: &mut SessionState,
        user: &UserId,
        now: DateTime<Utc>,
    ) -> Result<UserEconomy> {
        let stored = match &state.econ {
            Some(econ) => econ.clone(),
            None => self
                .inner
                .repo
                .load_user(user)
                .await?
                .ok_or_else(|| EconomyError::not_found("user", user.as_str()))?,
        };
        Ok(engine::advance(&stored, self.params(), now))
    }

    /// Persist a mutated snapshot and refresh the session cache. Balance
    /// writes always go straight through; only pure accrual is throttled.
    pub(crate) async fn commit_econ(
        &self,
        state: &mut SessionState,
        econ: UserEconomy,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.inner.repo.save_user(&econ).await?;
        state.econ = Some(econ);
        state.last_persist = Some(now);
        Ok(())
    }

    // === Session lifecycle ===

    /// First-login hook: loads the snapshot (creating it when absent) and,
    /// for a brand-new referred user, propagates the signup bonuses.
    pub async fn open_session(
        &self,
        user: &UserId,
        referred_by: Option<UserId>,
    ) -> Result<UserEconomy> {
        let now = now_millis();
        let created = {
            let mut state = self.inner.sessions.lock(user).await;
            match self.load_or_create(&mut state, user, now).await? {
                (econ, false) => return Ok(econ),
                (_, true) => true,
            }
        };

        // Signup propagation takes both users' locks itself, so it runs
        // outside the new user's session lock.
        if created {
            if let Some(referrer) = referred_by {
                if let Err(err) = self.process_signup(user, &referrer).await {
                    // Login still succeeds; the bonus is lost only if the
                    // store stayed down through the retry.
                    tracing::warn!(user = %user, referrer = %referrer, error = %err, "signup referral propagation failed");
                }
            }
        }
        self.get_user_economy(user).await
    }

    async fn load_or_create(
        &self,
        state: &mut SessionState,
        user: &UserId,
        now: DateTime<Utc>,
    ) -> Result<(UserEconomy, bool)> {
        let stored = match &state.econ {
            Some(econ) => Some(econ.clone()),
            None => self.inner.repo.load_user(user).await?,
        };
        match stored {
            Some(stored) => {
                let advanced = engine::advance(&stored, self.params(), now);
                self.inner.repo.persist_accrual(&advanced).await?;
                state.econ = Some(advanced.clone());
                state.last_persist = Some(now);
                Ok((advanced, false))
            }
            None => {
                let fresh = engine::advance(&UserEconomy::new(user.clone(), now), self.params(), now);
                self.inner.repo.save_user(&fresh).await?;
                state.econ = Some(fresh.clone());
                state.last_persist = Some(now);
                tracing::info!(user = %user, "created economy account");
                Ok((fresh, true))
            }
        }
    }

    // === Core economy commands ===

    /// Move the accrued buffer into the balance for a fee
    pub async fn claim(&self, user: &UserId) -> Result<ClaimOutcome> {
        let now = now_millis();
        let outcome = {
            let mut state = self.inner.sessions.lock(user).await;
            let current = self.current_econ(&mut state, user, now).await?;
            let outcome = engine::claim(&current, self.params(), now)?;
            self.commit_econ(&mut state, outcome.economy.clone(), now)
                .await?;
            outcome
        };

        let repo = &self.inner.repo;
        repo.append_audit(&TransactionRecord::new(
            user.clone(),
            TransactionKind::Claim,
            outcome.claimed as i128,
            now,
        ))
        .await;
        repo.append_audit(&TransactionRecord::new(
            user.clone(),
            TransactionKind::ClaimFee,
            -(outcome.fee as i128),
            now,
        ))
        .await;

        tracing::info!(user = %user, claimed = outcome.claimed as u64, fee = outcome.fee as u64, "claim");
        Ok(outcome)
    }

    /// Spend balance to raise the accrual rate level
    pub async fn upgrade_rate(&self, user: &UserId) -> Result<UpgradeOutcome> {
        self.upgrade(user, TransactionKind::RateUpgrade, engine::upgrade_rate)
            .await
    }

    /// Spend balance to raise the buffer capacity level
    pub async fn upgrade_capacity(&self, user: &UserId) -> Result<UpgradeOutcome> {
        self.upgrade(
            user,
            TransactionKind::CapacityUpgrade,
            engine::upgrade_capacity,
        )
        .await
    }

    async fn upgrade(
        &self,
        user: &UserId,
        kind: TransactionKind,
        apply: fn(&UserEconomy, &EconomyParams) -> Result<UpgradeOutcome>,
    ) -> Result<UpgradeOutcome> {
        let now = now_millis();
        let outcome = {
            let mut state = self.inner.sessions.lock(user).await;
            let current = self.current_econ(&mut state, user, now).await?;
            let outcome = apply(&current, self.params())?;
            self.commit_econ(&mut state, outcome.economy.clone(), now)
                .await?;
            outcome
        };

        self.inner
            .repo
            .append_audit(
                &TransactionRecord::new(user.clone(), kind, -(outcome.cost as i128), now)
                    .with_related(format!("level-{}", outcome.new_level)),
            )
            .await;

        tracing::info!(user = %user, ?kind, level = outcome.new_level, "upgrade");
        Ok(outcome)
    }

    /// Credit a user's balance under their session lock and write the
    /// matching audit record. Used for task rewards, referral bonuses,
    /// deposit credits and withdrawal refunds.
    pub(crate) async fn credit(
        &self,
        user: &UserId,
        amount: lode_core::Amount,
        kind: TransactionKind,
        related: Option<String>,
    ) -> Result<UserEconomy> {
        let now = now_millis();
        let econ = {
            let mut state = self.inner.sessions.lock(user).await;
            let mut current = self.current_econ(&mut state, user, now).await?;
            current.total_balance += amount;
            self.commit_econ(&mut state, current.clone(), now).await?;
            current
        };

        let mut record = TransactionRecord::new(user.clone(), kind, amount as i128, now);
        if let Some(related) = related {
            record = record.with_related(related);
        }
        self.inner.repo.append_audit(&record).await;
        Ok(econ)
    }

    // === Read accessors ===

    /// Current snapshot advanced to the present (no persist)
    pub async fn get_user_economy(&self, user: &UserId) -> Result<UserEconomy> {
        let now = now_millis();
        let mut state = self.inner.sessions.lock(user).await;
        let current = self.current_econ(&mut state, user, now).await?;
        state.econ = Some(current.clone());
        Ok(current)
    }

    /// Audit history, newest first
    pub async fn transaction_history(&self, user: &UserId) -> Result<Vec<TransactionRecord>> {
        self.inner.repo.transactions_for(user).await
    }

    /// Signup records where this user was the referrer, newest first
    pub async fn referral_history(&self, user: &UserId) -> Result<Vec<ReferralRecord>> {
        self.inner.repo.referrals_for(user).await
    }

    /// Change feed over user documents, for the presentation layer
    pub fn watch_users(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.repo.store().subscribe(lode_ledger::collections::USERS)
    }

    /// Drop a user's cached snapshot so the next operation reloads from the
    /// ledger. For callers that write user documents out of band.
    pub async fn invalidate_session(&self, user: &UserId) {
        self.inner.sessions.invalidate(user).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_ok() {
        let outcome = ActionOutcome::from_result(&Ok(()));
        assert!(outcome.success);
        assert!(outcome.reason.is_none());
    }

    #[test]
    fn test_outcome_from_validation_error() {
        let outcome = ActionOutcome::from_result::<()>(&Err(EconomyError::InsufficientBuffer));
        assert!(!outcome.success);
        assert_eq!(outcome.code, Some(2003));
        assert!(outcome.reason.is_some());
    }

    #[test]
    fn test_outcome_hides_store_detail() {
        let outcome = ActionOutcome::from_result::<()>(&Err(EconomyError::StoreUnavailable(
            "connection reset".into(),
        )));
        assert!(!outcome.reason.unwrap().contains("connection reset"));
    }
}
