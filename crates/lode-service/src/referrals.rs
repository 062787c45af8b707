//! Referral propagation
//!
//! Two flows: a one-time signup propagation (direct bonus, friend bonus,
//! permanent rate boost) and an ongoing reward share credited to the
//! referrer whenever a referred user earns a task reward. The referred
//! user's `referred_by` field is the idempotence guard: it is written in
//! the same commit as the friend bonus, and a set field makes any repeat
//! propagation a silent no-op.

use crate::repo::now_millis;
use crate::service::EconomyService;
use lode_core::{
    format_coins, Amount, EconomyError, ReferralRecord, Result, TransactionKind,
    TransactionRecord, UserId,
};
use lode_economy::engine;

impl EconomyService {
    /// Propagate a referred signup: credit the referrer's direct bonus and
    /// permanent rate boost, credit the new user's friend bonus, and link
    /// the pair. Returns whether anything was propagated; ineligible
    /// signups (self-referral, unknown referrer, already-linked user) are
    /// silent no-ops.
    pub async fn process_signup(&self, new_user: &UserId, referrer: &UserId) -> Result<bool> {
        if new_user == referrer {
            tracing::debug!(user = %new_user, "self-referral ignored");
            return Ok(false);
        }

        let now = now_millis();
        let params = self.params().clone();
        let (mut new_state, mut ref_state) =
            self.inner.sessions.lock_pair(new_user, referrer).await;

        let mut referred = match self.current_econ(&mut new_state, new_user, now).await {
            Ok(econ) => econ,
            Err(EconomyError::NotFound { .. }) => return Ok(false),
            Err(err) => return Err(err),
        };
        if referred.referred_by.is_some() {
            return Ok(false);
        }
        let mut referrer_econ = match self.current_econ(&mut ref_state, referrer, now).await {
            Ok(econ) => econ,
            Err(EconomyError::NotFound { .. }) => {
                tracing::debug!(referrer = %referrer, "unknown referrer ignored");
                return Ok(false);
            }
            Err(err) => return Err(err),
        };

        referred.total_balance += params.referral_friend_bonus;
        referred.referred_by = Some(referrer.clone());

        referrer_econ.total_balance += params.referral_direct_bonus;
        referrer_econ.rate_bonus_per_hour += params.referral_rate_boost_per_hour;
        referrer_econ.referral_count += 1;
        // Boost changes the effective rate, so the full-projection moves in
        engine::refresh_projection(&mut referrer_econ, &params);

        // The new user's link commits first; if the referrer write then
        // fails, a retry sees the link set and stops, never double-paying.
        self.commit_econ(&mut new_state, referred, now).await?;
        self.commit_econ(&mut ref_state, referrer_econ, now).await?;
        drop(new_state);
        drop(ref_state);

        let repo = &self.inner.repo;
        repo.append_audit(
            &TransactionRecord::new(
                referrer.clone(),
                TransactionKind::ReferralBonus,
                params.referral_direct_bonus as i128,
                now,
            )
            .with_related(new_user.as_str().to_string()),
        )
        .await;
        repo.append_audit(
            &TransactionRecord::new(
                new_user.clone(),
                TransactionKind::ReferralFriendBonus,
                params.referral_friend_bonus as i128,
                now,
            )
            .with_related(referrer.as_str().to_string()),
        )
        .await;
        repo.append_referral(&ReferralRecord {
            referrer_id: referrer.clone(),
            referred_user_id: new_user.clone(),
            bonus_amount: params.referral_direct_bonus,
            friend_bonus_amount: params.referral_friend_bonus,
            timestamp: now,
        })
        .await;

        self.notify(
            referrer.as_str(),
            &format!(
                "{} joined through your link: +{}",
                new_user,
                format_coins(params.referral_direct_bonus)
            ),
        )
        .await;

        tracing::info!(referrer = %referrer, referred = %new_user, "referral propagated");
        Ok(true)
    }

    /// Credit the referrer's share of a task reward a referred user just
    /// earned. Called after the earner's own credit committed and outside
    /// their session lock; every failure is logged and swallowed so the
    /// completion itself never depends on the share.
    pub(crate) async fn process_task_reward(
        &self,
        user: &UserId,
        reward: Amount,
        related: &str,
    ) {
        let referrer = match self.referrer_of(user).await {
            Ok(referrer) => referrer,
            Err(err) => {
                tracing::warn!(user = %user, error = %err, "reward share skipped: earner unreadable");
                return;
            }
        };
        let Some(referrer) = referrer else {
            return;
        };

        let share = self.params().referral_share(reward);
        if share == 0 {
            return;
        }

        match self
            .credit(
                &referrer,
                share,
                TransactionKind::ReferralShare,
                Some(related.to_string()),
            )
            .await
        {
            Ok(_) => {
                tracing::debug!(referrer = %referrer, user = %user, share = share as u64, "reward share credited");
            }
            Err(err) => {
                tracing::warn!(referrer = %referrer, user = %user, error = %err, "reward share credit failed");
            }
        }
    }

    /// The earner's referrer, from the session cache when warm
    async fn referrer_of(&self, user: &UserId) -> Result<Option<UserId>> {
        let state = self.inner.sessions.lock(user).await;
        if let Some(econ) = &state.econ {
            return Ok(econ.referred_by.clone());
        }
        drop(state);
        Ok(self
            .inner
            .repo
            .load_user(user)
            .await?
            .and_then(|econ| econ.referred_by))
    }
}
