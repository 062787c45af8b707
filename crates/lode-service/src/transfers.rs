//! Withdrawal and deposit request lifecycle
//!
//! Requests are user-initiated and admin-resolved. Withdrawals escrow the
//! amount up front: the balance is debited when the request is filed, paid
//! out off-platform on approval, and refunded on rejection. Deposits hold
//! no balance until an admin verifies the external transaction and
//! approves; only then is the amount credited.
//!
//! Resolution ordering prefers a lost credit over a double credit: the
//! request document is marked resolved before any balance credit, so a
//! crash between the two leaves a resolved request and a loud log line
//! rather than a request that can be approved twice.

use crate::repo::now_millis;
use crate::service::EconomyService;
use lode_core::{
    format_coins, fresh_id, Amount, EconomyError, Result, TransactionKind, TransactionRecord,
    TransferKind, TransferRequest, TransferStatus, UserId,
};

impl EconomyService {
    // === User requests ===

    /// File a withdrawal request, escrowing the amount from the balance
    pub async fn request_withdrawal(
        &self,
        user: &UserId,
        amount: Amount,
        address: &str,
    ) -> Result<TransferRequest> {
        if amount == 0 {
            return Err(EconomyError::InvalidAmount);
        }

        let now = now_millis();
        let request = {
            let mut state = self.inner.sessions.lock(user).await;
            let mut current = self.current_econ(&mut state, user, now).await?;
            if current.total_balance < amount {
                return Err(EconomyError::InsufficientBalance {
                    need: amount,
                    have: current.total_balance,
                });
            }
            current.total_balance -= amount;
            self.commit_econ(&mut state, current, now).await?;

            let request = TransferRequest {
                id: fresh_id(),
                user_id: user.clone(),
                kind: TransferKind::Withdrawal,
                amount,
                address: Some(address.to_string()),
                tx_hash: None,
                status: TransferStatus::Pending,
                reject_reason: None,
                requested_at: now,
                resolved_at: None,
            };
            if let Err(err) = self.inner.repo.save_transfer(&request).await {
                // Undo the escrow; without a stored request the debit has
                // nothing to pay out against.
                let mut restored = self.current_econ(&mut state, user, now).await?;
                restored.total_balance += amount;
                self.commit_econ(&mut state, restored, now).await?;
                return Err(err);
            }
            request
        };

        self.inner
            .repo
            .append_audit(
                &TransactionRecord::new(
                    user.clone(),
                    TransactionKind::WithdrawalRequest,
                    -(amount as i128),
                    now,
                )
                .with_related(request.id.clone()),
            )
            .await;

        self.notify(
            self.admin_channel(),
            &format!(
                "Withdrawal request {}: {} wants {} to {}",
                request.id,
                user,
                format_coins(amount),
                address
            ),
        )
        .await;

        tracing::info!(user = %user, request = %request.id, amount = amount as u64, "withdrawal requested");
        Ok(request)
    }

    /// File a deposit request referencing an external transaction. Nothing
    /// is credited until an admin verifies and approves.
    pub async fn request_deposit(
        &self,
        user: &UserId,
        amount: Amount,
        tx_hash: &str,
    ) -> Result<TransferRequest> {
        if amount == 0 {
            return Err(EconomyError::InvalidAmount);
        }
        // The user must exist before a request can reference them
        self.get_user_economy(user).await?;

        let now = now_millis();
        let request = TransferRequest {
            id: fresh_id(),
            user_id: user.clone(),
            kind: TransferKind::Deposit,
            amount,
            address: None,
            tx_hash: Some(tx_hash.to_string()),
            status: TransferStatus::Pending,
            reject_reason: None,
            requested_at: now,
            resolved_at: None,
        };
        self.inner.repo.save_transfer(&request).await?;

        self.notify(
            self.admin_channel(),
            &format!(
                "Deposit request {}: {} claims {} in tx {}",
                request.id,
                user,
                format_coins(amount),
                tx_hash
            ),
        )
        .await;

        tracing::info!(user = %user, request = %request.id, amount = amount as u64, "deposit requested");
        Ok(request)
    }

    // === Admin resolution ===

    /// Approve a pending request. Withdrawals just record the resolution
    /// (the payout happens off-platform); deposits credit the amount.
    pub async fn admin_approve_transfer(&self, request_id: &str) -> Result<TransferRequest> {
        let found = self
            .inner
            .repo
            .get_transfer(request_id)
            .await?
            .ok_or_else(|| EconomyError::not_found("transfer request", request_id))?;
        let user = found.user_id.clone();

        let now = now_millis();
        let request = {
            let _state = self.inner.sessions.lock(&user).await;
            // Re-read under the user's lock; double resolutions serialize here
            let mut request = self
                .inner
                .repo
                .get_transfer(request_id)
                .await?
                .ok_or_else(|| EconomyError::not_found("transfer request", request_id))?;
            if request.status != TransferStatus::Pending {
                return Err(EconomyError::AlreadyResolved);
            }
            request.status = TransferStatus::Approved;
            request.resolved_at = Some(now);
            self.inner.repo.save_transfer(&request).await?;
            request
        };

        match request.kind {
            TransferKind::Withdrawal => {
                self.notify(
                    user.as_str(),
                    &format!(
                        "Your withdrawal of {} was approved and is on its way",
                        format_coins(request.amount)
                    ),
                )
                .await;
            }
            TransferKind::Deposit => {
                // Request already resolved; a failure here loses the credit
                // rather than allowing a second approval, and is logged by
                // the credit path.
                if let Err(err) = self
                    .credit(
                        &user,
                        request.amount,
                        TransactionKind::Deposit,
                        Some(request.id.clone()),
                    )
                    .await
                {
                    tracing::error!(
                        request = %request.id,
                        user = %user,
                        amount = request.amount as u64,
                        error = %err,
                        "deposit credit failed after request was resolved"
                    );
                    return Err(err);
                }
                self.notify(
                    user.as_str(),
                    &format!(
                        "Your deposit of {} was verified and credited",
                        format_coins(request.amount)
                    ),
                )
                .await;
            }
        }

        tracing::info!(request = %request.id, user = %user, kind = ?request.kind, "transfer approved");
        Ok(request)
    }

    /// Reject a pending request with a reason. Withdrawals refund the
    /// escrowed amount; deposits never held any balance.
    pub async fn admin_reject_transfer(
        &self,
        request_id: &str,
        reason: &str,
    ) -> Result<TransferRequest> {
        let found = self
            .inner
            .repo
            .get_transfer(request_id)
            .await?
            .ok_or_else(|| EconomyError::not_found("transfer request", request_id))?;
        let user = found.user_id.clone();

        let now = now_millis();
        let request = {
            let _state = self.inner.sessions.lock(&user).await;
            let mut request = self
                .inner
                .repo
                .get_transfer(request_id)
                .await?
                .ok_or_else(|| EconomyError::not_found("transfer request", request_id))?;
            if request.status != TransferStatus::Pending {
                return Err(EconomyError::AlreadyResolved);
            }
            request.status = TransferStatus::Rejected;
            request.reject_reason = Some(reason.to_string());
            request.resolved_at = Some(now);
            self.inner.repo.save_transfer(&request).await?;
            request
        };

        if request.kind == TransferKind::Withdrawal {
            if let Err(err) = self
                .credit(
                    &user,
                    request.amount,
                    TransactionKind::WithdrawalRefund,
                    Some(request.id.clone()),
                )
                .await
            {
                tracing::error!(
                    request = %request.id,
                    user = %user,
                    amount = request.amount as u64,
                    error = %err,
                    "withdrawal refund failed after request was resolved"
                );
                return Err(err);
            }
        }

        self.notify(
            user.as_str(),
            &format!(
                "Your {} request was rejected: {}",
                match request.kind {
                    TransferKind::Withdrawal => "withdrawal",
                    TransferKind::Deposit => "deposit",
                },
                reason
            ),
        )
        .await;

        tracing::info!(request = %request.id, user = %user, kind = ?request.kind, reason, "transfer rejected");
        Ok(request)
    }

    // === Read accessors ===

    /// Requests awaiting resolution (admin queue)
    pub async fn pending_transfers(&self) -> Result<Vec<TransferRequest>> {
        self.inner.repo.pending_transfers().await
    }

    /// A user's requests, newest first
    pub async fn user_transfers(&self, user: &UserId) -> Result<Vec<TransferRequest>> {
        self.inner.repo.transfers_for(user).await
    }
}
