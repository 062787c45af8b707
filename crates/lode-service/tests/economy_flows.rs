//! End-to-end flows over the full service: memory ledger, recording
//! notifier, default parameters.

use async_trait::async_trait;
use chrono::Duration;
use lode_core::{
    EconomyError, SubmissionStatus, TaskDefinition, TaskId, TaskKind, TransactionKind,
    TransferStatus, UserId,
};
use lode_ledger::{collections, LedgerStore, MemoryLedger};
use lode_service::{
    EconomyService, Notifier, NotifyError, RecordingNotifier, ServiceConfig, TaskAction,
};
use std::sync::Arc;

fn setup() -> (EconomyService, Arc<MemoryLedger>, Arc<RecordingNotifier>) {
    let store = Arc::new(MemoryLedger::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let service = EconomyService::new(
        store.clone(),
        notifier.clone(),
        ServiceConfig::default(),
    )
    .unwrap();
    (service, store, notifier)
}

fn auto_task(id: &str, reward: u128) -> TaskDefinition {
    TaskDefinition {
        id: TaskId::from(id),
        name: format!("Task {id}"),
        description: "Follow the channel".to_string(),
        reward,
        target: "https://example.com/channel".to_string(),
        kind: TaskKind::Auto,
        active: true,
    }
}

fn manual_task(id: &str, reward: u128) -> TaskDefinition {
    TaskDefinition {
        kind: TaskKind::Manual,
        ..auto_task(id, reward)
    }
}

/// Complete an auto task for a user: first action visits, second confirms
async fn complete_auto(service: &EconomyService, user: &UserId, task: &TaskId) -> u128 {
    match service.act_on_task(user, task).await.unwrap() {
        TaskAction::Visited { .. } => {}
        other => panic!("expected visit, got {other:?}"),
    }
    match service.act_on_task(user, task).await.unwrap() {
        TaskAction::Completed { reward } => reward,
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_referred_signup_pays_both_sides() {
    let (service, _store, notifier) = setup();
    let alice = UserId::from("alice");
    let bob = UserId::from("bob");

    service.open_session(&alice, None).await.unwrap();
    let bob_econ = service
        .open_session(&bob, Some(alice.clone()))
        .await
        .unwrap();

    assert_eq!(bob_econ.total_balance, 12_500_000);
    assert_eq!(bob_econ.referred_by, Some(alice.clone()));

    let alice_econ = service.get_user_economy(&alice).await.unwrap();
    assert_eq!(alice_econ.total_balance, 25_000_000);
    assert_eq!(alice_econ.referral_count, 1);
    assert_eq!(alice_econ.rate_bonus_per_hour, 2_700_000);

    let history = service.referral_history(&alice).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].referred_user_id, bob);

    assert_eq!(notifier.sent_to("alice").len(), 1);
}

#[tokio::test]
async fn test_signup_propagation_is_idempotent() {
    let (service, _store, _notifier) = setup();
    let alice = UserId::from("alice");
    let bob = UserId::from("bob");

    service.open_session(&alice, None).await.unwrap();
    service
        .open_session(&bob, Some(alice.clone()))
        .await
        .unwrap();

    // Relogin with the same referral payload and a direct repeat call
    service
        .open_session(&bob, Some(alice.clone()))
        .await
        .unwrap();
    assert!(!service.process_signup(&bob, &alice).await.unwrap());

    let alice_econ = service.get_user_economy(&alice).await.unwrap();
    assert_eq!(alice_econ.total_balance, 25_000_000);
    assert_eq!(alice_econ.referral_count, 1);
}

#[tokio::test]
async fn test_self_referral_is_a_no_op() {
    let (service, _store, _notifier) = setup();
    let alice = UserId::from("alice");

    let econ = service
        .open_session(&alice, Some(alice.clone()))
        .await
        .unwrap();
    assert_eq!(econ.total_balance, 0);
    assert_eq!(econ.referred_by, None);
}

#[tokio::test]
async fn test_auto_task_shares_reward_with_referrer() {
    let (service, _store, _notifier) = setup();
    let alice = UserId::from("alice");
    let bob = UserId::from("bob");

    service.open_session(&alice, None).await.unwrap();
    service
        .open_session(&bob, Some(alice.clone()))
        .await
        .unwrap();
    service
        .admin_create_task(auto_task("follow", 100_000_000))
        .await
        .unwrap();

    let reward = complete_auto(&service, &bob, &TaskId::from("follow")).await;
    assert_eq!(reward, 100_000_000);

    let bob_econ = service.get_user_economy(&bob).await.unwrap();
    assert_eq!(bob_econ.total_balance, 12_500_000 + 100_000_000);

    // Referrer got the signup bonus plus 10% of the reward
    let alice_econ = service.get_user_economy(&alice).await.unwrap();
    assert_eq!(alice_econ.total_balance, 25_000_000 + 10_000_000);

    let share = service
        .transaction_history(&alice)
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.kind == TransactionKind::ReferralShare)
        .unwrap();
    assert_eq!(share.amount, 10_000_000);
}

#[tokio::test]
async fn test_completed_auto_task_cannot_repeat() {
    let (service, _store, _notifier) = setup();
    let bob = UserId::from("bob");

    service.open_session(&bob, None).await.unwrap();
    service
        .admin_create_task(auto_task("follow", 100_000_000))
        .await
        .unwrap();
    complete_auto(&service, &bob, &TaskId::from("follow")).await;

    let err = service
        .act_on_task(&bob, &TaskId::from("follow"))
        .await
        .unwrap_err();
    assert!(matches!(err, EconomyError::AlreadyCompleted));

    let econ = service.get_user_economy(&bob).await.unwrap();
    assert_eq!(econ.total_balance, 100_000_000);
}

#[tokio::test]
async fn test_manual_task_review_cycle() {
    let (service, _store, notifier) = setup();
    let bob = UserId::from("bob");
    let task = TaskId::from("post");

    service.open_session(&bob, None).await.unwrap();
    service
        .admin_create_task(manual_task("post", 200_000_000))
        .await
        .unwrap();

    assert!(matches!(
        service.act_on_task(&bob, &task).await.unwrap(),
        TaskAction::Visited { .. }
    ));
    let submission_id = match service.act_on_task(&bob, &task).await.unwrap() {
        TaskAction::Submitted { submission_id } => submission_id,
        other => panic!("expected submission, got {other:?}"),
    };

    // No balance until review, no double submission
    assert_eq!(service.get_user_economy(&bob).await.unwrap().total_balance, 0);
    assert!(matches!(
        service.act_on_task(&bob, &task).await.unwrap_err(),
        EconomyError::AlreadySubmitted
    ));
    assert_eq!(service.pending_submissions().await.unwrap().len(), 1);

    let rejected = service
        .admin_reject_submission(&submission_id, "screenshot missing")
        .await
        .unwrap();
    assert_eq!(rejected.status, SubmissionStatus::Rejected);
    assert_eq!(service.get_user_economy(&bob).await.unwrap().total_balance, 0);

    // The rejected slot only re-opens through the explicit retry
    assert!(matches!(
        service.act_on_task(&bob, &task).await.unwrap_err(),
        EconomyError::RetryRequired
    ));

    // Resubmit into the same slot, then approve
    service.retry_task(&bob, &task).await.unwrap();
    let resubmitted_id = match service.act_on_task(&bob, &task).await.unwrap() {
        TaskAction::Submitted { submission_id } => submission_id,
        other => panic!("expected resubmission, got {other:?}"),
    };
    assert_eq!(resubmitted_id, submission_id);

    let approved = service
        .admin_approve_submission(&submission_id)
        .await
        .unwrap();
    assert_eq!(approved.status, SubmissionStatus::Approved);
    assert_eq!(
        service.get_user_economy(&bob).await.unwrap().total_balance,
        200_000_000
    );

    // Double resolution is rejected
    assert!(matches!(
        service
            .admin_approve_submission(&submission_id)
            .await
            .unwrap_err(),
        EconomyError::AlreadyResolved
    ));

    // Bob heard about both resolutions
    assert_eq!(notifier.sent_to("bob").len(), 2);
}

#[tokio::test]
async fn test_inactive_task_is_invisible() {
    let (service, _store, _notifier) = setup();
    let bob = UserId::from("bob");
    service.open_session(&bob, None).await.unwrap();

    let mut task = auto_task("old", 100_000_000);
    task.active = false;
    service.admin_create_task(task).await.unwrap();

    assert!(service.list_active_tasks().await.unwrap().is_empty());
    assert_eq!(service.list_all_tasks().await.unwrap().len(), 1);
    assert!(matches!(
        service
            .act_on_task(&bob, &TaskId::from("old"))
            .await
            .unwrap_err(),
        EconomyError::NotFound { .. }
    ));
}

#[tokio::test]
async fn test_deleted_task_does_not_break_pending_review() {
    let (service, _store, _notifier) = setup();
    let bob = UserId::from("bob");
    let task = TaskId::from("post");

    service.open_session(&bob, None).await.unwrap();
    service
        .admin_create_task(manual_task("post", 200_000_000))
        .await
        .unwrap();
    service.act_on_task(&bob, &task).await.unwrap();
    let submission_id = match service.act_on_task(&bob, &task).await.unwrap() {
        TaskAction::Submitted { submission_id } => submission_id,
        other => panic!("expected submission, got {other:?}"),
    };

    service.admin_delete_task(&task).await.unwrap();

    // The submission carries its own reward snapshot
    service
        .admin_approve_submission(&submission_id)
        .await
        .unwrap();
    assert_eq!(
        service.get_user_economy(&bob).await.unwrap().total_balance,
        200_000_000
    );
}

#[tokio::test]
async fn test_withdrawal_escrow_and_rejection_refund() {
    let (service, _store, _notifier) = setup();
    let bob = UserId::from("bob");

    service.open_session(&bob, None).await.unwrap();
    service
        .admin_create_task(auto_task("follow", 100_000_000))
        .await
        .unwrap();
    complete_auto(&service, &bob, &TaskId::from("follow")).await;

    let request = service
        .request_withdrawal(&bob, 60_000_000, "addr-1")
        .await
        .unwrap();
    assert_eq!(
        service.get_user_economy(&bob).await.unwrap().total_balance,
        40_000_000
    );
    assert_eq!(service.pending_transfers().await.unwrap().len(), 1);

    let rejected = service
        .admin_reject_transfer(&request.id, "address failed verification")
        .await
        .unwrap();
    assert_eq!(rejected.status, TransferStatus::Rejected);

    // Escrow returned to the coin
    assert_eq!(
        service.get_user_economy(&bob).await.unwrap().total_balance,
        100_000_000
    );
    let kinds: Vec<_> = service
        .transaction_history(&bob)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.kind)
        .collect();
    assert!(kinds.contains(&TransactionKind::WithdrawalRequest));
    assert!(kinds.contains(&TransactionKind::WithdrawalRefund));
}

#[tokio::test]
async fn test_withdrawal_over_balance_fails_cleanly() {
    let (service, _store, _notifier) = setup();
    let bob = UserId::from("bob");

    service.open_session(&bob, None).await.unwrap();
    service
        .admin_create_task(auto_task("follow", 30_000_000))
        .await
        .unwrap();
    complete_auto(&service, &bob, &TaskId::from("follow")).await;

    let err = service
        .request_withdrawal(&bob, 50_000_000, "addr-1")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EconomyError::InsufficientBalance {
            need: 50_000_000,
            have: 30_000_000,
        }
    ));

    assert_eq!(
        service.get_user_economy(&bob).await.unwrap().total_balance,
        30_000_000
    );
    assert!(service.pending_transfers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_approved_withdrawal_keeps_the_debit() {
    let (service, _store, _notifier) = setup();
    let bob = UserId::from("bob");

    service.open_session(&bob, None).await.unwrap();
    service
        .admin_create_task(auto_task("follow", 100_000_000))
        .await
        .unwrap();
    complete_auto(&service, &bob, &TaskId::from("follow")).await;

    let request = service
        .request_withdrawal(&bob, 60_000_000, "addr-1")
        .await
        .unwrap();
    let approved = service.admin_approve_transfer(&request.id).await.unwrap();
    assert_eq!(approved.status, TransferStatus::Approved);
    assert_eq!(
        service.get_user_economy(&bob).await.unwrap().total_balance,
        40_000_000
    );

    assert!(matches!(
        service.admin_approve_transfer(&request.id).await.unwrap_err(),
        EconomyError::AlreadyResolved
    ));
}

#[tokio::test]
async fn test_deposit_credits_only_on_approval() {
    let (service, _store, _notifier) = setup();
    let bob = UserId::from("bob");
    service.open_session(&bob, None).await.unwrap();

    let request = service
        .request_deposit(&bob, 500_000_000, "0xabc")
        .await
        .unwrap();
    assert_eq!(service.get_user_economy(&bob).await.unwrap().total_balance, 0);

    service.admin_approve_transfer(&request.id).await.unwrap();
    assert_eq!(
        service.get_user_economy(&bob).await.unwrap().total_balance,
        500_000_000
    );

    let deposit = service
        .transaction_history(&bob)
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.kind == TransactionKind::Deposit)
        .unwrap();
    assert_eq!(deposit.amount, 500_000_000);
    assert_eq!(deposit.related_id.as_deref(), Some(request.id.as_str()));
}

#[tokio::test]
async fn test_claim_after_offline_accrual() {
    let (service, store, _notifier) = setup();
    let bob = UserId::from("bob");
    service.open_session(&bob, None).await.unwrap();

    // The fee is charged against the spendable balance, so fund it first
    let funding = service
        .request_deposit(&bob, 10_000_000, "0xdef")
        .await
        .unwrap();
    service.admin_approve_transfer(&funding.id).await.unwrap();

    // Two hours offline fills the level-1 buffer exactly
    let econ = service.get_user_economy(&bob).await.unwrap();
    let stale_sync = (econ.last_sync - Duration::hours(2)).timestamp_millis();
    store
        .merge_update(
            collections::USERS,
            bob.as_str(),
            serde_json::json!({"last_sync": stale_sync}),
        )
        .await
        .unwrap();
    service.invalidate_session(&bob).await;

    let outcome = service.claim(&bob).await.unwrap();
    assert_eq!(outcome.claimed, 54_000_000);
    // 0.5% of the claim is below the fee floor
    assert_eq!(outcome.fee, 1_000_000);
    assert_eq!(outcome.economy.buffer_fill, 0);
    assert_eq!(outcome.economy.total_balance, 63_000_000);

    // Nothing left to claim
    assert!(matches!(
        service.claim(&bob).await.unwrap_err(),
        EconomyError::InsufficientBuffer
    ));
}

#[tokio::test]
async fn test_rate_upgrade_spends_and_caps_out() {
    let (service, _store, _notifier) = setup();
    let bob = UserId::from("bob");

    service.open_session(&bob, None).await.unwrap();
    service
        .admin_create_task(auto_task("follow", 100_000_000))
        .await
        .unwrap();
    complete_auto(&service, &bob, &TaskId::from("follow")).await;

    let outcome = service.upgrade_rate(&bob).await.unwrap();
    assert_eq!(outcome.new_level, 2);
    assert_eq!(outcome.cost, 50_000_000);
    assert_eq!(outcome.economy.total_balance, 50_000_000);

    // Level 3 costs more than what is left
    assert!(matches!(
        service.upgrade_rate(&bob).await.unwrap_err(),
        EconomyError::InsufficientBalance { .. }
    ));
}

struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send_message(&self, _target: &str, _text: &str) -> Result<(), NotifyError> {
        Err(NotifyError("chat gateway down".to_string()))
    }
}

#[tokio::test]
async fn test_notifier_failure_never_blocks_commands() {
    let store = Arc::new(MemoryLedger::new());
    let service = EconomyService::new(
        store,
        Arc::new(FailingNotifier),
        ServiceConfig::default(),
    )
    .unwrap();
    let alice = UserId::from("alice");
    let bob = UserId::from("bob");

    service.open_session(&alice, None).await.unwrap();
    service
        .open_session(&bob, Some(alice.clone()))
        .await
        .unwrap();
    service
        .admin_create_task(auto_task("follow", 100_000_000))
        .await
        .unwrap();
    complete_auto(&service, &bob, &TaskId::from("follow")).await;

    let request = service
        .request_withdrawal(&bob, 60_000_000, "addr-1")
        .await
        .unwrap();
    service.admin_approve_transfer(&request.id).await.unwrap();

    assert_eq!(
        service.get_user_economy(&bob).await.unwrap().total_balance,
        12_500_000 + 100_000_000 - 60_000_000
    );
}
