//! Task workflow
//!
//! Two-phase flow per (user, task): the first action opens the target link
//! and is tracked only in transient session state; the confirming action
//! creates the persisted submission. Auto tasks approve and credit
//! immediately; manual tasks queue for admin review. Resolution works off
//! the snapshot captured at submission time, so deleting a task definition
//! never breaks approval of submissions already in flight.

use crate::repo::now_millis;
use crate::service::EconomyService;
use lode_core::{
    format_coins, Amount, EconomyError, Result, SubmissionStatus, TaskDefinition, TaskId,
    TaskKind, TaskSubmission, TransactionKind, TransactionRecord, UserId,
};

/// What a user's action on a task did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskAction {
    /// First action: the target link was opened
    Visited { target: String },
    /// Auto task confirmed and approved; reward credited
    Completed { reward: Amount },
    /// Manual task confirmed; submission queued for review
    Submitted { submission_id: String },
}

impl EconomyService {
    // === Admin task administration ===

    pub async fn admin_create_task(&self, task: TaskDefinition) -> Result<()> {
        if task.reward == 0 {
            return Err(EconomyError::InvalidAmount);
        }
        tracing::info!(task = %task.id, reward = task.reward as u64, "task created");
        self.inner.repo.save_task(&task).await
    }

    pub async fn admin_update_task(&self, task: TaskDefinition) -> Result<()> {
        if task.reward == 0 {
            return Err(EconomyError::InvalidAmount);
        }
        if self.inner.repo.get_task(&task.id).await?.is_none() {
            return Err(EconomyError::not_found("task", task.id.as_str()));
        }
        self.inner.repo.save_task(&task).await
    }

    pub async fn admin_delete_task(&self, task: &TaskId) -> Result<()> {
        if !self.inner.repo.delete_task(task).await? {
            return Err(EconomyError::not_found("task", task.as_str()));
        }
        tracing::info!(task = %task, "task deleted");
        Ok(())
    }

    /// Tasks currently offered to users
    pub async fn list_active_tasks(&self) -> Result<Vec<TaskDefinition>> {
        let mut tasks = self.inner.repo.list_tasks().await?;
        tasks.retain(|t| t.active);
        Ok(tasks)
    }

    /// Every task, including inactive ones (admin view)
    pub async fn list_all_tasks(&self) -> Result<Vec<TaskDefinition>> {
        self.inner.repo.list_tasks().await
    }

    // === User actions ===

    /// Act on a task: the first call records the visit and returns the
    /// target; the next call confirms and either auto-approves (auto
    /// tasks) or queues for review (manual tasks).
    pub async fn act_on_task(&self, user: &UserId, task_id: &TaskId) -> Result<TaskAction> {
        let task = self
            .inner
            .repo
            .get_task(task_id)
            .await?
            .filter(|t| t.active)
            .ok_or_else(|| EconomyError::not_found("task", task_id.as_str()))?;

        let now = now_millis();
        let mut state = self.inner.sessions.lock(user).await;

        let existing = self.inner.repo.find_submission(user, task_id).await?;
        match existing.as_ref() {
            Some(s) if s.status == SubmissionStatus::Approved => {
                return Err(EconomyError::AlreadyCompleted)
            }
            Some(s) if s.status == SubmissionStatus::PendingApproval => {
                return Err(EconomyError::AlreadySubmitted)
            }
            // A rejected slot stays closed until the explicit retry clears
            // the rejection metadata.
            Some(s) if s.status == SubmissionStatus::Rejected && s.rejection_reason.is_some() => {
                return Err(EconomyError::RetryRequired)
            }
            _ => {}
        }

        if !state.visited.contains(task_id) {
            state.visited.insert(task_id.clone());
            return Ok(TaskAction::Visited {
                target: task.target.clone(),
            });
        }

        // Confirming action: one submission slot per (user, task) pair,
        // reusing the slot a retry re-opened.
        let mut submission = TaskSubmission {
            id: existing
                .map(|s| s.id)
                .unwrap_or_else(lode_core::fresh_id),
            user_id: user.clone(),
            task_id: task_id.clone(),
            reward: task.reward,
            task_name: task.name.clone(),
            target: task.target.clone(),
            status: SubmissionStatus::PendingApproval,
            rejection_reason: None,
            submitted_at: now,
            resolved_at: None,
        };

        match task.kind {
            TaskKind::Auto => {
                submission.status = SubmissionStatus::Approved;
                submission.resolved_at = Some(now);
                self.inner.repo.save_submission(&submission).await?;

                let mut current = self.current_econ(&mut state, user, now).await?;
                current.total_balance += task.reward;
                self.commit_econ(&mut state, current, now).await?;
                drop(state);

                self.inner
                    .repo
                    .append_audit(
                        &TransactionRecord::new(
                            user.clone(),
                            TransactionKind::TaskReward,
                            task.reward as i128,
                            now,
                        )
                        .with_related(submission.id.clone()),
                    )
                    .await;

                // Reward-share failures never block the completion
                self.process_task_reward(user, task.reward, &submission.id)
                    .await;
                self.notify(
                    self.admin_channel(),
                    &format!(
                        "{} completed task \"{}\" (+{})",
                        user,
                        task.name,
                        format_coins(task.reward)
                    ),
                )
                .await;

                tracing::info!(user = %user, task = %task_id, "auto task completed");
                Ok(TaskAction::Completed {
                    reward: task.reward,
                })
            }
            TaskKind::Manual => {
                self.inner.repo.save_submission(&submission).await?;
                drop(state);

                self.notify(
                    self.admin_channel(),
                    &format!(
                        "Review needed: {} submitted task \"{}\" ({}), reward {}",
                        user,
                        task.name,
                        submission.id,
                        format_coins(task.reward)
                    ),
                )
                .await;

                tracing::info!(user = %user, task = %task_id, submission = %submission.id, "manual task submitted");
                Ok(TaskAction::Submitted {
                    submission_id: submission.id,
                })
            }
        }
    }

    /// Explicit retry of a rejected task: clears the rejection metadata so
    /// the pair is resubmittable. Idempotent; a pair with no rejected
    /// submission is left untouched.
    pub async fn retry_task(&self, user: &UserId, task_id: &TaskId) -> Result<()> {
        let _state = self.inner.sessions.lock(user).await;
        if let Some(mut submission) = self.inner.repo.find_submission(user, task_id).await? {
            if submission.status == SubmissionStatus::Rejected
                && submission.rejection_reason.is_some()
            {
                submission.rejection_reason = None;
                self.inner.repo.save_submission(&submission).await?;
            }
        }
        Ok(())
    }

    // === Admin review ===

    /// Approve a pending submission, crediting the snapshotted reward
    pub async fn admin_approve_submission(&self, submission_id: &str) -> Result<TaskSubmission> {
        let found = self
            .inner
            .repo
            .get_submission(submission_id)
            .await?
            .ok_or_else(|| EconomyError::not_found("submission", submission_id))?;
        let user = found.user_id.clone();

        let now = now_millis();
        let submission = {
            let mut state = self.inner.sessions.lock(&user).await;
            // Re-read under the user's lock; double resolutions serialize here
            let mut submission = self
                .inner
                .repo
                .get_submission(submission_id)
                .await?
                .ok_or_else(|| EconomyError::not_found("submission", submission_id))?;
            if submission.status != SubmissionStatus::PendingApproval {
                return Err(EconomyError::AlreadyResolved);
            }
            submission.status = SubmissionStatus::Approved;
            submission.resolved_at = Some(now);
            self.inner.repo.save_submission(&submission).await?;

            let mut current = self.current_econ(&mut state, &user, now).await?;
            current.total_balance += submission.reward;
            self.commit_econ(&mut state, current, now).await?;
            submission
        };

        self.inner
            .repo
            .append_audit(
                &TransactionRecord::new(
                    user.clone(),
                    TransactionKind::TaskReward,
                    submission.reward as i128,
                    now,
                )
                .with_related(submission.id.clone()),
            )
            .await;

        self.process_task_reward(&user, submission.reward, &submission.id)
            .await;
        self.notify(
            user.as_str(),
            &format!(
                "Your task \"{}\" was approved: +{}",
                submission.task_name,
                format_coins(submission.reward)
            ),
        )
        .await;

        tracing::info!(submission = %submission.id, user = %user, "submission approved");
        Ok(submission)
    }

    /// Reject a pending submission with a reason; no balance effect
    pub async fn admin_reject_submission(
        &self,
        submission_id: &str,
        reason: &str,
    ) -> Result<TaskSubmission> {
        let found = self
            .inner
            .repo
            .get_submission(submission_id)
            .await?
            .ok_or_else(|| EconomyError::not_found("submission", submission_id))?;
        let user = found.user_id.clone();

        let now = now_millis();
        let submission = {
            let _state = self.inner.sessions.lock(&user).await;
            let mut submission = self
                .inner
                .repo
                .get_submission(submission_id)
                .await?
                .ok_or_else(|| EconomyError::not_found("submission", submission_id))?;
            if submission.status != SubmissionStatus::PendingApproval {
                return Err(EconomyError::AlreadyResolved);
            }
            submission.status = SubmissionStatus::Rejected;
            submission.rejection_reason = Some(reason.to_string());
            submission.resolved_at = Some(now);
            self.inner.repo.save_submission(&submission).await?;
            submission
        };

        self.notify(
            user.as_str(),
            &format!(
                "Your task \"{}\" was rejected: {}",
                submission.task_name, reason
            ),
        )
        .await;

        tracing::info!(submission = %submission.id, user = %user, reason, "submission rejected");
        Ok(submission)
    }

    // === Read accessors ===

    /// Submissions awaiting review (admin queue)
    pub async fn pending_submissions(&self) -> Result<Vec<TaskSubmission>> {
        self.inner.repo.pending_submissions().await
    }

    /// A user's submissions across all tasks
    pub async fn user_submissions(&self, user: &UserId) -> Result<Vec<TaskSubmission>> {
        self.inner.repo.submissions_for(user).await
    }
}
