//! Accrual scheduler
//!
//! One spawned loop per active user session, ticking at the configured
//! cadence. Every tick advances the cached snapshot through the engine;
//! the advanced accrual fields are written to the ledger only when the
//! persist throttle has elapsed, bounding write volume. The loop shares
//! the session lock with user and admin operations, so a tick never
//! interleaves with a claim on the same snapshot.

use crate::repo::now_millis;
use crate::service::EconomyService;
use lode_core::{Result, UserId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to a running per-user accrual loop
pub struct AccrualHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl AccrualHandle {
    /// Stop the loop, flushing a final persist
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

impl EconomyService {
    /// Start the accrual loop for a user session
    pub fn start_accrual(&self, user: UserId) -> AccrualHandle {
        let service = self.clone();
        let tick = self.inner.config.scheduler.tick();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::debug!(user = %user, "accrual loop started");
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(err) = service.accrual_tick(&user).await {
                            tracing::warn!(user = %user, error = %err, "accrual tick failed");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        if let Err(err) = service.flush_accrual(&user).await {
                            tracing::warn!(user = %user, error = %err, "final accrual flush failed");
                        }
                        tracing::debug!(user = %user, "accrual loop stopped");
                        break;
                    }
                }
            }
        });

        AccrualHandle { shutdown_tx, task }
    }

    /// Advance the cached snapshot; persist when the throttle has elapsed
    pub(crate) async fn accrual_tick(&self, user: &UserId) -> Result<()> {
        let now = now_millis();
        let throttle = self.inner.config.scheduler.persist_throttle();

        let mut state = self.inner.sessions.lock(user).await;
        let advanced = self.current_econ(&mut state, user, now).await?;

        let persist_due = state
            .last_persist
            .map(|at| now - at >= throttle)
            .unwrap_or(true);
        if persist_due {
            self.inner.repo.persist_accrual(&advanced).await?;
            state.last_persist = Some(now);
        }
        state.econ = Some(advanced);
        Ok(())
    }

    /// Persist the cached accrual state unconditionally
    pub(crate) async fn flush_accrual(&self, user: &UserId) -> Result<()> {
        let now = now_millis();
        let mut state = self.inner.sessions.lock(user).await;
        let advanced = self.current_econ(&mut state, user, now).await?;
        self.inner.repo.persist_accrual(&advanced).await?;
        state.last_persist = Some(now);
        state.econ = Some(advanced);
        Ok(())
    }
}
