//! # Lode Service
//!
//! The orchestration layer of the idle-accrual economy: it wires the pure
//! engine from `lode-economy` to a [`lode_ledger::LedgerStore`] and a
//! [`Notifier`], serializes every per-user mutation through a session
//! mutex, and runs the background accrual scheduler.
//!
//! ## Surface
//!
//! [`EconomyService`] is the single entry point:
//!
//! - session lifecycle: [`EconomyService::open_session`], per-user accrual
//!   loops via [`EconomyService::start_accrual`]
//! - economy commands: claim, rate/capacity upgrades
//! - task workflow: user actions plus the admin review queue
//! - referral propagation: signup bonuses and ongoing reward shares
//! - transfers: withdrawal/deposit requests and admin resolution
//!
//! Commands return `Result<_, EconomyError>`; [`ActionOutcome`] converts
//! either arm to the success-flag shape the presentation layer renders.

pub mod config;
pub mod notify;
mod referrals;
mod repo;
mod scheduler;
mod service;
mod session;
mod tasks;
mod transfers;

pub use config::{LoggingConfig, NotifyConfig, SchedulerConfig, ServiceConfig, StoreConfig};
pub use notify::{Notifier, NotifyError, NullNotifier, RecordingNotifier};
pub use scheduler::AccrualHandle;
pub use service::{ActionOutcome, EconomyService};
pub use tasks::TaskAction;
