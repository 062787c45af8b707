//! # Lode Core
//!
//! Core domain model for the Lode mining economy.
//!
//! This crate provides the building blocks shared by every other crate:
//! - `Amount` - integer pico-coin monetary representation
//! - `UserEconomy` - the per-user economy snapshot (buffer, balance, levels)
//! - Task, transfer and audit documents persisted in the ledger
//! - `EconomyError` - the full error taxonomy with stable codes
//! - Instant normalization for the storage boundary
//!
//! Nothing in this crate performs I/O.

pub mod amount;
pub mod error;
pub mod time;
pub mod types;

pub use amount::*;
pub use error::*;
pub use types::*;
