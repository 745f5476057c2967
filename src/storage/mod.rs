// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Storage
//!
//! Persistent off-chain ledger for the relief platform, stored in a single
//! redb file under `DATA_DIR`.
//!
//! ## Storage Layout
//!
//! ```text
//! $DATA_DIR/
//!   ledger.redb     # users, balances, ledger rows, cases, cursor, audit log
//! ```
//!
//! All writes go through [`LedgerDb::write`] so that a reconciled event's
//! rows, its idempotency marker and its audit entry land atomically.

pub mod audit;
pub mod ledger_db;
pub mod records;

pub use audit::EventLogEntry;
pub use ledger_db::{
    BalanceOperation, LedgerDb, LedgerDbError, LedgerDbResult, LedgerWrite, LAST_ROUND_SETTING,
};
pub use records::*;

/// File name of the ledger database inside the data directory.
pub const LEDGER_DB_FILE: &str = "ledger.redb";
