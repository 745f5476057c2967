// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use crate::storage::LedgerDbError;

use super::DecodeError;

/// Errors applying a chain event to the ledger.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("{role} not found for wallet address {address}")]
    AddressNotFound { role: &'static str, address: String },

    #[error("Unrecognized event type: {0}")]
    Unrecognized(String),

    #[error("No handler registered for {0}")]
    NoHandler(&'static str),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("Setting {0} is reserved")]
    ReservedSetting(String),

    #[error("Ledger error: {0}")]
    Ledger(LedgerDbError),
}

impl ReconcileError {
    pub fn user_not_found(address: &str) -> Self {
        Self::AddressNotFound {
            role: "User",
            address: address.to_string(),
        }
    }

    pub fn ngo_not_found(address: &str) -> Self {
        Self::AddressNotFound {
            role: "NGO",
            address: address.to_string(),
        }
    }

    /// Whether retrying the same event later could succeed without any
    /// change to the event itself.
    ///
    /// The indexer retries the round on transient errors and skips the event
    /// on everything else.
    pub fn is_transient(&self) -> bool {
        match self {
            ReconcileError::Ledger(inner) => !matches!(
                inner,
                LedgerDbError::NotFound(_)
                    | LedgerDbError::Conflict(_)
                    | LedgerDbError::Corrupt(_)
                    | LedgerDbError::LimitExceeded { .. }
            ),
            _ => false,
        }
    }
}

impl From<LedgerDbError> for ReconcileError {
    fn from(e: LedgerDbError) -> Self {
        match e {
            LedgerDbError::InsufficientBalance { .. } => {
                ReconcileError::InsufficientBalance(e.to_string())
            }
            other => ReconcileError::Ledger(other),
        }
    }
}

impl From<DecodeError> for ReconcileError {
    fn from(e: DecodeError) -> Self {
        ReconcileError::InvalidEvent(e.to_string())
    }
}
