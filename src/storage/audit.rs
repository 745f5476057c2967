// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit rows for the generic `events` table.
//!
//! Every reconciled chain event and every ledger-changing API action appends
//! one entry. Entries are sequence-numbered on insert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Event type for users registered through the API.
pub const USER_REGISTERED: &str = "user_registered";

/// Event type for emergency cases opened through the API.
pub const EMERGENCY_CASE_CREATED: &str = "emergency_case_created";

/// Event type for mobile money sent to a phone wallet.
pub const MOBILE_MONEY_SEND: &str = "mobile_money_send";

/// Event type for mobile money received from a phone wallet.
pub const MOBILE_MONEY_RECEIVE: &str = "mobile_money_receive";

/// Event type for a blockchain card mirrored from chain state.
pub const ALGORAND_CARD_SYNC: &str = "algorand_card_sync";

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventLogEntry {
    /// Sequence number assigned by the ledger (0 until appended).
    pub seq: u64,
    /// Unique event ID.
    pub event_id: String,
    /// Event type, e.g. `algorand_fiat_deposit`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// When the event was processed.
    pub timestamp: DateTime<Utc>,
    /// User the event concerns (if resolved).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Originating blockchain transaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorand_tx_id: Option<String>,
    /// Round the transaction was confirmed in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorand_round: Option<u64>,
    /// Event payload plus processing details.
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
}

impl EventLogEntry {
    /// Create a new entry of the given type.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            seq: 0,
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            user_id: None,
            algorand_tx_id: None,
            algorand_round: None,
            data: serde_json::Value::Null,
        }
    }

    /// Set the user ID.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attach the chain position the event came from.
    pub fn with_chain(mut self, tx_id: impl Into<String>, round: Option<u64>) -> Self {
        self.algorand_tx_id = Some(tx_id.into());
        self.algorand_round = round;
        self
    }

    /// Add details.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}
