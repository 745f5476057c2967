// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Crisis-Relief Contract Events
//!
//! The relief contract emits one log line per event, formatted as
//! `TAG:field1:field2:...`. This module turns those lines (or the equivalent
//! JSON posted to the sync endpoint) into typed [`ChainEvent`]s and applies
//! them to the ledger through registered [`EventHandler`]s.
//!
//! ## Flow
//!
//! ```text
//! log bytes / JSON ──decode──▶ ChainEvent ──HandlerRegistry::dispatch──▶ LedgerWrite
//! ```
//!
//! Each dispatch is one ledger unit of work: idempotency check, handler
//! writes, processed-key write and the audit row commit together.

use serde::Serialize;

pub mod decode;
pub mod error;
pub mod handlers;
pub mod registry;

pub use decode::{decode_json, decode_log, DecodeError};
pub use error::ReconcileError;
pub use handlers::{EventHandler, HandlerOutput};
pub use registry::{DispatchOutcome, HandlerRegistry};

// =============================================================================
// Event kinds
// =============================================================================

/// Event tags emitted by the relief contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    FiatDeposit,
    NgoAuthorized,
    CrisisBadgeIssued,
    EmergencyDisbursal,
    TokenTransfer,
    VirtualCardCreated,
    SystemUpdated,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::FiatDeposit,
        EventKind::NgoAuthorized,
        EventKind::CrisisBadgeIssued,
        EventKind::EmergencyDisbursal,
        EventKind::TokenTransfer,
        EventKind::VirtualCardCreated,
        EventKind::SystemUpdated,
    ];

    /// Wire tag, e.g. `FIAT_DEPOSIT`.
    pub fn tag(&self) -> &'static str {
        match self {
            EventKind::FiatDeposit => "FIAT_DEPOSIT",
            EventKind::NgoAuthorized => "NGO_AUTHORIZED",
            EventKind::CrisisBadgeIssued => "CRISIS_BADGE_ISSUED",
            EventKind::EmergencyDisbursal => "EMERGENCY_DISBURSAL",
            EventKind::TokenTransfer => "TOKEN_TRANSFER",
            EventKind::VirtualCardCreated => "VIRTUAL_CARD_CREATED",
            EventKind::SystemUpdated => "SYSTEM_UPDATED",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Positional field names following the tag in a log line.
    ///
    /// Log lines are not self-describing; this order is fixed by the contract.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            EventKind::FiatDeposit => &["userAddress", "amount", "stripePaymentId", "timestamp"],
            EventKind::NgoAuthorized => &["userAddress", "rating", "region", "timestamp"],
            EventKind::CrisisBadgeIssued => &[
                "userAddress",
                "caseId",
                "crisisType",
                "severity",
                "ngoAddress",
                "timestamp",
            ],
            EventKind::EmergencyDisbursal => {
                &["userAddress", "amount", "caseId", "ngoAddress", "timestamp"]
            }
            EventKind::TokenTransfer => {
                &["fromAddress", "toAddress", "amount", "reference", "timestamp"]
            }
            EventKind::VirtualCardCreated => {
                &["userAddress", "cardLimit", "cardType", "timestamp"]
            }
            EventKind::SystemUpdated => &["settingKey", "settingValue", "reason", "timestamp"],
        }
    }

    /// Type written to the audit `events` table.
    pub fn audit_type(&self) -> String {
        format!("algorand_{}", self.tag().to_lowercase())
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

// =============================================================================
// Typed payloads
// =============================================================================

/// Fiat deposit minted on-chain after a Stripe payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FiatDeposit {
    pub user_address: String,
    #[serde(rename = "amount")]
    pub amount_micro: u64,
    pub stripe_payment_id: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NgoAuthorized {
    pub user_address: String,
    /// Declared 1-10, not range-checked.
    pub rating: i64,
    pub region: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrisisBadgeIssued {
    pub user_address: String,
    pub case_id: String,
    pub crisis_type: String,
    /// Declared 1-5, not range-checked.
    pub severity: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ngo_address: Option<String>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyDisbursal {
    pub user_address: String,
    #[serde(rename = "amount")]
    pub amount_micro: u64,
    pub case_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ngo_address: Option<String>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    pub from_address: String,
    pub to_address: String,
    #[serde(rename = "amount")]
    pub amount_micro: u64,
    pub reference: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualCardCreated {
    pub user_address: String,
    #[serde(rename = "cardLimit")]
    pub card_limit_micro: u64,
    pub card_type: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemUpdated {
    pub setting_key: String,
    #[serde(rename = "settingValue")]
    pub setting_value_micro: u64,
    pub reason: String,
    pub timestamp: u64,
}

/// A decoded contract event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    FiatDeposit(FiatDeposit),
    NgoAuthorized(NgoAuthorized),
    CrisisBadgeIssued(CrisisBadgeIssued),
    EmergencyDisbursal(EmergencyDisbursal),
    TokenTransfer(TokenTransfer),
    VirtualCardCreated(VirtualCardCreated),
    SystemUpdated(SystemUpdated),
    /// A tag this service does not know.
    Unrecognized { tag: String, fields: Vec<String> },
}

impl ChainEvent {
    pub fn kind(&self) -> Option<EventKind> {
        match self {
            ChainEvent::FiatDeposit(_) => Some(EventKind::FiatDeposit),
            ChainEvent::NgoAuthorized(_) => Some(EventKind::NgoAuthorized),
            ChainEvent::CrisisBadgeIssued(_) => Some(EventKind::CrisisBadgeIssued),
            ChainEvent::EmergencyDisbursal(_) => Some(EventKind::EmergencyDisbursal),
            ChainEvent::TokenTransfer(_) => Some(EventKind::TokenTransfer),
            ChainEvent::VirtualCardCreated(_) => Some(EventKind::VirtualCardCreated),
            ChainEvent::SystemUpdated(_) => Some(EventKind::SystemUpdated),
            ChainEvent::Unrecognized { .. } => None,
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            ChainEvent::Unrecognized { tag, .. } => tag,
            other => other.kind().map(|k| k.tag()).unwrap_or_default(),
        }
    }

    /// Payload as a camelCase JSON object (for the audit trail).
    pub fn payload_json(&self) -> serde_json::Value {
        let value = match self {
            ChainEvent::FiatDeposit(p) => serde_json::to_value(p),
            ChainEvent::NgoAuthorized(p) => serde_json::to_value(p),
            ChainEvent::CrisisBadgeIssued(p) => serde_json::to_value(p),
            ChainEvent::EmergencyDisbursal(p) => serde_json::to_value(p),
            ChainEvent::TokenTransfer(p) => serde_json::to_value(p),
            ChainEvent::VirtualCardCreated(p) => serde_json::to_value(p),
            ChainEvent::SystemUpdated(p) => serde_json::to_value(p),
            ChainEvent::Unrecognized { fields, .. } => Ok(serde_json::json!({ "fields": fields })),
        };
        value.unwrap_or(serde_json::Value::Null)
    }
}

/// Typed payload that a handler can be registered for.
pub trait EventPayload: Send + Sync + 'static {
    const KIND: EventKind;

    /// Borrow this payload out of a decoded event, if the variant matches.
    fn from_event(event: &ChainEvent) -> Option<&Self>;
}

macro_rules! impl_event_payload {
    ($($payload:ident),+ $(,)?) => {
        $(
            impl EventPayload for $payload {
                const KIND: EventKind = EventKind::$payload;

                fn from_event(event: &ChainEvent) -> Option<&Self> {
                    match event {
                        ChainEvent::$payload(payload) => Some(payload),
                        _ => None,
                    }
                }
            }

            impl From<$payload> for ChainEvent {
                fn from(payload: $payload) -> Self {
                    ChainEvent::$payload(payload)
                }
            }
        )+
    };
}

impl_event_payload!(
    FiatDeposit,
    NgoAuthorized,
    CrisisBadgeIssued,
    EmergencyDisbursal,
    TokenTransfer,
    VirtualCardCreated,
    SystemUpdated,
);

// =============================================================================
// Event context
// =============================================================================

/// Where an event came from on-chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    /// Algorand transaction ID.
    pub tx_id: String,
    /// Transaction sender (NGO or admin for privileged events).
    pub sender: Option<String>,
    /// Confirmed round, when known.
    pub round: Option<u64>,
    /// Position of the log line within the transaction.
    pub log_index: u32,
}

impl EventContext {
    pub fn new(tx_id: impl Into<String>) -> Self {
        Self {
            tx_id: tx_id.into(),
            sender: None,
            round: None,
            log_index: 0,
        }
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn at(mut self, round: u64, log_index: u32) -> Self {
        self.round = Some(round);
        self.log_index = log_index;
        self
    }

    /// Key under which an applied event is remembered.
    pub fn idempotency_key(&self, kind: EventKind) -> String {
        format!("{}:{}:{}", kind.tag(), self.tx_id, self.log_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(EventKind::from_tag("fiat_deposit"), None);
        assert_eq!(EventKind::from_tag("PRICE_UPDATED"), None);
    }

    #[test]
    fn audit_type_is_lowercased_tag() {
        assert_eq!(EventKind::FiatDeposit.audit_type(), "algorand_fiat_deposit");
        assert_eq!(
            EventKind::CrisisBadgeIssued.audit_type(),
            "algorand_crisis_badge_issued"
        );
    }

    #[test]
    fn payload_extraction_matches_variant() {
        let event: ChainEvent = TokenTransfer {
            from_address: "A".into(),
            to_address: "B".into(),
            amount_micro: 1,
            reference: "r".into(),
            timestamp: 0,
        }
        .into();

        assert!(TokenTransfer::from_event(&event).is_some());
        assert!(FiatDeposit::from_event(&event).is_none());
        assert_eq!(event.kind(), Some(TokenTransfer::KIND));
        assert_eq!(event.tag(), "TOKEN_TRANSFER");
    }

    #[test]
    fn payload_json_uses_wire_names() {
        let event: ChainEvent = FiatDeposit {
            user_address: "ADDR".into(),
            amount_micro: 5_000_000,
            stripe_payment_id: "pi_1".into(),
            timestamp: 1_700_000_000,
        }
        .into();

        let json = event.payload_json();
        assert_eq!(json["userAddress"], "ADDR");
        assert_eq!(json["amount"], 5_000_000);
        assert_eq!(json["stripePaymentId"], "pi_1");
    }

    #[test]
    fn idempotency_key_includes_tag_tx_and_index() {
        let ctx = EventContext::new("TXID").at(10, 2);
        assert_eq!(
            ctx.idempotency_key(EventKind::TokenTransfer),
            "TOKEN_TRANSFER:TXID:2"
        );
    }
}
