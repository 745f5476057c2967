// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger records persisted in the embedded database.
//!
//! Amounts are kept in micro-units (`*_micro`) for exact arithmetic, with a
//! human-readable decimal string alongside for API consumers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::algorand::{format_micro_unsigned, micro_to_decimal};

/// Token type credited by fiat deposits and moved by transfers.
pub const VIRTUAL_TOKEN: &str = "WST.v";

/// Currency used for on-chain disbursals and virtual cards.
pub const CHAIN_CURRENCY: &str = "ALGO";

// =============================================================================
// Users & NGOs
// =============================================================================

/// User role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Ngo,
    Admin,
}

/// Registered user and their Algorand wallet address.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserRecord {
    pub id: String,
    /// Algorand address; unique across users.
    pub wallet_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn new(wallet_address: String, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            wallet_address,
            email: None,
            full_name: None,
            role,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Organization authorized to issue badges and disburse funds.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NgoRecord {
    pub id: String,
    pub user_id: String,
    pub wallet_address: String,
    /// Declared 1-10; stored as received.
    pub rating: i64,
    pub region: String,
    pub is_active: bool,
    pub approved_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Ledger transactions
// =============================================================================

/// Ledger transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Transfer,
    Disbursal,
}

/// Ledger row status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Virtual token ledger row.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenTransaction {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_user_id: Option<String>,
    pub token_type: String,
    pub amount_micro: u64,
    /// Amount in human-readable format
    pub amount: String,
    pub transaction_type: TransactionType,
    pub status: LedgerStatus,
    pub reference: String,
    /// Originating blockchain transaction, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorand_tx_id: Option<String>,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl TokenTransaction {
    /// Create a completed ledger row for an on-chain movement.
    pub fn completed(
        transaction_type: TransactionType,
        from_user_id: Option<String>,
        to_user_id: Option<String>,
        amount_micro: u64,
        reference: String,
        algorand_tx_id: String,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from_user_id,
            to_user_id,
            token_type: VIRTUAL_TOKEN.to_string(),
            amount_micro,
            amount: format_micro_unsigned(amount_micro),
            transaction_type,
            status: LedgerStatus::Completed,
            reference,
            algorand_tx_id: Some(algorand_tx_id),
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Amount as a decimal currency value.
    pub fn amount_decimal(&self) -> f64 {
        micro_to_decimal(self.amount_micro)
    }

    /// Whether the given user is on either side of this row.
    pub fn involves(&self, user_id: &str) -> bool {
        self.from_user_id.as_deref() == Some(user_id) || self.to_user_id.as_deref() == Some(user_id)
    }
}

/// Record of an on-chain emergency disbursal.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RemittanceLog {
    pub id: String,
    pub case_id: String,
    pub ngo_id: String,
    pub recipient_user_id: String,
    pub recipient_wallet: String,
    pub amount_micro: u64,
    pub amount: String,
    pub currency: String,
    pub status: LedgerStatus,
    pub algorand_tx_id: String,
    pub provider: String,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Emergency relief
// =============================================================================

/// Emergency case lifecycle: `pending -> approved -> completed`, or `rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    #[default]
    Pending,
    Approved,
    Completed,
    Rejected,
}

/// A relief request. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EmergencyCase {
    pub id: String,
    pub requester_user_id: String,
    pub requester_wallet: String,
    pub crisis_type: String,
    pub severity: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub requested_amount_micro: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disbursed_amount_micro: Option<u64>,
    pub status: CaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_ngo_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disbursed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Proof that an NGO vouched for a user's case. Immutable once issued.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CrisisBadge {
    pub id: String,
    pub user_id: String,
    pub case_id: String,
    pub issued_by_ngo_id: String,
    pub badge_type: String,
    pub crisis_type: String,
    pub severity_level: i64,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    pub algorand_tx_id: String,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub issued_at: DateTime<Utc>,
}

// =============================================================================
// Cards & settings
// =============================================================================

/// Card status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    Active,
    Frozen,
    Cancelled,
}

/// Virtual card created from an on-chain event.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VirtualCard {
    pub id: String,
    pub user_id: String,
    pub card_number: String,
    pub cvv: String,
    /// `MM/YY`
    pub expiry: String,
    pub card_type: String,
    pub status: CardStatus,
    pub spending_limit_micro: u64,
    pub current_balance_micro: u64,
    pub currency: String,
    pub expires_at: DateTime<Utc>,
    pub algorand_tx_id: String,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Key/value system setting.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdminSetting {
    pub setting_key: String,
    pub setting_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl AdminSetting {
    pub fn new(setting_key: impl Into<String>, setting_value: impl Into<String>) -> Self {
        Self {
            setting_key: setting_key.into(),
            setting_value: setting_value.into(),
            description: None,
            updated_by: None,
            updated_at: Utc::now(),
        }
    }
}

// =============================================================================
// Mobile money
// =============================================================================

/// Currencies accepted by mobile money wallets.
pub const MOBILE_CURRENCIES: &[&str] = &["WST", "USD", "NZD", "AUD", "FJD"];

pub const DEFAULT_MOBILE_CURRENCY: &str = "WST";

/// Daily send limit for a new mobile wallet (1,000 units).
pub const DEFAULT_DAILY_LIMIT_MICRO: u64 = 1_000_000_000;

/// Direction of a mobile money transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum MobileTransactionType {
    Send,
    Receive,
}

/// Mobile money transfer to or from a phone wallet.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MobileTransaction {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub transaction_type: MobileTransactionType,
    pub phone_number: String,
    pub amount_micro: u64,
    pub amount: String,
    pub currency: String,
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    pub recipient: String,
    pub provider: String,
    pub status: LedgerStatus,
    pub external_transaction_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Spending limits for one user and currency. Balances live in the
/// shared balance table under the currency code.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct MobileWallet {
    pub user_id: String,
    pub currency: String,
    pub daily_limit_micro: u64,
    pub daily_spent_micro: u64,
    #[schema(value_type = String, format = Date)]
    pub last_reset_day: NaiveDate,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl MobileWallet {
    pub fn new(user_id: impl Into<String>, currency: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            currency: currency.into(),
            daily_limit_micro: DEFAULT_DAILY_LIMIT_MICRO,
            daily_spent_micro: 0,
            last_reset_day: now.date_naive(),
            is_active: true,
            updated_at: now,
        }
    }

    /// Reset the daily counter when `today` is a new day.
    pub fn roll_over(&mut self, today: NaiveDate) {
        if self.last_reset_day != today {
            self.daily_spent_micro = 0;
            self.last_reset_day = today;
        }
    }
}

/// Input to [`LedgerWrite::process_mobile_transaction`](super::LedgerWrite::process_mobile_transaction).
#[derive(Debug, Clone)]
pub struct MobileTransfer {
    pub user_id: String,
    pub transaction_type: MobileTransactionType,
    /// Normalized phone number.
    pub phone_number: String,
    pub amount_micro: u64,
    pub currency: String,
    pub reference: Option<String>,
    pub sender: Option<String>,
    pub provider: String,
    pub external_transaction_id: String,
}

// =============================================================================
// Blockchain card sync
// =============================================================================

/// Currencies a synced card may hold.
pub const CARD_CURRENCIES: &[&str] = &["ALGO", "USDC", "WST", "USD", "NZD", "AUD", "FJD"];

/// Regions a synced card may be issued for.
pub const CARD_REGIONS: &[&str] = &["samoa", "pacific", "global"];

pub const DEFAULT_CARD_REGION: &str = "samoa";

/// What happened to a synced card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CardAction {
    Created,
    Funded,
    Spent,
    Refunded,
    Activated,
    Deactivated,
    Synced,
}

impl CardAction {
    /// Classify a sync by how the balance moved.
    pub fn for_sync(previous_balance: Option<u64>, new_balance: u64) -> Self {
        match previous_balance {
            None => CardAction::Created,
            Some(prev) if new_balance > prev => CardAction::Funded,
            Some(prev) if new_balance < prev => CardAction::Spent,
            Some(_) => CardAction::Synced,
        }
    }
}

/// Who reported a card activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActivitySource {
    Blockchain,
    #[default]
    Api,
    Admin,
    User,
}

/// A card held on-chain, mirrored from the contract's state.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BlockchainCard {
    pub id: String,
    pub user_address: String,
    /// Set when the address belongs to a registered user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub currency: String,
    pub balance_micro: u64,
    pub balance: String,
    pub region: String,
    pub is_active: bool,
    #[schema(value_type = Object)]
    pub blockchain_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub last_synced_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry in a card's activity history.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CardActivity {
    /// Sequence number assigned by the ledger (0 until appended).
    pub seq: u64,
    pub card_id: String,
    pub action: CardAction,
    pub amount_micro: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_balance_micro: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance_micro: Option<u64>,
    pub source: ActivitySource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl CardActivity {
    pub fn new(card_id: impl Into<String>, action: CardAction, amount_micro: u64) -> Self {
        Self {
            seq: 0,
            card_id: card_id.into(),
            action,
            amount_micro,
            previous_balance_micro: None,
            new_balance_micro: None,
            source: ActivitySource::default(),
            transaction_hash: None,
            block_number: None,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }
}

/// Input to [`LedgerWrite::sync_blockchain_card`](super::LedgerWrite::sync_blockchain_card).
#[derive(Debug, Clone)]
pub struct CardSync {
    pub card_id: String,
    pub user_address: String,
    pub balance_micro: u64,
    pub currency: String,
    pub region: String,
    pub is_active: bool,
    pub transaction_hash: Option<String>,
    pub block_number: Option<u64>,
    pub metadata: serde_json::Value,
}

/// Result of syncing one card.
#[derive(Debug, Clone)]
pub struct CardSyncOutcome {
    pub card: BlockchainCard,
    pub card_created: bool,
    pub balance_changed: bool,
    pub previous_balance_micro: Option<u64>,
    pub action: CardAction,
    pub activity_seq: u64,
}

/// A round the indexer gave up on after repeated failures.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct SkippedRound {
    pub round: u64,
    pub attempts: u32,
    pub last_error: String,
    pub skipped_at: DateTime<Utc>,
}
