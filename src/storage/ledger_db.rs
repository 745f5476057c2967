// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded ledger database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: user_id → UserRecord
//! - `user_addresses`: wallet address → user_id (exact match)
//! - `ngos`: wallet address → NgoRecord
//! - `balances`: `user_id|token` → micro-units (i64)
//! - `token_transactions`, `remittance_logs`, `emergency_cases`,
//!   `crisis_badges`, `virtual_cards`: id → record
//! - `mobile_transactions`: id → MobileTransaction
//! - `mobile_wallets`: `user_id|currency` → MobileWallet
//! - `blockchain_cards`: card id → BlockchainCard
//! - `card_activity`: sequence → CardActivity
//! - `admin_settings`: setting key → AdminSetting
//! - `events`: sequence → EventLogEntry
//! - `processed_events`: idempotency key → processed-at timestamp
//! - `skipped_rounds`: round → SkippedRound
//!
//! ## Units of Work
//!
//! Balance-affecting changes never touch rows directly from callers. They run
//! through [`LedgerDb::write`], which hands a [`LedgerWrite`] to a closure
//! inside a single write transaction. An `Err` from the closure aborts the
//! transaction so no partial rows are left behind.

use std::path::Path;

use redb::{
    Database, ReadableDatabase, ReadableTable, TableDefinition, TableHandle, WriteTransaction,
};
use serde::{de::DeserializeOwned, Serialize};

use super::audit::EventLogEntry;
use crate::algorand::format_micro_unsigned;
use super::records::*;

// =============================================================================
// Table Definitions
// =============================================================================

type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

const USERS: JsonTable = TableDefinition::new("users");
const USER_ADDRESSES: TableDefinition<&str, &str> = TableDefinition::new("user_addresses");
const NGOS: JsonTable = TableDefinition::new("ngos");
const BALANCES: TableDefinition<&str, i64> = TableDefinition::new("balances");
const TOKEN_TRANSACTIONS: JsonTable = TableDefinition::new("token_transactions");
const REMITTANCE_LOGS: JsonTable = TableDefinition::new("remittance_logs");
const EMERGENCY_CASES: JsonTable = TableDefinition::new("emergency_cases");
const CRISIS_BADGES: JsonTable = TableDefinition::new("crisis_badges");
const VIRTUAL_CARDS: JsonTable = TableDefinition::new("virtual_cards");
const MOBILE_TRANSACTIONS: JsonTable = TableDefinition::new("mobile_transactions");
const MOBILE_WALLETS: JsonTable = TableDefinition::new("mobile_wallets");
const BLOCKCHAIN_CARDS: JsonTable = TableDefinition::new("blockchain_cards");
const CARD_ACTIVITY: TableDefinition<u64, &[u8]> = TableDefinition::new("card_activity");
const ADMIN_SETTINGS: JsonTable = TableDefinition::new("admin_settings");
const EVENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("events");
const PROCESSED_EVENTS: TableDefinition<&str, &str> = TableDefinition::new("processed_events");
const SKIPPED_ROUNDS: TableDefinition<u64, &[u8]> = TableDefinition::new("skipped_rounds");

/// Setting key holding the indexer cursor.
pub const LAST_ROUND_SETTING: &str = "last_algorand_round";

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerDbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient {token} balance for user {user_id}: available {available}, requested {requested}")]
    InsufficientBalance {
        user_id: String,
        token: String,
        available: i64,
        requested: u64,
    },

    #[error("daily limit exceeded: limit {limit}, spent {spent}, requested {requested}")]
    LimitExceeded {
        limit: u64,
        spent: u64,
        requested: u64,
    },

    #[error("corrupt value: {0}")]
    Corrupt(String),
}

pub type LedgerDbResult<T> = Result<T, LedgerDbError>;

/// Balance operation for [`LedgerWrite::update_wallet_balance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceOperation {
    Add,
    Subtract,
}

fn balance_key(user_id: &str, token: &str) -> String {
    format!("{user_id}|{token}")
}

fn get_json<T, R>(table: &T, key: &str) -> LedgerDbResult<Option<R>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
    R: DeserializeOwned,
{
    let value = match table.get(key)? {
        Some(guard) => Some(serde_json::from_slice(guard.value())?),
        None => None,
    };
    Ok(value)
}

fn collect_json<T, R>(table: &T) -> LedgerDbResult<Vec<R>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
    R: DeserializeOwned,
{
    let mut out = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        out.push(serde_json::from_slice(value.value())?);
    }
    Ok(out)
}

// =============================================================================
// LedgerDb
// =============================================================================

/// Embedded ACID ledger.
pub struct LedgerDb {
    db: Database,
}

impl LedgerDb {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> LedgerDbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USER_ADDRESSES)?;
            let _ = write_txn.open_table(NGOS)?;
            let _ = write_txn.open_table(BALANCES)?;
            let _ = write_txn.open_table(TOKEN_TRANSACTIONS)?;
            let _ = write_txn.open_table(REMITTANCE_LOGS)?;
            let _ = write_txn.open_table(EMERGENCY_CASES)?;
            let _ = write_txn.open_table(CRISIS_BADGES)?;
            let _ = write_txn.open_table(VIRTUAL_CARDS)?;
            let _ = write_txn.open_table(MOBILE_TRANSACTIONS)?;
            let _ = write_txn.open_table(MOBILE_WALLETS)?;
            let _ = write_txn.open_table(BLOCKCHAIN_CARDS)?;
            let _ = write_txn.open_table(CARD_ACTIVITY)?;
            let _ = write_txn.open_table(ADMIN_SETTINGS)?;
            let _ = write_txn.open_table(EVENTS)?;
            let _ = write_txn.open_table(PROCESSED_EVENTS)?;
            let _ = write_txn.open_table(SKIPPED_ROUNDS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Run `f` inside one write transaction.
    ///
    /// Commits when `f` returns `Ok`, aborts otherwise.
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&LedgerWrite<'_>) -> Result<T, E>,
        E: From<LedgerDbError>,
    {
        let txn = self.db.begin_write().map_err(LedgerDbError::from)?;
        let outcome = {
            let writer = LedgerWrite { txn: &txn };
            f(&writer)
        };

        match outcome {
            Ok(value) => {
                txn.commit().map_err(LedgerDbError::from)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort_err) = txn.abort() {
                    tracing::warn!(error = %abort_err, "Failed to abort ledger transaction");
                }
                Err(e)
            }
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn get_user(&self, user_id: &str) -> LedgerDbResult<Option<UserRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        get_json(&table, user_id)
    }

    pub fn get_user_by_address(&self, wallet_address: &str) -> LedgerDbResult<Option<UserRecord>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USER_ADDRESSES)?;
        let user_id = match index.get(wallet_address)? {
            Some(v) => v.value().to_string(),
            None => return Ok(None),
        };
        let users = read_txn.open_table(USERS)?;
        get_json(&users, &user_id)
    }

    pub fn get_ngo_by_address(&self, wallet_address: &str) -> LedgerDbResult<Option<NgoRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(NGOS)?;
        get_json(&table, wallet_address)
    }

    /// Balance of one token for a user, in micro-units (0 if never credited).
    pub fn balance(&self, user_id: &str, token: &str) -> LedgerDbResult<i64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BALANCES)?;
        let key = balance_key(user_id, token);
        let balance = table.get(key.as_str())?.map(|v| v.value()).unwrap_or(0);
        Ok(balance)
    }

    /// All token balances for a user as `(token, micro-units)`.
    pub fn balances_for_user(&self, user_id: &str) -> LedgerDbResult<Vec<(String, i64)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BALANCES)?;
        let prefix = format!("{user_id}|");

        let mut balances = Vec::new();
        for entry in table.range(prefix.as_str()..)? {
            let (key, value) = entry?;
            let Some(token) = key.value().strip_prefix(prefix.as_str()) else {
                break;
            };
            balances.push((token.to_string(), value.value()));
        }
        Ok(balances)
    }

    /// Ledger rows touching a user, newest first.
    pub fn transactions_for_user(&self, user_id: &str) -> LedgerDbResult<Vec<TokenTransaction>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TOKEN_TRANSACTIONS)?;
        let mut txs: Vec<TokenTransaction> = collect_json(&table)?;
        txs.retain(|tx| tx.involves(user_id));
        txs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(txs)
    }

    /// All ledger rows (admin/test use).
    pub fn all_transactions(&self) -> LedgerDbResult<Vec<TokenTransaction>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TOKEN_TRANSACTIONS)?;
        collect_json(&table)
    }

    pub fn get_case(&self, case_id: &str) -> LedgerDbResult<Option<EmergencyCase>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(EMERGENCY_CASES)?;
        get_json(&table, case_id)
    }

    pub fn badges_for_case(&self, case_id: &str) -> LedgerDbResult<Vec<CrisisBadge>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CRISIS_BADGES)?;
        let mut badges: Vec<CrisisBadge> = collect_json(&table)?;
        badges.retain(|b| b.case_id == case_id);
        badges.sort_by(|a, b| a.issued_at.cmp(&b.issued_at));
        Ok(badges)
    }

    pub fn remittances_for_case(&self, case_id: &str) -> LedgerDbResult<Vec<RemittanceLog>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(REMITTANCE_LOGS)?;
        let mut logs: Vec<RemittanceLog> = collect_json(&table)?;
        logs.retain(|r| r.case_id == case_id);
        Ok(logs)
    }

    pub fn cards_for_user(&self, user_id: &str) -> LedgerDbResult<Vec<VirtualCard>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(VIRTUAL_CARDS)?;
        let mut cards: Vec<VirtualCard> = collect_json(&table)?;
        cards.retain(|c| c.user_id == user_id);
        Ok(cards)
    }

    pub fn mobile_wallet(&self, user_id: &str, currency: &str) -> LedgerDbResult<Option<MobileWallet>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MOBILE_WALLETS)?;
        get_json(&table, &balance_key(user_id, currency))
    }

    /// Mobile money transfers for a user, newest first.
    pub fn mobile_transactions_for_user(
        &self,
        user_id: &str,
    ) -> LedgerDbResult<Vec<MobileTransaction>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MOBILE_TRANSACTIONS)?;
        let mut txs: Vec<MobileTransaction> = collect_json(&table)?;
        txs.retain(|tx| tx.user_id == user_id);
        txs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(txs)
    }

    pub fn get_blockchain_card(&self, card_id: &str) -> LedgerDbResult<Option<BlockchainCard>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BLOCKCHAIN_CARDS)?;
        get_json(&table, card_id)
    }

    /// Synced cards held by an address, newest first.
    pub fn cards_for_address(
        &self,
        user_address: &str,
        active_only: bool,
    ) -> LedgerDbResult<Vec<BlockchainCard>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BLOCKCHAIN_CARDS)?;
        let mut cards: Vec<BlockchainCard> = collect_json(&table)?;
        cards.retain(|c| c.user_address == user_address && (c.is_active || !active_only));
        cards.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(cards)
    }

    /// Activity for one card, newest first.
    pub fn card_activity(
        &self,
        card_id: &str,
        limit: usize,
        offset: usize,
    ) -> LedgerDbResult<Vec<CardActivity>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CARD_ACTIVITY)?;
        let mut activity = Vec::new();
        for entry in table.iter()?.rev() {
            let (_, value) = entry?;
            let item: CardActivity = serde_json::from_slice(value.value())?;
            if item.card_id == card_id {
                activity.push(item);
            }
        }
        Ok(activity.into_iter().skip(offset).take(limit).collect())
    }

    pub fn get_setting(&self, key: &str) -> LedgerDbResult<Option<AdminSetting>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ADMIN_SETTINGS)?;
        get_json(&table, key)
    }

    /// Most recent audit events, newest first.
    pub fn recent_events(&self, limit: usize) -> LedgerDbResult<Vec<EventLogEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(EVENTS)?;
        let mut events = Vec::with_capacity(limit.min(256));
        for entry in table.iter()?.rev().take(limit) {
            let (_, value) = entry?;
            events.push(serde_json::from_slice(value.value())?);
        }
        Ok(events)
    }

    pub fn skipped_rounds(&self) -> LedgerDbResult<Vec<SkippedRound>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SKIPPED_ROUNDS)?;
        let mut rounds = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            rounds.push(serde_json::from_slice(value.value())?);
        }
        Ok(rounds)
    }

    // =========================================================================
    // Indexer cursor
    // =========================================================================

    /// Last fully processed round, if the cursor has been seeded.
    pub fn last_processed_round(&self) -> LedgerDbResult<Option<u64>> {
        match self.get_setting(LAST_ROUND_SETTING)? {
            Some(setting) => setting
                .setting_value
                .parse::<u64>()
                .map(Some)
                .map_err(|e| {
                    LedgerDbError::Corrupt(format!(
                        "{LAST_ROUND_SETTING} = {:?}: {e}",
                        setting.setting_value
                    ))
                }),
            None => Ok(None),
        }
    }

    /// Persist the last fully processed round.
    pub fn set_last_processed_round(&self, round: u64) -> LedgerDbResult<()> {
        self.write(|w| w.upsert_setting(&AdminSetting::new(LAST_ROUND_SETTING, round.to_string())))
    }

    /// Dead-letter a round.
    pub fn record_skipped_round(&self, skipped: &SkippedRound) -> LedgerDbResult<()> {
        let json = serde_json::to_vec(skipped)?;
        self.write(|w| {
            let mut table = w.txn.open_table(SKIPPED_ROUNDS)?;
            table.insert(skipped.round, json.as_slice())?;
            Ok(())
        })
    }
}

// =============================================================================
// LedgerWrite
// =============================================================================

/// Write view handed to [`LedgerDb::write`] closures.
///
/// Methods mirror the procedures the API layer is allowed to call.
pub struct LedgerWrite<'t> {
    txn: &'t WriteTransaction,
}

impl LedgerWrite<'_> {
    fn get_json<R: DeserializeOwned>(&self, def: JsonTable, key: &str) -> LedgerDbResult<Option<R>> {
        let table = self.txn.open_table(def)?;
        get_json(&table, key)
    }

    fn put_json<T: Serialize>(&self, def: JsonTable, key: &str, value: &T) -> LedgerDbResult<()> {
        let bytes = serde_json::to_vec(value)?;
        let mut table = self.txn.open_table(def)?;
        table.insert(key, bytes.as_slice())?;
        Ok(())
    }

    fn insert_new<T: Serialize>(&self, def: JsonTable, key: &str, value: &T) -> LedgerDbResult<()> {
        if self.get_json::<serde_json::Value>(def, key)?.is_some() {
            return Err(LedgerDbError::Conflict(format!("{} {key}", def.name())));
        }
        self.put_json(def, key, value)
    }

    // ---- users ----------------------------------------------------------------

    pub fn user_by_address(&self, wallet_address: &str) -> LedgerDbResult<Option<UserRecord>> {
        let user_id = {
            let index = self.txn.open_table(USER_ADDRESSES)?;
            let found = index.get(wallet_address)?.map(|v| v.value().to_string());
            found
        };
        match user_id {
            Some(id) => self.get_json(USERS, &id),
            None => Ok(None),
        }
    }

    pub fn get_user(&self, user_id: &str) -> LedgerDbResult<Option<UserRecord>> {
        self.get_json(USERS, user_id)
    }

    /// Insert a new user. The wallet address must not already be registered.
    pub fn insert_user(&self, user: &UserRecord) -> LedgerDbResult<()> {
        if self.user_by_address(&user.wallet_address)?.is_some() {
            return Err(LedgerDbError::Conflict(format!(
                "wallet address {} already registered",
                user.wallet_address
            )));
        }
        self.insert_new(USERS, &user.id, user)?;
        let mut index = self.txn.open_table(USER_ADDRESSES)?;
        index.insert(user.wallet_address.as_str(), user.id.as_str())?;
        Ok(())
    }

    pub fn set_user_role(&self, user_id: &str, role: UserRole) -> LedgerDbResult<UserRecord> {
        let mut user: UserRecord = self
            .get_json(USERS, user_id)?
            .ok_or_else(|| LedgerDbError::NotFound(format!("user {user_id}")))?;
        user.role = role;
        user.updated_at = chrono::Utc::now();
        self.put_json(USERS, user_id, &user)?;
        Ok(user)
    }

    // ---- ngos -----------------------------------------------------------------

    pub fn ngo_by_address(&self, wallet_address: &str) -> LedgerDbResult<Option<NgoRecord>> {
        self.get_json(NGOS, wallet_address)
    }

    /// Insert or update an NGO keyed by wallet address. An existing record
    /// keeps its ID.
    pub fn upsert_ngo(&self, mut ngo: NgoRecord) -> LedgerDbResult<NgoRecord> {
        if let Some(existing) = self.ngo_by_address(&ngo.wallet_address)? {
            ngo.id = existing.id;
        }
        self.put_json(NGOS, &ngo.wallet_address.clone(), &ngo)?;
        Ok(ngo)
    }

    // ---- balances -------------------------------------------------------------

    pub fn balance(&self, user_id: &str, token: &str) -> LedgerDbResult<i64> {
        let table = self.txn.open_table(BALANCES)?;
        let key = balance_key(user_id, token);
        let balance = table.get(key.as_str())?.map(|v| v.value()).unwrap_or(0);
        Ok(balance)
    }

    /// Add to or subtract from a user's token balance. Returns the new balance.
    ///
    /// Subtracting more than the available balance fails without writing.
    pub fn update_wallet_balance(
        &self,
        user_id: &str,
        amount_micro: u64,
        operation: BalanceOperation,
        token: &str,
    ) -> LedgerDbResult<i64> {
        let current = self.balance(user_id, token)?;
        let amount = i64::try_from(amount_micro)
            .map_err(|_| LedgerDbError::Corrupt(format!("amount {amount_micro} out of range")))?;

        let updated = match operation {
            BalanceOperation::Add => current
                .checked_add(amount)
                .ok_or_else(|| LedgerDbError::Corrupt("balance overflow".to_string()))?,
            BalanceOperation::Subtract => {
                if current < amount {
                    return Err(LedgerDbError::InsufficientBalance {
                        user_id: user_id.to_string(),
                        token: token.to_string(),
                        available: current,
                        requested: amount_micro,
                    });
                }
                current - amount
            }
        };

        let mut table = self.txn.open_table(BALANCES)?;
        let key = balance_key(user_id, token);
        table.insert(key.as_str(), updated)?;
        Ok(updated)
    }

    // ---- mobile money ---------------------------------------------------------

    /// Move funds between a user's wallet and a phone wallet.
    ///
    /// A send debits the user's balance in `currency` and counts against the
    /// daily limit; it stays `processing` until the provider confirms. A
    /// receive credits the balance and completes immediately. Returns the
    /// stored transaction and the new balance.
    pub fn process_mobile_transaction(
        &self,
        transfer: &MobileTransfer,
    ) -> LedgerDbResult<(MobileTransaction, i64)> {
        if self.get_user(&transfer.user_id)?.is_none() {
            return Err(LedgerDbError::NotFound(format!("user {}", transfer.user_id)));
        }

        let now = chrono::Utc::now();
        let wallet_key = balance_key(&transfer.user_id, &transfer.currency);
        let mut wallet: MobileWallet = self
            .get_json(MOBILE_WALLETS, &wallet_key)?
            .unwrap_or_else(|| MobileWallet::new(&transfer.user_id, &transfer.currency));
        wallet.roll_over(now.date_naive());

        let (balance, status, completed_at, recipient) = match transfer.transaction_type {
            MobileTransactionType::Send => {
                let balance = self.update_wallet_balance(
                    &transfer.user_id,
                    transfer.amount_micro,
                    BalanceOperation::Subtract,
                    &transfer.currency,
                )?;
                let spent = wallet.daily_spent_micro.saturating_add(transfer.amount_micro);
                if spent > wallet.daily_limit_micro {
                    return Err(LedgerDbError::LimitExceeded {
                        limit: wallet.daily_limit_micro,
                        spent: wallet.daily_spent_micro,
                        requested: transfer.amount_micro,
                    });
                }
                wallet.daily_spent_micro = spent;
                (balance, LedgerStatus::Processing, None, transfer.phone_number.clone())
            }
            MobileTransactionType::Receive => {
                let balance = self.update_wallet_balance(
                    &transfer.user_id,
                    transfer.amount_micro,
                    BalanceOperation::Add,
                    &transfer.currency,
                )?;
                (balance, LedgerStatus::Completed, Some(now), transfer.user_id.clone())
            }
        };
        wallet.updated_at = now;
        self.put_json(MOBILE_WALLETS, &wallet_key, &wallet)?;

        let tx = MobileTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: transfer.user_id.clone(),
            transaction_type: transfer.transaction_type,
            phone_number: transfer.phone_number.clone(),
            amount_micro: transfer.amount_micro,
            amount: format_micro_unsigned(transfer.amount_micro),
            currency: transfer.currency.clone(),
            reference: transfer.reference.clone().unwrap_or_default(),
            sender: transfer.sender.clone(),
            recipient,
            provider: transfer.provider.clone(),
            status,
            external_transaction_id: transfer.external_transaction_id.clone(),
            created_at: now,
            completed_at,
        };
        self.insert_new(MOBILE_TRANSACTIONS, &tx.id, &tx)?;
        Ok((tx, balance))
    }

    // ---- blockchain cards -----------------------------------------------------

    /// Mirror a card's on-chain state and log what changed.
    ///
    /// A card ID stays bound to the address that first synced it.
    pub fn sync_blockchain_card(&self, sync: &CardSync) -> LedgerDbResult<CardSyncOutcome> {
        let existing: Option<BlockchainCard> = self.get_json(BLOCKCHAIN_CARDS, &sync.card_id)?;
        if let Some(card) = &existing {
            if card.user_address != sync.user_address {
                return Err(LedgerDbError::Conflict(format!(
                    "card {} belongs to another address",
                    sync.card_id
                )));
            }
        }

        let now = chrono::Utc::now();
        let user_id = self.user_by_address(&sync.user_address)?.map(|u| u.id);
        let previous = existing.as_ref().map(|c| c.balance_micro);
        let action = CardAction::for_sync(previous, sync.balance_micro);
        let blockchain_data = serde_json::json!({
            "source": "algorand_blockchain",
            "transactionHash": sync.transaction_hash,
            "blockNumber": sync.block_number,
            "syncTimestamp": now,
            "metadata": sync.metadata,
        });

        let card = BlockchainCard {
            id: sync.card_id.clone(),
            user_address: sync.user_address.clone(),
            user_id,
            currency: sync.currency.clone(),
            balance_micro: sync.balance_micro,
            balance: format_micro_unsigned(sync.balance_micro),
            region: sync.region.clone(),
            is_active: sync.is_active,
            blockchain_data,
            created_at: existing.as_ref().map_or(now, |c| c.created_at),
            last_synced_at: now,
            updated_at: now,
        };
        self.put_json(BLOCKCHAIN_CARDS, &card.id, &card)?;

        let mut activity = CardActivity::new(
            &card.id,
            action,
            previous.map_or(sync.balance_micro, |p| p.abs_diff(sync.balance_micro)),
        );
        activity.previous_balance_micro = previous;
        activity.new_balance_micro = Some(sync.balance_micro);
        activity.source = ActivitySource::Blockchain;
        activity.transaction_hash = sync.transaction_hash.clone();
        activity.block_number = sync.block_number;
        activity.metadata = sync.metadata.clone();
        activity.created_at = now;
        let activity_seq = self.log_card_activity(&activity)?;

        Ok(CardSyncOutcome {
            card,
            card_created: previous.is_none(),
            balance_changed: previous != Some(sync.balance_micro),
            previous_balance_micro: previous,
            action,
            activity_seq,
        })
    }

    /// Append an activity entry for an existing card. Returns its sequence.
    pub fn log_card_activity(&self, activity: &CardActivity) -> LedgerDbResult<u64> {
        if self
            .get_json::<serde_json::Value>(BLOCKCHAIN_CARDS, &activity.card_id)?
            .is_none()
        {
            return Err(LedgerDbError::NotFound(format!(
                "blockchain card {}",
                activity.card_id
            )));
        }

        let mut table = self.txn.open_table(CARD_ACTIVITY)?;
        let next = match table.last()? {
            Some((key, _)) => key.value() + 1,
            None => 1,
        };
        let mut stored = activity.clone();
        stored.seq = next;
        let bytes = serde_json::to_vec(&stored)?;
        table.insert(next, bytes.as_slice())?;
        Ok(next)
    }

    // ---- ledger rows ----------------------------------------------------------

    pub fn insert_token_transaction(&self, tx: &TokenTransaction) -> LedgerDbResult<()> {
        self.insert_new(TOKEN_TRANSACTIONS, &tx.id, tx)
    }

    pub fn insert_remittance(&self, log: &RemittanceLog) -> LedgerDbResult<()> {
        self.insert_new(REMITTANCE_LOGS, &log.id, log)
    }

    // ---- relief ---------------------------------------------------------------

    pub fn get_case(&self, case_id: &str) -> LedgerDbResult<Option<EmergencyCase>> {
        self.get_json(EMERGENCY_CASES, case_id)
    }

    pub fn insert_case(&self, case: &EmergencyCase) -> LedgerDbResult<()> {
        self.insert_new(EMERGENCY_CASES, &case.id, case)
    }

    pub fn update_case(&self, case: &EmergencyCase) -> LedgerDbResult<()> {
        if self.get_case(&case.id)?.is_none() {
            return Err(LedgerDbError::NotFound(format!("emergency case {}", case.id)));
        }
        self.put_json(EMERGENCY_CASES, &case.id, case)
    }

    pub fn insert_badge(&self, badge: &CrisisBadge) -> LedgerDbResult<()> {
        self.insert_new(CRISIS_BADGES, &badge.id, badge)
    }

    // ---- cards & settings -----------------------------------------------------

    pub fn insert_card(&self, card: &VirtualCard) -> LedgerDbResult<()> {
        self.insert_new(VIRTUAL_CARDS, &card.id, card)
    }

    pub fn upsert_setting(&self, setting: &AdminSetting) -> LedgerDbResult<()> {
        self.put_json(ADMIN_SETTINGS, &setting.setting_key, setting)
    }

    // ---- audit & idempotency --------------------------------------------------

    /// Append an audit entry, assigning the next sequence number.
    pub fn append_event(&self, entry: &EventLogEntry) -> LedgerDbResult<u64> {
        let mut table = self.txn.open_table(EVENTS)?;
        let next = match table.last()? {
            Some((key, _)) => key.value() + 1,
            None => 1,
        };

        let mut stored = entry.clone();
        stored.seq = next;
        let bytes = serde_json::to_vec(&stored)?;
        table.insert(next, bytes.as_slice())?;
        Ok(next)
    }

    pub fn is_processed(&self, key: &str) -> LedgerDbResult<bool> {
        let table = self.txn.open_table(PROCESSED_EVENTS)?;
        let found = table.get(key)?.is_some();
        Ok(found)
    }

    pub fn mark_processed(&self, key: &str) -> LedgerDbResult<()> {
        let mut table = self.txn.open_table(PROCESSED_EVENTS)?;
        let now = chrono::Utc::now().to_rfc3339();
        table.insert(key, now.as_str())?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
