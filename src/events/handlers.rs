// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-event ledger handlers.
//!
//! Each handler resolves wallet addresses to users (exact match), then
//! writes its rows through the [`LedgerWrite`] it is given. Handlers never
//! commit; the registry owns the unit of work.

use chrono::{Duration, Months, Utc};
use serde_json::{json, Value};

use crate::algorand::{format_micro, format_micro_unsigned, micro_to_decimal};
use crate::storage::{
    AdminSetting, BalanceOperation, CardStatus, CaseStatus, CrisisBadge, LedgerStatus, LedgerWrite,
    NgoRecord, RemittanceLog, TokenTransaction, TransactionType, UserRecord, UserRole, VirtualCard,
    CHAIN_CURRENCY, LAST_ROUND_SETTING, VIRTUAL_TOKEN,
};

use super::*;

/// How long an issued crisis badge stays valid.
const BADGE_VALIDITY_DAYS: i64 = 30;

/// Badge type for NGO-issued crisis badges.
const EMERGENCY_BADGE: &str = "emergency";

/// Provider recorded on remittance rows.
const DISBURSAL_PROVIDER: &str = "algorand";

/// Card expiry printed on the card.
const CARD_EXPIRY_MONTHS: u32 = 24;

/// How long a virtual card stays usable.
const CARD_ACTIVE_DAYS: i64 = 30;

/// What a handler wrote, for the audit trail and the sync response.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerOutput {
    /// User the event concerns.
    pub user_id: Option<String>,
    /// Handler-specific result body.
    pub result: Value,
}

impl HandlerOutput {
    fn for_user(user_id: &str, result: Value) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            result,
        }
    }
}

/// Applies one kind of event to the ledger.
pub trait EventHandler: Send + Sync + 'static {
    type Payload: EventPayload;

    fn handle(
        &self,
        ledger: &LedgerWrite<'_>,
        payload: &Self::Payload,
        ctx: &EventContext,
    ) -> Result<HandlerOutput, ReconcileError>;
}

fn require_user(ledger: &LedgerWrite<'_>, address: &str) -> Result<UserRecord, ReconcileError> {
    ledger
        .user_by_address(address)?
        .ok_or_else(|| ReconcileError::user_not_found(address))
}

/// Address of the privileged actor: the transaction sender, else the address
/// carried in the payload.
fn actor_address<'a>(
    ctx: &'a EventContext,
    fallback: Option<&'a str>,
) -> Result<&'a str, ReconcileError> {
    ctx.sender
        .as_deref()
        .or(fallback)
        .ok_or_else(|| ReconcileError::InvalidEvent("transaction sender is required".to_string()))
}

fn require_ngo(
    ledger: &LedgerWrite<'_>,
    ctx: &EventContext,
    fallback: Option<&str>,
) -> Result<NgoRecord, ReconcileError> {
    let address = actor_address(ctx, fallback)?;
    ledger
        .ngo_by_address(address)?
        .ok_or_else(|| ReconcileError::ngo_not_found(address))
}

// =============================================================================
// FIAT_DEPOSIT
// =============================================================================

/// Credits the virtual token after an on-chain fiat deposit.
pub struct FiatDepositHandler;

impl EventHandler for FiatDepositHandler {
    type Payload = FiatDeposit;

    fn handle(
        &self,
        ledger: &LedgerWrite<'_>,
        p: &FiatDeposit,
        ctx: &EventContext,
    ) -> Result<HandlerOutput, ReconcileError> {
        let user = require_user(ledger, &p.user_address)?;

        let balance = ledger.update_wallet_balance(
            &user.id,
            p.amount_micro,
            BalanceOperation::Add,
            VIRTUAL_TOKEN,
        )?;

        let tx = TokenTransaction::completed(
            TransactionType::Deposit,
            None,
            Some(user.id.clone()),
            p.amount_micro,
            format!("FIAT_{}", p.stripe_payment_id),
            ctx.tx_id.clone(),
            json!({
                "stripe_payment_id": p.stripe_payment_id,
                "source": "algorand_contract",
                "timestamp": p.timestamp,
            }),
        );
        ledger.insert_token_transaction(&tx)?;

        tracing::info!(
            user_id = %user.id,
            amount = %tx.amount,
            tx_id = %ctx.tx_id,
            "Fiat deposit credited"
        );

        Ok(HandlerOutput::for_user(
            &user.id,
            json!({
                "user_id": user.id,
                "amount": micro_to_decimal(p.amount_micro),
                "balance": format_micro(balance),
                "transaction_id": tx.id,
            }),
        ))
    }
}

// =============================================================================
// NGO_AUTHORIZED
// =============================================================================

/// Registers (or refreshes) an NGO and promotes its user.
pub struct NgoAuthorizedHandler;

impl EventHandler for NgoAuthorizedHandler {
    type Payload = NgoAuthorized;

    fn handle(
        &self,
        ledger: &LedgerWrite<'_>,
        p: &NgoAuthorized,
        _ctx: &EventContext,
    ) -> Result<HandlerOutput, ReconcileError> {
        let user = require_user(ledger, &p.user_address)?;
        let now = Utc::now();

        let ngo = ledger.upsert_ngo(NgoRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            wallet_address: p.user_address.clone(),
            rating: p.rating,
            region: p.region.clone(),
            is_active: true,
            approved_at: now,
            updated_at: now,
        })?;
        ledger.set_user_role(&user.id, UserRole::Ngo)?;

        tracing::info!(ngo_id = %ngo.id, user_id = %user.id, region = %ngo.region, "NGO authorized");

        Ok(HandlerOutput::for_user(
            &user.id,
            json!({
                "ngo_id": ngo.id,
                "user_id": user.id,
                "rating": ngo.rating,
                "region": ngo.region,
            }),
        ))
    }
}

// =============================================================================
// CRISIS_BADGE_ISSUED
// =============================================================================

/// Records a badge issued by an NGO and approves the linked case.
pub struct CrisisBadgeHandler;

impl EventHandler for CrisisBadgeHandler {
    type Payload = CrisisBadgeIssued;

    fn handle(
        &self,
        ledger: &LedgerWrite<'_>,
        p: &CrisisBadgeIssued,
        ctx: &EventContext,
    ) -> Result<HandlerOutput, ReconcileError> {
        let user = require_user(ledger, &p.user_address)?;
        let ngo = require_ngo(ledger, ctx, p.ngo_address.as_deref())?;
        let now = Utc::now();

        let badge = CrisisBadge {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            case_id: p.case_id.clone(),
            issued_by_ngo_id: ngo.id.clone(),
            badge_type: EMERGENCY_BADGE.to_string(),
            crisis_type: p.crisis_type.clone(),
            severity_level: p.severity,
            valid_until: now + Duration::days(BADGE_VALIDITY_DAYS),
            is_active: true,
            algorand_tx_id: ctx.tx_id.clone(),
            metadata: json!({
                "issued_via": "algorand_contract",
                "ngo_address": p.ngo_address,
                "timestamp": p.timestamp,
            }),
            issued_at: now,
        };
        ledger.insert_badge(&badge)?;

        let case_status = match ledger.get_case(&p.case_id)? {
            Some(mut case) if matches!(case.status, CaseStatus::Pending | CaseStatus::Approved) => {
                case.status = CaseStatus::Approved;
                case.assigned_ngo_id = Some(ngo.id.clone());
                case.updated_at = now;
                ledger.update_case(&case)?;
                Some(case.status)
            }
            Some(case) => {
                tracing::warn!(
                    case_id = %case.id,
                    status = ?case.status,
                    "Badge issued for a case that can no longer be approved"
                );
                Some(case.status)
            }
            None => {
                tracing::warn!(case_id = %p.case_id, "Badge issued for unknown emergency case");
                None
            }
        };

        Ok(HandlerOutput::for_user(
            &user.id,
            json!({
                "badge_id": badge.id,
                "user_id": user.id,
                "ngo_id": ngo.id,
                "case_id": p.case_id,
                "case_status": case_status,
                "valid_until": badge.valid_until,
            }),
        ))
    }
}

// =============================================================================
// EMERGENCY_DISBURSAL
// =============================================================================

/// Logs an NGO payout and completes the linked case.
pub struct EmergencyDisbursalHandler;

impl EventHandler for EmergencyDisbursalHandler {
    type Payload = EmergencyDisbursal;

    fn handle(
        &self,
        ledger: &LedgerWrite<'_>,
        p: &EmergencyDisbursal,
        ctx: &EventContext,
    ) -> Result<HandlerOutput, ReconcileError> {
        let user = require_user(ledger, &p.user_address)?;
        let ngo = require_ngo(ledger, ctx, p.ngo_address.as_deref())?;
        let now = Utc::now();

        let remittance = RemittanceLog {
            id: uuid::Uuid::new_v4().to_string(),
            case_id: p.case_id.clone(),
            ngo_id: ngo.id.clone(),
            recipient_user_id: user.id.clone(),
            recipient_wallet: p.user_address.clone(),
            amount_micro: p.amount_micro,
            amount: format_micro_unsigned(p.amount_micro),
            currency: CHAIN_CURRENCY.to_string(),
            status: LedgerStatus::Completed,
            algorand_tx_id: ctx.tx_id.clone(),
            provider: DISBURSAL_PROVIDER.to_string(),
            metadata: json!({
                "disbursed_via": "algorand_contract",
                "timestamp": p.timestamp,
            }),
            created_at: now,
        };
        ledger.insert_remittance(&remittance)?;

        let case_status = match ledger.get_case(&p.case_id)? {
            Some(case) if case.status == CaseStatus::Rejected => {
                tracing::warn!(case_id = %case.id, "Disbursal recorded against a rejected case");
                Some(case.status)
            }
            Some(mut case) => {
                case.status = CaseStatus::Completed;
                case.disbursed_amount_micro = Some(p.amount_micro);
                case.disbursed_at = Some(now);
                case.updated_at = now;
                ledger.update_case(&case)?;
                Some(case.status)
            }
            None => {
                tracing::warn!(case_id = %p.case_id, "Disbursal for unknown emergency case");
                None
            }
        };

        tracing::info!(
            case_id = %p.case_id,
            ngo_id = %ngo.id,
            amount = %remittance.amount,
            "Emergency disbursal recorded"
        );

        Ok(HandlerOutput::for_user(
            &user.id,
            json!({
                "remittance_id": remittance.id,
                "case_id": p.case_id,
                "amount": micro_to_decimal(p.amount_micro),
                "currency": remittance.currency,
                "case_status": case_status,
            }),
        ))
    }
}

// =============================================================================
// TOKEN_TRANSFER
// =============================================================================

/// Moves virtual tokens between two users.
pub struct TokenTransferHandler;

impl EventHandler for TokenTransferHandler {
    type Payload = TokenTransfer;

    fn handle(
        &self,
        ledger: &LedgerWrite<'_>,
        p: &TokenTransfer,
        ctx: &EventContext,
    ) -> Result<HandlerOutput, ReconcileError> {
        let sender = require_user(ledger, &p.from_address)?;
        let recipient = require_user(ledger, &p.to_address)?;

        ledger.update_wallet_balance(
            &sender.id,
            p.amount_micro,
            BalanceOperation::Subtract,
            VIRTUAL_TOKEN,
        )?;
        ledger.update_wallet_balance(
            &recipient.id,
            p.amount_micro,
            BalanceOperation::Add,
            VIRTUAL_TOKEN,
        )?;

        let tx = TokenTransaction::completed(
            TransactionType::Transfer,
            Some(sender.id.clone()),
            Some(recipient.id.clone()),
            p.amount_micro,
            p.reference.clone(),
            ctx.tx_id.clone(),
            json!({
                "transferred_via": "algorand_contract",
                "timestamp": p.timestamp,
            }),
        );
        ledger.insert_token_transaction(&tx)?;

        Ok(HandlerOutput::for_user(
            &sender.id,
            json!({
                "transaction_id": tx.id,
                "from_user_id": sender.id,
                "to_user_id": recipient.id,
                "amount": micro_to_decimal(p.amount_micro),
            }),
        ))
    }
}

// =============================================================================
// VIRTUAL_CARD_CREATED
// =============================================================================

/// Issues a virtual card with a generated number.
pub struct VirtualCardHandler;

/// Card number (`NNNN-NNNN-NNNN-NNNN`) and CVV from fresh random bits.
fn generate_card_details() -> (String, String) {
    let entropy = uuid::Uuid::new_v4().as_u128();
    let groups: Vec<String> = (0..4)
        .map(|i| {
            let chunk = (entropy >> (i * 16)) as u16;
            format!("{}", 1000 + u32::from(chunk) % 9000)
        })
        .collect();
    let cvv = 100 + ((entropy >> 80) as u16 as u32) % 900;
    (groups.join("-"), cvv.to_string())
}

impl EventHandler for VirtualCardHandler {
    type Payload = VirtualCardCreated;

    fn handle(
        &self,
        ledger: &LedgerWrite<'_>,
        p: &VirtualCardCreated,
        ctx: &EventContext,
    ) -> Result<HandlerOutput, ReconcileError> {
        let user = require_user(ledger, &p.user_address)?;
        let now = Utc::now();

        let printed_expiry = now
            .checked_add_months(Months::new(CARD_EXPIRY_MONTHS))
            .ok_or_else(|| ReconcileError::InvalidEvent("card expiry out of range".to_string()))?;
        let (card_number, cvv) = generate_card_details();

        let card = VirtualCard {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            card_number,
            cvv,
            expiry: printed_expiry.format("%m/%y").to_string(),
            card_type: p.card_type.clone(),
            status: CardStatus::Active,
            spending_limit_micro: p.card_limit_micro,
            current_balance_micro: p.card_limit_micro,
            currency: CHAIN_CURRENCY.to_string(),
            expires_at: now + Duration::days(CARD_ACTIVE_DAYS),
            algorand_tx_id: ctx.tx_id.clone(),
            metadata: json!({
                "created_via": "algorand_contract",
                "timestamp": p.timestamp,
            }),
            created_at: now,
        };
        ledger.insert_card(&card)?;

        tracing::info!(card_id = %card.id, user_id = %user.id, "Virtual card created");

        Ok(HandlerOutput::for_user(
            &user.id,
            json!({
                "card_id": card.id,
                "user_id": user.id,
                "card_type": card.card_type,
                "spending_limit": micro_to_decimal(card.spending_limit_micro),
                "expiry": card.expiry,
            }),
        ))
    }
}

// =============================================================================
// SYSTEM_UPDATED
// =============================================================================

/// Writes an admin setting changed on-chain.
pub struct SystemUpdateHandler;

impl EventHandler for SystemUpdateHandler {
    type Payload = SystemUpdated;

    fn handle(
        &self,
        ledger: &LedgerWrite<'_>,
        p: &SystemUpdated,
        ctx: &EventContext,
    ) -> Result<HandlerOutput, ReconcileError> {
        if p.setting_key == LAST_ROUND_SETTING {
            return Err(ReconcileError::ReservedSetting(p.setting_key.clone()));
        }

        let admin_address = actor_address(ctx, None)?;
        let admin = require_user(ledger, admin_address)?;

        let value = json!({
            "value": micro_to_decimal(p.setting_value_micro),
            "updated_at": p.timestamp,
        });
        let mut setting = AdminSetting::new(p.setting_key.clone(), value.to_string());
        setting.description = Some(p.reason.clone());
        setting.updated_by = Some(admin.id.clone());
        ledger.upsert_setting(&setting)?;

        tracing::info!(key = %setting.setting_key, admin_id = %admin.id, "System setting updated");

        Ok(HandlerOutput::for_user(
            &admin.id,
            json!({
                "setting_key": setting.setting_key,
                "value": micro_to_decimal(p.setting_value_micro),
                "updated_by": admin.id,
            }),
        ))
    }
}
