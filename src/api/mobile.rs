// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Mobile money transfers between a user's wallet and a phone wallet.
//!
//! Balances are kept per currency in the shared balance table. Sends count
//! against a daily limit that resets at UTC midnight.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;

use crate::{
    algorand::format_micro,
    error::ApiError,
    models::{
        MobileMoneyRequest, MobileMoneyResponse, MobileTransactionListResponse,
        MobileTransactionQuery, MobileWalletQuery, MobileWalletResponse, PhoneNumber,
    },
    state::AppState,
    storage::{
        audit::{MOBILE_MONEY_RECEIVE, MOBILE_MONEY_SEND},
        EventLogEntry, MobileTransactionType, MobileTransfer, DEFAULT_MOBILE_CURRENCY,
        MOBILE_CURRENCIES,
    },
};

/// Smallest transfer (0.01).
const MIN_AMOUNT_MICRO: u64 = 10_000;

const MAX_REFERENCE_LEN: usize = 100;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

/// Send money from the user's wallet to a phone wallet.
#[utoipa::path(
    post,
    path = "/api/mobile-money/send",
    tag = "Mobile Money",
    request_body = MobileMoneyRequest,
    responses(
        (status = 200, description = "Transfer accepted", body = MobileMoneyResponse),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "User not found"),
        (status = 422, description = "Insufficient balance or daily limit exceeded")
    )
)]
pub async fn send_mobile_money(
    State(state): State<AppState>,
    Json(request): Json<MobileMoneyRequest>,
) -> Result<Json<MobileMoneyResponse>, ApiError> {
    transfer(&state, request, MobileTransactionType::Send).map(Json)
}

/// Credit the user's wallet from a phone wallet.
#[utoipa::path(
    post,
    path = "/api/mobile-money/receive",
    tag = "Mobile Money",
    request_body = MobileMoneyRequest,
    responses(
        (status = 200, description = "Transfer completed", body = MobileMoneyResponse),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "User not found")
    )
)]
pub async fn receive_mobile_money(
    State(state): State<AppState>,
    Json(request): Json<MobileMoneyRequest>,
) -> Result<Json<MobileMoneyResponse>, ApiError> {
    transfer(&state, request, MobileTransactionType::Receive).map(Json)
}

fn transfer(
    state: &AppState,
    request: MobileMoneyRequest,
    kind: MobileTransactionType,
) -> Result<MobileMoneyResponse, ApiError> {
    if uuid::Uuid::parse_str(&request.user_id).is_err() {
        return Err(ApiError::bad_request("Valid user ID is required"));
    }
    let phone = PhoneNumber::parse(&request.phone_number).map_err(ApiError::bad_request)?;
    if request.amount_micro < MIN_AMOUNT_MICRO {
        return Err(ApiError::bad_request("Amount must be at least 0.01"));
    }
    let currency = request
        .currency
        .unwrap_or_else(|| DEFAULT_MOBILE_CURRENCY.to_string());
    if !MOBILE_CURRENCIES.contains(&currency.as_str()) {
        return Err(ApiError::bad_request(format!("Invalid currency: {currency}")));
    }
    let reference = request.reference.filter(|r| !r.trim().is_empty());
    if reference.as_ref().is_some_and(|r| r.chars().count() > MAX_REFERENCE_LEN) {
        return Err(ApiError::bad_request("Reference too long"));
    }
    let sender = request.sender.filter(|s| !s.trim().is_empty());
    if kind == MobileTransactionType::Receive && sender.is_none() {
        return Err(ApiError::bad_request("Sender information is required"));
    }

    if state.ledger.get_user(&request.user_id)?.is_none() {
        return Err(ApiError::not_found("User not found"));
    }

    let provider = phone.provider();
    let now = Utc::now();
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    let params = MobileTransfer {
        user_id: request.user_id,
        transaction_type: kind,
        phone_number: phone.as_str().to_string(),
        amount_micro: request.amount_micro,
        currency,
        reference: Some(reference.unwrap_or_else(|| format!("MM{}", now.timestamp_millis()))),
        sender,
        provider: provider.as_str().to_string(),
        external_transaction_id: format!(
            "{}_{}_{}",
            provider.as_str().to_uppercase(),
            now.timestamp_millis(),
            &nonce[..9]
        ),
    };

    let event_type = match kind {
        MobileTransactionType::Send => MOBILE_MONEY_SEND,
        MobileTransactionType::Receive => MOBILE_MONEY_RECEIVE,
    };
    let (transaction, balance) = state.ledger.write(|w| -> Result<_, ApiError> {
        let (tx, balance) = w.process_mobile_transaction(&params)?;
        let entry = EventLogEntry::new(event_type)
            .with_user(tx.user_id.clone())
            .with_data(serde_json::json!({
                "transaction_id": tx.id,
                "phone_number": tx.phone_number,
                "amount": tx.amount,
                "currency": tx.currency,
                "provider": tx.provider,
                "sender": tx.sender,
                "reference": tx.reference,
            }));
        w.append_event(&entry)?;
        Ok((tx, balance))
    })?;

    tracing::info!(
        transaction_id = %transaction.id,
        user_id = %transaction.user_id,
        kind = ?kind,
        provider = %transaction.provider,
        amount = %transaction.amount,
        "Mobile money transfer recorded"
    );

    Ok(MobileMoneyResponse {
        success: true,
        transaction,
        new_balance_micro: balance,
        new_balance: format_micro(balance),
    })
}

/// Mobile wallet limits and balance for one currency.
#[utoipa::path(
    get,
    path = "/api/mobile-money/wallet/{user_id}",
    tag = "Mobile Money",
    params(
        ("user_id" = String, Path, description = "User ID"),
        ("currency" = Option<String>, Query, description = "Currency code (default WST)")
    ),
    responses(
        (status = 200, description = "Mobile wallet", body = MobileWalletResponse),
        (status = 404, description = "Wallet not found")
    )
)]
pub async fn get_mobile_wallet(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<MobileWalletQuery>,
) -> Result<Json<MobileWalletResponse>, ApiError> {
    let currency = query
        .currency
        .unwrap_or_else(|| DEFAULT_MOBILE_CURRENCY.to_string());
    let mut wallet = state
        .ledger
        .mobile_wallet(&user_id, &currency)?
        .ok_or_else(|| ApiError::not_found("Wallet not found"))?;
    wallet.roll_over(Utc::now().date_naive());

    let balance_micro = state.ledger.balance(&user_id, &currency)?;
    Ok(Json(MobileWalletResponse {
        wallet,
        balance_micro,
        balance: format_micro(balance_micro),
    }))
}

/// Mobile money history for a user, newest first.
#[utoipa::path(
    get,
    path = "/api/mobile-money/transactions/{user_id}",
    tag = "Mobile Money",
    params(
        ("user_id" = String, Path, description = "User ID"),
        ("limit" = Option<usize>, Query, description = "Page size (default 20, max 100)"),
        ("offset" = Option<usize>, Query, description = "Rows to skip"),
        ("type" = Option<String>, Query, description = "SEND or RECEIVE"),
        ("status" = Option<String>, Query, description = "Transaction status")
    ),
    responses(
        (status = 200, description = "Transfers", body = MobileTransactionListResponse)
    )
)]
pub async fn list_mobile_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<MobileTransactionQuery>,
) -> Result<Json<MobileTransactionListResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = query.offset.unwrap_or(0);

    let transactions = state
        .ledger
        .mobile_transactions_for_user(&user_id)?
        .into_iter()
        .filter(|tx| query.transaction_type.is_none_or(|t| tx.transaction_type == t))
        .filter(|tx| query.status.is_none_or(|s| tx.status == s))
        .skip(offset)
        .take(limit)
        .collect();

    Ok(Json(MobileTransactionListResponse {
        transactions,
        limit,
        offset,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{register, test_state, ADDR_A};
    use crate::storage::{LedgerStatus, DEFAULT_DAILY_LIMIT_MICRO};
    use axum::http::StatusCode;

    fn request(user_id: &str, amount_micro: u64) -> MobileMoneyRequest {
        MobileMoneyRequest {
            user_id: user_id.to_string(),
            phone_number: "7712345".into(),
            amount_micro,
            currency: None,
            reference: None,
            sender: Some("Aunty Mele".into()),
        }
    }

    #[tokio::test]
    async fn receive_then_send_updates_balance_and_history() {
        let (state, _dir) = test_state();
        let user = register(&state, ADDR_A);

        let Json(received) = receive_mobile_money(State(state.clone()), Json(request(&user.id, 5_000_000)))
            .await
            .unwrap();
        assert_eq!(received.new_balance, "5.0");
        assert_eq!(received.transaction.status, LedgerStatus::Completed);
        assert_eq!(received.transaction.phone_number, "+6857712345");
        assert_eq!(received.transaction.provider, "Digicel");
        assert!(received.transaction.external_transaction_id.starts_with("DIGICEL_"));

        let Json(sent) = send_mobile_money(State(state.clone()), Json(request(&user.id, 2_000_000)))
            .await
            .unwrap();
        assert_eq!(sent.new_balance_micro, 3_000_000);
        assert_eq!(sent.transaction.status, LedgerStatus::Processing);

        let Json(wallet) = get_mobile_wallet(
            State(state.clone()),
            Path(user.id.clone()),
            Query(MobileWalletQuery::default()),
        )
        .await
        .unwrap();
        assert_eq!(wallet.balance, "3.0");
        assert_eq!(wallet.wallet.daily_spent_micro, 2_000_000);

        let Json(sends) = list_mobile_transactions(
            State(state.clone()),
            Path(user.id.clone()),
            Query(MobileTransactionQuery {
                transaction_type: Some(MobileTransactionType::Send),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(sends.transactions.len(), 1);
        assert_eq!(sends.transactions[0].id, sent.transaction.id);

        let events = state.ledger.recent_events(10).unwrap();
        assert_eq!(events[0].event_type, MOBILE_MONEY_SEND);
        assert_eq!(events[1].event_type, MOBILE_MONEY_RECEIVE);
    }

    #[tokio::test]
    async fn send_over_daily_limit_is_unprocessable() {
        let (state, _dir) = test_state();
        let user = register(&state, ADDR_A);
        let amount = DEFAULT_DAILY_LIMIT_MICRO + 1;
        receive_mobile_money(State(state.clone()), Json(request(&user.id, amount)))
            .await
            .unwrap();

        let err = send_mobile_money(State(state.clone()), Json(request(&user.id, amount)))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(state.ledger.balance(&user.id, "WST").unwrap(), amount as i64);
    }

    #[tokio::test]
    async fn send_without_funds_is_unprocessable() {
        let (state, _dir) = test_state();
        let user = register(&state, ADDR_A);

        let err = send_mobile_money(State(state), Json(request(&user.id, 20_000)))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn validation_failures_are_bad_requests() {
        let (state, _dir) = test_state();
        let user = register(&state, ADDR_A);

        let cases = [
            MobileMoneyRequest {
                user_id: "not-a-uuid".into(),
                ..request(&user.id, 20_000)
            },
            MobileMoneyRequest {
                phone_number: "call me".into(),
                ..request(&user.id, 20_000)
            },
            request(&user.id, 9_999),
            MobileMoneyRequest {
                currency: Some("EUR".into()),
                ..request(&user.id, 20_000)
            },
            MobileMoneyRequest {
                reference: Some("x".repeat(101)),
                ..request(&user.id, 20_000)
            },
        ];
        for case in cases {
            let err = send_mobile_money(State(state.clone()), Json(case))
                .await
                .unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST, "{}", err.message);
        }

        let no_sender = MobileMoneyRequest {
            sender: None,
            ..request(&user.id, 20_000)
        };
        let err = receive_mobile_money(State(state), Json(no_sender))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Sender information is required");
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let (state, _dir) = test_state();
        let ghost = uuid::Uuid::new_v4().to_string();

        let err = receive_mobile_money(State(state), Json(request(&ghost, 20_000)))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn wallet_is_missing_until_first_transfer() {
        let (state, _dir) = test_state();
        let user = register(&state, ADDR_A);

        let err = get_mobile_wallet(
            State(state),
            Path(user.id),
            Query(MobileWalletQuery::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
