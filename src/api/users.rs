// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User registration and off-chain wallet views.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    algorand::format_micro,
    error::ApiError,
    models::{
        AlgorandAddress, RegisterUserRequest, TokenBalance, TransactionListResponse,
        WalletResponse,
    },
    state::AppState,
    storage::{audit::USER_REGISTERED, EventLogEntry, UserRecord},
};

/// Register a user by Algorand wallet address.
///
/// Chain events are matched to users by this address, so it must be unique.
#[utoipa::path(
    post,
    path = "/api/users",
    tag = "Users",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "User registered", body = UserRecord),
        (status = 400, description = "Invalid wallet address"),
        (status = 409, description = "Wallet address already registered")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    Json(request): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<UserRecord>), ApiError> {
    let address = AlgorandAddress::parse(&request.wallet_address).map_err(ApiError::bad_request)?;

    let mut user = UserRecord::new(address.into(), request.role.unwrap_or_default());
    user.email = request.email.filter(|e| !e.trim().is_empty());
    user.full_name = request.full_name.filter(|n| !n.trim().is_empty());

    state.ledger.write(|w| -> Result<(), ApiError> {
        w.insert_user(&user)?;
        let entry = EventLogEntry::new(USER_REGISTERED)
            .with_user(user.id.clone())
            .with_data(serde_json::json!({
                "wallet_address": user.wallet_address,
                "role": user.role,
            }));
        w.append_event(&entry)?;
        Ok(())
    })?;

    tracing::info!(user_id = %user.id, role = ?user.role, "User registered");

    Ok((StatusCode::CREATED, Json(user)))
}

/// Token balances and virtual cards for a user.
#[utoipa::path(
    get,
    path = "/api/users/{user_id}/wallet",
    tag = "Users",
    params(("user_id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "User wallet", body = WalletResponse),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_wallet(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<WalletResponse>, ApiError> {
    let user = state
        .ledger
        .get_user(&user_id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let balances = state
        .ledger
        .balances_for_user(&user.id)?
        .into_iter()
        .map(|(token, balance_micro)| TokenBalance {
            token,
            balance_micro,
            balance: format_micro(balance_micro),
        })
        .collect();

    Ok(Json(WalletResponse {
        virtual_cards: state.ledger.cards_for_user(&user.id)?,
        user_id: user.id,
        wallet_address: user.wallet_address,
        balances,
    }))
}

/// Ledger transactions where the user is sender or recipient, newest first.
#[utoipa::path(
    get,
    path = "/api/users/{user_id}/transactions",
    tag = "Users",
    params(("user_id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "Transactions", body = TransactionListResponse),
        (status = 404, description = "User not found")
    )
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<TransactionListResponse>, ApiError> {
    if state.ledger.get_user(&user_id)?.is_none() {
        return Err(ApiError::not_found("User not found"));
    }
    Ok(Json(TransactionListResponse {
        transactions: state.ledger.transactions_for_user(&user_id)?,
    }))
}
