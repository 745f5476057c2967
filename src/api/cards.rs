// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain card mirror.
//!
//! The relay posts each card's on-chain state here. Every sync appends one
//! activity entry classified by how the balance moved.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::ApiError,
    models::{
        AlgorandAddress, CardActivityQuery, CardActivityResponse, CardSyncRequest,
        CardSyncResponse, LogCardActivityRequest, UserCardsQuery, UserCardsResponse,
    },
    state::AppState,
    storage::{
        audit::ALGORAND_CARD_SYNC, BlockchainCard, CardActivity, CardSync, EventLogEntry,
        LedgerDbError, CARD_CURRENCIES, CARD_REGIONS, CHAIN_CURRENCY, DEFAULT_CARD_REGION,
    },
};

const MAX_CARD_ID_LEN: usize = 100;
const MIN_TX_HASH_LEN: usize = 10;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

/// Mirror a card's on-chain balance and status.
#[utoipa::path(
    post,
    path = "/api/algorand/card-sync",
    tag = "Algorand",
    request_body = CardSyncRequest,
    responses(
        (status = 200, description = "Card synced", body = CardSyncResponse),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Card belongs to another address")
    )
)]
pub async fn sync_card(
    State(state): State<AppState>,
    Json(request): Json<CardSyncRequest>,
) -> Result<Json<CardSyncResponse>, ApiError> {
    let card_id = request.card_id.trim();
    if card_id.is_empty() || card_id.chars().count() > MAX_CARD_ID_LEN {
        return Err(ApiError::bad_request(format!(
            "card_id must be 1 to {MAX_CARD_ID_LEN} characters"
        )));
    }
    let address = AlgorandAddress::parse(&request.user_address)
        .map_err(|_| ApiError::bad_request("Invalid Algorand address format"))?;
    let currency = request.currency.unwrap_or_else(|| CHAIN_CURRENCY.to_string());
    if !CARD_CURRENCIES.contains(&currency.as_str()) {
        return Err(ApiError::bad_request(format!("Invalid currency: {currency}")));
    }
    let region = request.region.unwrap_or_else(|| DEFAULT_CARD_REGION.to_string());
    if !CARD_REGIONS.contains(&region.as_str()) {
        return Err(ApiError::bad_request(format!("Invalid region: {region}")));
    }
    if request
        .transaction_hash
        .as_ref()
        .is_some_and(|h| h.len() < MIN_TX_HASH_LEN)
    {
        return Err(ApiError::bad_request("Invalid transaction hash"));
    }

    let sync = CardSync {
        card_id: card_id.to_string(),
        user_address: address.into(),
        balance_micro: request.balance_micro,
        currency,
        region,
        is_active: request.is_active.unwrap_or(true),
        transaction_hash: request.transaction_hash,
        block_number: request.block_number,
        metadata: request.metadata.unwrap_or(serde_json::Value::Null),
    };

    let outcome = state.ledger.write(|w| -> Result<_, ApiError> {
        let outcome = w.sync_blockchain_card(&sync)?;
        let mut entry = EventLogEntry::new(ALGORAND_CARD_SYNC).with_data(serde_json::json!({
            "card_id": outcome.card.id,
            "user_address": outcome.card.user_address,
            "balance": outcome.card.balance,
            "currency": outcome.card.currency,
            "action": outcome.action,
            "card_created": outcome.card_created,
        }));
        if let Some(user_id) = &outcome.card.user_id {
            entry = entry.with_user(user_id.clone());
        }
        if let Some(hash) = &sync.transaction_hash {
            entry = entry.with_chain(hash.clone(), sync.block_number);
        }
        w.append_event(&entry)?;
        Ok(outcome)
    })?;

    tracing::info!(
        card_id = %outcome.card.id,
        action = ?outcome.action,
        balance = %outcome.card.balance,
        "Blockchain card synced"
    );

    Ok(Json(CardSyncResponse {
        success: true,
        card: outcome.card,
        card_created: outcome.card_created,
        balance_changed: outcome.balance_changed,
        previous_balance_micro: outcome.previous_balance_micro,
        action: outcome.action,
        activity_seq: outcome.activity_seq,
    }))
}

#[utoipa::path(
    get,
    path = "/api/algorand/card/{card_id}",
    tag = "Algorand",
    params(("card_id" = String, Path, description = "Card ID")),
    responses(
        (status = 200, description = "Synced card", body = BlockchainCard),
        (status = 404, description = "Card not found")
    )
)]
pub async fn get_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
) -> Result<Json<BlockchainCard>, ApiError> {
    state
        .ledger
        .get_blockchain_card(&card_id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Card not found"))
}

/// Activity for a card, newest first.
#[utoipa::path(
    get,
    path = "/api/algorand/card/{card_id}/activity",
    tag = "Algorand",
    params(
        ("card_id" = String, Path, description = "Card ID"),
        ("limit" = Option<usize>, Query, description = "Page size (default 20, max 100)"),
        ("offset" = Option<usize>, Query, description = "Entries to skip")
    ),
    responses(
        (status = 200, description = "Card activity", body = CardActivityResponse),
        (status = 404, description = "Card not found")
    )
)]
pub async fn card_activity(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    Query(query): Query<CardActivityQuery>,
) -> Result<Json<CardActivityResponse>, ApiError> {
    if state.ledger.get_blockchain_card(&card_id)?.is_none() {
        return Err(ApiError::not_found("Card not found"));
    }
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let activity = state
        .ledger
        .card_activity(&card_id, limit, query.offset.unwrap_or(0))?;
    Ok(Json(CardActivityResponse { card_id, activity }))
}

/// Record an activity for a card without a full sync.
#[utoipa::path(
    post,
    path = "/api/algorand/card/{card_id}/activity",
    tag = "Algorand",
    params(("card_id" = String, Path, description = "Card ID")),
    request_body = LogCardActivityRequest,
    responses(
        (status = 201, description = "Activity recorded", body = CardActivity),
        (status = 404, description = "Card not found")
    )
)]
pub async fn log_activity(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    Json(request): Json<LogCardActivityRequest>,
) -> Result<(StatusCode, Json<CardActivity>), ApiError> {
    let mut activity = CardActivity::new(card_id, request.action, request.amount_micro);
    activity.source = request.source.unwrap_or_default();
    activity.transaction_hash = request.transaction_hash;
    activity.block_number = request.block_number;
    activity.metadata = request.metadata.unwrap_or(serde_json::Value::Null);

    activity.seq = state
        .ledger
        .write(|w| w.log_card_activity(&activity))
        .map_err(|e| match e {
            LedgerDbError::NotFound(_) => ApiError::not_found("Card not found"),
            other => other.into(),
        })?;

    Ok((StatusCode::CREATED, Json(activity)))
}

/// Cards held by an address, newest first.
#[utoipa::path(
    get,
    path = "/api/algorand/cards/user/{user_address}",
    tag = "Algorand",
    params(
        ("user_address" = String, Path, description = "Algorand address"),
        ("active_only" = Option<bool>, Query, description = "Only active cards")
    ),
    responses(
        (status = 200, description = "Cards", body = UserCardsResponse),
        (status = 400, description = "Invalid address")
    )
)]
pub async fn cards_for_user(
    State(state): State<AppState>,
    Path(user_address): Path<String>,
    Query(query): Query<UserCardsQuery>,
) -> Result<Json<UserCardsResponse>, ApiError> {
    let address = AlgorandAddress::parse(&user_address)
        .map_err(|_| ApiError::bad_request("Invalid Algorand address format"))?;
    let cards = state
        .ledger
        .cards_for_address(address.as_str(), query.active_only.unwrap_or(false))?;
    Ok(Json(UserCardsResponse {
        user_address: address.into(),
        cards,
    }))
}
