// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain synchronization endpoints.
//!
//! `POST /api/algorand/sync-event` applies one contract event through the same
//! handler registry the round indexer uses, so a relay or an operator replay
//! produces identical ledger writes. Replays are answered with
//! `duplicate: true` and change nothing.

use axum::{extract::State, Json};
use serde_json::{Map, Value};

use crate::{
    error::ApiError,
    events::{decode_json, DispatchOutcome, EventContext, EventKind},
    models::{IndexerStatusResponse, SyncEventRequest, SyncEventResponse},
    state::AppState,
};

/// Apply a contract event to the ledger.
#[utoipa::path(
    post,
    path = "/api/algorand/sync-event",
    tag = "Algorand",
    request_body = SyncEventRequest,
    responses(
        (status = 200, description = "Event applied (or already applied)", body = SyncEventResponse),
        (status = 400, description = "Missing fields, malformed values or unknown event type"),
        (status = 422, description = "Event conflicts with ledger state"),
        (status = 500, description = "Wallet address not registered or ledger write failed")
    )
)]
pub async fn sync_event(
    State(state): State<AppState>,
    Json(request): Json<SyncEventRequest>,
) -> Result<Json<SyncEventResponse>, ApiError> {
    let (Some(event_type), Some(event_data)) = (
        request.event_type.filter(|t| !t.is_empty()),
        request.event_data,
    ) else {
        return Err(ApiError::bad_request("Missing event type or data"));
    };
    if EventKind::from_tag(&event_type).is_none() {
        return Err(ApiError::bad_request(format!(
            "Unrecognized event type: {event_type}"
        )));
    }
    let Some(tx_id) = context_value(request.algorand_tx_id, &event_data, "algorandTxId") else {
        return Err(ApiError::bad_request("Missing algorandTxId"));
    };

    let event = decode_json(&event_type, &event_data)?;

    let mut ctx = EventContext::new(tx_id.clone());
    ctx.sender = context_value(request.algorand_sender, &event_data, "algorandSender");
    ctx.round = context_number(request.algorand_round, &event_data, "algorandRound")?;
    ctx.log_index = context_number(request.log_index, &event_data, "logIndex")?.unwrap_or(0);

    let outcome = state.registry.dispatch(&state.ledger, &event, &ctx)?;

    tracing::info!(
        event_type = %event_type,
        tx_id = %tx_id,
        duplicate = matches!(outcome, DispatchOutcome::Duplicate),
        "Synced event"
    );

    let response = match outcome {
        DispatchOutcome::Applied { event_seq, result } => SyncEventResponse {
            success: true,
            message: format!("Successfully processed {event_type} event"),
            event_type,
            algorand_tx_id: tx_id,
            duplicate: false,
            event_seq: Some(event_seq),
            result,
        },
        DispatchOutcome::Duplicate => SyncEventResponse {
            success: true,
            message: format!("{event_type} event already processed"),
            event_type,
            algorand_tx_id: tx_id,
            duplicate: true,
            event_seq: None,
            result: serde_json::Value::Null,
        },
    };
    Ok(Json(response))
}

/// Top-level context value, else the same key inside `event_data`.
fn context_value(top: Option<String>, data: &Map<String, Value>, key: &str) -> Option<String> {
    top.or_else(|| match data.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
    .filter(|s| !s.trim().is_empty())
}

fn context_number<T>(
    top: Option<T>,
    data: &Map<String, Value>,
    key: &str,
) -> Result<Option<T>, ApiError>
where
    T: std::str::FromStr + ToString,
{
    context_value(top.map(|v| v.to_string()), data, key)
        .map(|raw| raw.trim().parse::<T>())
        .transpose()
        .map_err(|_| ApiError::bad_request(format!("{key} must be a non-negative integer")))
}

/// Indexer cursor and skipped rounds.
#[utoipa::path(
    get,
    path = "/api/algorand/indexer",
    tag = "Algorand",
    responses(
        (status = 200, description = "Indexer status", body = IndexerStatusResponse),
        (status = 500, description = "Ledger read failed")
    )
)]
pub async fn indexer_status(
    State(state): State<AppState>,
) -> Result<Json<IndexerStatusResponse>, ApiError> {
    Ok(Json(IndexerStatusResponse {
        enabled: state.indexer_enabled(),
        app_id: state.app_id,
        last_processed_round: state.ledger.last_processed_round()?,
        skipped_rounds: state.ledger.skipped_rounds()?,
    }))
}
