// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Query, State},
    Json,
};

use crate::{
    error::ApiError,
    models::{EventListQuery, EventListResponse},
    state::AppState,
};

/// Default number of audit events returned.
const DEFAULT_LIMIT: usize = 50;

/// Upper bound on `limit`.
const MAX_LIMIT: usize = 500;

/// Audit events, newest first.
#[utoipa::path(
    get,
    path = "/api/events",
    tag = "Audit",
    params(("limit" = Option<usize>, Query, description = "Maximum events to return (default 50, max 500)")),
    responses(
        (status = 200, description = "Audit events", body = EventListResponse)
    )
)]
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventListQuery>,
) -> Result<Json<EventListResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    Ok(Json(EventListResponse {
        events: state.ledger.recent_events(limit)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{test_state, ADDR_A, ADDR_B};
    use crate::api::users::register_user;
    use crate::models::RegisterUserRequest;
    use crate::storage::UserRecord;

    async fn register(state: &AppState, address: &str) -> UserRecord {
        let request = RegisterUserRequest {
            wallet_address: address.to_string(),
            email: None,
            full_name: None,
            role: None,
        };
        let (_, Json(user)) = register_user(State(state.clone()), Json(request))
            .await
            .unwrap();
        user
    }

    #[tokio::test]
    async fn lists_newest_first_with_limit() {
        let (state, _dir) = test_state();
        let first = register(&state, ADDR_A).await;
        let second = register(&state, ADDR_B).await;

        let Json(all) = list_events(State(state.clone()), Query(EventListQuery::default()))
            .await
            .unwrap();
        assert_eq!(all.events.len(), 2);
        assert_eq!(all.events[0].user_id.as_deref(), Some(second.id.as_str()));
        assert_eq!(all.events[1].user_id.as_deref(), Some(first.id.as_str()));

        let Json(one) = list_events(State(state), Query(EventListQuery { limit: Some(1) }))
            .await
            .unwrap();
        assert_eq!(one.events.len(), 1);
    }
}
