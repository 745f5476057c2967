// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Emergency relief cases.
//!
//! Cases are opened here and then moved along by chain events: a crisis
//! badge approves a pending case, a disbursal completes it.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;

use crate::{
    error::ApiError,
    models::{CreateEmergencyCaseRequest, EmergencyCaseResponse},
    state::AppState,
    storage::{audit::EMERGENCY_CASE_CREATED, CaseStatus, EmergencyCase, EventLogEntry},
};

/// Allowed severity range (1 = low, 5 = critical).
const SEVERITY_RANGE: std::ops::RangeInclusive<i64> = 1..=5;

/// Open a pending emergency case for a registered user.
#[utoipa::path(
    post,
    path = "/api/emergency-cases",
    tag = "Emergency",
    request_body = CreateEmergencyCaseRequest,
    responses(
        (status = 201, description = "Case created", body = EmergencyCase),
        (status = 400, description = "Invalid severity, crisis type or amount"),
        (status = 404, description = "Requester wallet not registered")
    )
)]
pub async fn create_case(
    State(state): State<AppState>,
    Json(request): Json<CreateEmergencyCaseRequest>,
) -> Result<(StatusCode, Json<EmergencyCase>), ApiError> {
    if !SEVERITY_RANGE.contains(&request.severity) {
        return Err(ApiError::bad_request("severity must be between 1 and 5"));
    }
    let crisis_type = request.crisis_type.trim();
    if crisis_type.is_empty() {
        return Err(ApiError::bad_request("crisis_type is required"));
    }
    if request.requested_amount_micro == 0 {
        return Err(ApiError::bad_request("requested_amount_micro must be positive"));
    }

    let requester = state
        .ledger
        .get_user_by_address(&request.requester_wallet)?
        .ok_or_else(|| ApiError::not_found("Requester wallet is not registered"))?;

    let now = Utc::now();
    let case = EmergencyCase {
        id: uuid::Uuid::new_v4().to_string(),
        requester_user_id: requester.id.clone(),
        requester_wallet: requester.wallet_address.clone(),
        crisis_type: crisis_type.to_string(),
        severity: request.severity,
        description: request.description.filter(|d| !d.trim().is_empty()),
        requested_amount_micro: request.requested_amount_micro,
        disbursed_amount_micro: None,
        status: CaseStatus::Pending,
        assigned_ngo_id: None,
        disbursed_at: None,
        created_at: now,
        updated_at: now,
    };

    state.ledger.write(|w| -> Result<(), ApiError> {
        w.insert_case(&case)?;
        let entry = EventLogEntry::new(EMERGENCY_CASE_CREATED)
            .with_user(requester.id.clone())
            .with_data(serde_json::json!({
                "case_id": case.id,
                "crisis_type": case.crisis_type,
                "severity": case.severity,
            }));
        w.append_event(&entry)?;
        Ok(())
    })?;

    tracing::info!(case_id = %case.id, severity = case.severity, "Emergency case opened");

    Ok((StatusCode::CREATED, Json(case)))
}

/// A case with its badges and disbursals.
#[utoipa::path(
    get,
    path = "/api/emergency-cases/{case_id}",
    tag = "Emergency",
    params(("case_id" = String, Path, description = "Case ID")),
    responses(
        (status = 200, description = "Case details", body = EmergencyCaseResponse),
        (status = 404, description = "Case not found")
    )
)]
pub async fn get_case(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
) -> Result<Json<EmergencyCaseResponse>, ApiError> {
    let case = state
        .ledger
        .get_case(&case_id)?
        .ok_or_else(|| ApiError::not_found("Emergency case not found"))?;

    Ok(Json(EmergencyCaseResponse {
        badges: state.ledger.badges_for_case(&case.id)?,
        remittances: state.ledger.remittances_for_case(&case.id)?,
        case,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{register, test_state, ADDR_A, ADDR_NGO};
    use crate::events::{
        CrisisBadgeIssued, EmergencyDisbursal, EventContext, NgoAuthorized,
    };

    fn case_request(severity: i64) -> Json<CreateEmergencyCaseRequest> {
        Json(CreateEmergencyCaseRequest {
            requester_wallet: ADDR_A.to_string(),
            crisis_type: "cyclone".to_string(),
            severity,
            description: Some("Roof lost".to_string()),
            requested_amount_micro: 250_000_000,
        })
    }

    #[tokio::test]
    async fn creates_pending_case() {
        let (state, _dir) = test_state();
        let user = register(&state, ADDR_A);

        let (status, Json(case)) = create_case(State(state.clone()), case_request(4))
            .await
            .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(case.status, CaseStatus::Pending);
        assert_eq!(case.requester_user_id, user.id);
        let events = state.ledger.recent_events(5).unwrap();
        assert_eq!(events[0].event_type, EMERGENCY_CASE_CREATED);
    }

    #[tokio::test]
    async fn severity_is_validated() {
        let (state, _dir) = test_state();
        register(&state, ADDR_A);
        for severity in [0, 6, -1] {
            let err = create_case(State(state.clone()), case_request(severity))
                .await
                .unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn unregistered_requester_is_not_found() {
        let (state, _dir) = test_state();
        let err = create_case(State(state), case_request(3)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn case_follows_badge_and_disbursal() {
        let (state, _dir) = test_state();
        register(&state, ADDR_A);
        register(&state, ADDR_NGO);
        let (_, Json(case)) = create_case(State(state.clone()), case_request(4))
            .await
            .unwrap();

        let dispatch = |event: crate::events::ChainEvent, tx: &str| {
            let ctx = EventContext::new(tx).with_sender(ADDR_NGO);
            state.registry.dispatch(&state.ledger, &event, &ctx).unwrap();
        };
        dispatch(
            NgoAuthorized {
                user_address: ADDR_NGO.into(),
                rating: 9,
                region: "Pacific".into(),
                timestamp: 0,
            }
            .into(),
            "TX1",
        );
        dispatch(
            CrisisBadgeIssued {
                user_address: ADDR_A.into(),
                case_id: case.id.clone(),
                crisis_type: "cyclone".into(),
                severity: 4,
                ngo_address: None,
                timestamp: 0,
            }
            .into(),
            "TX2",
        );

        let Json(details) = get_case(State(state.clone()), Path(case.id.clone()))
            .await
            .unwrap();
        assert_eq!(details.case.status, CaseStatus::Approved);
        assert_eq!(details.badges.len(), 1);

        dispatch(
            EmergencyDisbursal {
                user_address: ADDR_A.into(),
                amount_micro: 200_000_000,
                case_id: case.id.clone(),
                ngo_address: None,
                timestamp: 0,
            }
            .into(),
            "TX3",
        );

        let Json(details) = get_case(State(state), Path(case.id)).await.unwrap();
        assert_eq!(details.case.status, CaseStatus::Completed);
        assert_eq!(details.case.disbursed_amount_micro, Some(200_000_000));
        assert_eq!(details.remittances.len(), 1);
    }

    #[tokio::test]
    async fn missing_case_is_not_found() {
        let (state, _dir) = test_state();
        let err = get_case(State(state), Path("nope".into())).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
