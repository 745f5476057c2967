// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::HeaderName,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{
        AlgorandAddress, CardActivityResponse, CardSyncRequest, CardSyncResponse,
        CreateEmergencyCaseRequest, EmergencyCaseResponse, EventListResponse,
        IndexerStatusResponse, LogCardActivityRequest, MobileMoneyRequest, MobileMoneyResponse,
        MobileProvider, MobileTransactionListResponse, MobileWalletResponse, PhoneNumber,
        RegisterUserRequest, SyncEventRequest, SyncEventResponse, TokenBalance,
        TransactionListResponse, UserCardsResponse, WalletResponse,
    },
    state::AppState,
    storage::{
        ActivitySource, BlockchainCard, CardAction, CardActivity, CardStatus, CaseStatus,
        CrisisBadge, EmergencyCase, EventLogEntry, LedgerStatus, MobileTransaction,
        MobileTransactionType, MobileWallet, RemittanceLog, SkippedRound, TokenTransaction,
        TransactionType, UserRecord, UserRole, VirtualCard,
    },
};

pub mod audit;
pub mod cards;
pub mod cases;
pub mod health;
pub mod mobile;
pub mod sync;
pub mod users;

/// Header carrying the per-request ID.
const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let api_routes = Router::new()
        .route("/algorand/sync-event", post(sync::sync_event))
        .route("/algorand/indexer", get(sync::indexer_status))
        .route("/algorand/card-sync", post(cards::sync_card))
        .route("/algorand/card/{card_id}", get(cards::get_card))
        .route(
            "/algorand/card/{card_id}/activity",
            get(cards::card_activity).post(cards::log_activity),
        )
        .route("/algorand/cards/user/{user_address}", get(cards::cards_for_user))
        .route("/mobile-money/send", post(mobile::send_mobile_money))
        .route("/mobile-money/receive", post(mobile::receive_mobile_money))
        .route("/mobile-money/wallet/{user_id}", get(mobile::get_mobile_wallet))
        .route(
            "/mobile-money/transactions/{user_id}",
            get(mobile::list_mobile_transactions),
        )
        .route("/users", post(users::register_user))
        .route("/users/{user_id}/wallet", get(users::get_wallet))
        .route("/users/{user_id}/transactions", get(users::list_transactions))
        .route("/emergency-cases", post(cases::create_case))
        .route("/emergency-cases/{case_id}", get(cases::get_case))
        .route("/events", get(audit::list_events));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/api", api_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        sync::sync_event,
        sync::indexer_status,
        cards::sync_card,
        cards::get_card,
        cards::card_activity,
        cards::log_activity,
        cards::cards_for_user,
        mobile::send_mobile_money,
        mobile::receive_mobile_money,
        mobile::get_mobile_wallet,
        mobile::list_mobile_transactions,
        users::register_user,
        users::get_wallet,
        users::list_transactions,
        cases::create_case,
        cases::get_case,
        audit::list_events
    ),
    components(
        schemas(
            AlgorandAddress,
            SyncEventRequest,
            SyncEventResponse,
            IndexerStatusResponse,
            SkippedRound,
            RegisterUserRequest,
            UserRecord,
            UserRole,
            WalletResponse,
            TokenBalance,
            VirtualCard,
            CardStatus,
            TransactionListResponse,
            TokenTransaction,
            TransactionType,
            LedgerStatus,
            CreateEmergencyCaseRequest,
            EmergencyCase,
            EmergencyCaseResponse,
            CaseStatus,
            CrisisBadge,
            RemittanceLog,
            EventListResponse,
            EventLogEntry,
            CardSyncRequest,
            CardSyncResponse,
            BlockchainCard,
            CardAction,
            CardActivity,
            ActivitySource,
            LogCardActivityRequest,
            CardActivityResponse,
            UserCardsResponse,
            PhoneNumber,
            MobileProvider,
            MobileMoneyRequest,
            MobileMoneyResponse,
            MobileTransaction,
            MobileTransactionType,
            MobileWallet,
            MobileWalletResponse,
            MobileTransactionListResponse
        )
    ),
    tags(
        (name = "Algorand", description = "Chain event synchronization"),
        (name = "Users", description = "Users and off-chain wallets"),
        (name = "Mobile Money", description = "Phone wallet transfers"),
        (name = "Emergency", description = "Emergency relief cases"),
        (name = "Audit", description = "Audit event log"),
        (name = "Health", description = "Health checks")
    )
)]
struct ApiDoc;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use crate::events::HandlerRegistry;
    use crate::state::AppState;
    use crate::storage::{LedgerDb, UserRecord, UserRole};

    pub const ADDR_A: &str = "UJZDEGXDNCF32EPF3DHODZDOCIS2JHTLGMXGEDN73U55XTPLPFT7V4SEH2";
    pub const ADDR_B: &str = "KVJ72CEUVW75EFR6EDT4SYWB5WKH7DNSIPZZ7FK4ZRI3R2WYOJFLJOOA7L";
    pub const ADDR_NGO: &str = "QSAJ2XUID5ZZZZG6ZDMEN4KHVDGAJGXBENYJQWX6HH7566TFJGVQ6KBNXJ";

    pub fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LedgerDb::open(&dir.path().join("ledger.redb")).unwrap();
        let state = AppState::new(
            Arc::new(ledger),
            Arc::new(HandlerRegistry::with_default_handlers()),
            0,
        );
        (state, dir)
    }

    /// Register a user directly in the ledger (no audit entry).
    pub fn register(state: &AppState, address: &str) -> UserRecord {
        let user = UserRecord::new(address.to_string(), UserRole::User);
        state.ledger.write(|w| w.insert_user(&user)).unwrap();
        user
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let (state, _dir) = test_state();
        let _ = router(state).into_make_service();
    }

    #[tokio::test]
    async fn health_sets_request_id() {
        let (state, _dir) = test_state();
        let response = router(state)
            .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn register_then_sync_over_http() {
        let (state, _dir) = test_state();
        let app = router(state);

        let (status, user) = send(
            app.clone(),
            post_json("/api/users", serde_json::json!({ "wallet_address": ADDR_A })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let user_id = user["id"].as_str().unwrap().to_string();

        let sync = serde_json::json!({
            "event_type": "FIAT_DEPOSIT",
            "event_data": {
                "userAddress": ADDR_A,
                "amount": 5000000,
                "stripePaymentId": "pi_123",
                "timestamp": 1700000000,
                "algorandTxId": "TXHTTP"
            }
        });
        let (status, body) = send(app.clone(), post_json("/api/algorand/sync-event", sync.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["duplicate"], false);

        let (status, body) = send(app.clone(), post_json("/api/algorand/sync-event", sync)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["duplicate"], true);

        let (status, wallet) = send(
            app,
            Request::builder()
                .uri(format!("/api/users/{user_id}/wallet"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(wallet["balances"][0]["balance"], "5.0");
    }

    #[tokio::test]
    async fn card_sync_over_http_accepts_camel_case() {
        let (state, _dir) = test_state();
        let app = router(state);

        let body = serde_json::json!({
            "cardId": "card-9",
            "userAddress": ADDR_B,
            "balanceMicro": 2500000,
            "transactionHash": "TXHASHHTTP01"
        });
        let (status, synced) = send(app.clone(), post_json("/api/algorand/card-sync", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(synced["action"], "created");

        let (status, cards) = send(
            app,
            Request::builder()
                .uri(format!("/api/algorand/cards/user/{ADDR_B}?active_only=true"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cards["cards"][0]["balance"], "2.5");
    }

    #[tokio::test]
    async fn unknown_event_over_http_is_400_json() {
        let (state, _dir) = test_state();
        let (status, body) = send(
            router(state),
            post_json(
                "/api/algorand/sync-event",
                serde_json::json!({ "event_type": "NOT_A_THING", "event_data": {} }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unrecognized event type: NOT_A_THING");
    }

    #[tokio::test]
    async fn openapi_lists_sync_route() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/algorand/sync-event"));
        assert!(doc.paths.paths.contains_key("/api/users/{user_id}/wallet"));
        assert!(doc.paths.paths.contains_key("/api/algorand/card-sync"));
        assert!(doc.paths.paths.contains_key("/api/mobile-money/send"));
    }
}
