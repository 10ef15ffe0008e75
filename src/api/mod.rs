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
    auth::{AuthenticatedUser, TokenPair},
    onboarding::{OnboardingState, WaitingDevice},
    state::AppState,
};

pub mod auth;
pub mod devices;
pub mod health;
pub mod users;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route(
            "/device/{org_id}/waiting_room",
            get(devices::list_waiting_room).post(devices::join_waiting_room),
        )
        .route("/device/{org_id}/profile", get(devices::poll_profile))
        .route("/device/auth/token", get(auth::login))
        .route("/device/auth/token/refresh", post(auth::refresh))
        .route("/device/auth/token/revoke", post(auth::revoke))
        .route("/device/auth/join", get(auth::join_by_query).post(auth::join))
        .route("/users/me", get(users::get_current_user))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        devices::list_waiting_room,
        devices::join_waiting_room,
        devices::poll_profile,
        auth::login,
        auth::refresh,
        auth::revoke,
        auth::join,
        auth::join_by_query,
        users::get_current_user,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            TokenPair,
            AuthenticatedUser,
            WaitingDevice,
            OnboardingState,
            devices::WaitingRoomResponse,
            devices::JoinResponse,
            devices::ProfileResponse,
            auth::RefreshRequest,
            auth::CreateAccountRequest,
            auth::CreateAccountResponse,
            users::UserMeResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Devices", description = "Device waiting room and profile polling"),
        (name = "Auth", description = "Login and session token lifecycle"),
        (name = "Users", description = "Current user"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionConfig;
    use crate::storage::CredentialStore;
    use axum::{body::Body, http::Request};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::open(&dir.path().join("router.redb")).unwrap();
        let state = AppState::new(Arc::new(store), SessionConfig::new(b"router-test-session-key-00000000".to_vec()));
        (state, dir)
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let (state, _dir) = test_state();
        let app = router(state);
        // Ensure the router can be converted into a service without panicking.
        let _ = app.into_make_service();
    }

    #[tokio::test]
    async fn responses_carry_request_id() {
        let (state, _dir) = test_state();
        let response = router(state)
            .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[test]
    fn openapi_lists_device_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/v1/device/{org_id}/waiting_room"));
        assert!(doc.paths.paths.contains_key("/v1/device/auth/token/refresh"));
    }
}
