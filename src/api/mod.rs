// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    body::Body,
    http::{HeaderName, Request},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{debug_span, Span};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    error::ErrorBody,
    models::{Inter, Mode, Payload, Provider, ProvidersResponse, Req, Resp, Status, Who},
    providers::bankid::models::{
        AuthSignRequest, ChangeRequest, CollectResponse, CompletionData, Device, OrderRequest,
        OrderStatus, Requirement, StepUp, User,
    },
    state::AppState,
};

pub mod bankid;
pub mod eid;
pub mod health;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    let eid_routes = Router::new()
        .route("/providers", get(eid::providers))
        .route("/auth", post(eid::auth))
        .route("/sign", post(eid::sign))
        .route("/peek", post(eid::peek))
        .route("/collect", post(eid::collect))
        .route("/change", post(eid::change))
        .route("/cancel", post(eid::cancel));

    let bankid_routes = Router::new()
        .route("/auth", post(bankid::auth))
        .route("/sign", post(bankid::sign))
        .route("/collect", post(bankid::collect))
        .route("/change", post(bankid::change))
        .route("/cancel", post(bankid::cancel));

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .nest("/v1/eid", eid_routes)
        .nest("/bankid/v6", bankid_routes)
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(PropagateRequestIdLayer::new(request_id))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(CorsLayer::permissive()),
        )
}

fn make_span(request: &Request<Body>) -> Span {
    let path = request.uri().path();
    let method = request.method();
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", %method, path, request_id)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        eid::providers,
        eid::auth,
        eid::sign,
        eid::peek,
        eid::collect,
        eid::change,
        eid::cancel,
        bankid::auth,
        bankid::sign,
        bankid::collect,
        bankid::change,
        bankid::cancel,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            Provider,
            Who,
            Payload,
            Req,
            Mode,
            Inter,
            Status,
            Resp,
            ProvidersResponse,
            ErrorBody,
            AuthSignRequest,
            Requirement,
            OrderRequest,
            ChangeRequest,
            CollectResponse,
            OrderStatus,
            CompletionData,
            User,
            Device,
            StepUp,
            bankid::QrCodeResponse,
            bankid::CollectQuery,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "eID", description = "Provider-agnostic authentication and signing orders"),
        (name = "BankID", description = "BankID orders with animated QR streaming"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let app = router(AppState::default());
        // Ensure the router can be converted into a service without panicking.
        let _ = app.into_make_service();
    }

    #[tokio::test]
    async fn responses_carry_a_request_id() {
        let app = router(AppState::default());
        let request = Request::get("/health/live").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn request_id_from_caller_is_kept() {
        let app = router(AppState::default());
        let request = Request::get("/health/live")
            .header(REQUEST_ID_HEADER, "abc-123")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "abc-123");
    }

    #[test]
    fn openapi_lists_both_surfaces() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/v1/eid/collect"));
        assert!(doc.paths.paths.contains_key("/bankid/v6/auth"));
    }
}
