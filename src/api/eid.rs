// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Provider-agnostic order lifecycle under `/v1/eid`.
//!
//! Long polls (`collect`, `change`) run under a cancellation token tied to
//! the request: when the client disconnects the handler future is dropped,
//! which cancels the token and, with `cancelOnErr`, the vendor order.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use utoipa::IntoParams;

use crate::{
    error::{ApiError, ErrorBody},
    models::{Inter, ProvidersResponse, Req, Resp},
    state::AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct CancelOnErrQuery {
    /// Cancel the vendor order when the wait fails or the client goes away.
    #[serde(default)]
    pub cancel_on_err: bool,
}

#[utoipa::path(
    get,
    path = "/v1/eid/providers",
    tag = "eID",
    responses((status = 200, body = ProvidersResponse))
)]
pub async fn providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        providers: state.coordinator.providers(),
    })
}

#[utoipa::path(
    post,
    path = "/v1/eid/auth",
    request_body = Req,
    tag = "eID",
    responses(
        (status = 200, body = Inter),
        (status = 400, body = ErrorBody),
        (status = 404, body = ErrorBody),
        (status = 502, body = ErrorBody)
    )
)]
pub async fn auth(
    State(state): State<AppState>,
    body: Result<Json<Req>, JsonRejection>,
) -> Result<Json<Inter>, ApiError> {
    let Json(req) = body?;
    Ok(Json(state.coordinator.auth_init(req).await?))
}

#[utoipa::path(
    post,
    path = "/v1/eid/sign",
    request_body = Req,
    tag = "eID",
    responses(
        (status = 200, body = Inter),
        (status = 400, body = ErrorBody),
        (status = 404, body = ErrorBody),
        (status = 502, body = ErrorBody)
    )
)]
pub async fn sign(
    State(state): State<AppState>,
    body: Result<Json<Req>, JsonRejection>,
) -> Result<Json<Inter>, ApiError> {
    let Json(req) = body?;
    Ok(Json(state.coordinator.sign_init(req).await?))
}

/// One status check, without waiting.
#[utoipa::path(
    post,
    path = "/v1/eid/peek",
    request_body = Inter,
    tag = "eID",
    responses((status = 200, body = Resp), (status = 502, body = ErrorBody))
)]
pub async fn peek(
    State(state): State<AppState>,
    body: Result<Json<Inter>, JsonRejection>,
) -> Result<Json<Resp>, ApiError> {
    let Json(inter) = body?;
    Ok(Json(state.coordinator.peek(&inter).await?))
}

/// Wait until the order reaches a final status.
#[utoipa::path(
    post,
    path = "/v1/eid/collect",
    request_body = Inter,
    params(CancelOnErrQuery),
    tag = "eID",
    responses(
        (status = 200, body = Resp),
        (status = 408, body = ErrorBody),
        (status = 502, body = ErrorBody)
    )
)]
pub async fn collect(
    State(state): State<AppState>,
    Query(query): Query<CancelOnErrQuery>,
    body: Result<Json<Inter>, JsonRejection>,
) -> Result<Json<Resp>, ApiError> {
    let Json(inter) = body?;
    let ctx = CancellationToken::new();
    let _guard = ctx.clone().drop_guard();
    Ok(Json(
        state
            .coordinator
            .collect(&inter, query.cancel_on_err, &ctx)
            .await?,
    ))
}

/// Wait until the order status moves, or the order finishes.
#[utoipa::path(
    post,
    path = "/v1/eid/change",
    request_body = Inter,
    params(CancelOnErrQuery),
    tag = "eID",
    responses(
        (status = 200, body = Resp),
        (status = 408, body = ErrorBody),
        (status = 502, body = ErrorBody)
    )
)]
pub async fn change(
    State(state): State<AppState>,
    Query(query): Query<CancelOnErrQuery>,
    body: Result<Json<Inter>, JsonRejection>,
) -> Result<Json<Resp>, ApiError> {
    let Json(inter) = body?;
    let ctx = CancellationToken::new();
    let _guard = ctx.clone().drop_guard();
    Ok(Json(
        state
            .coordinator
            .change(&inter, query.cancel_on_err, &ctx)
            .await?,
    ))
}

#[utoipa::path(
    post,
    path = "/v1/eid/cancel",
    request_body = Inter,
    tag = "eID",
    responses((status = 204), (status = 502, body = ErrorBody))
)]
pub async fn cancel(
    State(state): State<AppState>,
    body: Result<Json<Inter>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(inter) = body?;
    state.coordinator.cancel(&inter).await?;
    Ok(StatusCode::NO_CONTENT)
}
