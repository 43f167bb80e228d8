// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # BankID Endpoints
//!
//! Thin HTTP binding of the BankID RP API under `/bankid/v6`, for clients
//! that render the animated QR code themselves.
//!
//! ## Order stream
//!
//! `auth` and `sign` answer with an event stream (SSE or NDJSON, see
//! `STREAM_ENCODER`) carrying:
//!
//! | Event | Data |
//! |-------|------|
//! | `qrcode` | `{orderRef, uri, qr}`, once per tick while the QR is unscanned |
//! | `status` | the raw collect response, whenever status or hint code moves |
//! | `error` | an error body, after which the stream ends |
//!
//! The stream ends on a final status, when the watch ends, or after
//! [`QR_TICKS`] ticks. QR refresh stops once the hint code is `userSign`.
//! With `?type=once` a single `{orderRef, uri, qr}` JSON object is returned.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep_until, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::{
    eid::EidError,
    error::{ApiError, ErrorBody},
    providers::bankid::{
        self,
        models::{
            hint, AuthSignRequest, AuthSignResponse, CancelRequest, ChangeRequest,
            CollectResponse, OrderStatus,
        },
        BankIdClient,
    },
    state::AppState,
    stream::{self, EventSink},
};

pub const QRCODE_EVENT: &str = "qrcode";
pub const STATUS_EVENT: &str = "status";
pub const ERROR_EVENT: &str = "error";

/// Number of QR ticks before the stream gives up.
pub const QR_TICKS: u32 = 30;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct OrderQuery {
    /// `once` returns the first QR code as plain JSON instead of a stream.
    #[serde(rename = "type", default)]
    pub response_type: Option<String>,
}

impl OrderQuery {
    fn once(&self) -> bool {
        self.response_type.as_deref() == Some("once")
    }
}

/// QR payload and deep link for an order.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QrCodeResponse {
    pub order_ref: String,
    pub uri: String,
    pub qr: String,
}

impl QrCodeResponse {
    fn new(order: &AuthSignResponse, tick: u32) -> Self {
        Self {
            order_ref: order.order_ref.clone(),
            uri: format!(
                "bankid:///?autostarttoken={}&redirect=null",
                order.auto_start_token
            ),
            qr: order.qr_code(u64::from(tick)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectQuery {
    pub order_ref: String,
    /// Wait until the hint code or status moves.
    pub wait_for_change: bool,
    /// Wait until the order is complete or failed.
    pub wait_until_finished: bool,
}

fn client(state: &AppState) -> Result<BankIdClient, ApiError> {
    state
        .registry()
        .bankid()
        .cloned()
        .ok_or_else(|| EidError::ProviderNotFound(bankid::NAME.to_string()).into())
}

#[utoipa::path(
    post,
    path = "/bankid/v6/auth",
    request_body = AuthSignRequest,
    params(OrderQuery),
    tag = "BankID",
    responses(
        (status = 200, description = "Event stream, or one QR code with type=once", body = QrCodeResponse),
        (status = 400, body = ErrorBody),
        (status = 502, body = ErrorBody)
    )
)]
pub async fn auth(
    State(state): State<AppState>,
    Query(query): Query<OrderQuery>,
    body: Result<Json<AuthSignRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body?;
    let client = client(&state)?;
    let order = client.auth(&request).await?;
    info!(order_ref = %order.order_ref, "BankID auth order started");
    Ok(respond(&state, client, order, &query))
}

#[utoipa::path(
    post,
    path = "/bankid/v6/sign",
    request_body = AuthSignRequest,
    params(OrderQuery),
    tag = "BankID",
    responses(
        (status = 200, description = "Event stream, or one QR code with type=once", body = QrCodeResponse),
        (status = 400, body = ErrorBody),
        (status = 502, body = ErrorBody)
    )
)]
pub async fn sign(
    State(state): State<AppState>,
    Query(query): Query<OrderQuery>,
    body: Result<Json<AuthSignRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body?;
    let client = client(&state)?;
    let order = client.sign(&request).await?;
    info!(order_ref = %order.order_ref, "BankID sign order started");
    Ok(respond(&state, client, order, &query))
}

fn respond(
    state: &AppState,
    client: BankIdClient,
    order: AuthSignResponse,
    query: &OrderQuery,
) -> Response {
    if query.once() {
        return Json(QrCodeResponse::new(&order, 0)).into_response();
    }
    let (sink, response) = stream::channel(state.stream_format);
    tokio::spawn(stream_order(client, order, sink, state.qr_period));
    response
}

/// Feed the order stream until a final status, a failure, the client
/// leaving or the tick budget running out.
async fn stream_order(
    client: BankIdClient,
    order: AuthSignResponse,
    mut sink: EventSink,
    qr_period: Duration,
) {
    let order_ref = order.order_ref.clone();
    let ctx = CancellationToken::new();
    let _stop_watch = ctx.clone().drop_guard();

    if sink.send(QRCODE_EVENT, &QrCodeResponse::new(&order, 0)).await.is_err() {
        return;
    }

    let mut changes = match client.watch_for_change(&order_ref, ctx).await {
        Ok(changes) => changes,
        Err(err) => {
            warn!(order_ref = %order_ref, error = %err, "Failed to watch BankID order");
            let _ = sink.send(ERROR_EVENT, &ApiError::from(err).body).await;
            return;
        }
    };

    let start = Instant::now();
    let mut refresh_qr = true;
    for tick in 1..=QR_TICKS {
        let deadline = start + qr_period * tick;
        loop {
            tokio::select! {
                _ = sink.closed() => {
                    debug!(order_ref = %order_ref, "Stream client left");
                    return;
                }
                _ = sleep_until(deadline) => break,
                change = changes.recv() => {
                    let collected: CollectResponse = match change {
                        None => return,
                        Some(Err(err)) => {
                            warn!(order_ref = %order_ref, error = %err, "BankID watch failed");
                            let _ = sink.send(ERROR_EVENT, &ApiError::from(err).body).await;
                            return;
                        }
                        Some(Ok(collected)) => collected,
                    };
                    if collected.hint_code == hint::USER_SIGN {
                        refresh_qr = false;
                    }
                    if sink.send(STATUS_EVENT, &collected).await.is_err() {
                        return;
                    }
                    if collected.status != OrderStatus::Pending {
                        info!(order_ref = %order_ref, status = ?collected.status, "BankID order reached final status");
                        return;
                    }
                }
            }
        }

        if refresh_qr
            && tick < QR_TICKS
            && sink
                .send(QRCODE_EVENT, &QrCodeResponse::new(&order, tick))
                .await
                .is_err()
        {
            return;
        }
    }
    debug!(order_ref = %order_ref, "BankID stream tick budget used up");
}

/// Single collect, or a wait for change / completion.
#[utoipa::path(
    post,
    path = "/bankid/v6/collect",
    request_body = CollectQuery,
    tag = "BankID",
    responses(
        (status = 200, body = CollectResponse),
        (status = 400, body = ErrorBody),
        (status = 502, body = ErrorBody)
    )
)]
pub async fn collect(
    State(state): State<AppState>,
    body: Result<Json<CollectQuery>, JsonRejection>,
) -> Result<Json<CollectResponse>, ApiError> {
    let Json(query) = body?;
    let client = client(&state)?;
    if !(query.wait_for_change || query.wait_until_finished) {
        return Ok(Json(client.collect_once(&query.order_ref).await?));
    }

    let request = ChangeRequest {
        order_ref: query.order_ref,
        wait_until_finished: query.wait_until_finished,
    };
    let ctx = CancellationToken::new();
    let _guard = ctx.clone().drop_guard();
    Ok(Json(client.change(&request, false, &ctx).await?))
}

#[utoipa::path(
    post,
    path = "/bankid/v6/change",
    request_body = ChangeRequest,
    tag = "BankID",
    responses(
        (status = 200, body = CollectResponse),
        (status = 400, body = ErrorBody),
        (status = 502, body = ErrorBody)
    )
)]
pub async fn change(
    State(state): State<AppState>,
    body: Result<Json<ChangeRequest>, JsonRejection>,
) -> Result<Json<CollectResponse>, ApiError> {
    let Json(request) = body?;
    let client = client(&state)?;
    let ctx = CancellationToken::new();
    let _guard = ctx.clone().drop_guard();
    Ok(Json(client.change(&request, false, &ctx).await?))
}

#[utoipa::path(
    post,
    path = "/bankid/v6/cancel",
    request_body = CancelRequest,
    tag = "BankID",
    responses(
        (status = 204),
        (status = 400, body = ErrorBody),
        (status = 502, body = ErrorBody)
    )
)]
pub async fn cancel(
    State(state): State<AppState>,
    body: Result<Json<CancelRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = body?;
    client(&state)?.cancel(&request.order_ref).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        api::router,
        eid::Registry,
        providers::bankid::fake::FakeBankId,
        stream::{sse, StreamFormat},
    };

    const TEST_QR_PERIOD: Duration = Duration::from_millis(20);

    fn app(fake: &FakeBankId, format: StreamFormat) -> Router {
        let state = AppState::new(Registry::new().with_bankid(fake.client()), format)
            .with_qr_period(TEST_QR_PERIOD);
        router(state)
    }

    fn request(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn call(app: &Router, uri: &str, body: Value) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request(uri, body)).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn events(body: Vec<u8>) -> Vec<stream::Event> {
        let mut rx = sse::reader(std::io::Cursor::new(body), CancellationToken::new());
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn auth_body() -> Value {
        json!({"endUserIp": "127.0.0.1"})
    }

    #[tokio::test]
    async fn once_returns_first_qr_code() {
        let fake = FakeBankId::spawn().await;
        let app = app(&fake, StreamFormat::Sse);

        let (status, body) = call(&app, "/bankid/v6/auth?type=once", auth_body()).await;
        assert_eq!(status, StatusCode::OK);
        let qr: QrCodeResponse = serde_json::from_slice(&body).unwrap();
        let order = fake.order(&qr.order_ref).unwrap();
        assert_eq!(
            qr.uri,
            format!("bankid:///?autostarttoken={}&redirect=null", order.auto_start_token)
        );
        assert_eq!(qr.qr, order.qr_code(0));
        assert_eq!(fake.calls("/rp/v6.0/collect"), 0);
    }

    #[tokio::test]
    async fn stream_ends_on_completion() {
        let fake = FakeBankId::spawn().await;
        let app = app(&fake, StreamFormat::Sse);

        let response = app.oneshot(request("/bankid/v6/auth", auth_body())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");

        assert_eq!(fake.calls("/rp/v6.0/auth"), 1);
        let order_ref = fake.last_order().unwrap();
        fake.complete_after(&order_ref, 4);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let events = events(body.to_vec()).await;

        assert_eq!(events[0].event, QRCODE_EVENT);
        assert_eq!(events[0].id, "0");
        let status: Vec<&stream::Event> = events.iter().filter(|e| e.event == STATUS_EVENT).collect();
        let first: CollectResponse = serde_json::from_str(&status[0].data).unwrap();
        assert_eq!(first.status, OrderStatus::Pending);
        let last: CollectResponse = serde_json::from_str(&status.last().unwrap().data).unwrap();
        assert_eq!(last.status, OrderStatus::Complete);
        assert_eq!(last.completion_data.unwrap().user.personal_number, "199001011234");
        assert_eq!(events.last().unwrap().event, STATUS_EVENT);
    }

    #[tokio::test]
    async fn qr_refresh_stops_after_user_sign() {
        let fake = FakeBankId::spawn().await;
        let app = app(&fake, StreamFormat::Ndjson);

        let body = json!({"endUserIp": "127.0.0.1", "userVisibleData": "Sign this"});
        let response = app.oneshot(request("/bankid/v6/sign", body)).await.unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/x-json-stream"
        );
        let order_ref = fake.last_order().unwrap();
        fake.hint_after(&order_ref, 2, hint::USER_SIGN);
        fake.complete_after(&order_ref, 12);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let lines: Vec<Value> = body
            .split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_slice(line).unwrap())
            .collect();

        let signed_at = lines
            .iter()
            .position(|line| line["hintCode"] == hint::USER_SIGN)
            .unwrap();
        assert!(lines[signed_at..].iter().all(|line| line.get("qr").is_none()));
        assert_eq!(lines.last().unwrap()["status"], "complete");
    }

    #[tokio::test]
    async fn stream_gives_up_after_tick_budget() {
        let fake = FakeBankId::spawn().await;
        let app = app(&fake, StreamFormat::Sse);

        let response = app.oneshot(request("/bankid/v6/auth", auth_body())).await.unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let events = events(body.to_vec()).await;

        let qr_codes = events.iter().filter(|e| e.event == QRCODE_EVENT).count();
        assert_eq!(qr_codes, QR_TICKS as usize);
        assert!(events.iter().all(|e| e.event != ERROR_EVENT));
    }

    #[tokio::test]
    async fn watch_failure_emits_error_event() {
        let fake = FakeBankId::spawn().await;
        let app = app(&fake, StreamFormat::Sse);
        fake.fail_collect(true);

        let response = app.oneshot(request("/bankid/v6/auth", auth_body())).await.unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let events = events(body.to_vec()).await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event, ERROR_EVENT);
        let err: ErrorBody = serde_json::from_str(&events[1].data).unwrap();
        assert_eq!(err.origin, "BankIDv6");
        assert_eq!(err.code, "internalError");
    }

    #[tokio::test]
    async fn invalid_order_is_rejected_before_streaming() {
        let fake = FakeBankId::spawn().await;
        let app = app(&fake, StreamFormat::Sse);

        let (status, body) = call(&app, "/bankid/v6/sign", auth_body()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let err: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(err.detail, "bankid: invalid request: missing userVisibleData");
    }

    #[tokio::test]
    async fn collect_variants() {
        let fake = FakeBankId::spawn().await;
        let app = app(&fake, StreamFormat::Sse);
        let order_ref = fake.create_order();

        let (status, body) = call(&app, "/bankid/v6/collect", json!({"orderRef": order_ref})).await;
        assert_eq!(status, StatusCode::OK);
        let once: CollectResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(once.hint_code, hint::OUTSTANDING_TRANSACTION);

        fake.hint_after(&order_ref, 4, hint::USER_SIGN);
        let (_, body) = call(
            &app,
            "/bankid/v6/collect",
            json!({"orderRef": order_ref, "waitForChange": true}),
        )
        .await;
        let changed: CollectResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(changed.hint_code, hint::USER_SIGN);
        assert_eq!(changed.status, OrderStatus::Pending);

        fake.complete_after(&order_ref, 8);
        let (_, body) = call(
            &app,
            "/bankid/v6/collect",
            json!({"orderRef": order_ref, "waitUntilFinished": true}),
        )
        .await;
        let finished: CollectResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(finished.status, OrderStatus::Complete);
    }

    #[tokio::test]
    async fn change_races_with_cancel() {
        let fake = FakeBankId::spawn().await;
        let app = app(&fake, StreamFormat::Sse);
        let order_ref = fake.create_order();

        let change = call(&app, "/bankid/v6/change", json!({"orderRef": order_ref}));
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            call(&app, "/bankid/v6/cancel", json!({"orderRef": order_ref})).await
        };
        let ((status, body), (cancel_status, cancel_body)) = tokio::join!(change, cancel);

        assert_eq!(cancel_status, StatusCode::NO_CONTENT);
        assert!(cancel_body.is_empty());
        assert_eq!(status, StatusCode::OK);
        let changed: CollectResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(changed.status, OrderStatus::Failed);
        assert_eq!(changed.hint_code, hint::USER_CANCEL);
    }

    #[tokio::test]
    async fn missing_order_ref_is_bad_request() {
        let fake = FakeBankId::spawn().await;
        let app = app(&fake, StreamFormat::Sse);

        for uri in ["/bankid/v6/collect", "/bankid/v6/change", "/bankid/v6/cancel"] {
            let (status, _) = call(&app, uri, json!({})).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        }
        assert_eq!(fake.calls("/rp/v6.0/collect"), 0);
        assert_eq!(fake.calls("/rp/v6.0/cancel"), 0);
    }

    #[tokio::test]
    async fn disabled_bankid_is_not_found() {
        let app = router(AppState::default());
        let (status, body) = call(&app, "/bankid/v6/auth", auth_body()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let err: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(err.detail, "could not find eid provider BankID");
    }
}
