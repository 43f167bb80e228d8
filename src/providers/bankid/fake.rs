// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process BankID RP API used by tests.
//!
//! Orders start as `pending/outstandingTransaction`. Tests script hint and
//! completion transitions per collect call and read back call counts.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{
    models::{
        hint, AuthSignResponse, CollectResponse, CompletionData, Device, OrderStatus, StepUp, User,
    },
    BankIdClient, BankIdConfig,
};

pub const FAKE_POLL_INTERVAL: Duration = Duration::from_millis(10);
pub const FAKE_PERSONAL_NUMBER: &str = "199001011234";

#[derive(Debug, Clone)]
enum Step {
    Hint(String),
    Complete,
}

#[derive(Debug)]
struct FakeOrder {
    response: AuthSignResponse,
    status: OrderStatus,
    hint_code: String,
    collects: u32,
    script: Vec<(u32, Step)>,
}

impl FakeOrder {
    fn new() -> Self {
        Self {
            response: AuthSignResponse {
                order_ref: Uuid::new_v4().to_string(),
                auto_start_token: Uuid::new_v4().to_string(),
                qr_start_token: Uuid::new_v4().to_string(),
                qr_start_secret: Uuid::new_v4().to_string(),
            },
            status: OrderStatus::Pending,
            hint_code: hint::OUTSTANDING_TRANSACTION.to_string(),
            collects: 0,
            script: Vec::new(),
        }
    }

    fn apply(&mut self, step: Step) {
        if self.status != OrderStatus::Pending {
            return;
        }
        match step {
            Step::Hint(hint_code) => self.hint_code = hint_code,
            Step::Complete => {
                self.status = OrderStatus::Complete;
                self.hint_code = String::new();
            }
        }
    }

    fn collect(&mut self) -> CollectResponse {
        self.collects += 1;
        let collects = self.collects;
        let (due, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.script)
            .into_iter()
            .partition(|(at, _)| *at <= collects);
        self.script = rest;
        for (_, step) in due {
            self.apply(step);
        }

        CollectResponse {
            order_ref: self.response.order_ref.clone(),
            status: self.status,
            hint_code: self.hint_code.clone(),
            completion_data: (self.status == OrderStatus::Complete).then(completion_data),
        }
    }
}

fn completion_data() -> CompletionData {
    CompletionData {
        user: User {
            personal_number: FAKE_PERSONAL_NUMBER.to_string(),
            name: "Karl Karlsson".to_string(),
            given_name: "Karl".to_string(),
            surname: "Karlsson".to_string(),
        },
        device: Device {
            ip_address: "127.0.0.1".to_string(),
            uhi: "OZvYM9VvyiAmG7NA5jU5zqGcVpo=".to_string(),
        },
        bank_id_issue_date: "2020-02-01".to_string(),
        step_up: StepUp { mrtd: false },
        signature: "c2lnbmF0dXJl".to_string(),
        ocsp_response: "b2NzcA==".to_string(),
    }
}

#[derive(Default)]
struct FakeState {
    orders: HashMap<String, FakeOrder>,
    calls: HashMap<&'static str, usize>,
    last_order: Option<String>,
    fail_collect: bool,
}

type Shared = Arc<Mutex<FakeState>>;

pub struct FakeBankId {
    addr: SocketAddr,
    state: Shared,
}

impl FakeBankId {
    pub async fn spawn() -> Self {
        let state: Shared = Arc::default();
        let app = Router::new()
            .route("/", axum::routing::get(|| async { "ok" }))
            .route("/rp/v6.0/auth", post(auth))
            .route("/rp/v6.0/sign", post(sign))
            .route("/rp/v6.0/collect", post(collect))
            .route("/rp/v6.0/cancel", post(cancel))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn config(&self) -> BankIdConfig {
        BankIdConfig {
            base_url: self.url(),
            poll_interval: FAKE_POLL_INTERVAL,
            ..BankIdConfig::default()
        }
    }

    pub fn client(&self) -> BankIdClient {
        BankIdClient::new(&self.config()).unwrap()
    }

    /// Register an order without going through the auth endpoint.
    pub fn create_order(&self) -> String {
        let order = FakeOrder::new();
        let order_ref = order.response.order_ref.clone();
        self.state.lock().unwrap().orders.insert(order_ref.clone(), order);
        order_ref
    }

    pub fn order(&self, order_ref: &str) -> Option<AuthSignResponse> {
        let state = self.state.lock().unwrap();
        state.orders.get(order_ref).map(|o| o.response.clone())
    }

    /// Most recent order started through auth or sign.
    pub fn last_order(&self) -> Option<String> {
        self.state.lock().unwrap().last_order.clone()
    }

    pub fn complete(&self, order_ref: &str) {
        self.with_order(order_ref, |order| order.apply(Step::Complete));
    }

    /// Complete the order on its `collect_no`th collect call, or the next one
    /// if that call already happened.
    pub fn complete_after(&self, order_ref: &str, collect_no: u32) {
        self.with_order(order_ref, |order| order.script.push((collect_no, Step::Complete)));
    }

    /// Switch the hint code on the order's `collect_no`th collect call.
    pub fn hint_after(&self, order_ref: &str, collect_no: u32, hint_code: &str) {
        let step = Step::Hint(hint_code.to_string());
        self.with_order(order_ref, |order| order.script.push((collect_no, step)));
    }

    pub fn fail_collect(&self, fail: bool) {
        self.state.lock().unwrap().fail_collect = fail;
    }

    pub fn calls(&self, path: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.calls.get(path).copied().unwrap_or_default()
    }

    fn with_order(&self, order_ref: &str, f: impl FnOnce(&mut FakeOrder)) {
        let mut state = self.state.lock().unwrap();
        let order = state.orders.get_mut(order_ref).expect("unknown fake order");
        f(order);
    }
}

type Reply = (StatusCode, Json<Value>);

fn invalid_parameters(details: &str) -> Reply {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"errorCode": "invalidParameters", "details": details})),
    )
}

fn start_order(state: &Shared, path: &'static str, body: &Value) -> Reply {
    let mut state = state.lock().unwrap();
    *state.calls.entry(path).or_default() += 1;
    if body["endUserIp"].as_str().unwrap_or_default().is_empty() {
        return invalid_parameters("Invalid endUserIp");
    }
    let order = FakeOrder::new();
    let response = json!(order.response);
    state.last_order = Some(order.response.order_ref.clone());
    state.orders.insert(order.response.order_ref.clone(), order);
    (StatusCode::OK, Json(response))
}

async fn auth(State(state): State<Shared>, Json(body): Json<Value>) -> Reply {
    start_order(&state, "/rp/v6.0/auth", &body)
}

async fn sign(State(state): State<Shared>, Json(body): Json<Value>) -> Reply {
    start_order(&state, "/rp/v6.0/sign", &body)
}

async fn collect(State(state): State<Shared>, Json(body): Json<Value>) -> Reply {
    let mut state = state.lock().unwrap();
    *state.calls.entry("/rp/v6.0/collect").or_default() += 1;
    if state.fail_collect {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"errorCode": "internalError", "details": "collect failed"})),
        );
    }
    let order_ref = body["orderRef"].as_str().unwrap_or_default();
    match state.orders.get_mut(order_ref) {
        Some(order) => (StatusCode::OK, Json(json!(order.collect()))),
        None => invalid_parameters("No such order"),
    }
}

async fn cancel(State(state): State<Shared>, Json(body): Json<Value>) -> Reply {
    let mut state = state.lock().unwrap();
    *state.calls.entry("/rp/v6.0/cancel").or_default() += 1;
    let order_ref = body["orderRef"].as_str().unwrap_or_default();
    match state.orders.get_mut(order_ref) {
        Some(order) if order.status == OrderStatus::Pending => {
            order.status = OrderStatus::Failed;
            order.hint_code = hint::USER_CANCEL.to_string();
            (StatusCode::OK, Json(json!({})))
        }
        _ => invalid_parameters("No such order"),
    }
}
