// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! BankID relying-party API (v6.0) integration.
//!
//! - [`BankIdClient`]: raw auth/sign/collect/cancel calls over mTLS
//! - `poll`: collect, change and watch loops built on the raw calls
//! - [`BankIdProvider`]: the eID adapter mapping BankID onto the common model

use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::eid::ErrorKind;

use super::mtls::{self, MtlsError, TlsMaterial};

mod adapter;
pub mod models;
mod poll;

#[cfg(test)]
pub(crate) mod fake;

pub use adapter::{map_status, BankIdProvider, NAME};
pub use poll::Change;

use models::{
    AuthSignRequest, AuthSignResponse, CancelRequest, CollectRequest, CollectResponse, ErrorBody,
};

pub const DEFAULT_TEST_URL: &str = "https://appapi2.test.bankid.com";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const AUTH_PATH: &str = "/rp/v6.0/auth";
const SIGN_PATH: &str = "/rp/v6.0/sign";
const COLLECT_PATH: &str = "/rp/v6.0/collect";
const CANCEL_PATH: &str = "/rp/v6.0/cancel";

#[derive(Debug, thiserror::Error)]
pub enum BankIdError {
    #[error("bankid: invalid request: {0}")]
    Validation(String),

    #[error("bankid: {error_code}, {details}")]
    Api {
        status: u16,
        error_code: String,
        details: String,
    },

    #[error("bankid: request failed: {0}")]
    Request(String),

    #[error("bankid: response was invalid: {0}")]
    InvalidResponse(String),

    #[error("bankid: configuration error: {0}")]
    Config(#[from] MtlsError),

    #[error("bankid: operation cancelled by caller")]
    Cancelled,
}

impl BankIdError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BankIdError::Validation(_) => ErrorKind::Validation,
            BankIdError::Api { .. } => ErrorKind::Vendor,
            BankIdError::Request(_) => ErrorKind::Transport,
            BankIdError::InvalidResponse(_) => ErrorKind::InvalidResponse,
            BankIdError::Config(_) => ErrorKind::Internal,
            BankIdError::Cancelled => ErrorKind::Cancelled,
        }
    }

    fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(err) if !err.error_code.is_empty() => BankIdError::Api {
                status,
                error_code: err.error_code,
                details: err.details,
            },
            _ => BankIdError::Api {
                status,
                error_code: String::new(),
                details: body.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct BankIdConfig {
    pub base_url: String,
    pub tls: TlsMaterial,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for BankIdConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_TEST_URL.to_string(),
            tls: TlsMaterial::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: mtls::DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BankIdClient {
    base_url: String,
    poll_interval: Duration,
    http: Client,
}

impl BankIdClient {
    pub fn new(config: &BankIdConfig) -> Result<Self, BankIdError> {
        let http = mtls::build_client(&config.tls, config.request_timeout)?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            poll_interval: config.poll_interval,
            http,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub async fn ping(&self) -> Result<(), BankIdError> {
        self.http
            .get(&self.base_url)
            .send()
            .await
            .map_err(|e| BankIdError::Request(e.to_string()))?;
        Ok(())
    }

    pub async fn auth(&self, request: &AuthSignRequest) -> Result<AuthSignResponse, BankIdError> {
        request.validate_auth()?;
        self.post(AUTH_PATH, request).await
    }

    pub async fn sign(&self, request: &AuthSignRequest) -> Result<AuthSignResponse, BankIdError> {
        request.validate_sign()?;
        self.post(SIGN_PATH, request).await
    }

    /// Single status read for an order.
    pub async fn collect_once(&self, order_ref: &str) -> Result<CollectResponse, BankIdError> {
        let request = CollectRequest::new(order_ref);
        request.validate()?;
        self.post(COLLECT_PATH, &request).await
    }

    pub async fn cancel(&self, order_ref: &str) -> Result<(), BankIdError> {
        let request = CancelRequest::new(order_ref);
        request.validate()?;
        self.post::<_, serde::de::IgnoredAny>(CANCEL_PATH, &request)
            .await
            .map(|_| ())
    }

    async fn post<Req, Res>(&self, path: &str, body: &Req) -> Result<Res, BankIdError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| BankIdError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(url = %url, status = status.as_u16(), body = %text, "BankID returned an error");
            return Err(BankIdError::from_response(status.as_u16(), &text));
        }

        debug!(url = %url, "BankID request succeeded");
        response
            .json::<Res>()
            .await
            .map_err(|e| BankIdError::InvalidResponse(e.to_string()))
    }
}
