// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Freja eID REST API integration.
//!
//! - [`FrejaClient`]: raw init/getOneResult/getResults/cancel calls over mTLS
//! - `poller`: one batch poller per mode delivering final results to waiters
//! - [`FrejaProvider`]: the eID adapter mapping Freja onto the common model

use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use reqwest::{header::CONTENT_TYPE, Client};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{eid::ErrorKind, models::Mode};

use super::mtls::{self, MtlsError, TlsMaterial};

mod adapter;
pub mod models;
mod poller;

#[cfg(test)]
pub(crate) mod fake;

pub use adapter::{map_status, FrejaProvider, NAME};
pub use poller::{next_sleep, IDLE_POLL_INTERVAL, SEEN_RETENTION};

use models::{
    endpoints, error_description, AuthRequest, ErrorBody, OrderResult, RegistrationLevel,
    SignRequest,
};

pub const DEFAULT_TEST_URL: &str = "https://services.test.frejaeid.com";
pub const DEFAULT_PROD_URL: &str = "https://services.prod.frejaeid.com";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, thiserror::Error)]
pub enum FrejaError {
    #[error("freja: invalid request: {0}")]
    Validation(String),

    #[error("freja: got code {code}, {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("freja: request failed: {0}")]
    Request(String),

    #[error("freja: response was invalid: {0}")]
    InvalidResponse(String),

    #[error("freja: JWS verification failed: {0}")]
    Jws(String),

    #[error("freja: configuration error: {0}")]
    Config(String),

    #[error("freja: poller is not running")]
    PollerStopped,

    #[error("freja: operation cancelled by caller")]
    Cancelled,
}

impl From<MtlsError> for FrejaError {
    fn from(err: MtlsError) -> Self {
        FrejaError::Config(err.to_string())
    }
}

impl FrejaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FrejaError::Validation(_) => ErrorKind::Validation,
            FrejaError::Api { .. } => ErrorKind::Vendor,
            FrejaError::Request(_) => ErrorKind::Transport,
            FrejaError::InvalidResponse(_) | FrejaError::Jws(_) => ErrorKind::InvalidResponse,
            FrejaError::Config(_) | FrejaError::PollerStopped => ErrorKind::Internal,
            FrejaError::Cancelled => ErrorKind::Cancelled,
        }
    }

    fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(err) if !err.code.is_null() => {
                let code = err.code();
                let message = match (err.message.is_empty(), code.and_then(error_description)) {
                    (true, Some(description)) => description.to_string(),
                    _ => err.message,
                };
                FrejaError::Api {
                    status,
                    code: code.map(|c| c.to_string()).unwrap_or_else(|| err.code.to_string()),
                    message,
                }
            }
            _ => FrejaError::Api {
                status,
                code: String::new(),
                message: body.to_string(),
            },
        }
    }

    /// Freja code of an API error, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            FrejaError::Api { code, .. } if !code.is_empty() => Some(code),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrejaConfig {
    pub base_url: String,
    pub tls: TlsMaterial,
    /// PEM encoded RSA public key used to verify result JWS.
    pub jws_public_key_pem: Option<Vec<u8>>,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub registration_level: RegistrationLevel,
}

impl Default for FrejaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_TEST_URL.to_string(),
            tls: TlsMaterial::default(),
            jws_public_key_pem: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: mtls::DEFAULT_REQUEST_TIMEOUT,
            registration_level: RegistrationLevel::default(),
        }
    }
}

#[derive(Clone)]
pub struct FrejaClient {
    base_url: String,
    poll_interval: Duration,
    registration_level: RegistrationLevel,
    jws_key: Option<DecodingKey>,
    http: Client,
}

impl std::fmt::Debug for FrejaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrejaClient")
            .field("base_url", &self.base_url)
            .field("poll_interval", &self.poll_interval)
            .field("registration_level", &self.registration_level)
            .field("verifies_jws", &self.jws_key.is_some())
            .finish()
    }
}

impl FrejaClient {
    pub fn new(config: &FrejaConfig) -> Result<Self, FrejaError> {
        let http = mtls::build_client(&config.tls, config.request_timeout)?;
        let jws_key = config
            .jws_public_key_pem
            .as_deref()
            .map(DecodingKey::from_rsa_pem)
            .transpose()
            .map_err(|e| FrejaError::Config(format!("invalid JWS public key: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            poll_interval: config.poll_interval,
            registration_level: config.registration_level,
            jws_key,
            http,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn registration_level(&self) -> RegistrationLevel {
        self.registration_level
    }

    pub async fn ping(&self) -> Result<(), FrejaError> {
        self.http
            .get(&self.base_url)
            .send()
            .await
            .map_err(|e| FrejaError::Request(e.to_string()))?;
        Ok(())
    }

    /// Start an authentication order and return its `authRef`.
    pub async fn init_auth(&self, request: &AuthRequest) -> Result<String, FrejaError> {
        let ep = endpoints(Mode::Auth);
        let body = models::encode_body(ep.init_request, request)?;
        let reply: Value = self.post(ep.init, body).await?;
        reference_of(&reply, ep.ref_key)
    }

    /// Start a signature order and return its `signRef`.
    pub async fn init_sign(&self, request: &SignRequest) -> Result<String, FrejaError> {
        request.validate()?;
        let ep = endpoints(Mode::Sign);
        let body = models::encode_body(ep.init_request, request)?;
        let reply: Value = self.post(ep.init, body).await?;
        reference_of(&reply, ep.ref_key)
    }

    pub async fn get_one_result(
        &self,
        mode: Mode,
        reference: &str,
    ) -> Result<OrderResult, FrejaError> {
        let ep = endpoints(mode);
        let body = models::encode_body(ep.one_result_request, &ref_body(ep.ref_key, reference)?)?;
        self.post(ep.one_result, body).await
    }

    /// Every result the relying party initiated within the last ten minutes.
    pub async fn get_results(&self, mode: Mode) -> Result<Vec<OrderResult>, FrejaError> {
        let ep = endpoints(mode);
        let body = models::encode_body(ep.results_request, &json!({"includePrevious": "ALL"}))?;
        let mut reply: Value = self.post(ep.results, body).await?;
        let results = reply
            .get_mut(ep.results_field)
            .map(Value::take)
            .unwrap_or_else(|| json!([]));
        serde_json::from_value(results).map_err(|e| FrejaError::InvalidResponse(e.to_string()))
    }

    pub async fn cancel(&self, mode: Mode, reference: &str) -> Result<(), FrejaError> {
        let ep = endpoints(mode);
        let body = models::encode_body(ep.cancel_request, &ref_body(ep.ref_key, reference)?)?;
        self.post::<serde::de::IgnoredAny>(ep.cancel, body)
            .await
            .map(|_| ())
    }

    /// Check the result JWS against the configured key. Passes everything
    /// through when no key is configured.
    pub fn verify(&self, result: &OrderResult) -> Result<(), FrejaError> {
        let Some(key) = &self.jws_key else {
            return Ok(());
        };
        let mut validation = Validation::new(Algorithm::RS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_aud = false;
        jsonwebtoken::decode::<Value>(&result.details, key, &validation)
            .map(|_| ())
            .map_err(|e| FrejaError::Jws(e.to_string()))
    }

    async fn post<Res: DeserializeOwned>(&self, path: &str, body: String) -> Result<Res, FrejaError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "text")
            .body(body)
            .send()
            .await
            .map_err(|e| FrejaError::Request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| FrejaError::Request(e.to_string()))?;
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), body = %text, "Freja returned an error");
            return Err(FrejaError::from_response(status.as_u16(), &text));
        }

        debug!(url = %url, "Freja request succeeded");
        // cancel replies with an empty body
        let text = if text.trim().is_empty() { "{}" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| FrejaError::InvalidResponse(e.to_string()))
    }
}

fn ref_body(ref_key: &str, reference: &str) -> Result<Value, FrejaError> {
    if reference.is_empty() {
        return Err(FrejaError::Validation(format!("{ref_key} is required")));
    }
    Ok(json!({ ref_key: reference }))
}

fn reference_of(reply: &Value, ref_key: &str) -> Result<String, FrejaError> {
    reply
        .get(ref_key)
        .and_then(Value::as_str)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .ok_or_else(|| FrejaError::InvalidResponse(format!("missing {ref_key}")))
}
