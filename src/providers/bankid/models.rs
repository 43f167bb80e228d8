// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! BankID RP API v6 wire types.

use base64ct::{Base64, Encoding};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;
use utoipa::ToSchema;

use super::BankIdError;

type HmacSha256 = Hmac<Sha256>;

pub const AUTH_VISIBLE_DATA_MAX: usize = 1_500;
pub const AUTH_NON_VISIBLE_DATA_MAX: usize = 1_500;
pub const SIGN_VISIBLE_DATA_MAX: usize = 40_000;
pub const SIGN_NON_VISIBLE_DATA_MAX: usize = 200_000;
pub const SIMPLE_MARKDOWN_V1: &str = "simpleMarkdownV1";

// =============================================================================
// Auth / Sign
// =============================================================================

/// Requirements on the user or device that may approve the order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pin_code: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub mrtd: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub card_reader: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificate_policies: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub personal_number: String,
}

impl Requirement {
    fn is_empty(&self) -> bool {
        *self == Requirement::default()
    }
}

/// Auth or sign order. Fields hold the raw text or bytes and are base64
/// encoded when serialized towards BankID.
#[derive(Debug, Clone, Default, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSignRequest {
    /// The user IP address as seen by the relying party. Required.
    pub end_user_ip: String,
    pub requirement: Requirement,
    /// Text displayed to the user during the order.
    pub user_visible_data: String,
    /// Opaque data included in the signature but not displayed. Accepted as
    /// plain text over HTTP.
    #[serde(deserialize_with = "text_bytes")]
    #[schema(value_type = String)]
    pub user_non_visible_data: Vec<u8>,
    /// Empty (plain text) or `simpleMarkdownV1`.
    pub user_visible_data_format: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireAuthSignRequest<'a> {
    end_user_ip: &'a str,
    #[serde(skip_serializing_if = "Requirement::is_empty")]
    requirement: &'a Requirement,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_visible_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_non_visible_data: Option<String>,
    #[serde(skip_serializing_if = "str::is_empty")]
    user_visible_data_format: &'a str,
}

fn text_bytes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    Ok(String::deserialize(deserializer)?.into_bytes())
}

fn encode_non_empty(data: &[u8]) -> Option<String> {
    (!data.is_empty()).then(|| Base64::encode_string(data))
}

impl Serialize for AuthSignRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireAuthSignRequest {
            end_user_ip: &self.end_user_ip,
            requirement: &self.requirement,
            user_visible_data: encode_non_empty(self.user_visible_data.as_bytes()),
            user_non_visible_data: encode_non_empty(&self.user_non_visible_data),
            user_visible_data_format: &self.user_visible_data_format,
        }
        .serialize(serializer)
    }
}

fn encoded_len(data: &[u8]) -> usize {
    Base64::encoded_len(data)
}

impl AuthSignRequest {
    pub fn validate_auth(&self) -> Result<(), BankIdError> {
        self.validate_common()?;
        if encoded_len(self.user_visible_data.as_bytes()) > AUTH_VISIBLE_DATA_MAX {
            return Err(BankIdError::Validation(format!(
                "userVisibleData is more than {AUTH_VISIBLE_DATA_MAX} characters long"
            )));
        }
        if encoded_len(&self.user_non_visible_data) > AUTH_NON_VISIBLE_DATA_MAX {
            return Err(BankIdError::Validation(format!(
                "userNonVisibleData is more than {AUTH_NON_VISIBLE_DATA_MAX} characters long"
            )));
        }
        Ok(())
    }

    pub fn validate_sign(&self) -> Result<(), BankIdError> {
        self.validate_common()?;
        if self.user_visible_data.is_empty() {
            return Err(BankIdError::Validation(
                "missing userVisibleData".to_string(),
            ));
        }
        if encoded_len(self.user_visible_data.as_bytes()) > SIGN_VISIBLE_DATA_MAX {
            return Err(BankIdError::Validation(format!(
                "userVisibleData is more than {SIGN_VISIBLE_DATA_MAX} characters long"
            )));
        }
        if encoded_len(&self.user_non_visible_data) > SIGN_NON_VISIBLE_DATA_MAX {
            return Err(BankIdError::Validation(format!(
                "userNonVisibleData is more than {SIGN_NON_VISIBLE_DATA_MAX} characters long"
            )));
        }
        Ok(())
    }

    fn validate_common(&self) -> Result<(), BankIdError> {
        if self.end_user_ip.is_empty() {
            return Err(BankIdError::Validation("missing ip address".to_string()));
        }
        if !self.user_visible_data_format.is_empty()
            && self.user_visible_data_format != SIMPLE_MARKDOWN_V1
        {
            return Err(BankIdError::Validation(
                "invalid userVisibleDataFormat".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthSignResponse {
    pub order_ref: String,
    pub auto_start_token: String,
    #[serde(default)]
    pub qr_start_token: String,
    #[serde(default)]
    pub qr_start_secret: String,
}

impl AuthSignResponse {
    /// Animated QR payload for `seconds` elapsed since the order was created:
    /// `bankid.{qrStartToken}.{seconds}.{hex(HMAC-SHA256(qrStartSecret, seconds))}`.
    pub fn qr_code(&self, seconds: u64) -> String {
        qr_code(&self.qr_start_token, &self.qr_start_secret, seconds)
    }
}

pub fn qr_code(qr_start_token: &str, qr_start_secret: &str, seconds: u64) -> String {
    let time = seconds.to_string();
    let mut mac = HmacSha256::new_from_slice(qr_start_secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(time.as_bytes());
    let auth_code = hex::encode(mac.finalize().into_bytes());
    format!("bankid.{qr_start_token}.{time}.{auth_code}")
}

// =============================================================================
// Collect / Cancel / Change
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    #[serde(default)]
    pub order_ref: String,
}

impl OrderRequest {
    pub fn new(order_ref: impl Into<String>) -> Self {
        Self {
            order_ref: order_ref.into(),
        }
    }

    pub fn validate(&self) -> Result<(), BankIdError> {
        if self.order_ref.is_empty() {
            return Err(BankIdError::Validation("missing order ref".to_string()));
        }
        Ok(())
    }
}

pub type CollectRequest = OrderRequest;
pub type CancelRequest = OrderRequest;

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRequest {
    #[serde(default)]
    pub order_ref: String,
    /// Ignore hint-code changes and wait until the order is complete or failed.
    #[serde(default, rename = "onFinished")]
    pub wait_until_finished: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Complete,
    Failed,
    #[default]
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, OrderStatus::Complete | OrderStatus::Failed)
    }
}

pub mod hint {
    pub const OUTSTANDING_TRANSACTION: &str = "outstandingTransaction";
    pub const NO_CLIENT: &str = "noClient";
    pub const STARTED: &str = "started";
    pub const USER_MRTD: &str = "userMrtd";
    pub const USER_CALL_CONFIRM: &str = "userCallConfirm";
    pub const USER_SIGN: &str = "userSign";

    pub const EXPIRED_TRANSACTION: &str = "expiredTransaction";
    pub const CERTIFICATE_ERR: &str = "certificateErr";
    pub const USER_CANCEL: &str = "userCancel";
    pub const CANCELLED: &str = "cancelled";
    pub const START_FAILED: &str = "startFailed";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CollectResponse {
    pub order_ref: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub hint_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_data: Option<CompletionData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletionData {
    pub user: User,
    pub device: Device,
    pub bank_id_issue_date: String,
    pub step_up: StepUp,
    pub signature: String,
    pub ocsp_response: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    pub personal_number: String,
    pub name: String,
    pub given_name: String,
    pub surname: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Device {
    pub ip_address: String,
    pub uhi: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(default)]
pub struct StepUp {
    pub mrtd: bool,
}

/// Error body returned by BankID on non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorBody {
    pub error_code: String,
    pub details: String,
}
