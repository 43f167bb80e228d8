// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Common eID Data Models
//!
//! The provider-agnostic vocabulary shared by every adapter and by the HTTP
//! surface. All types derive `Serialize`, `Deserialize`, and `ToSchema`.
//!
//! ## Order Lifecycle
//!
//! - [`Req`]: what the caller wants (provider, subject, optional payload)
//! - [`Inter`]: the provider's acknowledgment of an initiated order. The caller
//!   owns it and hands it back on every peek/collect/cancel/change call.
//! - [`Resp`]: the result of a poll, carrying a [`Status`]
//!
//! Binary fields (`Payload.data`, `Resp.signature`) are base64 on the wire.

use std::{fmt, net::IpAddr, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

// =============================================================================
// Request
// =============================================================================

/// Selects the adapter an order is routed to.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Provider {
    /// Registered provider name, e.g. `BankID` or `FrejaID`.
    pub name: String,
}

/// The subject of an order. Also used as the user info of an approved [`Resp`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(default)]
pub struct Who {
    /// Identify the user by scanning a QR code or following a deep link.
    pub inferred: bool,
    pub ssn: String,
    /// ISO-3166 alpha-2 country code of `ssn`.
    pub ssn_country: String,
    pub email: String,
    pub phone: String,
    pub name: String,
    pub surname: String,
    /// End-user IP address as seen by the relying party.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, example = "127.0.0.1")]
    pub ip: Option<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
}

impl Who {
    /// True when no subject identifier was supplied.
    pub fn is_anonymous(&self) -> bool {
        self.ssn.is_empty() && self.email.is_empty() && self.phone.is_empty()
    }
}

/// Data presented to and signed by the user.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(default)]
pub struct Payload {
    /// Human-visible text.
    pub text: String,
    /// Opaque bytes, preferably a document digest.
    #[serde(with = "base64_bytes")]
    #[schema(value_type = String, format = Byte)]
    pub data: Vec<u8>,
}

/// A caller's intent to authenticate or sign.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Req {
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub who: Option<Who>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl Req {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: Provider {
                name: provider.into(),
            },
            ..Self::default()
        }
    }

    fn who_mut(&mut self) -> &mut Who {
        self.who.get_or_insert_with(Who::default)
    }

    fn payload_mut(&mut self) -> &mut Payload {
        self.payload.get_or_insert_with(Payload::default)
    }

    pub fn inferred(mut self) -> Self {
        self.who_mut().inferred = true;
        self
    }

    pub fn ip(mut self, ip: IpAddr) -> Self {
        self.who_mut().ip = Some(ip);
        self
    }

    pub fn ssn(mut self, ssn: impl Into<String>, country: impl Into<String>) -> Self {
        let who = self.who_mut();
        who.ssn = ssn.into();
        who.ssn_country = country.into();
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.who_mut().email = email.into();
        self
    }

    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.who_mut().phone = phone.into();
        self
    }

    pub fn sign_text(mut self, text: impl Into<String>) -> Self {
        self.payload_mut().text = text.into();
        self
    }

    pub fn sign_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.payload_mut().data = data.into();
        self
    }
}

// =============================================================================
// Intermediate
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    Auth,
    Sign,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Auth => f.write_str("AUTH"),
            Mode::Sign => f.write_str("SIGN"),
        }
    }
}

/// An initiated order, as acknowledged by the provider.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Inter {
    pub req: Req,
    pub mode: Mode,
    /// Provider-assigned order reference.
    #[serde(rename = "ref")]
    pub reference: String,
    /// Short-lived token used to build a QR payload or deep link.
    #[serde(default)]
    pub inferred: String,
    /// Deep link that starts the authenticator app.
    #[serde(rename = "URI", default)]
    pub uri: String,
}

impl Inter {
    pub fn provider_name(&self) -> &str {
        &self.req.provider.name
    }
}

// =============================================================================
// Status
// =============================================================================

/// Provider-agnostic order status.
///
/// `ONGOING` means the user has engaged with the authenticator; `PENDING`
/// means nothing has happened yet.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[default]
    Unknown,
    Pending,
    Ongoing,
    Approved,
    Canceled,
    RpCanceled,
    Expired,
    Rejected,
    Failed,
    StartFailed,
}

impl Status {
    pub const ALL: [Status; 10] = [
        Status::Unknown,
        Status::Pending,
        Status::Ongoing,
        Status::Approved,
        Status::Canceled,
        Status::RpCanceled,
        Status::Expired,
        Status::Rejected,
        Status::Failed,
        Status::StartFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unknown => "UNKNOWN",
            Status::Pending => "PENDING",
            Status::Ongoing => "ONGOING",
            Status::Approved => "APPROVED",
            Status::Canceled => "CANCELED",
            Status::RpCanceled => "RP_CANCELED",
            Status::Expired => "EXPIRED",
            Status::Rejected => "REJECTED",
            Status::Failed => "FAILED",
            Status::StartFailed => "START_FAILED",
        }
    }

    /// True once the vendor will not move the order any further.
    pub fn is_final(&self) -> bool {
        !matches!(self, Status::Unknown | Status::Pending | Status::Ongoing)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

// =============================================================================
// Response
// =============================================================================

/// The result of a poll. `info` and `signature` are only populated when
/// `status` is `APPROVED`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Resp {
    pub inter: Inter,
    pub status: Status,
    #[serde(default)]
    pub info: Who,
    #[serde(default, with = "base64_bytes")]
    #[schema(value_type = String, format = Byte)]
    pub signature: Vec<u8>,
    /// Provider-specific extras.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    #[schema(value_type = Object)]
    pub extra: Map<String, Value>,
}

impl Resp {
    /// A response without user info, for every status but `APPROVED`.
    pub fn without_info(inter: Inter, status: Status) -> Self {
        Self {
            inter,
            status,
            info: Who::default(),
            signature: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// Names of the configured providers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProvidersResponse {
    pub providers: Vec<String>,
}

// =============================================================================
// Serde helpers
// =============================================================================

pub(crate) mod base64_bytes {
    use base64ct::{Base64, Encoding};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&Base64::encode_string(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Base64::decode_vec(&encoded).map_err(de::Error::custom)
    }
}
