// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Freja eID REST API request and response types.
//!
//! Freja takes `<requestName>=<base64(json)>` bodies rather than plain JSON;
//! [`encode_body`] builds them.

use base64ct::{Base64, Encoding};
use serde::{ser::SerializeStruct, Deserialize, Serialize, Serializer};
use serde_json::Value;

use super::FrejaError;
use crate::models::Mode;

/// Maximum plain-text length of the text to sign, before encoding.
pub const SIGN_TEXT_MAX_CHARS: usize = 4096;
/// Maximum size of the binary data to sign.
pub const SIGN_BINARY_MAX_BYTES: usize = 5 * 1024 * 1024;
pub const SIGN_TITLE_MAX_CHARS: usize = 128;

/// `userInfo` value for QR-code based authentication.
pub const INFERRED_USER_INFO: &str = "N/A";

/// Build a Freja form-like body: `name=base64(json(value))`.
pub fn encode_body<T: Serialize>(name: &str, value: &T) -> Result<String, FrejaError> {
    let json = serde_json::to_vec(value).map_err(|e| FrejaError::Validation(e.to_string()))?;
    Ok(format!("{name}={}", Base64::encode_string(&json)))
}

/// Per-mode endpoint paths and request names.
#[derive(Debug, Clone, Copy)]
pub struct Endpoints {
    pub init: &'static str,
    pub init_request: &'static str,
    pub results: &'static str,
    pub results_request: &'static str,
    pub results_field: &'static str,
    pub one_result: &'static str,
    pub one_result_request: &'static str,
    pub cancel: &'static str,
    pub cancel_request: &'static str,
    /// JSON key carrying the order reference (`authRef` / `signRef`).
    pub ref_key: &'static str,
}

pub const AUTH_ENDPOINTS: Endpoints = Endpoints {
    init: "/authentication/1.0/initAuthentication",
    init_request: "initAuthRequest",
    results: "/authentication/1.0/getResults",
    results_request: "getAuthResultsRequest",
    results_field: "authenticationResults",
    one_result: "/authentication/1.0/getOneResult",
    one_result_request: "getOneAuthResultRequest",
    cancel: "/authentication/1.0/cancel",
    cancel_request: "cancelAuthRequest",
    ref_key: "authRef",
};

pub const SIGN_ENDPOINTS: Endpoints = Endpoints {
    init: "/sign/1.0/initSignature",
    init_request: "initSignRequest",
    results: "/sign/1.0/getResults",
    results_request: "getSignResultsRequest",
    results_field: "signatureResults",
    one_result: "/sign/1.0/getOneResult",
    one_result_request: "getOneSignResultRequest",
    cancel: "/sign/1.0/cancel",
    cancel_request: "cancelSignRequest",
    ref_key: "signRef",
};

pub fn endpoints(mode: Mode) -> &'static Endpoints {
    match mode {
        Mode::Auth => &AUTH_ENDPOINTS,
        Mode::Sign => &SIGN_ENDPOINTS,
    }
}

// =============================================================================
// Subject
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserInfoType {
    Phone,
    Email,
    Ssn,
    Inferred,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ssn {
    pub country: String,
    pub ssn: String,
}

/// Who the order is addressed to. SSN user info is the base64 of an [`Ssn`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub user_info_type: UserInfoType,
    pub user_info: String,
}

impl Subject {
    pub fn inferred() -> Self {
        Self {
            user_info_type: UserInfoType::Inferred,
            user_info: INFERRED_USER_INFO.to_string(),
        }
    }

    pub fn email(email: &str) -> Self {
        Self {
            user_info_type: UserInfoType::Email,
            user_info: email.to_string(),
        }
    }

    pub fn phone(phone: &str) -> Self {
        Self {
            user_info_type: UserInfoType::Phone,
            user_info: phone.to_string(),
        }
    }

    pub fn ssn(country: &str, ssn: &str) -> Result<Self, FrejaError> {
        let json = serde_json::to_vec(&Ssn {
            country: country.to_uppercase(),
            ssn: ssn.to_string(),
        })
        .map_err(|e| FrejaError::Validation(e.to_string()))?;
        Ok(Self {
            user_info_type: UserInfoType::Ssn,
            user_info: Base64::encode_string(&json),
        })
    }
}

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RegistrationLevel {
    Basic,
    #[default]
    Extended,
    Plus,
}

impl std::str::FromStr for RegistrationLevel {
    type Err = FrejaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BASIC" => Ok(Self::Basic),
            "EXTENDED" => Ok(Self::Extended),
            "PLUS" => Ok(Self::Plus),
            other => Err(FrejaError::Validation(format!(
                "unknown registration level {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeName {
    BasicUserInfo,
    EmailAddress,
    DateOfBirth,
    Ssn,
    RelyingPartyUserId,
    IntegratorSpecificUserId,
    CustomIdentifier,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attribute {
    pub attribute: AttributeName,
}

/// Attributes requested for every order.
pub fn default_attributes() -> Vec<Attribute> {
    [
        AttributeName::BasicUserInfo,
        AttributeName::Ssn,
        AttributeName::DateOfBirth,
        AttributeName::EmailAddress,
    ]
    .into_iter()
    .map(|attribute| Attribute { attribute })
    .collect()
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    #[serde(flatten)]
    pub subject: Subject,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes_to_return: Vec<Attribute>,
    pub min_registration_level: RegistrationLevel,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignatureType {
    Simple,
    Extended,
}

/// Text shown to and signed by the user, plus optional hidden bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataToSign {
    pub text: String,
    pub binary_data: Vec<u8>,
}

impl Serialize for DataToSign {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = if self.binary_data.is_empty() { 1 } else { 2 };
        let mut state = serializer.serialize_struct("DataToSign", fields)?;
        state.serialize_field("text", &Base64::encode_string(self.text.as_bytes()))?;
        if !self.binary_data.is_empty() {
            state.serialize_field("binaryData", &Base64::encode_string(&self.binary_data))?;
        }
        state.end()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushNotification {
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
    #[serde(flatten)]
    pub subject: Subject,
    pub min_registration_level: RegistrationLevel,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_notification: Option<PushNotification>,
    /// Milliseconds since the epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
    pub signature_type: SignatureType,
    pub data_to_sign_type: &'static str,
    pub data_to_sign: DataToSign,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes_to_return: Vec<Attribute>,
}

impl SignRequest {
    /// Signature and data types follow from whether binary data is present.
    pub fn new(subject: Subject, data_to_sign: DataToSign) -> Self {
        let (signature_type, data_to_sign_type) = if data_to_sign.binary_data.is_empty() {
            (SignatureType::Simple, "SIMPLE_UTF8_TEXT")
        } else {
            (SignatureType::Extended, "EXTENDED_UTF8_TEXT")
        };
        Self {
            subject,
            min_registration_level: RegistrationLevel::default(),
            title: String::new(),
            push_notification: None,
            expiry: None,
            signature_type,
            data_to_sign_type,
            data_to_sign,
            attributes_to_return: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), FrejaError> {
        if self.subject.user_info_type == UserInfoType::Inferred {
            return Err(FrejaError::Validation(
                "inferred user info type is not allowed for signing".to_string(),
            ));
        }
        if self.data_to_sign.text.chars().count() > SIGN_TEXT_MAX_CHARS {
            return Err(FrejaError::Validation(format!(
                "text to sign exceeds {SIGN_TEXT_MAX_CHARS} characters"
            )));
        }
        if self.data_to_sign.binary_data.len() > SIGN_BINARY_MAX_BYTES {
            return Err(FrejaError::Validation(format!(
                "binary data to sign exceeds {SIGN_BINARY_MAX_BYTES} bytes"
            )));
        }
        if self.title.chars().count() > SIGN_TITLE_MAX_CHARS {
            return Err(FrejaError::Validation(format!(
                "title exceeds {SIGN_TITLE_MAX_CHARS} characters"
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrejaStatus {
    Started,
    DeliveredToMobile,
    Canceled,
    RpCanceled,
    Expired,
    Approved,
    Rejected,
    #[default]
    #[serde(other)]
    Unknown,
}

impl FrejaStatus {
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            FrejaStatus::Canceled
                | FrejaStatus::RpCanceled
                | FrejaStatus::Expired
                | FrejaStatus::Approved
                | FrejaStatus::Rejected
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BasicUserInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub surname: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestedAttributes {
    pub basic_user_info: BasicUserInfo,
    pub email_address: String,
    pub date_of_birth: String,
    pub custom_identifier: String,
    pub ssn: Ssn,
    pub relying_party_user_id: String,
    pub integrator_specific_user_id: String,
}

/// Result of an authentication or signature order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderResult {
    #[serde(rename = "authRef", alias = "signRef", default)]
    pub reference: String,
    #[serde(default)]
    pub status: FrejaStatus,
    #[serde(default)]
    pub requested_attributes: RequestedAttributes,
    /// JWS over the result, signed by Freja.
    #[serde(default)]
    pub details: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Value,
    #[serde(default)]
    pub message: String,
}

impl ErrorBody {
    pub fn code(&self) -> Option<u32> {
        match &self.code {
            Value::Number(n) => n.as_u64().and_then(|c| u32::try_from(c).ok()),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Description of a documented Freja error code.
pub fn error_description(code: u32) -> Option<&'static str> {
    let description = match code {
        1001 => "Invalid or missing userInfoType.",
        1002 => "Invalid or missing userInfo.",
        1003 => "Invalid restrict.",
        1004 => "You are not allowed to call this method.",
        1005 => "User has disabled your service.",
        1007 => "Invalid min registration level.",
        1008 => "Unknown Relying Party.",
        1009 => "You are not allowed to request integratorSpecificUserId parameter.",
        1010 => "JSON request cannot be parsed.",
        1012 => "User with the specified userInfo does not exist in Freja eID database.",
        1100 => "Invalid reference (for example, nonexistent or expired).",
        1200 => "Invalid or missing includePrevious parameter.",
        2000 => "Authentication request failed. Previous authentication request was rejected due to security reasons.",
        2002 => "Invalid attributesToReturn parameter.",
        2003 => "Custom identifier has to exist when it is requested.",
        3000 => "Invalid or missing dataToSignType.",
        3001 => "Invalid or missing dataToSign.",
        3002 => "Invalid or missing signatureType.",
        3003 => "Invalid expiry time.",
        3004 => "Invalid push notification.",
        3005 => "Invalid attributesToReturn parameter.",
        3006 => "Custom identifier has to exist when it is requested.",
        3007 => "Invalid title.",
        _ => return None,
    };
    Some(description)
}
