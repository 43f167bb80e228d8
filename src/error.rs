// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    eid::{EidError, ErrorKind},
    providers::{bankid::BankIdError, freja::FrejaError},
};

pub const ORIGIN_GATEWAY: &str = "Twofer";
pub const ORIGIN_BANKID: &str = "BankIDv6";
pub const ORIGIN_FREJA: &str = "FrejaID";

/// Error body returned by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Where the error came from: `Twofer`, `BankIDv6` or `FrejaID`.
    pub origin: String,
    /// HTTP status returned by the vendor, when the vendor rejected the call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub code: String,
    pub detail: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                origin: ORIGIN_GATEWAY.to_string(),
                status_code: None,
                code: code.into(),
                detail: detail.into(),
            },
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalidRequest", detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "notFound", detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", detail)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Cancelled => StatusCode::REQUEST_TIMEOUT,
        ErrorKind::Vendor | ErrorKind::Transport | ErrorKind::InvalidResponse => {
            StatusCode::BAD_GATEWAY
        }
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn code_for(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "invalidRequest",
        ErrorKind::NotFound => "notFound",
        ErrorKind::Vendor => "vendorError",
        ErrorKind::Transport => "transportError",
        ErrorKind::InvalidResponse => "invalidResponse",
        ErrorKind::Cancelled => "cancelled",
        ErrorKind::Internal => "internal",
    }
}

impl From<BankIdError> for ApiError {
    fn from(err: BankIdError) -> Self {
        let status = status_for(err.kind());
        let body = match &err {
            BankIdError::Api {
                status,
                error_code,
                details,
            } => ErrorBody {
                origin: ORIGIN_BANKID.to_string(),
                status_code: Some(*status),
                code: error_code.clone(),
                detail: details.clone(),
            },
            other => ErrorBody {
                origin: ORIGIN_GATEWAY.to_string(),
                status_code: None,
                code: code_for(other.kind()).to_string(),
                detail: other.to_string(),
            },
        };
        Self { status, body }
    }
}

impl From<FrejaError> for ApiError {
    fn from(err: FrejaError) -> Self {
        let status = status_for(err.kind());
        let body = match &err {
            FrejaError::Api {
                status,
                code,
                message,
            } => ErrorBody {
                origin: ORIGIN_FREJA.to_string(),
                status_code: Some(*status),
                code: code.clone(),
                detail: message.clone(),
            },
            other => ErrorBody {
                origin: ORIGIN_GATEWAY.to_string(),
                status_code: None,
                code: code_for(other.kind()).to_string(),
                detail: other.to_string(),
            },
        };
        Self { status, body }
    }
}

impl From<EidError> for ApiError {
    fn from(err: EidError) -> Self {
        match err {
            EidError::BankId(err) => err.into(),
            EidError::Freja(err) => err.into(),
            other => {
                let status = status_for(other.kind());
                let code = match other {
                    EidError::ProviderNotFound(_) => "providerNotFound",
                    _ => code_for(other.kind()),
                };
                Self::new(status, code, other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
