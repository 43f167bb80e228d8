// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # eID Order Lifecycle
//!
//! Provider-agnostic layer on top of the vendor adapters.
//!
//! - [`EidProvider`]: the adapter interface every vendor implements
//! - [`Registry`]: name-keyed, read-only table of enabled adapters
//! - [`Coordinator`]: routes each operation to the adapter named by the request
//!
//! Adapters are stateless between calls apart from their own pollers. The
//! caller owns every [`Inter`] and hands it back on each follow-up call.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    models::{Inter, Req, Resp},
    providers::{bankid::BankIdError, freja::FrejaError},
};

mod coordinator;
mod registry;

pub use coordinator::Coordinator;
pub use registry::Registry;

/// A remote authentication/signature provider.
#[async_trait]
pub trait EidProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start an authentication order.
    async fn auth_init(&self, req: Req) -> Result<Inter, EidError>;

    /// Start a signing order. Payload limits are checked before any vendor
    /// call.
    async fn sign_init(&self, req: Req) -> Result<Inter, EidError>;

    /// One status read. Never cancels the order.
    async fn peek(&self, inter: &Inter) -> Result<Resp, EidError>;

    /// Wait until the order reaches a final status.
    async fn collect(
        &self,
        inter: &Inter,
        cancel_on_err: bool,
        ctx: &CancellationToken,
    ) -> Result<Resp, EidError>;

    /// Cancel the order at the vendor. Cancelling a finished order succeeds.
    async fn cancel(&self, inter: &Inter) -> Result<(), EidError>;

    /// Wait until the order's sub-state changes or it finishes.
    async fn change(
        &self,
        inter: &Inter,
        cancel_on_err: bool,
        ctx: &CancellationToken,
    ) -> Result<Resp, EidError>;

    async fn ping(&self) -> Result<(), EidError>;
}

/// Coarse error classes used to pick a transport status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or over-length input, rejected before any vendor call.
    Validation,
    NotFound,
    /// The vendor answered with an error.
    Vendor,
    /// The vendor could not be reached.
    Transport,
    /// The vendor answered with something unreadable.
    InvalidResponse,
    /// The caller gave up.
    Cancelled,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum EidError {
    #[error("could not find eid provider {0}")]
    ProviderNotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    BankId(#[from] BankIdError),

    #[error(transparent)]
    Freja(#[from] FrejaError),
}

impl EidError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EidError::ProviderNotFound(_) => ErrorKind::NotFound,
            EidError::InvalidRequest(_) => ErrorKind::Validation,
            EidError::BankId(err) => err.kind(),
            EidError::Freja(err) => err.kind(),
        }
    }

    /// Name of the vendor that produced the error, if any.
    pub fn origin(&self) -> Option<&'static str> {
        match self {
            EidError::BankId(_) => Some(crate::providers::bankid::NAME),
            EidError::Freja(_) => Some(crate::providers::freja::NAME),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}
