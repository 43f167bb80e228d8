// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Vendor integrations.
//!
//! - [`bankid`]: BankID relying-party API v6
//! - [`freja`]: Freja eID REST API
//! - [`mtls`]: shared client-certificate HTTP client

pub mod bankid;
pub(crate) mod cancel;
pub mod freja;
pub mod mtls;
