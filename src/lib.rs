// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! eID Gateway - BankID / Freja eID order broker
//!
//! Brokers authentication and signing orders against remote eID providers
//! behind one request/response vocabulary, and streams BankID order
//! progress as server-sent events or newline-delimited JSON.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `eid` - Provider trait, registry and order coordinator
//! - `providers` - BankID and Freja eID vendor clients and adapters
//! - `stream` - SSE / NDJSON encoding and reading
//! - `config` - Environment configuration
//! - `telemetry` - Log subscriber setup

pub mod api;
pub mod config;
pub mod eid;
pub mod error;
pub mod models;
pub mod providers;
pub mod state;
pub mod stream;
pub mod telemetry;
