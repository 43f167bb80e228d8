// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults and the loader that turns them into
//! a [`Config`] at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `HTTP_PORT` | Server bind port | `8080` |
//! | `STREAM_ENCODER` | Event stream format (`SSE` or `NDJSON`) | `SSE` |
//! | `SHUTDOWN_GRACE_SECS` | Time allowed for open streams on shutdown | `200` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `EID_BANKID_ENABLE` | Register the BankID provider | `false` |
//! | `EID_BANKID_URL` | BankID RP API base URL | `https://appapi2.test.bankid.com` |
//! | `EID_BANKID_ROOT_CA_PEM` | BankID server CA (PEM) | Optional |
//! | `EID_BANKID_CLIENT_CERT` | Relying-party certificate (PEM) | Optional |
//! | `EID_BANKID_CLIENT_KEY` | Relying-party private key (PEM) | Optional |
//! | `EID_BANKID_POLL_INTERVAL_MS` | Collect poll interval | `1000` |
//! | `EID_FREJA_ENABLE` | Register the Freja eID provider | `false` |
//! | `EID_FREJA_URL` | Freja eID REST API base URL | `https://services.test.frejaeid.com` |
//! | `EID_FREJA_ROOT_CA_PEM` | Freja server CA (PEM) | Optional |
//! | `EID_FREJA_CLIENT_CERT` | Relying-party certificate (PEM) | Optional |
//! | `EID_FREJA_CLIENT_KEY` | Relying-party private key (PEM) | Optional |
//! | `EID_FREJA_JWS_PUBLIC_KEY_PEM` | RSA key verifying result JWS | Optional |
//! | `EID_FREJA_POLL_INTERVAL_MS` | Result poll interval, at least 1000 | `1000` |
//! | `EID_FREJA_REGISTRATION_LEVEL` | `BASIC`, `EXTENDED` or `PLUS` | `EXTENDED` |
//!
//! Every PEM variable also has a `_FILE` form naming a file to read. The
//! inline value wins when both are set.

use std::{path::PathBuf, time::Duration};

use crate::{
    providers::{
        bankid::{self, BankIdConfig},
        freja::{self, FrejaConfig},
        mtls::{TlsMaterial, DEFAULT_REQUEST_TIMEOUT},
    },
    stream::StreamFormat,
    telemetry::LogFormat,
};

pub const HOST_ENV: &str = "HOST";
pub const HTTP_PORT_ENV: &str = "HTTP_PORT";
pub const STREAM_ENCODER_ENV: &str = "STREAM_ENCODER";
pub const SHUTDOWN_GRACE_SECS_ENV: &str = "SHUTDOWN_GRACE_SECS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const BANKID_ENABLE_ENV: &str = "EID_BANKID_ENABLE";
pub const BANKID_URL_ENV: &str = "EID_BANKID_URL";
pub const BANKID_ROOT_CA_PEM_ENV: &str = "EID_BANKID_ROOT_CA_PEM";
pub const BANKID_CLIENT_CERT_ENV: &str = "EID_BANKID_CLIENT_CERT";
pub const BANKID_CLIENT_KEY_ENV: &str = "EID_BANKID_CLIENT_KEY";
pub const BANKID_POLL_INTERVAL_MS_ENV: &str = "EID_BANKID_POLL_INTERVAL_MS";

pub const FREJA_ENABLE_ENV: &str = "EID_FREJA_ENABLE";
pub const FREJA_URL_ENV: &str = "EID_FREJA_URL";
pub const FREJA_ROOT_CA_PEM_ENV: &str = "EID_FREJA_ROOT_CA_PEM";
pub const FREJA_CLIENT_CERT_ENV: &str = "EID_FREJA_CLIENT_CERT";
pub const FREJA_CLIENT_KEY_ENV: &str = "EID_FREJA_CLIENT_KEY";
pub const FREJA_JWS_PUBLIC_KEY_PEM_ENV: &str = "EID_FREJA_JWS_PUBLIC_KEY_PEM";
pub const FREJA_POLL_INTERVAL_MS_ENV: &str = "EID_FREJA_POLL_INTERVAL_MS";
pub const FREJA_REGISTRATION_LEVEL_ENV: &str = "EID_FREJA_REGISTRATION_LEVEL";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(200);

/// Lower bound on the Freja poll interval.
pub const FREJA_MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: {reason}")]
    Invalid { var: String, reason: String },

    #[error("{var}: failed to read {path}: {source}")]
    ReadFile {
        var: String,
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ConfigError {
    fn invalid(var: &str, reason: impl ToString) -> Self {
        ConfigError::Invalid {
            var: var.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub stream_format: StreamFormat,
    pub log_format: LogFormat,
    pub shutdown_grace: Duration,
    /// Set when BankID is enabled.
    pub bankid: Option<BankIdConfig>,
    /// Set when Freja eID is enabled.
    pub freja: Option<FrejaConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_HTTP_PORT,
            stream_format: StreamFormat::default(),
            log_format: LogFormat::default(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            bankid: None,
            freja: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let defaults = Config::default();

        Ok(Self {
            host: env.get(HOST_ENV).unwrap_or(defaults.host),
            port: env.parse(HTTP_PORT_ENV)?.unwrap_or(defaults.port),
            stream_format: env.parse(STREAM_ENCODER_ENV)?.unwrap_or_default(),
            log_format: env.parse(LOG_FORMAT_ENV)?.unwrap_or_default(),
            shutdown_grace: env
                .parse(SHUTDOWN_GRACE_SECS_ENV)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_grace),
            bankid: env.bankid()?,
            freja: env.freja()?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, var: &str) -> Option<String> {
        (self.0)(var).filter(|value| !value.trim().is_empty())
    }

    fn parse<T>(&self, var: &str) -> Result<Option<T>, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(var)
            .map(|value| value.trim().parse().map_err(|e| ConfigError::invalid(var, e)))
            .transpose()
    }

    fn flag(&self, var: &str) -> Result<bool, ConfigError> {
        match self.get(var).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            None | Some("false" | "0" | "no") => Ok(false),
            Some("true" | "1" | "yes") => Ok(true),
            Some(other) => Err(ConfigError::invalid(var, format!("not a boolean: {other}"))),
        }
    }

    fn millis(&self, var: &str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parse::<u64>(var)?.map(Duration::from_millis))
    }

    /// Inline PEM from `var`, otherwise the file named by `{var}_FILE`.
    fn pem(&self, var: &str) -> Result<Option<Vec<u8>>, ConfigError> {
        if let Some(inline) = self.get(var) {
            return Ok(Some(inline.into_bytes()));
        }
        let file_var = format!("{var}_FILE");
        let Some(path) = self.get(&file_var) else {
            return Ok(None);
        };
        let path = PathBuf::from(path);
        std::fs::read(&path)
            .map(Some)
            .map_err(|source| ConfigError::ReadFile {
                var: file_var,
                path,
                source,
            })
    }

    fn tls(&self, root_ca: &str, cert: &str, key: &str) -> Result<TlsMaterial, ConfigError> {
        Ok(TlsMaterial {
            root_ca_pem: self.pem(root_ca)?,
            client_cert_pem: self.pem(cert)?,
            client_key_pem: self.pem(key)?,
        })
    }

    fn bankid(&self) -> Result<Option<BankIdConfig>, ConfigError> {
        if !self.flag(BANKID_ENABLE_ENV)? {
            return Ok(None);
        }
        Ok(Some(BankIdConfig {
            base_url: self
                .get(BANKID_URL_ENV)
                .unwrap_or_else(|| bankid::DEFAULT_TEST_URL.to_string()),
            tls: self.tls(
                BANKID_ROOT_CA_PEM_ENV,
                BANKID_CLIENT_CERT_ENV,
                BANKID_CLIENT_KEY_ENV,
            )?,
            poll_interval: self
                .millis(BANKID_POLL_INTERVAL_MS_ENV)?
                .unwrap_or(bankid::DEFAULT_POLL_INTERVAL),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }))
    }

    fn freja(&self) -> Result<Option<FrejaConfig>, ConfigError> {
        if !self.flag(FREJA_ENABLE_ENV)? {
            return Ok(None);
        }
        Ok(Some(FrejaConfig {
            base_url: self
                .get(FREJA_URL_ENV)
                .unwrap_or_else(|| freja::DEFAULT_TEST_URL.to_string()),
            tls: self.tls(
                FREJA_ROOT_CA_PEM_ENV,
                FREJA_CLIENT_CERT_ENV,
                FREJA_CLIENT_KEY_ENV,
            )?,
            jws_public_key_pem: self.pem(FREJA_JWS_PUBLIC_KEY_PEM_ENV)?,
            poll_interval: self
                .millis(FREJA_POLL_INTERVAL_MS_ENV)?
                .unwrap_or(freja::DEFAULT_POLL_INTERVAL)
                .max(FREJA_MIN_POLL_INTERVAL),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            registration_level: self
                .parse(FREJA_REGISTRATION_LEVEL_ENV)?
                .unwrap_or_default(),
        }))
    }
}
