// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Vendor HTTP client construction with mutual TLS.
//!
//! Both BankID and Freja eID authenticate the relying party with a client
//! certificate and serve their API from a private CA.

use std::time::Duration;

use reqwest::{Certificate, Client, Identity};

/// Default timeout for a single vendor request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// PEM material for a vendor connection. Every part is optional.
#[derive(Debug, Clone, Default)]
pub struct TlsMaterial {
    pub root_ca_pem: Option<Vec<u8>>,
    pub client_cert_pem: Option<Vec<u8>>,
    pub client_key_pem: Option<Vec<u8>>,
}

#[derive(Debug, thiserror::Error)]
pub enum MtlsError {
    #[error("invalid root CA: {0}")]
    RootCa(String),

    #[error("invalid client identity: {0}")]
    Identity(String),

    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

/// Build a rustls-backed client. A configured root CA replaces the built-in
/// trust roots.
pub fn build_client(material: &TlsMaterial, timeout: Duration) -> Result<Client, MtlsError> {
    let mut builder = Client::builder().use_rustls_tls().timeout(timeout);

    if let Some(pem) = &material.root_ca_pem {
        let certs = Certificate::from_pem_bundle(pem).map_err(|e| MtlsError::RootCa(e.to_string()))?;
        if certs.is_empty() {
            return Err(MtlsError::RootCa(
                "no certificates found in PEM".to_string(),
            ));
        }
        builder = builder.tls_built_in_root_certs(false);
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
    }

    match (&material.client_cert_pem, &material.client_key_pem) {
        (Some(cert), Some(key)) => {
            let mut pem = cert.clone();
            pem.push(b'\n');
            pem.extend_from_slice(key);
            let identity =
                Identity::from_pem(&pem).map_err(|e| MtlsError::Identity(e.to_string()))?;
            builder = builder.identity(identity);
        }
        (None, None) => {}
        _ => {
            return Err(MtlsError::Identity(
                "client certificate and key must be configured together".to_string(),
            ))
        }
    }

    builder.build().map_err(|e| MtlsError::Build(e.to_string()))
}
