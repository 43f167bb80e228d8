// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{collections::HashMap, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{EidError, EidProvider};
use crate::{
    config::Config,
    providers::{
        bankid::{BankIdClient, BankIdProvider},
        freja::{FrejaClient, FrejaProvider},
    },
};

/// Read-only table of enabled providers, keyed by provider name.
#[derive(Clone, Default)]
pub struct Registry {
    providers: HashMap<String, Arc<dyn EidProvider>>,
    bankid: Option<BankIdClient>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every provider enabled in `config`. Background pollers stop
    /// when `shutdown` is cancelled.
    pub fn from_config(config: &Config, shutdown: &CancellationToken) -> Result<Self, EidError> {
        let mut registry = Self::new();

        if let Some(bankid) = &config.bankid {
            let client = BankIdClient::new(bankid)?;
            registry.bankid = Some(client.clone());
            registry.register(Arc::new(BankIdProvider::new(client)));
        }

        if let Some(freja) = &config.freja {
            let client = FrejaClient::new(freja)?;
            registry.register(Arc::new(FrejaProvider::spawn(client, shutdown.clone())));
        }

        info!(providers = ?registry.names(), "eID providers registered");
        Ok(registry)
    }

    pub fn register(&mut self, provider: Arc<dyn EidProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn with_bankid(mut self, client: BankIdClient) -> Self {
        self.register(Arc::new(BankIdProvider::new(client.clone())));
        self.bankid = Some(client);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn EidProvider>, EidError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| EidError::ProviderNotFound(name.to_string()))
    }

    /// Sorted provider names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn providers(&self) -> impl Iterator<Item = &Arc<dyn EidProvider>> {
        self.providers.values()
    }

    /// Raw BankID client backing the BankID-specific HTTP surface.
    pub fn bankid(&self) -> Option<&BankIdClient> {
        self.bankid.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::bankid::fake::FakeBankId;

    #[tokio::test]
    async fn lookup_by_name() {
        let fake = FakeBankId::spawn().await;
        let registry = Registry::new().with_bankid(fake.client());

        assert_eq!(registry.get("BankID").unwrap().name(), "BankID");
        assert!(registry.bankid().is_some());

        let err = registry.get("FrejaID").err().unwrap();
        assert_eq!(err.to_string(), "could not find eid provider FrejaID");
    }

    #[test]
    fn empty_config_registers_nothing() {
        let registry = Registry::from_config(&Config::default(), &CancellationToken::new()).unwrap();
        assert!(registry.names().is_empty());
        assert!(registry.bankid().is_none());
    }
}
