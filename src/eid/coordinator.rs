// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{EidError, EidProvider, Registry};
use crate::models::{Inter, Req, Resp};

/// Routes each lifecycle call to the provider named in the request.
#[derive(Clone)]
pub struct Coordinator {
    registry: Arc<Registry>,
}

impl Coordinator {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn providers(&self) -> Vec<String> {
        self.registry.names()
    }

    fn provider_for(&self, name: &str) -> Result<Arc<dyn EidProvider>, EidError> {
        if name.is_empty() {
            return Err(EidError::InvalidRequest("provider.name is required".to_string()));
        }
        self.registry.get(name)
    }

    #[instrument(skip_all, fields(provider = %req.provider.name))]
    pub async fn auth_init(&self, req: Req) -> Result<Inter, EidError> {
        let inter = self.provider_for(&req.provider.name)?.auth_init(req).await?;
        debug!(order_ref = %inter.reference, "auth order started");
        Ok(inter)
    }

    #[instrument(skip_all, fields(provider = %req.provider.name))]
    pub async fn sign_init(&self, req: Req) -> Result<Inter, EidError> {
        let inter = self.provider_for(&req.provider.name)?.sign_init(req).await?;
        debug!(order_ref = %inter.reference, "sign order started");
        Ok(inter)
    }

    #[instrument(skip_all, fields(provider = %inter.provider_name(), order_ref = %inter.reference))]
    pub async fn peek(&self, inter: &Inter) -> Result<Resp, EidError> {
        self.provider_for(inter.provider_name())?.peek(inter).await
    }

    #[instrument(skip_all, fields(provider = %inter.provider_name(), order_ref = %inter.reference))]
    pub async fn collect(
        &self,
        inter: &Inter,
        cancel_on_err: bool,
        ctx: &CancellationToken,
    ) -> Result<Resp, EidError> {
        self.provider_for(inter.provider_name())?
            .collect(inter, cancel_on_err, ctx)
            .await
    }

    #[instrument(skip_all, fields(provider = %inter.provider_name(), order_ref = %inter.reference))]
    pub async fn cancel(&self, inter: &Inter) -> Result<(), EidError> {
        self.provider_for(inter.provider_name())?.cancel(inter).await
    }

    #[instrument(skip_all, fields(provider = %inter.provider_name(), order_ref = %inter.reference))]
    pub async fn change(
        &self,
        inter: &Inter,
        cancel_on_err: bool,
        ctx: &CancellationToken,
    ) -> Result<Resp, EidError> {
        self.provider_for(inter.provider_name())?
            .change(inter, cancel_on_err, ctx)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        eid::ErrorKind,
        models::{Mode, Status},
    };

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<&'static str>>,
    }

    impl Recorder {
        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl EidProvider for Recorder {
        fn name(&self) -> &'static str {
            "Mock"
        }

        async fn auth_init(&self, req: Req) -> Result<Inter, EidError> {
            self.record("auth");
            Ok(Inter {
                req,
                mode: Mode::Auth,
                reference: "ref-1".to_string(),
                inferred: String::new(),
                uri: String::new(),
            })
        }

        async fn sign_init(&self, _req: Req) -> Result<Inter, EidError> {
            self.record("sign");
            Err(EidError::InvalidRequest("no payload".to_string()))
        }

        async fn peek(&self, inter: &Inter) -> Result<Resp, EidError> {
            self.record("peek");
            Ok(Resp::without_info(inter.clone(), Status::Pending))
        }

        async fn collect(
            &self,
            inter: &Inter,
            _cancel_on_err: bool,
            _ctx: &CancellationToken,
        ) -> Result<Resp, EidError> {
            self.record("collect");
            Ok(Resp::without_info(inter.clone(), Status::Approved))
        }

        async fn cancel(&self, _inter: &Inter) -> Result<(), EidError> {
            self.record("cancel");
            Ok(())
        }

        async fn change(
            &self,
            inter: &Inter,
            _cancel_on_err: bool,
            _ctx: &CancellationToken,
        ) -> Result<Resp, EidError> {
            self.record("change");
            Ok(Resp::without_info(inter.clone(), Status::Ongoing))
        }

        async fn ping(&self) -> Result<(), EidError> {
            Ok(())
        }
    }

    fn coordinator(mock: Arc<Recorder>) -> Coordinator {
        let mut registry = Registry::new();
        registry.register(mock);
        Coordinator::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn routes_by_provider_name() {
        let mock = Arc::new(Recorder::default());
        let coordinator = coordinator(mock.clone());
        let ctx = CancellationToken::new();

        let inter = coordinator.auth_init(Req::new("Mock")).await.unwrap();
        assert_eq!(inter.reference, "ref-1");
        assert_eq!(inter.provider_name(), "Mock");

        assert_eq!(coordinator.peek(&inter).await.unwrap().status, Status::Pending);
        assert_eq!(
            coordinator.change(&inter, false, &ctx).await.unwrap().status,
            Status::Ongoing
        );
        assert_eq!(
            coordinator.collect(&inter, false, &ctx).await.unwrap().status,
            Status::Approved
        );
        coordinator.cancel(&inter).await.unwrap();

        assert_eq!(
            *mock.calls.lock().unwrap(),
            vec!["auth", "peek", "change", "collect", "cancel"]
        );
    }

    #[tokio::test]
    async fn unknown_provider_is_not_found() {
        let mock = Arc::new(Recorder::default());
        let coordinator = coordinator(mock.clone());

        let err = coordinator.auth_init(Req::new("Nope")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "could not find eid provider Nope");
        assert!(mock.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_provider_name_is_rejected() {
        let coordinator = coordinator(Arc::new(Recorder::default()));
        let err = coordinator.sign_init(Req::new("")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn provider_errors_pass_through() {
        let coordinator = coordinator(Arc::new(Recorder::default()));
        let err = coordinator.sign_init(Req::new("Mock")).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid request: no payload");
    }

    #[test]
    fn lists_sorted_names() {
        let coordinator = coordinator(Arc::new(Recorder::default()));
        assert_eq!(coordinator.providers(), vec!["Mock".to_string()]);
    }
}
