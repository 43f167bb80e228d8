// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    models::{
        default_attributes, AuthRequest, DataToSign, FrejaStatus, OrderResult, SignRequest,
        Subject,
    },
    poller::{BatchPoller, PollerHandle},
    FrejaClient, FrejaError,
};
use crate::{
    eid::{EidError, EidProvider},
    models::{Inter, Mode, Req, Resp, Status, Who},
    providers::cancel::CancelOnError,
};

pub const NAME: &str = "FrejaID";

pub fn map_status(status: FrejaStatus) -> Status {
    match status {
        FrejaStatus::Started | FrejaStatus::DeliveredToMobile => Status::Pending,
        FrejaStatus::Canceled => Status::Canceled,
        FrejaStatus::RpCanceled => Status::RpCanceled,
        FrejaStatus::Expired => Status::Expired,
        FrejaStatus::Approved => Status::Approved,
        FrejaStatus::Rejected => Status::Rejected,
        FrejaStatus::Unknown => Status::Unknown,
    }
}

fn deep_link(reference: &str) -> String {
    let escaped: String = url::form_urlencoded::byte_serialize(reference.as_bytes()).collect();
    format!("frejaeid://bindUserToTransaction?transactionReference={escaped}")
}

/// Freja eID behind the common eID adapter interface.
///
/// Owns one result poller per mode; both stop with the shutdown token given
/// to [`FrejaProvider::spawn`].
#[derive(Debug, Clone)]
pub struct FrejaProvider {
    client: FrejaClient,
    auth: PollerHandle,
    sign: PollerHandle,
}

impl FrejaProvider {
    pub fn spawn(client: FrejaClient, shutdown: CancellationToken) -> Self {
        let auth = BatchPoller::spawn(client.clone(), Mode::Auth, shutdown.child_token());
        let sign = BatchPoller::spawn(client.clone(), Mode::Sign, shutdown.child_token());
        Self { client, auth, sign }
    }

    fn poller(&self, mode: Mode) -> &PollerHandle {
        match mode {
            Mode::Auth => &self.auth,
            Mode::Sign => &self.sign,
        }
    }

    fn cancel_guard(&self, inter: &Inter, enabled: bool) -> CancelOnError {
        let client = self.client.clone();
        let mode = inter.mode;
        let reference = inter.reference.clone();
        CancelOnError::new(NAME, &inter.reference, enabled, async move {
            client.cancel(mode, &reference).await.map_err(|e| e.to_string())
        })
    }

    fn inter(req: Req, mode: Mode, reference: String) -> Inter {
        Inter {
            uri: deep_link(&reference),
            inferred: reference.clone(),
            req,
            mode,
            reference,
        }
    }

    /// Addressed subject for signing: ssn, then phone, then email.
    fn addressed_subject(who: &Who) -> Result<Option<Subject>, FrejaError> {
        if !who.ssn_country.is_empty() && !who.ssn.is_empty() {
            return Subject::ssn(&who.ssn_country, &who.ssn).map(Some);
        }
        if !who.phone.is_empty() {
            return Ok(Some(Subject::phone(&who.phone)));
        }
        if !who.email.is_empty() {
            return Ok(Some(Subject::email(&who.email)));
        }
        Ok(None)
    }

    fn to_resp(&self, inter: &Inter, result: OrderResult) -> Result<Resp, FrejaError> {
        let status = map_status(result.status);
        let mut resp = Resp::without_info(inter.clone(), status);
        if status != Status::Approved {
            return Ok(resp);
        }

        self.client.verify(&result)?;
        let attributes = result.requested_attributes;
        resp.info = Who {
            ssn: attributes.ssn.ssn,
            ssn_country: attributes.ssn.country,
            email: attributes.email_address,
            name: attributes.basic_user_info.name,
            surname: attributes.basic_user_info.surname,
            date_of_birth: NaiveDate::parse_from_str(&attributes.date_of_birth, "%Y-%m-%d").ok(),
            ..Who::default()
        };
        resp.signature = result.details.into_bytes();
        Ok(resp)
    }

    async fn tick(&self, ctx: &CancellationToken) -> Result<(), FrejaError> {
        tokio::select! {
            _ = ctx.cancelled() => Err(FrejaError::Cancelled),
            _ = tokio::time::sleep(self.client.poll_interval()) => Ok(()),
        }
    }
}

#[async_trait]
impl EidProvider for FrejaProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn auth_init(&self, mut req: Req) -> Result<Inter, EidError> {
        let who = req.who.get_or_insert_with(|| Who {
            inferred: true,
            ..Who::default()
        });
        let subject = if who.inferred {
            Subject::inferred()
        } else {
            Self::addressed_subject(who)?.unwrap_or_else(Subject::inferred)
        };

        let request = AuthRequest {
            subject,
            attributes_to_return: default_attributes(),
            min_registration_level: self.client.registration_level(),
        };
        let reference = self.client.init_auth(&request).await?;
        Ok(Self::inter(req, Mode::Auth, reference))
    }

    async fn sign_init(&self, mut req: Req) -> Result<Inter, EidError> {
        let who = req.who.get_or_insert_with(|| Who {
            inferred: true,
            ..Who::default()
        });
        let subject = Self::addressed_subject(who)?.ok_or_else(|| {
            FrejaError::Validation("ssn, phone or email must be supplied for signing".to_string())
        })?;

        let data = req
            .payload
            .as_ref()
            .map(|payload| DataToSign {
                text: payload.text.clone(),
                binary_data: payload.data.clone(),
            })
            .unwrap_or_default();
        let mut request = SignRequest::new(subject, data);
        request.min_registration_level = self.client.registration_level();
        request.attributes_to_return = default_attributes();

        let reference = self.client.init_sign(&request).await?;
        Ok(Self::inter(req, Mode::Sign, reference))
    }

    async fn peek(&self, inter: &Inter) -> Result<Resp, EidError> {
        let result = self.client.get_one_result(inter.mode, &inter.reference).await?;
        Ok(self.to_resp(inter, result)?)
    }

    async fn collect(
        &self,
        inter: &Inter,
        cancel_on_err: bool,
        ctx: &CancellationToken,
    ) -> Result<Resp, EidError> {
        let mut guard = self.cancel_guard(inter, cancel_on_err);
        let rx = self.poller(inter.mode).wait_for(&inter.reference).await?;

        let result = tokio::select! {
            _ = ctx.cancelled() => return Err(FrejaError::Cancelled.into()),
            outcome = rx => outcome.map_err(|_| FrejaError::PollerStopped)??,
        };
        guard.disarm();
        Ok(self.to_resp(inter, result)?)
    }

    async fn cancel(&self, inter: &Inter) -> Result<(), EidError> {
        match self.client.cancel(inter.mode, &inter.reference).await {
            Err(err) if err.code() == Some("1100") => {
                debug!(
                    order_ref = %inter.reference,
                    "Freja order already finished, nothing to cancel"
                );
                Ok(())
            }
            other => Ok(other?),
        }
    }

    async fn change(
        &self,
        inter: &Inter,
        cancel_on_err: bool,
        ctx: &CancellationToken,
    ) -> Result<Resp, EidError> {
        let mut guard = self.cancel_guard(inter, cancel_on_err);

        let baseline = self.client.get_one_result(inter.mode, &inter.reference).await?;
        if baseline.status.is_final() {
            guard.disarm();
            return Ok(self.to_resp(inter, baseline)?);
        }

        loop {
            self.tick(ctx).await?;
            let result = self.client.get_one_result(inter.mode, &inter.reference).await?;
            let finished = result.status.is_final();
            if finished || result.status != baseline.status {
                guard.disarm();
                debug!(
                    order_ref = %inter.reference,
                    status = ?result.status,
                    "Freja order changed"
                );
                return Ok(self.to_resp(inter, result)?);
            }
        }
    }

    async fn ping(&self) -> Result<(), EidError> {
        Ok(self.client.ping().await?)
    }
}
