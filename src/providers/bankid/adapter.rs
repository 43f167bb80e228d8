// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Map};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    models::{hint, AuthSignRequest, ChangeRequest, CollectResponse, OrderStatus, Requirement},
    BankIdClient, BankIdError,
};
use crate::{
    eid::{EidError, EidProvider},
    models::{Inter, Mode, Req, Resp, Status, Who},
};

pub const NAME: &str = "BankID";

/// End-user IP used when the request does not carry one.
const LOOPBACK_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Map a BankID status and hint code onto the common [`Status`].
///
/// `userCancel` is the end user declining, `cancelled` is the relying party
/// cancelling the order.
pub fn map_status(status: OrderStatus, hint_code: &str) -> Status {
    match status {
        OrderStatus::Pending => match hint_code {
            hint::STARTED | hint::USER_SIGN => Status::Ongoing,
            _ => Status::Pending,
        },
        OrderStatus::Failed => match hint_code {
            hint::EXPIRED_TRANSACTION => Status::Expired,
            hint::USER_CANCEL => Status::Canceled,
            hint::CANCELLED => Status::RpCanceled,
            hint::START_FAILED => Status::StartFailed,
            _ => Status::Failed,
        },
        OrderStatus::Complete => Status::Approved,
        OrderStatus::Unknown => Status::Unknown,
    }
}

/// BankID behind the common eID adapter interface.
#[derive(Debug, Clone)]
pub struct BankIdProvider {
    client: BankIdClient,
}

impl BankIdProvider {
    pub fn new(client: BankIdClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &BankIdClient {
        &self.client
    }

    fn order_request(req: &mut Req) -> AuthSignRequest {
        let who = req.who.get_or_insert_with(|| Who {
            inferred: true,
            ..Who::default()
        });
        let ip = *who.ip.get_or_insert(LOOPBACK_IP);

        let mut request = AuthSignRequest {
            end_user_ip: ip.to_string(),
            ..AuthSignRequest::default()
        };
        if !who.ssn.is_empty() {
            request.requirement = Requirement {
                personal_number: who.ssn.clone(),
                ..Requirement::default()
            };
        }
        if let Some(payload) = &req.payload {
            request.user_visible_data = payload.text.clone();
            request.user_non_visible_data = payload.data.clone();
        }
        request
    }

    fn inter(req: Req, mode: Mode, order_ref: String, auto_start_token: String) -> Inter {
        Inter {
            uri: format!("bankid:///?autostarttoken={auto_start_token}"),
            req,
            mode,
            reference: order_ref,
            inferred: auto_start_token,
        }
    }
}

/// Translate a collect response into a common response for `inter`.
pub(crate) fn to_resp(inter: &Inter, collected: CollectResponse) -> Result<Resp, BankIdError> {
    let status = map_status(collected.status, &collected.hint_code);
    let mut resp = Resp::without_info(inter.clone(), status);
    if status != Status::Approved {
        return Ok(resp);
    }

    let data = collected.completion_data.unwrap_or_default();
    let user = data.user;
    resp.info = Who {
        ssn: user.personal_number.clone(),
        ssn_country: "SE".to_string(),
        name: user.given_name.clone(),
        surname: user.surname.clone(),
        ip: data.device.ip_address.parse().ok(),
        date_of_birth: user
            .personal_number
            .get(..8)
            .and_then(|digits| NaiveDate::parse_from_str(digits, "%Y%m%d").ok()),
        ..Who::default()
    };

    let mut extra = Map::new();
    extra.insert("fullName".to_string(), json!(user.name));
    extra.insert("givenName".to_string(), json!(user.given_name));
    extra.insert("bankIdIssueDate".to_string(), json!(data.bank_id_issue_date));
    resp.extra = extra;

    resp.signature = serde_json::to_vec(&json!({
        "signature": data.signature,
        "ocspResponse": data.ocsp_response,
    }))
    .map_err(|e| BankIdError::InvalidResponse(e.to_string()))?;

    Ok(resp)
}

fn is_finished_order(err: &BankIdError) -> bool {
    matches!(err, BankIdError::Api { error_code, .. } if error_code == "invalidParameters")
}

#[async_trait]
impl EidProvider for BankIdProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn auth_init(&self, mut req: Req) -> Result<Inter, EidError> {
        let request = Self::order_request(&mut req);
        let order = self.client.auth(&request).await?;
        Ok(Self::inter(req, Mode::Auth, order.order_ref, order.auto_start_token))
    }

    async fn sign_init(&self, mut req: Req) -> Result<Inter, EidError> {
        let request = Self::order_request(&mut req);
        let order = self.client.sign(&request).await?;
        Ok(Self::inter(req, Mode::Sign, order.order_ref, order.auto_start_token))
    }

    async fn peek(&self, inter: &Inter) -> Result<Resp, EidError> {
        let collected = self.client.collect_once(&inter.reference).await?;
        Ok(to_resp(inter, collected)?)
    }

    async fn collect(
        &self,
        inter: &Inter,
        cancel_on_err: bool,
        ctx: &CancellationToken,
    ) -> Result<Resp, EidError> {
        let collected = self
            .client
            .collect(&inter.reference, cancel_on_err, ctx)
            .await?;
        Ok(to_resp(inter, collected)?)
    }

    async fn cancel(&self, inter: &Inter) -> Result<(), EidError> {
        match self.client.cancel(&inter.reference).await {
            Err(err) if is_finished_order(&err) => {
                debug!(
                    order_ref = %inter.reference,
                    "BankID order already finished, nothing to cancel"
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
        let request = ChangeRequest {
            order_ref: inter.reference.clone(),
            wait_until_finished: false,
        };
        let collected = self.client.change(&request, cancel_on_err, ctx).await?;
        Ok(to_resp(inter, collected)?)
    }

    async fn ping(&self) -> Result<(), EidError> {
        Ok(self.client.ping().await?)
    }
}
