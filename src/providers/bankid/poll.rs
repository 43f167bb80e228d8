// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Collect, change and watch loops on top of the raw BankID collect call.
//!
//! All loops poll one order strictly sequentially at the client's poll
//! interval and stop as soon as the caller's [`CancellationToken`] fires.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    models::{ChangeRequest, CollectResponse, OrderStatus},
    BankIdClient, BankIdError,
};
use crate::providers::cancel::CancelOnError;

/// Bound on a single delivery into a watch channel.
pub const WATCH_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// One observation emitted by [`BankIdClient::watch_for_change`].
pub type Change = Result<CollectResponse, BankIdError>;

impl BankIdClient {
    fn cancel_guard(&self, order_ref: &str, enabled: bool) -> CancelOnError {
        let client = self.clone();
        let reference = order_ref.to_string();
        CancelOnError::new(super::NAME, order_ref, enabled, async move {
            client.cancel(&reference).await.map_err(|e| e.to_string())
        })
    }

    /// Sleep one poll interval, or fail if the caller gave up first.
    async fn tick(&self, ctx: &CancellationToken) -> Result<(), BankIdError> {
        tokio::select! {
            _ = ctx.cancelled() => Err(BankIdError::Cancelled),
            _ = tokio::time::sleep(self.poll_interval) => Ok(()),
        }
    }

    /// Poll until the order is complete or failed.
    ///
    /// With `cancel_on_err`, any exit without a finished order (error,
    /// cancellation or the future being dropped) cancels the order at BankID
    /// in the background.
    pub async fn collect(
        &self,
        order_ref: &str,
        cancel_on_err: bool,
        ctx: &CancellationToken,
    ) -> Result<CollectResponse, BankIdError> {
        let mut guard = self.cancel_guard(order_ref, cancel_on_err);
        loop {
            self.tick(ctx).await?;
            let response = self.collect_once(order_ref).await?;
            if response.status.is_finished() {
                guard.disarm();
                return Ok(response);
            }
        }
    }

    /// Poll until the hint code moves away from its value at call start, or
    /// the order finishes. With `wait_until_finished` only a finished order
    /// ends the wait.
    pub async fn change(
        &self,
        request: &ChangeRequest,
        cancel_on_err: bool,
        ctx: &CancellationToken,
    ) -> Result<CollectResponse, BankIdError> {
        let order_ref = request.order_ref.as_str();
        let mut guard = self.cancel_guard(order_ref, cancel_on_err);

        let baseline = self.collect_once(order_ref).await?;
        if baseline.status.is_finished() {
            guard.disarm();
            return Ok(baseline);
        }

        loop {
            self.tick(ctx).await?;
            let response = self.collect_once(order_ref).await?;

            let finished = response.status.is_finished();
            let changed = !request.wait_until_finished && response.hint_code != baseline.hint_code;
            if finished || changed {
                guard.disarm();
                debug!(
                    order_ref = %order_ref,
                    status = ?response.status,
                    hint_code = %response.hint_code,
                    "BankID order changed"
                );
                return Ok(response);
            }
        }
    }

    /// Stream status/hint changes of an order.
    ///
    /// The baseline collect runs before returning and its error is returned
    /// directly. The baseline is the first item on the channel. After that a
    /// background task emits only when status or hint code differs from the
    /// last emitted state, and closes the channel once the order leaves
    /// `pending`. Cancelling `ctx` emits a final [`BankIdError::Cancelled`].
    pub async fn watch_for_change(
        &self,
        order_ref: &str,
        ctx: CancellationToken,
    ) -> Result<mpsc::Receiver<Change>, BankIdError> {
        let baseline = self.collect_once(order_ref).await?;

        let (tx, rx) = mpsc::channel(1);
        let still_pending = baseline.status == OrderStatus::Pending;
        send_bounded(&tx, Ok(baseline.clone())).await;

        if still_pending {
            let client = self.clone();
            let order_ref = order_ref.to_string();
            tokio::spawn(async move {
                client.watch_loop(order_ref, baseline, tx, ctx).await;
            });
        }

        Ok(rx)
    }

    async fn watch_loop(
        &self,
        order_ref: String,
        mut last: CollectResponse,
        tx: mpsc::Sender<Change>,
        ctx: CancellationToken,
    ) {
        loop {
            if let Err(err) = self.tick(&ctx).await {
                send_bounded(&tx, Err(err)).await;
                return;
            }

            let response = match self.collect_once(&order_ref).await {
                Ok(response) => response,
                Err(err) => {
                    send_bounded(&tx, Err(err)).await;
                    return;
                }
            };

            let status = response.status;
            if status != last.status || response.hint_code != last.hint_code {
                last = response.clone();
                send_bounded(&tx, Ok(response)).await;
            }

            if status != OrderStatus::Pending {
                return;
            }
        }
    }
}

/// Deliver into a watch channel, dropping the item when the consumer has not
/// made room within [`WATCH_SEND_TIMEOUT`].
async fn send_bounded(tx: &mpsc::Sender<Change>, change: Change) {
    if let Err(err) = tx.send_timeout(change, WATCH_SEND_TIMEOUT).await {
        match err {
            mpsc::error::SendTimeoutError::Timeout(change) => {
                warn!(change = ?change, "Watch consumer too slow, dropping change")
            }
            mpsc::error::SendTimeoutError::Closed(_) => {
                debug!("Watch consumer gone, dropping change")
            }
        }
    }
}
