// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Freja Result Poller
//!
//! One background task per mode (authentication, signature) that resolves
//! waiting orders to their final result.
//!
//! ## Strategy
//!
//! - With 1 to 4 orders waiting, each is polled with `getOneResult`.
//! - With none, or 5 and more, one bulk `getResults` call covers them all,
//!   which keeps the request rate flat under load.
//! - Final results are handed to every waiter of the reference and cached as
//!   seen for [`SEEN_RETENTION`], so late waiters are answered at once.
//!
//! ## Cadence
//!
//! Idle at [`IDLE_POLL_INTERVAL`]. A new reference resets the cadence to the
//! client poll interval, which slows to 2x after 30 s and 3x after 60 s, and
//! falls back to idle after 90 s or once nothing is waiting.
//!
//! ## Shutdown
//!
//! Stops when the shutdown `CancellationToken` fires. Pending waiters then
//! observe a closed channel.

use std::{collections::HashMap, time::Duration};

use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{models::OrderResult, FrejaClient, FrejaError};
use crate::models::Mode;

pub const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// How long Freja keeps results around, and how long we remember them.
pub const SEEN_RETENTION: Duration = Duration::from_secs(600);

/// Waiting-set size at which polling switches to bulk.
const BULK_THRESHOLD: usize = 5;

const INFORM_CAPACITY: usize = 64;

/// Freja code for an unknown or expired reference.
const INVALID_REFERENCE: &str = "1100";

/// Delay before the next poll, given the client poll interval, the number
/// of waiting references and the time since a reference was last added.
pub fn next_sleep(active: Duration, waiting: usize, since_inform: Duration) -> Duration {
    if waiting == 0 || since_inform > Duration::from_secs(90) {
        IDLE_POLL_INTERVAL
    } else if since_inform > Duration::from_secs(60) {
        active * 3
    } else if since_inform > Duration::from_secs(30) {
        active * 2
    } else {
        active
    }
}

pub(crate) type Outcome = Result<OrderResult, FrejaError>;

struct Watch {
    reference: String,
    reply: oneshot::Sender<Outcome>,
}

struct Seen {
    at: Instant,
    result: OrderResult,
}

/// Registers references with a running [`BatchPoller`].
#[derive(Debug, Clone)]
pub(crate) struct PollerHandle {
    mode: Mode,
    inform: mpsc::Sender<Watch>,
}

impl std::fmt::Debug for Watch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watch").field("reference", &self.reference).finish()
    }
}

impl PollerHandle {
    /// Wait for the final result of `reference`.
    pub async fn wait_for(&self, reference: &str) -> Result<oneshot::Receiver<Outcome>, FrejaError> {
        let (reply, rx) = oneshot::channel();
        self.inform
            .send(Watch {
                reference: reference.to_string(),
                reply,
            })
            .await
            .map_err(|_| FrejaError::PollerStopped)?;
        debug!(mode = %self.mode, reference, "Registered with Freja poller");
        Ok(rx)
    }
}

pub(crate) struct BatchPoller {
    mode: Mode,
    client: FrejaClient,
    inform: mpsc::Receiver<Watch>,
    waiting: HashMap<String, Vec<oneshot::Sender<Outcome>>>,
    seen: HashMap<String, Seen>,
}

impl BatchPoller {
    /// Spawn the poller for `mode` and return its handle.
    pub fn spawn(client: FrejaClient, mode: Mode, shutdown: CancellationToken) -> PollerHandle {
        let (tx, rx) = mpsc::channel(INFORM_CAPACITY);
        let poller = Self {
            mode,
            client,
            inform: rx,
            waiting: HashMap::new(),
            seen: HashMap::new(),
        };
        tokio::spawn(poller.run(shutdown));
        PollerHandle { mode, inform: tx }
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(mode = %self.mode, "Freja result poller starting");

        let active = self.client.poll_interval();
        let mut sleep = IDLE_POLL_INTERVAL;
        let mut informed_at = Instant::now();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(mode = %self.mode, "Freja result poller shutting down");
                    return;
                }
                Some(watch) = self.inform.recv() => {
                    if self.register(watch) {
                        informed_at = Instant::now();
                        self.poll().await;
                    }
                }
                _ = tokio::time::sleep(sleep) => {
                    self.poll().await;
                }
            }

            self.prune();
            sleep = next_sleep(active, self.waiting.len(), informed_at.elapsed());
        }
    }

    /// Returns true when the reference joined the waiting set.
    fn register(&mut self, watch: Watch) -> bool {
        if let Some(seen) = self.seen.get(&watch.reference) {
            let _ = watch.reply.send(Ok(seen.result.clone()));
            return false;
        }
        self.waiting.entry(watch.reference).or_default().push(watch.reply);
        true
    }

    async fn poll(&mut self) {
        let waiting = self.waiting.len();
        if waiting > 0 && waiting < BULK_THRESHOLD {
            let references: Vec<String> = self.waiting.keys().cloned().collect();
            for reference in references {
                match self.client.get_one_result(self.mode, &reference).await {
                    Ok(result) => self.process(result),
                    Err(err) if err.code() == Some(INVALID_REFERENCE) => {
                        warn!(mode = %self.mode, reference = %reference, "Freja does not know reference");
                        self.fail(&reference, err);
                    }
                    Err(err) => {
                        warn!(mode = %self.mode, reference = %reference, error = %err, "Freja single poll failed");
                    }
                }
            }
            return;
        }

        debug!(mode = %self.mode, waiting, "Freja bulk poll");
        match self.client.get_results(self.mode).await {
            Ok(results) => results.into_iter().for_each(|result| self.process(result)),
            Err(err) => warn!(mode = %self.mode, error = %err, "Freja bulk poll failed"),
        }
    }

    fn process(&mut self, result: OrderResult) {
        if !result.status.is_final() || self.seen.contains_key(&result.reference) {
            return;
        }

        info!(
            mode = %self.mode,
            reference = %result.reference,
            status = ?result.status,
            "Freja order finished"
        );
        for reply in self.waiting.remove(&result.reference).unwrap_or_default() {
            let _ = reply.send(Ok(result.clone()));
        }
        self.seen.insert(
            result.reference.clone(),
            Seen {
                at: Instant::now(),
                result,
            },
        );
    }

    fn fail(&mut self, reference: &str, err: FrejaError) {
        for reply in self.waiting.remove(reference).unwrap_or_default() {
            let _ = reply.send(Err(err.clone()));
        }
    }

    fn prune(&mut self) {
        self.seen.retain(|_, seen| seen.at.elapsed() < SEEN_RETENTION);
        self.waiting.retain(|_, replies| {
            replies.retain(|reply| !reply.is_closed());
            !replies.is_empty()
        });
    }
}
