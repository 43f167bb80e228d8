// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Best-effort vendor cancellation for abandoned orders.

use std::{future::Future, pin::Pin, time::Duration};

use tracing::{info, warn};

/// Upper bound on the lifetime of a spawned vendor cancel.
pub const CANCEL_TIMEOUT: Duration = Duration::from_secs(10);

type CancelFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

/// Fires a vendor cancel for `order_ref` when dropped while armed.
///
/// A poll loop creates the guard up front and disarms it once it observes a
/// terminal status. Every other way out (an error, the caller's token, or
/// the caller dropping the future) leaves it armed. The cancel runs on a
/// detached task and is never awaited by the caller.
pub struct CancelOnError {
    provider: &'static str,
    order_ref: String,
    cancel: Option<CancelFuture>,
}

impl CancelOnError {
    pub fn new<F>(provider: &'static str, order_ref: &str, enabled: bool, cancel: F) -> Self
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        Self {
            provider,
            order_ref: order_ref.to_string(),
            cancel: enabled.then(|| Box::pin(cancel) as CancelFuture),
        }
    }

    pub fn disarm(&mut self) {
        self.cancel = None;
    }
}

impl Drop for CancelOnError {
    fn drop(&mut self) {
        let Some(cancel) = self.cancel.take() else {
            return;
        };
        let provider = self.provider;
        let order_ref = std::mem::take(&mut self.order_ref);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(provider, order_ref = %order_ref, "No runtime available, order left uncancelled");
            return;
        };

        info!(provider, order_ref = %order_ref, "Cancelling abandoned order");
        runtime.spawn(async move {
            match tokio::time::timeout(CANCEL_TIMEOUT, cancel).await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    warn!(provider, order_ref = %order_ref, error = %error, "Could not cancel order")
                }
                Err(_) => warn!(provider, order_ref = %order_ref, "Order cancel timed out"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    fn counting(calls: &Arc<AtomicUsize>) -> impl Future<Output = Result<(), String>> + Send {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn armed_guard_cancels_once_on_drop() {
        let calls = Arc::new(AtomicUsize::new(0));
        drop(CancelOnError::new("test", "ref", true, counting(&calls)));
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disarmed_guard_does_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut guard = CancelOnError::new("test", "ref", true, counting(&calls));
        guard.disarm();
        drop(guard);
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disabled_guard_does_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        drop(CancelOnError::new("test", "ref", false, counting(&calls)));
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
