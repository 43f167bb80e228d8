// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{sync::Arc, time::Duration};

use crate::{
    eid::{Coordinator, Registry},
    stream::StreamFormat,
};

/// Interval between QR code refreshes on the BankID stream.
pub const QR_CODE_UPDATE_PERIOD: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub stream_format: StreamFormat,
    pub qr_period: Duration,
}

impl AppState {
    pub fn new(registry: Registry, stream_format: StreamFormat) -> Self {
        Self {
            coordinator: Arc::new(Coordinator::new(Arc::new(registry))),
            stream_format,
            qr_period: QR_CODE_UPDATE_PERIOD,
        }
    }

    pub fn with_qr_period(mut self, period: Duration) -> Self {
        self.qr_period = period;
        self
    }

    pub fn registry(&self) -> &Registry {
        self.coordinator.registry()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Registry::default(), StreamFormat::default())
    }
}
