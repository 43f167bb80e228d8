// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Event Streams
//!
//! Order progress is pushed to HTTP clients as a chunked response body in one
//! of two wire formats:
//!
//! | Format | Content-Type | Frame |
//! |--------|--------------|-------|
//! | [`StreamFormat::Sse`] | `text/event-stream` | `id`, `event`, `data` lines, blank line |
//! | [`StreamFormat::Ndjson`] | `application/x-json-stream` | one JSON value per line |
//!
//! Handlers obtain an [`EventSink`] and a ready [`Response`] from [`channel`],
//! return the response and keep feeding the sink from a spawned task. The
//! readers in [`sse`] and [`ndjson`] are the client side of the same formats.

use std::{convert::Infallible, fmt, str::FromStr, time::Duration};

use axum::{
    body::{Body, Bytes},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

pub mod ndjson;
pub mod sse;

/// Bound on a single delivery from a reader into its channel.
pub const READ_SEND_TIMEOUT: Duration = Duration::from_secs(1);

const READ_CHANNEL_CAPACITY: usize = 16;
const BODY_CHANNEL_CAPACITY: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("stream: failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("stream: client went away")]
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamFormat {
    #[default]
    Sse,
    Ndjson,
}

impl StreamFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            StreamFormat::Sse => sse::CONTENT_TYPE,
            StreamFormat::Ndjson => ndjson::CONTENT_TYPE,
        }
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamFormat::Sse => f.write_str("SSE"),
            StreamFormat::Ndjson => f.write_str("NDJSON"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown stream encoder {0:?}, expected SSE or NDJSON")]
pub struct ParseStreamFormatError(String);

impl FromStr for StreamFormat {
    type Err = ParseStreamFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SSE" => Ok(StreamFormat::Sse),
            "NDJSON" => Ok(StreamFormat::Ndjson),
            _ => Err(ParseStreamFormatError(s.to_string())),
        }
    }
}

/// One server-sent event. Empty fields are left out on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    pub id: String,
    pub event: String,
    pub data: String,
    pub retry: String,
}

impl Event {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            ..Self::default()
        }
    }
}

/// Turns typed events into body chunks for one response.
///
/// SSE events get an id that increases per stream, starting at 0. NDJSON
/// frames carry the data only.
#[derive(Debug)]
pub struct Encoder {
    format: StreamFormat,
    next_id: u64,
}

impl Encoder {
    pub fn new(format: StreamFormat) -> Self {
        Self { format, next_id: 0 }
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn json<T: Serialize>(&mut self, event: &str, data: &T) -> Result<Bytes, StreamError> {
        match self.format {
            StreamFormat::Sse => {
                let id = self.next_id;
                self.next_id += 1;
                let event = Event {
                    id: id.to_string(),
                    event: event.to_string(),
                    data: serde_json::to_string(data)?,
                    retry: String::new(),
                };
                Ok(sse::encode(&event))
            }
            StreamFormat::Ndjson => ndjson::encode(data),
        }
    }
}

/// Producer half of a streaming response.
#[derive(Debug)]
pub struct EventSink {
    encoder: Encoder,
    tx: mpsc::Sender<Result<Bytes, Infallible>>,
}

impl EventSink {
    /// Encode and push one event. Fails once the client disconnected.
    pub async fn send<T: Serialize>(&mut self, event: &str, data: &T) -> Result<(), StreamError> {
        let chunk = self.encoder.json(event, data)?;
        self.tx.send(Ok(chunk)).await.map_err(|_| {
            debug!(event, "Stream receiver dropped");
            StreamError::Closed
        })
    }

    /// Resolves when the client stops reading.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// A streaming response in `format` and the sink feeding its body.
pub fn channel(format: StreamFormat) -> (EventSink, Response) {
    let (tx, rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
    let sink = EventSink {
        encoder: Encoder::new(format),
        tx,
    };
    let response = (
        [
            (header::CONTENT_TYPE, format.content_type()),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response();
    (sink, response)
}

/// Deliver `item` to a reader channel, dropping it when the consumer has not
/// made room within [`READ_SEND_TIMEOUT`]. Returns false once the consumer
/// is gone.
async fn deliver<T: fmt::Debug>(tx: &mpsc::Sender<T>, item: T) -> bool {
    match tx.send_timeout(item, READ_SEND_TIMEOUT).await {
        Ok(()) => true,
        Err(mpsc::error::SendTimeoutError::Timeout(item)) => {
            warn!(item = ?item, "Stream consumer too slow, dropping item");
            true
        }
        Err(mpsc::error::SendTimeoutError::Closed(_)) => false,
    }
}

fn reader_channel<T>() -> (mpsc::Sender<T>, mpsc::Receiver<T>) {
    mpsc::channel(READ_CHANNEL_CAPACITY)
}
