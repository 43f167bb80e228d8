// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Newline-delimited JSON framing.

use axum::body::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{deliver, reader_channel, StreamError};

pub const CONTENT_TYPE: &str = "application/x-json-stream";

pub fn encode<T: Serialize>(data: &T) -> Result<Bytes, StreamError> {
    let mut line = serde_json::to_vec(data)?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}

/// Decode one value per line from `input` until EOF, a malformed line or
/// `ctx` firing. Blank lines are skipped.
pub fn reader<T, R>(input: R, ctx: CancellationToken) -> mpsc::Receiver<T>
where
    T: DeserializeOwned + std::fmt::Debug + Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = reader_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(input).lines();
        loop {
            let line = tokio::select! {
                _ = ctx.cancelled() => return,
                line = lines.next_line() => line,
            };
            let line = match line {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => line,
                Ok(None) => return,
                Err(err) => {
                    warn!(error = %err, "Failed to read NDJSON stream");
                    return;
                }
            };

            let value = match serde_json::from_str::<T>(&line) {
                Ok(value) => value,
                Err(err) => {
                    warn!(error = %err, "Malformed NDJSON line, closing stream");
                    return;
                }
            };
            if !deliver(&tx, value).await {
                return;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::{io::Cursor, time::Duration};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Tick {
        n: u32,
    }

    async fn read_all(input: &str) -> Vec<Tick> {
        let mut rx = reader(Cursor::new(input.as_bytes().to_vec()), CancellationToken::new());
        let mut got = Vec::new();
        while let Some(tick) = rx.recv().await {
            got.push(tick);
        }
        got
    }

    #[test]
    fn encode_writes_one_compact_line() {
        let bytes = encode(&serde_json::json!({"a": [1, 2], "b": "x\ny"})).unwrap();
        assert_eq!(&bytes[..], b"{\"a\":[1,2],\"b\":\"x\\ny\"}\n");
    }

    #[tokio::test]
    async fn reads_values_in_order() {
        let got = read_all("{\"n\":1}\n\n{\"n\":2}\r\n{\"n\":3}").await;
        assert_eq!(got, vec![Tick { n: 1 }, Tick { n: 2 }, Tick { n: 3 }]);
    }

    #[tokio::test]
    async fn malformed_line_ends_stream() {
        let got = read_all("{\"n\":1}\nnot json\n{\"n\":2}\n").await;
        assert_eq!(got, vec![Tick { n: 1 }]);
    }

    #[tokio::test]
    async fn slow_consumer_loses_values() {
        let input: String = (0..40).map(|n| format!("{{\"n\":{n}}}\n")).collect();
        let mut rx = reader::<Tick, _>(Cursor::new(input.into_bytes()), CancellationToken::new());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let mut got = Vec::new();
        while let Some(tick) = rx.recv().await {
            got.push(tick.n);
        }
        assert!(got.len() < 40);
        assert_eq!(got[0], 0);
    }
}
