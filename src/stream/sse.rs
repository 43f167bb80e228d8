// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Server-sent events framing.

use axum::body::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{deliver, reader_channel, Event};

pub const CONTENT_TYPE: &str = "text/event-stream";

/// Event name assumed by clients when none is sent.
pub const DEFAULT_EVENT: &str = "message";

/// Frame one event as `id`, `event`, `data`, `retry` lines and a blank line.
pub fn encode(event: &Event) -> Bytes {
    let mut buf = String::new();
    write_field(&mut buf, "id", &event.id);
    if event.event != DEFAULT_EVENT {
        write_field(&mut buf, "event", &event.event);
    }
    write_field(&mut buf, "data", &event.data);
    write_field(&mut buf, "retry", &event.retry);
    buf.push('\n');
    Bytes::from(buf)
}

fn write_field(buf: &mut String, field: &str, value: &str) {
    for line in value.split(['\r', '\n']).filter(|line| !line.is_empty()) {
        buf.push_str(field);
        buf.push_str(": ");
        buf.push_str(line);
        buf.push('\n');
    }
}

/// Line reader accepting CR, LF and CRLF endings.
struct Lines<R> {
    reader: BufReader<R>,
    after_cr: bool,
}

impl<R: AsyncRead + Unpin> Lines<R> {
    fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            after_cr: false,
        }
    }

    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let mut line = Vec::new();
        loop {
            let (used, done) = {
                let buf = self.reader.fill_buf().await?;
                if buf.is_empty() {
                    if line.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
                }

                let start = usize::from(std::mem::take(&mut self.after_cr) && buf[0] == b'\n');
                match buf[start..].iter().position(|b| *b == b'\r' || *b == b'\n') {
                    Some(pos) => {
                        let end = start + pos;
                        line.extend_from_slice(&buf[start..end]);
                        self.after_cr = buf[end] == b'\r';
                        (end + 1, true)
                    }
                    None => {
                        line.extend_from_slice(&buf[start..]);
                        (buf.len(), false)
                    }
                }
            };
            self.reader.consume(used);
            if done {
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
        }
    }
}

enum Field<'a> {
    EndOfEvent,
    Ignored,
    Value(&'a str, &'a str),
}

fn parse_field(line: &str) -> Field<'_> {
    if line.is_empty() {
        return Field::EndOfEvent;
    }
    match line.find(':') {
        Some(colon) if colon > 1 && !line.starts_with('#') => {
            Field::Value(&line[..colon], line[colon + 1..].trim())
        }
        _ => Field::Ignored,
    }
}

fn append(target: &mut String, value: &str) {
    if !target.is_empty() {
        target.push('\n');
    }
    target.push_str(value);
}

/// Read events from `input` until EOF, a read error or `ctx` firing.
///
/// A delivery that waits longer than [`super::READ_SEND_TIMEOUT`] is dropped.
pub fn reader<R>(input: R, ctx: CancellationToken) -> mpsc::Receiver<Event>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = reader_channel();
    tokio::spawn(async move {
        let mut lines = Lines::new(input);
        let mut event = Event::default();
        loop {
            let line = tokio::select! {
                _ = ctx.cancelled() => return,
                line = lines.next_line() => line,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => return,
                Err(err) => {
                    warn!(error = %err, "Failed to read event stream");
                    return;
                }
            };

            match parse_field(&line) {
                Field::EndOfEvent => {
                    let mut done = std::mem::take(&mut event);
                    if done.event.is_empty() {
                        done.event = DEFAULT_EVENT.to_string();
                    }
                    if !deliver(&tx, done).await {
                        return;
                    }
                }
                Field::Ignored => {}
                Field::Value("event", value) => append(&mut event.event, value),
                Field::Value("data", value) => append(&mut event.data, value),
                Field::Value("id", value) => append(&mut event.id, value),
                Field::Value("retry", value) => append(&mut event.retry, value),
                Field::Value(name, value) => debug!(name, value, "Ignoring unknown event field"),
            }
        }
    });
    rx
}
