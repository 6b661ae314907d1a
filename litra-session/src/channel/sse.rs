//! Server-Sent Events transport
//!
//! Inbound events are read from `GET {url}/events`; outgoing events are
//! posted as `{type, payload}` to `{url}/emit`.

use super::transport::{Connection, FrameSink, FrameStream, InboundFrame, OutgoingFrame, Transport};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use litra_common::{Error, Result};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info};

/// SSE transport over a shared HTTP client
#[derive(Clone)]
pub struct SseTransport {
    client: reqwest::Client,
}

impl SseTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

#[async_trait]
impl Transport for SseTransport {
    async fn open(&self, url: &str) -> Result<Connection> {
        let events_url = endpoint(url, "events");
        let response = self
            .client
            .get(&events_url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Backend {
                status: status.as_u16(),
                message: format!("event stream refused at {}", events_url),
            });
        }
        info!(url = %events_url, "SSE stream opened");

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();

        Ok(Connection {
            sink: Box::new(SseSink {
                client: self.client.clone(),
                emit_url: endpoint(url, "emit"),
            }),
            stream: Box::new(SseStream {
                bytes,
                decoder: SseDecoder::default(),
                ready: VecDeque::new(),
            }),
        })
    }
}

struct SseSink {
    client: reqwest::Client,
    emit_url: String,
}

#[async_trait]
impl FrameSink for SseSink {
    async fn send(&mut self, frame: &OutgoingFrame) -> Result<()> {
        let response = self.client.post(&self.emit_url).json(frame).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Backend {
                status: status.as_u16(),
                message: format!("emit of {} rejected", frame.event_type),
            });
        }
        Ok(())
    }
}

struct SseStream {
    bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    ready: VecDeque<InboundFrame>,
}

#[async_trait]
impl FrameStream for SseStream {
    async fn next(&mut self) -> Option<Result<InboundFrame>> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Some(Ok(frame));
            }
            match self.bytes.next().await {
                Some(Ok(chunk)) => self.ready.extend(self.decoder.feed(&chunk)),
                Some(Err(e)) => return Some(Err(e.into())),
                None => return None,
            }
        }
    }
}

/// Incremental SSE parser
///
/// Bytes are buffered until a full line arrives, so multi-byte characters
/// split across chunks survive.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed a chunk, returning every event it completed
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<InboundFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(frame) = self.line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn line(&mut self, line: &str) -> Option<InboundFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<InboundFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        let parsed = serde_json::from_str::<Value>(&data).ok();

        let frame = match (event, parsed) {
            (Some(event_type), Some(payload)) => InboundFrame { event_type, payload },
            (Some(event_type), None) => InboundFrame {
                event_type,
                payload: Value::String(data),
            },
            // Unnamed events carry a `{type, payload}` envelope
            (None, Some(Value::Object(mut envelope))) => match envelope.remove("type") {
                Some(Value::String(event_type)) => InboundFrame {
                    event_type,
                    payload: envelope.remove("payload").unwrap_or(Value::Null),
                },
                _ => InboundFrame {
                    event_type: "message".to_string(),
                    payload: Value::Object(envelope),
                },
            },
            (None, Some(payload)) => InboundFrame {
                event_type: "message".to_string(),
                payload,
            },
            (None, None) => InboundFrame {
                event_type: "message".to_string(),
                payload: Value::String(data),
            },
        };
        debug!(event_type = %frame.event_type, "SSE event decoded");
        Some(frame)
    }
}
