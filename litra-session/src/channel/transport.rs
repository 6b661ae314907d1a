//! Transport seam for the realtime channel
//!
//! A transport opens one connection at a time and hands back its two halves.
//! The channel task owns both and drives them from a single `select!`.

use async_trait::async_trait;
use litra_common::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event sent from the client to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingFrame {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: Value,
}

impl OutgoingFrame {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }
}

/// Event received from the server, before it is timestamped
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub event_type: String,
    pub payload: Value,
}

/// An open connection
pub struct Connection {
    pub sink: Box<dyn FrameSink>,
    pub stream: Box<dyn FrameStream>,
}

/// Opens connections to a channel URL
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self, url: &str) -> Result<Connection>;
}

/// Sending half of a connection
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: &OutgoingFrame) -> Result<()>;
}

/// Receiving half of a connection
#[async_trait]
pub trait FrameStream: Send {
    /// Next inbound frame; `None` once the server closed the connection
    async fn next(&mut self) -> Option<Result<InboundFrame>>;
}
