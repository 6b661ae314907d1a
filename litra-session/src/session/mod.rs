//! Live translation session
//!
//! A session covers one chapter of one book. [`SessionController`] is the
//! entry point for user operations; it spawns the session actor (sole owner
//! of the mutable state) and the bridge that feeds it realtime events.

mod actor;
mod bridge;
mod controller;
pub mod remote;

pub use actor::{ParagraphView, SessionSnapshot};
pub use controller::{SessionController, TranslationMode, TranslationOutcome};
pub use remote::RemoteEvent;

use crate::api::{BackendClient, GlossaryStore, ParagraphStore, Translator};
use crate::channel::{ChannelOptions, EventChannel, SseTransport};
use crate::error::SessionResult;
use litra_common::config::TomlConfig;
use litra_common::models::{BookId, ChapterId};
use std::sync::Arc;
use tracing::info;

/// Per-session settings taken from configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub source_language: String,
    pub target_language: String,
    pub max_paragraph_chars: usize,
    pub max_concurrency: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&TomlConfig::default())
    }
}

impl From<&TomlConfig> for SessionSettings {
    fn from(config: &TomlConfig) -> Self {
        Self {
            source_language: config.source_language.clone(),
            target_language: config.target_language.clone(),
            max_paragraph_chars: config.max_paragraph_chars,
            max_concurrency: config.batch.max_concurrency,
        }
    }
}

/// Everything a session depends on
pub struct SessionContext {
    pub book_id: BookId,
    pub chapter_id: ChapterId,
    pub paragraphs: Arc<dyn ParagraphStore>,
    pub translator: Arc<dyn Translator>,
    pub glossary: Arc<dyn GlossaryStore>,
    pub channel: EventChannel,
    pub settings: SessionSettings,
}

impl SessionContext {
    /// Context backed by the HTTP backend and, when configured, the SSE channel
    ///
    /// Must be called from within a tokio runtime when realtime is enabled.
    pub fn from_config(
        book_id: impl Into<BookId>,
        chapter_id: impl Into<ChapterId>,
        config: &TomlConfig,
    ) -> SessionResult<Self> {
        let client = Arc::new(BackendClient::new(config.backend_url.clone())?);

        let channel = match config.effective_channel_url() {
            Some(url) => {
                info!(url = %url, "Realtime channel enabled");
                EventChannel::connect(
                    url,
                    Arc::new(SseTransport::new()?),
                    ChannelOptions::from(&config.reconnect),
                )
            }
            None => {
                info!("Realtime channel disabled");
                EventChannel::disabled()
            }
        };

        Ok(Self {
            book_id: book_id.into(),
            chapter_id: chapter_id.into(),
            paragraphs: client.clone(),
            translator: client.clone(),
            glossary: client,
            channel,
            settings: SessionSettings::from(config),
        })
    }
}
