//! Session notices and the EventBus that carries them
//!
//! Notices are what a UI shows as toasts, badges and banners. They are
//! produced by the session controller and consumed by whatever renders the
//! session; nothing in the core depends on anyone listening.

mod channel_types;

pub use channel_types::ChannelStatus;

use crate::models::ParagraphId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// User-facing session notices
///
/// Serializable so a UI bridge can forward them verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionNotice {
    /// Realtime channel status changed
    ConnectionChanged {
        status: ChannelStatus,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A single paragraph finished translating
    ///
    /// Suppressed while a batch is running.
    TranslationSucceeded {
        paragraph_id: ParagraphId,
        /// True when the translation is waiting for human review
        needs_review: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A single paragraph failed to translate
    ///
    /// Suppressed while a batch is running.
    TranslationFailed {
        paragraph_id: ParagraphId,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A translation was approved and saved
    TranslationApproved {
        paragraph_id: ParagraphId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Saving an approval failed; the paragraph is now in error
    ApprovalFailed {
        paragraph_id: ParagraphId,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Input was rejected before any network call
    ValidationRejected {
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A batch was requested with nothing pending
    BatchNothingPending {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A batch run finished
    BatchFinished {
        success_count: usize,
        failed_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A new review is available for the reviewer
    ReviewReady {
        paragraph_id: ParagraphId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A glossary term was proposed by an agent
    GlossarySuggested {
        term: String,
        suggested_translation: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Central notice distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block the session)
/// - Multiple concurrent subscribers
/// - Lagged subscribers are told how many notices they missed
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionNotice>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use litra_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// let _notices = event_bus.subscribe();
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future notices
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.tx.subscribe()
    }

    /// Emit a notice, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, notice: SessionNotice) {
        let _ = self.tx.send(notice);
    }
}
