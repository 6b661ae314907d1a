//! Error types for the session controller

use crate::status::UiStatus;
use litra_common::models::ParagraphId;
use thiserror::Error;

/// Session controller error
#[derive(Debug, Error)]
pub enum SessionError {
    /// Input rejected before any network call
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Paragraph id not present in the session
    #[error("Unknown paragraph: {0}")]
    UnknownParagraph(ParagraphId),

    /// Action not allowed from the paragraph's current status
    #[error("Cannot {action} paragraph {paragraph_id} while {from}")]
    InvalidTransition {
        paragraph_id: ParagraphId,
        from: UiStatus,
        action: &'static str,
    },

    /// Translation call succeeded but returned no usable text
    #[error("Translation of paragraph {0} returned no text")]
    MissingTranslation(ParagraphId),

    /// No review is currently open
    #[error("No review is waiting")]
    NoCurrentReview,

    /// Glossary suggestion id not present in the inbox
    #[error("Unknown glossary suggestion: {0}")]
    UnknownSuggestion(String),

    /// A batch is already running in this session
    #[error("A batch translation is already running")]
    BatchInProgress,

    /// Realtime channel is disabled or stopped
    #[error("Channel error: {0}")]
    Channel(String),

    /// Session actor has stopped
    #[error("Session is closed")]
    SessionClosed,

    /// Backend or shared-library error
    #[error(transparent)]
    Common(#[from] litra_common::Error),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
