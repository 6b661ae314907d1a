//! Backend events received over the realtime channel

use crate::channel::ChannelEvent;
use litra_common::models::{GlossarySuggestion, ParagraphId, TranslationResponse};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Typed backend event
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    Started {
        paragraph_id: ParagraphId,
    },
    /// Coarse job state (queued, running, completed) shown as a progress message
    Status {
        paragraph_id: ParagraphId,
        message: String,
    },
    Progress {
        paragraph_id: ParagraphId,
        progress: Option<f64>,
        current_agent: Option<String>,
        message: Option<String>,
    },
    /// Pipeline finished; carries the result when the backend includes it
    Completed {
        paragraph_id: ParagraphId,
        result: TranslationResponse,
    },
    /// Result ready for human review
    Review {
        paragraph_id: ParagraphId,
        result: TranslationResponse,
    },
    Failed {
        paragraph_id: ParagraphId,
        message: String,
    },
    GlossarySuggestion(GlossarySuggestion),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParagraphRef {
    #[serde(alias = "paragraph_id")]
    paragraph_id: ParagraphId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusPayload {
    #[serde(alias = "paragraph_id")]
    paragraph_id: ParagraphId,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressPayload {
    #[serde(alias = "paragraph_id")]
    paragraph_id: ParagraphId,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default, alias = "current_agent", alias = "agent")]
    current_agent: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorPayload {
    #[serde(alias = "paragraph_id")]
    paragraph_id: ParagraphId,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn status_message(status: &str) -> String {
    match status {
        "queued" => "Queued".to_string(),
        "running" => "Running".to_string(),
        "completed" => "Completed".to_string(),
        other => other.to_string(),
    }
}

impl RemoteEvent {
    /// Parse a channel event; unknown names and malformed payloads yield `None`
    pub fn parse(event: &ChannelEvent) -> Option<Self> {
        let payload = &event.payload;
        let parsed = match event.event_type.as_str() {
            "translation.started" => {
                from_payload::<ParagraphRef>(payload).map(|p| RemoteEvent::Started {
                    paragraph_id: p.paragraph_id,
                })
            }
            "translation.status" => from_payload::<StatusPayload>(payload).map(|p| {
                let message = p
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .or_else(|| p.status.as_deref().map(status_message))
                    .unwrap_or_default();
                RemoteEvent::Status {
                    paragraph_id: p.paragraph_id,
                    message,
                }
            }),
            "translation.progress" => {
                from_payload::<ProgressPayload>(payload).map(|p| RemoteEvent::Progress {
                    paragraph_id: p.paragraph_id,
                    progress: p.progress,
                    current_agent: p.current_agent,
                    message: p.message,
                })
            }
            "translation.completed" => from_payload::<ParagraphRef>(payload).map(|p| {
                RemoteEvent::Completed {
                    paragraph_id: p.paragraph_id,
                    result: from_payload(payload).unwrap_or_default(),
                }
            }),
            "translation.review" => from_payload::<ParagraphRef>(payload).map(|p| {
                RemoteEvent::Review {
                    paragraph_id: p.paragraph_id,
                    result: from_payload(payload).unwrap_or_default(),
                }
            }),
            "translation.error" => from_payload::<ErrorPayload>(payload).map(|p| {
                RemoteEvent::Failed {
                    paragraph_id: p.paragraph_id,
                    message: p
                        .error
                        .or(p.message)
                        .unwrap_or_else(|| "Translation failed".to_string()),
                }
            }),
            "glossary.suggestion" => {
                from_payload::<GlossarySuggestion>(payload).map(RemoteEvent::GlossarySuggestion)
            }
            _ => None,
        };
        if parsed.is_none() {
            debug!(event_type = %event.event_type, "Ignoring channel event");
        }
        parsed
    }

    pub fn paragraph_id(&self) -> Option<&ParagraphId> {
        match self {
            RemoteEvent::Started { paragraph_id }
            | RemoteEvent::Status { paragraph_id, .. }
            | RemoteEvent::Progress { paragraph_id, .. }
            | RemoteEvent::Completed { paragraph_id, .. }
            | RemoteEvent::Review { paragraph_id, .. }
            | RemoteEvent::Failed { paragraph_id, .. } => Some(paragraph_id),
            RemoteEvent::GlossarySuggestion(_) => None,
        }
    }
}

fn from_payload<T: serde::de::DeserializeOwned>(payload: &Value) -> Option<T> {
    serde_json::from_value(payload.clone()).ok()
}
