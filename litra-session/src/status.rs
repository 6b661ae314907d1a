//! Per-paragraph status reducer
//!
//! Tracks the session-local status of every paragraph:
//!
//! ```text
//!   pending ──start──▶ translating ──await review──▶ review ──approved──▶ approved
//!                        │   ▲  │                       │
//!                        │   └──┘ progress              │
//!                        ├────────────approved──────────┼──────────────▶ approved
//!                        └──failed──▶ error ◀──failed───┘
//!                                      │
//!                                      └──retry──▶ translating
//! ```
//!
//! Editing the source text of a translated paragraph resets it to pending.
//!
//! The reducer is pure: it never talks to the backend. Callers persist first
//! and only then apply [`StatusAction::Approved`], so a paragraph is never shown
//! approved before the save succeeded.

use crate::error::{SessionError, SessionResult};
use litra_common::models::{ParagraphId, ParagraphStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Session-local paragraph status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiStatus {
    Pending,
    Translating,
    Review,
    Approved,
    Error,
}

impl UiStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UiStatus::Pending => "pending",
            UiStatus::Translating => "translating",
            UiStatus::Review => "review",
            UiStatus::Approved => "approved",
            UiStatus::Error => "error",
        }
    }

    /// Initial session status for a freshly loaded paragraph
    pub fn from_persisted(status: ParagraphStatus) -> Self {
        match status {
            ParagraphStatus::Pending => UiStatus::Pending,
            // Stored but not approved: waiting for a human
            ParagraphStatus::Translated => UiStatus::Review,
            ParagraphStatus::Approved => UiStatus::Approved,
        }
    }

    /// Statuses owned by in-flight session work; a refresh must not overwrite them
    pub fn is_session_local(&self) -> bool {
        matches!(self, UiStatus::Translating | UiStatus::Error)
    }
}

impl std::fmt::Display for UiStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted status implied by a session status
///
/// Returns `None` for `error`, which has no persisted equivalent.
pub fn persisted_projection(status: UiStatus, has_translation: bool) -> Option<ParagraphStatus> {
    match status {
        UiStatus::Pending => Some(ParagraphStatus::Pending),
        UiStatus::Translating | UiStatus::Review => Some(if has_translation {
            ParagraphStatus::Translated
        } else {
            ParagraphStatus::Pending
        }),
        UiStatus::Approved => Some(ParagraphStatus::Approved),
        UiStatus::Error => None,
    }
}

/// Ephemeral translation progress of one paragraph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslationProgress {
    /// 0–100
    pub progress: u8,
    pub current_agent: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
}

/// Where a translation start came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOrigin {
    /// User pressed translate (or a batch worker picked the paragraph)
    Local,
    /// User retried a failed paragraph
    Retry,
    /// Backend announced it started
    Remote,
}

/// Input to the reducer
#[derive(Debug, Clone, PartialEq)]
pub enum StatusAction {
    Start {
        paragraph_id: ParagraphId,
        origin: StartOrigin,
    },
    Progress {
        paragraph_id: ParagraphId,
        /// Percent; out-of-range values are clamped
        progress: Option<f64>,
        current_agent: Option<String>,
        message: Option<String>,
    },
    AwaitReview {
        paragraph_id: ParagraphId,
    },
    /// Applied only after the approved translation was persisted
    Approved {
        paragraph_id: ParagraphId,
    },
    Failed {
        paragraph_id: ParagraphId,
        message: String,
    },
    SourceEdited {
        paragraph_id: ParagraphId,
        had_translation: bool,
    },
}

impl StatusAction {
    pub fn paragraph_id(&self) -> &ParagraphId {
        match self {
            StatusAction::Start { paragraph_id, .. }
            | StatusAction::Progress { paragraph_id, .. }
            | StatusAction::AwaitReview { paragraph_id }
            | StatusAction::Approved { paragraph_id }
            | StatusAction::Failed { paragraph_id, .. }
            | StatusAction::SourceEdited { paragraph_id, .. } => paragraph_id,
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            StatusAction::Start {
                origin: StartOrigin::Retry,
                ..
            } => "retry",
            StatusAction::Start { .. } => "translate",
            StatusAction::Progress { .. } => "update progress of",
            StatusAction::AwaitReview { .. } => "send to review",
            StatusAction::Approved { .. } => "approve",
            StatusAction::Failed { .. } => "fail",
            StatusAction::SourceEdited { .. } => "edit",
        }
    }
}

/// Outcome of applying an action
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Changed { from: UiStatus, to: UiStatus },
    /// Status unchanged, progress fields updated
    Updated,
    /// Stale or irrelevant remote input, dropped
    Ignored,
}

/// Session status and progress of one paragraph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParagraphState {
    pub status: UiStatus,
    pub progress: Option<TranslationProgress>,
}

impl Default for ParagraphState {
    fn default() -> Self {
        Self {
            status: UiStatus::Pending,
            progress: None,
        }
    }
}

/// Status map keyed by paragraph id
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    states: HashMap<ParagraphId, ParagraphState>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status (paragraphs never seen are pending)
    pub fn status(&self, paragraph_id: &str) -> UiStatus {
        self.states
            .get(paragraph_id)
            .map(|s| s.status)
            .unwrap_or(UiStatus::Pending)
    }

    pub fn state(&self, paragraph_id: &str) -> Option<&ParagraphState> {
        self.states.get(paragraph_id)
    }

    pub fn progress(&self, paragraph_id: &str) -> Option<&TranslationProgress> {
        self.states.get(paragraph_id).and_then(|s| s.progress.as_ref())
    }

    /// Seed a status from persisted data, keeping in-flight session statuses
    pub fn seed(&mut self, paragraph_id: &str, persisted: ParagraphStatus) {
        let entry = self.states.entry(paragraph_id.to_string()).or_default();
        if entry.status.is_session_local() {
            return;
        }
        entry.status = UiStatus::from_persisted(persisted);
        entry.progress = None;
    }

    /// Forget paragraphs that no longer exist
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.states.retain(|id, _| keep(id));
    }

    /// Apply one action
    ///
    /// Local actions that don't fit the current status are rejected with
    /// [`SessionError::InvalidTransition`]; remote progress that arrives for a
    /// paragraph that is no longer translating is ignored.
    pub fn apply(&mut self, action: StatusAction) -> SessionResult<Transition> {
        let paragraph_id = action.paragraph_id().clone();
        let current = self.status(&paragraph_id);

        let transition = match (&action, current) {
            (
                StatusAction::Start {
                    origin: StartOrigin::Remote,
                    ..
                },
                _,
            ) => {
                let progress = Some(TranslationProgress::default());
                self.enter(&paragraph_id, UiStatus::Translating, progress)
            }

            (StatusAction::Start { origin: StartOrigin::Retry, .. }, UiStatus::Error)
            | (
                StatusAction::Start {
                    origin: StartOrigin::Local,
                    ..
                },
                UiStatus::Pending | UiStatus::Review | UiStatus::Approved | UiStatus::Error,
            ) => {
                let progress = Some(TranslationProgress::default());
                self.enter(&paragraph_id, UiStatus::Translating, progress)
            }

            (
                StatusAction::Progress {
                    progress,
                    current_agent,
                    message,
                    ..
                },
                UiStatus::Translating | UiStatus::Pending,
            ) => {
                let percent = match progress {
                    Some(_) => clamp_percent(*progress),
                    // Message-only updates keep the last known percentage
                    None => self.progress(&paragraph_id).map(|p| p.progress).unwrap_or(0),
                };
                let snapshot = TranslationProgress {
                    progress: percent,
                    current_agent: current_agent.clone(),
                    message: message.clone(),
                    error: None,
                };
                if current == UiStatus::Pending {
                    // "started" was missed; progress implies the work is running
                    self.enter(&paragraph_id, UiStatus::Translating, Some(snapshot))
                } else {
                    let entry = self.states.entry(paragraph_id.clone()).or_default();
                    entry.progress = Some(snapshot);
                    Transition::Updated
                }
            }
            (StatusAction::Progress { .. }, _) => {
                debug!(
                    paragraph_id = %paragraph_id,
                    status = %current,
                    "Dropping progress for settled paragraph"
                );
                Transition::Ignored
            }

            (
                StatusAction::AwaitReview { .. },
                UiStatus::Translating | UiStatus::Pending | UiStatus::Review,
            ) => {
                self.enter(&paragraph_id, UiStatus::Review, None)
            }

            (
                StatusAction::Approved { .. },
                UiStatus::Translating | UiStatus::Review | UiStatus::Approved,
            ) => {
                self.enter(&paragraph_id, UiStatus::Approved, None)
            }

            (StatusAction::Failed { message, .. }, UiStatus::Translating | UiStatus::Review) => {
                let progress = TranslationProgress {
                    error: Some(message.clone()),
                    ..Default::default()
                };
                self.enter(&paragraph_id, UiStatus::Error, Some(progress))
            }

            (StatusAction::SourceEdited { had_translation, .. }, status)
                if status != UiStatus::Translating =>
            {
                if status != UiStatus::Pending && (*had_translation || status == UiStatus::Error) {
                    self.enter(&paragraph_id, UiStatus::Pending, None)
                } else {
                    Transition::Ignored
                }
            }

            (action, from) => {
                return Err(SessionError::InvalidTransition {
                    paragraph_id,
                    from,
                    action: action.verb(),
                });
            }
        };

        Ok(transition)
    }

    fn enter(
        &mut self,
        paragraph_id: &str,
        to: UiStatus,
        progress: Option<TranslationProgress>,
    ) -> Transition {
        let entry = self.states.entry(paragraph_id.to_string()).or_default();
        let from = entry.status;
        entry.status = to;
        entry.progress = progress;
        debug!(paragraph_id = %paragraph_id, %from, %to, "Paragraph status transition");
        Transition::Changed { from, to }
    }
}

fn clamp_percent(progress: Option<f64>) -> u8 {
    match progress {
        Some(p) if p.is_finite() => p.round().clamp(0.0, 100.0) as u8,
        _ => 0,
    }
}
