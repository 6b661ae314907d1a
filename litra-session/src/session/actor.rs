//! Session actor
//!
//! Single owner of all mutable session state. The controller, the batch
//! workers and the channel bridge only send it messages, so messages are
//! applied strictly in arrival order.

use super::remote::RemoteEvent;
use crate::channel::ConnectionState;
use crate::error::SessionResult;
use crate::hitl::{ResolvedReview, ReviewOutcome, ReviewQueue, TranslationReview};
use crate::review;
use crate::status::{ParagraphState, StartOrigin, StatusAction, StatusBoard, Transition, UiStatus};
use litra_common::events::{ChannelStatus, EventBus, SessionNotice};
use litra_common::models::{
    BookId, ChapterId, GlossarySuggestion, GlossaryTerm, Paragraph, ParagraphId, ParagraphStatus,
};
use litra_common::time;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Messages understood by the actor
pub(crate) enum SessionMessage {
    /// Replace the paragraph cache with a fresh backend listing
    LoadParagraphs(Vec<Paragraph>),
    /// A paragraph was persisted; update the cached copy
    ParagraphSaved(Paragraph),
    /// Reducer action from a local operation
    Apply {
        action: StatusAction,
        reply: oneshot::Sender<SessionResult<Transition>>,
    },
    Lookup {
        paragraph_id: ParagraphId,
        reply: oneshot::Sender<Option<ParagraphLookup>>,
    },
    /// Local translation dropped while in flight
    Abandoned(ParagraphId),
    OfferReview(TranslationReview),
    ResolveReview {
        /// `None` resolves the current review
        paragraph_id: Option<ParagraphId>,
        outcome: ReviewOutcome,
        reply: oneshot::Sender<Option<TranslationReview>>,
    },
    SetThread {
        paragraph_id: ParagraphId,
        thread_id: String,
    },
    SetGlossary(Vec<GlossaryTerm>),
    AddTerm(GlossaryTerm),
    SetSuggestions(Vec<GlossarySuggestion>),
    AddSuggestion(GlossarySuggestion),
    TakeSuggestion {
        id: String,
        reply: oneshot::Sender<Option<GlossarySuggestion>>,
    },
    SetBatchRunning(bool),
    Remote(RemoteEvent),
    Connection(ConnectionState),
    Snapshot(oneshot::Sender<SessionSnapshot>),
}

/// Everything a local operation needs to know about one paragraph
#[derive(Debug, Clone)]
pub(crate) struct ParagraphLookup {
    pub paragraph: Paragraph,
    pub status: UiStatus,
    pub thread_id: Option<String>,
    /// Translation of the paragraph's open review, if any
    pub review_translation: Option<String>,
    pub glossary: Vec<GlossaryTerm>,
}

/// One paragraph as shown to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParagraphView {
    pub paragraph: Paragraph,
    #[serde(flatten)]
    pub state: ParagraphState,
}

/// Read-only copy of the session state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub book_id: BookId,
    pub chapter_id: ChapterId,
    pub paragraphs: Vec<ParagraphView>,
    pub current_review: Option<TranslationReview>,
    pub waiting_reviews: usize,
    /// Reviews resolved so far, oldest first
    pub resolved_reviews: Vec<ResolvedReview>,
    pub suggestions: Vec<GlossarySuggestion>,
    pub glossary: Vec<GlossaryTerm>,
    pub connection: ConnectionState,
    pub batch_running: bool,
}

impl SessionSnapshot {
    pub fn paragraph(&self, paragraph_id: &str) -> Option<&ParagraphView> {
        self.paragraphs.iter().find(|p| p.paragraph.id == paragraph_id)
    }

    pub fn status(&self, paragraph_id: &str) -> Option<UiStatus> {
        self.paragraph(paragraph_id).map(|p| p.state.status)
    }

    pub fn connection_status(&self) -> ChannelStatus {
        self.connection.status()
    }

    /// Paragraphs a batch would translate
    pub fn pending_ids(&self) -> Vec<ParagraphId> {
        self.paragraphs
            .iter()
            .filter(|p| p.state.status == UiStatus::Pending)
            .map(|p| p.paragraph.id.clone())
            .collect()
    }
}

pub(crate) struct SessionActor {
    book_id: BookId,
    chapter_id: ChapterId,
    rx: mpsc::Receiver<SessionMessage>,
    notices: EventBus,
    board: StatusBoard,
    paragraphs: Vec<Paragraph>,
    reviews: ReviewQueue,
    suggestions: Vec<GlossarySuggestion>,
    glossary: Vec<GlossaryTerm>,
    threads: HashMap<ParagraphId, String>,
    /// Paragraphs with a local translation call in flight
    in_flight: HashSet<ParagraphId>,
    connection: ConnectionState,
    batch_running: bool,
}

impl SessionActor {
    pub fn new(
        book_id: BookId,
        chapter_id: ChapterId,
        rx: mpsc::Receiver<SessionMessage>,
        notices: EventBus,
        connection: ConnectionState,
    ) -> Self {
        Self {
            book_id,
            chapter_id,
            rx,
            notices,
            board: StatusBoard::new(),
            paragraphs: Vec::new(),
            reviews: ReviewQueue::new(),
            suggestions: Vec::new(),
            glossary: Vec::new(),
            threads: HashMap::new(),
            in_flight: HashSet::new(),
            connection,
            batch_running: false,
        }
    }

    /// Process messages until every sender is gone
    pub async fn run(mut self) {
        debug!(chapter_id = %self.chapter_id, "Session actor started");
        while let Some(message) = self.rx.recv().await {
            self.handle(message);
        }
        debug!(chapter_id = %self.chapter_id, "Session actor stopped");
    }

    fn handle(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::LoadParagraphs(paragraphs) => self.load(paragraphs),
            SessionMessage::ParagraphSaved(paragraph) => self.store(paragraph),
            SessionMessage::Apply { action, reply } => {
                let result = self.apply_local(action);
                let _ = reply.send(result);
            }
            SessionMessage::Lookup { paragraph_id, reply } => {
                let _ = reply.send(self.lookup(&paragraph_id));
            }
            SessionMessage::Abandoned(paragraph_id) => self.abandon(paragraph_id),
            SessionMessage::OfferReview(review) => self.offer_review(review),
            SessionMessage::ResolveReview {
                paragraph_id,
                outcome,
                reply,
            } => {
                let resolved = match paragraph_id {
                    Some(id) => self.reviews.resolve_for(&id, outcome),
                    None => self.reviews.resolve_current(outcome),
                };
                self.announce_current_review(resolved.is_some());
                let _ = reply.send(resolved);
            }
            SessionMessage::SetThread {
                paragraph_id,
                thread_id,
            } => {
                self.threads.insert(paragraph_id, thread_id);
            }
            SessionMessage::SetGlossary(terms) => self.glossary = terms,
            SessionMessage::AddTerm(term) => {
                self.glossary.retain(|t| t.id != term.id);
                self.glossary.push(term);
            }
            SessionMessage::SetSuggestions(suggestions) => {
                // Keep channel-pushed suggestions the inbox doesn't know yet
                let mut merged = suggestions;
                for local in self.suggestions.drain(..) {
                    if !merged.iter().any(|s| s.id == local.id || s.term == local.term) {
                        merged.push(local);
                    }
                }
                self.suggestions = merged;
            }
            SessionMessage::AddSuggestion(suggestion) => self.add_suggestion(suggestion, false),
            SessionMessage::TakeSuggestion { id, reply } => {
                let taken = self
                    .suggestions
                    .iter()
                    .position(|s| s.id == id)
                    .map(|pos| self.suggestions.remove(pos));
                let _ = reply.send(taken);
            }
            SessionMessage::SetBatchRunning(running) => self.batch_running = running,
            SessionMessage::Remote(event) => self.apply_remote(event),
            SessionMessage::Connection(state) => {
                if state.status() != self.connection.status() {
                    info!(status = %state.status(), "Realtime channel status changed");
                    self.notices.emit_lossy(SessionNotice::ConnectionChanged {
                        status: state.status(),
                        timestamp: time::now(),
                    });
                }
                self.connection = state;
            }
            SessionMessage::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn load(&mut self, mut paragraphs: Vec<Paragraph>) {
        paragraphs.sort_by_key(|p| p.index);
        for paragraph in &paragraphs {
            self.board.seed(&paragraph.id, paragraph.status);
        }
        let ids: HashSet<ParagraphId> = paragraphs.iter().map(|p| p.id.clone()).collect();
        self.board.retain(|id| ids.contains(id));
        self.reviews.retain_paragraphs(|id| ids.contains(id));
        self.threads.retain(|id, _| ids.contains(id));
        debug!(chapter_id = %self.chapter_id, count = paragraphs.len(), "Paragraphs loaded");
        self.paragraphs = paragraphs;
    }

    fn store(&mut self, paragraph: Paragraph) {
        match self.paragraphs.iter_mut().find(|p| p.id == paragraph.id) {
            Some(slot) => *slot = paragraph,
            None => {
                self.board.seed(&paragraph.id, paragraph.status);
                self.paragraphs.push(paragraph);
                self.paragraphs.sort_by_key(|p| p.index);
            }
        }
    }

    fn lookup(&self, paragraph_id: &str) -> Option<ParagraphLookup> {
        let paragraph = self.paragraphs.iter().find(|p| p.id == paragraph_id)?;
        let review_translation = self
            .reviews
            .current()
            .into_iter()
            .chain(self.reviews.waiting())
            .find(|r| r.paragraph_id == paragraph_id)
            .map(|r| r.translation.clone());
        Some(ParagraphLookup {
            paragraph: paragraph.clone(),
            status: self.board.status(paragraph_id),
            thread_id: self.threads.get(paragraph_id).cloned(),
            review_translation,
            glossary: self.glossary.clone(),
        })
    }

    fn apply_local(&mut self, action: StatusAction) -> SessionResult<Transition> {
        let paragraph_id = action.paragraph_id().clone();
        if !self.paragraphs.iter().any(|p| p.id == paragraph_id) {
            return Err(crate::SessionError::UnknownParagraph(paragraph_id));
        }

        let starting = matches!(action, StatusAction::Start { .. });
        let settling = matches!(
            action,
            StatusAction::AwaitReview { .. }
                | StatusAction::Approved { .. }
                | StatusAction::Failed { .. }
        );
        let approved = matches!(action, StatusAction::Approved { .. });
        let edited = matches!(action, StatusAction::SourceEdited { .. });

        let transition = self.board.apply(action)?;

        if starting {
            self.in_flight.insert(paragraph_id.clone());
        }
        if settling {
            self.in_flight.remove(&paragraph_id);
        }
        if approved {
            let resolved = self.reviews.resolve_for(&paragraph_id, ReviewOutcome::Approved);
            self.announce_current_review(resolved.is_some());
        }
        if edited {
            let resolved = self.reviews.resolve_for(&paragraph_id, ReviewOutcome::Superseded);
            self.announce_current_review(resolved.is_some());
            self.threads.remove(&paragraph_id);
        }
        Ok(transition)
    }

    /// Move a dropped in-flight translation to error so it can be retried
    fn abandon(&mut self, paragraph_id: ParagraphId) {
        if !self.in_flight.contains(&paragraph_id) {
            return;
        }
        let message = "Translation cancelled".to_string();
        let failed = self.apply_local(StatusAction::Failed {
            paragraph_id: paragraph_id.clone(),
            message: message.clone(),
        });
        match failed {
            Ok(_) => {
                warn!(paragraph_id = %paragraph_id, "Translation cancelled before it finished");
                self.notices.emit_lossy(SessionNotice::TranslationFailed {
                    paragraph_id,
                    message,
                    timestamp: time::now(),
                });
            }
            Err(e) => {
                self.in_flight.remove(&paragraph_id);
                debug!(paragraph_id = %paragraph_id, error = %e, "Cancelled translation kept");
            }
        }
    }

    fn offer_review(&mut self, review: TranslationReview) {
        let paragraph_id = review.paragraph_id.clone();
        if self.reviews.offer(review) {
            self.announce_review(&paragraph_id);
        }
    }

    /// After a resolve, tell the reviewer about the promoted review
    fn announce_current_review(&self, resolved: bool) {
        if !resolved {
            return;
        }
        if let Some(current) = self.reviews.current() {
            self.announce_review(&current.paragraph_id);
        }
    }

    fn announce_review(&self, paragraph_id: &ParagraphId) {
        if self.batch_running {
            return;
        }
        self.notices.emit_lossy(SessionNotice::ReviewReady {
            paragraph_id: paragraph_id.clone(),
            timestamp: time::now(),
        });
    }

    fn add_suggestion(&mut self, suggestion: GlossarySuggestion, announce: bool) {
        if self
            .suggestions
            .iter()
            .any(|s| s.id == suggestion.id || s.term == suggestion.term)
        {
            debug!(term = %suggestion.term, "Duplicate glossary suggestion dropped");
            return;
        }
        if announce {
            self.notices.emit_lossy(SessionNotice::GlossarySuggested {
                term: suggestion.term.clone(),
                suggested_translation: suggestion.suggested_translation.clone(),
                timestamp: time::now(),
            });
        }
        self.suggestions.push(suggestion);
    }

    fn apply_remote(&mut self, event: RemoteEvent) {
        if let Some(paragraph_id) = event.paragraph_id() {
            if !self.paragraphs.iter().any(|p| &p.id == paragraph_id) {
                debug!(paragraph_id = %paragraph_id, "Event for paragraph outside this chapter");
                return;
            }
        }

        match event {
            RemoteEvent::Started { paragraph_id } => {
                self.reduce_remote(StatusAction::Start {
                    paragraph_id,
                    origin: StartOrigin::Remote,
                });
            }
            RemoteEvent::Status {
                paragraph_id,
                message,
            } => {
                self.reduce_remote(StatusAction::Progress {
                    paragraph_id,
                    progress: None,
                    current_agent: None,
                    message: Some(message),
                });
            }
            RemoteEvent::Progress {
                paragraph_id,
                progress,
                current_agent,
                message,
            } => {
                self.reduce_remote(StatusAction::Progress {
                    paragraph_id,
                    progress,
                    current_agent,
                    message,
                });
            }
            RemoteEvent::Completed {
                paragraph_id,
                result,
            }
            | RemoteEvent::Review {
                paragraph_id,
                result,
            } => {
                if self.in_flight.contains(&paragraph_id) {
                    // The local call owns the outcome
                    return;
                }
                if let Some(thread_id) = result.thread_id.clone() {
                    self.threads.insert(paragraph_id.clone(), thread_id);
                }
                let Some(text) = result.text().map(str::to_string) else {
                    debug!(paragraph_id = %paragraph_id, "Completion without text");
                    return;
                };
                let stored_approved = self
                    .paragraphs
                    .iter()
                    .any(|p| p.id == paragraph_id && p.status == ParagraphStatus::Approved);
                if stored_approved {
                    // Approved elsewhere; nothing left to review
                    if self
                        .reduce_remote(StatusAction::Approved {
                            paragraph_id: paragraph_id.clone(),
                        })
                        .is_some()
                    {
                        self.set_cached_text(&paragraph_id, &text);
                    }
                    let resolved = self.reviews.resolve_for(&paragraph_id, ReviewOutcome::Approved);
                    self.announce_current_review(resolved.is_some());
                    return;
                }
                if let Some(Transition::Changed { .. } | Transition::Updated) =
                    self.reduce_remote(StatusAction::AwaitReview {
                        paragraph_id: paragraph_id.clone(),
                    })
                {
                    self.set_cached_text(&paragraph_id, &text);
                    let analysis = review::normalize(
                        result.review_package.as_ref(),
                        result.agent_outputs.as_ref(),
                        result.enforcement_report.as_ref(),
                    );
                    self.offer_review(TranslationReview::new(paragraph_id, text, analysis));
                }
            }
            RemoteEvent::Failed {
                paragraph_id,
                message,
            } => {
                if self.in_flight.contains(&paragraph_id) {
                    return;
                }
                let failed = self.reduce_remote(StatusAction::Failed {
                    paragraph_id: paragraph_id.clone(),
                    message: message.clone(),
                });
                if failed.is_some() && !self.batch_running {
                    self.notices.emit_lossy(SessionNotice::TranslationFailed {
                        paragraph_id,
                        message,
                        timestamp: time::now(),
                    });
                }
            }
            RemoteEvent::GlossarySuggestion(suggestion) => self.add_suggestion(suggestion, true),
        }
    }

    fn set_cached_text(&mut self, paragraph_id: &str, text: &str) {
        if let Some(paragraph) = self.paragraphs.iter_mut().find(|p| p.id == paragraph_id) {
            paragraph.translated_text = Some(text.to_string());
        }
    }

    /// Apply a remote action; disallowed transitions are logged and dropped
    fn reduce_remote(&mut self, action: StatusAction) -> Option<Transition> {
        match self.board.apply(action) {
            Ok(Transition::Ignored) => None,
            Ok(transition) => Some(transition),
            Err(e) => {
                warn!(error = %e, "Remote event does not fit paragraph status");
                None
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            book_id: self.book_id.clone(),
            chapter_id: self.chapter_id.clone(),
            paragraphs: self
                .paragraphs
                .iter()
                .map(|p| ParagraphView {
                    paragraph: p.clone(),
                    state: self.board.state(&p.id).cloned().unwrap_or_default(),
                })
                .collect(),
            current_review: self.reviews.current().cloned(),
            waiting_reviews: self.reviews.waiting_len(),
            resolved_reviews: self.reviews.history().to_vec(),
            suggestions: self.suggestions.clone(),
            glossary: self.glossary.clone(),
            connection: self.connection,
            batch_running: self.batch_running,
        }
    }
}
