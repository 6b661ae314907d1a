//! Session controller: the user-facing operations
//!
//! Every operation validates its input before touching the network, persists
//! before changing what the user sees, and reports failures both as an error
//! return and as a [`SessionNotice`].

use super::actor::{ParagraphLookup, SessionActor, SessionMessage, SessionSnapshot};
use super::bridge::run_channel_bridge;
use super::{SessionContext, SessionSettings};
use crate::api::{GlossaryStore, ParagraphStore, Translator};
use crate::batch::{BatchPlan, BatchRunner, BatchSummary, ConfirmedBatch};
use crate::channel::EventChannel;
use crate::coverage::{self, CoverageReport};
use crate::error::{SessionError, SessionResult};
use crate::hitl::{ReviewOutcome, TranslationReview};
use crate::review::{self, AgentAnalysis};
use crate::status::{StartOrigin, StatusAction, Transition, UiStatus};
use litra_common::events::{ChannelStatus, EventBus, SessionNotice};
use litra_common::models::{
    serialize_glossary, BookId, ChapterId, GlossarySuggestion, GlossaryTerm, Paragraph,
    ParagraphId, ParagraphUpdate, TranslationRequest,
};
use litra_common::time;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const ACTOR_QUEUE: usize = 256;
const NOTICE_CAPACITY: usize = 256;

/// What happens to a successful translation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationMode {
    /// Saved as translated and queued for human review
    ManualReview,
    /// Saved as approved straight away
    AutoApprove,
}

/// Result of a successful translate/refine/retry
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationOutcome {
    pub paragraph_id: ParagraphId,
    pub translation: String,
    pub analysis: Option<AgentAnalysis>,
    pub approved: bool,
}

pub struct SessionController {
    book_id: BookId,
    chapter_id: ChapterId,
    paragraphs: Arc<dyn ParagraphStore>,
    translator: Arc<dyn Translator>,
    glossary: Arc<dyn GlossaryStore>,
    settings: SessionSettings,
    channel: EventChannel,
    notices: EventBus,
    tx: mpsc::Sender<SessionMessage>,
    batch_running: AtomicBool,
    cancel: CancellationToken,
    actor_task: JoinHandle<()>,
    bridge_task: Option<JoinHandle<()>>,
}

impl SessionController {
    /// Spawn the session tasks and load the chapter
    ///
    /// Fails when the paragraphs cannot be loaded; a glossary that fails to
    /// load is logged and left empty.
    pub async fn start(context: SessionContext) -> SessionResult<Self> {
        let SessionContext {
            book_id,
            chapter_id,
            paragraphs,
            translator,
            glossary,
            channel,
            settings,
        } = context;

        let notices = EventBus::new(NOTICE_CAPACITY);
        let (tx, rx) = mpsc::channel(ACTOR_QUEUE);
        let actor = SessionActor::new(
            book_id.clone(),
            chapter_id.clone(),
            rx,
            notices.clone(),
            channel.state(),
        );
        let actor_task = tokio::spawn(actor.run());

        let cancel = CancellationToken::new();
        let bridge_task = channel.is_enabled().then(|| {
            tokio::spawn(run_channel_bridge(
                channel.subscribe(),
                channel.watch_state(),
                tx.clone(),
                Arc::clone(&paragraphs),
                cancel.child_token(),
            ))
        });

        let controller = Self {
            book_id,
            chapter_id,
            paragraphs,
            translator,
            glossary,
            settings,
            channel,
            notices,
            tx,
            batch_running: AtomicBool::new(false),
            cancel,
            actor_task,
            bridge_task,
        };

        info!(
            book_id = %controller.book_id,
            chapter_id = %controller.chapter_id,
            "Session starting"
        );
        controller.refresh().await?;
        if let Err(e) = controller.load_glossary().await {
            warn!(error = %e, "Glossary unavailable, continuing without it");
        }
        Ok(controller)
    }

    pub fn book_id(&self) -> &BookId {
        &self.book_id
    }

    pub fn chapter_id(&self) -> &ChapterId {
        &self.chapter_id
    }

    /// Receive session notices from now on
    pub fn notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    pub fn connection_status(&self) -> ChannelStatus {
        self.channel.status()
    }

    /// Send an event over the realtime channel (queued while disconnected)
    pub fn emit(&self, event_type: &str, payload: Value) -> SessionResult<()> {
        self.channel.emit(event_type, payload)
    }

    pub async fn snapshot(&self) -> SessionResult<SessionSnapshot> {
        self.ask(SessionMessage::Snapshot).await
    }

    /// Re-fetch the chapter's paragraphs
    pub async fn refresh(&self) -> SessionResult<usize> {
        let paragraphs = self.paragraphs.list_paragraphs(&self.chapter_id).await?;
        let count = paragraphs.len();
        self.send(SessionMessage::LoadParagraphs(paragraphs)).await?;
        Ok(count)
    }

    /// Translate one paragraph
    pub async fn translate(
        &self,
        paragraph_id: &str,
        mode: TranslationMode,
    ) -> SessionResult<TranslationOutcome> {
        self.translate_inner(paragraph_id, mode, None, StartOrigin::Local, true)
            .await
    }

    /// Re-translate with reviewer feedback; the result goes back to review
    pub async fn refine(
        &self,
        paragraph_id: &str,
        feedback: &str,
    ) -> SessionResult<TranslationOutcome> {
        let feedback = feedback.trim();
        if feedback.is_empty() {
            return Err(self.reject("Feedback is required to refine a translation"));
        }
        self.translate_inner(
            paragraph_id,
            TranslationMode::ManualReview,
            Some(feedback.to_string()),
            StartOrigin::Local,
            true,
        )
        .await
    }

    /// Translate a failed paragraph again
    pub async fn retry(&self, paragraph_id: &str) -> SessionResult<TranslationOutcome> {
        self.translate_inner(
            paragraph_id,
            TranslationMode::ManualReview,
            None,
            StartOrigin::Retry,
            true,
        )
        .await
    }

    /// Approve the paragraph's translation, optionally edited by the reviewer
    ///
    /// The paragraph only shows as approved once the save succeeded; a failed
    /// save puts it in error.
    pub async fn approve(
        &self,
        paragraph_id: &str,
        edited_translation: Option<&str>,
    ) -> SessionResult<Paragraph> {
        let edited = match edited_translation {
            Some(text) => Some(self.validate_text(text)?),
            None => None,
        };
        let lookup = self.lookup(paragraph_id).await?;
        if !matches!(lookup.status, UiStatus::Review | UiStatus::Approved) {
            return Err(SessionError::InvalidTransition {
                paragraph_id: paragraph_id.to_string(),
                from: lookup.status,
                action: "approve",
            });
        }

        let translation = edited
            .or(lookup.review_translation)
            .or_else(|| {
                lookup
                    .paragraph
                    .translated_text
                    .filter(|t| !t.trim().is_empty())
            })
            .ok_or_else(|| SessionError::MissingTranslation(paragraph_id.to_string()))?;

        self.persist_approval(paragraph_id, &translation, true).await
    }

    /// Close the current review without approving it
    pub async fn skip_review(&self) -> SessionResult<TranslationReview> {
        let skipped = self
            .ask(|reply| SessionMessage::ResolveReview {
                paragraph_id: None,
                outcome: ReviewOutcome::Skipped,
                reply,
            })
            .await?
            .ok_or(SessionError::NoCurrentReview)?;
        debug!(paragraph_id = %skipped.paragraph_id, "Review skipped");
        Ok(skipped)
    }

    /// Replace the source text; any translation is discarded
    pub async fn edit_original(&self, paragraph_id: &str, text: &str) -> SessionResult<Paragraph> {
        let text = self.validate_text(text)?;
        let lookup = self.lookup(paragraph_id).await?;
        if lookup.status == UiStatus::Translating {
            return Err(SessionError::InvalidTransition {
                paragraph_id: paragraph_id.to_string(),
                from: lookup.status,
                action: "edit",
            });
        }

        let had_translation =
            lookup.paragraph.has_translation() || lookup.review_translation.is_some();
        let update = if had_translation {
            ParagraphUpdate::source_reset(text)
        } else {
            ParagraphUpdate::source_only(text)
        };
        let saved = self.paragraphs.update_paragraph(paragraph_id, &update).await?;

        self.send(SessionMessage::ParagraphSaved(saved.clone())).await?;
        self.apply(StatusAction::SourceEdited {
            paragraph_id: paragraph_id.to_string(),
            had_translation,
        })
        .await?;
        info!(paragraph_id = %paragraph_id, had_translation, "Source text edited");
        Ok(saved)
    }

    /// Pending paragraphs as a plan awaiting confirmation
    ///
    /// `None` (with a notice) when nothing is pending.
    pub async fn plan_batch(&self) -> SessionResult<Option<BatchPlan>> {
        let snapshot = self.snapshot().await?;
        let plan = BatchPlan::new(snapshot.pending_ids());
        if plan.is_none() {
            info!("Batch requested with nothing pending");
            self.notices.emit_lossy(SessionNotice::BatchNothingPending { timestamp: time::now() });
        }
        Ok(plan)
    }

    /// Translate and approve every paragraph of a confirmed batch
    ///
    /// Per-paragraph notices are suppressed; one summary notice is sent after
    /// the chapter was reloaded.
    pub async fn run_batch(&self, batch: ConfirmedBatch) -> SessionResult<BatchSummary> {
        if batch.is_empty() {
            self.notices.emit_lossy(SessionNotice::BatchNothingPending { timestamp: time::now() });
            return Ok(BatchSummary::default());
        }
        if self
            .batch_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::BatchInProgress);
        }

        let summary = self.run_batch_inner(batch).await;
        self.batch_running.store(false, Ordering::Release);
        let summary = summary?;

        self.notices.emit_lossy(SessionNotice::BatchFinished {
            success_count: summary.success_count,
            failed_count: summary.failed_count,
            timestamp: time::now(),
        });
        Ok(summary)
    }

    async fn run_batch_inner(&self, batch: ConfirmedBatch) -> SessionResult<BatchSummary> {
        self.send(SessionMessage::SetBatchRunning(true)).await?;

        let runner = BatchRunner::new(self.settings.max_concurrency);
        let summary = runner
            .run(batch, |paragraph_id| async move {
                self.translate_inner(
                    &paragraph_id,
                    TranslationMode::AutoApprove,
                    None,
                    StartOrigin::Local,
                    false,
                )
                .await
                .map(|_| ())
            })
            .await;

        if let Err(e) = self.refresh().await {
            warn!(error = %e, "Refresh after batch failed");
        }
        self.send(SessionMessage::SetBatchRunning(false)).await?;
        Ok(summary)
    }

    /// Glossary coverage of the paragraph's current translation
    pub async fn coverage(&self, paragraph_id: &str) -> SessionResult<CoverageReport> {
        let lookup = self.lookup(paragraph_id).await?;
        let translated = lookup.review_translation.or(lookup.paragraph.translated_text);
        Ok(coverage::coverage(
            &lookup.paragraph.original_text,
            translated.as_deref(),
            &lookup.glossary,
        ))
    }

    /// Fetch the book's glossary and suggestion inbox
    pub async fn load_glossary(&self) -> SessionResult<usize> {
        let terms = self.glossary.list_terms(&self.book_id).await?;
        let count = terms.len();
        self.send(SessionMessage::SetGlossary(terms)).await?;

        let suggestions = self.glossary.list_suggestions(&self.book_id).await?;
        self.send(SessionMessage::SetSuggestions(suggestions)).await?;
        debug!(book_id = %self.book_id, terms = count, "Glossary loaded");
        Ok(count)
    }

    /// Promote a suggestion into a glossary term
    pub async fn approve_suggestion(&self, suggestion_id: &str) -> SessionResult<GlossaryTerm> {
        let suggestion = self.take_suggestion(suggestion_id).await?;
        match self.glossary.approve_suggestion(&suggestion, &self.book_id).await {
            Ok(term) => {
                info!(term = %term.source_term, "Glossary suggestion approved");
                self.send(SessionMessage::AddTerm(term.clone())).await?;
                Ok(term)
            }
            Err(e) => {
                self.send(SessionMessage::AddSuggestion(suggestion)).await?;
                Err(e.into())
            }
        }
    }

    /// Discard a suggestion
    pub async fn reject_suggestion(&self, suggestion_id: &str) -> SessionResult<()> {
        let suggestion = self.take_suggestion(suggestion_id).await?;
        if let Err(e) = self.glossary.reject_suggestion(&suggestion.id).await {
            self.send(SessionMessage::AddSuggestion(suggestion)).await?;
            return Err(e.into());
        }
        debug!(term = %suggestion.term, "Glossary suggestion rejected");
        Ok(())
    }

    /// Stop the channel, the bridge and the actor
    pub async fn shutdown(self) {
        let Self {
            mut channel,
            tx,
            cancel,
            actor_task,
            bridge_task,
            ..
        } = self;

        cancel.cancel();
        channel.disconnect().await;
        if let Some(bridge) = bridge_task {
            let _ = bridge.await;
        }
        drop(tx);
        if let Err(e) = actor_task.await {
            warn!(error = %e, "Session actor ended abnormally");
        }
        info!("Session stopped");
    }

    async fn translate_inner(
        &self,
        paragraph_id: &str,
        mode: TranslationMode,
        feedback: Option<String>,
        origin: StartOrigin,
        notify: bool,
    ) -> SessionResult<TranslationOutcome> {
        let lookup = self.lookup(paragraph_id).await?;
        let original_text = self.validate_text(&lookup.paragraph.original_text)?;
        let glossary = serialize_glossary(&lookup.glossary)?;

        self.apply(StatusAction::Start {
            paragraph_id: paragraph_id.to_string(),
            origin,
        })
        .await?;

        let request = TranslationRequest {
            book_id: self.book_id.clone(),
            chapter_id: self.chapter_id.clone(),
            paragraph_id: paragraph_id.to_string(),
            source_language: self.settings.source_language.clone(),
            target_language: self.settings.target_language.clone(),
            original_text,
            feedback,
            glossary,
            thread_id: lookup.thread_id,
        };

        let guard = InFlightGuard::new(self.tx.clone(), paragraph_id);
        let outcome = self.finish_translation(paragraph_id, &request, mode, notify).await;
        guard.disarm();
        outcome
    }

    /// Call the translator for a started paragraph and settle its status
    async fn finish_translation(
        &self,
        paragraph_id: &str,
        request: &TranslationRequest,
        mode: TranslationMode,
        notify: bool,
    ) -> SessionResult<TranslationOutcome> {
        let response = match self.translator.translate(request).await {
            Ok(response) => response,
            Err(e) => return Err(self.fail(paragraph_id, e.into(), notify).await),
        };
        let Some(translation) = response.text().map(str::to_string) else {
            let err = SessionError::MissingTranslation(paragraph_id.to_string());
            return Err(self.fail(paragraph_id, err, notify).await);
        };
        if let Some(thread_id) = response.thread_id.clone() {
            self.send(SessionMessage::SetThread {
                paragraph_id: paragraph_id.to_string(),
                thread_id,
            })
            .await?;
        }

        let analysis = review::normalize(
            response.review_package.as_ref(),
            response.agent_outputs.as_ref(),
            response.enforcement_report.as_ref(),
        );

        match mode {
            TranslationMode::AutoApprove => {
                self.persist_approval(paragraph_id, &translation, notify).await?;
            }
            TranslationMode::ManualReview => {
                let update = ParagraphUpdate::translated(translation.clone());
                let saved = match self.paragraphs.update_paragraph(paragraph_id, &update).await {
                    Ok(saved) => saved,
                    Err(e) => return Err(self.fail(paragraph_id, e.into(), notify).await),
                };
                self.send(SessionMessage::ParagraphSaved(saved)).await?;
                self.apply(StatusAction::AwaitReview {
                    paragraph_id: paragraph_id.to_string(),
                })
                .await?;
                self.send(SessionMessage::OfferReview(TranslationReview::new(
                    paragraph_id,
                    translation.clone(),
                    analysis.clone(),
                )))
                .await?;
            }
        }

        if notify {
            self.notices.emit_lossy(SessionNotice::TranslationSucceeded {
                paragraph_id: paragraph_id.to_string(),
                needs_review: mode == TranslationMode::ManualReview,
                timestamp: time::now(),
            });
        }
        info!(paragraph_id = %paragraph_id, ?mode, "Paragraph translated");

        Ok(TranslationOutcome {
            paragraph_id: paragraph_id.to_string(),
            translation,
            analysis,
            approved: mode == TranslationMode::AutoApprove,
        })
    }

    /// Save an approved translation, then mark the paragraph approved
    async fn persist_approval(
        &self,
        paragraph_id: &str,
        translation: &str,
        notify: bool,
    ) -> SessionResult<Paragraph> {
        let update = ParagraphUpdate::approved(translation);
        let saved = match self.paragraphs.update_paragraph(paragraph_id, &update).await {
            Ok(saved) => saved,
            Err(e) => {
                let err = SessionError::from(e);
                warn!(paragraph_id = %paragraph_id, error = %err, "Saving approval failed");
                self.mark_failed(paragraph_id, &err).await;
                if notify {
                    self.notices.emit_lossy(SessionNotice::ApprovalFailed {
                        paragraph_id: paragraph_id.to_string(),
                        message: err.to_string(),
                        timestamp: time::now(),
                    });
                }
                return Err(err);
            }
        };

        self.send(SessionMessage::ParagraphSaved(saved.clone())).await?;
        self.apply(StatusAction::Approved {
            paragraph_id: paragraph_id.to_string(),
        })
        .await?;
        if notify {
            self.notices.emit_lossy(SessionNotice::TranslationApproved {
                paragraph_id: paragraph_id.to_string(),
                timestamp: time::now(),
            });
        }
        Ok(saved)
    }

    /// Put the paragraph in error and hand the error back
    async fn fail(&self, paragraph_id: &str, err: SessionError, notify: bool) -> SessionError {
        warn!(paragraph_id = %paragraph_id, error = %err, "Translation failed");
        self.mark_failed(paragraph_id, &err).await;
        if notify {
            self.notices.emit_lossy(SessionNotice::TranslationFailed {
                paragraph_id: paragraph_id.to_string(),
                message: err.to_string(),
                timestamp: time::now(),
            });
        }
        err
    }

    async fn mark_failed(&self, paragraph_id: &str, err: &SessionError) {
        let failed = self
            .apply(StatusAction::Failed {
                paragraph_id: paragraph_id.to_string(),
                message: err.to_string(),
            })
            .await;
        if let Err(e) = failed {
            debug!(paragraph_id = %paragraph_id, error = %e, "Paragraph not moved to error");
        }
    }

    /// Trim and bound-check paragraph text; rejections raise a notice
    fn validate_text(&self, text: &str) -> SessionResult<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(self.reject("Paragraph text cannot be empty"));
        }
        let chars = trimmed.chars().count();
        if chars > self.settings.max_paragraph_chars {
            return Err(self.reject(&format!(
                "Paragraph text is {} characters long; the limit is {}",
                chars, self.settings.max_paragraph_chars
            )));
        }
        Ok(trimmed.to_string())
    }

    fn reject(&self, message: &str) -> SessionError {
        debug!(reason = %message, "Input rejected");
        self.notices.emit_lossy(SessionNotice::ValidationRejected {
            message: message.to_string(),
            timestamp: time::now(),
        });
        SessionError::Validation(message.to_string())
    }

    async fn take_suggestion(&self, suggestion_id: &str) -> SessionResult<GlossarySuggestion> {
        self.ask(|reply| SessionMessage::TakeSuggestion {
            id: suggestion_id.to_string(),
            reply,
        })
        .await?
        .ok_or_else(|| SessionError::UnknownSuggestion(suggestion_id.to_string()))
    }

    async fn lookup(&self, paragraph_id: &str) -> SessionResult<ParagraphLookup> {
        self.ask(|reply| SessionMessage::Lookup {
            paragraph_id: paragraph_id.to_string(),
            reply,
        })
        .await?
        .ok_or_else(|| SessionError::UnknownParagraph(paragraph_id.to_string()))
    }

    async fn apply(&self, action: StatusAction) -> SessionResult<Transition> {
        self.ask(|reply| SessionMessage::Apply { action, reply }).await?
    }

    async fn send(&self, message: SessionMessage) -> SessionResult<()> {
        self.tx.send(message).await.map_err(|_| SessionError::SessionClosed)
    }

    async fn ask<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> SessionMessage,
    ) -> SessionResult<T> {
        let (reply, rx) = oneshot::channel();
        self.send(message(reply)).await?;
        rx.await.map_err(|_| SessionError::SessionClosed)
    }
}

/// Settles a started translation whose future is dropped before it finishes
struct InFlightGuard {
    tx: mpsc::Sender<SessionMessage>,
    paragraph_id: Option<ParagraphId>,
}

impl InFlightGuard {
    fn new(tx: mpsc::Sender<SessionMessage>, paragraph_id: &str) -> Self {
        Self {
            tx,
            paragraph_id: Some(paragraph_id.to_string()),
        }
    }

    fn disarm(mut self) {
        self.paragraph_id = None;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let Some(paragraph_id) = self.paragraph_id.take() else {
            return;
        };
        debug!(paragraph_id = %paragraph_id, "Translation dropped before it settled");
        match self.tx.try_send(SessionMessage::Abandoned(paragraph_id)) {
            Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
            Err(mpsc::error::TrySendError::Full(message)) => {
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        let tx = self.tx.clone();
                        handle.spawn(async move {
                            if tx.send(message).await.is_err() {
                                debug!("Session actor gone before a dropped translation settled");
                            }
                        });
                    }
                    Err(_) => warn!("No runtime to settle a dropped translation"),
                }
            }
        }
    }
}
