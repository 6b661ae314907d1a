//! Test doubles for session integration tests
//!
//! - [`MemoryBackend`]: in-memory paragraph, translation and glossary store
//!   with call counters and failure injection
//! - [`MockTransport`]: realtime transport whose connectivity the test flips

#![allow(dead_code)]

use async_trait::async_trait;
use litra_common::models::{
    BookId, ChapterId, GlossarySuggestion, GlossaryTerm, NewGlossaryTerm, NewParagraph, Paragraph,
    ParagraphStatus, ParagraphUpdate, TranslationRequest, TranslationResponse,
};
use litra_common::{Error, Result};
use litra_session::api::{GlossaryStore, ParagraphStore, Translator};
use litra_session::channel::{
    ChannelOptions, Connection, EventChannel, FrameSink, FrameStream, InboundFrame, OutgoingFrame,
    Transport,
};
use litra_session::session::{SessionContext, SessionSettings};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const BOOK: &str = "book-1";
pub const CHAPTER: &str = "chapter-1";

pub fn paragraph(id: &str, index: u32, status: ParagraphStatus, translated: Option<&str>) -> Paragraph {
    Paragraph {
        id: id.to_string(),
        chapter_id: CHAPTER.to_string(),
        index,
        original_text: format!("Texto original {}", id),
        translated_text: translated.map(str::to_string),
        status,
    }
}

pub fn pending(id: &str, index: u32) -> Paragraph {
    paragraph(id, index, ParagraphStatus::Pending, None)
}

pub fn term(id: &str, source: &str, target: &str) -> GlossaryTerm {
    GlossaryTerm {
        id: id.to_string(),
        book_id: Some(BOOK.to_string()),
        source_term: source.to_string(),
        target_term: target.to_string(),
        context: None,
        category: None,
        case_sensitive: false,
        whole_word: true,
    }
}

#[derive(Default)]
struct BackendState {
    paragraphs: Vec<Paragraph>,
    terms: Vec<GlossaryTerm>,
    suggestions: Vec<GlossarySuggestion>,
    translate_calls: HashMap<String, usize>,
    requests: Vec<TranslationRequest>,
    updates: Vec<(String, ParagraphUpdate)>,
    failing_translations: HashSet<String>,
    /// Translations returning a response without text
    empty_translations: HashSet<String>,
    review_package: Option<Value>,
    agent_outputs: Option<Value>,
}

/// In-memory backend implementing every store seam
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<BackendState>,
    fail_updates: AtomicBool,
    translate_delay_ms: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryBackend {
    pub fn with_paragraphs(paragraphs: Vec<Paragraph>) -> Arc<Self> {
        let backend = Self::default();
        backend.state.lock().unwrap().paragraphs = paragraphs;
        Arc::new(backend)
    }

    pub fn add_term(&self, term: GlossaryTerm) {
        self.state.lock().unwrap().terms.push(term);
    }

    pub fn add_suggestion(&self, suggestion: GlossarySuggestion) {
        self.state.lock().unwrap().suggestions.push(suggestion);
    }

    pub fn fail_translation(&self, paragraph_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_translations
            .insert(paragraph_id.to_string());
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failing_translations.clear();
    }

    pub fn return_empty_translation(&self, paragraph_id: &str) {
        self.state
            .lock()
            .unwrap()
            .empty_translations
            .insert(paragraph_id.to_string());
    }

    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn set_translate_delay(&self, delay: Duration) {
        self.translate_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn set_agent_payloads(&self, review_package: Option<Value>, agent_outputs: Option<Value>) {
        let mut state = self.state.lock().unwrap();
        state.review_package = review_package;
        state.agent_outputs = agent_outputs;
    }

    pub fn stored(&self, paragraph_id: &str) -> Option<Paragraph> {
        self.state
            .lock()
            .unwrap()
            .paragraphs
            .iter()
            .find(|p| p.id == paragraph_id)
            .cloned()
    }

    pub fn translate_calls(&self, paragraph_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .translate_calls
            .get(paragraph_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_translate_calls(&self) -> usize {
        self.state.lock().unwrap().translate_calls.values().sum()
    }

    pub fn requests(&self) -> Vec<TranslationRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn updates(&self) -> Vec<(String, ParagraphUpdate)> {
        self.state.lock().unwrap().updates.clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn terms(&self) -> Vec<GlossaryTerm> {
        self.state.lock().unwrap().terms.clone()
    }

    pub fn suggestions(&self) -> Vec<GlossarySuggestion> {
        self.state.lock().unwrap().suggestions.clone()
    }
}

#[async_trait]
impl ParagraphStore for MemoryBackend {
    async fn list_paragraphs(&self, chapter_id: &str) -> Result<Vec<Paragraph>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .paragraphs
            .iter()
            .filter(|p| p.chapter_id == chapter_id)
            .cloned()
            .collect())
    }

    async fn get_paragraph(&self, paragraph_id: &str) -> Result<Paragraph> {
        self.stored(paragraph_id)
            .ok_or_else(|| Error::NotFound(format!("paragraph {}", paragraph_id)))
    }

    async fn create_paragraph(&self, chapter_id: &ChapterId, paragraph: &NewParagraph) -> Result<Paragraph> {
        let mut state = self.state.lock().unwrap();
        let created = Paragraph {
            id: format!("p{}", state.paragraphs.len() + 1),
            chapter_id: chapter_id.clone(),
            index: paragraph.index,
            original_text: paragraph.original_text.clone(),
            translated_text: None,
            status: ParagraphStatus::Pending,
        };
        state.paragraphs.push(created.clone());
        Ok(created)
    }

    async fn update_paragraph(&self, paragraph_id: &str, update: &ParagraphUpdate) -> Result<Paragraph> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Error::Backend {
                status: 500,
                message: "database unavailable".to_string(),
            });
        }
        let mut state = self.state.lock().unwrap();
        state.updates.push((paragraph_id.to_string(), update.clone()));
        let paragraph = state
            .paragraphs
            .iter_mut()
            .find(|p| p.id == paragraph_id)
            .ok_or_else(|| Error::NotFound(format!("paragraph {}", paragraph_id)))?;
        if let Some(text) = &update.original_text {
            paragraph.original_text = text.clone();
        }
        if let Some(translated) = &update.translated_text {
            paragraph.translated_text = translated.clone();
        }
        if let Some(status) = update.status {
            paragraph.status = status;
        }
        if let Some(index) = update.index {
            paragraph.index = index;
        }
        Ok(paragraph.clone())
    }

    async fn delete_paragraph(&self, paragraph_id: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .paragraphs
            .retain(|p| p.id != paragraph_id);
        Ok(())
    }
}

#[async_trait]
impl Translator for MemoryBackend {
    async fn translate(&self, request: &TranslationRequest) -> Result<TranslationResponse> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = self.translate_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }

        let (failing, empty, review_package, agent_outputs) = {
            let mut state = self.state.lock().unwrap();
            *state
                .translate_calls
                .entry(request.paragraph_id.clone())
                .or_insert(0) += 1;
            state.requests.push(request.clone());
            (
                state.failing_translations.contains(&request.paragraph_id),
                state.empty_translations.contains(&request.paragraph_id),
                state.review_package.clone(),
                state.agent_outputs.clone(),
            )
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if failing {
            return Err(Error::Backend {
                status: 502,
                message: "model overloaded".to_string(),
            });
        }
        if empty {
            return Ok(TranslationResponse::default());
        }
        Ok(TranslationResponse {
            translated_text: Some(format!("EN: {}", request.original_text)),
            thread_id: Some(format!("thread-{}", request.paragraph_id)),
            review_package,
            agent_outputs,
            enforcement_report: None,
        })
    }
}

#[async_trait]
impl GlossaryStore for MemoryBackend {
    async fn list_terms(&self, _book_id: &BookId) -> Result<Vec<GlossaryTerm>> {
        Ok(self.terms())
    }

    async fn create_term(&self, book_id: &BookId, term: &NewGlossaryTerm) -> Result<GlossaryTerm> {
        let mut state = self.state.lock().unwrap();
        let created = GlossaryTerm {
            id: format!("t{}", state.terms.len() + 1),
            book_id: Some(book_id.clone()),
            source_term: term.source_term.clone(),
            target_term: term.target_term.clone(),
            context: term.context.clone(),
            category: term.category.clone(),
            case_sensitive: term.case_sensitive,
            whole_word: term.whole_word,
        };
        state.terms.push(created.clone());
        Ok(created)
    }

    async fn update_term(&self, term_id: &str, term: &NewGlossaryTerm) -> Result<GlossaryTerm> {
        let mut state = self.state.lock().unwrap();
        let existing = state
            .terms
            .iter_mut()
            .find(|t| t.id == term_id)
            .ok_or_else(|| Error::NotFound(format!("term {}", term_id)))?;
        existing.source_term = term.source_term.clone();
        existing.target_term = term.target_term.clone();
        Ok(existing.clone())
    }

    async fn delete_term(&self, term_id: &str) -> Result<()> {
        self.state.lock().unwrap().terms.retain(|t| t.id != term_id);
        Ok(())
    }

    async fn list_suggestions(&self, _book_id: &BookId) -> Result<Vec<GlossarySuggestion>> {
        Ok(self.suggestions())
    }

    async fn approve_suggestion(&self, suggestion: &GlossarySuggestion, book_id: &BookId) -> Result<GlossaryTerm> {
        self.state
            .lock()
            .unwrap()
            .suggestions
            .retain(|s| s.id != suggestion.id);
        self.create_term(book_id, &suggestion.to_new_term()).await
    }

    async fn reject_suggestion(&self, suggestion_id: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .suggestions
            .retain(|s| s.id != suggestion_id);
        Ok(())
    }
}

/// Session context over a memory backend
pub fn context(backend: &Arc<MemoryBackend>, channel: EventChannel) -> SessionContext {
    SessionContext {
        book_id: BOOK.to_string(),
        chapter_id: CHAPTER.to_string(),
        paragraphs: backend.clone(),
        translator: backend.clone(),
        glossary: backend.clone(),
        channel,
        settings: SessionSettings {
            max_concurrency: 5,
            ..SessionSettings::default()
        },
    }
}

#[derive(Default)]
struct TransportState {
    online: AtomicBool,
    /// Sends never complete while set
    stall_sends: AtomicBool,
    opens: AtomicUsize,
    sent: Mutex<Vec<OutgoingFrame>>,
    inbound: Mutex<Option<mpsc::UnboundedSender<InboundFrame>>>,
}

/// Realtime transport controlled by the test
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<TransportState>,
}

impl MockTransport {
    pub fn online() -> Self {
        let transport = Self::default();
        transport.set_online(true);
        transport
    }

    pub fn offline() -> Self {
        Self::default()
    }

    /// Flip connectivity; going offline also drops the live connection
    pub fn set_online(&self, online: bool) {
        self.state.online.store(online, Ordering::SeqCst);
        if !online {
            self.state.inbound.lock().unwrap().take();
        }
    }

    pub fn stall_sends(&self, stall: bool) {
        self.state.stall_sends.store(stall, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<OutgoingFrame> {
        self.state.sent.lock().unwrap().clone()
    }

    pub fn sent_types(&self) -> Vec<String> {
        self.sent().into_iter().map(|f| f.event_type).collect()
    }

    /// Deliver an event from the "server"; false when not connected
    pub fn push(&self, event_type: &str, payload: Value) -> bool {
        match self.state.inbound.lock().unwrap().as_ref() {
            Some(tx) => tx
                .send(InboundFrame {
                    event_type: event_type.to_string(),
                    payload,
                })
                .is_ok(),
            None => false,
        }
    }

    pub fn channel(&self, options: ChannelOptions) -> EventChannel {
        EventChannel::connect("mock://channel", Arc::new(self.clone()), options)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, _url: &str) -> Result<Connection> {
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        if !self.state.online.load(Ordering::SeqCst) {
            return Err(Error::Internal("connection refused".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.state.inbound.lock().unwrap() = Some(tx);
        Ok(Connection {
            sink: Box::new(MockSink {
                state: Arc::clone(&self.state),
            }),
            stream: Box::new(MockStream { rx }),
        })
    }
}

struct MockSink {
    state: Arc<TransportState>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send(&mut self, frame: &OutgoingFrame) -> Result<()> {
        if self.state.stall_sends.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if !self.state.online.load(Ordering::SeqCst) {
            return Err(Error::Internal("connection reset".to_string()));
        }
        self.state.sent.lock().unwrap().push(frame.clone());
        Ok(())
    }
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<InboundFrame>,
}

#[async_trait]
impl FrameStream for MockStream {
    async fn next(&mut self) -> Option<Result<InboundFrame>> {
        self.rx.recv().await.map(Ok)
    }
}

/// Fast reconnects for tests
pub fn fast_options() -> ChannelOptions {
    ChannelOptions {
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        max_queued_events: 16,
        event_capacity: 64,
    }
}

/// Poll `check` until it holds or two seconds pass
pub async fn wait_until<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

pub fn review_payload(paragraph_id: &str, text: &str) -> Value {
    json!({ "paragraphId": paragraph_id, "translatedText": text })
}
