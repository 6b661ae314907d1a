//! Backend seams
//!
//! The session talks to the backend only through these traits.
//! [`BackendClient`] implements all three over HTTP; tests substitute
//! in-memory stores.

mod client;

pub use client::BackendClient;

use async_trait::async_trait;
use litra_common::models::{
    BookId, ChapterId, GlossarySuggestion, GlossaryTerm, NewGlossaryTerm, NewParagraph, Paragraph,
    ParagraphUpdate, TranslationRequest, TranslationResponse,
};
use litra_common::Result;

/// Paragraph persistence
#[async_trait]
pub trait ParagraphStore: Send + Sync {
    async fn list_paragraphs(&self, chapter_id: &str) -> Result<Vec<Paragraph>>;

    async fn get_paragraph(&self, paragraph_id: &str) -> Result<Paragraph>;

    async fn create_paragraph(
        &self,
        chapter_id: &ChapterId,
        paragraph: &NewParagraph,
    ) -> Result<Paragraph>;

    async fn update_paragraph(
        &self,
        paragraph_id: &str,
        update: &ParagraphUpdate,
    ) -> Result<Paragraph>;

    async fn delete_paragraph(&self, paragraph_id: &str) -> Result<()>;
}

/// Remote translation pipeline
#[async_trait]
pub trait Translator: Send + Sync {
    /// Run the full agent pipeline for one paragraph
    ///
    /// No client-side timeout; callers wait as long as the backend takes.
    async fn translate(&self, request: &TranslationRequest) -> Result<TranslationResponse>;
}

/// Glossary terms and the suggestion inbox
#[async_trait]
pub trait GlossaryStore: Send + Sync {
    /// Terms of the book plus global terms
    async fn list_terms(&self, book_id: &BookId) -> Result<Vec<GlossaryTerm>>;

    async fn create_term(&self, book_id: &BookId, term: &NewGlossaryTerm) -> Result<GlossaryTerm>;

    async fn update_term(&self, term_id: &str, term: &NewGlossaryTerm) -> Result<GlossaryTerm>;

    async fn delete_term(&self, term_id: &str) -> Result<()>;

    async fn list_suggestions(&self, book_id: &BookId) -> Result<Vec<GlossarySuggestion>>;

    /// Promote a suggestion; returns the created term
    async fn approve_suggestion(
        &self,
        suggestion: &GlossarySuggestion,
        book_id: &BookId,
    ) -> Result<GlossaryTerm>;

    async fn reject_suggestion(&self, suggestion_id: &str) -> Result<()>;
}
