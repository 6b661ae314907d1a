//! HTTP backend client
//!
//! JSON over HTTP with `reqwest`. Non-success statuses become
//! [`Error::NotFound`] (404) or [`Error::Backend`] with the server's `detail`
//! message when it sent one.

use super::{GlossaryStore, ParagraphStore, Translator};
use async_trait::async_trait;
use litra_common::models::{
    BookId, ChapterId, GlossarySuggestion, GlossaryTerm, NewGlossaryTerm, NewParagraph, Paragraph,
    ParagraphUpdate, TranslationRequest, TranslationResponse,
};
use litra_common::{Error, Result};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the book/translation backend
#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        // Connect timeout only: translations may legitimately run for minutes
        let http = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{}", self.base_url, path))
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status.as_u16() == 404 {
            return Err(Error::NotFound(what.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                ["detail", "message", "error"]
                    .iter()
                    .find_map(|key| v.get(*key).and_then(|d| d.as_str()).map(str::to_string))
            })
            .unwrap_or(body);
        Err(Error::Backend {
            status: status.as_u16(),
            message: format!("{}: {}", what, message),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T> {
        let response = self.send(self.request(Method::GET, path), what).await?;
        Ok(response.json().await?)
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: &B, what: &str) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self.send(self.request(method, path).json(body), what).await?;
        Ok(response.json().await?)
    }

    async fn delete(&self, path: &str, what: &str) -> Result<()> {
        self.send(self.request(Method::DELETE, path), what).await?;
        Ok(())
    }
}

#[async_trait]
impl ParagraphStore for BackendClient {
    async fn list_paragraphs(&self, chapter_id: &str) -> Result<Vec<Paragraph>> {
        let mut paragraphs: Vec<Paragraph> = self
            .get_json(
                &format!("/chapters/{}/paragraphs", chapter_id),
                &format!("chapter {}", chapter_id),
            )
            .await?;
        paragraphs.sort_by_key(|p| p.index);
        debug!(chapter_id = %chapter_id, count = paragraphs.len(), "Paragraphs loaded");
        Ok(paragraphs)
    }

    async fn get_paragraph(&self, paragraph_id: &str) -> Result<Paragraph> {
        self.get_json(
            &format!("/paragraphs/{}", paragraph_id),
            &format!("paragraph {}", paragraph_id),
        )
        .await
    }

    async fn create_paragraph(
        &self,
        chapter_id: &ChapterId,
        paragraph: &NewParagraph,
    ) -> Result<Paragraph> {
        self.send_json(
            Method::POST,
            &format!("/chapters/{}/paragraphs", chapter_id),
            paragraph,
            &format!("chapter {}", chapter_id),
        )
        .await
    }

    async fn update_paragraph(
        &self,
        paragraph_id: &str,
        update: &ParagraphUpdate,
    ) -> Result<Paragraph> {
        debug!(paragraph_id = %paragraph_id, "Updating paragraph");
        self.send_json(
            Method::PATCH,
            &format!("/paragraphs/{}", paragraph_id),
            update,
            &format!("paragraph {}", paragraph_id),
        )
        .await
    }

    async fn delete_paragraph(&self, paragraph_id: &str) -> Result<()> {
        self.delete(
            &format!("/paragraphs/{}", paragraph_id),
            &format!("paragraph {}", paragraph_id),
        )
        .await
    }
}

#[async_trait]
impl Translator for BackendClient {
    async fn translate(&self, request: &TranslationRequest) -> Result<TranslationResponse> {
        info!(paragraph_id = %request.paragraph_id, "Requesting translation");
        self.send_json(
            Method::POST,
            "/translate",
            request,
            &format!("translation of paragraph {}", request.paragraph_id),
        )
        .await
    }
}

#[async_trait]
impl GlossaryStore for BackendClient {
    async fn list_terms(&self, book_id: &BookId) -> Result<Vec<GlossaryTerm>> {
        self.get_json(
            &format!("/books/{}/glossary", book_id),
            &format!("glossary of book {}", book_id),
        )
        .await
    }

    async fn create_term(&self, book_id: &BookId, term: &NewGlossaryTerm) -> Result<GlossaryTerm> {
        self.send_json(
            Method::POST,
            &format!("/books/{}/glossary", book_id),
            term,
            &format!("glossary of book {}", book_id),
        )
        .await
    }

    async fn update_term(&self, term_id: &str, term: &NewGlossaryTerm) -> Result<GlossaryTerm> {
        self.send_json(
            Method::PUT,
            &format!("/glossary/{}", term_id),
            term,
            &format!("glossary term {}", term_id),
        )
        .await
    }

    async fn delete_term(&self, term_id: &str) -> Result<()> {
        self.delete(&format!("/glossary/{}", term_id), &format!("glossary term {}", term_id))
            .await
    }

    async fn list_suggestions(&self, book_id: &BookId) -> Result<Vec<GlossarySuggestion>> {
        self.get_json(
            &format!("/books/{}/glossary/suggestions", book_id),
            &format!("glossary suggestions of book {}", book_id),
        )
        .await
    }

    async fn approve_suggestion(
        &self,
        suggestion: &GlossarySuggestion,
        book_id: &BookId,
    ) -> Result<GlossaryTerm> {
        let approved = self
            .send_json(
                Method::POST,
                &format!("/glossary/suggestions/{}/approve", suggestion.id),
                &json!({ "book_id": book_id }),
                &format!("glossary suggestion {}", suggestion.id),
            )
            .await;
        match approved {
            // Suggestions pushed over the channel never reached the inbox
            Err(Error::NotFound(_)) => {
                debug!(term = %suggestion.term, "Suggestion not in inbox, creating term directly");
                self.create_term(book_id, &suggestion.to_new_term()).await
            }
            other => other,
        }
    }

    async fn reject_suggestion(&self, suggestion_id: &str) -> Result<()> {
        let rejected = self
            .send(
                self.request(
                    Method::POST,
                    &format!("/glossary/suggestions/{}/reject", suggestion_id),
                ),
                &format!("glossary suggestion {}", suggestion_id),
            )
            .await;
        match rejected {
            Ok(_) | Err(Error::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
