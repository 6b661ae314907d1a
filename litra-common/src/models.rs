//! Domain models shared between the session controller and the backend client
//!
//! Field names follow the backend's JSON contract: paragraph and glossary
//! records are snake_case, translation request/response bodies are camelCase
//! (snake_case aliases are accepted on input).

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Backend identifier of a book
pub type BookId = String;

/// Backend identifier of a chapter
pub type ChapterId = String;

/// Backend identifier of a paragraph
pub type ParagraphId = String;

/// Persisted paragraph status
///
/// The richer session-local status (translating, review, error) lives in the
/// session crate; this is only what the backend stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParagraphStatus {
    #[default]
    Pending,
    Translated,
    Approved,
}

impl ParagraphStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParagraphStatus::Pending => "pending",
            ParagraphStatus::Translated => "translated",
            ParagraphStatus::Approved => "approved",
        }
    }
}

/// Paragraph record as stored by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    pub id: ParagraphId,
    pub chapter_id: ChapterId,
    /// 1-based position inside the chapter
    #[serde(rename = "order")]
    pub index: u32,
    pub original_text: String,
    #[serde(default)]
    pub translated_text: Option<String>,
    #[serde(default)]
    pub status: ParagraphStatus,
}

impl Paragraph {
    /// True when a non-blank translation is attached
    pub fn has_translation(&self) -> bool {
        self.translated_text
            .as_deref()
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Partial paragraph update (PATCH body)
///
/// `translated_text: Some(None)` clears the stored translation; `None` leaves
/// it untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParagraphUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub translated_text: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ParagraphStatus>,
    #[serde(rename = "order", skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

/// A field that is present, even as `null`, is `Some`; absent stays `None`
fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl ParagraphUpdate {
    /// Update that stores an approved translation
    pub fn approved(translation: impl Into<String>) -> Self {
        Self {
            translated_text: Some(Some(translation.into())),
            status: Some(ParagraphStatus::Approved),
            ..Default::default()
        }
    }

    /// Update that stores a translation still awaiting review
    pub fn translated(translation: impl Into<String>) -> Self {
        Self {
            translated_text: Some(Some(translation.into())),
            status: Some(ParagraphStatus::Translated),
            ..Default::default()
        }
    }

    /// Update for edited source text that drops any stale translation
    pub fn source_reset(original_text: impl Into<String>) -> Self {
        Self {
            original_text: Some(original_text.into()),
            translated_text: Some(None),
            status: Some(ParagraphStatus::Pending),
            index: None,
        }
    }

    /// Update for edited source text on a paragraph with no translation
    pub fn source_only(original_text: impl Into<String>) -> Self {
        Self {
            original_text: Some(original_text.into()),
            ..Default::default()
        }
    }
}

/// New paragraph (POST body)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewParagraph {
    pub original_text: String,
    #[serde(rename = "order")]
    pub index: u32,
}

/// Glossary term, global when `book_id` is `None`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossaryTerm {
    pub id: String,
    #[serde(default)]
    pub book_id: Option<BookId>,
    pub source_term: String,
    pub target_term: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub whole_word: bool,
}

/// Glossary term creation/update body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGlossaryTerm {
    pub source_term: String,
    pub target_term: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub whole_word: bool,
}

/// AI-proposed glossary term waiting for approval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlossarySuggestion {
    /// Inbox id; generated locally for suggestions pushed over the channel
    #[serde(default = "generate_id")]
    pub id: String,
    pub term: String,
    #[serde(alias = "suggested_translation")]
    pub suggested_translation: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default, alias = "paragraph_id")]
    pub paragraph_id: Option<ParagraphId>,
}

impl GlossarySuggestion {
    /// Glossary term body created when the suggestion is approved
    pub fn to_new_term(&self) -> NewGlossaryTerm {
        NewGlossaryTerm {
            source_term: self.term.clone(),
            target_term: self.suggested_translation.clone(),
            context: self.context.clone(),
            category: None,
            case_sensitive: false,
            whole_word: true,
        }
    }
}

/// Glossary entry as sent to the translation operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub source: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl From<&GlossaryTerm> for GlossaryEntry {
    fn from(term: &GlossaryTerm) -> Self {
        Self {
            source: term.source_term.clone(),
            target: term.target_term.clone(),
            context: term.context.clone(),
        }
    }
}

/// Request body for the translation operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRequest {
    pub book_id: BookId,
    pub chapter_id: ChapterId,
    pub paragraph_id: ParagraphId,
    pub source_language: String,
    pub target_language: String,
    pub original_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// Serialized JSON list of [`GlossaryEntry`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glossary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// Result of the translation operation
///
/// Agent payloads are kept as raw JSON; the review normalizer makes sense of
/// them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationResponse {
    #[serde(default, alias = "translated_text")]
    pub translated_text: Option<String>,
    #[serde(default, alias = "thread_id")]
    pub thread_id: Option<String>,
    #[serde(default, alias = "review_package")]
    pub review_package: Option<serde_json::Value>,
    #[serde(default, alias = "agent_outputs")]
    pub agent_outputs: Option<serde_json::Value>,
    #[serde(default, alias = "enforcement_report")]
    pub enforcement_report: Option<serde_json::Value>,
}

impl TranslationResponse {
    /// Translated text, if present and non-blank
    pub fn text(&self) -> Option<&str> {
        self.translated_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Serialize glossary terms into the list format the translator expects
pub fn serialize_glossary(terms: &[GlossaryTerm]) -> crate::Result<Option<String>> {
    if terms.is_empty() {
        return Ok(None);
    }
    let entries: Vec<GlossaryEntry> = terms.iter().map(GlossaryEntry::from).collect();
    Ok(Some(serde_json::to_string(&entries)?))
}
