//! Agent output payloads
//!
//! One variant per known agent kind, plus `Unknown` for anything else. The
//! kind comes from the key the payload is stored under in `agent_outputs`.

use super::payload::{lenient_opt, lenient_vec, parse_or_default, text_list, Score, TextItem};
use serde::de::{Deserializer, Error as _};
use serde::Deserialize;
use serde_json::Value;

/// Keys of `agent_outputs` that hold flat lists rather than agent payloads
const FLAT_KEYS: &[&str] = &["notes", "suggestions", "recommendations", "actions"];

/// Known analysis agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AgentKind {
    Semantic,
    Style,
    Consistency,
    Glossary,
    Unknown,
}

impl AgentKind {
    /// Classify an `agent_outputs` key ("semantic_agent", "styleGrammar", ...)
    pub fn classify(key: &str) -> Self {
        let key = key.to_ascii_lowercase();
        if key.contains("semantic") {
            AgentKind::Semantic
        } else if key.contains("style") || key.contains("grammar") || key.contains("fluency") {
            AgentKind::Style
        } else if key.contains("consistency") {
            AgentKind::Consistency
        } else if key.contains("glossary") || key.contains("terminology") {
            AgentKind::Glossary
        } else {
            AgentKind::Unknown
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SemanticReport {
    #[serde(deserialize_with = "lenient_opt", alias = "semantic_score", alias = "fidelity_score")]
    pub score: Option<Score>,
    #[serde(deserialize_with = "lenient_opt", alias = "overall_assessment", alias = "summary")]
    pub assessment: Option<TextItem>,
    #[serde(deserialize_with = "lenient_vec")]
    pub issues: Vec<SemanticIssue>,
    #[serde(deserialize_with = "lenient_vec")]
    pub notes: Vec<TextItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SemanticIssue {
    #[serde(deserialize_with = "lenient_opt")]
    pub description: Option<TextItem>,
    #[serde(
        deserialize_with = "lenient_opt",
        alias = "suggestedCorrection",
        alias = "correction",
        alias = "suggestion"
    )]
    pub suggested_correction: Option<TextItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct StyleReport {
    #[serde(deserialize_with = "lenient_opt", alias = "style_score", alias = "fluency_score")]
    pub score: Option<Score>,
    #[serde(deserialize_with = "lenient_opt", alias = "assessment")]
    pub summary: Option<TextItem>,
    #[serde(
        deserialize_with = "lenient_vec",
        alias = "grammarCorrections",
        alias = "grammar_issues"
    )]
    pub grammar_corrections: Vec<Correction>,
    #[serde(
        deserialize_with = "lenient_vec",
        alias = "styleCorrections",
        alias = "style_suggestions"
    )]
    pub style_corrections: Vec<Correction>,
    #[serde(deserialize_with = "lenient_vec")]
    pub notes: Vec<TextItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ConsistencyReport {
    #[serde(deserialize_with = "lenient_opt", alias = "consistency_score")]
    pub score: Option<Score>,
    #[serde(deserialize_with = "lenient_vec", alias = "inconsistencies")]
    pub warnings: Vec<TextItem>,
    #[serde(deserialize_with = "lenient_vec")]
    pub issues: Vec<TextItem>,
    #[serde(deserialize_with = "lenient_vec")]
    pub recommendations: Vec<TextItem>,
    #[serde(deserialize_with = "lenient_vec")]
    pub notes: Vec<TextItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct GlossaryReport {
    #[serde(deserialize_with = "lenient_vec", alias = "glossary_matches", alias = "applied_terms")]
    pub matches: Vec<TermMatch>,
    #[serde(deserialize_with = "lenient_vec", alias = "extractedTerms", alias = "new_terms")]
    pub extracted_terms: Vec<TermMatch>,
    #[serde(deserialize_with = "lenient_vec")]
    pub notes: Vec<TextItem>,
}

/// A correction given either as prose or as `{original, corrected}`
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Correction {
    pub original: Option<String>,
    pub corrected: String,
}

impl Correction {
    pub fn render(&self) -> String {
        match &self.original {
            Some(original) => format!("{} → {}", original, self.corrected),
            None => self.corrected.clone(),
        }
    }
}

impl<'de> Deserialize<'de> for Correction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let text_at = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| value.get(*key))
                .find_map(|v| v.as_str().map(str::trim).filter(|s| !s.is_empty()))
                .map(str::to_string)
        };
        match &value {
            Value::String(s) if !s.trim().is_empty() => Ok(Correction {
                original: None,
                corrected: s.trim().to_string(),
            }),
            Value::Object(_) => {
                let corrected = text_at(&["corrected", "correction", "suggestion", "after", "text"])
                    .ok_or_else(|| D::Error::custom("correction without corrected text"))?;
                Ok(Correction {
                    original: text_at(&["original", "before"]),
                    corrected,
                })
            }
            _ => Err(D::Error::custom("not a correction")),
        }
    }
}

/// A glossary hit given as a bare term or `{term, translation}`
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TermMatch {
    pub term: String,
    pub translation: Option<String>,
}

impl TermMatch {
    pub fn render(&self) -> String {
        match &self.translation {
            Some(translation) => format!("{} → {}", self.term, translation),
            None => self.term.clone(),
        }
    }
}

impl<'de> Deserialize<'de> for TermMatch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let text_at = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| value.get(*key))
                .find_map(|v| v.as_str().map(str::trim).filter(|s| !s.is_empty()))
                .map(str::to_string)
        };
        match &value {
            Value::String(s) if !s.trim().is_empty() => Ok(TermMatch {
                term: s.trim().to_string(),
                translation: None,
            }),
            Value::Object(_) => Ok(TermMatch {
                term: text_at(&["term", "source", "source_term"])
                    .ok_or_else(|| D::Error::custom("glossary match without term"))?,
                translation: text_at(&[
                    "translation",
                    "target",
                    "target_term",
                    "suggested_translation",
                ]),
            }),
            _ => Err(D::Error::custom("not a glossary match")),
        }
    }
}

/// One agent's output, by kind
#[derive(Debug, Clone)]
pub(crate) enum AgentPayload {
    Semantic(SemanticReport),
    Style(StyleReport),
    Consistency(ConsistencyReport),
    Glossary(GlossaryReport),
    /// Unrecognised agent; contributes nothing
    Unknown,
}

impl AgentPayload {
    pub fn parse(kind: AgentKind, value: &Value) -> Self {
        match kind {
            AgentKind::Semantic => AgentPayload::Semantic(parse_or_default(value)),
            AgentKind::Style => AgentPayload::Style(parse_or_default(value)),
            AgentKind::Consistency => AgentPayload::Consistency(parse_or_default(value)),
            AgentKind::Glossary => AgentPayload::Glossary(parse_or_default(value)),
            AgentKind::Unknown => AgentPayload::Unknown,
        }
    }

    fn kind(&self) -> AgentKind {
        match self {
            AgentPayload::Semantic(_) => AgentKind::Semantic,
            AgentPayload::Style(_) => AgentKind::Style,
            AgentPayload::Consistency(_) => AgentKind::Consistency,
            AgentPayload::Glossary(_) => AgentKind::Glossary,
            AgentPayload::Unknown => AgentKind::Unknown,
        }
    }

    pub fn notes(&self) -> &[TextItem] {
        match self {
            AgentPayload::Semantic(r) => &r.notes,
            AgentPayload::Style(r) => &r.notes,
            AgentPayload::Consistency(r) => &r.notes,
            AgentPayload::Glossary(r) => &r.notes,
            AgentPayload::Unknown => &[],
        }
    }
}

/// Parsed `agent_outputs` object
#[derive(Debug, Clone, Default)]
pub(crate) struct AgentOutputs {
    /// Ordered semantic, style, consistency, glossary; key order within a kind
    pub agents: Vec<AgentPayload>,
    pub notes: Vec<TextItem>,
    /// Flat `suggestions`, `recommendations`, `actions` lists, in that order
    pub fallback_suggestions: Vec<TextItem>,
}

impl AgentOutputs {
    pub fn parse(value: &Value) -> Self {
        let Some(Value::Object(map)) = super::payload::unwrap_payload(value) else {
            return Self::default();
        };

        let mut agents: Vec<(AgentKind, AgentPayload)> = map
            .iter()
            .filter(|(key, _)| !FLAT_KEYS.contains(&key.as_str()))
            .map(|(key, payload)| {
                let kind = AgentKind::classify(key);
                (kind, AgentPayload::parse(kind, payload))
            })
            .collect();
        // Stable: keeps key order within a kind
        agents.sort_by_key(|(kind, _)| *kind);

        let fallback_suggestions = ["suggestions", "recommendations", "actions"]
            .iter()
            .filter_map(|key| map.get(*key))
            .flat_map(text_list)
            .collect();

        Self {
            agents: agents.into_iter().map(|(_, payload)| payload).collect(),
            notes: map.get("notes").map(text_list).unwrap_or_default(),
            fallback_suggestions,
        }
    }

    pub fn semantic(&self) -> impl Iterator<Item = &SemanticReport> {
        self.agents.iter().filter_map(|a| match a {
            AgentPayload::Semantic(r) => Some(r),
            _ => None,
        })
    }

    pub fn style(&self) -> impl Iterator<Item = &StyleReport> {
        self.agents.iter().filter_map(|a| match a {
            AgentPayload::Style(r) => Some(r),
            _ => None,
        })
    }

    pub fn consistency(&self) -> impl Iterator<Item = &ConsistencyReport> {
        self.agents.iter().filter_map(|a| match a {
            AgentPayload::Consistency(r) => Some(r),
            _ => None,
        })
    }

    pub fn glossary(&self) -> impl Iterator<Item = &GlossaryReport> {
        self.agents.iter().filter_map(|a| match a {
            AgentPayload::Glossary(r) => Some(r),
            _ => None,
        })
    }
}
