//! Review package and enforcement report shapes

use super::payload::{lenient_opt, lenient_vec, Score, TextItem};
use serde::Deserialize;

/// Structured bundle prepared for the human reviewer
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ReviewPackage {
    #[serde(deserialize_with = "lenient_vec")]
    pub issues: Vec<PackageIssue>,
    #[serde(deserialize_with = "lenient_vec", alias = "prioritizedIssues")]
    pub prioritized_issues: Vec<PackageIssue>,
    #[serde(deserialize_with = "lenient_vec", alias = "decisionQuestions", alias = "questions")]
    pub decision_questions: Vec<DecisionQuestion>,
    #[serde(deserialize_with = "lenient_vec", alias = "alternativeOptions", alias = "alternatives")]
    pub alternative_options: Vec<AlternativeOption>,
    #[serde(deserialize_with = "lenient_vec", alias = "contextNotes", alias = "notes")]
    pub context_notes: Vec<TextItem>,
    #[serde(deserialize_with = "lenient_opt")]
    pub scores: Option<PackageScores>,
}

impl ReviewPackage {
    /// Issues raised by agents whose name contains `needle`
    pub fn issues_from<'a>(&'a self, needle: &'a str) -> impl Iterator<Item = &'a PackageIssue> {
        self.issues
            .iter()
            .chain(self.prioritized_issues.iter())
            .filter(move |issue| {
                issue
                    .source_agent
                    .as_deref()
                    .map(|agent| agent.to_ascii_lowercase().contains(needle))
                    .unwrap_or(false)
            })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct PackageIssue {
    #[serde(
        deserialize_with = "lenient_opt",
        alias = "sourceAgent",
        alias = "agent",
        alias = "source"
    )]
    pub source_agent: Option<String>,
    #[serde(deserialize_with = "lenient_opt", alias = "issue", alias = "message")]
    pub description: Option<TextItem>,
    #[serde(deserialize_with = "lenient_opt", alias = "recommendation", alias = "fix")]
    pub suggestion: Option<TextItem>,
}

impl PackageIssue {
    /// `"<description> Sugestão: <suggestion>"`, or whichever half exists
    pub fn render(&self) -> Option<String> {
        match (&self.description, &self.suggestion) {
            (Some(d), Some(s)) => Some(format!("{} Sugestão: {}", d.as_str(), s.as_str())),
            (Some(d), None) => Some(d.0.clone()),
            (None, Some(s)) => Some(s.0.clone()),
            (None, None) => None,
        }
    }

    pub fn text(&self) -> Option<String> {
        self.description
            .as_ref()
            .or(self.suggestion.as_ref())
            .map(|t| t.0.clone())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct DecisionQuestion {
    #[serde(deserialize_with = "lenient_opt", alias = "text")]
    pub question: Option<TextItem>,
    #[serde(deserialize_with = "lenient_opt")]
    pub impact: Option<TextItem>,
}

impl DecisionQuestion {
    pub fn render(&self) -> Option<String> {
        match (&self.question, &self.impact) {
            (Some(q), Some(i)) => Some(format!("{} Impacto: {}", q.as_str(), i.as_str())),
            (Some(q), None) => Some(q.0.clone()),
            (None, _) => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AlternativeOption {
    #[serde(deserialize_with = "lenient_opt", alias = "label")]
    pub segment: Option<TextItem>,
    #[serde(deserialize_with = "lenient_opt", alias = "text", alias = "alternative")]
    pub option: Option<TextItem>,
    #[serde(deserialize_with = "lenient_vec")]
    pub options: Vec<TextItem>,
}

impl AlternativeOption {
    /// One line per option text, prefixed with the segment when labelled
    pub fn render(&self) -> Vec<String> {
        self.option
            .iter()
            .chain(self.options.iter())
            .map(|option| match &self.segment {
                Some(segment) => format!("{}: {}", segment.as_str(), option.as_str()),
                None => option.0.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct PackageScores {
    #[serde(deserialize_with = "lenient_opt", alias = "semantic_score", alias = "fidelity")]
    pub semantic: Option<Score>,
    #[serde(deserialize_with = "lenient_opt", alias = "style_score", alias = "fluency")]
    pub style: Option<Score>,
}

/// Outcome of automated post-processing of suggested corrections
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct EnforcementReport {
    #[serde(deserialize_with = "lenient_opt")]
    pub mode: Option<String>,
    #[serde(
        deserialize_with = "lenient_vec",
        alias = "applied_suggestions",
        alias = "appliedSuggestions"
    )]
    pub applied: Vec<EnforcedSuggestion>,
    #[serde(
        deserialize_with = "lenient_vec",
        alias = "skipped_suggestions",
        alias = "skippedSuggestions"
    )]
    pub skipped: Vec<EnforcedSuggestion>,
    #[serde(deserialize_with = "lenient_opt")]
    pub glossary: Option<GlossaryEnforcement>,
    #[serde(deserialize_with = "lenient_vec")]
    pub notes: Vec<TextItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct EnforcedSuggestion {
    #[serde(deserialize_with = "lenient_opt", alias = "agent", alias = "source_agent")]
    pub source: Option<String>,
    #[serde(deserialize_with = "lenient_opt", alias = "suggestion", alias = "text")]
    pub description: Option<TextItem>,
    #[serde(deserialize_with = "lenient_opt")]
    pub reason: Option<TextItem>,
}

impl EnforcedSuggestion {
    /// `"<source>: <description>"`; skipped lines get `" Não aplicada: <reason>"`
    pub fn render(&self, skipped: bool) -> Option<String> {
        let description = self.description.as_ref()?;
        let mut line = match self.source.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(source) => format!("{}: {}", source, description.as_str()),
            None => description.0.clone(),
        };
        if skipped {
            if let Some(reason) = &self.reason {
                line.push_str(" Não aplicada: ");
                line.push_str(reason.as_str());
            }
        }
        Some(line)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct GlossaryEnforcement {
    #[serde(deserialize_with = "lenient_opt")]
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient_vec", alias = "missingTerms")]
    pub missing_terms: Vec<TextItem>,
}
