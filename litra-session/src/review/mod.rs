//! Review package normalizer
//!
//! Folds the three optional payloads a translation can carry (review package,
//! agent outputs, enforcement report) into one [`AgentAnalysis`]. The function
//! is pure: the same inputs always give the same lines in the same order.
//!
//! Suggestion order:
//! 1. review package prioritized issues
//! 2. review package decision questions
//! 3. review package alternative options
//! 4. agent corrections (semantic, style, consistency)
//! 5. enforcement applied then skipped lines
//! 6. enforcement notes
//! 7. flat `suggestions` / `recommendations` / `actions` on the agent outputs

mod agents;
mod package;
pub(crate) mod payload;

pub use agents::AgentKind;

use agents::{AgentOutputs, Correction, TermMatch};
use package::{AlternativeOption, DecisionQuestion, EnforcementReport, PackageIssue, ReviewPackage};
use payload::{parse_or_default, unwrap_payload, Score, TextItem};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Normalized view of everything the agents said about a translation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentAnalysis {
    pub glossary: Vec<String>,
    pub consistency: Vec<String>,
    pub semantic_score: Option<u8>,
    pub style_score: Option<u8>,
    pub notes: Vec<String>,
    pub suggestions: Vec<String>,
    pub enforcement: Option<EnforcementSummary>,
}

impl AgentAnalysis {
    pub fn is_empty(&self) -> bool {
        self.glossary.is_empty()
            && self.consistency.is_empty()
            && self.semantic_score.is_none()
            && self.style_score.is_none()
            && self.notes.is_empty()
            && self.suggestions.is_empty()
            && self.enforcement.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnforcementSummary {
    pub mode: Option<String>,
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
    pub glossary_status: Option<String>,
    pub missing_terms: Vec<String>,
}

/// Normalize a score to 0..=100
///
/// Values at or below 1 are fractions and get scaled; everything is rounded
/// and clamped.
pub fn normalize_score(raw: f64) -> Option<u8> {
    if !raw.is_finite() {
        return None;
    }
    let scaled = if raw <= 1.0 { raw * 100.0 } else { raw };
    Some(scaled.round().clamp(0.0, 100.0) as u8)
}

/// Insertion-ordered list that drops blanks and exact duplicates after trimming
#[derive(Default)]
struct Lines {
    seen: HashSet<String>,
    items: Vec<String>,
}

impl Lines {
    fn push(&mut self, line: impl AsRef<str>) {
        let line = line.as_ref().trim();
        if line.is_empty() || self.seen.contains(line) {
            return;
        }
        self.seen.insert(line.to_string());
        self.items.push(line.to_string());
    }

    fn extend<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.push(line);
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.items
    }
}

fn text(items: &[TextItem]) -> impl Iterator<Item = &str> {
    items.iter().map(TextItem::as_str)
}

/// Build an analysis from the raw payloads of a translation result
///
/// Returns `None` only when all three inputs are absent or `null`. Present
/// but unusable payloads still produce an (empty) analysis.
pub fn normalize(
    review_package: Option<&Value>,
    agent_outputs: Option<&Value>,
    enforcement_report: Option<&Value>,
) -> Option<AgentAnalysis> {
    let present = |v: Option<&Value>| v.map(|v| !v.is_null()).unwrap_or(false);
    if !present(review_package) && !present(agent_outputs) && !present(enforcement_report) {
        return None;
    }

    let package: ReviewPackage = review_package.map(parse_or_default).unwrap_or_default();
    let agents = agent_outputs.map(AgentOutputs::parse).unwrap_or_default();
    let enforcement: Option<EnforcementReport> = enforcement_report
        .and_then(unwrap_payload)
        .map(|v| parse_or_default(&v));

    let mut glossary = Lines::default();
    glossary.extend(package.issues_from("glossary").filter_map(PackageIssue::text));
    for report in agents.glossary() {
        glossary.extend(report.matches.iter().map(TermMatch::render));
        glossary.extend(report.extracted_terms.iter().map(TermMatch::render));
    }

    let mut consistency = Lines::default();
    consistency.extend(package.issues_from("consistency").filter_map(PackageIssue::text));
    for report in agents.consistency() {
        consistency.extend(text(&report.warnings));
        consistency.extend(text(&report.issues));
    }

    let mut notes = Lines::default();
    notes.extend(text(&package.context_notes));
    for report in agents.semantic() {
        notes.extend(report.assessment.as_ref().map(TextItem::as_str));
    }
    for report in agents.style() {
        notes.extend(report.summary.as_ref().map(TextItem::as_str));
    }
    for agent in &agents.agents {
        notes.extend(text(agent.notes()));
    }
    notes.extend(text(&agents.notes));
    if let Some(report) = &enforcement {
        notes.extend(text(&report.notes));
    }

    let mut suggestions = Lines::default();
    suggestions.extend(package.prioritized_issues.iter().filter_map(PackageIssue::render));
    suggestions.extend(package.decision_questions.iter().filter_map(DecisionQuestion::render));
    suggestions.extend(package.alternative_options.iter().flat_map(AlternativeOption::render));
    for report in agents.semantic() {
        suggestions.extend(
            report
                .issues
                .iter()
                .filter_map(|issue| issue.suggested_correction.as_ref())
                .map(TextItem::as_str),
        );
    }
    for report in agents.style() {
        suggestions.extend(report.grammar_corrections.iter().map(Correction::render));
        suggestions.extend(report.style_corrections.iter().map(Correction::render));
    }
    for report in agents.consistency() {
        suggestions.extend(text(&report.recommendations));
    }
    if let Some(report) = &enforcement {
        suggestions.extend(report.applied.iter().filter_map(|s| s.render(false)));
        suggestions.extend(report.skipped.iter().filter_map(|s| s.render(true)));
        suggestions.extend(text(&report.notes));
    }
    suggestions.extend(text(&agents.fallback_suggestions));

    let package_scores = package.scores.clone().unwrap_or_default();
    let semantic_score = package_scores
        .semantic
        .or_else(|| agents.semantic().find_map(|r| r.score))
        .and_then(|Score(raw)| normalize_score(raw));
    let style_score = package_scores
        .style
        .or_else(|| agents.style().find_map(|r| r.score))
        .and_then(|Score(raw)| normalize_score(raw));

    let enforcement = enforcement.map(|report| {
        let (glossary_status, missing_terms) = match &report.glossary {
            Some(g) => (
                g.status.clone(),
                g.missing_terms.iter().map(|t| t.0.clone()).collect(),
            ),
            None => (None, Vec::new()),
        };
        EnforcementSummary {
            mode: report.mode.clone(),
            applied: report.applied.iter().filter_map(|s| s.render(false)).collect(),
            skipped: report.skipped.iter().filter_map(|s| s.render(true)).collect(),
            glossary_status,
            missing_terms,
        }
    });

    Some(AgentAnalysis {
        glossary: glossary.into_vec(),
        consistency: consistency.into_vec(),
        semantic_score,
        style_score,
        notes: notes.into_vec(),
        suggestions: suggestions.into_vec(),
        enforcement,
    })
}
