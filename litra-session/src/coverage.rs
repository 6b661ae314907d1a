//! Glossary coverage checker
//!
//! Advisory signal only: reports which glossary terms found in the source
//! text show up (by their target form) in the translation.

use litra_common::models::GlossaryTerm;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::collections::HashSet;
use tracing::warn;

/// Coverage of the glossary terms that occur in a paragraph
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverageReport {
    /// Distinct terms whose source form occurs in the original text
    pub total: usize,
    pub applied: usize,
    pub missing: usize,
    pub missing_terms: Vec<GlossaryTerm>,
}

impl CoverageReport {
    /// True when every matched term was applied (vacuously true with no terms)
    pub fn is_complete(&self) -> bool {
        self.missing == 0
    }
}

/// Literal match pattern for one side of a term
///
/// Returns `None` for blank text.
pub fn term_pattern(text: &str, case_sensitive: bool, whole_word: bool) -> Option<Regex> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let escaped = regex::escape(text);
    let pattern = if whole_word {
        format!(r"\b{}\b", escaped)
    } else {
        escaped
    };
    match RegexBuilder::new(&pattern)
        .case_insensitive(!case_sensitive)
        .build()
    {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(term = %text, error = %e, "Could not build glossary pattern");
            None
        }
    }
}

/// Compute glossary coverage for one paragraph
pub fn coverage(
    original: &str,
    translated: Option<&str>,
    terms: &[GlossaryTerm],
) -> CoverageReport {
    let mut seen: HashSet<&str> = HashSet::new();
    let matched: Vec<&GlossaryTerm> = terms
        .iter()
        .filter(|term| {
            term_pattern(&term.source_term, term.case_sensitive, term.whole_word)
                .map(|re| re.is_match(original))
                .unwrap_or(false)
        })
        .filter(|term| seen.insert(term.id.as_str()))
        .collect();

    let total = matched.len();
    let translated = translated.map(str::trim).filter(|t| !t.is_empty());

    let Some(translated) = translated else {
        return CoverageReport {
            total,
            applied: 0,
            missing: total,
            missing_terms: matched.into_iter().cloned().collect(),
        };
    };

    let missing_terms: Vec<GlossaryTerm> = matched
        .into_iter()
        .filter(|term| {
            !term_pattern(&term.target_term, term.case_sensitive, term.whole_word)
                .map(|re| re.is_match(translated))
                .unwrap_or(false)
        })
        .cloned()
        .collect();

    CoverageReport {
        total,
        applied: total - missing_terms.len(),
        missing: missing_terms.len(),
        missing_terms,
    }
}
