//! Human-in-the-loop review queue
//!
//! Holds at most one current review; further reviews wait in arrival order.
//! Resolving the current review records it in the history and promotes the
//! next one.

use crate::review::AgentAnalysis;
use chrono::{DateTime, Utc};
use litra_common::models::ParagraphId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// A translation waiting for a reviewer decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationReview {
    pub id: Uuid,
    pub paragraph_id: ParagraphId,
    pub translation: String,
    pub analysis: Option<AgentAnalysis>,
    /// Copy of `analysis.suggestions`, empty without analysis
    pub suggestions: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl TranslationReview {
    pub fn new(
        paragraph_id: impl Into<ParagraphId>,
        translation: impl Into<String>,
        analysis: Option<AgentAnalysis>,
    ) -> Self {
        let suggestions = analysis
            .as_ref()
            .map(|a| a.suggestions.clone())
            .unwrap_or_default();
        Self {
            id: Uuid::new_v4(),
            paragraph_id: paragraph_id.into(),
            translation: translation.into(),
            analysis,
            suggestions,
            created_at: litra_common::time::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewOutcome {
    Approved,
    Skipped,
    /// Paragraph changed underneath the review (edit, failure, new translation)
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedReview {
    pub review: TranslationReview,
    pub outcome: ReviewOutcome,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ReviewQueue {
    current: Option<TranslationReview>,
    waiting: VecDeque<TranslationReview>,
    history: Vec<ResolvedReview>,
}

impl ReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&TranslationReview> {
        self.current.as_ref()
    }

    pub fn waiting(&self) -> impl Iterator<Item = &TranslationReview> {
        self.waiting.iter()
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    pub fn history(&self) -> &[ResolvedReview] {
        &self.history
    }

    /// Queue a review
    ///
    /// A review for a paragraph that already has one replaces it in place.
    /// Returns true when the offered review became the current one.
    pub fn offer(&mut self, review: TranslationReview) -> bool {
        if let Some(current) = self.current.as_mut() {
            if current.paragraph_id == review.paragraph_id {
                *current = review;
                return true;
            }
        }
        if let Some(slot) = self
            .waiting
            .iter_mut()
            .find(|r| r.paragraph_id == review.paragraph_id)
        {
            *slot = review;
            return false;
        }
        if self.current.is_none() {
            self.current = Some(review);
            true
        } else {
            self.waiting.push_back(review);
            false
        }
    }

    /// Resolve the current review and promote the next waiting one
    pub fn resolve_current(&mut self, outcome: ReviewOutcome) -> Option<TranslationReview> {
        let review = self.current.take()?;
        self.record(review.clone(), outcome);
        self.current = self.waiting.pop_front();
        Some(review)
    }

    /// Resolve whichever review belongs to `paragraph_id`, current or waiting
    pub fn resolve_for(
        &mut self,
        paragraph_id: &str,
        outcome: ReviewOutcome,
    ) -> Option<TranslationReview> {
        let is_current = self
            .current
            .as_ref()
            .map(|r| r.paragraph_id == paragraph_id)
            .unwrap_or(false);
        if is_current {
            return self.resolve_current(outcome);
        }
        let position = self.waiting.iter().position(|r| r.paragraph_id == paragraph_id)?;
        let review = self.waiting.remove(position)?;
        self.record(review.clone(), outcome);
        Some(review)
    }

    /// Remove reviews whose paragraphs no longer exist
    pub fn retain_paragraphs(&mut self, keep: impl Fn(&str) -> bool) {
        let stale: Vec<ParagraphId> = self
            .current
            .iter()
            .chain(self.waiting.iter())
            .filter(|r| !keep(&r.paragraph_id))
            .map(|r| r.paragraph_id.clone())
            .collect();
        for paragraph_id in stale {
            self.resolve_for(&paragraph_id, ReviewOutcome::Superseded);
        }
    }

    fn record(&mut self, review: TranslationReview, outcome: ReviewOutcome) {
        self.history.push(ResolvedReview {
            review,
            outcome,
            resolved_at: litra_common::time::now(),
        });
    }
}
