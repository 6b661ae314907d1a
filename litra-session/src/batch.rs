//! Bounded-concurrency batch translation
//!
//! `min(max_concurrency, queue length)` workers pop paragraph ids from one
//! shared queue until it is empty, so every paragraph is visited exactly once.
//! A failing paragraph is counted and the worker moves on.
//!
//! A batch only runs once confirmed: [`BatchPlan`] exists only for a non-empty
//! set and turns into a runnable [`ConfirmedBatch`] through [`BatchPlan::confirm`].

use futures::future::join_all;
use litra_common::models::ParagraphId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Pending paragraphs proposed for a batch, awaiting confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    paragraph_ids: Vec<ParagraphId>,
}

impl BatchPlan {
    /// `None` when there is nothing to translate
    pub fn new(paragraph_ids: Vec<ParagraphId>) -> Option<Self> {
        if paragraph_ids.is_empty() {
            None
        } else {
            Some(Self { paragraph_ids })
        }
    }

    pub fn len(&self) -> usize {
        self.paragraph_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paragraph_ids.is_empty()
    }

    pub fn paragraph_ids(&self) -> &[ParagraphId] {
        &self.paragraph_ids
    }

    /// The user agreed to translate `len()` paragraphs
    pub fn confirm(self) -> ConfirmedBatch {
        ConfirmedBatch {
            paragraph_ids: self.paragraph_ids,
        }
    }
}

/// A batch the user confirmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedBatch {
    paragraph_ids: Vec<ParagraphId>,
}

impl ConfirmedBatch {
    pub fn len(&self) -> usize {
        self.paragraph_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paragraph_ids.is_empty()
    }

    pub fn paragraph_ids(&self) -> &[ParagraphId] {
        &self.paragraph_ids
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub paragraph_id: ParagraphId,
    pub message: String,
}

/// Aggregate outcome of a batch run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub success_count: usize,
    pub failed_count: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.success_count + self.failed_count
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchRunner {
    max_concurrency: usize,
}

impl Default for BatchRunner {
    fn default() -> Self {
        Self::new(5)
    }
}

impl BatchRunner {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Number of workers used for `queue_len` paragraphs
    pub fn concurrency(&self, queue_len: usize) -> usize {
        self.max_concurrency.min(queue_len)
    }

    /// Run `work` once per paragraph of the batch
    ///
    /// Workers are futures polled together on the calling task.
    pub async fn run<F, Fut, E>(&self, batch: ConfirmedBatch, work: F) -> BatchSummary
    where
        F: Fn(ParagraphId) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        let total = batch.len();
        let workers = self.concurrency(total);
        info!(total, workers, "Batch translation starting");

        let queue = Mutex::new(VecDeque::from(batch.paragraph_ids));
        let success_count = AtomicUsize::new(0);
        let failed_count = AtomicUsize::new(0);
        let failures = Mutex::new(Vec::new());

        let worker_futures = (0..workers).map(|worker| {
            let (queue, success_count, failed_count, failures, work) =
                (&queue, &success_count, &failed_count, &failures, &work);
            async move {
                loop {
                    let next = queue.lock().await.pop_front();
                    let Some(paragraph_id) = next else {
                        break;
                    };
                    debug!(worker, paragraph_id = %paragraph_id, "Batch worker picked paragraph");
                    match work(paragraph_id.clone()).await {
                        Ok(()) => {
                            success_count.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            warn!(
                                worker,
                                paragraph_id = %paragraph_id,
                                error = %e,
                                "Batch item failed"
                            );
                            failed_count.fetch_add(1, Ordering::Relaxed);
                            failures.lock().await.push(BatchFailure {
                                paragraph_id,
                                message: e.to_string(),
                            });
                        }
                    }
                }
            }
        });
        join_all(worker_futures).await;

        let summary = BatchSummary {
            success_count: success_count.load(Ordering::Relaxed),
            failed_count: failed_count.load(Ordering::Relaxed),
            failures: failures.into_inner(),
        };
        info!(
            success = summary.success_count,
            failed = summary.failed_count,
            "Batch translation finished"
        );
        summary
    }
}
