//! Session controller flows over the in-memory backend

mod helpers;

use helpers::{context, fast_options, paragraph, pending, term, wait_until, MemoryBackend, MockTransport};
use litra_common::events::{ChannelStatus, SessionNotice};
use litra_common::models::ParagraphStatus;
use litra_session::channel::EventChannel;
use litra_session::hitl::ReviewOutcome;
use litra_session::session::TranslationMode;
use litra_session::status::UiStatus;
use litra_session::{SessionController, SessionError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

async fn start(backend: &Arc<MemoryBackend>) -> SessionController {
    SessionController::start(context(backend, EventChannel::disabled()))
        .await
        .unwrap()
}

fn drain(rx: &mut broadcast::Receiver<SessionNotice>) -> Vec<SessionNotice> {
    let mut notices = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        notices.push(notice);
    }
    notices
}

async fn status(session: &SessionController, paragraph_id: &str) -> Option<UiStatus> {
    session.snapshot().await.unwrap().status(paragraph_id)
}

#[tokio::test]
async fn test_load_maps_persisted_status() {
    let backend = MemoryBackend::with_paragraphs(vec![
        paragraph("p3", 3, ParagraphStatus::Approved, Some("Three")),
        pending("p1", 1),
        paragraph("p2", 2, ParagraphStatus::Translated, Some("Two")),
    ]);
    let session = start(&backend).await;
    let snapshot = session.snapshot().await.unwrap();

    let ids: Vec<&str> = snapshot.paragraphs.iter().map(|p| p.paragraph.id.as_str()).collect();
    assert_eq!(ids, vec!["p1", "p2", "p3"]);
    assert_eq!(snapshot.status("p1"), Some(UiStatus::Pending));
    assert_eq!(snapshot.status("p2"), Some(UiStatus::Review));
    assert_eq!(snapshot.status("p3"), Some(UiStatus::Approved));
    assert_eq!(snapshot.connection_status(), ChannelStatus::Disabled);

    session.shutdown().await;
}

#[tokio::test]
async fn test_manual_translation_waits_for_review() {
    let backend = MemoryBackend::with_paragraphs(vec![pending("p1", 1)]);
    backend.set_agent_payloads(None, Some(json!({ "style": { "score": 0.75 } })));
    let session = start(&backend).await;
    let mut notices = session.notices();

    let outcome = session.translate("p1", TranslationMode::ManualReview).await.unwrap();
    assert_eq!(outcome.translation, "EN: Texto original p1");
    assert!(!outcome.approved);
    assert_eq!(outcome.analysis.as_ref().unwrap().style_score, Some(75));

    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.status("p1"), Some(UiStatus::Review));
    assert_eq!(snapshot.current_review.as_ref().unwrap().paragraph_id, "p1");

    let stored = backend.stored("p1").unwrap();
    assert_eq!(stored.status, ParagraphStatus::Translated);
    assert_eq!(stored.translated_text.as_deref(), Some("EN: Texto original p1"));

    let notices = drain(&mut notices);
    assert!(notices.iter().any(|n| matches!(n, SessionNotice::ReviewReady { paragraph_id, .. } if paragraph_id == "p1")));
    assert!(notices.iter().any(|n| matches!(
        n,
        SessionNotice::TranslationSucceeded { needs_review: true, .. }
    )));

    session.shutdown().await;
}

#[tokio::test]
async fn test_approve_persists_then_marks_approved() {
    let backend = MemoryBackend::with_paragraphs(vec![pending("p1", 1)]);
    let session = start(&backend).await;
    session.translate("p1", TranslationMode::ManualReview).await.unwrap();

    let saved = session.approve("p1", Some("  Edited by hand  ")).await.unwrap();
    assert_eq!(saved.status, ParagraphStatus::Approved);
    assert_eq!(saved.translated_text.as_deref(), Some("Edited by hand"));

    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.status("p1"), Some(UiStatus::Approved));
    assert!(snapshot.current_review.is_none());

    session.shutdown().await;
}

#[tokio::test]
async fn test_failed_approval_save_moves_to_error() {
    let backend = MemoryBackend::with_paragraphs(vec![pending("p1", 1)]);
    let session = start(&backend).await;
    session.translate("p1", TranslationMode::ManualReview).await.unwrap();
    let mut notices = session.notices();

    backend.set_fail_updates(true);
    let err = session.approve("p1", None).await.unwrap_err();
    assert!(matches!(err, SessionError::Common(_)));

    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.status("p1"), Some(UiStatus::Error));
    let progress = snapshot.paragraph("p1").unwrap().state.progress.clone().unwrap();
    assert!(progress.error.unwrap().contains("database unavailable"));
    assert_eq!(backend.stored("p1").unwrap().status, ParagraphStatus::Translated);

    let notices = drain(&mut notices);
    assert!(notices
        .iter()
        .any(|n| matches!(n, SessionNotice::ApprovalFailed { paragraph_id, .. } if paragraph_id == "p1")));
    assert!(!notices
        .iter()
        .any(|n| matches!(n, SessionNotice::TranslationApproved { .. })));

    session.shutdown().await;
}

#[tokio::test]
async fn test_approve_requires_review() {
    let backend = MemoryBackend::with_paragraphs(vec![pending("p1", 1)]);
    let session = start(&backend).await;

    let err = session.approve("p1", Some("Text")).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::InvalidTransition {
            from: UiStatus::Pending,
            action: "approve",
            ..
        }
    ));
    assert!(backend.updates().is_empty());

    session.shutdown().await;
}

#[tokio::test]
async fn test_editing_translated_source_resets_to_pending() {
    let backend = MemoryBackend::with_paragraphs(vec![
        paragraph("p1", 1, ParagraphStatus::Approved, Some("Old translation")),
        pending("p2", 2),
    ]);
    let session = start(&backend).await;

    let saved = session.edit_original("p1", "Texto revisto").await.unwrap();
    assert_eq!(saved.original_text, "Texto revisto");
    assert_eq!(saved.translated_text, None);
    assert_eq!(saved.status, ParagraphStatus::Pending);

    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.status("p1"), Some(UiStatus::Pending));
    assert_eq!(snapshot.paragraph("p1").unwrap().paragraph.translated_text, None);

    // No translation: only the text changes
    session.edit_original("p2", "Outro texto").await.unwrap();
    let (_, update) = backend.updates().pop().unwrap();
    assert_eq!(update.translated_text, None);
    assert_eq!(update.status, None);
    assert_eq!(status(&session, "p2").await, Some(UiStatus::Pending));

    session.shutdown().await;
}

#[tokio::test]
async fn test_editing_under_review_supersedes_review() {
    let backend = MemoryBackend::with_paragraphs(vec![pending("p1", 1), pending("p2", 2)]);
    let session = start(&backend).await;
    session.translate("p1", TranslationMode::ManualReview).await.unwrap();
    session.translate("p2", TranslationMode::ManualReview).await.unwrap();

    session.edit_original("p1", "Novo").await.unwrap();

    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.status("p1"), Some(UiStatus::Pending));
    assert_eq!(snapshot.current_review.unwrap().paragraph_id, "p2");
    assert_eq!(snapshot.waiting_reviews, 0);

    session.shutdown().await;
}

#[tokio::test]
async fn test_blank_text_rejected_before_network() {
    let backend = MemoryBackend::with_paragraphs(vec![pending("p1", 1)]);
    let session = start(&backend).await;
    let mut notices = session.notices();

    let err = session.edit_original("p1", "   \n ").await.unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
    let err = session.refine("p1", " ").await.unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));

    assert!(backend.updates().is_empty());
    assert_eq!(backend.total_translate_calls(), 0);
    let rejected = drain(&mut notices)
        .into_iter()
        .filter(|n| matches!(n, SessionNotice::ValidationRejected { .. }))
        .count();
    assert_eq!(rejected, 2);

    session.shutdown().await;
}

#[tokio::test]
async fn test_failed_translation_then_retry() {
    let backend = MemoryBackend::with_paragraphs(vec![pending("p1", 1)]);
    backend.fail_translation("p1");
    let session = start(&backend).await;
    let mut notices = session.notices();

    let err = session.translate("p1", TranslationMode::ManualReview).await.unwrap_err();
    assert!(matches!(err, SessionError::Common(_)));
    assert_eq!(status(&session, "p1").await, Some(UiStatus::Error));
    assert!(drain(&mut notices)
        .iter()
        .any(|n| matches!(n, SessionNotice::TranslationFailed { paragraph_id, .. } if paragraph_id == "p1")));

    backend.clear_failures();
    session.retry("p1").await.unwrap();
    assert_eq!(status(&session, "p1").await, Some(UiStatus::Review));

    // Retry only applies to failed paragraphs
    let err = session.retry("p1").await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidTransition { action: "retry", .. }));

    session.shutdown().await;
}

#[tokio::test]
async fn test_dropped_translation_can_be_retried() {
    let backend = MemoryBackend::with_paragraphs(vec![pending("p1", 1)]);
    backend.set_translate_delay(Duration::from_millis(300));
    let session = start(&backend).await;
    let mut notices = session.notices();

    let timed_out = tokio::time::timeout(
        Duration::from_millis(50),
        session.translate("p1", TranslationMode::ManualReview),
    )
    .await;
    assert!(timed_out.is_err());

    assert_eq!(status(&session, "p1").await, Some(UiStatus::Error));
    assert!(drain(&mut notices).iter().any(|n| matches!(
        n,
        SessionNotice::TranslationFailed { paragraph_id, message, .. }
            if paragraph_id == "p1" && message.contains("cancelled")
    )));

    backend.set_translate_delay(Duration::ZERO);
    session.retry("p1").await.unwrap();
    assert_eq!(status(&session, "p1").await, Some(UiStatus::Review));

    session.shutdown().await;
}

#[tokio::test]
async fn test_dropped_translation_accepts_source_edit() {
    let backend = MemoryBackend::with_paragraphs(vec![pending("p1", 1)]);
    backend.set_translate_delay(Duration::from_millis(300));
    let session = start(&backend).await;

    let _ = tokio::time::timeout(
        Duration::from_millis(50),
        session.translate("p1", TranslationMode::AutoApprove),
    )
    .await;

    session.edit_original("p1", "Texto novo").await.unwrap();
    assert_eq!(status(&session, "p1").await, Some(UiStatus::Pending));

    session.shutdown().await;
}

#[tokio::test]
async fn test_missing_text_is_an_error() {
    let backend = MemoryBackend::with_paragraphs(vec![pending("p1", 1)]);
    backend.return_empty_translation("p1");
    let session = start(&backend).await;

    let err = session.translate("p1", TranslationMode::AutoApprove).await.unwrap_err();
    assert!(matches!(err, SessionError::MissingTranslation(_)));
    assert_eq!(status(&session, "p1").await, Some(UiStatus::Error));
    assert!(backend.updates().is_empty());

    session.shutdown().await;
}

#[tokio::test]
async fn test_refine_sends_feedback_and_thread() {
    let backend = MemoryBackend::with_paragraphs(vec![pending("p1", 1)]);
    backend.add_term(term("t1", "sertão", "backlands"));
    let session = start(&backend).await;

    session.translate("p1", TranslationMode::ManualReview).await.unwrap();
    session.refine("p1", "More formal, please").await.unwrap();

    let requests = backend.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].thread_id, None);
    assert!(requests[0].glossary.as_deref().unwrap().contains("backlands"));
    assert_eq!(requests[1].feedback.as_deref(), Some("More formal, please"));
    assert_eq!(requests[1].thread_id.as_deref(), Some("thread-p1"));
    assert_eq!(status(&session, "p1").await, Some(UiStatus::Review));

    session.shutdown().await;
}

#[tokio::test]
async fn test_skip_review_promotes_next() {
    let backend = MemoryBackend::with_paragraphs(vec![pending("p1", 1), pending("p2", 2)]);
    let session = start(&backend).await;

    assert!(matches!(session.skip_review().await, Err(SessionError::NoCurrentReview)));

    session.translate("p1", TranslationMode::ManualReview).await.unwrap();
    session.translate("p2", TranslationMode::ManualReview).await.unwrap();
    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.current_review.unwrap().paragraph_id, "p1");
    assert_eq!(snapshot.waiting_reviews, 1);

    let skipped = session.skip_review().await.unwrap();
    assert_eq!(skipped.paragraph_id, "p1");

    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.current_review.as_ref().unwrap().paragraph_id, "p2");
    assert_eq!(snapshot.status("p1"), Some(UiStatus::Review));
    assert_eq!(snapshot.resolved_reviews.len(), 1);
    assert_eq!(snapshot.resolved_reviews[0].review.paragraph_id, "p1");
    assert_eq!(snapshot.resolved_reviews[0].outcome, ReviewOutcome::Skipped);

    // Approving a skipped paragraph still works from its stored text
    session.approve("p1", None).await.unwrap();
    assert_eq!(
        backend.stored("p1").unwrap().translated_text.as_deref(),
        Some("EN: Texto original p1")
    );

    session.shutdown().await;
}

#[tokio::test]
async fn test_batch_translates_each_pending_paragraph_once() {
    let mut paragraphs: Vec<_> = (1..=7).map(|i| pending(&format!("p{}", i), i)).collect();
    paragraphs.push(paragraph("done", 8, ParagraphStatus::Approved, Some("Done")));
    let backend = MemoryBackend::with_paragraphs(paragraphs);
    backend.set_translate_delay(Duration::from_millis(40));
    let session = start(&backend).await;
    let mut notices = session.notices();

    let plan = session.plan_batch().await.unwrap().unwrap();
    assert_eq!(plan.len(), 7);
    let summary = session.run_batch(plan.confirm()).await.unwrap();

    assert_eq!(summary.success_count, 7);
    assert_eq!(summary.failed_count, 0);
    assert_eq!(summary.total(), 7);
    for i in 1..=7 {
        let id = format!("p{}", i);
        assert_eq!(backend.translate_calls(&id), 1);
        assert_eq!(backend.stored(&id).unwrap().status, ParagraphStatus::Approved);
    }
    assert_eq!(backend.translate_calls("done"), 0);
    assert!(backend.peak_in_flight() <= 5);
    assert!(backend.peak_in_flight() > 1);

    let snapshot = session.snapshot().await.unwrap();
    assert!(snapshot.pending_ids().is_empty());
    assert!(!snapshot.batch_running);

    let notices = drain(&mut notices);
    let finished: Vec<_> = notices
        .iter()
        .filter(|n| matches!(n, SessionNotice::BatchFinished { .. }))
        .collect();
    assert_eq!(finished.len(), 1);
    assert!(matches!(
        finished[0],
        SessionNotice::BatchFinished {
            success_count: 7,
            failed_count: 0,
            ..
        }
    ));
    assert!(!notices
        .iter()
        .any(|n| matches!(n, SessionNotice::TranslationSucceeded { .. } | SessionNotice::TranslationApproved { .. })));

    session.shutdown().await;
}

#[tokio::test]
async fn test_batch_failure_does_not_stop_others() {
    let backend = MemoryBackend::with_paragraphs((1..=4).map(|i| pending(&format!("p{}", i), i)).collect());
    backend.fail_translation("p3");
    let session = start(&backend).await;

    let plan = session.plan_batch().await.unwrap().unwrap();
    let summary = session.run_batch(plan.confirm()).await.unwrap();

    assert_eq!(summary.success_count, 3);
    assert_eq!(summary.failed_count, 1);
    assert_eq!(summary.failures[0].paragraph_id, "p3");
    assert_eq!(status(&session, "p3").await, Some(UiStatus::Error));
    assert_eq!(status(&session, "p4").await, Some(UiStatus::Approved));

    session.shutdown().await;
}

#[tokio::test]
async fn test_batch_with_nothing_pending() {
    let backend = MemoryBackend::with_paragraphs(vec![paragraph("p1", 1, ParagraphStatus::Approved, Some("One"))]);
    let session = start(&backend).await;
    let mut notices = session.notices();

    assert!(session.plan_batch().await.unwrap().is_none());
    assert!(drain(&mut notices)
        .iter()
        .any(|n| matches!(n, SessionNotice::BatchNothingPending { .. })));
    assert_eq!(backend.total_translate_calls(), 0);

    session.shutdown().await;
}

#[tokio::test]
async fn test_coverage_uses_review_translation() {
    let backend = MemoryBackend::with_paragraphs(vec![pending("p1", 1)]);
    backend.add_term(term("t1", "original", "EN"));
    backend.add_term(term("t2", "texto", "text"));
    let session = start(&backend).await;

    session.translate("p1", TranslationMode::ManualReview).await.unwrap();
    let report = session.coverage("p1").await.unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.applied, 1);
    assert_eq!(report.missing_terms[0].source_term, "texto");

    session.shutdown().await;
}

#[tokio::test]
async fn test_suggestion_approval_and_rejection() {
    let backend = MemoryBackend::with_paragraphs(vec![pending("p1", 1)]);
    backend.add_suggestion(
        serde_json::from_value(json!({ "id": "s1", "term": "sertão", "suggestedTranslation": "backlands" })).unwrap(),
    );
    backend.add_suggestion(
        serde_json::from_value(json!({ "id": "s2", "term": "vereda", "suggestedTranslation": "trail" })).unwrap(),
    );
    let session = start(&backend).await;
    assert_eq!(session.snapshot().await.unwrap().suggestions.len(), 2);

    let term = session.approve_suggestion("s1").await.unwrap();
    assert_eq!(term.target_term, "backlands");
    session.reject_suggestion("s2").await.unwrap();

    let snapshot = session.snapshot().await.unwrap();
    assert!(snapshot.suggestions.is_empty());
    assert!(snapshot.glossary.iter().any(|t| t.source_term == "sertão"));
    assert!(backend.suggestions().is_empty());

    assert!(matches!(
        session.approve_suggestion("s1").await,
        Err(SessionError::UnknownSuggestion(_))
    ));

    session.shutdown().await;
}

#[tokio::test]
async fn test_unknown_paragraph() {
    let backend = MemoryBackend::with_paragraphs(vec![pending("p1", 1)]);
    let session = start(&backend).await;

    let err = session.translate("nope", TranslationMode::ManualReview).await.unwrap_err();
    assert!(matches!(err, SessionError::UnknownParagraph(_)));

    session.shutdown().await;
}

#[tokio::test]
async fn test_remote_events_drive_status() {
    let backend = MemoryBackend::with_paragraphs(vec![pending("p1", 1), pending("p2", 2)]);
    let transport = MockTransport::online();
    let session = SessionController::start(context(&backend, transport.channel(fast_options())))
        .await
        .unwrap();
    let mut notices = session.notices();
    assert!(wait_until(|| session.connection_status() == ChannelStatus::Connected).await);

    assert!(transport.push("translation.started", json!({ "paragraphId": "p2" })));
    assert!(transport.push(
        "translation.progress",
        json!({ "paragraph_id": "p2", "progress": 140, "currentAgent": "style" })
    ));
    tokio::time::sleep(Duration::from_millis(50)).await;
    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.status("p2"), Some(UiStatus::Translating));
    let progress = snapshot.paragraph("p2").unwrap().state.progress.clone().unwrap();
    assert_eq!(progress.progress, 100);
    assert_eq!(progress.current_agent.as_deref(), Some("style"));

    assert!(transport.push(
        "translation.review",
        json!({ "paragraphId": "p2", "translatedText": "Second", "agentOutputs": { "semantic": { "score": 0.5 } } })
    ));
    assert!(transport.push("translation.progress", json!({ "paragraphId": "p2", "progress": 10 })));
    assert!(transport.push("translation.started", json!({ "paragraphId": "other-chapter" })));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.status("p2"), Some(UiStatus::Review));
    let review = snapshot.current_review.clone().unwrap();
    assert_eq!(review.translation, "Second");
    assert_eq!(review.analysis.unwrap().semantic_score, Some(50));
    assert!(snapshot.paragraph("other-chapter").is_none());

    assert!(transport.push(
        "glossary.suggestion",
        json!({ "term": "sertão", "suggestedTranslation": "backlands" })
    ));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.snapshot().await.unwrap().suggestions.len(), 1);

    let notices = drain(&mut notices);
    assert!(notices.iter().any(|n| matches!(n, SessionNotice::ReviewReady { paragraph_id, .. } if paragraph_id == "p2")));
    assert!(notices.iter().any(|n| matches!(n, SessionNotice::GlossarySuggested { .. })));

    session.emit("reviewer.focus", json!({ "paragraphId": "p2" })).unwrap();
    assert!(wait_until(|| transport.sent_types() == vec!["reviewer.focus".to_string()]).await);

    session.shutdown().await;
}

#[tokio::test]
async fn test_connection_changes_are_announced() {
    let backend = MemoryBackend::with_paragraphs(vec![pending("p1", 1)]);
    let transport = MockTransport::online();
    let session = SessionController::start(context(&backend, transport.channel(fast_options())))
        .await
        .unwrap();
    let mut notices = session.notices();
    assert!(wait_until(|| session.connection_status() == ChannelStatus::Connected).await);

    transport.set_online(false);
    assert!(wait_until(|| session.connection_status() == ChannelStatus::Reconnecting).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        session.snapshot().await.unwrap().connection_status(),
        ChannelStatus::Reconnecting
    );

    assert!(drain(&mut notices).iter().any(|n| matches!(
        n,
        SessionNotice::ConnectionChanged {
            status: ChannelStatus::Reconnecting,
            ..
        }
    )));

    session.shutdown().await;
}
