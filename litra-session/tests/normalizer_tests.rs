//! Suggestion merge order and score normalization across all three inputs

use litra_session::review::{normalize, normalize_score};
use serde_json::{json, Value};

fn review_package() -> Value {
    json!({
        "prioritized_issues": [
            { "description": "Issue review", "suggestion": "Fix review", "source_agent": "semantic" }
        ],
        "decision_questions": [
            { "question": "Keep the regional idiom?", "impact": "Voice of the narrator" }
        ],
        "alternative_options": [
            { "segment": "Sentence 1", "option": "At dusk the river slowed" }
        ],
        "context_notes": ["Chapter opens in the backlands"],
        "scores": { "semantic": 0.87, "style": 87 }
    })
}

fn agent_outputs() -> Value {
    json!({
        "semantic": {
            "llm_output": {
                "content": "{\"score\": 0.9, \"issues\": [{\"description\": \"Lost nuance\", \"suggested_correction\": \"Restore nuance\"}]}"
            }
        },
        "style": {
            "summary": "Reads naturally",
            "grammar_corrections": [{ "original": "he go", "corrected": "he goes" }],
            "style_corrections": ["Shorten the second clause"]
        },
        "consistency": {
            "warnings": ["Name spelled two ways"],
            "recommendations": ["Use 'Joana' throughout", "Fix review"]
        },
        "recommendations": ["Read the paragraph aloud", "Enforcement note"]
    })
}

fn enforcement_report() -> Value {
    json!({
        "mode": "suggest",
        "applied": [{ "source": "enforcement", "description": "Applied enforcement" }],
        "skipped": [
            { "source": "enforcement", "description": "Skipped enforcement", "reason": "Conflict" }
        ],
        "notes": "Enforcement note"
    })
}

#[test]
fn test_suggestion_merge_is_deterministic() {
    let package = review_package();
    let outputs = agent_outputs();
    let report = enforcement_report();

    let first = normalize(Some(&package), Some(&outputs), Some(&report)).unwrap();
    let second = normalize(Some(&package), Some(&outputs), Some(&report)).unwrap();
    assert_eq!(first, second);

    assert_eq!(
        first.suggestions,
        vec![
            "Issue review Sugestão: Fix review",
            "Keep the regional idiom? Impacto: Voice of the narrator",
            "Sentence 1: At dusk the river slowed",
            "Restore nuance",
            "he go → he goes",
            "Shorten the second clause",
            "Use 'Joana' throughout",
            "Fix review",
            "enforcement: Applied enforcement",
            "enforcement: Skipped enforcement Não aplicada: Conflict",
            "Enforcement note",
            "Read the paragraph aloud",
        ]
    );

    for required in [
        "Issue review Sugestão: Fix review",
        "enforcement: Applied enforcement",
        "enforcement: Skipped enforcement Não aplicada: Conflict",
        "Enforcement note",
    ] {
        let count = first.suggestions.iter().filter(|s| s.as_str() == required).count();
        assert_eq!(count, 1, "expected exactly one {required:?}");
    }
}

#[test]
fn test_scores_and_side_lists() {
    let package = review_package();
    let outputs = agent_outputs();
    let report = enforcement_report();
    let analysis = normalize(Some(&package), Some(&outputs), Some(&report)).unwrap();

    assert_eq!(analysis.semantic_score, Some(87));
    assert_eq!(analysis.style_score, Some(87));
    assert_eq!(analysis.consistency, vec!["Name spelled two ways"]);
    assert_eq!(
        analysis.notes,
        vec!["Chapter opens in the backlands", "Reads naturally", "Enforcement note"]
    );

    let enforcement = analysis.enforcement.unwrap();
    assert_eq!(enforcement.mode.as_deref(), Some("suggest"));
    assert_eq!(enforcement.applied.len(), 1);
    assert_eq!(enforcement.skipped.len(), 1);
}

#[test]
fn test_fraction_and_percentage_agree() {
    assert_eq!(normalize_score(0.87), normalize_score(87.0));
    assert_eq!(normalize_score(0.87), Some(87));
}

#[test]
fn test_stringified_inputs() {
    let package = review_package().to_string();
    let analysis = normalize(Some(&Value::String(package)), None, None).unwrap();
    assert_eq!(analysis.suggestions[0], "Issue review Sugestão: Fix review");
}
