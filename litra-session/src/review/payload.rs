//! Tolerant JSON helpers for agent payloads
//!
//! Agent output is produced by language models and arrives in whatever shape
//! the model felt like: objects, JSON strings, JSON inside
//! `llm_output.content`, markdown code fences, single values where lists were
//! expected. Everything here degrades to "absent" instead of failing.

use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::Deserialize;
use serde_json::Value;

/// Keys tried, in order, when an object stands in for a piece of text
const TEXT_KEYS: &[&str] = &[
    "text",
    "description",
    "message",
    "note",
    "suggestion",
    "recommendation",
    "content",
    "summary",
    "issue",
    "action",
];

/// Parse a JSON document out of model text, ignoring code fences
pub(crate) fn parse_json_str(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    if !(body.starts_with('{') || body.starts_with('[')) {
        return None;
    }
    serde_json::from_str(body).ok()
}

/// Resolve the actual payload of an agent output
///
/// - `null` → absent
/// - JSON string → parsed (absent when unparseable)
/// - object with `llm_output.content` → the parsed content when possible,
///   else the object itself
pub(crate) fn unwrap_payload(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(raw) => parse_json_str(raw),
        Value::Object(map) => {
            if let Some(content) = map.get("llm_output").and_then(|out| out.get("content")) {
                match content {
                    Value::String(raw) => {
                        if let Some(parsed) = parse_json_str(raw) {
                            return Some(parsed);
                        }
                    }
                    Value::Object(_) => return Some(content.clone()),
                    _ => {}
                }
            }
            Some(value.clone())
        }
        other => Some(other.clone()),
    }
}

/// Parse a payload into `T`, falling back to `T::default()`
pub(crate) fn parse_or_default<T: DeserializeOwned + Default>(value: &Value) -> T {
    unwrap_payload(value)
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

/// A piece of human-readable text taken from a string, number or object
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TextItem(pub String);

impl TextItem {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_value(value: &Value) -> Option<Self> {
        let text = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Object(map) => TEXT_KEYS
                .iter()
                .filter_map(|key| map.get(*key))
                .find_map(|v| match v {
                    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                    _ => None,
                })?,
            _ => return None,
        };
        (!text.is_empty()).then_some(TextItem(text))
    }
}

impl<'de> Deserialize<'de> for TextItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        TextItem::from_value(&value).ok_or_else(|| D::Error::custom("not text"))
    }
}

/// A score given as a number, numeric string ("87%") or `{score: n}`
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Score(pub f64);

impl Score {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(Score),
            Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok().map(Score),
            Value::Object(map) => map
                .get("score")
                .or_else(|| map.get("value"))
                .and_then(Score::from_value),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for Score {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Score::from_value(&value).ok_or_else(|| D::Error::custom("not a score"))
    }
}

/// Deserialize a list, dropping elements that don't fit
///
/// A lone value is treated as a one-element list; a string holding a JSON
/// array is parsed.
pub(crate) fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(values_of(value)
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect())
}

/// Deserialize an optional value, treating anything unparseable as absent
pub(crate) fn lenient_opt<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Text list out of an arbitrary value
pub(crate) fn text_list(value: &Value) -> Vec<TextItem> {
    values_of(value.clone())
        .iter()
        .filter_map(TextItem::from_value)
        .collect()
}

fn values_of(value: Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        Value::String(raw) => match parse_json_str(&raw) {
            Some(Value::Array(items)) => items,
            _ => vec![Value::String(raw)],
        },
        other => vec![other],
    }
}
