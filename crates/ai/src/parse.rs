//! Defensive coercion of model output.
//!
//! Models that were told "output strict JSON" still wrap the payload in
//! markdown fences, nest the answer under an arbitrary key, or rename fields.
//! Everything here rejects or repairs; nothing panics.

use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("model output is not JSON: {0}")]
    NotJson(String),

    #[error("model output has the wrong shape: {0}")]
    WrongShape(String),
}

/// Parse model output as JSON, stripping markdown code fences when the first
/// strict parse fails.
pub fn coerce_json(raw: &str) -> Result<JsonValue, ParseError> {
    match serde_json::from_str(raw) {
        Ok(value) => Ok(value),
        Err(_) => {
            let cleaned = raw.replace("```json", "").replace("```", "");
            serde_json::from_str(cleaned.trim())
                .map_err(|e| ParseError::NotJson(format!("{e} (after fence cleanup)")))
        }
    }
}

/// One ranked posting from the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobMatch {
    pub job_id: String,
    /// Clamped to 0..=100.
    pub score: i64,
    pub reason: Option<String>,
}

/// Extract a ranked match list from model output.
///
/// Accepts either a bare JSON array or an object whose first array value is
/// the list (providers in json-object mode wrap arrays under a key of their
/// choosing). Entries missing an id are dropped; scores tolerate both
/// `match_score` and `score` keys and are clamped to 0..=100. An
/// unrecognizable shape yields an empty list rather than an error; an empty
/// ranking is a legitimate model answer.
pub fn extract_matches(value: &JsonValue) -> Vec<JobMatch> {
    let entries = match value {
        JsonValue::Array(items) => items.as_slice(),
        JsonValue::Object(map) => match map.values().find_map(|v| v.as_array()) {
            Some(items) => items.as_slice(),
            None => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    entries
        .iter()
        .filter_map(|entry| {
            let obj = entry.as_object()?;
            let job_id = obj
                .get("job_id")
                .or_else(|| obj.get("id"))
                .and_then(|v| v.as_str())?
                .to_string();
            let score = obj
                .get("match_score")
                .or_else(|| obj.get("score"))
                .and_then(score_value)
                .unwrap_or(0)
                .clamp(0, 100);
            let reason = obj
                .get("reason")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            Some(JobMatch {
                job_id,
                score,
                reason,
            })
        })
        .collect()
}

/// Scores come back as integers, floats, or quoted numbers.
fn score_value(value: &JsonValue) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    if let Some(f) = value.as_f64() {
        return Some(f.round() as i64);
    }
    value.as_str().and_then(|s| s.trim().parse::<i64>().ok())
}
