use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::errors::{AppError, AppResult};
use crate::models::domain::answer::{AnswerPayload, CodePayload};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StartAttemptRequest {
    pub assignment_id: Uuid,

    #[validate(length(min = 1, max = 64))]
    pub guest_name: Option<String>,

    #[validate(length(min = 6, max = 128))]
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AnswerRequest {
    #[validate(range(min = 0))]
    pub version: i64,

    /// Raw payload object; shape is normalized by `normalize_payload`.
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitRequest {
    #[validate(range(min = 0))]
    pub version: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GradeAnswerRequest {
    #[validate(length(min = 1))]
    pub question_id: String,

    #[validate(range(min = 0.0))]
    pub score: f64,

    pub is_correct: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListAttemptsQuery {
    pub assignment_id: Uuid,
}

/// Parses the wire payload into the typed union. Clients should send a
/// `kind` discriminator; without one the shape is inferred for legacy
/// callers (`selected` array, `text` string, or `code` object).
pub fn normalize_payload(value: &serde_json::Value) -> AppResult<AnswerPayload> {
    let obj = value
        .as_object()
        .ok_or_else(|| AppError::Validation("payload must be an object".to_string()))?;

    if let Some(kind) = obj.get("kind").and_then(|v| v.as_str()) {
        return match kind {
            "single" => {
                if let Some(selected) = obj.get("selected").and_then(|v| v.as_i64()) {
                    return Ok(AnswerPayload::Single(selected));
                }
                if let Some(first) = obj
                    .get("selected")
                    .and_then(|v| v.as_array())
                    .and_then(|arr| arr.first())
                    .and_then(|v| v.as_i64())
                {
                    return Ok(AnswerPayload::Single(first));
                }
                Err(AppError::Validation(
                    "single requires 'selected'".to_string(),
                ))
            }
            "multi" => {
                let selected = obj
                    .get("selected_options")
                    .or_else(|| obj.get("selected"))
                    .and_then(read_int_array)
                    .ok_or_else(|| {
                        AppError::Validation("multi requires 'selected_options'".to_string())
                    })?;
                Ok(AnswerPayload::Multi(selected))
            }
            "text" => obj
                .get("text")
                .and_then(|v| v.as_str())
                .map(|t| AnswerPayload::Text(t.to_string()))
                .ok_or_else(|| AppError::Validation("text requires 'text'".to_string())),
            "code" => {
                let code = obj.get("code").and_then(|v| v.as_object()).ok_or_else(|| {
                    AppError::Validation("code requires 'code' object".to_string())
                })?;
                Ok(AnswerPayload::Code(CodePayload {
                    lang: code
                        .get("lang")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    body: code
                        .get("body")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                }))
            }
            other => Err(AppError::Validation(format!("unknown kind '{}'", other))),
        };
    }

    // Legacy shape inference for clients that predate the discriminator.
    if let Some(selected) = obj.get("selected").and_then(read_int_array) {
        if selected.len() == 1 {
            return Ok(AnswerPayload::Single(selected[0]));
        }
        return Ok(AnswerPayload::Multi(selected));
    }
    if let Some(text) = obj.get("text").and_then(|v| v.as_str()) {
        return Ok(AnswerPayload::Text(text.to_string()));
    }
    if let Some(code) = obj.get("code").and_then(|v| v.as_object()) {
        return Ok(AnswerPayload::Code(CodePayload {
            lang: code
                .get("lang")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            body: code
                .get("body")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        }));
    }
    Err(AppError::Validation("unknown payload shape".to_string()))
}

fn read_int_array(value: &serde_json::Value) -> Option<Vec<i64>> {
    let items = value.as_array()?;
    let ints: Vec<i64> = items.iter().filter_map(|v| v.as_i64()).collect();
    if ints.len() == items.len() {
        Some(ints)
    } else {
        None
    }
}
