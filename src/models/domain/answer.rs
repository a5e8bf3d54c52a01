use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

/// Discriminator for the four supported answer shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerKind {
    Single,
    Multi,
    Text,
    Code,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct CodePayload {
    pub lang: String,
    pub body: String,
}

/// Tagged payload union. Each variant carries exactly its own data, so an
/// inconsistent kind/payload combination is unrepresentable once parsed.
#[derive(Clone, Debug, PartialEq)]
pub enum AnswerPayload {
    Single(i64),
    Multi(Vec<i64>),
    Text(String),
    Code(CodePayload),
}

impl AnswerPayload {
    pub fn kind(&self) -> AnswerKind {
        match self {
            AnswerPayload::Single(_) => AnswerKind::Single,
            AnswerPayload::Multi(_) => AnswerKind::Multi,
            AnswerPayload::Text(_) => AnswerKind::Text,
            AnswerPayload::Code(_) => AnswerKind::Code,
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        match self {
            AnswerPayload::Single(selected) if *selected < 0 => Err(AppError::Validation(
                "single selection must be non-negative".to_string(),
            )),
            AnswerPayload::Multi(selected) if selected.iter().any(|s| *s < 0) => Err(
                AppError::Validation("multi selections must be non-negative".to_string()),
            ),
            AnswerPayload::Code(code) if code.lang.trim().is_empty() => {
                Err(AppError::Validation("code lang is required".to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Canonical wire/storage form: exactly one of `selected`, `text`, `code`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AnswerPayload::Single(selected) => serde_json::json!({ "selected": [selected] }),
            AnswerPayload::Multi(selected) => serde_json::json!({ "selected": selected }),
            AnswerPayload::Text(text) => serde_json::json!({ "text": text }),
            AnswerPayload::Code(code) => {
                serde_json::json!({ "code": { "lang": code.lang, "body": code.body } })
            }
        }
    }

    /// Inverse of `to_json`. A one-element `selected` array rehydrates as a
    /// single choice, anything longer as a multi choice.
    pub fn from_json(value: &serde_json::Value) -> AppResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| AppError::Validation("answer payload must be an object".to_string()))?;

        if let Some(selected) = obj.get("selected") {
            let items = selected.as_array().ok_or_else(|| {
                AppError::Validation("'selected' must be an array".to_string())
            })?;
            let ints: Vec<i64> = items.iter().filter_map(|v| v.as_i64()).collect();
            if ints.len() != items.len() {
                return Err(AppError::Validation(
                    "'selected' must contain integers".to_string(),
                ));
            }
            if ints.len() == 1 {
                return Ok(AnswerPayload::Single(ints[0]));
            }
            return Ok(AnswerPayload::Multi(ints));
        }
        if let Some(text) = obj.get("text").and_then(|v| v.as_str()) {
            return Ok(AnswerPayload::Text(text.to_string()));
        }
        if let Some(code) = obj.get("code").and_then(|v| v.as_object()) {
            let lang = code.get("lang").and_then(|v| v.as_str()).unwrap_or_default();
            let body = code.get("body").and_then(|v| v.as_str()).unwrap_or_default();
            return Ok(AnswerPayload::Code(CodePayload {
                lang: lang.to_string(),
                body: body.to_string(),
            }));
        }
        Err(AppError::Validation(
            "unknown answer payload shape".to_string(),
        ))
    }
}

/// One recorded answer. `is_correct` and `score` stay unset until the
/// attempt is auto-scored or the owner grades the answer by hand.
#[derive(Clone, Debug, PartialEq)]
pub struct Answer {
    pub question_id: String,
    pub payload: AnswerPayload,
    pub is_correct: Option<bool>,
    pub score: Option<f64>,
}

impl Answer {
    pub fn new(question_id: String, payload: AnswerPayload) -> Self {
        Self {
            question_id,
            payload,
            is_correct: None,
            score: None,
        }
    }
}
