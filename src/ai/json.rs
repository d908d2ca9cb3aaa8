use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::error::{AppError, Result};

static FENCE: OnceLock<Regex> = OnceLock::new();

fn fence() -> &'static Regex {
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n?(.*?)\r?\n?```$").expect("fence pattern is valid")
    })
}

/// Strip an optional Markdown code fence (```json ... ```) around a model reply.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    match fence().captures(trimmed).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim(),
        None => trimmed,
    }
}

/// Parse a model reply that is supposed to be a single JSON document.
///
/// Anything short of a complete, well-typed document is an error.
pub fn parse_model_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let body = strip_code_fence(raw);
    serde_json::from_str(body).map_err(|e| {
        let preview: String = body.chars().take(120).collect();
        AppError::InvalidResponse(format!(
            "could not parse JSON from model reply ({}): {:?}",
            e, preview
        ))
    })
}
