//! Shared utility functions.

use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;
use std::time::Duration;

use crate::llm_client::UpstreamError;

/// Patterns for detecting API keys in collaborator output
static API_KEY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // OpenAI: sk-xxx or sk-proj-xxx
        Regex::new(r"sk-(?:proj-)?[a-zA-Z0-9]{20,}").unwrap(),
        Regex::new(r"(?i)bearer\s+[a-zA-Z0-9_\-]{20,}").unwrap(),
        Regex::new(r"OPENAI_API_KEY=[^\s]+").unwrap(),
    ]
});

/// Redact API keys from text before it is logged or stored
pub fn redact_api_keys(text: &str) -> String {
    let mut result = text.to_string();
    for pattern in API_KEY_PATTERNS.iter() {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }
    result
}

/// Run `fut` under a scoped deadline, reporting expiry as an upstream timeout
/// of `stage`.
pub async fn with_timeout<F, T>(stage: &'static str, secs: u64, fut: F) -> Result<T, UpstreamError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(secs), fut)
        .await
        .map_err(|_| UpstreamError::Timeout { stage, secs })
}

/// `sk-a...wxyz` style preview of a secret, safe for logs.
pub fn key_preview(key: &str) -> String {
    if key.len() > 8 && key.is_char_boundary(4) && key.is_char_boundary(key.len() - 4) {
        format!("{}...{}", &key[..4], &key[key.len() - 4..])
    } else {
        "****".to_string()
    }
}

/// Truncate to `max_len` characters, ending with "..." when shortened.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
