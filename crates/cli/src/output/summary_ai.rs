use anyhow::{anyhow, bail, Context as AnyhowContext, Result};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-exp";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }
}

/// Single-shot `generateContent` call; no retries
pub struct GeminiSummarizer {
    http: Client,
    config: GeminiConfig,
}

impl GeminiSummarizer {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http, config })
    }

    pub async fn summarize(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": 0.3 },
        });

        log::info!("Generating AI summary with {}", self.config.model);
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Gemini returned HTTP {}", status.as_u16());
        }
        let value: Value = response
            .json()
            .await
            .context("Gemini returned malformed JSON")?;

        let text = response_text(&value)?;
        Ok(strip_fences(&text))
    }
}

/// Concatenated text parts of the first candidate
fn response_text(body: &Value) -> Result<String> {
    let parts = body["candidates"]
        .as_array()
        .and_then(|c| c.first())
        .and_then(|c| c["content"]["parts"].as_array())
        .ok_or_else(|| anyhow!("Gemini response has no candidate content"))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    if text.trim().is_empty() {
        bail!("Gemini returned an empty summary");
    }
    Ok(text)
}

/// Removes a surrounding ```` ```markdown ```` / ```` ``` ```` fence
pub fn strip_fences(text: &str) -> String {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```markdown") {
        text = rest.trim();
    } else if let Some(rest) = text.strip_prefix("```md") {
        text = rest.trim();
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest.trim();
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim();
    }
    format!("{text}\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn strips_markdown_fences() {
        assert_eq!(strip_fences("```markdown\n# Title\n\nBody\n```"), "# Title\n\nBody\n");
        assert_eq!(strip_fences("```\n# Title\n```\n"), "# Title\n");
        assert_eq!(strip_fences("# Plain"), "# Plain\n");
    }

    #[test]
    fn keeps_inner_code_blocks() {
        let text = "# Title\n\n```json\n{}\n```\n\nAfter";
        assert_eq!(strip_fences(text), format!("{text}\n"));
    }

    #[test]
    fn reads_first_candidate_text() {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "# A" }, { "text": "\nB" }] } }]
        });
        assert_eq!(response_text(&body).unwrap(), "# A\nB");
    }

    #[test]
    fn empty_or_missing_candidates_fail() {
        assert!(response_text(&json!({})).is_err());
        assert!(response_text(&json!({ "candidates": [] })).is_err());
        let blank = json!({ "candidates": [{ "content": { "parts": [{ "text": "  " }] } }] });
        assert!(response_text(&blank).is_err());
    }
}
