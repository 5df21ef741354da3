// src/summarize/grok.rs
//! xAI Grok chat-completions backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::SummaryBackend;
use crate::config::SummarizerConfig;
use crate::error::HttpCallError;

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 300;

const PROMPT: &str = "You are an expert at writing engaging summaries of government documents and \
Federal Register entries.

Write a short, punchy summary (1-2 sentences max) that captures what the government is doing \
and why it matters to everyday Americans.

Guidelines:
- Be clear and accessible (avoid jargon)
- Focus on human impact
- Keep it under 280 characters when possible
- Start with the most important information

Document to summarize:
";

const PROMPT_TAIL: &str = "

Generate only the summary, nothing else.";

pub struct GrokBackend {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl GrokBackend {
    pub fn new(cfg: &SummarizerConfig) -> Result<Self, HttpCallError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("fedreg-digest/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(cfg.timeout_secs.min(10)))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", cfg.api_url.trim_end_matches('/')),
            api_key: cfg.api_key.trim().to_string(),
            model: cfg.model.clone(),
        })
    }
}

pub(crate) fn build_prompt(text: &str) -> String {
    let mut p = String::with_capacity(PROMPT.len() + text.len() + PROMPT_TAIL.len());
    p.push_str(PROMPT);
    p.push_str(text);
    p.push_str(PROMPT_TAIL);
    p
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct Resp {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl SummaryBackend for GrokBackend {
    async fn complete(&self, text: &str) -> Result<String, HttpCallError> {
        let prompt = build_prompt(text);
        let req = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: &prompt,
            }],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?
            .error_for_status()?;
        let body = resp.text().await?;
        let parsed: Resp =
            serde_json::from_str(&body).map_err(|e| HttpCallError::Malformed(e.to_string()))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "grok"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_wraps_document_text() {
        let p = build_prompt("EPA approves Texas plan.");
        assert!(p.contains("Document to summarize:\nEPA approves Texas plan.\n\nGenerate only"));
    }

    #[test]
    fn response_without_content_parses_to_empty() {
        let r: Resp = serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant"}}]}"#).unwrap();
        assert!(r.choices[0].message.content.is_none());
        let r: Resp = serde_json::from_str(r#"{}"#).unwrap();
        assert!(r.choices.is_empty());
    }
}
