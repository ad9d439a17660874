//! Content generation via an OpenAI-compatible chat-completions API (Groq).
//!
//! Two asks: propose a fresh market question, and deliver a yes/no verdict
//! for a due market. Replies are JSON, sometimes wrapped in code fences;
//! anything that doesn't parse is a soft failure the caller retries on its
//! own schedule.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

/// Deadline on every chat request. A completion that outlives it is
/// abandoned and the caller retries on its next cycle.
const ORACLE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("empty completion")]
    Empty,
    #[error("malformed reply: {0}")]
    Malformed(String),
}

/// A proposed market.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MarketIdea {
    pub question: String,
    pub description: String,
    pub category: String,
}

/// A resolution verdict. `confidence` is optional; models that omit it are
/// taken at their word and gated only by the caller's floor when present.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Verdict {
    pub outcome: bool,
    pub reasoning: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[async_trait]
pub trait Oracle: Send + Sync {
    /// Propose a new market question. `avoid` lists recent questions the
    /// idea must steer clear of; `attempt` rises across retries and bumps
    /// sampling temperature.
    async fn propose_market(&self, avoid: &[String], attempt: u32)
        -> Result<MarketIdea, OracleError>;

    async fn resolve(&self, question: &str, description: &str) -> Result<Verdict, OracleError>;
}

pub struct GroqOracle {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl GroqOracle {
    pub fn new(url: String, model: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            model,
            api_key,
            timeout: ORACLE_TIMEOUT,
        }
    }

    async fn chat(
        &self,
        prompt: String,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String, OracleError> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        let resp = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OracleError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatResponse = resp.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(OracleError::Empty)?;
        debug!(len = content.len(), "oracle completion received");
        Ok(content)
    }
}

#[async_trait]
impl Oracle for GroqOracle {
    async fn propose_market(
        &self,
        avoid: &[String],
        attempt: u32,
    ) -> Result<MarketIdea, OracleError> {
        let avoid_block = if avoid.is_empty() {
            String::new()
        } else {
            let list = avoid
                .iter()
                .take(10)
                .map(|q| format!("- {q}"))
                .collect::<Vec<_>>()
                .join("\n");
            format!("\n\nAVOID these recent topics:\n{list}\n")
        };

        let prompt = format!(
            "Generate a unique prediction market question that hasn't been asked recently.\n\
             {avoid_block}\n\
             Return ONLY JSON:\n\
             {{\n  \
             \"question\": \"Clear yes/no question under 200 characters\",\n  \
             \"description\": \"Resolution criteria under 1000 characters\",\n  \
             \"category\": \"Technology, Finance, Sports, Politics, or Entertainment\"\n\
             }}"
        );

        let temperature = 0.8 + f64::from(attempt) * 0.1;
        let content = self.chat(prompt, temperature, 500).await?;
        parse_reply(&content)
    }

    async fn resolve(&self, question: &str, description: &str) -> Result<Verdict, OracleError> {
        let prompt = format!(
            "Resolve this prediction market.\n\n\
             QUESTION: {question}\n\
             DESCRIPTION: {description}\n\n\
             Return ONLY JSON:\n\
             {{\n  \
             \"outcome\": true or false,\n  \
             \"reasoning\": \"Brief explanation under 500 chars\",\n  \
             \"confidence\": 0.0 to 1.0\n\
             }}"
        );

        let content = self.chat(prompt, 0.3, 300).await?;
        parse_reply(&content)
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

/// Strip one layer of markdown code fences, if present.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    for fence in ["```json", "```"] {
        if let Some(rest) = trimmed.strip_prefix(fence) {
            if let Some(end) = rest.find("```") {
                return rest[..end].trim();
            }
            return rest.trim();
        }
    }
    trimmed
}

fn parse_reply<T: serde::de::DeserializeOwned>(content: &str) -> Result<T, OracleError> {
    let stripped = strip_code_fences(content);
    serde_json::from_str(stripped).map_err(|e| OracleError::Malformed(e.to_string()))
}
