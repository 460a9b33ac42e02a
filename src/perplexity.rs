//! Perplexity chat-completions client.
//!
//! The analyzer talks to a [`CompletionBackend`] so batches can run against a
//! fake backend in tests; [`PerplexityClient`] is the HTTP implementation.

use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

use crate::classifier::ComplexityBand;
use crate::config::ApiConfig;
use crate::utils::non_empty_env;

pub const API_KEY_ENV: &str = "PERPLEXITY_API_KEY";
const CHAT_PATH: &str = "/chat/completions";
const RETRY_BACKOFF: Duration = Duration::from_secs(2);
const MAX_ERROR_BODY: usize = 300;

#[derive(Debug, thiserror::Error)]
pub enum PerplexityError {
    #[error("PERPLEXITY_API_KEY is not set")]
    MissingApiKey,
    #[error("perplexity returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(#[from] ureq::Error),
    #[error("response had no choices")]
    EmptyResponse,
}

impl PerplexityError {
    fn is_retryable(&self) -> bool {
        match self {
            PerplexityError::Status { status, .. } => *status == 429 || *status >= 500,
            PerplexityError::Transport(ureq::Error::Timeout(_)) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebSearchOptions {
    pub search_context_size: &'static str,
}

impl WebSearchOptions {
    pub fn for_band(band: ComplexityBand) -> Self {
        let size = match band {
            ComplexityBand::Simple => "low",
            ComplexityBand::Moderate => "medium",
            ComplexityBand::Complex => "high",
        };
        WebSearchOptions {
            search_context_size: size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u64,
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_search_options: Option<WebSearchOptions>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChatUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub search_queries: Option<u64>,
    /// Provider-reported cost in USD, when the API includes it
    pub reported_cost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub model: String,
    pub content: String,
    pub usage: ChatUsage,
    pub citations: Vec<String>,
}

pub trait CompletionBackend {
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, PerplexityError>;
}

#[derive(Debug, Deserialize)]
struct MessageDto {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChoiceDto {
    message: MessageDto,
}

#[derive(Debug, Deserialize)]
struct UsageCostDto {
    total_cost: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct UsageDto {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    num_search_queries: Option<u64>,
    cost: Option<UsageCostDto>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseDto {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChoiceDto>,
    #[serde(default)]
    usage: Option<UsageDto>,
    #[serde(default)]
    citations: Vec<String>,
}

fn parse_response(dto: ChatResponseDto, requested_model: &str) -> Result<ChatResponse, PerplexityError> {
    let content = dto
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or(PerplexityError::EmptyResponse)?;
    let usage = dto.usage.unwrap_or_default();
    Ok(ChatResponse {
        model: dto.model.unwrap_or_else(|| requested_model.to_string()),
        content,
        usage: ChatUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            search_queries: usage.num_search_queries,
            reported_cost: usage.cost.and_then(|c| c.total_cost),
        },
        citations: dto.citations,
    })
}

pub struct PerplexityClient {
    agent: ureq::Agent,
    api_key: String,
    endpoint: String,
}

impl PerplexityClient {
    pub fn new(api: &ApiConfig, api_key: impl Into<String>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(api.timeout_secs.max(1))))
            .http_status_as_error(false)
            .build();
        PerplexityClient {
            agent: config.into(),
            api_key: api_key.into(),
            endpoint: format!("{}{}", api.base_url.trim_end_matches('/'), CHAT_PATH),
        }
    }

    /// Build a client with the key from `PERPLEXITY_API_KEY`
    pub fn from_env(api: &ApiConfig) -> Result<Self, PerplexityError> {
        let key = non_empty_env(API_KEY_ENV).ok_or(PerplexityError::MissingApiKey)?;
        Ok(Self::new(api, key))
    }

    fn send_once(&self, request: &ChatRequest) -> Result<ChatResponse, PerplexityError> {
        let mut response = self
            .agent
            .post(&self.endpoint)
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .header("Accept", "application/json")
            .send_json(request)?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let raw = response.body_mut().read_to_string().unwrap_or_default();
            let body: String = raw.chars().take(MAX_ERROR_BODY).collect();
            return Err(PerplexityError::Status { status, body });
        }

        let dto: ChatResponseDto = response.body_mut().read_json()?;
        parse_response(dto, &request.model)
    }
}

impl CompletionBackend for PerplexityClient {
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, PerplexityError> {
        match self.send_once(request) {
            Err(e) if e.is_retryable() => {
                tracing::warn!(model = %request.model, error = %e, "retrying perplexity request");
                thread::sleep(RETRY_BACKOFF);
                self.send_once(request)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = ChatRequest {
            model: "sonar".to_string(),
            messages: vec![ChatMessage::system("sys"), ChatMessage::user("hi")],
            max_tokens: 512,
            temperature: 0.2,
            web_search_options: Some(WebSearchOptions::for_band(ComplexityBand::Simple)),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["model"], "sonar");
        assert_eq!(v["messages"][1]["role"], "user");
        assert_eq!(v["web_search_options"]["search_context_size"], "low");

        let bare = ChatRequest {
            web_search_options: None,
            ..req
        };
        let v = serde_json::to_value(&bare).unwrap();
        assert!(v.get("web_search_options").is_none());
    }

    #[test]
    fn test_parse_full_response() {
        let raw = r#"{
            "id": "abc",
            "model": "sonar-pro",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Root cause: ..."}}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 340, "num_search_queries": 2,
                      "cost": {"total_cost": 0.0151}},
            "citations": ["https://example.com/a"]
        }"#;
        let dto: ChatResponseDto = serde_json::from_str(raw).unwrap();
        let resp = parse_response(dto, "ignored").unwrap();
        assert_eq!(resp.model, "sonar-pro");
        assert_eq!(resp.usage.prompt_tokens, 120);
        assert_eq!(resp.usage.search_queries, Some(2));
        assert_eq!(resp.usage.reported_cost, Some(0.0151));
        assert_eq!(resp.citations.len(), 1);
    }

    #[test]
    fn test_parse_minimal_and_empty() {
        let dto: ChatResponseDto =
            serde_json::from_str(r#"{"choices": [{"message": {"content": "ok"}}]}"#).unwrap();
        let resp = parse_response(dto, "sonar").unwrap();
        assert_eq!(resp.model, "sonar");
        assert_eq!(resp.usage, ChatUsage::default());

        let dto: ChatResponseDto = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            parse_response(dto, "sonar"),
            Err(PerplexityError::EmptyResponse)
        ));
    }

    #[test]
    fn test_retryable_statuses() {
        let status = |s| PerplexityError::Status {
            status: s,
            body: String::new(),
        };
        assert!(status(429).is_retryable());
        assert!(status(503).is_retryable());
        assert!(!status(401).is_retryable());
        assert!(!PerplexityError::MissingApiKey.is_retryable());
    }
}
