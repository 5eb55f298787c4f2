//! OpenAI-compatible chat completions backend (DeepSeek).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{connection_error, error_from_response, Completion, CompletionRequest, LlmBackend};
use crate::llm::client::LlmProvider;
use crate::llm::schema::response_schema;
use crate::llm::stats::TokenUsage;
use crate::llm::LlmError;

/// Lead-in that pins the output to the extraction schema.
const SCHEMA_INSTRUCTION: &str =
    "【重要】次の行から示す要請はこのJSONスキーマに合うJSONで出力してください: ";

pub struct OpenAiCompatibleBackend {
    client: Client,
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    completion_tokens_details: Option<CompletionTokenDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionTokenDetails {
    #[serde(default)]
    reasoning_tokens: u64,
}

impl ChatUsage {
    /// Completion tokens include reasoning; split them apart.
    fn to_token_usage(&self) -> TokenUsage {
        let thinking = self
            .completion_tokens_details
            .as_ref()
            .map(|d| d.reasoning_tokens)
            .unwrap_or(0);
        TokenUsage {
            input_tokens: self.prompt_tokens,
            thinking_tokens: thinking,
            output_tokens: self.completion_tokens.saturating_sub(thinking),
        }
    }
}

impl OpenAiCompatibleBackend {
    pub fn new(client: Client, endpoint: &str, api_key: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// JSON mode has no schema parameter, so the schema rides in the prompt.
    fn build_content(request: &CompletionRequest) -> String {
        format!(
            "{}{}\n{}\n\n\n{}",
            SCHEMA_INSTRUCTION,
            response_schema(),
            request.prompt,
            request.data
        )
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatibleBackend {
    fn provider(&self) -> LlmProvider {
        LlmProvider::DeepSeek
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let content = Self::build_content(request);
        let prompt_chars = content.chars().count();
        let body = ChatRequest {
            model: &request.model,
            messages: vec![ChatMessage {
                role: "user",
                content,
            }],
            temperature: request.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
            stream: false,
        };

        let url = format!("{}/chat/completions", self.endpoint);
        debug!("POST {} (model {})", url, request.model);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(connection_error)?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let chat: ChatResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Validation(format!("malformed completion: {}", e)))?;

        let text = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let usage = match chat.usage {
            Some(usage) => usage.to_token_usage(),
            None => {
                warn!("No usage reported for {}, counting zero tokens", request.model);
                TokenUsage::default()
            }
        };

        Ok(Completion {
            text,
            usage,
            prompt_chars,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasoning_tokens_split_from_output() {
        let usage: ChatUsage = serde_json::from_str(
            r#"{"prompt_tokens": 1200, "completion_tokens": 900,
                "completion_tokens_details": {"reasoning_tokens": 700}}"#,
        )
        .unwrap();
        let usage = usage.to_token_usage();
        assert_eq!(usage.input_tokens, 1200);
        assert_eq!(usage.thinking_tokens, 700);
        assert_eq!(usage.output_tokens, 200);
    }

    #[test]
    fn test_usage_without_details() {
        let usage: ChatUsage =
            serde_json::from_str(r#"{"prompt_tokens": 10, "completion_tokens": 5}"#).unwrap();
        assert_eq!(usage.to_token_usage().output_tokens, 5);
        assert_eq!(usage.to_token_usage().thinking_tokens, 0);
    }

    #[test]
    fn test_content_carries_schema_prompt_and_data() {
        let request = CompletionRequest {
            model: "deepseek-chat".to_string(),
            prompt: "登山道の状況を抽出".to_string(),
            data: "本文".to_string(),
            temperature: 0.0,
            thinking_budget: 0,
        };
        let content = OpenAiCompatibleBackend::build_content(&request);
        assert!(content.starts_with(SCHEMA_INSTRUCTION));
        assert!(content.contains("trail_condition_records"));
        assert!(content.ends_with("登山道の状況を抽出\n\n\n本文"));
    }
}
