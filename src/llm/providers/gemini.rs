//! Google Gemini `generateContent` backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{connection_error, error_from_response, Completion, CompletionRequest, LlmBackend};
use crate::llm::client::LlmProvider;
use crate::llm::schema::response_schema;
use crate::llm::stats::TokenUsage;
use crate::llm::LlmError;

pub struct GeminiBackend {
    client: Client,
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
    response_json_schema: Value,
    thinking_config: ThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    thoughts_token_count: u64,
}

impl From<UsageMetadata> for TokenUsage {
    fn from(meta: UsageMetadata) -> Self {
        TokenUsage {
            input_tokens: meta.prompt_token_count,
            thinking_tokens: meta.thoughts_token_count,
            output_tokens: meta.candidates_token_count,
        }
    }
}

impl GeminiResponse {
    /// Concatenated answer text of the first candidate, thought parts excluded.
    fn answer_text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter(|p| !p.thought)
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

impl GeminiBackend {
    pub fn new(client: Client, endpoint: &str, api_key: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn build_request(request: &CompletionRequest) -> GeminiRequest {
        GeminiRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart {
                    text: format!("{}\n\n\n{}", request.prompt, request.data),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                response_mime_type: "application/json",
                response_json_schema: response_schema(),
                thinking_config: ThinkingConfig {
                    thinking_budget: request.thinking_budget,
                },
            },
        }
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    fn provider(&self) -> LlmProvider {
        LlmProvider::Gemini
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let body = Self::build_request(request);
        let prompt_chars = body.contents[0].parts[0].text.chars().count();

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, request.model
        );
        debug!("POST {}", url);
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(connection_error)?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let parsed: GeminiResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Validation(format!("malformed completion: {}", e)))?;

        let text = parsed.answer_text();
        let usage = match parsed.usage_metadata {
            Some(meta) => meta.into(),
            None => {
                warn!("No usage metadata for {}, counting zero tokens", request.model);
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
