//! OpenAI-compatible chat completions client with strict JSON-schema output

use async_trait::async_trait;
use discharger_core::{LlmClient, LlmError, StructuredRequest};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::LlmSettings;

pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
    refusal: Option<String>,
}

impl OpenAiClient {
    pub fn new(settings: &LlmSettings) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| LlmError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone().filter(|k| !k.is_empty()),
            timeout_secs: settings.timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Body of a chat completions call
fn chat_body<'a>(model: &'a str, request: &'a StructuredRequest, user: &'a str) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: &request.system,
            },
            ChatMessage {
                role: "user",
                content: user,
            },
        ],
        temperature: 0.0,
        response_format: json!({
            "type": "json_schema",
            "json_schema": {
                "name": request.schema_name,
                "strict": true,
                "schema": request.schema,
            }
        }),
    }
}

/// Pull the JSON answer out of a chat completions response
fn parse_answer(response: ChatResponse) -> Result<Value, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::MalformedResponse("no choices in response".to_string()))?;

    if let Some(refusal) = choice.message.refusal.filter(|r| !r.is_empty()) {
        return Err(LlmError::Refused(refusal));
    }

    let content = choice
        .message
        .content
        .ok_or_else(|| LlmError::MalformedResponse("empty message content".to_string()))?;

    serde_json::from_str(&content)
        .map_err(|e| LlmError::MalformedResponse(format!("content is not JSON: {}", e)))
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete_structured(&self, request: &StructuredRequest) -> Result<Value, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::NotConfigured)?;
        let user = request.user_message();
        let body = chat_body(&self.model, request, &user);

        tracing::debug!(
            model = %self.model,
            schema = %request.schema_name,
            "Sending structured completion request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    LlmError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    LlmError::Timeout(self.timeout_secs)
                } else {
                    LlmError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        parse_answer(parsed)
    }
}
