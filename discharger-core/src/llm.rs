use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("LLM provider is not reachable at {0}")]
    Connection(String),

    #[error("LLM provider returned error (status {status}): {body}")]
    Provider { status: u16, body: String },

    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("Malformed LLM response: {0}")]
    MalformedResponse(String),

    #[error("LLM refused the request: {0}")]
    Refused(String),

    #[error("LLM provider is not configured (missing API key)")]
    NotConfigured,

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

/// A request whose answer must be JSON matching `schema`.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub system: String,
    pub prompt: String,
    /// Structured input appended to the prompt as pretty JSON
    pub payload: Option<Value>,
    /// Name under which the schema is registered with the provider
    pub schema_name: String,
    pub schema: Value,
}

impl StructuredRequest {
    /// The user message sent to the model
    pub fn user_message(&self) -> String {
        match &self.payload {
            Some(payload) => format!(
                "{}\n\n{}",
                self.prompt,
                serde_json::to_string_pretty(payload).unwrap_or_default()
            ),
            None => self.prompt.clone(),
        }
    }
}

/// A structured-output capable language model.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one completion; the returned value is the parsed JSON answer.
    async fn complete_structured(&self, request: &StructuredRequest) -> Result<Value, LlmError>;
}

type Responder = dyn Fn(&StructuredRequest) -> Result<Value, LlmError> + Send + Sync;

/// Mock LLM client for testing; answers through a configurable responder.
pub struct MockLlmClient {
    responder: Box<Responder>,
    calls: AtomicUsize,
}

impl MockLlmClient {
    /// Always answer with `response`
    pub fn new(response: Value) -> Self {
        Self::with_responder(move |_| Ok(response.clone()))
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&StructuredRequest) -> Result<Value, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fail with `error`
    pub fn failing(error: LlmError) -> Self {
        Self::with_responder(move |_| Err(error.clone()))
    }

    /// Number of completions requested so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete_structured(&self, request: &StructuredRequest) -> Result<Value, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.responder)(request)
    }
}
