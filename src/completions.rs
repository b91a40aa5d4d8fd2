//! Chat-completions transport: the boundary between the runtime and a model
//! provider.
//!
//! The planner and reasoning entry points only see [`CompletionTransport`];
//! the shipped implementation, [`HttpCompletionClient`], speaks the
//! OpenAI-compatible `/chat/completions` wire shape. Sampling parameters are
//! clamped to sane bounds before each request so a misconfigured graph cannot
//! send a zero `max_tokens` or an out-of-range `top_p`.

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_MAX_TOKENS: u32 = 16384;
pub const DEFAULT_TEMPERATURE: f64 = 0.3;
pub const DEFAULT_TOP_P: f64 = 0.8;

/// One chat message on the request side.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A completion request as handed to the transport. Parameter overrides are
/// optional; the transport applies its clamped defaults when absent.
#[derive(Clone, Debug, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Option<Vec<Value>>,
    pub tool_choice: Option<Value>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
}

/// Wire-shape reply. Deserialization is deliberately tolerant: providers
/// disagree on which optional fields they include.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: ReplyMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ReplyMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub function: Option<ToolFunction>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ToolFunction {
    #[serde(default)]
    pub name: String,
    /// JSON-encoded arguments string, per the wire format.
    #[serde(default)]
    pub arguments: String,
}

impl CompletionResponse {
    /// Text content of the first choice, if any.
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.finish_reason.as_deref())
    }

    /// Parsed arguments of the first tool call matching `name`, if present
    /// and valid JSON.
    pub fn tool_call_arguments(&self, name: &str) -> Option<Value> {
        for choice in &self.choices {
            for call in &choice.message.tool_calls {
                let Some(function) = &call.function else { continue };
                if function.name != name || function.arguments.is_empty() {
                    continue;
                }
                if let Ok(parsed) = serde_json::from_str(&function.arguments) {
                    return Some(parsed);
                }
            }
        }
        None
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum CompletionError {
    #[error("completion endpoint returned HTTP {status}: {body}")]
    #[diagnostic(code(agentgraph::completions::status))]
    Status { status: u16, body: String },

    #[error("completion transport failed: {0}")]
    #[diagnostic(code(agentgraph::completions::transport))]
    Transport(#[from] reqwest::Error),

    #[error("tool provided without a function name")]
    #[diagnostic(code(agentgraph::completions::unnamed_tool))]
    UnnamedTool,
}

/// Async seam between the registry's plan/reason entry points and a model
/// provider.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError>;
}

/// OpenAI-compatible `/chat/completions` client.
#[derive(Clone, Debug)]
pub struct HttpCompletionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
    top_p: Option<f64>,
}

impl HttpCompletionClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
            top_p: None,
        }
    }

    #[must_use]
    pub fn with_sampling(
        mut self,
        max_tokens: Option<u32>,
        temperature: Option<f64>,
        top_p: Option<f64>,
    ) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self.top_p = top_p;
        self
    }

    /// Build the request body, clamping each sampling parameter into its
    /// valid range and falling back to defaults when unset.
    fn build_body(&self, request: &CompletionRequest) -> Result<Value, CompletionError> {
        let max_tokens = match request.max_tokens.or(self.max_tokens) {
            Some(v) => v.max(1),
            None => DEFAULT_MAX_TOKENS,
        };
        let temperature = match request.temperature.or(self.temperature) {
            Some(v) => v.max(0.0),
            None => DEFAULT_TEMPERATURE,
        };
        let top_p = match request.top_p.or(self.top_p) {
            Some(v) => v.clamp(f64::EPSILON, 1.0),
            None => DEFAULT_TOP_P,
        };

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "top_p": top_p,
        });

        if let Some(tools) = &request.tools
            && !tools.is_empty()
        {
            body["tools"] = Value::Array(tools.clone());
            match &request.tool_choice {
                Some(choice) => body["tool_choice"] = choice.clone(),
                None => {
                    // Tools always force a choice; default to the first one.
                    let name = tools[0]
                        .get("function")
                        .and_then(|f| f.get("name"))
                        .and_then(Value::as_str)
                        .ok_or(CompletionError::UnnamedTool)?;
                    body["tool_choice"] = serde_json::json!({
                        "type": "function",
                        "function": {"name": name},
                    });
                }
            }
        } else if let Some(choice) = &request.tool_choice {
            body["tool_choice"] = choice.clone();
        }

        Ok(body)
    }
}

#[async_trait]
impl CompletionTransport for HttpCompletionClient {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        let body = self.build_body(&request)?;
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}
