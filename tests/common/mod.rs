//! Shared fixtures for integration tests: canned API handlers, a scripted
//! completion transport, and registry builders.
#![allow(dead_code)]

use agentgraph::completions::{
    CompletionError, CompletionRequest, CompletionResponse, CompletionTransport,
};
use agentgraph::graph::Graph;
use agentgraph::http::HttpMethod;
use agentgraph::registry::{ApiError, ApiHandler, ApiOp, ApiTarget, Registry};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

/// Deserialize a graph from its JSON form, panicking on malformed fixtures.
pub fn graph(value: Value) -> Graph {
    serde_json::from_value(value).unwrap()
}

/// Echoes its input back wrapped in an `echo` key.
pub struct EchoHandler;

#[async_trait]
impl ApiHandler for EchoHandler {
    async fn invoke(
        &self,
        _target: &ApiTarget,
        input: &Value,
        _meta: &Value,
    ) -> Result<Value, ApiError> {
        Ok(json!({ "echo": input }))
    }
}

/// Fails when the input's `index` matches the configured one, echoes the
/// input otherwise.
pub struct FailAtHandler {
    pub fail_index: i64,
}

#[async_trait]
impl ApiHandler for FailAtHandler {
    async fn invoke(
        &self,
        _target: &ApiTarget,
        input: &Value,
        _meta: &Value,
    ) -> Result<Value, ApiError> {
        if input.get("index").and_then(Value::as_i64) == Some(self.fail_index) {
            return Err(ApiError::Handler("injected failure".to_string()));
        }
        Ok(input.clone())
    }
}

/// Registry with `svc.echo` and `svc.flaky` ops granted under `svc.read`.
pub fn service_registry(fail_index: i64) -> Registry {
    let mut registry = Registry::new();
    registry
        .register_target(ApiTarget::new("svc", "http://svc.test"))
        .unwrap();
    registry
        .register_op(
            "svc.echo",
            ApiOp::new("svc", HttpMethod::Get, Arc::new(EchoHandler)).with_capability("svc.read"),
        )
        .unwrap();
    registry
        .register_op(
            "svc.flaky",
            ApiOp::new("svc", HttpMethod::Get, Arc::new(FailAtHandler { fail_index }))
                .with_capability("svc.read"),
        )
        .unwrap();
    registry.grant_capability("svc.read");
    registry
}

/// Completion transport replaying scripted responses in order and recording
/// every request for assertions.
pub struct MockCompletions {
    replies: Mutex<Vec<CompletionResponse>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl MockCompletions {
    pub fn new(mut replies: Vec<CompletionResponse>) -> Self {
        replies.reverse();
        Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionTransport for MockCompletions {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        self.requests.lock().unwrap().push(request);
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_default())
    }
}

/// A response whose first choice calls `name` with the given arguments.
pub fn tool_reply(name: &str, arguments: Value) -> CompletionResponse {
    serde_json::from_value(json!({
        "model": "mock-model",
        "choices": [{
            "message": {
                "content": null,
                "tool_calls": [{
                    "function": {"name": name, "arguments": arguments.to_string()}
                }]
            },
            "finish_reason": "tool_calls"
        }]
    }))
    .unwrap()
}

/// A plain text response.
pub fn text_reply(content: &str) -> CompletionResponse {
    serde_json::from_value(json!({
        "model": "mock-model",
        "choices": [{
            "message": {"content": content, "tool_calls": []},
            "finish_reason": "stop"
        }]
    }))
    .unwrap()
}
