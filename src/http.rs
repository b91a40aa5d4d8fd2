//! Generic JSON-over-HTTP transport used by API operation handlers.
//!
//! The trait keeps registry handlers testable without a network: tests swap
//! in a canned transport, production wires up [`ReqwestTransport`].

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// HTTP verbs the API dispatch layer understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    /// Only read methods pass the dispatch gate; everything else is refused
    /// before a capability check even runs.
    pub fn is_read_only(&self) -> bool {
        matches!(self, HttpMethod::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum HttpError {
    #[error("HTTP {status}: {body}")]
    #[diagnostic(code(agentgraph::http::status))]
    Status { status: u16, body: String },

    #[error("http transport failed: {0}")]
    #[diagnostic(code(agentgraph::http::transport))]
    Transport(#[from] reqwest::Error),
}

/// Minimal async HTTP seam.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn request(
        &self,
        method: HttpMethod,
        url: &str,
        headers: Option<&FxHashMap<String, String>>,
        body: Option<&Value>,
    ) -> Result<Value, HttpError>;
}

/// Production transport backed by a shared [`reqwest::Client`].
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn request(
        &self,
        method: HttpMethod,
        url: &str,
        headers: Option<&FxHashMap<String, String>>,
        body: Option<&Value>,
    ) -> Result<Value, HttpError> {
        let mut request = self.client.request(method.into(), url);
        if let Some(headers) = headers {
            for (name, value) in headers {
                request = request.header(name, value);
            }
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(HttpError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        // Non-JSON replies pass through as plain strings.
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}
