//! API operation model: targets, operations, handlers, and providers.
//!
//! Targets are named HTTP endpoints; operations bind a name to a target, a
//! method, an optional capability requirement, and an invocation handler.
//! Providers contribute targets and operations dynamically (a catalog
//! discovered at startup) and may lazily resolve operation names the static
//! table does not know.

use crate::http::{HttpError, HttpMethod, HttpTransport};
use crate::utils::value_ext::display_string;
use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ApiError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Http(#[from] HttpError),

    #[error("api handler failed: {0}")]
    #[diagnostic(code(agentgraph::api::handler))]
    Handler(String),
}

/// A named HTTP endpoint operations are invoked against.
#[derive(Clone, Debug)]
pub struct ApiTarget {
    pub name: String,
    pub base_url: String,
}

impl ApiTarget {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
        }
    }

    pub fn build_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Executes one API operation against its target.
#[async_trait]
pub trait ApiHandler: Send + Sync {
    async fn invoke(
        &self,
        target: &ApiTarget,
        input: &Value,
        meta: &Value,
    ) -> Result<Value, ApiError>;
}

/// A registered operation: where it goes, how it is invoked, and what it
/// requires.
#[derive(Clone)]
pub struct ApiOp {
    pub target: String,
    pub method: HttpMethod,
    pub capability: Option<String>,
    pub handler: Arc<dyn ApiHandler>,
    /// Handler-specific metadata, e.g. the path template for HTTP GETs.
    pub meta: Value,
}

impl ApiOp {
    pub fn new(target: impl Into<String>, method: HttpMethod, handler: Arc<dyn ApiHandler>) -> Self {
        Self {
            target: target.into(),
            method,
            capability: None,
            handler,
            meta: Value::Null,
        }
    }

    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }

    #[must_use]
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }
}

impl std::fmt::Debug for ApiOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiOp")
            .field("target", &self.target)
            .field("method", &self.method)
            .field("capability", &self.capability)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Source of dynamically discovered targets and operations.
pub trait ApiProvider: Send + Sync {
    fn target(&self) -> ApiTarget;
    fn ops(&self) -> FxHashMap<String, ApiOp> {
        FxHashMap::default()
    }
    /// Lazily resolve an operation name the static table does not know.
    fn resolve_op(&self, _name: &str) -> Option<ApiOp> {
        None
    }
}

/// Generic GET handler: substitutes `{param}` placeholders from the input
/// into the path template carried in `meta.path`.
pub struct GetJsonHandler {
    http: Arc<dyn HttpTransport>,
}

impl GetJsonHandler {
    pub fn new(http: Arc<dyn HttpTransport>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ApiHandler for GetJsonHandler {
    async fn invoke(
        &self,
        target: &ApiTarget,
        input: &Value,
        meta: &Value,
    ) -> Result<Value, ApiError> {
        let mut path = meta
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if let Some(params) = input.as_object() {
            for (key, value) in params {
                path = path.replace(&format!("{{{key}}}"), &display_string(value));
            }
        }
        let url = target.build_url(&path);
        Ok(self.http.request(HttpMethod::Get, &url, None, None).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_normalizes_slashes() {
        let target = ApiTarget::new("svc", "http://host/api/");
        assert_eq!(target.build_url("/v1/users"), "http://host/api/v1/users");
        assert_eq!(target.build_url("v1/users"), "http://host/api/v1/users");
    }
}
