//! Run configuration: model endpoint, credentials, sampling overrides, and
//! capability grants.

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    #[diagnostic(
        code(agentgraph::config::missing_var),
        help("set the variable in the environment or a .env file")
    )]
    MissingVar(&'static str),

    #[error("invalid value for {var}: {value}")]
    #[diagnostic(code(agentgraph::config::invalid_var))]
    InvalidVar { var: &'static str, value: String },
}

/// Everything the built-in runtime entry point needs to wire a completion
/// client and a capability-granted registry.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    /// Capability names the run is allowed to exercise via `api.call`.
    pub capabilities: Vec<String>,
}

impl RunConfig {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
            top_p: None,
            capabilities: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
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

    /// Load from `AGENTGRAPH_*` environment variables, reading a `.env` file
    /// if present. `BASE_URL`, `API_KEY`, and `MODEL` are required; sampling
    /// overrides and the comma-separated `CAPABILITIES` list are optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let base_url = require("AGENTGRAPH_BASE_URL")?;
        let api_key = require("AGENTGRAPH_API_KEY")?;
        let model = require("AGENTGRAPH_MODEL")?;

        let mut config = Self::new(base_url, api_key, model);
        config.max_tokens = parse_optional("AGENTGRAPH_MAX_TOKENS")?;
        config.temperature = parse_optional("AGENTGRAPH_TEMPERATURE")?;
        config.top_p = parse_optional("AGENTGRAPH_TOP_P")?;
        if let Ok(raw) = std::env::var("AGENTGRAPH_CAPABILITIES") {
            config.capabilities = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        Ok(config)
    }
}

fn require(var: &'static str) -> Result<String, ConfigError> {
    std::env::var(var).map_err(|_| ConfigError::MissingVar(var))
}

fn parse_optional<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVar { var, value: raw }),
        Err(_) => Ok(None),
    }
}
