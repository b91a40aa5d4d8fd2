//! High-level run entry points wiring configuration into a registry and a
//! runner.

use crate::completions::HttpCompletionClient;
use crate::config::RunConfig;
use crate::graph::Graph;
use crate::registry::Registry;
use crate::runner::{RunOutcome, Runner};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Execute a graph with a registry built from the given configuration: an
/// HTTP completion client plus the configured capability grants.
pub async fn run(graph: &Graph, inputs: Value, config: &RunConfig) -> RunOutcome {
    let client = HttpCompletionClient::new(
        reqwest::Client::new(),
        config.base_url.clone(),
        config.api_key.clone(),
        config.model.clone(),
    )
    .with_sampling(config.max_tokens, config.temperature, config.top_p);

    let mut registry = Registry::new().with_completions(Arc::new(client));
    for capability in &config.capabilities {
        registry.grant_capability(capability.clone());
    }

    run_with_registry(graph, inputs, &registry).await
}

/// Execute a graph against an already-assembled registry. This is the seam
/// tests and embedders use to supply their own transports and agent tables.
pub async fn run_with_registry(graph: &Graph, inputs: Value, registry: &Registry) -> RunOutcome {
    info!(graph = ?graph.id, "starting run");
    Runner::new(graph, registry).run(inputs).await
}
