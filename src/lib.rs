//! # Agentgraph: Declarative Agent Computation Graphs
//!
//! Agentgraph executes agent workflows described as JSON graphs: a flat map
//! of typed nodes (compute, control, executor, planner, reasoning, terminal,
//! loop) walked by a bounded traversal state machine. Node inputs and state
//! mutations are computed by a small template language (`$ref` path
//! references and `$expr` pure operators) over the run's mutable state, and
//! all side effects pass through a capability-gated registry.
//!
//! ## Core Concepts
//!
//! - **Graph**: declarative node map with a `start` pointer and per-node
//!   routing (`next`, `on.ok` / `on.error` / `on.warning`)
//! - **Runner**: owns the run state, dispatches handlers, resolves
//!   successors, and enforces the step ceiling
//! - **Templates**: `$ref`/`$expr` resolution over `state`, `inputs`, `run`,
//!   `result`, and `loop` context roots
//! - **Registry**: capability grants, API operation dispatch, sub-agent
//!   graphs, and the planner/reasoning model entry points
//!
//! ## Quick Start
//!
//! ```
//! use agentgraph::graph::Graph;
//! use agentgraph::registry::Registry;
//! use agentgraph::runtime::run_with_registry;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let graph: Graph = serde_json::from_value(json!({
//!     "start": "greet",
//!     "nodes": {
//!         "greet": {
//!             "type": "compute",
//!             "emit": {
//!                 "state.greeting": {"$expr": {
//!                     "op": "concat",
//!                     "args": ["hello ", {"$ref": "inputs.name"}]
//!                 }}
//!             },
//!             "next": "done"
//!         },
//!         "done": {"type": "terminal", "output": {"$ref": "state.greeting"}}
//!     }
//! })).unwrap();
//!
//! let registry = Registry::new();
//! let outcome = run_with_registry(&graph, json!({"name": "ada"}), &registry).await;
//! assert!(outcome.last.ok);
//! assert_eq!(outcome.state["output"], json!("hello ada"));
//! # }
//! ```
//!
//! Planner and reasoning nodes need a completion transport
//! ([`completions::CompletionTransport`]); attach one with
//! [`registry::Registry::with_completions`], or use [`runtime::run`] with a
//! [`config::RunConfig`] to wire the HTTP client from the environment.

pub mod completions;
pub mod config;
pub mod context;
pub mod envelope;
pub mod expressions;
pub mod graph;
pub mod handlers;
pub mod http;
pub mod paths;
pub mod registry;
pub mod runner;
pub mod runtime;
pub mod telemetry;
pub mod templates;
pub mod utils;
