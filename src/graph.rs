//! Graph data model: the declarative document the runtime executes.
//!
//! A [`Graph`] is a flat map of named nodes plus a `start` pointer. Nodes are
//! a closed, internally-tagged union on their `type` field; unknown types are
//! rejected at deserialization time rather than at traversal time. Routing
//! fields shared by every kind (`emit`, `next`, `on`) live in [`NodeCommon`]
//! and are flattened into each variant.
//!
//! ```
//! use agentgraph::graph::{Graph, Node};
//! use serde_json::json;
//!
//! let graph: Graph = serde_json::from_value(json!({
//!     "id": "greeter",
//!     "start": "hello",
//!     "nodes": {
//!         "hello": {
//!             "type": "compute",
//!             "emit": {"state.greeting": "result"},
//!             "next": "done"
//!         },
//!         "done": {"type": "terminal", "output": {"$ref": "state.greeting"}}
//!     }
//! })).unwrap();
//! assert!(matches!(graph.nodes["done"], Node::Terminal(_)));
//! ```

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A declarative computation graph.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default)]
    pub nodes: FxHashMap<String, Node>,
}

impl Graph {
    /// Node ids in sorted order, used as the default planner route enum.
    pub fn node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.nodes.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// The seven node kinds, as a standalone discriminant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Compute,
    Control,
    Executor,
    Planner,
    Reasoning,
    Terminal,
    Loop,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::Compute => "compute",
            NodeKind::Control => "control",
            NodeKind::Executor => "executor",
            NodeKind::Planner => "planner",
            NodeKind::Reasoning => "reasoning",
            NodeKind::Terminal => "terminal",
            NodeKind::Loop => "loop",
        };
        f.write_str(s)
    }
}

/// A node definition, tagged on its `type` field.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    Compute(ComputeNode),
    Control(ControlNode),
    Executor(ExecutorNode),
    Planner(PlannerNode),
    Reasoning(ReasoningNode),
    Terminal(TerminalNode),
    Loop(LoopNode),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Compute(_) => NodeKind::Compute,
            Node::Control(_) => NodeKind::Control,
            Node::Executor(_) => NodeKind::Executor,
            Node::Planner(_) => NodeKind::Planner,
            Node::Reasoning(_) => NodeKind::Reasoning,
            Node::Terminal(_) => NodeKind::Terminal,
            Node::Loop(_) => NodeKind::Loop,
        }
    }

    /// The routing fields shared by every node kind.
    pub fn common(&self) -> &NodeCommon {
        match self {
            Node::Compute(n) => &n.common,
            Node::Control(n) => &n.common,
            Node::Executor(n) => &n.common,
            Node::Planner(n) => &n.common,
            Node::Reasoning(n) => &n.common,
            Node::Terminal(n) => &n.common,
            Node::Loop(n) => &n.common,
        }
    }
}

/// Fields every node kind shares: state writes and successor routing.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeCommon {
    /// State writes applied after a successful execution. Keys are `state.*`
    /// destinations; values are source selectors or templates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emit: Option<Map<String, Value>>,
    /// Static successor id (string) or a template resolving to one (object).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Value>,
    /// Outcome-based routing overrides, consulted before `next`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<RouteOverrides>,
}

/// Per-outcome successor overrides.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RouteOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Pure state transformation: no side effects beyond its `emit`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ComputeNode {
    #[serde(flatten)]
    pub common: NodeCommon,
}

/// Declarative branch point.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ControlNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<BranchCondition>,
    #[serde(flatten)]
    pub common: NodeCommon,
}

/// A `control.branch` condition: ordered cases with a fallback.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BranchCondition {
    #[serde(default)]
    pub op: String,
    #[serde(default)]
    pub cases: Vec<BranchCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// One branch case: every `when` entry maps a context path to an expected
/// value, all of which must match for the case to fire.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BranchCase {
    #[serde(default)]
    pub when: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// Side-effecting node: API call, sub-agent delegation, or wait.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExecutorNode {
    #[serde(default)]
    pub run: RunSpec,
    #[serde(flatten)]
    pub common: NodeCommon,
}

/// What an executor node runs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
}

/// LLM-backed routing decision with schema-constrained output.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlannerNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_from: Option<EnumFrom>,
    #[serde(flatten)]
    pub common: NodeCommon,
}

/// Widens a planner output field's enum from values found in a state array.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnumFrom {
    pub state: String,
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<EnumFilter>,
}

/// Equality filter applied to the state array before extracting enum values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnumFilter {
    pub field: String,
    pub equals: Value,
}

/// LLM-backed free-text step.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReasoningNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(flatten)]
    pub common: NodeCommon,
}

/// End of traversal; optionally materializes `state.output`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TerminalNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(flatten)]
    pub common: NodeCommon,
}

/// Iterates an operation over a resolved sequence, sequentially or with
/// bounded concurrency.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoopNode {
    /// Template or literal resolving to the array to iterate.
    pub over: Value,
    /// Name the current item is bound to inside `loop` scope.
    #[serde(rename = "as", default = "default_binding")]
    pub binding: String,
    /// Seconds to pause between iterations (or before each admission when
    /// running concurrently).
    #[serde(default)]
    pub delay: f64,
    /// Maximum number of in-flight iterations; 1 means sequential.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub on_error: OnError,
    /// Per-iteration guard; falsy skips the iteration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Value>,
    #[serde(default)]
    pub execute: LoopExecute,
    #[serde(flatten)]
    pub common: NodeCommon,
}

fn default_binding() -> String {
    "item".to_string()
}

fn default_concurrency() -> usize {
    1
}

/// The operation run for each admitted iteration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LoopExecute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
}

/// Loop failure policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    #[default]
    Continue,
    Stop,
}
