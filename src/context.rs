//! Ephemeral per-node execution context.
//!
//! A [`StepContext`] is built fresh for every node visit and discarded when
//! the step finishes. It carries the context roots the template language can
//! reference besides `state` and `inputs`: the node's resolved `run` input,
//! the node's own `result` (for self-referencing `next` templates), and the
//! `loop` bindings that exist only while a loop node executes.

use serde_json::Value;

/// Per-step context passed to the node handler and the template resolver.
///
/// The mutable run state itself is owned by the runner and passed alongside;
/// the context never aliases it.
#[derive(Clone, Debug, Default)]
pub struct StepContext {
    /// Id of the node being executed.
    pub node_id: String,
    /// Id of the enclosing graph, if it declares one.
    pub graph_id: Option<String>,
    /// Snapshot of the run's inputs at visit start, used by the planner's
    /// transcript forwarding. The `inputs` template root reads `state.inputs`
    /// live instead.
    pub inputs: Value,
    /// The node's resolved run input (`run` root), set by executor nodes.
    pub run: Option<Value>,
    /// The node's own output value (`result` root), once produced.
    pub result: Option<Value>,
    /// Iteration-local bindings (`loop` root); present only during loop
    /// execution and cleared when the loop node finishes.
    pub loop_scope: Option<Value>,
}

impl StepContext {
    pub fn new(node_id: impl Into<String>, graph_id: Option<String>, inputs: Value) -> Self {
        Self {
            node_id: node_id.into(),
            graph_id,
            inputs,
            run: None,
            result: None,
            loop_scope: None,
        }
    }
}
