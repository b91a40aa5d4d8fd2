use super::{NodeHandler, kind_mismatch};
use crate::context::StepContext;
use crate::envelope::{ErrorCode, NodeResult};
use crate::graph::Node;
use crate::runner::Runner;
use async_trait::async_trait;
use serde_json::Value;

/// End of traversal; materializes `state.output` when the node declares an
/// output template, and returns whatever output the run accumulated.
pub struct TerminalHandler;

#[async_trait]
impl NodeHandler for TerminalHandler {
    async fn execute(
        &self,
        node: &Node,
        ctx: &mut StepContext,
        runner: &mut Runner<'_>,
    ) -> NodeResult {
        let Node::Terminal(spec) = node else {
            return kind_mismatch(node);
        };
        if let Some(output) = &spec.output {
            let resolved = match runner.resolve_templates(output, ctx) {
                Ok(v) => v,
                Err(e) => return NodeResult::failure(ErrorCode::ExpressionFailed, e.to_string()),
            };
            runner.state_mut().insert("output".to_string(), resolved);
        }
        let output = runner.state.get("output").cloned().unwrap_or(Value::Null);
        NodeResult::success(output)
    }
}
