use super::{NodeHandler, kind_mismatch};
use crate::context::StepContext;
use crate::envelope::{ErrorCode, NodeResult};
use crate::graph::Node;
use crate::runner::Runner;
use async_trait::async_trait;
use serde_json::{Value, json};

/// Pure state transformation: all the work happens in the emit mapping.
pub struct ComputeHandler;

#[async_trait]
impl NodeHandler for ComputeHandler {
    async fn execute(
        &self,
        node: &Node,
        ctx: &mut StepContext,
        runner: &mut Runner<'_>,
    ) -> NodeResult {
        let Node::Compute(spec) = node else {
            return kind_mismatch(node);
        };
        ctx.result = Some(Value::Null);
        if let Err(e) = runner.apply_emit(spec.common.emit.as_ref(), &json!({"result": null}), ctx)
        {
            return NodeResult::failure(ErrorCode::ExpressionFailed, e.to_string());
        }
        NodeResult::success(Value::Null)
    }
}
