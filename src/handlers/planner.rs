use super::{NodeHandler, kind_mismatch};
use crate::context::StepContext;
use crate::envelope::{ErrorCode, NodeResult};
use crate::graph::Node;
use crate::runner::Runner;
use async_trait::async_trait;
use serde_json::json;

/// LLM-backed routing: delegates to the registry's plan entry point and
/// carries the validated arguments as its result.
pub struct PlannerHandler;

#[async_trait]
impl NodeHandler for PlannerHandler {
    async fn execute(
        &self,
        node: &Node,
        ctx: &mut StepContext,
        runner: &mut Runner<'_>,
    ) -> NodeResult {
        let Node::Planner(spec) = node else {
            return kind_mismatch(node);
        };
        let planned = match runner
            .registry()
            .plan(ctx, &runner.state, runner.graph(), spec)
            .await
        {
            Ok(planned) => planned,
            Err(e) => return NodeResult::failure(ErrorCode::PlannerFailed, e.to_string()),
        };
        ctx.result = Some(planned.clone());
        if let Err(e) = runner.apply_emit(
            spec.common.emit.as_ref(),
            &json!({ "result": planned }),
            ctx,
        ) {
            return NodeResult::failure(ErrorCode::ExpressionFailed, e.to_string());
        }
        NodeResult::success(planned)
    }
}
