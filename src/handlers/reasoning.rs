use super::{NodeHandler, kind_mismatch};
use crate::context::StepContext;
use crate::envelope::{ErrorCode, NodeResult};
use crate::graph::Node;
use crate::runner::Runner;
use async_trait::async_trait;
use serde_json::{Value, json};

/// LLM-backed free-text step over a prompt and a resolved input payload.
pub struct ReasoningHandler;

#[async_trait]
impl NodeHandler for ReasoningHandler {
    async fn execute(
        &self,
        node: &Node,
        ctx: &mut StepContext,
        runner: &mut Runner<'_>,
    ) -> NodeResult {
        let Node::Reasoning(spec) = node else {
            return kind_mismatch(node);
        };
        let raw_input = spec.input.clone().unwrap_or_else(|| json!({}));
        let input = match runner.resolve_templates(&raw_input, ctx) {
            Ok(v) => v,
            Err(e) => return NodeResult::failure(ErrorCode::ExpressionFailed, e.to_string()),
        };
        let prompt = spec.prompt.as_deref().unwrap_or_default();
        let text = match runner.registry().reason(prompt, &input).await {
            Ok(text) => text,
            Err(e) => return NodeResult::failure(ErrorCode::ReasoningFailed, e.to_string()),
        };
        let result = Value::String(text);
        ctx.result = Some(result.clone());
        if let Err(e) = runner.apply_emit(
            spec.common.emit.as_ref(),
            &json!({ "result": result }),
            ctx,
        ) {
            return NodeResult::failure(ErrorCode::ExpressionFailed, e.to_string());
        }
        NodeResult::success(result)
    }
}
