use super::{NodeHandler, kind_mismatch};
use crate::context::StepContext;
use crate::envelope::{ErrorCode, ErrorInfo, NodeResult};
use crate::graph::Node;
use crate::runner::{MAX_AGENT_DEPTH, Runner};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// Side-effecting node: dispatches on `run.op` to an API call, a sub-agent
/// delegation, or a timed wait.
pub struct ExecutorHandler;

#[async_trait]
impl NodeHandler for ExecutorHandler {
    async fn execute(
        &self,
        node: &Node,
        ctx: &mut StepContext,
        runner: &mut Runner<'_>,
    ) -> NodeResult {
        let Node::Executor(spec) = node else {
            return kind_mismatch(node);
        };
        let raw_input = spec.run.input.clone().unwrap_or(Value::Null);
        let input = match runner.resolve_templates(&raw_input, ctx) {
            Ok(v) => v,
            Err(e) => return NodeResult::failure(ErrorCode::ExpressionFailed, e.to_string()),
        };
        ctx.run = Some(json!({ "input": input }));

        match spec.run.op.as_deref() {
            Some("api.call") => {
                let called = runner
                    .registry()
                    .call_api(spec.run.target.as_deref(), &input)
                    .await;
                if called.ok {
                    ctx.result = called.result.clone();
                    if let Err(e) =
                        runner.apply_emit(spec.common.emit.as_ref(), &called.as_payload(), ctx)
                    {
                        return NodeResult::failure(ErrorCode::ExpressionFailed, e.to_string());
                    }
                }
                called
            }
            Some("agent.call") => self.call_agent(spec, input, ctx, runner).await,
            Some("wait") => {
                let seconds = input.get("seconds").and_then(Value::as_f64).unwrap_or(0.0);
                if seconds > 0.0 {
                    // Duration rejects NaN and values past its range; fold that
                    // into the envelope instead of panicking mid-run.
                    let Ok(pause) = Duration::try_from_secs_f64(seconds) else {
                        return NodeResult::failure(
                            ErrorCode::ExpressionFailed,
                            format!("wait seconds out of range: {seconds}"),
                        );
                    };
                    tokio::time::sleep(pause).await;
                }
                ctx.result = Some(Value::Null);
                if let Err(e) =
                    runner.apply_emit(spec.common.emit.as_ref(), &json!({"result": null}), ctx)
                {
                    return NodeResult::failure(ErrorCode::ExpressionFailed, e.to_string());
                }
                NodeResult::success(Value::Null)
            }
            other => NodeResult::failure(
                ErrorCode::UnknownExecutorOp,
                other.unwrap_or("<none>").to_string(),
            ),
        }
    }
}

impl ExecutorHandler {
    /// Delegate to a registered sub-agent graph with an isolated state map
    /// and an incremented nesting depth.
    async fn call_agent(
        &self,
        spec: &crate::graph::ExecutorNode,
        input: Value,
        ctx: &mut StepContext,
        runner: &mut Runner<'_>,
    ) -> NodeResult {
        let Some(agent_id) = spec.run.agent_id.as_deref() else {
            return NodeResult::failure(ErrorCode::MissingAgent, "executor has no agent_id");
        };
        if runner.depth() >= MAX_AGENT_DEPTH {
            return NodeResult::failure(
                ErrorCode::SubagentFailed,
                format!("recursion depth exceeded for agent: {agent_id}"),
            );
        }
        let registry = runner.registry();
        let subgraph = match registry.agents().resolve(agent_id) {
            Ok(graph) => graph,
            Err(e) => return NodeResult::failure(ErrorCode::SubagentFailed, e.to_string()),
        };

        let sub_inputs = if input.is_null() {
            json!({})
        } else {
            input
        };
        debug!(agent = agent_id, depth = runner.depth() + 1, "delegating to sub-agent");
        let sub_outcome = Runner::at_depth(subgraph, registry, runner.depth() + 1)
            .run(sub_inputs)
            .await;

        if !sub_outcome.last.ok {
            let mut error = ErrorInfo::new(
                ErrorCode::SubagentFailed,
                format!("sub-agent run failed: {agent_id}"),
            );
            if let Some(sub_error) = &sub_outcome.last.error {
                error = error.with_details(json!({
                    "code": sub_error.code,
                    "message": sub_error.message,
                }));
            }
            return NodeResult::from_error(error);
        }

        let result = sub_outcome.last.result_value();
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
