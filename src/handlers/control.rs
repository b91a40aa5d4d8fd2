use super::{NodeHandler, kind_mismatch};
use crate::context::StepContext;
use crate::envelope::NodeResult;
use crate::graph::Node;
use crate::runner::Runner;
use async_trait::async_trait;

/// Declarative branch point: evaluates the condition and carries the
/// decision as its result, which the runner routes on.
pub struct ControlHandler;

#[async_trait]
impl NodeHandler for ControlHandler {
    async fn execute(
        &self,
        node: &Node,
        ctx: &mut StepContext,
        runner: &mut Runner<'_>,
    ) -> NodeResult {
        let Node::Control(spec) = node else {
            return kind_mismatch(node);
        };
        let decided = runner.eval_branch(spec.condition.as_ref(), ctx);
        ctx.result = Some(decided.clone());
        NodeResult::success(decided)
    }
}
