//! Node handlers: one per node kind, behind a uniform async execute contract.
//!
//! Handlers receive the node definition, the mutable step context, and the
//! runner (for state access, emit application, and sub-agent delegation).
//! They never propagate errors upward: every failure is folded into the
//! returned [`NodeResult`].

mod compute;
mod control;
mod executor;
mod loops;
mod planner;
mod reasoning;
mod terminal;

pub use compute::ComputeHandler;
pub use control::ControlHandler;
pub use executor::ExecutorHandler;
pub use loops::LoopHandler;
pub use planner::PlannerHandler;
pub use reasoning::ReasoningHandler;
pub use terminal::TerminalHandler;

use crate::context::StepContext;
use crate::envelope::{ErrorCode, NodeResult};
use crate::graph::{Node, NodeKind};
use crate::runner::Runner;
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Uniform execute contract implemented by every node handler.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn execute(
        &self,
        node: &Node,
        ctx: &mut StepContext,
        runner: &mut Runner<'_>,
    ) -> NodeResult;
}

/// Dispatch table from node kind to handler.
pub type HandlerTable = FxHashMap<NodeKind, Arc<dyn NodeHandler>>;

/// The built-in handler set covering all seven node kinds.
pub fn default_handlers() -> HandlerTable {
    let mut table: HandlerTable = FxHashMap::default();
    table.insert(NodeKind::Compute, Arc::new(ComputeHandler));
    table.insert(NodeKind::Control, Arc::new(ControlHandler));
    table.insert(NodeKind::Executor, Arc::new(ExecutorHandler));
    table.insert(NodeKind::Planner, Arc::new(PlannerHandler));
    table.insert(NodeKind::Reasoning, Arc::new(ReasoningHandler));
    table.insert(NodeKind::Terminal, Arc::new(TerminalHandler));
    table.insert(NodeKind::Loop, Arc::new(LoopHandler));
    table
}

/// Guard for a handler invoked with a node of the wrong kind; only reachable
/// if the dispatch table is miswired.
fn kind_mismatch(node: &Node) -> NodeResult {
    NodeResult::failure(ErrorCode::UnknownNodeType, node.kind().to_string())
}
