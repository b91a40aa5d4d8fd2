//! The traversal state machine.
//!
//! A [`Runner`] owns the mutable run state, walks the graph node by node
//! (handler dispatch, emit application, successor resolution), and assembles
//! the final [`RunOutcome`]. Traversal is bounded two ways: a hard step
//! ceiling of [`MAX_STEPS`] visits per run, and a sub-agent recursion depth
//! of [`MAX_AGENT_DEPTH`] propagated into delegated runs.
//!
//! Successor resolution precedence, per visit:
//! 1. failed result → the node's `on.error` override, else stop;
//! 2. successful result carrying warnings → `on.warning` override, if any;
//! 3. control nodes → the branch decision's `next`;
//! 4. dynamic `next` template (with the node's own result bound to `result`);
//! 5. static `next` string;
//! 6. `on.ok` override;
//! 7. stop.

use crate::context::StepContext;
use crate::envelope::{ErrorCode, NodeResult};
use crate::expressions::ExpressionError;
use crate::graph::{BranchCondition, Graph, Node};
use crate::handlers::{HandlerTable, default_handlers};
use crate::registry::Registry;
use crate::templates;
use crate::utils::value_ext::coerce_node_id;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Hard ceiling on node visits per run.
pub const MAX_STEPS: usize = 1000;

/// Maximum sub-agent nesting depth before `agent.call` fails.
pub const MAX_AGENT_DEPTH: usize = 16;

/// Final outcome of a run: the full state map plus the last node's result.
#[derive(Clone, Debug, Serialize)]
pub struct RunOutcome {
    pub state: Map<String, Value>,
    pub last: NodeResult,
}

/// Drives one traversal of a graph. Cheap to construct; consumed by
/// [`Runner::run`].
pub struct Runner<'g> {
    graph: &'g Graph,
    registry: &'g Registry,
    pub(crate) state: Map<String, Value>,
    handlers: Arc<HandlerTable>,
    depth: usize,
    run_id: Uuid,
}

impl<'g> Runner<'g> {
    pub fn new(graph: &'g Graph, registry: &'g Registry) -> Self {
        Self::at_depth(graph, registry, 0)
    }

    /// Internal constructor used by `agent.call` to propagate nesting depth
    /// into delegated runs.
    pub(crate) fn at_depth(graph: &'g Graph, registry: &'g Registry, depth: usize) -> Self {
        Self {
            graph,
            registry,
            state: Map::new(),
            handlers: Arc::new(default_handlers()),
            depth,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn graph(&self) -> &'g Graph {
        self.graph
    }

    pub(crate) fn registry(&self) -> &'g Registry {
        self.registry
    }

    pub(crate) fn state_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.state
    }

    /// Execute the graph to completion. Never returns an error: every failure
    /// mode is folded into the final envelope.
    pub async fn run(mut self, inputs: Value) -> RunOutcome {
        self.state.insert("inputs".to_string(), inputs);

        let graph = self.graph;
        let Some(start) = graph.start.clone() else {
            debug!(run_id = %self.run_id, "run aborted: no start node");
            return RunOutcome {
                state: self.state,
                last: NodeResult::failure(ErrorCode::MissingStart, "graph has no start node"),
            };
        };

        let mut last = NodeResult::success(Value::Null);
        let mut current = Some(start);
        let mut steps = 0usize;

        while let Some(node_id) = current {
            if steps >= MAX_STEPS {
                warn!(run_id = %self.run_id, steps, "step ceiling reached, stopping traversal");
                break;
            }
            steps += 1;

            let Some(node) = graph.nodes.get(&node_id) else {
                last = NodeResult::failure(ErrorCode::UnknownNode, node_id);
                break;
            };

            debug!(
                run_id = %self.run_id,
                node = %node_id,
                kind = %node.kind(),
                step = steps,
                "executing node"
            );

            let mut ctx = StepContext::new(
                node_id,
                graph.id.clone(),
                self.state.get("inputs").cloned().unwrap_or(Value::Null),
            );
            let Some(handler) = self.handlers.get(&node.kind()).map(Arc::clone) else {
                last = NodeResult::failure(ErrorCode::UnknownNodeType, node.kind().to_string());
                break;
            };
            let result = handler.execute(node, &mut ctx, &mut self).await;

            current = self.resolve_next(node, &result, &mut ctx);
            last = result;
        }

        debug!(run_id = %self.run_id, steps, ok = last.ok, "run finished");
        RunOutcome {
            state: self.state,
            last,
        }
    }

    /// Pick the next node id from the result and the node's routing fields.
    fn resolve_next(
        &self,
        node: &Node,
        result: &NodeResult,
        ctx: &mut StepContext,
    ) -> Option<String> {
        let common = node.common();
        let overrides = common.on.as_ref();

        if !result.ok {
            return overrides.and_then(|on| on.error.clone());
        }
        if result.warnings.is_some()
            && let Some(target) = overrides.and_then(|on| on.warning.clone())
        {
            return Some(target);
        }
        if let Node::Control(_) = node {
            let decided = result
                .result
                .as_ref()
                .and_then(|r| r.get("next"))
                .cloned()
                .unwrap_or(Value::Null);
            return coerce_node_id(&decided);
        }
        match &common.next {
            Some(Value::Object(template)) => {
                ctx.result = result.result.clone();
                match templates::resolve(&Value::Object(template.clone()), ctx, &self.state) {
                    Ok(resolved) => coerce_node_id(&resolved),
                    Err(e) => {
                        warn!(node = %ctx.node_id, error = %e, "next template failed, stopping");
                        None
                    }
                }
            }
            Some(Value::String(id)) => Some(id.clone()),
            _ => overrides.and_then(|on| on.ok.clone()),
        }
    }

    /// Resolve a template against the current state and step context.
    pub(crate) fn resolve_templates(
        &self,
        value: &Value,
        ctx: &StepContext,
    ) -> Result<Value, ExpressionError> {
        templates::resolve(value, ctx, &self.state)
    }

    /// Apply a node's emit mapping. Destinations strip their `state.` prefix;
    /// sources are either a payload key (string), a template (object), an
    /// `$append` directive pushing onto a state array, or a literal.
    pub(crate) fn apply_emit(
        &mut self,
        emit: Option<&Map<String, Value>>,
        payload: &Value,
        ctx: &StepContext,
    ) -> Result<(), ExpressionError> {
        let Some(emit) = emit else { return Ok(()) };
        if payload.is_null() {
            return Ok(());
        }
        for (dest, src) in emit {
            let key = dest.strip_prefix("state.").unwrap_or(dest).to_string();
            match src {
                Value::Object(map) if map.contains_key("$append") => {
                    let append_src = &map["$append"];
                    let value = if append_src == &json!("result") {
                        payload.get("result").cloned().unwrap_or(Value::Null)
                    } else {
                        self.resolve_templates(append_src, ctx)?
                    };
                    let slot = self
                        .state
                        .entry(key)
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if let Value::Array(items) = slot {
                        items.push(value);
                    }
                }
                Value::Object(_) => {
                    let resolved = self.resolve_templates(src, ctx)?;
                    self.state.insert(key, resolved);
                }
                Value::String(payload_key) => {
                    let value = payload.get(payload_key).cloned().unwrap_or(Value::Null);
                    self.state.insert(key, value);
                }
                literal => {
                    self.state.insert(key, literal.clone());
                }
            }
        }
        Ok(())
    }

    /// Evaluate a `control.branch` condition: the first case whose `when`
    /// entries all match wins, else the default. Always yields a `next`
    /// decision object (with a null `next` when nothing matches).
    pub(crate) fn eval_branch(
        &self,
        condition: Option<&BranchCondition>,
        ctx: &StepContext,
    ) -> Value {
        let mut chosen: Option<String> = None;
        if let Some(condition) = condition
            && condition.op == "control.branch"
        {
            for case in &condition.cases {
                let matched = case.when.iter().all(|(path, expected)| {
                    &crate::paths::resolve_path(path, ctx, &self.state) == expected
                });
                if matched {
                    chosen = case.next.clone();
                    break;
                }
            }
            if chosen.is_none() {
                chosen = condition.default.clone();
            }
        }
        match chosen {
            Some(next) => json!({ "next": next }),
            None => json!({ "next": null }),
        }
    }
}
