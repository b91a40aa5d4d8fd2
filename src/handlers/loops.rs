//! Loop node execution: sequential and bounded-concurrency iteration.
//!
//! Every iteration binds `loop.{<as>, index, length, first, last}`, passes an
//! optional `when` guard, and runs the node's `execute` operation. With
//! `concurrency > 1` iterations run in parallel behind a semaphore admission
//! gate; results are collected in input order and emits are applied after all
//! iterations complete, in index order, so state writes stay deterministic
//! regardless of completion order.

use super::{NodeHandler, kind_mismatch};
use crate::context::StepContext;
use crate::envelope::{ErrorCode, ErrorInfo, NodeResult, RunWarnings};
use crate::graph::{LoopExecute, LoopNode, Node, OnError};
use crate::registry::Registry;
use crate::runner::Runner;
use crate::templates;
use crate::utils::value_ext::{is_truthy, value_kind};
use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::debug;

pub struct LoopHandler;

/// What one iteration produced, in input order.
enum IterationOutcome {
    Completed { value: Value, scope: Value },
    Failed(ErrorInfo),
    Skipped,
}

#[async_trait]
impl NodeHandler for LoopHandler {
    async fn execute(
        &self,
        node: &Node,
        ctx: &mut StepContext,
        runner: &mut Runner<'_>,
    ) -> NodeResult {
        let Node::Loop(spec) = node else {
            return kind_mismatch(node);
        };
        let items = match runner.resolve_templates(&spec.over, ctx) {
            Ok(Value::Array(items)) => items,
            Ok(other) => {
                return NodeResult::failure(
                    ErrorCode::LoopInvalidOver,
                    format!("'over' must resolve to an array, got {}", value_kind(&other)),
                );
            }
            Err(e) => return NodeResult::failure(ErrorCode::ExpressionFailed, e.to_string()),
        };

        let total = items.len();
        debug!(
            node = %ctx.node_id,
            total,
            concurrency = spec.concurrency,
            "starting loop"
        );

        let mut results: Vec<Value> = Vec::new();
        let mut failures: Vec<Value> = Vec::new();
        let mut skipped = 0usize;

        if spec.concurrency <= 1 || total <= 1 {
            self.run_sequential(
                spec, &items, ctx, runner, &mut results, &mut failures, &mut skipped,
            )
            .await;
        } else {
            self.run_concurrent(
                spec, &items, ctx, runner, &mut results, &mut failures, &mut skipped,
            )
            .await;
        }

        ctx.loop_scope = None;
        ctx.result = Some(Value::Array(results.clone()));

        if !failures.is_empty() && spec.on_error == OnError::Stop {
            let error = ErrorInfo::new(
                ErrorCode::LoopIterationFailed,
                format!("{} iteration(s) failed", failures.len()),
            )
            .with_details(Value::Array(failures));
            return NodeResult::from_error(error).with_partial_results(Value::Array(results));
        }

        let mut result = NodeResult::success(Value::Array(results));
        if !failures.is_empty() {
            result = result.with_warnings(RunWarnings {
                code: Some(ErrorCode::LoopIterationFailed),
                message: Some(format!("{} iteration(s) failed", failures.len())),
                failed_count: Some(failures.len()),
                skipped_count: (skipped > 0).then_some(skipped),
            });
        } else if skipped > 0 {
            result = result.with_warnings(RunWarnings {
                code: None,
                message: Some(format!("{skipped} iteration(s) skipped")),
                failed_count: None,
                skipped_count: Some(skipped),
            });
        }
        result
    }
}

impl LoopHandler {
    #[allow(clippy::too_many_arguments)]
    async fn run_sequential(
        &self,
        spec: &LoopNode,
        items: &[Value],
        ctx: &mut StepContext,
        runner: &mut Runner<'_>,
        results: &mut Vec<Value>,
        failures: &mut Vec<Value>,
        skipped: &mut usize,
    ) {
        let total = items.len();
        for (index, item) in items.iter().enumerate() {
            ctx.loop_scope = Some(iteration_scope(&spec.binding, item.clone(), index, total));

            match check_when(spec.when.as_ref(), ctx, &runner.state) {
                Ok(true) => {}
                Ok(false) => {
                    *skipped += 1;
                    continue;
                }
                Err(error) => {
                    failures.push(failure_entry(index, item, error));
                    if spec.on_error == OnError::Stop {
                        break;
                    }
                    continue;
                }
            }

            let outcome =
                run_iteration(&spec.execute, ctx, &runner.state, runner.registry()).await;
            match outcome {
                Ok(value) => {
                    ctx.result = Some(value.clone());
                    let payload = json!({"ok": true, "result": value});
                    match runner.apply_emit(spec.common.emit.as_ref(), &payload, ctx) {
                        Ok(()) => results.push(value),
                        Err(e) => {
                            let error =
                                ErrorInfo::new(ErrorCode::ExpressionFailed, e.to_string());
                            failures.push(failure_entry(index, item, error));
                            if spec.on_error == OnError::Stop {
                                break;
                            }
                        }
                    }
                }
                Err(error) => {
                    failures.push(failure_entry(index, item, error));
                    if spec.on_error == OnError::Stop {
                        break;
                    }
                }
            }

            if index < total - 1
                && let Some(pause) = pacing(spec.delay)
            {
                sleep(pause).await;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_concurrent(
        &self,
        spec: &LoopNode,
        items: &[Value],
        ctx: &mut StepContext,
        runner: &mut Runner<'_>,
        results: &mut Vec<Value>,
        failures: &mut Vec<Value>,
        skipped: &mut usize,
    ) {
        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(spec.concurrency));
        let registry = runner.registry();
        let state = &runner.state;
        let base_ctx: &StepContext = ctx;

        let iterations = items.iter().enumerate().map(|(index, item)| {
            let semaphore = Arc::clone(&semaphore);
            let mut iter_ctx = base_ctx.clone();
            let scope = iteration_scope(&spec.binding, item.clone(), index, total);
            async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return IterationOutcome::Failed(ErrorInfo::new(
                        ErrorCode::LoopIterationFailed,
                        "admission gate closed",
                    ));
                };
                // Pace admissions the same way the sequential mode paces
                // iterations; the first needs no delay.
                if index > 0 && let Some(pause) = pacing(spec.delay) {
                    sleep(pause).await;
                }
                iter_ctx.loop_scope = Some(scope.clone());

                match check_when(spec.when.as_ref(), &iter_ctx, state) {
                    Ok(true) => {}
                    Ok(false) => return IterationOutcome::Skipped,
                    Err(error) => return IterationOutcome::Failed(error),
                }
                match run_iteration(&spec.execute, &iter_ctx, state, registry).await {
                    Ok(value) => IterationOutcome::Completed { value, scope },
                    Err(error) => IterationOutcome::Failed(error),
                }
            }
        });

        // join_all preserves input order, so outcome i belongs to item i.
        let outcomes = join_all(iterations).await;

        let stop_at = match spec.on_error {
            OnError::Stop => outcomes
                .iter()
                .position(|o| matches!(o, IterationOutcome::Failed(_))),
            OnError::Continue => None,
        };

        for (index, outcome) in outcomes.into_iter().enumerate() {
            if let Some(stop) = stop_at
                && index > stop
            {
                break;
            }
            match outcome {
                IterationOutcome::Completed { value, scope } => {
                    ctx.loop_scope = Some(scope);
                    ctx.result = Some(value.clone());
                    let payload = json!({"ok": true, "result": value});
                    match runner.apply_emit(spec.common.emit.as_ref(), &payload, ctx) {
                        Ok(()) => results.push(value),
                        Err(e) => {
                            let error =
                                ErrorInfo::new(ErrorCode::ExpressionFailed, e.to_string());
                            failures.push(failure_entry(index, &items[index], error));
                        }
                    }
                }
                IterationOutcome::Failed(error) => {
                    failures.push(failure_entry(index, &items[index], error));
                }
                IterationOutcome::Skipped => *skipped += 1,
            }
        }
    }
}

fn iteration_scope(binding: &str, item: Value, index: usize, total: usize) -> Value {
    json!({
        binding: item,
        "index": index,
        "length": total,
        "first": index == 0,
        "last": index + 1 == total,
    })
}

/// A delay the `Duration` type cannot represent (negative, NaN, past its
/// range) disables pacing rather than panicking.
fn pacing(seconds: f64) -> Option<Duration> {
    if seconds > 0.0 {
        Duration::try_from_secs_f64(seconds).ok()
    } else {
        None
    }
}

fn failure_entry(index: usize, item: &Value, error: ErrorInfo) -> Value {
    json!({
        "index": index,
        "item": item,
        "error": serde_json::to_value(&error).unwrap_or(Value::Null),
    })
}

/// Evaluate the `when` guard; true admits the iteration.
fn check_when(
    when: Option<&Value>,
    ctx: &StepContext,
    state: &Map<String, Value>,
) -> Result<bool, ErrorInfo> {
    let Some(when) = when else { return Ok(true) };
    match templates::resolve(when, ctx, state) {
        Ok(v) => Ok(is_truthy(&v)),
        Err(e) => Err(ErrorInfo::new(ErrorCode::ExpressionFailed, e.to_string())),
    }
}

/// Run one iteration's operation against a shared view of the state.
async fn run_iteration(
    execute: &LoopExecute,
    ctx: &StepContext,
    state: &Map<String, Value>,
    registry: &Registry,
) -> Result<Value, ErrorInfo> {
    let raw_input = execute.input.clone().unwrap_or(Value::Null);
    let input = templates::resolve(&raw_input, ctx, state)
        .map_err(|e| ErrorInfo::new(ErrorCode::ExpressionFailed, e.to_string()))?;

    match execute.op.as_deref() {
        Some("api.call") => {
            let called = registry.call_api(execute.target.as_deref(), &input).await;
            if called.ok {
                Ok(called.result_value())
            } else {
                Err(called.error.unwrap_or_else(|| {
                    ErrorInfo::new(ErrorCode::ApiCallFailed, "api call failed")
                }))
            }
        }
        Some("wait") => {
            let seconds = input.get("seconds").and_then(Value::as_f64).unwrap_or(0.0);
            if seconds > 0.0 {
                let pause = Duration::try_from_secs_f64(seconds).map_err(|_| {
                    ErrorInfo::new(
                        ErrorCode::ExpressionFailed,
                        format!("wait seconds out of range: {seconds}"),
                    )
                })?;
                sleep(pause).await;
            }
            Ok(Value::Null)
        }
        other => Err(ErrorInfo::new(
            ErrorCode::UnknownExecutorOp,
            other.unwrap_or("<none>").to_string(),
        )),
    }
}
