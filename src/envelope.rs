//! The universal result envelope returned by node handlers and whole runs.
//!
//! Every handler resolves to a [`NodeResult`], success or not: internal
//! failures are caught at the dispatch boundary and folded into the envelope
//! rather than crossing the runner as panics or raw errors. `ok == false`
//! always implies [`NodeResult::error`] is populated; `warnings` may co-occur
//! with `ok == true` to signal partial success (loop iterations that failed
//! under the `continue` policy).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Closed taxonomy of failure codes surfaced in [`ErrorInfo`].
///
/// The structural, delegation, loop, and API families mirror the graph
/// language; the `*_failed` tail covers internal errors (template/expression
/// evaluation, planner/reasoning transport) caught at the handler dispatch
/// boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MissingStart,
    UnknownNode,
    UnknownNodeType,
    UnknownExecutorOp,
    MissingAgent,
    SubagentFailed,
    LoopInvalidOver,
    LoopIterationFailed,
    UnknownApiTarget,
    UnknownApiOp,
    MethodNotAllowed,
    Forbidden,
    ApiCallFailed,
    ExpressionFailed,
    PlannerFailed,
    ReasoningFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingStart => "missing_start",
            ErrorCode::UnknownNode => "unknown_node",
            ErrorCode::UnknownNodeType => "unknown_node_type",
            ErrorCode::UnknownExecutorOp => "unknown_executor_op",
            ErrorCode::MissingAgent => "missing_agent",
            ErrorCode::SubagentFailed => "subagent_failed",
            ErrorCode::LoopInvalidOver => "loop_invalid_over",
            ErrorCode::LoopIterationFailed => "loop_iteration_failed",
            ErrorCode::UnknownApiTarget => "unknown_api_target",
            ErrorCode::UnknownApiOp => "unknown_api_op",
            ErrorCode::MethodNotAllowed => "method_not_allowed",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::ApiCallFailed => "api_call_failed",
            ErrorCode::ExpressionFailed => "expression_failed",
            ErrorCode::PlannerFailed => "planner_failed",
            ErrorCode::ReasoningFailed => "reasoning_failed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure detail carried inside a failing [`NodeResult`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Partial-success annotation attached to an otherwise successful result.
///
/// Loop nodes use this to report iteration failures under the `continue`
/// policy (`failed_count`) and iterations skipped by a `when` clause
/// (`skipped_count`) without turning the node into a hard error. The runner
/// routes on its presence via `on.warning`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunWarnings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_count: Option<usize>,
}

/// Universal return shape of every node handler and of a whole run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<RunWarnings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_results: Option<Value>,
}

impl NodeResult {
    /// Successful result carrying a (possibly null) value.
    pub fn success(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
            warnings: None,
            partial_results: None,
        }
    }

    /// Failing result with a code and message.
    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::from_error(ErrorInfo::new(code, message))
    }

    /// Failing result wrapping an already-built [`ErrorInfo`].
    pub fn from_error(error: ErrorInfo) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(error),
            warnings: None,
            partial_results: None,
        }
    }

    #[must_use]
    pub fn with_warnings(mut self, warnings: RunWarnings) -> Self {
        self.warnings = Some(warnings);
        self
    }

    #[must_use]
    pub fn with_partial_results(mut self, partial: Value) -> Self {
        self.partial_results = Some(partial);
        self
    }

    /// The carried result value, null when absent.
    pub fn result_value(&self) -> Value {
        self.result.clone().unwrap_or(Value::Null)
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }

    /// The envelope as a JSON object, used as the emit payload so graph
    /// authors can address `result` (and siblings) by key.
    pub fn as_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
