//! Capability registry: the gate between graphs and the outside world.
//!
//! The registry owns three concerns the handlers delegate to:
//!
//! - **API dispatch** ([`Registry::call_api`]): resolves an operation name to
//!   a registered or provider-discovered [`ApiOp`], enforces the read-only
//!   method gate and the capability grants, and invokes the handler. Always
//!   returns the result envelope; failures never cross the dispatch boundary
//!   as errors.
//! - **Sub-agent graphs** ([`AgentTable`]): named graphs `agent.call`
//!   delegates to.
//! - **Model entry points** ([`Registry::plan`], [`Registry::reason`]): the
//!   planner's forced tool call with schema validation, and the reasoning
//!   node's free-text completion.

pub mod agents;
pub mod api;

pub use agents::{AgentError, AgentTable};
pub use api::{ApiError, ApiHandler, ApiOp, ApiProvider, ApiTarget, GetJsonHandler};

use crate::completions::{ChatMessage, CompletionError, CompletionRequest, CompletionTransport};
use crate::context::StepContext;
use crate::envelope::{ErrorCode, NodeResult};
use crate::graph::{Graph, PlannerNode};
use jsonschema::JSONSchema;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

const DEFAULT_PLANNER_PROMPT: &str =
    "You are a routing component. You MUST call the provided tool. Do not respond with text.";

const ROUTE_TOOL_NAME: &str = "route";

#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("API target already registered: {0}")]
    #[diagnostic(code(agentgraph::registry::duplicate_target))]
    DuplicateTarget(String),

    #[error("API op already registered: {0}")]
    #[diagnostic(code(agentgraph::registry::duplicate_op))]
    DuplicateOp(String),

    #[error("API op '{op}' references unknown target '{target}'")]
    #[diagnostic(code(agentgraph::registry::unknown_target))]
    OpUnknownTarget { op: String, target: String },
}

#[derive(Debug, Error, Diagnostic)]
pub enum PlannerError {
    #[error("no completion transport configured")]
    #[diagnostic(
        code(agentgraph::planner::no_transport),
        help("build the registry with Registry::with_completions")
    )]
    NoTransport,

    #[error("enum_from source is not an array: {0}")]
    #[diagnostic(code(agentgraph::planner::enum_source))]
    EnumSourceNotArray(String),

    #[error("output_schema requires no field besides 'next' to widen")]
    #[diagnostic(code(agentgraph::planner::enum_field))]
    EnumFieldMissing,

    #[error("no valid enum values for field '{field}' from state '{state}'")]
    #[diagnostic(code(agentgraph::planner::empty_enum))]
    EmptyEnum { field: String, state: String },

    #[error("planner did not produce tool call; model={model}; finish_reason={finish_reason}")]
    #[diagnostic(code(agentgraph::planner::no_tool_call))]
    NoToolCall { model: String, finish_reason: String },

    #[error("planner output_schema does not compile: {0}")]
    #[diagnostic(code(agentgraph::planner::schema_compile))]
    SchemaCompile(String),

    #[error("planner output schema violation: {0}")]
    #[diagnostic(code(agentgraph::planner::schema_violation))]
    SchemaViolation(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Completion(#[from] CompletionError),
}

#[derive(Debug, Error, Diagnostic)]
pub enum ReasoningError {
    #[error("no completion transport configured")]
    #[diagnostic(
        code(agentgraph::reasoning::no_transport),
        help("build the registry with Registry::with_completions")
    )]
    NoTransport,

    #[error("reasoning node produced empty output")]
    #[diagnostic(code(agentgraph::reasoning::empty_reply))]
    EmptyReply,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Completion(#[from] CompletionError),
}

/// The runtime's capability registry.
pub struct Registry {
    capabilities: Vec<String>,
    agents: AgentTable,
    api_targets: FxHashMap<String, ApiTarget>,
    api_ops: FxHashMap<String, ApiOp>,
    providers: Vec<Box<dyn ApiProvider>>,
    completions: Option<Arc<dyn CompletionTransport>>,
}

impl Registry {
    /// An empty registry with no grants and no completion transport; planner
    /// and reasoning nodes will fail until one is attached.
    pub fn new() -> Self {
        Self {
            capabilities: Vec::new(),
            agents: AgentTable::new(),
            api_targets: FxHashMap::default(),
            api_ops: FxHashMap::default(),
            providers: Vec::new(),
            completions: None,
        }
    }

    #[must_use]
    pub fn with_completions(mut self, transport: Arc<dyn CompletionTransport>) -> Self {
        self.completions = Some(transport);
        self
    }

    pub fn grant_capability(&mut self, capability: impl Into<String>) {
        let capability = capability.into();
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    pub fn agents(&self) -> &AgentTable {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut AgentTable {
        &mut self.agents
    }

    pub fn register_target(&mut self, target: ApiTarget) -> Result<(), RegistryError> {
        if self.api_targets.contains_key(&target.name) {
            return Err(RegistryError::DuplicateTarget(target.name));
        }
        self.api_targets.insert(target.name.clone(), target);
        Ok(())
    }

    pub fn register_op(&mut self, name: impl Into<String>, op: ApiOp) -> Result<(), RegistryError> {
        let name = name.into();
        if self.api_ops.contains_key(&name) {
            return Err(RegistryError::DuplicateOp(name));
        }
        if !self.api_targets.contains_key(&op.target) {
            return Err(RegistryError::OpUnknownTarget {
                op: name,
                target: op.target,
            });
        }
        self.api_ops.insert(name, op);
        Ok(())
    }

    /// Install a provider: registers its target and static ops, and keeps it
    /// around for lazy operation resolution.
    pub fn install_provider(&mut self, provider: Box<dyn ApiProvider>) -> Result<(), RegistryError> {
        self.register_target(provider.target())?;
        for (name, op) in provider.ops() {
            self.register_op(name, op)?;
        }
        self.providers.push(provider);
        Ok(())
    }

    /// Dispatch an `api.call` operation. Gate order: op resolution, read-only
    /// method, capability grant, target resolution, invocation.
    pub async fn call_api(&self, op_name: Option<&str>, input: &Value) -> NodeResult {
        let Some(op_name) = op_name else {
            return NodeResult::failure(ErrorCode::UnknownApiOp, "<none>");
        };
        let resolved;
        let op = match self.api_ops.get(op_name) {
            Some(op) => op,
            None => match self.providers.iter().find_map(|p| p.resolve_op(op_name)) {
                Some(op) => {
                    resolved = op;
                    &resolved
                }
                None => return NodeResult::failure(ErrorCode::UnknownApiOp, op_name),
            },
        };
        if !op.method.is_read_only() {
            return NodeResult::failure(
                ErrorCode::MethodNotAllowed,
                format!("{} {}", op.method, op_name),
            );
        }
        if let Some(capability) = &op.capability
            && !self.has_capability(capability)
        {
            return NodeResult::failure(ErrorCode::Forbidden, op_name);
        }
        let Some(target) = self.api_targets.get(&op.target) else {
            return NodeResult::failure(ErrorCode::UnknownApiTarget, op.target.clone());
        };
        debug!(op = op_name, target = %target.name, "dispatching api call");
        match op.handler.invoke(target, input, &op.meta).await {
            Ok(result) => NodeResult::success(result),
            Err(e) => NodeResult::failure(ErrorCode::ApiCallFailed, e.to_string()),
        }
    }

    /// Planner entry point: force a `route` tool call constrained to the
    /// graph's node ids (or the node's declared enums) and validate the
    /// arguments against the node's output schema.
    pub async fn plan(
        &self,
        ctx: &StepContext,
        state: &Map<String, Value>,
        graph: &Graph,
        node: &PlannerNode,
    ) -> Result<Value, PlannerError> {
        let transport = self.completions.as_ref().ok_or(PlannerError::NoTransport)?;

        let system_prompt = node.prompt.as_deref().unwrap_or(DEFAULT_PLANNER_PROMPT);
        let mut messages = vec![ChatMessage::system(system_prompt)];
        messages.extend(sanitize_transcripts(ctx.inputs.get("transcripts")));

        let tool = build_route_tool(graph, state, node)?;
        let request = CompletionRequest {
            messages,
            tools: Some(vec![tool]),
            tool_choice: Some(json!({
                "type": "function",
                "function": {"name": ROUTE_TOOL_NAME},
            })),
            ..CompletionRequest::default()
        };

        let reply = transport.complete(request).await?;
        let Some(arguments) = reply.tool_call_arguments(ROUTE_TOOL_NAME) else {
            return Err(PlannerError::NoToolCall {
                model: reply.model.clone().unwrap_or_default(),
                finish_reason: reply.finish_reason().unwrap_or_default().to_string(),
            });
        };

        if let Some(schema) = &node.output_schema {
            let compiled = JSONSchema::compile(schema)
                .map_err(|e| PlannerError::SchemaCompile(e.to_string()))?;
            if let Err(errors) = compiled.validate(&arguments) {
                let joined = errors
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(PlannerError::SchemaViolation(joined));
            }
        }
        Ok(arguments)
    }

    /// Reasoning entry point: free-text completion over a prompt and a JSON
    /// payload.
    pub async fn reason(&self, prompt: &str, input: &Value) -> Result<String, ReasoningError> {
        let transport = self
            .completions
            .as_ref()
            .ok_or(ReasoningError::NoTransport)?;

        let instruction = format!(
            "{prompt}\n\nRespond with TEXT ONLY.\n\
             Do not include JSON, markdown, or structured data.\n\
             Do not include explanations about your reasoning process."
        );
        let payload = serde_json::to_string(input).unwrap_or_else(|_| "null".to_string());
        let request = CompletionRequest {
            messages: vec![ChatMessage::user(instruction), ChatMessage::user(payload)],
            ..CompletionRequest::default()
        };

        let reply = transport.complete(request).await?;
        match reply.first_content() {
            Some(content) if !content.is_empty() => Ok(content.to_string()),
            _ => Err(ReasoningError::EmptyReply),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the single-choice `route` tool. The `next` enum comes from the
/// node's `output_schema` when it declares one, otherwise from the graph's
/// node ids; `enum_from` widens the schema with a second field whose enum is
/// drawn from a (possibly filtered) state array.
fn build_route_tool(
    graph: &Graph,
    state: &Map<String, Value>,
    node: &PlannerNode,
) -> Result<Value, PlannerError> {
    let schema_enum = node
        .output_schema
        .as_ref()
        .and_then(|s| s.get("properties"))
        .and_then(|p| p.get("next"))
        .and_then(|n| n.get("enum"))
        .and_then(Value::as_array)
        .cloned();
    let next_enum = match schema_enum {
        Some(values) if !values.is_empty() => values,
        _ => graph.node_ids().into_iter().map(Value::String).collect(),
    };

    let mut properties = Map::new();
    properties.insert("next".to_string(), json!({"type": "string", "enum": next_enum}));
    let mut required = vec![Value::String("next".to_string())];

    let schema_required = node
        .output_schema
        .as_ref()
        .and_then(|s| s.get("required"))
        .and_then(Value::as_array);
    if let (Some(enum_from), Some(schema_required)) = (&node.enum_from, schema_required) {
        let source = state.get(&enum_from.state).cloned().unwrap_or(Value::Null);
        let Value::Array(items) = source else {
            return Err(PlannerError::EnumSourceNotArray(enum_from.state.clone()));
        };
        let field = schema_required
            .iter()
            .filter_map(Value::as_str)
            .find(|k| *k != "next")
            .ok_or(PlannerError::EnumFieldMissing)?;

        let mut values: Vec<Value> = Vec::new();
        for item in &items {
            if let Some(filter) = &enum_from.filter
                && item.get(&filter.field).unwrap_or(&Value::Null) != &filter.equals
            {
                continue;
            }
            if let Some(Value::String(s)) = item.get(&enum_from.field) {
                values.push(Value::String(s.clone()));
            }
        }
        if values.is_empty() {
            return Err(PlannerError::EmptyEnum {
                field: field.to_string(),
                state: enum_from.state.clone(),
            });
        }
        properties.insert(field.to_string(), json!({"type": "string", "enum": values}));
        required.push(Value::String(field.to_string()));
    }

    Ok(json!({
        "type": "function",
        "function": {
            "name": ROUTE_TOOL_NAME,
            "description": "Select the next node and required identifiers.",
            "parameters": {
                "type": "object",
                "required": required,
                "properties": properties,
                "additionalProperties": false,
            },
        },
    }))
}

/// Keep only transcript entries with non-empty string content; anything else
/// never reaches the model.
fn sanitize_transcripts(transcripts: Option<&Value>) -> Vec<ChatMessage> {
    let Some(Value::Array(items)) = transcripts else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|entry| {
            let content = entry.get("content").and_then(Value::as_str)?;
            if content.is_empty() {
                return None;
            }
            let role = entry.get("role").and_then(Value::as_str).unwrap_or("user");
            Some(ChatMessage {
                role: role.to_string(),
                content: content.to_string(),
            })
        })
        .collect()
}
