//! Traversal state machine: start/termination, routing precedence, emits.

mod common;

use agentgraph::envelope::ErrorCode;
use agentgraph::registry::Registry;
use agentgraph::runtime::run_with_registry;
use common::{graph, service_registry};
use serde_json::json;

#[tokio::test]
async fn missing_start_fails_immediately() {
    let g = graph(json!({"nodes": {"a": {"type": "terminal"}}}));
    let registry = Registry::new();
    let outcome = run_with_registry(&g, json!({}), &registry).await;
    assert!(!outcome.last.ok);
    assert_eq!(outcome.last.error_code(), Some(ErrorCode::MissingStart));
}

#[tokio::test]
async fn unknown_node_fails_with_its_id() {
    let g = graph(json!({
        "start": "a",
        "nodes": {"a": {"type": "compute", "next": "ghost"}}
    }));
    let registry = Registry::new();
    let outcome = run_with_registry(&g, json!({}), &registry).await;
    assert_eq!(outcome.last.error_code(), Some(ErrorCode::UnknownNode));
    assert_eq!(outcome.last.error.unwrap().message, "ghost");
}

#[tokio::test]
async fn compute_chain_materializes_terminal_output() {
    let g = graph(json!({
        "id": "greeter",
        "start": "greet",
        "nodes": {
            "greet": {
                "type": "compute",
                "emit": {
                    "state.greeting": {"$expr": {
                        "op": "concat",
                        "args": ["hello ", {"$ref": "inputs.name"}]
                    }}
                },
                "next": "done"
            },
            "done": {"type": "terminal", "output": {"$ref": "state.greeting"}}
        }
    }));
    let registry = Registry::new();
    let outcome = run_with_registry(&g, json!({"name": "ada"}), &registry).await;
    assert!(outcome.last.ok);
    assert_eq!(outcome.state["output"], json!("hello ada"));
    assert_eq!(outcome.last.result_value(), json!("hello ada"));
}

#[tokio::test]
async fn control_branch_picks_matching_case_then_default() {
    let make = |status: &str| {
        graph(json!({
            "start": "seed",
            "nodes": {
                "seed": {
                    "type": "compute",
                    "emit": {"state.status": {"$ref": "inputs.status"}},
                    "next": "decide"
                },
                "decide": {
                    "type": "control",
                    "condition": {
                        "op": "control.branch",
                        "cases": [{"when": {"state.status": "ok"}, "next": "success"}],
                        "default": "fallback"
                    }
                },
                "success": {"type": "terminal", "output": "went ok"},
                "fallback": {"type": "terminal", "output": "went sideways"}
            }
        }))
    };
    let registry = Registry::new();

    let ok = run_with_registry(&make("ok"), json!({"status": "ok"}), &registry).await;
    assert_eq!(ok.state["output"], json!("went ok"));

    let other = run_with_registry(&make("nope"), json!({"status": "nope"}), &registry).await;
    assert_eq!(other.state["output"], json!("went sideways"));
}

#[tokio::test]
async fn error_override_routes_failures() {
    let g = graph(json!({
        "start": "broken",
        "nodes": {
            "broken": {
                "type": "executor",
                "run": {"op": "fly"},
                "next": "never",
                "on": {"error": "recover", "ok": "never"}
            },
            "never": {"type": "terminal", "output": "unreachable"},
            "recover": {"type": "terminal", "output": "recovered"}
        }
    }));
    let registry = Registry::new();
    let outcome = run_with_registry(&g, json!({}), &registry).await;
    assert!(outcome.last.ok);
    assert_eq!(outcome.state["output"], json!("recovered"));
}

#[tokio::test]
async fn failure_without_override_stops_traversal() {
    let g = graph(json!({
        "start": "broken",
        "nodes": {
            "broken": {"type": "executor", "run": {"op": "fly"}, "next": "after"},
            "after": {"type": "terminal"}
        }
    }));
    let registry = Registry::new();
    let outcome = run_with_registry(&g, json!({}), &registry).await;
    assert!(!outcome.last.ok);
    assert_eq!(outcome.last.error_code(), Some(ErrorCode::UnknownExecutorOp));
}

#[tokio::test]
async fn dynamic_next_template_reads_own_result() {
    let g = graph(json!({
        "start": "call",
        "nodes": {
            "call": {
                "type": "executor",
                "run": {"op": "api.call", "target": "svc.echo", "input": {"goto": "east"}},
                "next": {"$ref": "result.echo.goto"}
            },
            "east": {"type": "terminal", "output": "east side"}
        }
    }));
    let registry = service_registry(-1);
    let outcome = run_with_registry(&g, json!({}), &registry).await;
    assert_eq!(outcome.state["output"], json!("east side"));
}

#[tokio::test]
async fn warning_override_routes_partial_success() {
    let g = graph(json!({
        "start": "sweep",
        "nodes": {
            "sweep": {
                "type": "loop",
                "over": [0, 1, 2],
                "execute": {
                    "op": "api.call",
                    "target": "svc.flaky",
                    "input": {"index": {"$ref": "loop.index"}}
                },
                "on_error": "continue",
                "next": "clean",
                "on": {"warning": "degraded"}
            },
            "clean": {"type": "terminal", "output": "clean"},
            "degraded": {"type": "terminal", "output": "degraded"}
        }
    }));
    let registry = service_registry(1);
    let outcome = run_with_registry(&g, json!({}), &registry).await;
    assert_eq!(outcome.state["output"], json!("degraded"));
}

#[tokio::test]
async fn cyclic_graph_stops_at_step_ceiling() {
    let g = graph(json!({
        "start": "ping",
        "nodes": {
            "ping": {"type": "compute", "next": "pong"},
            "pong": {"type": "compute", "next": "ping"}
        }
    }));
    let registry = Registry::new();
    let outcome = run_with_registry(&g, json!({}), &registry).await;
    // The ceiling stops the run without turning it into a failure.
    assert!(outcome.last.ok);
}

#[tokio::test]
async fn inputs_are_seeded_into_state() {
    let g = graph(json!({
        "start": "done",
        "nodes": {"done": {"type": "terminal", "output": {"$ref": "inputs.q"}}}
    }));
    let registry = Registry::new();
    let outcome = run_with_registry(&g, json!({"q": 42}), &registry).await;
    assert_eq!(outcome.state["inputs"], json!({"q": 42}));
    assert_eq!(outcome.state["output"], json!(42));
}

#[tokio::test]
async fn rewritten_inputs_are_visible_within_the_same_visit() {
    let g = graph(json!({
        "start": "rewrite",
        "nodes": {
            "rewrite": {
                "type": "compute",
                "emit": {
                    "state.inputs": {"flag": "updated"},
                    "state.seen": {"$ref": "inputs.flag"}
                },
                "next": "done"
            },
            "done": {"type": "terminal", "output": {"$ref": "inputs.flag"}}
        }
    }));
    let registry = Registry::new();
    let outcome = run_with_registry(&g, json!({"flag": "original"}), &registry).await;
    assert_eq!(outcome.state["seen"], json!("updated"));
    assert_eq!(outcome.state["output"], json!("updated"));
}

#[tokio::test]
async fn emit_sources_cover_payload_keys_templates_and_literals() {
    let g = graph(json!({
        "start": "call",
        "nodes": {
            "call": {
                "type": "executor",
                "run": {"op": "api.call", "target": "svc.echo", "input": {"n": 1}},
                "emit": {
                    "state.raw": "result",
                    "state.derived": {"$ref": "result.echo.n"},
                    "state.flag": true
                },
                "next": "done"
            },
            "done": {"type": "terminal"}
        }
    }));
    let registry = service_registry(-1);
    let outcome = run_with_registry(&g, json!({}), &registry).await;
    assert_eq!(outcome.state["raw"], json!({"echo": {"n": 1}}));
    assert_eq!(outcome.state["derived"], json!(1));
    assert_eq!(outcome.state["flag"], json!(true));
    assert!(outcome.state.get("output").is_none());
}
