//! Loop subsystem: ordering under concurrency, failure policies, guards,
//! and `$append` accumulation.

mod common;

use agentgraph::envelope::ErrorCode;
use agentgraph::runtime::run_with_registry;
use common::{graph, service_registry};
use serde_json::{Value, json};

fn echo_loop_graph(concurrency: usize) -> agentgraph::graph::Graph {
    graph(json!({
        "start": "sweep",
        "nodes": {
            "sweep": {
                "type": "loop",
                "over": [10, 20, 30],
                "concurrency": concurrency,
                "execute": {
                    "op": "api.call",
                    "target": "svc.echo",
                    "input": {"index": {"$ref": "loop.index"}, "item": {"$ref": "loop.item"}}
                }
            }
        }
    }))
}

#[tokio::test]
async fn sequential_and_concurrent_results_are_identical() {
    let registry = service_registry(-1);
    let sequential = run_with_registry(&echo_loop_graph(1), json!({}), &registry).await;
    let concurrent = run_with_registry(&echo_loop_graph(3), json!({}), &registry).await;

    assert!(sequential.last.ok);
    assert!(concurrent.last.ok);
    let expected = json!([
        {"echo": {"index": 0, "item": 10}},
        {"echo": {"index": 1, "item": 20}},
        {"echo": {"index": 2, "item": 30}}
    ]);
    assert_eq!(sequential.last.result_value(), expected);
    assert_eq!(concurrent.last.result_value(), expected);
}

#[tokio::test]
async fn continue_policy_collects_survivors_and_warns() {
    let g = graph(json!({
        "start": "sweep",
        "nodes": {
            "sweep": {
                "type": "loop",
                "over": [0, 1, 2],
                "on_error": "continue",
                "execute": {
                    "op": "api.call",
                    "target": "svc.flaky",
                    "input": {"index": {"$ref": "loop.index"}}
                }
            }
        }
    }));
    let registry = service_registry(1);
    let outcome = run_with_registry(&g, json!({}), &registry).await;

    assert!(outcome.last.ok);
    assert_eq!(outcome.last.result_value().as_array().map(Vec::len), Some(2));
    let warnings = outcome.last.warnings.unwrap();
    assert_eq!(warnings.failed_count, Some(1));
    assert_eq!(warnings.code, Some(ErrorCode::LoopIterationFailed));
}

#[tokio::test]
async fn stop_policy_on_first_failure_yields_empty_partials() {
    let g = graph(json!({
        "start": "sweep",
        "nodes": {
            "sweep": {
                "type": "loop",
                "over": [0, 1, 2],
                "on_error": "stop",
                "execute": {
                    "op": "api.call",
                    "target": "svc.flaky",
                    "input": {"index": {"$ref": "loop.index"}}
                }
            }
        }
    }));
    let registry = service_registry(0);
    let outcome = run_with_registry(&g, json!({}), &registry).await;

    assert!(!outcome.last.ok);
    assert_eq!(
        outcome.last.error_code(),
        Some(ErrorCode::LoopIterationFailed)
    );
    assert_eq!(outcome.last.partial_results, Some(json!([])));
    let details = outcome.last.error.unwrap().details.unwrap();
    assert_eq!(details[0]["index"], json!(0));
}

#[tokio::test]
async fn stop_policy_keeps_results_before_the_failure() {
    let g = graph(json!({
        "start": "sweep",
        "nodes": {
            "sweep": {
                "type": "loop",
                "over": [0, 1, 2],
                "concurrency": 3,
                "on_error": "stop",
                "execute": {
                    "op": "api.call",
                    "target": "svc.flaky",
                    "input": {"index": {"$ref": "loop.index"}}
                }
            }
        }
    }));
    let registry = service_registry(2);
    let outcome = run_with_registry(&g, json!({}), &registry).await;

    assert!(!outcome.last.ok);
    let partials = outcome.last.partial_results.unwrap();
    assert_eq!(partials.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn when_guard_skips_iterations() {
    let g = graph(json!({
        "start": "sweep",
        "nodes": {
            "sweep": {
                "type": "loop",
                "over": [{"active": true}, {"active": false}, {"active": true}],
                "as": "row",
                "when": {"$ref": "loop.row.active"},
                "execute": {
                    "op": "api.call",
                    "target": "svc.echo",
                    "input": {"row": {"$ref": "loop.row"}}
                }
            }
        }
    }));
    let registry = service_registry(-1);
    let outcome = run_with_registry(&g, json!({}), &registry).await;

    assert!(outcome.last.ok);
    assert_eq!(outcome.last.result_value().as_array().map(Vec::len), Some(2));
    let warnings = outcome.last.warnings.unwrap();
    assert_eq!(warnings.skipped_count, Some(1));
    assert_eq!(warnings.failed_count, None);
}

#[tokio::test]
async fn append_emits_accumulate_in_index_order() {
    let make = |concurrency: usize| {
        graph(json!({
            "start": "sweep",
            "nodes": {
                "sweep": {
                    "type": "loop",
                    "over": ["a", "b", "c"],
                    "concurrency": concurrency,
                    "execute": {
                        "op": "api.call",
                        "target": "svc.echo",
                        "input": {"item": {"$ref": "loop.item"}}
                    },
                    "emit": {
                        "state.seen": {"$append": {"$ref": "loop.item"}},
                        "state.last_result": "result"
                    },
                    "next": "done"
                },
                "done": {"type": "terminal"}
            }
        }))
    };
    let registry = service_registry(-1);

    for concurrency in [1, 3] {
        let outcome = run_with_registry(&make(concurrency), json!({}), &registry).await;
        assert!(outcome.last.ok);
        assert_eq!(outcome.state["seen"], json!(["a", "b", "c"]));
        assert_eq!(
            outcome.state["last_result"],
            json!({"echo": {"item": "c"}})
        );
    }
}

#[tokio::test]
async fn append_result_pushes_iteration_results() {
    let g = graph(json!({
        "start": "sweep",
        "nodes": {
            "sweep": {
                "type": "loop",
                "over": [1, 2],
                "execute": {
                    "op": "api.call",
                    "target": "svc.echo",
                    "input": {"item": {"$ref": "loop.item"}}
                },
                "emit": {"state.replies": {"$append": "result"}}
            }
        }
    }));
    let registry = service_registry(-1);
    let outcome = run_with_registry(&g, json!({}), &registry).await;
    assert_eq!(
        outcome.state["replies"],
        json!([{"echo": {"item": 1}}, {"echo": {"item": 2}}])
    );
}

#[tokio::test]
async fn non_array_over_is_invalid() {
    let g = graph(json!({
        "start": "sweep",
        "nodes": {
            "sweep": {
                "type": "loop",
                "over": {"$ref": "inputs.not_there"},
                "execute": {"op": "wait", "input": {"seconds": 0}}
            }
        }
    }));
    let registry = service_registry(-1);
    let outcome = run_with_registry(&g, json!({}), &registry).await;
    assert_eq!(outcome.last.error_code(), Some(ErrorCode::LoopInvalidOver));
    assert!(outcome.last.error.unwrap().message.contains("null"));
}

#[tokio::test]
async fn empty_over_yields_empty_results() {
    let g = graph(json!({
        "start": "sweep",
        "nodes": {
            "sweep": {
                "type": "loop",
                "over": [],
                "execute": {"op": "wait", "input": {"seconds": 0}}
            }
        }
    }));
    let registry = service_registry(-1);
    let outcome = run_with_registry(&g, json!({}), &registry).await;
    assert!(outcome.last.ok);
    assert_eq!(outcome.last.result_value(), Value::Array(vec![]));
    assert!(outcome.last.warnings.is_none());
}

#[tokio::test]
async fn oversized_wait_fails_the_iteration() {
    let g = graph(json!({
        "start": "sweep",
        "nodes": {
            "sweep": {
                "type": "loop",
                "over": [1],
                "on_error": "continue",
                "execute": {"op": "wait", "input": {"seconds": 1e20}}
            }
        }
    }));
    let registry = service_registry(-1);
    let outcome = run_with_registry(&g, json!({}), &registry).await;
    assert!(outcome.last.ok);
    assert_eq!(outcome.last.result_value(), json!([]));
    assert_eq!(outcome.last.warnings.unwrap().failed_count, Some(1));
}

#[tokio::test]
async fn unrepresentable_delay_disables_pacing() {
    let make = |concurrency: usize| {
        graph(json!({
            "start": "sweep",
            "nodes": {
                "sweep": {
                    "type": "loop",
                    "over": [1, 2],
                    "concurrency": concurrency,
                    "delay": 1e20,
                    "execute": {
                        "op": "api.call",
                        "target": "svc.echo",
                        "input": {"item": {"$ref": "loop.item"}}
                    }
                }
            }
        }))
    };
    let registry = service_registry(-1);
    for concurrency in [1, 3] {
        let outcome = run_with_registry(&make(concurrency), json!({}), &registry).await;
        assert!(outcome.last.ok);
        assert_eq!(outcome.last.result_value().as_array().map(Vec::len), Some(2));
    }
}

#[tokio::test]
async fn unknown_loop_op_fails_each_iteration() {
    let g = graph(json!({
        "start": "sweep",
        "nodes": {
            "sweep": {
                "type": "loop",
                "over": [1, 2],
                "on_error": "continue",
                "execute": {"op": "levitate"}
            }
        }
    }));
    let registry = service_registry(-1);
    let outcome = run_with_registry(&g, json!({}), &registry).await;
    assert!(outcome.last.ok);
    assert_eq!(outcome.last.result_value(), json!([]));
    assert_eq!(outcome.last.warnings.unwrap().failed_count, Some(2));
}
