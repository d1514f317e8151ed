// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: end-to-end executor lifecycle.
//!
//! These tests drive the complete flow from model bytes → load → configure
//! → compile → run/wait → callbacks, proving that the three crates compose
//! correctly and that every illegal transition is rejected without
//! changing state.

use model_ir::{
    document::GraphDocument, ExecutionStrategy, GraphLoader, ModelError, ModelSource,
};
use runtime::{
    Algorithm, ConfigureRequest, ExecutorState, InstrumentationOptions, Launch, ModelExecutor,
    RuntimeConfig, RuntimeError, StrategyStore,
};
use std::sync::{Arc, Mutex};
use tensor_core::{MatMulAlgo, Shape, Tensor};

// ── Helpers ────────────────────────────────────────────────────

/// `y = a + b`, two inputs and one output.
const ADD: &str = r#"{
    "format_version": 1, "name": "add",
    "inputs": [{ "name": "a", "shape": [2, 2] }, { "name": "b", "shape": [2, 2] }],
    "operators": [{ "name": "sum", "op": "add", "inputs": ["a", "b"], "output": "y" }],
    "outputs": ["y"]
}"#;

/// `h = x @ w`, `y = relu(h)`, `s = reduce_sum(y)`, `u = add_update(s, 1)`,
/// with three bundled test cases.
const MLP: &str = r#"{
    "format_version": 1, "name": "mlp",
    "inputs": [{ "name": "x", "shape": [1, 3] }],
    "constants": [
        { "name": "w", "shape": [3, 2], "values": [1, -1, 2, 0, 0, 3] },
        { "name": "one", "shape": [], "values": [1] }
    ],
    "operators": [
        { "name": "proj", "op": "matmul", "inputs": ["x", "w"], "output": "h" },
        { "name": "act", "op": "relu", "inputs": ["h"], "output": "y" },
        { "name": "total", "op": "reduce_sum", "inputs": ["y"], "output": "s" },
        { "name": "bump", "op": "add_update", "inputs": ["s", "one"], "output": "u",
          "attrs": { "alpha": 2.0 } }
    ],
    "outputs": ["y", "s", "u"],
    "testcases": [
        { "x": { "shape": [1, 3], "values": [1, 0, 0] } },
        { "x": { "shape": [1, 3], "values": [0, 1, 0] } },
        { "x": { "shape": [1, 3], "values": [0, 0, 1] } }
    ]
}"#;

/// `y = relu(x @ w)` without bundled test cases.
const PROJ: &str = r#"{
    "format_version": 1, "name": "proj",
    "inputs": [{ "name": "x", "shape": [1, 3] }],
    "constants": [{ "name": "w", "shape": [3, 2], "values": [1, 0, 0, 1, 1, 1] }],
    "operators": [
        { "name": "proj", "op": "matmul", "inputs": ["x", "w"], "output": "h" },
        { "name": "act", "op": "relu", "inputs": ["h"], "output": "y" }
    ],
    "outputs": ["y"]
}"#;

fn executor() -> ModelExecutor {
    ModelExecutor::new(RuntimeConfig {
        num_threads: Some(2),
        ..Default::default()
    })
    .unwrap()
}

fn loaded(model: &str) -> ModelExecutor {
    let mut e = executor();
    e.load(ModelSource::Bytes(model.as_bytes().to_vec())).unwrap();
    e
}

type Sink = Arc<Mutex<Vec<(String, Vec<f32>)>>>;

/// Request that records `(name, values)` for each output, in call order.
fn recording(names: &[&str], sink: &Sink) -> ConfigureRequest {
    names.iter().fold(ConfigureRequest::new(), |req, &name| {
        let sink = Arc::clone(sink);
        let label = name.to_string();
        req.output(name, move |t: &Tensor| {
            sink.lock()
                .unwrap()
                .push((label.clone(), t.values().to_vec()))
        })
    })
}

fn matrix(rows: usize, cols: usize, values: &[f32]) -> Tensor {
    Tensor::from_f32(Shape::matrix(rows, cols), values).unwrap()
}

// ── Scenarios ──────────────────────────────────────────────────

#[test]
fn test_two_inputs_one_output() {
    let mut e = loaded(ADD);
    e.set_input("a", matrix(2, 2, &[1.0, 2.0, 3.0, 4.0])).unwrap();
    e.set_input("b", matrix(2, 2, &[10.0, 20.0, 30.0, 40.0])).unwrap();

    let sink = Sink::default();
    e.configure(recording(&["y"], &sink)).unwrap();
    e.compile().unwrap();
    assert_eq!(e.run().unwrap(), Launch::Started { testcase: None });
    e.wait().unwrap();

    let got = sink.lock().unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0], ("y".to_string(), vec![11.0, 22.0, 33.0, 44.0]));
    assert_eq!(e.state(), ExecutorState::Completed);
}

#[test]
fn test_malformed_bytes_leave_executor_unloaded() {
    let mut e = executor();
    let err = e
        .load(ModelSource::Bytes(b"\x07not a model".to_vec()))
        .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Load(ModelError::Deserialization(_))
    ));
    assert_eq!(e.state(), ExecutorState::Unloaded);

    // A later valid load still works.
    e.load(ModelSource::Bytes(ADD.as_bytes().to_vec())).unwrap();
    assert_eq!(e.state(), ExecutorState::Loaded);
}

#[test]
fn test_oversized_declared_shape_leaves_executor_unloaded() {
    let mut e = executor();
    let model = ADD.replacen("[2, 2]", "[4294967296, 4294967296]", 1);
    let err = e.load(ModelSource::Bytes(model.into_bytes())).unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Load(ModelError::Deserialization(_))
    ));
    assert_eq!(e.state(), ExecutorState::Unloaded);
}

#[test]
fn test_callbacks_fire_in_output_spec_order() {
    let mut e = loaded(MLP);
    let sink = Sink::default();
    e.configure(recording(&["u", "y", "s"], &sink)).unwrap();
    e.compile().unwrap();
    e.run().unwrap();
    e.wait().unwrap();

    let got = sink.lock().unwrap();
    let order: Vec<&str> = got.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(order, ["u", "y", "s"]);
    // x = [1, 0, 0]: h = [1, -1], y = [1, 0], s = [1], u = 2*1 + 1 = 3.
    assert_eq!(got[1].1, vec![1.0, 0.0]);
    assert_eq!(got[2].1, vec![1.0]);
    assert_eq!(got[0].1, vec![3.0]);
}

#[test]
fn test_compile_is_idempotent() {
    let mut e = loaded(MLP);
    e.configure(
        ConfigureRequest::new()
            .strategy(ExecutionStrategy::HeuristicReproducible)
            .output("s", |_| {})
            .output("y", |_| {}),
    )
    .unwrap();
    e.compile().unwrap();
    let first = e.executable().unwrap();
    let names: Vec<String> = first.output_names().iter().map(|s| s.to_string()).collect();
    let algos: Vec<Option<Algorithm>> = first.steps().iter().map(|s| s.algorithm).collect();

    e.compile().unwrap();
    let second = e.executable().unwrap();
    assert_eq!(second.output_names(), names);
    let again: Vec<Option<Algorithm>> = second.steps().iter().map(|s| s.algorithm).collect();
    assert_eq!(again, algos);
    assert_eq!(e.state(), ExecutorState::Compiled);
}

#[test]
fn test_unknown_and_duplicate_outputs_rejected() {
    let mut e = loaded(MLP);
    let err = e
        .configure(ConfigureRequest::new().output("y", |_| {}).output("h", |_| {}))
        .unwrap_err();
    assert!(matches!(err, RuntimeError::UnknownOutput { name } if name == "h"));

    let err = e
        .configure(ConfigureRequest::new().output("y", |_| {}).output("y", |_| {}))
        .unwrap_err();
    assert!(matches!(err, RuntimeError::DuplicateOutput { name } if name == "y"));
    assert_eq!(e.state(), ExecutorState::Loaded);
}

#[test]
fn test_wait_before_run_is_invalid() {
    let mut e = loaded(ADD);
    e.configure(ConfigureRequest::new().output("y", |_| {})).unwrap();
    e.compile().unwrap();
    let err = e.wait().unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::InvalidState { state: ExecutorState::Compiled, .. }
    ));
    assert_eq!(e.state(), ExecutorState::Compiled);
}

#[test]
fn test_run_twice_without_wait_is_invalid() {
    let mut e = loaded(ADD);
    e.configure(ConfigureRequest::new().output("y", |_| {})).unwrap();
    e.compile().unwrap();
    e.run().unwrap();
    let err = e.run().unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::InvalidState { state: ExecutorState::Running, .. }
    ));
    e.wait().unwrap();
    assert_eq!(e.state(), ExecutorState::Completed);
}

#[test]
fn test_test_cases_consumed_then_exhausted() {
    let mut e = loaded(MLP);
    assert_eq!(e.testcase_num(), 3);
    let sink = Sink::default();
    e.configure(recording(&["s"], &sink)).unwrap();
    e.compile().unwrap();

    for i in 0..3 {
        assert_eq!(e.run().unwrap(), Launch::Started { testcase: Some(i) });
        e.wait().unwrap();
    }
    assert_eq!(e.run().unwrap(), Launch::Exhausted);
    assert_eq!(e.state(), ExecutorState::Completed);

    // Case sums: x picks one row of w, relu, then sum.
    let sums: Vec<f32> = sink.lock().unwrap().iter().map(|(_, v)| v[0]).collect();
    assert_eq!(sums, [1.0, 2.0, 3.0]);

    e.reset_test_cases();
    assert_eq!(e.run().unwrap(), Launch::Started { testcase: Some(0) });
    e.wait().unwrap();
}

#[test]
fn test_range_checker_does_not_change_results() {
    let run_once = |opts: InstrumentationOptions| {
        let mut e = loaded(MLP);
        let sink = Sink::default();
        e.configure(recording(&["y", "s", "u"], &sink).instrumentation(opts))
            .unwrap();
        e.compile().unwrap();
        for _ in 0..3 {
            e.run().unwrap();
            e.wait().unwrap();
        }
        let violations = e.range_checker().map(|h| h.violations().len());
        let values = sink.lock().unwrap().clone();
        (values, violations)
    };

    let (plain, none) = run_once(InstrumentationOptions::default());
    let (checked, found) = run_once(InstrumentationOptions {
        range_check: Some(1.5),
        ..Default::default()
    });
    assert_eq!(plain, checked);
    assert_eq!(none, None);
    // Values above 1.5 appear in cases 2 and 3 (y, s, u) and case 1 (u).
    assert!(found.unwrap() > 0);
}

#[test]
fn test_profiler_reports_every_operator() {
    let mut e = loaded(MLP);
    e.configure(
        ConfigureRequest::new()
            .output("u", |_| {})
            .instrumentation(InstrumentationOptions {
                profiler: true,
                io_dump: true,
                ..Default::default()
            }),
    )
    .unwrap();
    e.compile().unwrap();
    e.run().unwrap();
    e.wait().unwrap();
    e.run().unwrap();
    e.wait().unwrap();

    let report = e.profiler().unwrap().report();
    assert_eq!(report.runs, 2);
    let ops: Vec<&str> = report.operators.iter().map(|o| o.operator.as_str()).collect();
    assert_eq!(ops, ["proj", "act", "total", "bump"]);
    assert!(report.operators.iter().all(|o| o.calls == 2));
    assert!(report.operator("proj").unwrap().algorithm.is_some());
    assert!(report.operator("act").unwrap().algorithm.is_none());

    let records = e.io_dump().unwrap().records();
    assert_eq!(records.len(), 8);
    assert_eq!(records[0].operator, "proj");
    assert_eq!(records[0].shape, Shape::matrix(1, 2));

    let path = std::env::temp_dir().join("lar_integration_profile.json");
    e.profiler().unwrap().flush(&path).unwrap();
    assert!(std::fs::read_to_string(&path).unwrap().contains("\"proj\""));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_detached_profiler_stops_recording() {
    let mut e = loaded(ADD);
    e.configure(
        ConfigureRequest::new()
            .output("y", |_| {})
            .instrumentation(InstrumentationOptions {
                profiler: true,
                ..Default::default()
            }),
    )
    .unwrap();
    e.compile().unwrap();
    let kept = e.profiler().cloned().unwrap();
    e.run().unwrap();
    e.wait().unwrap();
    assert_eq!(kept.report().runs, 1);

    // Dropping every handle detaches the plugin; runs still succeed.
    drop(e.detach_profiler());
    drop(kept);
    assert!(e.profiler().is_none());
    e.run().unwrap();
    e.wait().unwrap();
}

#[test]
fn test_old_handle_inert_after_reset() {
    let opts = InstrumentationOptions {
        profiler: true,
        ..Default::default()
    };
    let mut e = loaded(ADD);
    e.configure(ConfigureRequest::new().output("y", |_| {}).instrumentation(opts))
        .unwrap();
    e.compile().unwrap();
    let old = e.profiler().cloned().unwrap();
    e.run().unwrap();
    e.wait().unwrap();

    e.reset().unwrap();
    assert!(!old.is_active());
    e.configure(ConfigureRequest::new().output("y", |_| {}).instrumentation(opts))
        .unwrap();
    e.compile().unwrap();
    e.run().unwrap();
    e.wait().unwrap();

    assert!(!old.is_active());
    assert_eq!(old.report().runs, 1);
    assert!(e.profiler().unwrap().is_active());
    assert_eq!(e.profiler().unwrap().report().runs, 1);
}

#[test]
fn test_reconfigure_without_plugin_retires_it() {
    let mut e = loaded(ADD);
    e.configure(
        ConfigureRequest::new()
            .output("y", |_| {})
            .instrumentation(InstrumentationOptions {
                range_check: Some(0.5),
                ..Default::default()
            }),
    )
    .unwrap();
    let old = e.range_checker().cloned().unwrap();

    e.configure(ConfigureRequest::new().output("y", |_| {})).unwrap();
    assert!(e.range_checker().is_none());
    assert!(!old.is_active());

    e.set_input("a", matrix(2, 2, &[9.0; 4])).unwrap();
    e.compile().unwrap();
    e.run().unwrap();
    e.wait().unwrap();
    assert!(old.violations().is_empty());
}

#[test]
fn test_strategy_rejected_on_sealed_graph() {
    let mut loaded = GraphLoader::load_bytes(MLP.as_bytes()).unwrap();
    let store = StrategyStore::new(ExecutionStrategy::Profile);
    assert_eq!(store.apply(&mut loaded.graph).unwrap(), 2);
    loaded.graph.seal();
    assert!(matches!(
        store.apply(&mut loaded.graph),
        Err(RuntimeError::InvalidState { .. })
    ));
}

#[test]
fn test_reproducible_strategy_without_candidates_fails_compile() {
    let model = MLP.replace(
        r#""output": "h" }"#,
        r#""output": "h", "algorithms": ["split_k"] }"#,
    );
    let mut e = loaded(&model);
    e.configure(
        ConfigureRequest::new()
            .strategy(ExecutionStrategy::ProfileReproducible)
            .output("y", |_| {}),
    )
    .unwrap();
    let err = e.compile().unwrap_err();
    match err {
        RuntimeError::Compilation {
            strategy, operator, ..
        } => {
            assert_eq!(strategy, ExecutionStrategy::ProfileReproducible);
            assert_eq!(operator, "proj");
        }
        other => panic!("expected compilation error, got {other}"),
    }
    assert_eq!(e.state(), ExecutorState::Configured);

    // The non-reproducible variant of the same strategy compiles.
    e.configure(
        ConfigureRequest::new()
            .strategy(ExecutionStrategy::Profile)
            .output("y", |_| {}),
    )
    .unwrap();
    e.compile().unwrap();
    assert_eq!(
        e.executable().unwrap().algorithm_for("proj"),
        Some(Algorithm::MatMul(MatMulAlgo::SplitK))
    );
}

#[test]
fn test_execution_fault_moves_to_error() {
    let mut e = loaded(PROJ);
    let calls = Arc::new(Mutex::new(0));
    let c = Arc::clone(&calls);
    e.configure(ConfigureRequest::new().output("y", move |_| *c.lock().unwrap() += 1))
        .unwrap();
    e.compile().unwrap();
    e.set_input("x", matrix(1, 4, &[1.0, 2.0, 3.0, 4.0])).unwrap();
    e.run().unwrap();
    let err = e.wait().unwrap_err();
    assert!(matches!(err, RuntimeError::Execution { ref operator, .. } if operator == "proj"));
    assert_eq!(e.state(), ExecutorState::Error);
    assert_eq!(*calls.lock().unwrap(), 0);

    // Error is absorbing.
    assert!(matches!(e.run(), Err(RuntimeError::InvalidState { .. })));
    assert!(matches!(e.reset(), Err(RuntimeError::InvalidState { .. })));
    assert!(matches!(e.compile(), Err(RuntimeError::InvalidState { .. })));
    assert_eq!(e.state(), ExecutorState::Error);
}

#[test]
fn test_set_output_callbacks_after_compile() {
    let mut e = loaded(ADD);
    let first = Arc::new(Mutex::new(0));
    let second = Arc::new(Mutex::new(0));
    let f = Arc::clone(&first);
    e.configure(ConfigureRequest::new().output("y", move |_| *f.lock().unwrap() += 1))
        .unwrap();
    e.compile().unwrap();
    e.run().unwrap();
    e.wait().unwrap();

    let s = Arc::clone(&second);
    e.set_output_callbacks(vec![Box::new(move |_| *s.lock().unwrap() += 1)])
        .unwrap();
    e.run().unwrap();
    e.wait().unwrap();
    assert_eq!(*first.lock().unwrap(), 1);
    assert_eq!(*second.lock().unwrap(), 1);
}

#[test]
fn test_container_from_config_with_shared_mem() {
    let dir = std::env::temp_dir().join("lar_integration_container");
    std::fs::create_dir_all(&dir).unwrap();
    let model_path = dir.join("mlp.lar");
    let doc: GraphDocument = serde_json::from_str(MLP).unwrap();
    std::fs::write(&model_path, GraphLoader::write_container(&doc).unwrap()).unwrap();

    let config_path = dir.join("runtime.toml");
    std::fs::write(
        &config_path,
        format!(
            "model_path = {:?}\ndefault_strategy = \"profile-reproducible\"\nshared_mem = true\nnum_threads = 2\n",
            model_path.display().to_string()
        ),
    )
    .unwrap();

    let config = RuntimeConfig::from_file(&config_path).unwrap();
    let mut e = ModelExecutor::new(config).unwrap();
    e.load_configured().unwrap();
    assert_eq!(e.testcase_num(), 3);

    let sink = Sink::default();
    e.configure(recording(&["u"], &sink)).unwrap();
    assert_eq!(e.strategy(), ExecutionStrategy::ProfileReproducible);
    e.compile().unwrap();
    assert!(e
        .executable()
        .unwrap()
        .steps()
        .iter()
        .filter_map(|s| s.algorithm)
        .all(|a| a.is_reproducible()));

    while let Launch::Started { .. } = e.run().unwrap() {
        e.wait().unwrap();
    }
    let us: Vec<f32> = sink.lock().unwrap().iter().map(|(_, v)| v[0]).collect();
    assert_eq!(us, [3.0, 5.0, 7.0]);

    let _ = std::fs::remove_dir_all(&dir);
}
