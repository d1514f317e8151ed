// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Example: Compare execution strategies on a synthetic dense stack.
//!
//! Each strategy is compiled against the same model with the profiler
//! attached. The table shows which algorithm every selectable operator
//! ended up with, and the profiler summary shows what that cost.
//!
//! ```bash
//! cargo run -p runtime --example strategy_comparison
//! ```

use model_ir::document::{ConstDecl, GraphDocument, InputDecl, OperatorDecl};
use model_ir::{ExecutionStrategy, ModelSource};
use runtime::{ConfigureRequest, InstrumentationOptions, ModelExecutor, RuntimeConfig};
use std::sync::{Arc, Mutex};
use tensor_core::{Shape, Tensor};

const RUNS: usize = 10;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("warn").init();

    // Shapes chosen so the heuristics disagree: a long-K projection
    // favours split-K, the wide one favours tiling.
    let bytes = serde_json::to_vec(&build_document())?;

    println!(
        "{:<24} {:>10} {:>10} {:>12} {:>12}",
        "Strategy", "proj", "wide", "total", "y[0]",
    );
    println!("{}", "-".repeat(72));

    let mut summaries = Vec::new();
    for strategy in ExecutionStrategy::ALL {
        let mut exec = ModelExecutor::new(RuntimeConfig::default())?;
        exec.load(ModelSource::Bytes(bytes.clone()))?;
        let x: Vec<f32> = (0..4 * 2048).map(|i| (i % 5) as f32 * 0.1).collect();
        exec.set_input("x", Tensor::from_vec(Shape::matrix(4, 2048), x)?)?;

        let last = Arc::new(Mutex::new(0.0f32));
        let sink = Arc::clone(&last);
        exec.configure(
            ConfigureRequest::new()
                .strategy(strategy)
                .output("y", move |t| {
                    if let Ok(mut v) = sink.lock() {
                        *v = t.values()[0];
                    }
                })
                .instrumentation(InstrumentationOptions {
                    profiler: true,
                    ..Default::default()
                }),
        )?;
        exec.compile()?;
        for _ in 0..RUNS {
            exec.run()?;
            exec.wait()?;
        }

        let algo = |name: &str| {
            exec.executable()
                .and_then(|e| e.algorithm_for(name))
                .map_or("-", |a| a.name())
        };
        let y = last.lock().map(|v| *v).unwrap_or(f32::NAN);
        println!(
            "{:<24} {:>10} {:>10} {:>12} {:>12.4}",
            strategy.as_str(),
            algo("proj"),
            algo("wide"),
            algo("total"),
            y,
        );
        if let Some(profiler) = exec.profiler() {
            summaries.push((strategy, profiler.report().summary()));
        }
    }

    println!();
    for (strategy, summary) in summaries {
        println!("[{strategy}]\n{summary}");
    }
    Ok(())
}

/// `x[4x2048] @ w1[2048x8] -> relu -> @ w2[8x256] -> reduce_sum`.
fn build_document() -> GraphDocument {
    let constant = |name: &str, rows: usize, cols: usize| ConstDecl {
        name: name.into(),
        shape: Shape::matrix(rows, cols),
        values: Some((0..rows * cols).map(|i| ((i % 7) as f32 - 3.0) * 0.01).collect()),
    };
    let op = |name: &str, kind: &str, inputs: &[&str], output: &str| OperatorDecl {
        name: name.into(),
        op: kind.into(),
        inputs: inputs.iter().map(|s| s.to_string()).collect(),
        output: output.into(),
        attrs: None,
        algorithms: None,
    };
    GraphDocument {
        format_version: 1,
        name: "strategy-demo".into(),
        inputs: vec![InputDecl {
            name: "x".into(),
            shape: Shape::matrix(4, 2048),
        }],
        constants: vec![constant("w1", 2048, 8), constant("w2", 8, 256)],
        operators: vec![
            op("proj", "matmul", &["x", "w1"], "h"),
            op("act", "relu", &["h"], "a"),
            op("wide", "matmul", &["a", "w2"], "z"),
            op("total", "reduce_sum", &["z"], "y"),
        ],
        outputs: vec!["y".into()],
        testcases: Vec::new(),
    }
}
