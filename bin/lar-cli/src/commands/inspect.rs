// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `lar inspect` and `lar pack`: look at a model without running it, and
//! convert JSON documents into binary containers.

use anyhow::Context;
use model_ir::document::GraphDocument;
use model_ir::{GraphLoader, LoadConfig, ModelSource, VarKind};
use std::path::PathBuf;

use super::truncate;

pub fn execute(model: PathBuf, shared_mem: bool) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║                lar · Model Inspector                 ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let loaded = GraphLoader::load(ModelSource::Path(model.clone()), &LoadConfig { shared_mem })
        .with_context(|| format!("failed to load model from '{}'", model.display()))?;
    let graph = &loaded.graph;

    // ── Summary ────────────────────────────────────────────────
    println!("  {}", graph.summary());
    println!("  Test cases: {}", loaded.testcase_num());
    println!();

    // ── Bindings ───────────────────────────────────────────────
    println!("  Inputs:");
    for (name, tensor) in &loaded.inputs {
        println!("   {:<24} {}", truncate(name, 24), tensor.shape());
    }
    println!("  Outputs:");
    for (name, var) in &loaded.outputs {
        println!("   {:<24} {}", truncate(name, 24), graph.var(*var).shape);
    }
    let constants = graph
        .iter_vars()
        .filter(|v| matches!(v.kind, VarKind::Const(_)))
        .count();
    println!("  Constants: {constants}");
    println!();

    // ── Per-Operator Detail ────────────────────────────────────
    println!(
        "  {:<4} {:<24} {:<12} {:<14} {}",
        "Idx", "Name", "Kind", "Output", "Algorithms",
    );
    println!("  {}", "-".repeat(76));
    for op in graph.iter_ops() {
        let algorithms = if !op.kind.supports_algo_selection() {
            "-".to_string()
        } else {
            match &op.policy.algorithms {
                Some(names) => names.join(","),
                None => "any".to_string(),
            }
        };
        println!(
            "  {:<4} {:<24} {:<12} {:<14} {}",
            op.id.index(),
            truncate(&op.name, 24),
            op.kind.as_str(),
            graph.var(op.output).shape.to_string(),
            algorithms,
        );
    }
    println!();
    Ok(())
}

/// Reads a JSON graph document and writes it as a SafeTensors container.
pub fn pack(input: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&input)
        .with_context(|| format!("failed to read '{}'", input.display()))?;
    let doc: GraphDocument = serde_json::from_str(&text)
        .with_context(|| format!("'{}' is not a graph document", input.display()))?;

    // Validate before writing.
    GraphLoader::load_bytes(text.as_bytes())?;
    let bytes = GraphLoader::write_container(&doc)?;
    std::fs::write(&output, &bytes)
        .with_context(|| format!("failed to write '{}'", output.display()))?;

    println!(
        "  Packed '{}' ({} operators, {} test cases) into {} ({} bytes)",
        doc.name,
        doc.operators.len(),
        doc.testcases.len(),
        output.display(),
        bytes.len(),
    );
    Ok(())
}
