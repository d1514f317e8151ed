// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The compiled, runnable form of a graph.
//!
//! Compilation linearizes the graph into [`PlanStep`]s, resolves every
//! variable to a buffer slot, and fixes one algorithm per selectable step.
//! Slot buffers are allocated once and reused by every run. Output tensors
//! are delivered only after the whole plan has finished, so a failing run
//! never invokes a callback.

use crate::algo::{dispatch, AlgoTable, Algorithm};
use crate::instrument::{notify, OpEvent, OpObserver};
use crate::{OutputSpec, RuntimeError};
use model_ir::{graph::Validated, ExecutionStrategy, GraphId, ModelGraph, OpId, OpKind, VarKind};
use std::collections::BTreeMap;
use std::sync::Weak;
use std::time::Instant;
use tensor_core::{Shape, Tensor, TensorView};

/// One operator invocation in execution order.
#[derive(Debug, Clone)]
pub struct PlanStep {
    pub op: OpId,
    pub name: String,
    pub kind: OpKind,
    /// Slot indices of the operands.
    pub inputs: Vec<usize>,
    pub output: usize,
    pub algorithm: Option<Algorithm>,
}

/// A compiled graph, ready to launch.
pub struct AsyncExecutable {
    graph: GraphId,
    steps: Vec<PlanStep>,
    slots: Vec<Tensor>,
    input_slots: Vec<(String, usize)>,
    spec: OutputSpec,
    observers: Vec<Weak<dyn OpObserver>>,
    runs: u64,
}

impl AsyncExecutable {
    /// Selects an algorithm for every step. Operators whose policy carries
    /// no strategy fall back to `default_strategy`.
    ///
    /// # Errors
    /// [`RuntimeError::Compilation`] from algorithm selection.
    pub fn plan(
        graph: &ModelGraph<Validated>,
        default_strategy: ExecutionStrategy,
        table: &mut AlgoTable,
    ) -> Result<Vec<PlanStep>, RuntimeError> {
        let mut steps = Vec::with_capacity(graph.num_ops());
        for node in graph.iter_ops() {
            let shapes: Vec<&Shape> = node.inputs.iter().map(|&v| &graph.var(v).shape).collect();
            let strategy = node.policy.strategy.unwrap_or(default_strategy);
            let algorithm = table.select(node, &shapes, strategy)?;
            steps.push(PlanStep {
                op: node.id,
                name: node.name.clone(),
                kind: node.kind,
                inputs: node.inputs.iter().map(|v| v.index()).collect(),
                output: node.output.index(),
                algorithm,
            });
        }
        Ok(steps)
    }

    /// Builds the executable from a finished plan.
    pub fn new(
        graph: &ModelGraph<Validated>,
        steps: Vec<PlanStep>,
        spec: OutputSpec,
        observers: Vec<Weak<dyn OpObserver>>,
    ) -> Self {
        let mut slots = Vec::with_capacity(graph.num_vars());
        let mut input_slots = Vec::new();
        for var in graph.iter_vars() {
            match &var.kind {
                VarKind::Const(value) => slots.push(value.clone()),
                VarKind::Input => {
                    input_slots.push((var.name.clone(), var.id.index()));
                    slots.push(Tensor::zeros(var.shape.clone()));
                }
                VarKind::Intermediate { .. } => slots.push(Tensor::zeros(var.shape.clone())),
            }
        }
        Self {
            graph: graph.id(),
            steps,
            slots,
            input_slots,
            spec,
            observers,
            runs: 0,
        }
    }

    pub fn graph(&self) -> GraphId {
        self.graph
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Algorithm fixed for the named operator, if it is selectable.
    pub fn algorithm_for(&self, operator: &str) -> Option<Algorithm> {
        self.steps
            .iter()
            .find(|s| s.name == operator)
            .and_then(|s| s.algorithm)
    }

    /// Bound output names in delivery order.
    pub fn output_names(&self) -> Vec<&str> {
        self.spec.names()
    }

    pub fn output_spec_mut(&mut self) -> &mut OutputSpec {
        &mut self.spec
    }

    /// Gives back the output spec, consuming the executable.
    pub fn into_spec(self) -> OutputSpec {
        self.spec
    }

    /// Completed or attempted runs.
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Copies host inputs into their slots.
    pub fn bind_inputs(&mut self, inputs: &BTreeMap<String, Tensor>) {
        for (name, slot) in &self.input_slots {
            if let Some(value) = inputs.get(name) {
                self.slots[*slot].copy_from(&value.view());
            }
        }
    }

    /// Runs every step, then delivers the bound outputs.
    ///
    /// # Errors
    /// [`RuntimeError::Execution`] naming the first operator that failed.
    pub fn execute(&mut self) -> Result<(), RuntimeError> {
        self.runs += 1;
        let run = self.runs;
        let wall = Instant::now();
        notify(&self.observers, |o| o.on_run_start(run));

        let mut scratch = Tensor::scalar(0.0);
        for step in &self.steps {
            // The output slot is never an operand of its own step.
            std::mem::swap(&mut scratch, &mut self.slots[step.output]);
            let operands: Vec<TensorView<'_>> =
                step.inputs.iter().map(|&i| self.slots[i].view()).collect();

            let start = Instant::now();
            let result = dispatch(&step.kind, step.algorithm, &operands, &mut scratch);
            let elapsed = start.elapsed();

            if let Err(e) = result {
                drop(operands);
                std::mem::swap(&mut scratch, &mut self.slots[step.output]);
                tracing::error!("run {run}: operator '{}' failed: {e}", step.name);
                return Err(RuntimeError::Execution {
                    operator: step.name.clone(),
                    detail: e.to_string(),
                });
            }

            let event = OpEvent {
                run,
                operator: &step.name,
                kind: &step.kind,
                algorithm: step.algorithm,
                inputs: &operands,
                output: &scratch,
                elapsed,
            };
            notify(&self.observers, |o| o.on_op(&event));
            drop(operands);
            std::mem::swap(&mut scratch, &mut self.slots[step.output]);
        }

        let elapsed = wall.elapsed();
        notify(&self.observers, |o| o.on_run_end(run, elapsed));
        tracing::debug!("run {run}: {} steps in {:?}", self.steps.len(), elapsed);

        let slots = &self.slots;
        self.spec.deliver(|var| &slots[var.index()]);
        Ok(())
    }
}

impl std::fmt::Debug for AsyncExecutable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncExecutable")
            .field("graph", &self.graph)
            .field("steps", &self.steps.len())
            .field("outputs", &self.spec)
            .field("runs", &self.runs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Callback, OutputSpecBuilder};
    use model_ir::{GraphLoader, LoadResult};
    use std::sync::{Arc, Mutex};

    const CHAIN: &str = r#"{
        "format_version": 1, "name": "chain",
        "inputs": [{ "name": "x", "shape": [1, 2] }],
        "constants": [{ "name": "w", "shape": [2, 2], "values": [1, 0, 0, 2] }],
        "operators": [
            { "name": "mm", "op": "matmul", "inputs": ["x", "w"], "output": "h" },
            { "name": "act", "op": "relu", "inputs": ["h"], "output": "y" }
        ],
        "outputs": ["y", "h"]
    }"#;

    fn compile(m: &LoadResult, cb: Callback) -> AsyncExecutable {
        let spec = OutputSpecBuilder::new(m).build(vec![("y".into(), cb)]).unwrap();
        let steps =
            AsyncExecutable::plan(&m.graph, ExecutionStrategy::Heuristic, &mut AlgoTable::new())
                .unwrap();
        AsyncExecutable::new(&m.graph, steps, spec, Vec::new())
    }

    #[test]
    fn test_plan_fixes_algorithms() {
        let m = GraphLoader::load_bytes(CHAIN.as_bytes()).unwrap();
        let exe = compile(&m, Box::new(|_| {}));
        assert_eq!(exe.steps().len(), 2);
        assert!(exe.algorithm_for("mm").is_some());
        assert!(exe.algorithm_for("act").is_none());
        assert_eq!(exe.output_names(), ["y"]);
    }

    #[test]
    fn test_execute_delivers_after_plan() {
        let mut m = GraphLoader::load_bytes(CHAIN.as_bytes()).unwrap();
        let got = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&got);
        let mut exe = compile(&m, Box::new(move |t| sink.lock().unwrap().push(t.clone())));

        m.inputs
            .insert("x".into(), Tensor::from_f32(Shape::matrix(1, 2), &[3.0, -1.0]).unwrap());
        exe.bind_inputs(&m.inputs);
        exe.execute().unwrap();
        exe.execute().unwrap();

        let got = got.lock().unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].values(), &[3.0, 0.0]);
        assert_eq!(exe.runs(), 2);
    }

    #[test]
    fn test_failed_step_delivers_nothing() {
        let mut m = GraphLoader::load_bytes(CHAIN.as_bytes()).unwrap();
        let calls = Arc::new(Mutex::new(0));
        let c = Arc::clone(&calls);
        let mut exe = compile(&m, Box::new(move |_| *c.lock().unwrap() += 1));

        m.inputs.insert("x".into(), Tensor::zeros(Shape::matrix(1, 3)));
        exe.bind_inputs(&m.inputs);
        let err = exe.execute().unwrap_err();
        assert!(matches!(err, RuntimeError::Execution { ref operator, .. } if operator == "mm"));
        assert_eq!(*calls.lock().unwrap(), 0);
    }
}
