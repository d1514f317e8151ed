// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Computation graph: an arena of variable and operator nodes.
//!
//! # Type-State Pattern
//!
//! ```text
//! ModelGraph<Loaded>    : nodes being added, shapes inferred per node.
//!       │  .validate()
//!       ▼
//! ModelGraph<Validated> : structure frozen; only execution policies
//!                          may change, and only while unsealed.
//! ```
//!
//! Nodes reference each other through [`VarId`] / [`OpId`] indices into the
//! arena, never through pointers. Operators can only consume variables that
//! already exist, so insertion order is a valid topological order.
//!
//! Sealing is a runtime flag rather than a third type state: the executor
//! seals the graph it owns when it compiles and unseals it on reset.

use crate::{ExecutionPolicy, ModelError, OpKind};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tensor_core::{Shape, Tensor};

/// Largest element count a graph tensor may declare (4 GiB of `f32`).
pub const MAX_TENSOR_ELEMENTS: usize = 1 << 30;

// ── Type-state markers ─────────────────────────────────────────────

/// Marker: graph is under construction.
#[derive(Debug, Clone)]
pub struct Loaded;

/// Marker: graph structure has been checked and frozen.
#[derive(Debug, Clone)]
pub struct Validated;

/// Sealed trait for graph states.
pub trait GraphState: fmt::Debug {}
impl GraphState for Loaded {}
impl GraphState for Validated {}

// ── Identifiers ────────────────────────────────────────────────────

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a graph. Instrumentation handles use it to
/// refer back to the graph they observe without owning it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphId(u64);

impl GraphId {
    fn next() -> Self {
        Self(NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph#{}", self.0)
    }
}

/// Index of a variable node in its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Index of an operator node in its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(usize);

impl OpId {
    pub fn index(self) -> usize {
        self.0
    }
}

// ── Nodes ──────────────────────────────────────────────────────────

/// Where a variable's value comes from.
#[derive(Debug, Clone)]
pub enum VarKind {
    /// Fed by the host before each run.
    Input,
    /// Baked into the model.
    Const(Tensor),
    /// Written by an operator.
    Intermediate { producer: OpId },
}

#[derive(Debug, Clone)]
pub struct VarNode {
    pub id: VarId,
    pub name: String,
    pub shape: Shape,
    pub kind: VarKind,
}

#[derive(Debug, Clone)]
pub struct OpNode {
    pub id: OpId,
    pub name: String,
    pub kind: OpKind,
    pub inputs: Vec<VarId>,
    pub output: VarId,
    pub policy: ExecutionPolicy,
}

// ── ModelGraph ─────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ModelGraph<S: GraphState = Loaded> {
    id: GraphId,
    name: String,
    vars: Vec<VarNode>,
    ops: Vec<OpNode>,
    var_index: HashMap<String, VarId>,
    op_index: HashMap<String, OpId>,
    sealed: bool,
    _state: std::marker::PhantomData<S>,
}

// ── Loaded state ───────────────────────────────────────────────────

impl ModelGraph<Loaded> {
    /// Creates an empty graph in the `Loaded` state.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: GraphId::next(),
            name: name.into(),
            vars: Vec::new(),
            ops: Vec::new(),
            var_index: HashMap::new(),
            op_index: HashMap::new(),
            sealed: false,
            _state: std::marker::PhantomData,
        }
    }

    /// Declares a host-fed input variable.
    pub fn add_input(&mut self, name: &str, shape: Shape) -> Result<VarId, ModelError> {
        self.push_var(name, shape, VarKind::Input)
    }

    /// Declares a constant baked into the model.
    pub fn add_const(&mut self, name: &str, value: Tensor) -> Result<VarId, ModelError> {
        let shape = value.shape().clone();
        self.push_var(name, shape, VarKind::Const(value))
    }

    /// Appends an operator reading existing variables `inputs` and
    /// producing a new variable named `output`. The output shape is
    /// inferred immediately.
    pub fn add_op(
        &mut self,
        name: &str,
        kind: OpKind,
        inputs: &[&str],
        output: &str,
    ) -> Result<OpId, ModelError> {
        if self.op_index.contains_key(name) {
            return Err(ModelError::malformed(format!("duplicate operator name '{name}'")));
        }

        let mut input_ids = Vec::with_capacity(inputs.len());
        for input in inputs {
            let id = self.var_by_name(input).ok_or_else(|| {
                ModelError::malformed(format!(
                    "operator '{name}' reads undefined tensor '{input}'"
                ))
            })?;
            input_ids.push(id);
        }

        let shapes: Vec<&Shape> = input_ids.iter().map(|&v| &self.vars[v.0].shape).collect();
        let out_shape = kind
            .infer_shape(&shapes)
            .map_err(|detail| ModelError::malformed(format!("operator '{name}': {detail}")))?;

        let op_id = OpId(self.ops.len());
        let out_id = self.push_var(output, out_shape, VarKind::Intermediate { producer: op_id })?;
        self.ops.push(OpNode {
            id: op_id,
            name: name.to_string(),
            kind,
            inputs: input_ids,
            output: out_id,
            policy: ExecutionPolicy::default(),
        });
        self.op_index.insert(name.to_string(), op_id);
        Ok(op_id)
    }

    /// Restricts an algorithm-selectable operator to the named algorithms.
    /// Names are checked against the algorithm tables at compile time.
    pub fn restrict_algorithms(&mut self, op: OpId, names: Vec<String>) -> Result<(), ModelError> {
        let node = &mut self.ops[op.0];
        if !node.kind.supports_algo_selection() {
            return Err(ModelError::malformed(format!(
                "operator '{}' ({}) has no algorithm choice",
                node.name, node.kind
            )));
        }
        node.policy.algorithms = Some(names);
        Ok(())
    }

    /// Validates the graph and transitions to the `Validated` state.
    ///
    /// # Checks
    /// - The graph contains at least one operator.
    /// - No variable has a zero-element shape.
    pub fn validate(self) -> Result<ModelGraph<Validated>, ModelError> {
        if self.ops.is_empty() {
            return Err(ModelError::malformed(format!(
                "model graph '{}' contains no operators",
                self.name
            )));
        }

        for var in &self.vars {
            if var.shape.num_elements() == 0 {
                return Err(ModelError::malformed(format!(
                    "tensor '{}' has zero elements (shape {})",
                    var.name, var.shape
                )));
            }
        }

        for var in self.vars.iter().filter(|v| matches!(v.kind, VarKind::Input)) {
            if !self.ops.iter().any(|op| op.inputs.contains(&var.id)) {
                tracing::warn!("input '{}' is not read by any operator", var.name);
            }
        }

        Ok(ModelGraph {
            id: self.id,
            name: self.name,
            vars: self.vars,
            ops: self.ops,
            var_index: self.var_index,
            op_index: self.op_index,
            sealed: false,
            _state: std::marker::PhantomData,
        })
    }

    fn push_var(&mut self, name: &str, shape: Shape, kind: VarKind) -> Result<VarId, ModelError> {
        if self.var_index.contains_key(name) {
            return Err(ModelError::malformed(format!("duplicate tensor name '{name}'")));
        }
        match shape.checked_num_elements() {
            Some(n) if n <= MAX_TENSOR_ELEMENTS => {}
            _ => {
                return Err(ModelError::malformed(format!(
                    "tensor '{name}' shape {shape} exceeds {MAX_TENSOR_ELEMENTS} elements"
                )))
            }
        }
        let id = VarId(self.vars.len());
        self.vars.push(VarNode {
            id,
            name: name.to_string(),
            shape,
            kind,
        });
        self.var_index.insert(name.to_string(), id);
        Ok(id)
    }
}

// ── Validated state ────────────────────────────────────────────────

impl ModelGraph<Validated> {
    /// Whether a compile has frozen the execution policies.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn unseal(&mut self) {
        self.sealed = false;
    }

    /// Policy slots of every algorithm-selectable operator, paired with the
    /// operator name. Returns `None` once the graph is sealed.
    pub fn policies_mut(
        &mut self,
    ) -> Option<impl Iterator<Item = (&str, &mut ExecutionPolicy)> + '_> {
        if self.sealed {
            return None;
        }
        Some(
            self.ops
                .iter_mut()
                .filter(|op| op.kind.supports_algo_selection())
                .map(|op| (op.name.as_str(), &mut op.policy)),
        )
    }

    /// Operators in execution order.
    pub fn iter_ops(&self) -> impl Iterator<Item = &OpNode> {
        self.ops.iter()
    }

    pub fn op(&self, id: OpId) -> &OpNode {
        &self.ops[id.0]
    }

    pub fn op_by_name(&self, name: &str) -> Option<OpId> {
        self.op_index.get(name).copied()
    }

    /// Returns a summary string describing the graph.
    pub fn summary(&self) -> String {
        let selectable = self
            .ops
            .iter()
            .filter(|op| op.kind.supports_algo_selection())
            .count();
        let inputs = self
            .vars
            .iter()
            .filter(|v| matches!(v.kind, VarKind::Input))
            .count();
        format!(
            "Graph '{}': {} operators ({} algorithm-selectable), {} tensors, {} inputs",
            self.name,
            self.ops.len(),
            selectable,
            self.vars.len(),
            inputs,
        )
    }
}

// ── Shared implementations ─────────────────────────────────────────

impl<S: GraphState> ModelGraph<S> {
    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_ops(&self) -> usize {
        self.ops.len()
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn var(&self, id: VarId) -> &VarNode {
        &self.vars[id.0]
    }

    pub fn var_by_name(&self, name: &str) -> Option<VarId> {
        self.var_index.get(name).copied()
    }

    pub fn iter_vars(&self) -> impl Iterator<Item = &VarNode> {
        self.vars.iter()
    }
}

impl<S: GraphState> fmt::Display for ModelGraph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ModelGraph '{}' ({} operators):", self.name, self.ops.len())?;
        for op in &self.ops {
            let inputs: Vec<&str> = op.inputs.iter().map(|&v| self.vars[v.0].name.as_str()).collect();
            let out = &self.vars[op.output.0];
            writeln!(
                f,
                "  {:<16} {:<10} ({}) -> {} {}",
                op.name,
                op.kind,
                inputs.join(", "),
                out.name,
                out.shape,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: `y = reduce_sum(x @ w)`.
    fn make_graph() -> ModelGraph<Loaded> {
        let mut g = ModelGraph::new("mlp");
        g.add_input("x", Shape::matrix(2, 3)).unwrap();
        g.add_const("w", Tensor::zeros(Shape::matrix(3, 4))).unwrap();
        g.add_op("mm", OpKind::MatMul, &["x", "w"], "h").unwrap();
        g.add_op("act", OpKind::Relu, &["h"], "a").unwrap();
        g.add_op("sum", OpKind::ReduceSum, &["a"], "y").unwrap();
        g
    }

    #[test]
    fn test_validate_ok() {
        let g = make_graph().validate().unwrap();
        assert_eq!(g.num_ops(), 3);
        assert_eq!(g.num_vars(), 5);
        let y = g.var_by_name("y").unwrap();
        assert_eq!(g.var(y).shape, Shape::vector(2));
    }

    #[test]
    fn test_validate_empty() {
        let mut g = ModelGraph::new("empty");
        g.add_input("x", Shape::vector(2)).unwrap();
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_validate_zero_shape() {
        let mut g = ModelGraph::new("zero");
        g.add_input("x", Shape::new(vec![0, 4])).unwrap();
        g.add_op("r", OpKind::Relu, &["x"], "y").unwrap();
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_oversized_shapes_rejected() {
        let mut g = ModelGraph::new("huge");
        let err = g
            .add_input("x", Shape::new(vec![1 << 32, 1 << 32]))
            .unwrap_err();
        assert!(matches!(err, ModelError::Deserialization(_)));
        assert!(g.add_input("y", Shape::vector(MAX_TENSOR_ELEMENTS + 1)).is_err());

        // An inferred operator output is gated the same way.
        g.add_input("a", Shape::matrix(1 << 16, 1)).unwrap();
        g.add_input("b", Shape::matrix(1, 1 << 16)).unwrap();
        let err = g.add_op("mm", OpKind::MatMul, &["a", "b"], "c").unwrap_err();
        assert!(err.to_string().contains("'c'"));
    }

    #[test]
    fn test_dangling_input_rejected() {
        let mut g = ModelGraph::new("bad");
        let err = g.add_op("r", OpKind::Relu, &["missing"], "y").unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut g = make_graph();
        assert!(g.add_input("x", Shape::vector(1)).is_err());
        assert!(g.add_op("mm", OpKind::Relu, &["x"], "z").is_err());
    }

    #[test]
    fn test_shape_inference_failure() {
        let mut g = ModelGraph::new("bad");
        g.add_input("a", Shape::matrix(2, 3)).unwrap();
        g.add_input("b", Shape::matrix(2, 3)).unwrap();
        let err = g.add_op("mm", OpKind::MatMul, &["a", "b"], "c").unwrap_err();
        assert!(matches!(err, ModelError::Deserialization(_)));
    }

    #[test]
    fn test_restrict_algorithms_only_on_selectable() {
        let mut g = make_graph();
        let mm = OpId(0);
        let act = OpId(1);
        g.restrict_algorithms(mm, vec!["tiled".into()]).unwrap();
        assert!(g.restrict_algorithms(act, vec!["tiled".into()]).is_err());
    }

    #[test]
    fn test_policies_mut_skips_plain_ops_and_respects_seal() {
        let mut g = make_graph().validate().unwrap();
        let names: Vec<String> = g
            .policies_mut()
            .unwrap()
            .map(|(name, _)| name.to_string())
            .collect();
        assert_eq!(names, ["mm", "sum"]);

        g.seal();
        assert!(g.policies_mut().is_none());
        g.unseal();
        assert!(g.policies_mut().is_some());
    }

    #[test]
    fn test_graph_ids_are_unique() {
        let a = make_graph();
        let b = make_graph();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_summary_and_display() {
        let g = make_graph().validate().unwrap();
        assert!(g.summary().contains("3 operators (2 algorithm-selectable)"));
        let display = format!("{g}");
        assert!(display.contains("mm"));
        assert!(display.contains("reduce_sum"));
    }
}
