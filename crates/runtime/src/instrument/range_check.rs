// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Numeric-range checking of operator outputs.

use super::{Liveness, OpEvent, OpObserver, Plugin};
use model_ir::GraphId;
use std::sync::{Arc, Mutex, MutexGuard};

/// An operator output whose magnitude exceeded the threshold.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RangeViolation {
    pub run: u64,
    pub operator: String,
    /// Largest |x| in the output; infinite if any value is non-finite.
    pub max_abs: f32,
    pub threshold: f32,
}

pub(crate) struct RangeChecker {
    live: Liveness,
    threshold: f32,
    violations: Mutex<Vec<RangeViolation>>,
}

impl RangeChecker {
    pub(crate) fn new(threshold: f32) -> Self {
        Self {
            live: Liveness::new(),
            threshold,
            violations: Mutex::new(Vec::new()),
        }
    }

    fn violations(&self) -> MutexGuard<'_, Vec<RangeViolation>> {
        self.violations.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl OpObserver for RangeChecker {
    fn on_op(&self, event: &OpEvent<'_>) {
        if !self.live.is_active() {
            return;
        }
        let max_abs = event.output.stats().max_abs;
        if max_abs > self.threshold {
            tracing::warn!(
                "run {}: operator '{}' output max |x| = {} exceeds {}",
                event.run,
                event.operator,
                max_abs,
                self.threshold
            );
            self.violations().push(RangeViolation {
                run: event.run,
                operator: event.operator.to_string(),
                max_abs,
                threshold: self.threshold,
            });
        }
    }
}

impl Plugin for RangeChecker {
    fn liveness(&self) -> &Liveness {
        &self.live
    }
}

/// Owning handle to an attached range checker.
#[derive(Clone)]
pub struct RangeCheckerHandle {
    graph: GraphId,
    plugin: Arc<RangeChecker>,
}

impl RangeCheckerHandle {
    pub(crate) fn new(graph: GraphId, plugin: Arc<RangeChecker>) -> Self {
        Self { graph, plugin }
    }

    pub fn graph(&self) -> GraphId {
        self.graph
    }

    pub fn threshold(&self) -> f32 {
        self.plugin.threshold
    }

    pub fn is_active(&self) -> bool {
        self.plugin.live.is_active()
    }

    pub fn violations(&self) -> Vec<RangeViolation> {
        self.plugin.violations().clone()
    }

    /// `true` when nothing out of range has been seen.
    pub fn is_clean(&self) -> bool {
        self.plugin.violations().is_empty()
    }
}

impl std::fmt::Debug for RangeCheckerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeCheckerHandle")
            .field("graph", &self.graph)
            .field("threshold", &self.plugin.threshold)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_ir::OpKind;
    use std::time::Duration;
    use tensor_core::{Shape, Tensor};

    fn observe(rc: &RangeChecker, values: &[f32]) {
        let out = Tensor::from_f32(Shape::vector(values.len()), values).unwrap();
        rc.on_op(&OpEvent {
            run: 3,
            operator: "act",
            kind: &OpKind::Relu,
            algorithm: None,
            inputs: &[],
            output: &out,
            elapsed: Duration::ZERO,
        });
    }

    #[test]
    fn test_within_range_is_clean() {
        let rc = RangeChecker::new(10.0);
        observe(&rc, &[1.0, -9.5, 10.0]);
        assert!(rc.violations().is_empty());
    }

    #[test]
    fn test_records_violation() {
        let rc = RangeChecker::new(10.0);
        observe(&rc, &[1.0, -12.0]);
        let v = rc.violations().clone();
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].operator, "act");
        assert_eq!(v[0].run, 3);
        assert_eq!(v[0].max_abs, 12.0);
    }

    #[test]
    fn test_non_finite_is_a_violation() {
        let rc = RangeChecker::new(1e30);
        observe(&rc, &[f32::NAN]);
        assert_eq!(rc.violations().len(), 1);
    }
}
