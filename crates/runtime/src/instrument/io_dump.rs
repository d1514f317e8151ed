// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operator I/O summaries: one record per operator execution.

use super::{Liveness, OpEvent, OpObserver, Plugin};
use model_ir::GraphId;
use std::sync::{Arc, Mutex, MutexGuard};
use tensor_core::Shape;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct IoRecord {
    pub run: u64,
    pub operator: String,
    pub input_shapes: Vec<Shape>,
    pub shape: Shape,
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

pub(crate) struct IoDump {
    live: Liveness,
    records: Mutex<Vec<IoRecord>>,
}

impl IoDump {
    pub(crate) fn new() -> Self {
        Self {
            live: Liveness::new(),
            records: Mutex::new(Vec::new()),
        }
    }

    fn records(&self) -> MutexGuard<'_, Vec<IoRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl OpObserver for IoDump {
    fn on_op(&self, event: &OpEvent<'_>) {
        if !self.live.is_active() {
            return;
        }
        let stats = event.output.stats();
        let record = IoRecord {
            run: event.run,
            operator: event.operator.to_string(),
            input_shapes: event.inputs.iter().map(|v| v.shape().clone()).collect(),
            shape: event.output.shape().clone(),
            min: stats.min,
            max: stats.max,
            mean: stats.mean,
        };
        tracing::trace!(
            "io: run {} '{}' {:?} -> {} [{}, {}] mean {}",
            record.run,
            record.operator,
            record.input_shapes,
            record.shape,
            record.min,
            record.max,
            record.mean
        );
        self.records().push(record);
    }
}

impl Plugin for IoDump {
    fn liveness(&self) -> &Liveness {
        &self.live
    }
}

/// Owning handle to an attached I/O dump.
#[derive(Clone)]
pub struct IoDumpHandle {
    graph: GraphId,
    plugin: Arc<IoDump>,
}

impl IoDumpHandle {
    pub(crate) fn new(graph: GraphId, plugin: Arc<IoDump>) -> Self {
        Self { graph, plugin }
    }

    pub fn graph(&self) -> GraphId {
        self.graph
    }

    pub fn is_active(&self) -> bool {
        self.plugin.live.is_active()
    }

    pub fn records(&self) -> Vec<IoRecord> {
        self.plugin.records().clone()
    }

    /// All records as a JSON array.
    pub fn to_json(&self) -> Result<String, crate::RuntimeError> {
        super::report_json(&*self.plugin.records())
    }
}

impl std::fmt::Debug for IoDumpHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoDumpHandle")
            .field("graph", &self.graph)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_ir::OpKind;
    use std::time::Duration;
    use tensor_core::Tensor;

    #[test]
    fn test_one_record_per_event() {
        let dump = IoDump::new();
        let x = Tensor::from_f32(Shape::vector(3), &[-1.0, 0.0, 4.0]).unwrap();
        let out = Tensor::from_f32(Shape::vector(3), &[0.0, 0.0, 4.0]).unwrap();
        let inputs = [x.view()];
        for run in 1..=2 {
            dump.on_op(&OpEvent {
                run,
                operator: "r",
                kind: &OpKind::Relu,
                algorithm: None,
                inputs: &inputs,
                output: &out,
                elapsed: Duration::ZERO,
            });
        }
        let recs = dump.records().clone();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[1].run, 2);
        assert_eq!(recs[0].input_shapes, vec![Shape::vector(3)]);
        assert_eq!(recs[0].max, 4.0);
    }
}
