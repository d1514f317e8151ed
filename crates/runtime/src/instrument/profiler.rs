// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-operator execution profiling.
//!
//! [`ProfileReport`] collects per-operator call counts and timings plus the
//! wall-clock time of each run. It is the primary tool for comparing
//! execution strategies on the same model.

use super::{Liveness, OpEvent, OpObserver, Plugin};
use model_ir::GraphId;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Timing for a single operator, aggregated over runs.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OpProfile {
    pub operator: String,
    pub kind: String,
    /// Algorithm chosen at compile time, for selectable operators.
    pub algorithm: Option<String>,
    pub calls: u64,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl OpProfile {
    pub fn mean(&self) -> Duration {
        if self.calls == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total.as_nanos() / u128::from(self.calls);
        Duration::new(
            (nanos / 1_000_000_000) as u64,
            (nanos % 1_000_000_000) as u32,
        )
    }
}

/// Aggregate profile over every observed run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ProfileReport {
    pub runs: u64,
    /// Sum of per-run wall-clock time.
    pub total_wall: Duration,
    /// Operators in first-execution order.
    pub operators: Vec<OpProfile>,
}

impl ProfileReport {
    /// Time spent inside operators, summed over all runs.
    pub fn total_compute(&self) -> Duration {
        self.operators.iter().map(|o| o.total).sum()
    }

    pub fn operator(&self, name: &str) -> Option<&OpProfile> {
        self.operators.iter().find(|o| o.operator == name)
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        let mean_wall_ms = if self.runs > 0 {
            self.total_wall.as_secs_f64() * 1000.0 / self.runs as f64
        } else {
            0.0
        };
        let slowest = self
            .operators
            .iter()
            .max_by_key(|o| o.total)
            .map(|o| format!(", slowest '{}' ({:.3}ms)", o.operator, o.total.as_secs_f64() * 1000.0))
            .unwrap_or_default();
        format!(
            "Profile: {} runs, {:.3}ms mean wall, {:.3}ms compute, {} operators{}",
            self.runs,
            mean_wall_ms,
            self.total_compute().as_secs_f64() * 1000.0,
            self.operators.len(),
            slowest,
        )
    }
}

#[derive(Default)]
struct Records {
    report: ProfileReport,
    index: HashMap<String, usize>,
}

pub(crate) struct Profiler {
    live: Liveness,
    records: Mutex<Records>,
}

impl Profiler {
    pub(crate) fn new() -> Self {
        Self {
            live: Liveness::new(),
            records: Mutex::new(Records::default()),
        }
    }

    fn records(&self) -> MutexGuard<'_, Records> {
        // A poisoned lock only means an observer panicked mid-update; the
        // counters are still usable.
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl OpObserver for Profiler {
    fn on_op(&self, event: &OpEvent<'_>) {
        if !self.live.is_active() {
            return;
        }
        let mut rec = self.records();
        let Records { report, index } = &mut *rec;
        let slot = *index.entry(event.operator.to_string()).or_insert_with(|| {
            report.operators.push(OpProfile {
                operator: event.operator.to_string(),
                kind: event.kind.as_str().to_string(),
                algorithm: event.algorithm.map(|a| a.name().to_string()),
                calls: 0,
                total: Duration::ZERO,
                min: Duration::MAX,
                max: Duration::ZERO,
            });
            report.operators.len() - 1
        });
        let op = &mut report.operators[slot];
        op.calls += 1;
        op.total += event.elapsed;
        op.min = op.min.min(event.elapsed);
        op.max = op.max.max(event.elapsed);
        op.algorithm = event.algorithm.map(|a| a.name().to_string());
    }

    fn on_run_end(&self, _run: u64, wall: Duration) {
        if !self.live.is_active() {
            return;
        }
        let mut rec = self.records();
        rec.report.runs += 1;
        rec.report.total_wall += wall;
    }
}

impl Plugin for Profiler {
    fn liveness(&self) -> &Liveness {
        &self.live
    }
}

/// Owning handle to an attached profiler. Dropping every clone detaches it.
#[derive(Clone)]
pub struct ProfilerHandle {
    graph: GraphId,
    plugin: Arc<Profiler>,
}

impl ProfilerHandle {
    pub(crate) fn new(graph: GraphId, plugin: Arc<Profiler>) -> Self {
        Self { graph, plugin }
    }

    /// The graph this profiler was attached to.
    pub fn graph(&self) -> GraphId {
        self.graph
    }

    /// `false` once this profiler was replaced, or detached by a reset or reconfigure.
    pub fn is_active(&self) -> bool {
        self.plugin.live.is_active()
    }

    /// Snapshot of everything recorded so far.
    pub fn report(&self) -> ProfileReport {
        self.plugin.records().report.clone()
    }

    /// Writes the report to `path` as pretty-printed JSON.
    pub fn flush(&self, path: &Path) -> Result<(), crate::RuntimeError> {
        let json = super::report_json(&self.report())?;
        std::fs::write(path, json)?;
        tracing::info!("profile written to '{}'", path.display());
        Ok(())
    }
}

impl std::fmt::Debug for ProfilerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfilerHandle")
            .field("graph", &self.graph)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_ir::OpKind;
    use tensor_core::Tensor;

    fn event<'a>(name: &'a str, kind: &'a OpKind, out: &'a Tensor, ms: u64) -> OpEvent<'a> {
        OpEvent {
            run: 1,
            operator: name,
            kind,
            algorithm: None,
            inputs: &[],
            output: out,
            elapsed: Duration::from_millis(ms),
        }
    }

    #[test]
    fn test_record_and_aggregate() {
        let p = Profiler::new();
        let out = Tensor::scalar(0.0);
        let relu = OpKind::Relu;
        p.on_op(&event("a", &relu, &out, 5));
        p.on_op(&event("b", &relu, &out, 3));
        p.on_op(&event("a", &relu, &out, 1));
        p.on_run_end(1, Duration::from_millis(10));

        let report = p.records().report.clone();
        assert_eq!(report.runs, 1);
        assert_eq!(report.operators.len(), 2);
        let a = report.operator("a").unwrap();
        assert_eq!(a.calls, 2);
        assert_eq!(a.min, Duration::from_millis(1));
        assert_eq!(a.max, Duration::from_millis(5));
        assert_eq!(a.mean(), Duration::from_millis(3));
        assert_eq!(report.total_compute(), Duration::from_millis(9));
    }

    #[test]
    fn test_mean_with_large_call_count() {
        let profile = OpProfile {
            operator: "mm".into(),
            kind: "matmul".into(),
            algorithm: None,
            calls: 1 << 32,
            total: Duration::from_secs(1 << 33),
            min: Duration::from_secs(1),
            max: Duration::from_secs(3),
        };
        assert_eq!(profile.mean(), Duration::from_secs(2));

        let odd = OpProfile {
            calls: 3,
            total: Duration::from_nanos(10),
            ..profile
        };
        assert_eq!(odd.mean(), Duration::from_nanos(3));
    }

    #[test]
    fn test_retired_profiler_stops_recording() {
        let p = Profiler::new();
        let out = Tensor::scalar(0.0);
        let relu = OpKind::Relu;
        p.on_op(&event("a", &relu, &out, 1));
        p.liveness().retire();
        p.on_op(&event("a", &relu, &out, 1));
        p.on_run_end(1, Duration::from_millis(1));
        let report = p.records().report.clone();
        assert_eq!(report.operator("a").unwrap().calls, 1);
        assert_eq!(report.runs, 0);
    }

    #[test]
    fn test_summary_format() {
        let report = ProfileReport {
            runs: 2,
            total_wall: Duration::from_millis(20),
            operators: vec![OpProfile {
                operator: "mm".into(),
                kind: "matmul".into(),
                algorithm: Some("tiled".into()),
                calls: 2,
                total: Duration::from_millis(8),
                min: Duration::from_millis(4),
                max: Duration::from_millis(4),
            }],
        };
        let s = report.summary();
        assert!(s.contains("2 runs"));
        assert!(s.contains("slowest 'mm'"));
    }

    #[test]
    fn test_flush_writes_json() {
        let p = Arc::new(Profiler::new());
        let mut g = model_ir::ModelGraph::new("g");
        g.add_input("x", tensor_core::Shape::vector(1)).unwrap();
        let handle = ProfilerHandle::new(g.id(), p);
        let path = std::env::temp_dir().join("lar_profiler_flush_test.json");
        handle.flush(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"runs\": 0"));
        let _ = std::fs::remove_file(&path);
    }
}
