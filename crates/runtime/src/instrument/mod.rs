// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Optional, non-intrusive execution observers.
//!
//! Plugins are attached to a graph through the [`InstrumentationRegistry`]
//! before compilation. The caller receives a handle that owns the plugin
//! (`Arc`); the registry and every compiled executable only hold `Weak`
//! references. Dropping the last handle therefore detaches the plugin
//! without touching the executor.
//!
//! At most one plugin of each kind is attached per graph. Attaching another
//! replaces it; the replaced plugin stops recording but its handle keeps
//! the report gathered so far. Clearing the registry (on reset, reconfigure
//! or a switch to another graph) retires every plugin the same way.
//!
//! Observers receive shared views only and cannot alter values or order.

mod io_dump;
mod profiler;
mod range_check;

pub use io_dump::{IoDumpHandle, IoRecord};
pub use profiler::{OpProfile, ProfileReport, ProfilerHandle};
pub use range_check::{RangeCheckerHandle, RangeViolation};

use crate::Algorithm;
use model_ir::{graph::Validated, GraphId, ModelGraph, OpKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tensor_core::{Tensor, TensorView};

/// One completed operator execution, as seen by observers.
#[derive(Debug)]
pub struct OpEvent<'a> {
    /// 1-based execution counter of the owning executable.
    pub run: u64,
    pub operator: &'a str,
    pub kind: &'a OpKind,
    pub algorithm: Option<Algorithm>,
    pub inputs: &'a [TensorView<'a>],
    pub output: &'a Tensor,
    pub elapsed: Duration,
}

/// Callbacks an executable makes into attached plugins.
pub trait OpObserver: Send + Sync {
    fn on_run_start(&self, _run: u64) {}

    fn on_op(&self, event: &OpEvent<'_>);

    fn on_run_end(&self, _run: u64, _wall: Duration) {}
}

/// Which plugins a configure request wants.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InstrumentationOptions {
    pub profiler: bool,
    /// Max-|x| threshold for the range checker; `None` leaves it off.
    pub range_check: Option<f32>,
    pub io_dump: bool,
}

/// Enable flag shared by every plugin. Cleared when the registry lets go of it.
#[derive(Debug)]
pub(crate) struct Liveness(AtomicBool);

impl Liveness {
    pub(crate) fn new() -> Self {
        Self(AtomicBool::new(true))
    }

    pub(crate) fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn retire(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Plugin types the registry can retire on replacement.
pub(crate) trait Plugin: OpObserver + 'static {
    fn liveness(&self) -> &Liveness;
}

/// A registry slot. Holds the plugin weakly.
struct Slot<P: Plugin> {
    plugin: Weak<P>,
}

impl<P: Plugin> Slot<P> {
    fn replace(current: &mut Option<Self>, next: &Arc<P>, kind: &str) {
        if let Some(old) = current.take().and_then(|s| s.plugin.upgrade()) {
            tracing::warn!("replacing attached {kind}; the previous handle stops recording");
            old.liveness().retire();
        }
        *current = Some(Self {
            plugin: Arc::downgrade(next),
        });
    }

    fn retire(&self) {
        if let Some(plugin) = self.plugin.upgrade() {
            plugin.liveness().retire();
        }
    }

    fn observer(&self) -> Option<Weak<dyn OpObserver>> {
        if self.plugin.strong_count() == 0 {
            return None;
        }
        let weak: Weak<dyn OpObserver> = self.plugin.clone();
        Some(weak)
    }
}

/// Attaches plugins to one graph at a time.
#[derive(Default)]
pub struct InstrumentationRegistry {
    graph: Option<GraphId>,
    profiler: Option<Slot<profiler::Profiler>>,
    range_checker: Option<Slot<range_check::RangeChecker>>,
    io_dump: Option<Slot<io_dump::IoDump>>,
}

impl InstrumentationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a per-operator profiler to `graph`.
    pub fn attach_profiler(&mut self, graph: &ModelGraph<Validated>) -> ProfilerHandle {
        self.bind(graph.id());
        let plugin = Arc::new(profiler::Profiler::new());
        Slot::replace(&mut self.profiler, &plugin, "profiler");
        tracing::info!("profiler attached to {}", graph.id());
        ProfilerHandle::new(graph.id(), plugin)
    }

    /// Attaches a numeric-range checker that flags outputs whose max |x|
    /// exceeds `threshold` or that contain non-finite values.
    pub fn attach_range_checker(
        &mut self,
        graph: &ModelGraph<Validated>,
        threshold: f32,
    ) -> RangeCheckerHandle {
        self.bind(graph.id());
        let plugin = Arc::new(range_check::RangeChecker::new(threshold));
        Slot::replace(&mut self.range_checker, &plugin, "range checker");
        tracing::info!("range checker (threshold {threshold}) attached to {}", graph.id());
        RangeCheckerHandle::new(graph.id(), plugin)
    }

    /// Attaches an operator I/O summary recorder.
    pub fn attach_io_dump(&mut self, graph: &ModelGraph<Validated>) -> IoDumpHandle {
        self.bind(graph.id());
        let plugin = Arc::new(io_dump::IoDump::new());
        Slot::replace(&mut self.io_dump, &plugin, "I/O dump");
        tracing::info!("I/O dump attached to {}", graph.id());
        IoDumpHandle::new(graph.id(), plugin)
    }

    /// Weak references to every plugin whose handle is still alive.
    pub fn observers(&self) -> Vec<Weak<dyn OpObserver>> {
        let mut out = Vec::with_capacity(3);
        out.extend(self.profiler.as_ref().and_then(Slot::observer));
        out.extend(self.range_checker.as_ref().and_then(Slot::observer));
        out.extend(self.io_dump.as_ref().and_then(Slot::observer));
        out
    }

    /// Number of plugins whose handle is still alive.
    pub fn attached_count(&self) -> usize {
        self.observers().len()
    }

    /// Retires and forgets every slot. Live handles keep their reports but
    /// record nothing new.
    pub fn clear(&mut self) {
        if let Some(slot) = &self.profiler {
            slot.retire();
        }
        if let Some(slot) = &self.range_checker {
            slot.retire();
        }
        if let Some(slot) = &self.io_dump {
            slot.retire();
        }
        self.graph = None;
        self.profiler = None;
        self.range_checker = None;
        self.io_dump = None;
    }

    /// Slots belong to one graph; switching graphs starts from empty.
    fn bind(&mut self, graph: GraphId) {
        if self.graph != Some(graph) {
            self.clear();
            self.graph = Some(graph);
        }
    }
}

/// Pretty JSON for plugin reports.
pub(crate) fn report_json<T: serde::Serialize + ?Sized>(
    value: &T,
) -> Result<String, crate::RuntimeError> {
    serde_json::to_string_pretty(value).map_err(|e| std::io::Error::from(e).into())
}

/// Upgrades each observer that is still attached and applies `f`.
pub(crate) fn notify(observers: &[Weak<dyn OpObserver>], mut f: impl FnMut(&dyn OpObserver)) {
    for weak in observers {
        if let Some(obs) = weak.upgrade() {
            f(obs.as_ref());
        }
    }
}
