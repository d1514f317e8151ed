// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The model executor and its lifecycle.
//!
//! ```text
//! Unloaded ──load──▶ Loaded ──configure──▶ Configured ──compile──▶ Compiled
//!                      ▲                     │  ▲                    │  ▲
//!                      │                     └──┘ (reconfigure)      │  │ compile
//!                      │                                            run  │
//!                      │                                             ▼  │
//!                      └────────────── reset ────────────────── Completed ◀─wait── Running
//!
//!   any execution failure ──▶ Error (absorbing)
//! ```
//!
//! Unlike the graph, whose validation is a compile-time type state, the
//! executor's states are a runtime enum: the same value is driven through
//! `run`/`wait` cycles and test-case iteration, and every illegal call is
//! answered with [`RuntimeError::InvalidState`] without changing state.

use crate::algo::AlgoTable;
use crate::instrument::{
    InstrumentationOptions, InstrumentationRegistry, IoDumpHandle, ProfilerHandle,
    RangeCheckerHandle,
};
use crate::{
    AsyncExecutable, Callback, OutputSpec, OutputSpecBuilder, RuntimeConfig, RuntimeError,
    StrategyStore, TestCaseInputInjector,
};
use model_ir::{graph::Validated, ExecutionStrategy, GraphLoader, LoadResult, ModelGraph, ModelSource};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fmt;
use std::sync::mpsc::{self, Receiver};
use tensor_core::Tensor;

// ── States ─────────────────────────────────────────────────────

/// Lifecycle position of a [`ModelExecutor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutorState {
    Unloaded,
    Loaded,
    Configured,
    Compiled,
    Running,
    Completed,
    /// An execution failed. Only dropping the executor leaves this state.
    Error,
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unloaded => "unloaded",
            Self::Loaded => "loaded",
            Self::Configured => "configured",
            Self::Compiled => "compiled",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "in error",
        };
        f.write_str(s)
    }
}

// ── Requests and results ───────────────────────────────────────

/// Everything `configure` needs, built fluently.
///
/// # Example
/// ```
/// use runtime::{ConfigureRequest, InstrumentationOptions};
/// use model_ir::ExecutionStrategy;
///
/// let req = ConfigureRequest::new()
///     .strategy(ExecutionStrategy::ProfileReproducible)
///     .output("y", |t| println!("{:?}", t.values()))
///     .instrumentation(InstrumentationOptions { profiler: true, ..Default::default() });
/// assert_eq!(req.output_names(), ["y"]);
/// ```
#[derive(Default)]
pub struct ConfigureRequest {
    strategy: Option<ExecutionStrategy>,
    outputs: Vec<(String, Callback)>,
    instrumentation: InstrumentationOptions,
}

impl ConfigureRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the config's default strategy.
    pub fn strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Binds an output. Call order is delivery order.
    pub fn output(
        mut self,
        name: impl Into<String>,
        callback: impl FnMut(&Tensor) + Send + 'static,
    ) -> Self {
        self.outputs.push((name.into(), Box::new(callback)));
        self
    }

    /// Binds an already-boxed callback.
    pub fn boxed_output(mut self, name: impl Into<String>, callback: Callback) -> Self {
        self.outputs.push((name.into(), callback));
        self
    }

    pub fn instrumentation(mut self, options: InstrumentationOptions) -> Self {
        self.instrumentation = options;
        self
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.iter().map(|(n, _)| n.as_str()).collect()
    }
}

/// Outcome of [`ModelExecutor::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launch {
    /// Execution was launched. `testcase` is the bundled case fed in, if any.
    Started { testcase: Option<usize> },
    /// Every bundled test case has been consumed; nothing was launched.
    Exhausted,
}

type Completion = (AsyncExecutable, Result<(), RuntimeError>);

// ── Executor ───────────────────────────────────────────────────

/// Owns one model through load, configure, compile and repeated runs.
///
/// # Example
/// ```no_run
/// use runtime::{ConfigureRequest, Launch, ModelExecutor, RuntimeConfig};
/// use model_ir::ModelSource;
///
/// # fn example() -> Result<(), runtime::RuntimeError> {
/// let mut exec = ModelExecutor::new(RuntimeConfig::default())?;
/// exec.load(ModelSource::Path("model.json".into()))?;
/// exec.configure(ConfigureRequest::new().output("y", |t| println!("{:?}", t.values())))?;
/// exec.compile()?;
/// while let Launch::Started { .. } = exec.run()? {
///     exec.wait()?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct ModelExecutor {
    config: RuntimeConfig,
    pool: ThreadPool,
    state: ExecutorState,
    model: Option<LoadResult>,
    injector: TestCaseInputInjector,
    strategies: StrategyStore,
    instruments: InstrumentationRegistry,
    profiler: Option<ProfilerHandle>,
    range_checker: Option<RangeCheckerHandle>,
    io_dump: Option<IoDumpHandle>,
    /// Output spec between configure and compile.
    spec: Option<OutputSpec>,
    /// Present while Compiled/Completed; moved into the worker while Running.
    executable: Option<AsyncExecutable>,
    pending: Option<Receiver<Completion>>,
}

impl ModelExecutor {
    /// Creates an executor with its own worker pool.
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let threads = config.resolve_threads();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("lar-worker-{i}"))
            .panic_handler(|_| tracing::error!("execution worker panicked"))
            .build()
            .map_err(|e| RuntimeError::Config(format!("failed to build worker pool: {e}")))?;
        tracing::info!(
            "executor created: {threads} workers, default strategy '{}'",
            config.default_strategy
        );
        Ok(Self {
            strategies: StrategyStore::new(config.default_strategy),
            config,
            pool,
            state: ExecutorState::Unloaded,
            model: None,
            injector: TestCaseInputInjector::default(),
            instruments: InstrumentationRegistry::new(),
            profiler: None,
            range_checker: None,
            io_dump: None,
            spec: None,
            executable: None,
            pending: None,
        })
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    // ── Unloaded → Loaded ──────────────────────────────────────

    /// Loads a model. On failure the executor stays `Unloaded`.
    pub fn load(&mut self, source: ModelSource) -> Result<(), RuntimeError> {
        self.expect_state("load a model", &[ExecutorState::Unloaded])?;
        let mut model = GraphLoader::load(source, &self.config.load_config())?;
        self.injector = TestCaseInputInjector::new(std::mem::take(&mut model.testcases));
        tracing::info!(
            "model '{}' loaded: {} declared outputs, {} test cases",
            model.graph.name(),
            model.outputs.len(),
            self.injector.testcase_num()
        );
        self.model = Some(model);
        self.state = ExecutorState::Loaded;
        Ok(())
    }

    /// Loads the model named by `config.model_path`.
    pub fn load_configured(&mut self) -> Result<(), RuntimeError> {
        let path = self.config.model_path.clone();
        self.load(ModelSource::Path(path))
    }

    // ── Loaded → Configured ────────────────────────────────────

    /// Builds the output spec, then commits strategy and plugins.
    ///
    /// Legal from `Loaded` and `Configured`. After a compile the caller must
    /// [`reset`](Self::reset) first. On error nothing changes.
    pub fn configure(&mut self, request: ConfigureRequest) -> Result<(), RuntimeError> {
        self.expect_state(
            "configure",
            &[ExecutorState::Loaded, ExecutorState::Configured],
        )?;
        let ConfigureRequest {
            strategy,
            outputs,
            instrumentation,
        } = request;
        let model = self.model_mut()?;
        let spec = OutputSpecBuilder::new(model).build(outputs)?;

        let strategy = strategy.unwrap_or(self.config.default_strategy);
        let mut store = self.strategies;
        store.set(strategy);
        let model = self.model_mut()?;
        let touched = store.apply(&mut model.graph)?;
        self.strategies = store;

        self.attach_instrumentation(instrumentation)?;
        tracing::info!(
            "configured: strategy '{strategy}' on {touched} operators, outputs {:?}",
            spec.names()
        );
        self.spec = Some(spec);
        self.state = ExecutorState::Configured;
        Ok(())
    }

    /// Replaces every plugin; a kind left off in `opts` is detached.
    fn attach_instrumentation(&mut self, opts: InstrumentationOptions) -> Result<(), RuntimeError> {
        self.instruments.clear();
        let graph = &self
            .model
            .as_ref()
            .ok_or(RuntimeError::InvalidState {
                operation: "attach instrumentation",
                state: self.state,
            })?
            .graph;
        self.profiler = opts.profiler.then(|| self.instruments.attach_profiler(graph));
        self.range_checker = opts
            .range_check
            .map(|threshold| self.instruments.attach_range_checker(graph, threshold));
        self.io_dump = opts.io_dump.then(|| self.instruments.attach_io_dump(graph));
        Ok(())
    }

    // ── Configured → Compiled ──────────────────────────────────

    /// Selects algorithms, seals the graph and builds the executable.
    ///
    /// From `Compiled`/`Completed` this recompiles with the same output
    /// bindings. On failure the executor is left `Configured`.
    pub fn compile(&mut self) -> Result<(), RuntimeError> {
        self.expect_state(
            "compile",
            &[
                ExecutorState::Configured,
                ExecutorState::Compiled,
                ExecutorState::Completed,
            ],
        )?;
        let spec = match self.executable.take() {
            Some(exe) => exe.into_spec(),
            None => self.spec.take().unwrap_or_default(),
        };

        let default_strategy = self.strategies.strategy();
        let Some(model) = self.model.as_mut() else {
            self.spec = Some(spec);
            return Err(RuntimeError::InvalidState {
                operation: "compile",
                state: self.state,
            });
        };
        let graph = &model.graph;
        let planned = self.pool.install(|| {
            let mut table = AlgoTable::new();
            AsyncExecutable::plan(graph, default_strategy, &mut table)
        });
        let steps = match planned {
            Ok(steps) => steps,
            Err(e) => {
                tracing::error!("compile failed: {e}");
                model.graph.unseal();
                self.spec = Some(spec);
                self.state = ExecutorState::Configured;
                return Err(e);
            }
        };

        model.graph.seal();
        let exe = AsyncExecutable::new(&model.graph, steps, spec, self.instruments.observers());
        tracing::info!(
            "compiled '{}': {} steps, {} outputs, {} plugins",
            model.graph.name(),
            exe.steps().len(),
            exe.output_names().len(),
            self.instruments.attached_count()
        );
        self.executable = Some(exe);
        self.state = ExecutorState::Compiled;
        Ok(())
    }

    // ── Compiled → Running → Completed ─────────────────────────

    /// Launches one execution on the worker pool without blocking.
    ///
    /// With bundled test cases, the next case is fed into the inputs first;
    /// once they are used up this returns [`Launch::Exhausted`] and nothing
    /// changes.
    pub fn run(&mut self) -> Result<Launch, RuntimeError> {
        self.expect_state(
            "run",
            &[ExecutorState::Compiled, ExecutorState::Completed],
        )?;
        let state = self.state;
        let model = self.model.as_mut().ok_or(RuntimeError::InvalidState {
            operation: "run",
            state,
        })?;

        let testcase = if self.injector.testcase_num() > 0 {
            match self.injector.inject(&mut model.inputs) {
                Some(i) => Some(i),
                None => {
                    tracing::info!("all {} test cases consumed", self.injector.testcase_num());
                    return Ok(Launch::Exhausted);
                }
            }
        } else {
            None
        };

        let mut exe = self.executable.take().ok_or(RuntimeError::InvalidState {
            operation: "run",
            state,
        })?;
        exe.bind_inputs(&model.inputs);

        let (tx, rx) = mpsc::channel::<Completion>();
        self.pool.spawn(move || {
            let result = exe.execute();
            let _ = tx.send((exe, result));
        });
        self.pending = Some(rx);
        self.state = ExecutorState::Running;
        tracing::debug!("launched run (test case {testcase:?})");
        Ok(Launch::Started { testcase })
    }

    /// Blocks until the launched execution finishes.
    ///
    /// On success every bound callback has fired exactly once, in output
    /// spec order. An execution failure moves the executor to `Error`.
    pub fn wait(&mut self) -> Result<(), RuntimeError> {
        self.expect_state("wait", &[ExecutorState::Running])?;
        let Some(rx) = self.pending.take() else {
            self.state = ExecutorState::Error;
            return Err(RuntimeError::Execution {
                operator: "<launch>".into(),
                detail: "no execution in flight".into(),
            });
        };

        match rx.recv() {
            Ok((exe, Ok(()))) => {
                self.executable = Some(exe);
                self.state = ExecutorState::Completed;
                Ok(())
            }
            Ok((exe, Err(e))) => {
                self.executable = Some(exe);
                self.state = ExecutorState::Error;
                Err(e)
            }
            Err(_) => {
                self.state = ExecutorState::Error;
                Err(RuntimeError::Execution {
                    operator: "<worker>".into(),
                    detail: "execution worker exited without reporting".into(),
                })
            }
        }
    }

    // ── Back to Loaded ─────────────────────────────────────────

    /// Drops the executable, output spec and plugin handles, unseals the
    /// graph and returns to `Loaded`. Test-case progress is kept.
    pub fn reset(&mut self) -> Result<(), RuntimeError> {
        self.expect_state(
            "reset",
            &[
                ExecutorState::Configured,
                ExecutorState::Compiled,
                ExecutorState::Completed,
            ],
        )?;
        self.executable = None;
        self.spec = None;
        self.profiler = None;
        self.range_checker = None;
        self.io_dump = None;
        self.instruments.clear();
        if let Some(model) = self.model.as_mut() {
            model.graph.unseal();
        }
        self.state = ExecutorState::Loaded;
        tracing::info!("executor reset");
        Ok(())
    }

    // ── Inputs and outputs ─────────────────────────────────────

    /// Replaces a declared input. The shape is not checked here; a mismatch
    /// surfaces as an execution error from the first operator that reads it.
    pub fn set_input(&mut self, name: &str, value: Tensor) -> Result<(), RuntimeError> {
        let slot = self.input_mut(name)?;
        if slot.shape() != value.shape() {
            tracing::warn!(
                "input '{name}' set with shape {} (declared {})",
                value.shape(),
                slot.shape()
            );
        }
        *slot = value;
        Ok(())
    }

    /// Mutable access to a declared input tensor.
    pub fn input_mut(&mut self, name: &str) -> Result<&mut Tensor, RuntimeError> {
        self.expect_state(
            "set inputs",
            &[
                ExecutorState::Loaded,
                ExecutorState::Configured,
                ExecutorState::Compiled,
                ExecutorState::Completed,
            ],
        )?;
        self.model_mut()?
            .inputs
            .get_mut(name)
            .ok_or_else(|| RuntimeError::InvalidInput(format!("'{name}' is not a declared input")))
    }

    /// Declared input names.
    pub fn input_names(&self) -> Vec<&str> {
        self.model
            .as_ref()
            .map(|m| m.inputs.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Declared output names, in model order.
    pub fn declared_outputs(&self) -> Vec<&str> {
        self.model
            .as_ref()
            .map(|m| m.outputs.iter().map(|(n, _)| n.as_str()).collect())
            .unwrap_or_default()
    }

    /// Swaps the callbacks of the configured or compiled output spec.
    pub fn set_output_callbacks(&mut self, callbacks: Vec<Callback>) -> Result<(), RuntimeError> {
        let state = self.state;
        let spec = match state {
            ExecutorState::Configured => self.spec.as_mut(),
            ExecutorState::Compiled | ExecutorState::Completed => {
                self.executable.as_mut().map(AsyncExecutable::output_spec_mut)
            }
            _ => None,
        };
        spec.ok_or(RuntimeError::InvalidState {
            operation: "set output callbacks",
            state,
        })?
        .replace_callbacks(callbacks)
    }

    // ── Test cases ─────────────────────────────────────────────

    /// Number of bundled test cases, fixed at load time.
    pub fn testcase_num(&self) -> usize {
        self.injector.testcase_num()
    }

    /// Restarts test-case iteration from the first case.
    pub fn reset_test_cases(&mut self) {
        self.injector.reset();
    }

    // ── Instrumentation ────────────────────────────────────────

    pub fn profiler(&self) -> Option<&ProfilerHandle> {
        self.profiler.as_ref()
    }

    pub fn range_checker(&self) -> Option<&RangeCheckerHandle> {
        self.range_checker.as_ref()
    }

    pub fn io_dump(&self) -> Option<&IoDumpHandle> {
        self.io_dump.as_ref()
    }

    /// Drops the executor's profiler handle, returning it. The plugin stays
    /// attached only while the caller keeps the returned handle.
    pub fn detach_profiler(&mut self) -> Option<ProfilerHandle> {
        self.profiler.take()
    }

    pub fn detach_range_checker(&mut self) -> Option<RangeCheckerHandle> {
        self.range_checker.take()
    }

    pub fn detach_io_dump(&mut self) -> Option<IoDumpHandle> {
        self.io_dump.take()
    }

    // ── Introspection ──────────────────────────────────────────

    pub fn graph(&self) -> Option<&ModelGraph<Validated>> {
        self.model.as_ref().map(|m| &m.graph)
    }

    /// Strategy applied by the last configure.
    pub fn strategy(&self) -> ExecutionStrategy {
        self.strategies.strategy()
    }

    /// The compiled executable, unless it is out on a worker.
    pub fn executable(&self) -> Option<&AsyncExecutable> {
        self.executable.as_ref()
    }

    // ── Private helpers ────────────────────────────────────────

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[ExecutorState],
    ) -> Result<(), RuntimeError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(RuntimeError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn model_mut(&mut self) -> Result<&mut LoadResult, RuntimeError> {
        let state = self.state;
        self.model.as_mut().ok_or(RuntimeError::InvalidState {
            operation: "access the model",
            state,
        })
    }
}

impl fmt::Debug for ModelExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelExecutor")
            .field("state", &self.state)
            .field("strategy", &self.strategies.strategy())
            .field("model", &self.model.as_ref().map(|m| m.graph.name()))
            .field("testcases", &self.injector.testcase_num())
            .field("plugins", &self.instruments.attached_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELU: &str = r#"{
        "format_version": 1, "name": "relu",
        "inputs": [{ "name": "x", "shape": [3] }],
        "operators": [{ "name": "r", "op": "relu", "inputs": ["x"], "output": "y" }],
        "outputs": ["y"]
    }"#;

    fn executor() -> ModelExecutor {
        let config = RuntimeConfig {
            num_threads: Some(2),
            ..Default::default()
        };
        ModelExecutor::new(config).unwrap()
    }

    fn loaded() -> ModelExecutor {
        let mut e = executor();
        e.load(ModelSource::Bytes(RELU.as_bytes().to_vec())).unwrap();
        e
    }

    #[test]
    fn test_initial_state() {
        let e = executor();
        assert_eq!(e.state(), ExecutorState::Unloaded);
        assert!(e.graph().is_none());
    }

    #[test]
    fn test_load_twice_rejected() {
        let mut e = loaded();
        let err = e
            .load(ModelSource::Bytes(RELU.as_bytes().to_vec()))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidState { .. }));
        assert_eq!(e.state(), ExecutorState::Loaded);
    }

    #[test]
    fn test_configure_before_load_rejected() {
        let mut e = executor();
        assert!(e.configure(ConfigureRequest::new()).is_err());
        assert_eq!(e.state(), ExecutorState::Unloaded);
    }

    #[test]
    fn test_failed_configure_keeps_state() {
        let mut e = loaded();
        let err = e
            .configure(ConfigureRequest::new().output("nope", |_| {}))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownOutput { .. }));
        assert_eq!(e.state(), ExecutorState::Loaded);
    }

    #[test]
    fn test_reconfigure_after_compile_needs_reset() {
        let mut e = loaded();
        e.configure(ConfigureRequest::new().output("y", |_| {})).unwrap();
        e.compile().unwrap();
        let err = e
            .configure(ConfigureRequest::new().output("y", |_| {}))
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::InvalidState { state: ExecutorState::Compiled, .. }
        ));

        e.reset().unwrap();
        assert_eq!(e.state(), ExecutorState::Loaded);
        assert!(!e.graph().unwrap().is_sealed());
        e.configure(ConfigureRequest::new().output("y", |_| {})).unwrap();
        assert_eq!(e.state(), ExecutorState::Configured);
    }

    #[test]
    fn test_run_wait_cycle() {
        let mut e = loaded();
        e.set_input("x", Tensor::from_f32(tensor_core::Shape::vector(3), &[-1.0, 2.0, -3.0]).unwrap())
            .unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        e.configure(ConfigureRequest::new().output("y", move |t| {
            tx.send(t.values().to_vec()).unwrap();
        }))
        .unwrap();
        e.compile().unwrap();
        assert_eq!(e.run().unwrap(), Launch::Started { testcase: None });
        assert_eq!(e.state(), ExecutorState::Running);
        e.wait().unwrap();
        assert_eq!(e.state(), ExecutorState::Completed);
        assert_eq!(rx.try_recv().unwrap(), vec![0.0, 2.0, 0.0]);
    }

    #[test]
    fn test_unknown_input_rejected() {
        let mut e = loaded();
        let err = e.set_input("nope", Tensor::scalar(1.0)).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidInput(_)));
    }

    #[test]
    fn test_set_output_callbacks_states() {
        let mut e = loaded();
        let err = e.set_output_callbacks(vec![]).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidState { .. }));

        e.configure(ConfigureRequest::new().output("y", |_| {})).unwrap();
        e.compile().unwrap();
        assert!(e.set_output_callbacks(vec![Box::new(|_| {})]).is_ok());
        assert!(matches!(
            e.set_output_callbacks(vec![]),
            Err(RuntimeError::CallbackCountMismatch { expected: 1, actual: 0 })
        ));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ExecutorState::Running.to_string(), "running");
        let err = RuntimeError::InvalidState {
            operation: "wait",
            state: ExecutorState::Loaded,
        };
        assert_eq!(err.to_string(), "cannot wait while the executor is loaded");
    }
}
