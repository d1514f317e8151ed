// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `lar run` command: drive the executor through its whole lifecycle.
//!
//! ```text
//! load → set inputs → configure → compile → (run → wait)* → reports
//! ```

use anyhow::Context;
use model_ir::ExecutionStrategy;
use runtime::{
    parse_input, ConfigureRequest, Launch, ModelExecutor, RuntimeConfig, RuntimeError,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tensor_core::Tensor;

#[derive(clap::Args)]
pub struct RunArgs {
    /// Path to the model (JSON document or SafeTensors container).
    model: Option<PathBuf>,

    /// Execution strategy: heuristic, heuristic-reproducible, profile,
    /// profile-reproducible.
    #[arg(short, long)]
    strategy: Option<ExecutionStrategy>,

    /// Output to bind (repeatable). Defaults to every declared output.
    #[arg(short, long = "output")]
    outputs: Vec<String>,

    /// Input value, e.g. `x=1,2,3`, `x:2x2=1,2,3,4` or `x=@x.json` (repeatable).
    #[arg(short, long = "input")]
    inputs: Vec<String>,

    /// Attach the per-operator profiler.
    #[arg(long)]
    profile: bool,

    /// Write the profile report as JSON to this path.
    #[arg(long)]
    profile_output: Option<PathBuf>,

    /// Flag operator outputs whose max |x| exceeds this threshold.
    #[arg(long)]
    range_check: Option<f32>,

    /// Print per-operator output summaries as JSON.
    #[arg(long)]
    io_dump: bool,

    /// Number of runs. Defaults to every bundled test case, or one.
    #[arg(short = 'n', long)]
    iterations: Option<usize>,

    /// Give up on a single run after this many milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Memory-map the model file.
    #[arg(long)]
    shared_mem: bool,

    /// Worker threads (defaults to the number of CPU cores).
    #[arg(short = 'j', long)]
    threads: Option<usize>,
}

impl RunArgs {
    /// Layers the flags over the file config (or the defaults).
    fn into_config(self, file: Option<PathBuf>) -> anyhow::Result<(RuntimeConfig, Vec<String>)> {
        let mut config = match &file {
            Some(path) => RuntimeConfig::from_file(path)
                .with_context(|| format!("failed to read config '{}'", path.display()))?,
            None => RuntimeConfig::default(),
        };
        match self.model {
            Some(model) => config.model_path = model,
            None if file.is_none() => anyhow::bail!("no model given (pass a path or --config)"),
            None => {}
        }
        if let Some(strategy) = self.strategy {
            config.default_strategy = strategy;
        }
        if !self.outputs.is_empty() {
            config.outputs = self.outputs;
        }
        config.enable_profiling |= self.profile;
        config.profile_output = self.profile_output.or(config.profile_output);
        config.range_check = self.range_check.or(config.range_check);
        config.io_dump |= self.io_dump;
        config.iterations = self.iterations.or(config.iterations);
        config.wait_timeout_ms = self.timeout_ms.or(config.wait_timeout_ms);
        config.shared_mem |= self.shared_mem;
        config.num_threads = self.threads.or(config.num_threads);
        Ok((config, self.inputs))
    }
}

pub async fn execute(config_file: Option<PathBuf>, args: RunArgs) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║                 lar · Model Runner                   ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    // ── Configuration ──────────────────────────────────────────
    let (config, inputs) = args.into_config(config_file)?;
    println!("  Config:");
    println!("   Model:    {}", config.model_path.display());
    println!("   Strategy: {}", config.default_strategy);
    println!("   Threads:  {}", config.resolve_threads());
    println!();

    let mut exec = ModelExecutor::new(config.clone())?;

    // ── Load ───────────────────────────────────────────────────
    println!("  [1/3] Loading model...");
    exec.load_configured().with_context(|| {
        format!("failed to load model from '{}'", config.model_path.display())
    })?;
    if let Some(graph) = exec.graph() {
        println!("        {}", graph.summary());
    }
    for spec in &inputs {
        let (name, tensor) = parse_input(spec)?;
        println!("        input '{name}' ← {}", tensor.shape());
        exec.set_input(&name, tensor)?;
    }
    if !inputs.is_empty() && exec.testcase_num() > 0 {
        tracing::warn!(
            "model bundles {} test cases; they overwrite inputs given on the command line",
            exec.testcase_num()
        );
    }
    println!();

    // ── Configure + compile ────────────────────────────────────
    println!("  [2/3] Configuring and compiling...");
    let outputs: Vec<String> = if config.outputs.is_empty() {
        exec.declared_outputs().into_iter().map(String::from).collect()
    } else {
        config.outputs.clone()
    };
    let request = outputs
        .iter()
        .fold(ConfigureRequest::new(), |req, name| {
            let label = name.clone();
            req.output(name.clone(), move |t: &Tensor| print_output(&label, t))
        })
        .instrumentation(config.instrumentation());
    exec.configure(request)?;

    let started = Instant::now();
    exec.compile()?;
    println!("        Compiled in {:.2?}", started.elapsed());
    if let Some(exe) = exec.executable() {
        for step in exe.steps().iter().filter(|s| s.algorithm.is_some()) {
            if let Some(algo) = step.algorithm {
                println!("        {:<24} → {algo}", step.name);
            }
        }
    }
    println!();

    // ── Runs ───────────────────────────────────────────────────
    let iterations = config
        .iterations
        .unwrap_or_else(|| exec.testcase_num().max(1));
    let timeout = config.wait_timeout_ms.map(Duration::from_millis);
    println!("  [3/3] Running {iterations} iteration(s)...");

    for i in 0..iterations {
        match exec.run()? {
            Launch::Exhausted => {
                println!("        All test cases consumed after {i} run(s).");
                break;
            }
            Launch::Started { testcase } => {
                match testcase {
                    Some(case) => println!("   run {} (test case {case}):", i + 1),
                    None => println!("   run {}:", i + 1),
                }
                let (back, result) = wait_with_timeout(exec, timeout).await?;
                exec = back;
                result?;
            }
        }
    }
    println!();

    print_reports(&exec, &config)
}

/// Moves the executor onto a blocking thread for `wait()`, bounded by
/// `timeout` when given.
async fn wait_with_timeout(
    exec: ModelExecutor,
    timeout: Option<Duration>,
) -> anyhow::Result<(ModelExecutor, Result<(), RuntimeError>)> {
    let task = tokio::task::spawn_blocking(move || {
        let mut exec = exec;
        let result = exec.wait();
        (exec, result)
    });
    let joined = match timeout {
        Some(limit) => tokio::time::timeout(limit, task)
            .await
            .map_err(|_| anyhow::anyhow!("run did not finish within {limit:?}"))?,
        None => task.await,
    };
    joined.context("wait task failed")
}

fn print_output(name: &str, tensor: &Tensor) {
    let values = tensor.values();
    let shown: Vec<String> = values.iter().take(8).map(|v| format!("{v:.4}")).collect();
    println!(
        "     {name} {} = [{}{}]",
        tensor.shape(),
        shown.join(", "),
        if values.len() > 8 { ", ..." } else { "" },
    );
}

fn print_reports(exec: &ModelExecutor, config: &RuntimeConfig) -> anyhow::Result<()> {
    if let Some(profiler) = exec.profiler() {
        let report = profiler.report();
        println!("  Profile:");
        for line in report.summary().lines() {
            println!("   {line}");
        }
        if let Some(path) = &config.profile_output {
            profiler.flush(path)?;
            println!("   written to {}", path.display());
        }
        println!();
    }
    if let Some(checker) = exec.range_checker() {
        let violations = checker.violations();
        println!(
            "  Range check (|x| ≤ {}): {} violation(s)",
            checker.threshold(),
            violations.len()
        );
        for v in violations.iter().take(10) {
            println!(
                "   run {:<4} {:<24} max |x| = {}",
                v.run,
                super::truncate(&v.operator, 24),
                v.max_abs
            );
        }
        println!();
    }
    if let Some(dump) = exec.io_dump() {
        println!("  Operator I/O:");
        println!("{}", dump.to_json()?);
    }
    Ok(())
}
