// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # lar
//!
//! Command-line interface for the model executor.
//!
//! ## Usage
//! ```bash
//! # Run every bundled test case under a reproducible strategy
//! lar run ./model.json --strategy heuristic-reproducible --profile
//!
//! # Feed inputs by hand and bind one output
//! lar run ./model.lar --input x:1x3=1,2,3 --output y
//!
//! # Inspect model structure
//! lar inspect ./model.lar
//!
//! # Pack a JSON graph document into a SafeTensors container
//! lar pack ./model.json ./model.lar
//! ```

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "lar",
    about = "Load, configure and run graph models with selectable execution strategies",
    version,
    author
)]
struct Cli {
    /// Path to a TOML runtime configuration (CLI flags override it).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, compile and run a model.
    Run(commands::run::RunArgs),

    /// Print a model's operators, bindings and bundled test cases.
    Inspect {
        /// Path to the model (JSON document or SafeTensors container).
        model: PathBuf,

        /// Memory-map the model file.
        #[arg(long)]
        shared_mem: bool,
    },

    /// Convert a JSON graph document into a SafeTensors container.
    Pack {
        /// JSON graph document to read.
        input: PathBuf,

        /// Container to write.
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Run(args) => commands::run::execute(cli.config, args).await,
        Commands::Inspect { model, shared_mem } => commands::inspect::execute(model, shared_mem),
        Commands::Pack { input, output } => commands::inspect::pack(input, output),
    }
}
