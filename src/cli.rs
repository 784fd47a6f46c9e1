// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// otto — multi-agent task orchestrator with human-in-the-loop approval.
#[derive(Parser, Debug)]
#[command(name = "otto", version, about)]
pub struct Cli {
    /// Path to an explicit config file (merged over the discovered layers).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Log to stderr at debug level (overrides OTTO_LOG).
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP node (default when no subcommand is given).
    Serve,

    /// Print the merged configuration and exit.
    ShowConfig,

    /// Print the flattened tool catalog and exit.
    Tools {
        /// Emit JSON instead of the table view.
        #[arg(long)]
        json: bool,
    },
}
