//! CLI parse: clap types for coursegen. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// coursegen - learning-plan task generation orchestrator
#[derive(Parser, Debug)]
#[command(name = "coursegen")]
#[command(about = "Deliver learning plans to waiting clients and generate per-step tasks")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project root; config/*.toml is read from here
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server (plan stream, generator callback, health)
    Serve {
        /// Bind address, e.g. 0.0.0.0:3000
        #[arg(long)]
        bind: Option<String>,
    },
    /// Generate tasks for every step of a plan file
    Generate {
        /// Learning plan JSON file
        #[arg(long)]
        plan: PathBuf,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
        /// Give up waiting after this many seconds
        #[arg(long, default_value = "600")]
        timeout_secs: u64,
    },
}
