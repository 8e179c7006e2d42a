//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Hierarchical test runner with nested steps, BDD suites and leak detection
#[derive(Parser, Debug)]
#[command(name = "stepwise")]
#[command(version = "0.1.0")]
#[command(about = "Run the bundled step and BDD sample suites")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run sample suites
    Run(RunArgs),

    /// List available samples
    List(ListArgs),

    /// Show or create configuration
    Config(ConfigArgs),
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Sample to run (database, users-nested, users-flat, all)
    #[arg(short, long, default_value = "all")]
    pub sample: String,

    /// Output format (json, json-pretty, summary)
    #[arg(short, long, default_value = "json-pretty")]
    pub format: String,

    /// Configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum concurrent steps per batch (0 = unbounded)
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Fail when any nested unit fails
    #[arg(long)]
    pub strict: bool,

    /// Print lifecycle events as JSON lines to stderr
    #[arg(long)]
    pub events: bool,
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Show the suite outline of each sample
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Write a default configuration file
    Init {
        /// Destination (.yaml, .yml or .json)
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Describe the environment variable overrides
    Env,
}
