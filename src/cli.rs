// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `sourcebox`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sourcebox",
    version,
    about = "Process a source tree incrementally and keep it in sync as files change.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "SourceBox.toml")]
    pub config: String,

    /// Source directory; overrides `[source].root`.
    ///
    /// With this flag the config file may be absent.
    #[arg(long, value_name = "DIR")]
    pub root: Option<String>,

    /// Run one processing pass and exit instead of watching.
    #[arg(long)]
    pub once: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SOURCEBOX_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse and validate the config, print it, process nothing.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
