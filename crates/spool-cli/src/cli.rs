//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use spool_core::JobId;

/// Command-line arguments for `spool`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "spool",
    version,
    about = "Inspect and drive a persistent, dependency-aware job queue.",
    long_about = None
)]
pub struct CliArgs {
    /// Storage root directory. Must already exist.
    ///
    /// If omitted, `SPOOL_ROOT` or `./data/spool` is used.
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Job types this queue accepts (repeatable). Empty accepts any type.
    ///
    /// If omitted, `SPOOL_JOB_TYPES` is used.
    #[arg(long = "job-type", global = true, value_name = "TYPE")]
    pub job_types: Vec<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SPOOL_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Enqueue a job and print its id.
    Enqueue {
        job_type: String,

        /// Job arguments as JSON.
        #[arg(long, value_name = "JSON", default_value = "null")]
        args: String,

        /// Only run after this job has finished (repeatable).
        #[arg(long, value_name = "ID")]
        after: Vec<JobId>,
    },

    /// Claim one ready job and print it.
    Dequeue {
        /// Job types to accept (repeatable).
        #[arg(long = "type", value_name = "TYPE", required = true)]
        types: Vec<String>,

        /// Give up after this many seconds.
        #[arg(long, value_name = "SECS")]
        timeout_secs: Option<u64>,
    },

    /// Finish a running job.
    Finish {
        id: JobId,

        /// Job result as JSON.
        #[arg(long, value_name = "JSON", default_value = "null")]
        result: String,
    },

    /// Cancel a job that has not finished.
    Cancel { id: JobId },

    /// Print timestamps, flags and result of a job.
    Status { id: JobId },

    /// Print job counts per state.
    Counts,

    /// Run echo workers until Ctrl-C.
    Work {
        /// Job types to serve (repeatable).
        #[arg(long = "type", value_name = "TYPE", required = true)]
        types: Vec<String>,

        #[arg(long, value_name = "N", default_value_t = 1)]
        workers: usize,
    },
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
