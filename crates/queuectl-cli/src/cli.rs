//! Argument definitions (spec §6). Parsing and table rendering are
//! explicitly out of core scope (spec.md §1) — this module and `table.rs`
//! are the CLI binary's own concern, not `queuectl-core`'s.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "queuectl")]
#[command(author, version, about = "Durable background job queue", long_about = None)]
pub struct Cli {
    /// Path to the database file. Defaults to `./data/queuectl.db`.
    #[arg(long, global = true)]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the database schema if it does not already exist.
    InitDb,

    /// Enqueue a new job.
    Enqueue {
        /// A JSON object with the same fields as the flag form, e.g.
        /// `{"command":"true","priority":5}`.
        #[arg(value_name = "JSON", conflicts_with = "command_flag")]
        json: Option<String>,

        #[arg(long = "command", value_name = "SHELL_COMMAND", required_unless_present = "json")]
        command_flag: Option<String>,

        #[arg(long)]
        id: Option<String>,

        #[arg(long = "max-retries")]
        max_retries: Option<i64>,

        #[arg(long)]
        priority: Option<i64>,

        /// RFC 3339 / ISO 8601 UTC timestamp; the job becomes eligible at
        /// or after this instant.
        #[arg(long = "run-at")]
        run_at: Option<String>,
    },

    /// Start or stop the worker manager.
    Worker {
        #[command(subcommand)]
        action: WorkerAction,
    },

    /// Print job counts by state and worker-manager status.
    Status,

    /// List jobs, optionally filtered by state.
    List {
        #[arg(long)]
        state: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },

    /// Show one job's full metadata, exit code, stdout and stderr.
    Show {
        id: String,
    },

    /// Inspect or retry dead-lettered jobs.
    Dlq {
        #[command(subcommand)]
        action: DlqAction,
    },

    /// Read or write a configuration key.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Start the read-only HTTP dashboard in the foreground.
    Dashboard {
        #[command(subcommand)]
        action: DashboardAction,
    },

    /// Delete completed jobs older than a duration (supplemental; spec.md
    /// §3's "never deleted by the core" invariant excludes this explicit,
    /// administrator-invoked action).
    Gc {
        /// e.g. `24h`, `30m`, `7d`.
        #[arg(long = "older-than")]
        older_than: String,
    },

    /// Hidden re-exec entry point used internally by `worker start` to
    /// launch the detached manager process. Not part of the documented
    /// CLI surface.
    #[command(hide = true, name = "__run-manager")]
    RunManager {
        #[arg(long)]
        count: usize,
    },
}

#[derive(Subcommand)]
pub enum WorkerAction {
    /// Start `count` worker tasks in a detached manager process.
    Start {
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Signal the manager process to shut down.
    Stop,
}

#[derive(Subcommand)]
pub enum DlqAction {
    List {
        #[arg(long, default_value_t = 50)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    Retry {
        id: String,
        #[arg(long = "max-retries")]
        max_retries: Option<i64>,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
}

#[derive(Subcommand)]
pub enum DashboardAction {
    Start {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 5000)]
        port: u16,
    },
}
