//! `queuectl` — CLI entry point (spec §6). Parses arguments, initializes
//! logging, dispatches to `commands`, and maps `QueuectlError` to the
//! documented exit codes: 0 success, 1 user-facing validation/state error,
//! 2 internal (storage/IO) error.

mod cli;
mod commands;
mod logging;
mod table;

use clap::Parser;
use cli::{Cli, Command};
use queuectl_core::QueuectlError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let db_path = commands::resolve_db_path(cli.db.as_deref());

    // The hidden manager entry point installs its own file-backed
    // subscriber inside `commands::run_manager`; every other command logs
    // to stderr.
    if !matches!(cli.command, Command::RunManager { .. }) {
        logging::init_cli();
    }

    let result = dispatch(cli.command, &db_path).await;

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(err.exit_code());
    }
}

async fn dispatch(command: Command, db_path: &str) -> Result<(), QueuectlError> {
    match command {
        Command::InitDb => commands::init_db(db_path).await,

        Command::Enqueue {
            json,
            command_flag,
            id,
            max_retries,
            priority,
            run_at,
        } => commands::enqueue(db_path, json, command_flag, id, max_retries, priority, run_at).await,

        Command::Worker { action } => commands::worker(db_path, action).await,

        Command::Status => commands::status(db_path).await,

        Command::List { state, limit, offset } => commands::list(db_path, state, limit, offset).await,

        Command::Show { id } => commands::show(db_path, &id).await,

        Command::Dlq { action } => commands::dlq(db_path, action).await,

        Command::Config { action } => commands::config(db_path, action).await,

        Command::Dashboard { action } => commands::dashboard(db_path, action).await,

        Command::Gc { older_than } => commands::gc(db_path, &older_than).await,

        Command::RunManager { count } => commands::run_manager(db_path, count).await,
    }
}
