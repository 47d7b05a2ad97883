//! # tt - task tracker CLI
//!
//! A command-line client for a remote task service: tasks with priority, status and due
//! dates, each carrying an ordered checklist of subtasks, plus an optional terminal board.
//!
//! ## Key Features
//!
//! - **Server wins**: every change is sent to the service first and applied locally only
//!   from the service's confirmed answer; a failed call leaves everything as it was.
//! - **Subtasks with progress**: per-task completion percentage computed from subtasks.
//! - **Draft tasks**: subtasks can be attached to a new task before it exists remotely.
//! - **Filters**: ongoing/completed/all by status, and by priority.
//! - **Interactive board**: `tt ui` for browsing, toggling and editing with the keyboard.
//!
//! ## Quick Start
//!
//! ```bash
//! # Sign in (the credential is remembered)
//! tt login --email me@example.com --password secret
//!
//! # Add a task with two subtasks
//! tt add "Plan trip" --due friday --subtask "Book flights" --subtask "Pack"
//!
//! # List ongoing high priority tasks
//! tt list --priority high
//!
//! # Tick off a subtask
//! tt subtask toggle 12 31
//!
//! # Launch the board
//! tt ui
//! ```
//!
//! ## Configuration
//!
//! Settings are layered (highest wins): `TT_*` environment variables (`__` between
//! section and key, e.g. `TT_SERVER__BASE_URL`), `--config <file>`, `./.tt.toml`, then
//! `<config_dir>/task_tracker/config.toml`. A `.env` file in the working directory is
//! loaded first. `TT_LOG` sets the log filter.

use std::sync::Arc;

use clap::Parser;

pub mod cli;
pub mod cmd;
pub mod config;
pub mod display;
pub mod error;
pub mod fields;
pub mod filter;
pub mod gateway;
pub mod session;
pub mod store;
pub mod subtask_repo;
pub mod task;
pub mod task_repo;
pub mod tui {
    pub mod app;
    pub mod colors;
    pub mod enums;
    pub mod input;
    pub mod run;
    pub mod utils;
}

#[cfg(test)]
mod testing;

use cli::Cli;
use cmd::*;
use config::AppConfig;
use error::StoreError;
use session::Session;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("tt error: {error:#}");
        if error
            .downcast_ref::<StoreError>()
            .is_some_and(StoreError::is_auth)
        {
            eprintln!("Run `tt login` to sign in.");
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();
    init_tracing(cli.quiet, cli.verbose, matches!(cli.command, Commands::Ui))?;

    if let Commands::Completions { shell } = cli.command {
        cmd_completions(shell);
        return Ok(());
    }

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(server) = cli.server {
        config.server.base_url = server;
        config.validate()?;
    }
    tracing::debug!(base_url = %config.server.base_url, "configuration loaded");

    let session = Arc::new(Session::load(&config.credentials_path()));
    let ctx = Context::new(&config, session)?;

    match cli.command {
        Commands::Login { email, password } => cmd_login(&ctx, email, password).await,
        Commands::Signup {
            name,
            email,
            password,
        } => cmd_signup(&ctx, name, email, password).await,
        Commands::Logout => {
            cmd_logout(&ctx);
            Ok(())
        }
        Commands::ResendVerification { email } => cmd_resend_verification(&ctx, email).await,
        Commands::Profile { name } => cmd_profile(&ctx, name).await,
        Commands::Whoami => cmd_whoami(&ctx).await,
        Commands::Ui => cmd_ui(&ctx),
        Commands::List {
            status,
            priority,
            limit,
        } => cmd_list(&ctx, status, priority, limit).await,
        Commands::View { id, subtasks } => cmd_view(&ctx, id, subtasks).await,
        Commands::Add {
            title,
            desc,
            priority,
            status,
            due,
            subtasks,
        } => cmd_add(&ctx, title, desc, priority, status, due, subtasks).await,
        Commands::Update {
            id,
            title,
            desc,
            priority,
            status,
            due,
        } => cmd_update(&ctx, id, title, desc, priority, status, due).await,
        Commands::Status { id, status } => cmd_status(&ctx, id, status).await,
        Commands::Complete { id } => cmd_status(&ctx, id, fields::Status::Completed).await,
        Commands::Reopen { id } => cmd_status(&ctx, id, fields::Status::Pending).await,
        Commands::Toggle { id } => cmd_toggle(&ctx, id).await,
        Commands::Delete { id } => cmd_delete(&ctx, id).await,
        Commands::Subtask { action } => cmd_subtask(&ctx, action).await,
        Commands::Completions { .. } => unreachable!("completions handled above"),
    }
}

/// Install the stderr log subscriber. `TT_LOG` wins over the flags; the board defaults to
/// errors only so log lines do not land on top of it.
fn init_tracing(quiet: bool, verbose: bool, board: bool) -> anyhow::Result<()> {
    let level = if quiet || board {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("TT_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
