//! Commands module
//!
//! Defines all CLI commands and routes them to their handlers.

mod deploy;
mod init;
mod pipeline;
mod run;

pub use deploy::DeployCommands;
pub use init::InitCommands;
pub use pipeline::PipelineCommands;
pub use run::RunCommands;

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use rollout_core::domain::log::{LogEntry, LogLevel};

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Pipeline management
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },
    /// Run inspection and control
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },
    /// Deployment history per environment
    Deploy {
        #[command(subcommand)]
        command: DeployCommands,
    },
    /// Initialize development environment
    Init {
        #[command(subcommand)]
        command: InitCommands,
    },
}

pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Pipeline { command } => pipeline::handle_pipeline_command(command, config).await,
        Commands::Run { command } => run::handle_run_command(command, config).await,
        Commands::Deploy { command } => deploy::handle_deploy_command(command, config).await,
        Commands::Init { command } => init::handle_init_command(command),
    }
}

/// Shared timestamp format for all listings
pub(crate) const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn print_log_entry(log: &LogEntry) {
    let level_str = log.level.to_string().to_uppercase();
    let level_colored = match log.level {
        LogLevel::Debug => level_str.dimmed(),
        LogLevel::Info => level_str.cyan(),
        LogLevel::Warning => level_str.yellow(),
        LogLevel::Error => level_str.red(),
    };

    println!(
        "{} [{}] {}",
        log.timestamp.format("%H:%M:%S").to_string().dimmed(),
        level_colored,
        log.message
    );
}
