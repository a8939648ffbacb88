//! Run command handlers
//!
//! Listing runs, per-stage results, logs and cancellation.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use rollout_core::domain::run::{Run, RunStatus};
use rollout_core::domain::stage::{StageResult, StageStatus};

use super::{TIME_FORMAT, print_log_entry};
use crate::config::Config;
use crate::id_resolver::{resolve_pipeline_id, resolve_run_id};
use rollout_client::OrchestratorClient;

#[derive(Subcommand)]
pub enum RunCommands {
    /// List all runs
    List,
    /// List runs waiting for a runner
    Queued,
    /// Get run details
    Get {
        /// Run ID or unambiguous prefix
        id: String,
    },
    /// Show per-stage results of a run
    Stages {
        /// Run ID or unambiguous prefix
        id: String,

        /// Include captured action output
        #[arg(short, long)]
        output: bool,
    },
    /// Show run logs
    Logs {
        /// Run ID or unambiguous prefix
        id: String,
    },
    /// Cancel a queued or running run
    Cancel {
        /// Run ID or unambiguous prefix
        id: String,
    },
    /// List runs of a pipeline
    Pipeline {
        /// Pipeline ID or unambiguous prefix
        pipeline_id: String,
    },
}

pub async fn handle_run_command(command: RunCommands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        RunCommands::List => {
            let runs = client.list_runs().await?;
            print_runs(&runs, "No runs found.", "run(s)");
            Ok(())
        }
        RunCommands::Queued => {
            let runs = client.list_queued_runs().await?;
            print_runs(&runs, "No queued runs.", "queued run(s)");
            Ok(())
        }
        RunCommands::Get { id } => get_run(&client, &id).await,
        RunCommands::Stages { id, output } => show_stages(&client, &id, output).await,
        RunCommands::Logs { id } => show_logs(&client, &id).await,
        RunCommands::Cancel { id } => cancel_run(&client, &id).await,
        RunCommands::Pipeline { pipeline_id } => {
            let pipeline_id = resolve_pipeline_id(&client, &pipeline_id).await?;
            let runs = client.list_runs_by_pipeline(pipeline_id).await?;
            print_runs(
                &runs,
                &format!("No runs found for pipeline {}.", pipeline_id),
                &format!("run(s) for pipeline {}", pipeline_id),
            );
            Ok(())
        }
    }
}

fn print_runs(runs: &[Run], empty: &str, noun: &str) {
    if runs.is_empty() {
        println!("{}", empty.yellow());
        return;
    }
    println!("{}", format!("Found {} {}:", runs.len(), noun).bold());
    println!();
    for run in runs {
        print_run_summary(run);
    }
}

async fn get_run(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_run_id(client, id).await?;
    let run = client.get_run(uuid).await?;
    print_run_details(&run);
    Ok(())
}

async fn show_stages(client: &OrchestratorClient, id: &str, output: bool) -> Result<()> {
    let uuid = resolve_run_id(client, id).await?;
    let stages = client.list_stages(uuid).await?;

    if stages.is_empty() {
        println!("{}", "No stage results reported yet.".yellow());
        return Ok(());
    }

    println!("{}", format!("Stages of run {}:", uuid).bold());
    for stage in &stages {
        print_stage(stage, output);
    }

    Ok(())
}

async fn show_logs(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_run_id(client, id).await?;
    let logs = client.get_logs(uuid).await?;

    if logs.is_empty() {
        println!("{}", "No logs found for this run.".yellow());
    } else {
        println!("{}", format!("Logs for run {}:", uuid).bold());
        println!("{}", "─".repeat(80).dimmed());
        for log in &logs {
            print_log_entry(log);
        }
        println!("{}", "─".repeat(80).dimmed());
    }

    Ok(())
}

async fn cancel_run(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_run_id(client, id).await?;
    let run = client.cancel_run(uuid).await?;

    if run.status == RunStatus::Cancelled {
        println!("{}", format!("✓ Run {} cancelled.", uuid).green().bold());
    } else {
        println!(
            "{}",
            format!("✓ Cancellation requested for run {}.", uuid)
                .green()
                .bold()
        );
        println!(
            "  {}",
            "The runner stops at the next stage boundary.".dimmed()
        );
    }

    Ok(())
}

fn print_run_summary(run: &Run) {
    println!("  {} Run {}", "▸".cyan(), run.id.to_string().dimmed());
    println!("    Pipeline: {}", run.pipeline_id.to_string().dimmed());
    println!("    Status:   {}", colorize_status(run.status));
    println!(
        "    Commit:   {} ({})",
        run.trigger.commit, run.trigger.branch
    );
    println!(
        "    Created:  {}",
        run.requested_at.format(TIME_FORMAT).to_string().dimmed()
    );
    if let Some(runner) = &run.runner_id {
        println!("    Runner:   {}", runner.dimmed());
    }
    println!();
}

fn print_run_details(run: &Run) {
    println!("{}", "Run Details:".bold());
    println!("  ID:          {}", run.id.to_string().cyan());
    println!("  Pipeline ID: {}", run.pipeline_id.to_string().dimmed());
    println!("  Status:      {}", colorize_status(run.status));
    println!("  Commit:      {}", run.trigger.commit.bold());
    println!("  Branch:      {}", run.trigger.branch);
    println!("  Actor:       {}", run.trigger.actor);
    println!("  Requested:   {}", run.requested_at.format(TIME_FORMAT));

    if let Some(started) = run.started_at {
        println!("  Started:     {}", started.format(TIME_FORMAT));
    }
    if let Some(completed) = run.completed_at {
        println!("  Completed:   {}", completed.format(TIME_FORMAT));
        if let Some(started) = run.started_at {
            let seconds = completed.signed_duration_since(started).num_seconds();
            println!("  Duration:    {}s", seconds);
        }
    }
    if let Some(runner) = &run.runner_id {
        println!("  Runner:      {}", runner);
    }
    if run.cancel_requested && !run.status.is_terminal() {
        println!("  {}", "Cancellation requested".yellow());
    }

    if let Some(result) = &run.result {
        println!("\n{}", "Result:".bold());
        println!(
            "  Success:    {}",
            if result.success {
                "✓".green()
            } else {
                "✗".red()
            }
        );
        if let Some(error) = &result.error_message {
            println!("  Error:      {}", error.red());
        }
    }
}

fn print_stage(stage: &StageResult, output: bool) {
    let status = match stage.status {
        StageStatus::Succeeded => "✓".green(),
        StageStatus::Failed => "✗".red(),
        StageStatus::Skipped => "-".dimmed(),
        StageStatus::Pending | StageStatus::Running => "…".cyan(),
    };
    println!("  {} {} {}", status, stage.stage.bold(), stage.status.to_string().dimmed());

    if let Some(started) = stage.started_at {
        let millis = stage
            .finished_at
            .signed_duration_since(started)
            .num_milliseconds();
        println!("      took {}ms", millis);
    }
    if let Some(code) = stage.exit_code {
        println!("      exit code {}", code);
    }
    if let Some(error) = &stage.error {
        println!("      {}", error.to_string().red());
    }
    if output && !stage.output.is_empty() {
        for line in stage.output.lines() {
            println!("      {} {}", "│".dimmed(), line);
        }
    }
}

fn colorize_status(status: RunStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        RunStatus::Queued => status_str.yellow(),
        RunStatus::Running => status_str.cyan(),
        RunStatus::Succeeded => status_str.green(),
        RunStatus::Failed => status_str.red(),
        RunStatus::Cancelled => status_str.dimmed(),
    }
}
