//! Deployment command handlers

use anyhow::{Result, bail};
use clap::Subcommand;
use colored::*;
use rollout_core::domain::artifact::{Artifact, ArtifactId};
use rollout_core::domain::deployment::{DeploymentOutcome, DeploymentRecord, HealthOutcome};
use rollout_core::dto::deployment::AcknowledgeDeployment;

use super::TIME_FORMAT;
use crate::config::Config;
use rollout_client::OrchestratorClient;

#[derive(Subcommand)]
pub enum DeployCommands {
    /// Show every deploy attempt for an environment, oldest first
    History {
        environment: String,

        /// Only show the most recent N attempts
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show which artifact is live in an environment
    Current { environment: String },
    /// Clear an inconsistent environment after fixing it by hand
    Acknowledge {
        environment: String,

        /// Artifact id verified to be running now; omit if nothing is
        #[arg(long)]
        live: Option<String>,

        /// Image repository of the live artifact (defaults to the failed attempt's)
        #[arg(long)]
        repository: Option<String>,

        /// Free-form note stored on the record
        #[arg(short, long)]
        note: Option<String>,
    },
}

pub async fn handle_deploy_command(command: DeployCommands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        DeployCommands::History { environment, limit } => {
            let history = client.deployment_history(&environment).await?;
            if history.is_empty() {
                println!(
                    "{}",
                    format!("No deployments recorded for {}.", environment).yellow()
                );
                return Ok(());
            }

            let skip = limit.map_or(0, |n| history.len().saturating_sub(n));
            println!(
                "{}",
                format!("Deployments to {} ({} total):", environment, history.len()).bold()
            );
            println!();
            for record in &history[skip..] {
                print_record(record);
            }
            Ok(())
        }
        DeployCommands::Current { environment } => {
            let current = client.current_deployment(&environment).await?;
            match (&current.artifact, current.inconsistent) {
                (_, true) => {
                    println!(
                        "{}",
                        format!("✗ {} is in an inconsistent state", environment)
                            .red()
                            .bold()
                    );
                    println!("  {}", "Operator intervention required.".red());
                }
                (Some(artifact), false) => {
                    println!("{}: {}", environment.bold(), artifact.to_string().green());
                }
                (None, false) => {
                    println!(
                        "{}",
                        format!("Nothing deployed to {} yet.", environment).yellow()
                    );
                }
            }
            if let Some(record_id) = current.record_id {
                println!("  Latest record: {}", record_id.to_string().dimmed());
            }
            Ok(())
        }
        DeployCommands::Acknowledge {
            environment,
            live,
            repository,
            note,
        } => {
            let history = client.deployment_history(&environment).await?;
            let Some(latest) = history.last() else {
                bail!("No deployments recorded for {}", environment);
            };
            let live = live_artifact(latest, live, repository)?;
            let record = client
                .acknowledge_deployment(&environment, &AcknowledgeDeployment { live, note })
                .await?;

            println!(
                "{}",
                format!("✓ Inconsistent state of {} acknowledged", environment).green()
            );
            print_record(&record);
            Ok(())
        }
    }
}

/// Resolves `--live`/`--repository` against the attempt being acknowledged
fn live_artifact(
    latest: &DeploymentRecord,
    live: Option<String>,
    repository: Option<String>,
) -> Result<Option<Artifact>> {
    let Some(id) = live else {
        if repository.is_some() {
            bail!("--repository needs --live");
        }
        return Ok(None);
    };
    let id = ArtifactId::parse(id)?;
    let repository = repository.unwrap_or_else(|| latest.artifact.repository.clone());
    Ok(Some(Artifact::new(id, repository)))
}

fn print_record(record: &DeploymentRecord) {
    println!(
        "  {} {} {}",
        "▸".cyan(),
        colorize_outcome(record.outcome),
        record.artifact.id.as_str().bold()
    );
    println!(
        "    Recorded: {}",
        record.recorded_at.format(TIME_FORMAT).to_string().dimmed()
    );
    let previous = record
        .previous
        .as_ref()
        .map(|a| a.id.as_str().to_string())
        .unwrap_or_else(|| "none".to_string());
    let current = record
        .current
        .as_ref()
        .map(|a| a.id.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!("    Live:     {} → {}", previous.dimmed(), current);
    println!("    Health:   {}", describe_health(&record.health));
    if let Some(rollback) = &record.rollback_health {
        println!("    Rollback: {}", describe_health(rollback));
    }
    if let Some(error) = &record.error {
        println!("    Error:    {}", error.red());
    }
    if let Some(run_id) = record.run_id {
        println!("    Run:      {}", run_id.to_string().dimmed());
    }
    println!();
}

fn describe_health(health: &HealthOutcome) -> String {
    match health {
        HealthOutcome::NotChecked => "not checked".to_string(),
        HealthOutcome::Healthy { attempts } => format!("healthy after {} attempt(s)", attempts),
        HealthOutcome::Unhealthy {
            attempts,
            last_error,
        } => format!("unhealthy after {} attempt(s): {}", attempts, last_error),
    }
}

fn colorize_outcome(outcome: DeploymentOutcome) -> ColoredString {
    let label = outcome.as_str();
    match outcome {
        DeploymentOutcome::Committed => label.green(),
        DeploymentOutcome::RolledBack => label.yellow(),
        DeploymentOutcome::Failed => label.red(),
        DeploymentOutcome::Inconsistent => label.red().bold(),
        DeploymentOutcome::Acknowledged => label.cyan(),
    }
}
