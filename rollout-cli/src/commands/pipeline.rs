//! Pipeline command handlers
//!
//! Creation, local validation, listing, deletion and manual triggering.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use rollout_core::domain::pipeline::{Pipeline, PipelineConfig};
use rollout_core::domain::run::Trigger;
use rollout_core::dto::pipeline::CreatePipeline;
use rollout_core::dto::run::TriggerRun;
use rollout_lua::{LoadedPipeline, TriggerVars, load_pipeline};
use std::collections::HashMap;

use super::TIME_FORMAT;
use crate::config::Config;
use crate::id_resolver::resolve_pipeline_id;
use rollout_client::OrchestratorClient;

#[derive(Subcommand)]
pub enum PipelineCommands {
    /// Create a pipeline from a Lua definition
    Create {
        /// Path to the Lua definition
        #[arg(short, long)]
        script: String,

        /// Tags (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Maximum stages executing at once within a run
        #[arg(long)]
        max_parallel: Option<usize>,

        /// Default stage timeout in seconds
        #[arg(long)]
        stage_timeout: Option<u64>,

        /// Pipeline variables as KEY=value pairs
        #[arg(short, long, value_parser = parse_key_val)]
        env: Vec<(String, String)>,
    },
    /// Evaluate a definition locally and print its execution order
    Validate {
        /// Path to the Lua definition
        script: String,

        /// Commit to expose as COMMIT while evaluating
        #[arg(long)]
        commit: Option<String>,

        /// Print the evaluated definition as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all pipelines
    List,
    /// Get pipeline details
    Get {
        /// Pipeline ID or unambiguous prefix
        id: String,
    },
    /// Delete a pipeline
    Delete {
        /// Pipeline ID or unambiguous prefix
        id: String,
    },
    /// Queue a run for a commit
    Trigger {
        /// Pipeline ID or unambiguous prefix
        id: String,

        /// Commit SHA to build
        #[arg(short, long)]
        commit: String,

        #[arg(short, long, default_value = "main")]
        branch: String,

        /// Who requested the run
        #[arg(long, env = "USER", default_value = "cli")]
        actor: String,

        /// Cancel in-flight runs of the same pipeline and branch
        #[arg(long)]
        supersede: bool,
    },
}

/// Parse a single KEY=value pair
fn parse_key_val(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("invalid KEY=value: no `=` found in `{}`", s))?;
    if key.is_empty() {
        anyhow::bail!("invalid KEY=value: empty key in `{}`", s);
    }
    Ok((key.to_string(), value.to_string()))
}

pub async fn handle_pipeline_command(command: PipelineCommands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        PipelineCommands::Create {
            script,
            tags,
            max_parallel,
            stage_timeout,
            env,
        } => {
            let mut pipeline_config = PipelineConfig::default();
            if let Some(max_parallel) = max_parallel {
                pipeline_config.max_parallel_stages = max_parallel;
            }
            if stage_timeout.is_some() {
                pipeline_config.stage_timeout_seconds = stage_timeout;
            }
            pipeline_config.env_vars = env.into_iter().collect();
            create_pipeline(&client, &script, tags, pipeline_config).await
        }
        PipelineCommands::Validate {
            script,
            commit,
            json,
        } => validate_pipeline(&script, commit, json),
        PipelineCommands::List => list_pipelines(&client).await,
        PipelineCommands::Get { id } => get_pipeline(&client, &id).await,
        PipelineCommands::Delete { id } => delete_pipeline(&client, &id).await,
        PipelineCommands::Trigger {
            id,
            commit,
            branch,
            actor,
            supersede,
        } => {
            let trigger = Trigger {
                commit,
                branch,
                actor,
            };
            trigger_run(&client, &id, trigger, supersede).await
        }
    }
}

fn read_script(path: &str) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read script file: {}", path))
}

/// Evaluates `source` the way a runner would before executing it
fn load_definition(
    source: &str,
    commit: Option<String>,
    env_vars: &HashMap<String, String>,
) -> Result<LoadedPipeline> {
    let mut vars = env_vars.clone();
    if let Some(commit) = commit {
        vars.insert("COMMIT".to_string(), commit);
    }
    load_pipeline(source, TriggerVars::from_map(vars)).context("Invalid pipeline definition")
}

/// Create a pipeline after checking the definition locally
async fn create_pipeline(
    client: &OrchestratorClient,
    script_path: &str,
    tags: Vec<String>,
    config: PipelineConfig,
) -> Result<()> {
    let script = read_script(script_path)?;
    let loaded = load_definition(&script, None, &config.env_vars)?;

    let pipeline = client
        .create_pipeline(CreatePipeline {
            script,
            tags,
            config: Some(config),
        })
        .await?;

    println!("{}", "✓ Pipeline created successfully!".green().bold());
    println!("  ID:     {}", pipeline.id.to_string().cyan());
    println!("  Name:   {}", pipeline.name.bold());
    println!("  Stages: {}", loaded.plan.order().join(" → ").dimmed());

    Ok(())
}

fn validate_pipeline(script_path: &str, commit: Option<String>, json: bool) -> Result<()> {
    let script = read_script(script_path)?;
    let loaded = load_definition(&script, commit, &HashMap::new())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&loaded.spec)?);
        return Ok(());
    }

    println!(
        "{} {}",
        "✓ Definition is valid:".green().bold(),
        loaded.spec.name.bold()
    );
    println!("\n{}", "Execution order:".bold());
    for (idx, name) in loaded.plan.order().iter().enumerate() {
        let needs = loaded.plan.dependencies(name);
        let deploy = loaded
            .spec
            .stage(name)
            .and_then(|s| s.deploy.as_ref())
            .map(|d| format!(" deploys to {}", d.environment))
            .unwrap_or_default();
        if needs.is_empty() {
            println!("  {}. {}{}", idx + 1, name.cyan(), deploy.yellow());
        } else {
            println!(
                "  {}. {} {}{}",
                idx + 1,
                name.cyan(),
                format!("(needs {})", needs.join(", ")).dimmed(),
                deploy.yellow()
            );
        }
    }

    Ok(())
}

async fn list_pipelines(client: &OrchestratorClient) -> Result<()> {
    let pipelines = client.list_pipelines().await?;

    if pipelines.is_empty() {
        println!("{}", "No pipelines found.".yellow());
    } else {
        println!(
            "{}",
            format!("Found {} pipeline(s):", pipelines.len()).bold()
        );
        println!();
        for pipeline in pipelines {
            print_pipeline_summary(&pipeline);
        }
    }

    Ok(())
}

async fn get_pipeline(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_pipeline_id(client, id).await?;
    let pipeline = client.get_pipeline(uuid).await?;
    print_pipeline_details(&pipeline);
    Ok(())
}

async fn delete_pipeline(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_pipeline_id(client, id).await?;
    client.delete_pipeline(uuid).await?;

    println!(
        "{}",
        format!("✓ Pipeline {} deleted successfully!", uuid)
            .green()
            .bold()
    );

    Ok(())
}

async fn trigger_run(
    client: &OrchestratorClient,
    id: &str,
    trigger: Trigger,
    supersede: bool,
) -> Result<()> {
    let pipeline_id = resolve_pipeline_id(client, id).await?;

    let run = client
        .trigger_run(TriggerRun {
            pipeline_id,
            trigger,
            supersede,
        })
        .await?;

    println!("{}", "✓ Run queued!".green().bold());
    println!("  Run ID:      {}", run.id.to_string().cyan());
    println!("  Pipeline ID: {}", run.pipeline_id.to_string().dimmed());
    println!(
        "  Commit:      {} on {}",
        run.trigger.commit.bold(),
        run.trigger.branch
    );
    println!("  Status:      {}", run.status.to_string().yellow());

    Ok(())
}

fn print_pipeline_summary(pipeline: &Pipeline) {
    println!("  {} {}", "▸".cyan(), pipeline.name.bold());
    println!("    ID:      {}", pipeline.id.to_string().dimmed());
    println!(
        "    Created: {}",
        pipeline.created_at.format(TIME_FORMAT).to_string().dimmed()
    );
    if let Some(desc) = &pipeline.description {
        println!("    Description: {}", desc.dimmed());
    }
    if !pipeline.tags.is_empty() {
        println!("    Tags:    {}", pipeline.tags.join(", ").dimmed());
    }
    println!();
}

fn print_pipeline_details(pipeline: &Pipeline) {
    println!("{}", "Pipeline Details:".bold());
    println!("  ID:           {}", pipeline.id.to_string().cyan());
    println!("  Name:         {}", pipeline.name.bold());
    if let Some(desc) = &pipeline.description {
        println!("  Description:  {}", desc);
    }
    println!("  Created:      {}", pipeline.created_at.format(TIME_FORMAT));
    println!("  Updated:      {}", pipeline.updated_at.format(TIME_FORMAT));
    if !pipeline.tags.is_empty() {
        println!("  Tags:         {}", pipeline.tags.join(", "));
    }
    println!(
        "  Parallelism:  {}",
        pipeline.config.max_parallel_stages
    );
    if let Some(timeout) = pipeline.config.stage_timeout_seconds {
        println!("  Stage limit:  {}s", timeout);
    }
    if !pipeline.config.env_vars.is_empty() {
        let mut keys: Vec<&String> = pipeline.config.env_vars.keys().collect();
        keys.sort();
        let keys: Vec<&str> = keys.into_iter().map(String::as_str).collect();
        println!("  Variables:    {}", keys.join(", "));
    }

    println!("\n{}", "Script:".bold());
    println!("{}", "─".repeat(80).dimmed());
    println!("{}", pipeline.script);
    println!("{}", "─".repeat(80).dimmed());
}
