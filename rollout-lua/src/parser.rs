//! Pipeline definition parser
//!
//! Evaluates a Lua pipeline definition inside the sandbox and converts the
//! resulting table into a [`PipelineSpec`]. Evaluation never executes any
//! stage work; actions are data until the runner executes them.

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow, bail};
use mlua::{Table, Value};
use rollout_core::domain::artifact::ArtifactId;
use rollout_core::domain::deployment::{Backoff, DeploySpec, HealthCheckPolicy, PortBinding};
use rollout_core::domain::pipeline::{ActionSpec, PipelineSpec, StageSpec};
use rollout_core::domain::plan::ExecutionPlan;

use crate::module::ModuleRegistry;
use crate::modules::{EnvModule, NoVars, VarProvider};
use crate::sandbox::create_sandbox;

/// Default cap for exponential health check delays, in seconds
const DEFAULT_MAX_INTERVAL_SECS: f64 = 60.0;

/// A parsed definition together with its validated execution plan
#[derive(Debug, Clone)]
pub struct LoadedPipeline {
    pub spec: PipelineSpec,
    pub plan: ExecutionPlan,
}

/// Parse a pipeline definition with no variables available to `env`
///
/// # Example
/// ```no_run
/// use rollout_lua::parser::parse_pipeline_spec;
///
/// let spec = parse_pipeline_spec(r#"
///     return pipeline.define {
///         name = "web",
///         stages = {
///             pipeline.stage { name = "test", run = "cargo test" },
///             pipeline.stage { name = "build", needs = "test", run = "cargo build" },
///         },
///     }
/// "#)?;
/// assert_eq!(spec.stages.len(), 2);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn parse_pipeline_spec(source: &str) -> Result<PipelineSpec> {
    parse_pipeline_spec_with(source, NoVars)
}

/// Parse a pipeline definition, exposing `provider` through the `env` module
pub fn parse_pipeline_spec_with<V: VarProvider + 'static>(
    source: &str,
    provider: V,
) -> Result<PipelineSpec> {
    let lua = create_sandbox().context("Failed to create sandbox")?;

    let mut registry = ModuleRegistry::new();
    registry.register(EnvModule::new(provider))?;
    registry
        .register_all(&lua)
        .context("Failed to register modules")?;

    let value: Value = lua
        .load(source)
        .eval()
        .context("Failed to evaluate pipeline definition")?;
    let Value::Table(pipeline) = value else {
        bail!("Pipeline definition must return a table");
    };

    let name: String = pipeline
        .get::<Option<String>>("name")?
        .ok_or_else(|| anyhow!("Pipeline must have a 'name' field"))?;
    let description: Option<String> = pipeline.get("description")?;
    let stages = parse_stages(&pipeline)?;

    Ok(PipelineSpec {
        name,
        description,
        stages,
    })
}

/// Parse a definition and validate it into an execution plan
///
/// Graph problems surface as a [`ConfigurationError`] that can be recovered
/// with `downcast_ref`.
///
/// [`ConfigurationError`]: rollout_core::error::ConfigurationError
pub fn load_pipeline<V: VarProvider + 'static>(source: &str, provider: V) -> Result<LoadedPipeline> {
    let commit = provider.get("COMMIT");
    let spec = parse_pipeline_spec_with(source, provider)?;
    let plan = spec.plan()?;

    if let Some(commit) = commit {
        if spec.deploy_stages().next().is_some() {
            ArtifactId::parse(commit)?;
        }
    }

    Ok(LoadedPipeline { spec, plan })
}

fn parse_stages(pipeline: &Table) -> Result<Vec<StageSpec>> {
    let stages_table: Table = pipeline
        .get::<Option<Table>>("stages")?
        .ok_or_else(|| anyhow!("Pipeline must have a 'stages' field"))?;

    let mut stages = Vec::new();
    for (idx, entry) in stages_table.sequence_values::<Table>().enumerate() {
        let stage_table = entry.with_context(|| format!("Stage #{} must be a table", idx + 1))?;
        stages.push(parse_stage(&stage_table)?);
    }

    if stages.is_empty() {
        bail!("Pipeline must have at least one stage");
    }

    Ok(stages)
}

fn parse_stage(table: &Table) -> Result<StageSpec> {
    let name: String = table
        .get::<Option<String>>("name")?
        .ok_or_else(|| anyhow!("Stage must have a 'name' field"))?;
    let ctx = |field: &str| format!("Stage '{}': invalid '{}'", name, field);

    let needs = match table.get::<Value>("needs")? {
        Value::Nil => Vec::new(),
        Value::String(s) => vec![s.to_str()?.to_string()],
        Value::Table(t) => t
            .sequence_values::<String>()
            .collect::<mlua::Result<Vec<_>>>()
            .with_context(|| ctx("needs"))?,
        _ => bail!("{}: expected a string or an array of strings", ctx("needs")),
    };

    let mut actions = Vec::new();
    if let Some(run) = table.get::<Option<String>>("run").with_context(|| ctx("run"))? {
        actions.push(ActionSpec::shell(run));
    }
    if let Some(list) = table.get::<Option<Table>>("actions").with_context(|| ctx("actions"))? {
        for entry in list.sequence_values::<Value>() {
            let entry = entry.with_context(|| ctx("actions"))?;
            actions.push(parse_action(entry).with_context(|| ctx("actions"))?);
        }
    }

    let timeout_ms = table
        .get::<Option<f64>>("timeout")
        .with_context(|| ctx("timeout"))?
        .map(|secs| seconds_to_ms(secs, "timeout"))
        .transpose()
        .with_context(|| ctx("timeout"))?;
    if timeout_ms == Some(0) {
        bail!("{}: must be at least one millisecond", ctx("timeout"));
    }

    let deploy = table
        .get::<Option<Table>>("deploy")
        .with_context(|| ctx("deploy"))?
        .map(|t| parse_deploy(&t))
        .transpose()
        .with_context(|| ctx("deploy"))?;

    Ok(StageSpec {
        name,
        needs,
        actions,
        timeout_ms,
        deploy,
    })
}

fn parse_action(value: Value) -> Result<ActionSpec> {
    let table = match value {
        Value::String(s) => return Ok(ActionSpec::shell(s.to_str()?.to_string())),
        Value::Table(t) => t,
        other => bail!("action must be a string or a table, got {}", other.type_name()),
    };

    let kind = match table.get::<Option<String>>("kind")? {
        Some(kind) => kind,
        None if table.contains_key("cmd")? => "command".to_string(),
        None => "shell".to_string(),
    };
    match kind.as_str() {
        "shell" => {
            let script: String = table
                .get::<Option<String>>("script")?
                .ok_or_else(|| anyhow!("shell action requires 'script'"))?;
            Ok(ActionSpec::Shell { script })
        }
        "command" => {
            let cmd: String = table
                .get::<Option<String>>("cmd")?
                .ok_or_else(|| anyhow!("command action requires 'cmd'"))?;
            let args = match table.get::<Option<Table>>("args")? {
                Some(t) => t.sequence_values::<String>().collect::<mlua::Result<_>>()?,
                None => Vec::new(),
            };
            Ok(ActionSpec::Command {
                cmd,
                args,
                cwd: table.get("cwd")?,
                env: string_map(&table, "env")?,
            })
        }
        other => bail!("unknown action kind '{}'", other),
    }
}

fn parse_deploy(table: &Table) -> Result<DeploySpec> {
    let environment: String = table
        .get::<Option<String>>("environment")?
        .ok_or_else(|| anyhow!("deploy requires 'environment'"))?;
    let repository: String = table
        .get::<Option<String>>("repository")?
        .ok_or_else(|| anyhow!("deploy requires 'repository'"))?;
    let host = table
        .get::<Option<String>>("host")?
        .filter(|h| h != "local");
    let container = table
        .get::<Option<String>>("container")?
        .unwrap_or_else(|| environment.clone());

    let port = match table.get::<Option<Table>>("port")? {
        Some(p) => Some(PortBinding {
            host: p
                .get::<Option<u16>>("host")?
                .ok_or_else(|| anyhow!("port requires 'host'"))?,
            container: p
                .get::<Option<u16>>("container")?
                .ok_or_else(|| anyhow!("port requires 'container'"))?,
        }),
        None => None,
    };

    let health_table: Table = table
        .get::<Option<Table>>("health")?
        .ok_or_else(|| anyhow!("deploy requires a 'health' block"))?;

    Ok(DeploySpec {
        environment,
        repository,
        host,
        container,
        port,
        env: string_map(table, "env")?,
        health: parse_health(&health_table)?,
    })
}

fn parse_health(table: &Table) -> Result<HealthCheckPolicy> {
    let url: String = table
        .get::<Option<String>>("url")?
        .ok_or_else(|| anyhow!("health requires 'url'"))?;
    let mut policy = HealthCheckPolicy::new(url);

    if let Some(retries) = table.get::<Option<u32>>("retries")? {
        policy.retries = retries;
    }
    if let Some(interval) = table.get::<Option<f64>>("interval")? {
        policy.interval_ms = seconds_to_ms(interval, "interval")?;
    }
    if let Some(timeout) = table.get::<Option<f64>>("timeout")? {
        policy.timeout_ms = seconds_to_ms(timeout, "timeout")?;
    }
    if let Some(expect) = table.get::<Option<String>>("expect")? {
        policy.expected_status = expect;
    }

    policy.backoff = match table.get::<Option<String>>("backoff")?.as_deref() {
        None | Some("fixed") => Backoff::Fixed,
        Some("exponential") => {
            let max = table
                .get::<Option<f64>>("max_interval")?
                .unwrap_or(DEFAULT_MAX_INTERVAL_SECS);
            Backoff::Exponential {
                max_interval_ms: seconds_to_ms(max, "max_interval")?,
            }
        }
        Some(other) => bail!("unknown backoff '{}', expected 'fixed' or 'exponential'", other),
    };

    Ok(policy)
}

fn string_map(table: &Table, key: &str) -> Result<HashMap<String, String>> {
    match table.get::<Option<Table>>(key)? {
        Some(t) => t
            .pairs::<String, String>()
            .collect::<mlua::Result<_>>()
            .with_context(|| format!("'{}' must map strings to strings", key)),
        None => Ok(HashMap::new()),
    }
}

fn seconds_to_ms(secs: f64, field: &str) -> Result<u64> {
    if !secs.is_finite() || secs < 0.0 {
        bail!("'{}' must be a non-negative number of seconds", field);
    }
    Ok((secs * 1000.0).round() as u64)
}
