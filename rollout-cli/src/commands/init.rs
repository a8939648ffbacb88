//! Init command handlers
//!
//! Generates editor support for pipeline definitions: a `.luarc.json`
//! for the Lua language server and LuaLS stub files for every global the
//! definition sandbox provides.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use rollout_lua::{EnvModule, ModuleRegistry, NoVars, PIPELINE_STUBS};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory, relative to the output directory, holding generated stubs
const STUBS_DIR: &str = ".rollout/stubs";

#[derive(Subcommand)]
pub enum InitCommands {
    /// Generate Lua development files (.luarc.json and stubs)
    Lua {
        /// Output directory for generated files
        #[arg(short, long, default_value = ".")]
        output: String,

        /// Generate only .luarc.json
        #[arg(long, conflicts_with = "stubs_only")]
        config_only: bool,

        /// Generate only stub files
        #[arg(long)]
        stubs_only: bool,
    },
}

pub fn handle_init_command(command: InitCommands) -> Result<()> {
    match command {
        InitCommands::Lua {
            output,
            config_only,
            stubs_only,
        } => {
            let output = Path::new(&output);
            if !stubs_only {
                let path = write_luarc_json(output)?;
                println!("  {} {}", "Created".green(), path.display());
            }
            if !config_only {
                for path in write_stub_files(output)? {
                    println!("  {} {}", "Created".green(), path.display());
                }
            }

            println!("{}", "✓ Lua development files generated!".green().bold());
            println!();
            println!("{}", "Next steps:".bold());
            println!("  1. Install Lua Language Server in your editor");
            println!(
                "  2. Check a definition with {}",
                "rollout pipeline validate <file>".cyan()
            );
            println!(
                "  3. Register it with {}",
                "rollout pipeline create --script <file>".cyan()
            );
            Ok(())
        }
    }
}

fn write_luarc_json(output: &Path) -> Result<PathBuf> {
    let path = output.join(".luarc.json");
    let content = serde_json::json!({
        "$schema": "https://raw.githubusercontent.com/sumneko/vscode-lua/master/setting/schema.json",
        "runtime": { "version": "Lua 5.4" },
        "diagnostics": { "globals": ["pipeline", "env"] },
        "workspace": { "library": [STUBS_DIR], "checkThirdParty": false },
        "completion": { "callSnippet": "Both" }
    });

    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory {:?}", output))?;
    fs::write(&path, serde_json::to_string_pretty(&content)? + "\n")
        .with_context(|| format!("Failed to write .luarc.json to {:?}", path))?;
    Ok(path)
}

/// Writes one stub file per sandbox global
///
/// Module stubs come from the module implementations themselves, so they
/// cannot drift from what the loader registers.
fn write_stub_files(output: &Path) -> Result<Vec<PathBuf>> {
    let stubs_dir = output.join(STUBS_DIR);
    fs::create_dir_all(&stubs_dir)
        .with_context(|| format!("Failed to create stubs directory at {:?}", stubs_dir))?;

    let mut registry = ModuleRegistry::new();
    registry.register(EnvModule::new(NoVars))?;

    let mut files = vec![("pipeline".to_string(), PIPELINE_STUBS.to_string())];
    for id in registry.ids() {
        if let Some(module) = registry.get(id) {
            files.push((id.to_string(), module.stubs()));
        }
    }

    let mut written = Vec::with_capacity(files.len());
    for (name, content) in files {
        let path = stubs_dir.join(format!("{}.lua", name));
        fs::write(&path, content)
            .with_context(|| format!("Failed to write stub file {:?}", path))?;
        written.push(path);
    }
    Ok(written)
}
