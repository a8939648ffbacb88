//! `env` module
//!
//! Read-only access to the variables a definition is evaluated with: the
//! trigger variables (`COMMIT`, `BRANCH`, `ACTOR`) merged with the pipeline's
//! configured `env_vars`. Where the definition is evaluated decides the
//! provider: the runner passes the real trigger, the CLI and orchestrator
//! evaluate with [`NoVars`] or sample values.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use mlua::prelude::*;
use rollout_core::domain::run::Trigger;

use crate::module::RolloutModule;

/// Source of variables for the `env` module
pub trait VarProvider: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;

    /// Every available variable name, sorted
    fn keys(&self) -> Vec<String>;
}

/// Provider with no variables at all
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVars;

impl VarProvider for NoVars {
    fn get(&self, _name: &str) -> Option<String> {
        None
    }

    fn keys(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Trigger variables layered over pipeline variables
///
/// Trigger variables win on conflicts so a pipeline cannot spoof the commit
/// being built.
#[derive(Debug, Clone, Default)]
pub struct TriggerVars {
    vars: BTreeMap<String, String>,
}

impl TriggerVars {
    pub fn new(trigger: Option<&Trigger>, env_vars: &HashMap<String, String>) -> Self {
        let mut vars: BTreeMap<String, String> = env_vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(trigger) = trigger {
            vars.extend(trigger.variables());
        }
        Self { vars }
    }

    pub fn from_map(vars: HashMap<String, String>) -> Self {
        Self {
            vars: vars.into_iter().collect(),
        }
    }
}

impl VarProvider for TriggerVars {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.vars.keys().cloned().collect()
    }
}

pub struct EnvModule<V: VarProvider> {
    provider: Arc<V>,
}

impl<V: VarProvider> EnvModule<V> {
    pub fn new(provider: V) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }
}

impl<V: VarProvider + 'static> RolloutModule for EnvModule<V> {
    fn id(&self) -> &'static str {
        "env"
    }

    fn description(&self) -> &'static str {
        "trigger and pipeline variables"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let env_table = lua.create_table()?;

        let provider = self.provider.clone();
        env_table.set(
            "get",
            lua.create_function(move |_, (name, default): (String, Option<String>)| {
                Ok(provider.get(&name).or(default))
            })?,
        )?;

        let provider = self.provider.clone();
        env_table.set(
            "require",
            lua.create_function(move |_, name: String| {
                provider.get(&name).ok_or_else(|| {
                    LuaError::RuntimeError(format!(
                        "Required environment variable '{}' is not set",
                        name
                    ))
                })
            })?,
        )?;

        let provider = self.provider.clone();
        env_table.set(
            "has",
            lua.create_function(move |_, name: String| Ok(provider.get(&name).is_some()))?,
        )?;

        let provider = self.provider.clone();
        env_table.set(
            "all",
            lua.create_function(move |lua, ()| {
                let table = lua.create_table()?;
                for key in provider.keys() {
                    if let Some(value) = provider.get(&key) {
                        table.set(key, value)?;
                    }
                }
                Ok(table)
            })?,
        )?;

        let provider = self.provider.clone();
        env_table.set(
            "keys",
            lua.create_function(move |lua, ()| lua.create_sequence_from(provider.keys()))?,
        )?;

        lua.globals().set(self.id(), env_table)
    }

    fn stubs(&self) -> String {
        r#"---@meta

---Variables of the run being defined: COMMIT, BRANCH, ACTOR and the
---pipeline's configured env_vars
---@class env
env = {}

---Returns a variable, or `default` when it is not set
---@param name string
---@param default? string
---@return string?
function env.get(name, default) end

---Returns a variable, raising an error when it is not set
---@param name string
---@return string
function env.require(name) end

---@param name string
---@return boolean
function env.has(name) end

---@return table<string, string>
function env.all() end

---Sorted variable names
---@return string[]
function env.keys() end
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lua_with(vars: &[(&str, &str)]) -> Lua {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let lua = Lua::new();
        EnvModule::new(TriggerVars::from_map(vars))
            .register(&lua)
            .unwrap();
        lua
    }

    #[test]
    fn test_get_with_and_without_default() {
        let lua = lua_with(&[("COMMIT", "abc123")]);

        let commit: String = lua.load(r#"return env.get("COMMIT")"#).eval().unwrap();
        assert_eq!(commit, "abc123");

        let fallback: String = lua
            .load(r#"return env.get("MISSING", "dev")"#)
            .eval()
            .unwrap();
        assert_eq!(fallback, "dev");

        let missing: Option<String> = lua.load(r#"return env.get("MISSING")"#).eval().unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_require_missing_variable_errors() {
        let lua = lua_with(&[("BRANCH", "main")]);

        let branch: String = lua.load(r#"return env.require("BRANCH")"#).eval().unwrap();
        assert_eq!(branch, "main");

        let err = lua
            .load(r#"return env.require("ACTOR")"#)
            .eval::<String>()
            .unwrap_err();
        assert!(err.to_string().contains("Required environment variable 'ACTOR'"));
    }

    #[test]
    fn test_has_all_and_keys() {
        let lua = lua_with(&[("B", "2"), ("A", "1")]);

        let has: bool = lua.load(r#"return env.has("A")"#).eval().unwrap();
        assert!(has);

        let (a, b): (String, String) = lua
            .load("local all = env.all() return all.A, all.B")
            .eval()
            .unwrap();
        assert_eq!((a.as_str(), b.as_str()), ("1", "2"));

        let first: String = lua.load("return env.keys()[1]").eval().unwrap();
        assert_eq!(first, "A");
    }

    #[test]
    fn test_trigger_overrides_pipeline_vars() {
        let trigger = Trigger {
            commit: "abc123".to_string(),
            branch: "main".to_string(),
            actor: "dana".to_string(),
        };
        let env_vars = HashMap::from([
            ("COMMIT".to_string(), "spoofed".to_string()),
            ("REGION".to_string(), "eu".to_string()),
        ]);
        let vars = TriggerVars::new(Some(&trigger), &env_vars);
        assert_eq!(vars.get("COMMIT").as_deref(), Some("abc123"));
        assert_eq!(vars.get("REGION").as_deref(), Some("eu"));
        assert_eq!(vars.keys(), ["ACTOR", "BRANCH", "COMMIT", "REGION"]);
    }

    #[test]
    fn test_no_vars_is_empty() {
        let lua = Lua::new();
        EnvModule::new(NoVars).register(&lua).unwrap();
        let count: i64 = lua.load("return #env.keys()").eval().unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_stubs_cover_every_function() {
        let stubs = EnvModule::new(NoVars).stubs();
        for f in ["get", "require", "has", "all", "keys"] {
            assert!(stubs.contains(&format!("function env.{}", f)));
        }
    }
}
