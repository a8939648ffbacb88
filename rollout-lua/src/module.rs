//! Lua module trait and registry
//!
//! Modules expose host functionality to pipeline definitions as Lua globals.
//! Each module also ships LuaLS stubs so editors can type-check definitions.

use anyhow::{Result, bail};
use mlua::prelude::*;

/// A module injected into the definition sandbox
///
/// # Example
///
/// ```rust
/// use rollout_lua::RolloutModule;
/// use mlua::prelude::*;
///
/// struct Version;
///
/// impl RolloutModule for Version {
///     fn id(&self) -> &'static str {
///         "version"
///     }
///
///     fn register(&self, lua: &Lua) -> LuaResult<()> {
///         lua.globals().set(self.id(), "1.0.0")
///     }
///
///     fn stubs(&self) -> String {
///         "---@meta\n---@type string\nversion = \"\"\n".to_string()
///     }
/// }
/// ```
pub trait RolloutModule: Send + Sync {
    /// Global name of the module in Lua; must be a valid, unique identifier
    fn id(&self) -> &'static str;

    /// Installs the module into `lua` under [`id`](Self::id)
    fn register(&self, lua: &Lua) -> LuaResult<()>;

    /// LuaLS definition file content, starting with `---@meta`
    fn stubs(&self) -> String;

    /// One line shown next to the module in generated stub headers
    fn description(&self) -> &'static str {
        ""
    }
}

/// Ordered set of modules with unique ids
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Box<dyn RolloutModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module, rejecting a second module with the same id
    pub fn register<M: RolloutModule + 'static>(&mut self, module: M) -> Result<()> {
        let id = module.id();
        if self.get(id).is_some() {
            bail!("Module with id '{}' is already registered", id);
        }
        self.modules.push(Box::new(module));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&dyn RolloutModule> {
        self.modules
            .iter()
            .find(|m| m.id() == id)
            .map(|m| m.as_ref())
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.id()).collect()
    }

    /// Installs every module into `lua`, stopping at the first failure
    pub fn register_all(&self, lua: &Lua) -> LuaResult<()> {
        for module in &self.modules {
            module.register(lua)?;
        }
        Ok(())
    }

    /// Concatenated stubs of every module, suitable for a single `.lua` file
    pub fn generate_stubs(&self) -> String {
        self.modules
            .iter()
            .map(|m| {
                let header = match m.description() {
                    "" => String::new(),
                    d => format!("-- {}: {}\n", m.id(), d),
                };
                format!("{}{}\n", header, m.stubs())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Answer;

    impl RolloutModule for Answer {
        fn id(&self) -> &'static str {
            "answer"
        }

        fn register(&self, lua: &Lua) -> LuaResult<()> {
            let table = lua.create_table()?;
            table.set("value", 42)?;
            lua.globals().set(self.id(), table)
        }

        fn stubs(&self) -> String {
            "---@meta\n---@class answer\nanswer = {}".to_string()
        }
    }

    #[test]
    fn test_module_registration() {
        let mut registry = ModuleRegistry::new();
        registry.register(Answer).unwrap();

        assert!(registry.get("answer").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.ids(), ["answer"]);
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = ModuleRegistry::new();
        registry.register(Answer).unwrap();
        let err = registry.register(Answer).unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn test_register_all_installs_globals() {
        let mut registry = ModuleRegistry::new();
        registry.register(Answer).unwrap();

        let lua = Lua::new();
        registry.register_all(&lua).unwrap();
        let value: i64 = lua.load("return answer.value").eval().unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_stub_generation() {
        let mut registry = ModuleRegistry::new();
        registry.register(Answer).unwrap();

        let stubs = registry.generate_stubs();
        assert!(stubs.contains("---@meta"));
        assert!(stubs.contains("answer = {}"));
    }
}
