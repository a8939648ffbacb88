//! Lua sandbox creation
//!
//! Pipeline definitions are evaluated inside a restricted interpreter with
//! no filesystem, process or network access. The `pipeline` helper module is
//! always injected; other modules (such as `env`) are registered by the
//! caller through the [`ModuleRegistry`](crate::module::ModuleRegistry).

use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib, Table, Value};

/// Create a restricted Lua sandbox
///
/// Only the `table`, `string`, `math` and `coroutine` libraries are loaded,
/// and `require`, `dofile` and `loadfile` are removed.
///
/// # Example
/// ```no_run
/// use rollout_lua::sandbox::create_sandbox;
///
/// let lua = create_sandbox()?;
/// let definition: mlua::Table = lua
///     .load(r#"return pipeline.define { name = "web", stages = {} }"#)
///     .eval()?;
/// let name: String = definition.get("name")?;
/// # Ok::<(), mlua::Error>(())
/// ```
pub fn create_sandbox() -> LuaResult<Lua> {
    // Explicitly excluded: IO, OS, PACKAGE, DEBUG
    let lua = unsafe {
        Lua::unsafe_new_with(
            StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::COROUTINE,
            LuaOptions::default(),
        )
    };

    lua.globals().set("require", mlua::Nil)?;
    lua.globals().set("dofile", mlua::Nil)?;
    lua.globals().set("loadfile", mlua::Nil)?;

    register_pipeline_module(&lua)?;

    Ok(lua)
}

/// LuaLS definitions for the `pipeline` helper module
pub const PIPELINE_STUBS: &str = r#"---@meta

---@class HealthCheck
---@field url string
---@field retries? integer Total probe attempts (default 3)
---@field interval? number Seconds between attempts (default 5)
---@field timeout? number Seconds per attempt (default 5)
---@field expect? string Expected JSON `status` value (default "healthy")
---@field backoff? "fixed"|"exponential"
---@field max_interval? number Cap for exponential delays in seconds

---@class Deploy
---@field environment string
---@field repository string
---@field container string
---@field host? string SSH destination, omit or "local" for this machine
---@field port? { host: integer, container: integer }
---@field env? table<string, string>
---@field health HealthCheck

---@class Action
---@field kind? "shell"|"command"
---@field script? string
---@field cmd? string
---@field args? string[]
---@field cwd? string
---@field env? table<string, string>

---@class Stage
---@field name string
---@field needs? string|string[]
---@field run? string
---@field actions? (string|Action)[]
---@field timeout? number Seconds, greater than zero
---@field deploy? Deploy

---@class Pipeline
---@field name string
---@field description? string
---@field stages Stage[]

---@class pipeline
pipeline = {}

---@param def Pipeline
---@return Pipeline
function pipeline.define(def) end

---@param def Stage
---@return Stage
function pipeline.stage(def) end

---@param def Deploy
---@return Deploy
function pipeline.deploy(def) end

---@param script string
---@return Action
function pipeline.sh(script) end

---@param cmd string
---@param args? string[]
---@return Action
function pipeline.cmd(cmd, args) end
"#;

/// Register the `pipeline` helper module
fn register_pipeline_module(lua: &Lua) -> LuaResult<()> {
    let pipeline = lua.create_table()?;

    // define/stage/deploy are identity functions that document intent
    pipeline.set("define", lua.create_function(|_, t: Table| Ok(t))?)?;
    pipeline.set("stage", lua.create_function(|_, t: Table| Ok(t))?)?;
    pipeline.set("deploy", lua.create_function(|_, t: Table| Ok(t))?)?;

    // pipeline.sh(script) -> { kind = "shell", script = script }
    let sh_fn = lua.create_function(|lua, script: String| {
        let action = lua.create_table()?;
        action.set("kind", "shell")?;
        action.set("script", script)?;
        Ok(action)
    })?;
    pipeline.set("sh", sh_fn)?;

    // pipeline.cmd(cmd, args?) -> { kind = "command", cmd = cmd, args = args }
    let cmd_fn = lua.create_function(|lua, (cmd, args): (String, Option<Table>)| {
        let action = lua.create_table()?;
        action.set("kind", "command")?;
        action.set("cmd", cmd)?;
        action.set("args", args.map_or_else(|| lua.create_table(), Ok)?)?;
        Ok(action)
    })?;
    pipeline.set("cmd", cmd_fn)?;

    let builder_fn = lua.create_function(|lua, ()| create_pipeline_builder(lua))?;
    pipeline.set("builder", builder_fn)?;

    lua.globals().set("pipeline", pipeline)?;

    Ok(())
}

/// Appends `value` to the array stored under `key`, creating it on first use
fn push_to(lua: &Lua, builder: &Table, key: &str, value: Value) -> LuaResult<()> {
    let list: Table = match builder.get::<Option<Table>>(key)? {
        Some(t) => t,
        None => {
            let t = lua.create_table()?;
            builder.set(key, t.clone())?;
            t
        }
    };
    list.push(value)
}

/// Create a pipeline builder instance with fluent API methods
fn create_pipeline_builder(lua: &Lua) -> LuaResult<Table> {
    let builder = lua.create_table()?;
    let metatable = lua.create_table()?;

    let name_fn = lua.create_function(|_, (builder, name): (Table, String)| {
        builder.set("_name", name)?;
        Ok(builder)
    })?;
    metatable.set("name", name_fn)?;

    let description_fn = lua.create_function(|_, (builder, desc): (Table, String)| {
        builder.set("_description", desc)?;
        Ok(builder)
    })?;
    metatable.set("description", description_fn)?;

    let stage_fn = lua.create_function(|lua, (builder, stage): (Table, Table)| {
        push_to(lua, &builder, "_stages", Value::Table(stage))?;
        Ok(builder)
    })?;
    metatable.set("stage", stage_fn)?;

    let build_fn = lua.create_function(|lua, builder: Table| {
        let definition = lua.create_table()?;
        definition.set("name", builder.get::<Value>("_name")?)?;
        definition.set("description", builder.get::<Value>("_description")?)?;
        definition.set("stages", builder.get::<Value>("_stages")?)?;
        Ok(definition)
    })?;
    metatable.set("build", build_fn)?;

    metatable.set("__index", metatable.clone())?;
    builder.set_metatable(Some(metatable))?;

    Ok(builder)
}
