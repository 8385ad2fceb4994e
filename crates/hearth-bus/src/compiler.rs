//! Sandboxed compiler for textual handlers.
//!
//! Handler source is the body of a Lua 5.4 function taking the event:
//!
//! ```lua
//! if e.kind == "TaskFailed" then
//!     log("error", e.package .. ":" .. e.task .. " failed")
//! end
//! ```
//!
//! Each compiled handler owns a fresh Lua state with only the `table`,
//! `string` and `math` libraries. File and chunk loading globals are removed,
//! and `print` is replaced by the `log(level, message)` capability, which
//! routes to `tracing`. The event arrives as a table built from
//! [`Event::to_json`]; when a metadata context is bound, `e.context.get_var(name)`
//! reads it.
//!
//! The body is loaded as a chunk whose single vararg is the event, and only
//! parsed at compile time. Registering a handler never runs any of its code.

use std::sync::Arc;

use hearth_core::{Event, LogLevel, SandboxConfig};
use mlua::{Function, Lua, LuaOptions, LuaSerdeExt, RegistryKey, StdLib, Table, Value};
use tracing::{debug, error, info, trace, warn};

use crate::error::{CompileError, HandlerError};
use crate::handler::{excerpt, Handler, HandlerResult};

/// Globals stripped from every handler state.
const REMOVED_GLOBALS: &[&str] = &[
    "dofile",
    "loadfile",
    "load",
    "require",
    "print",
    "collectgarbage",
];

/// Turns handler source into [`ScriptHandler`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerCompiler {
    memory_limit: Option<usize>,
}

impl Default for HandlerCompiler {
    fn default() -> Self {
        Self::from(&SandboxConfig::default())
    }
}

impl From<&SandboxConfig> for HandlerCompiler {
    fn from(config: &SandboxConfig) -> Self {
        Self {
            memory_limit: config.memory_limit_bytes,
        }
    }
}

impl HandlerCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap each handler state's heap at `limit` bytes.
    pub fn with_memory_limit(mut self, limit: Option<usize>) -> Self {
        self.memory_limit = limit;
        self
    }

    pub fn memory_limit(&self) -> Option<usize> {
        self.memory_limit
    }

    /// Compile `source` into a handler bound to the event parameter `e`.
    pub fn compile(&self, source: &str) -> Result<ScriptHandler, CompileError> {
        let name = format!("script:{}", excerpt(source));
        let to_compile_error = |e: mlua::Error| CompileError::new(&name, e.to_string());

        let lua = Lua::new_with(
            StdLib::TABLE | StdLib::STRING | StdLib::MATH,
            LuaOptions::default(),
        )
        .map_err(to_compile_error)?;

        if let Some(limit) = self.memory_limit {
            lua.set_memory_limit(limit).map_err(to_compile_error)?;
        }
        install_sandbox(&lua, &name).map_err(to_compile_error)?;

        let chunk = format!("local e = ...\n{}", source);
        let function = lua
            .load(chunk)
            .set_name(format!("={}", name))
            .into_function()
            .map_err(to_compile_error)?;
        let function = lua.create_registry_value(function).map_err(to_compile_error)?;

        debug!(handler = %name, "Compiled script handler");

        Ok(ScriptHandler {
            name,
            source: Arc::from(source),
            lua,
            function,
        })
    }
}

fn install_sandbox(lua: &Lua, name: &str) -> mlua::Result<()> {
    let globals = lua.globals();
    for global in REMOVED_GLOBALS {
        globals.set(*global, Value::Nil)?;
    }

    let handler = name.to_string();
    let log = lua.create_function(move |_, (level, message): (String, String)| {
        match LogLevel::from_str(&level).unwrap_or_default() {
            LogLevel::Trace => trace!(handler = %handler, "{}", message),
            LogLevel::Debug => debug!(handler = %handler, "{}", message),
            LogLevel::Info => info!(handler = %handler, "{}", message),
            LogLevel::Warn => warn!(handler = %handler, "{}", message),
            LogLevel::Error => error!(handler = %handler, "{}", message),
        }
        Ok(())
    })?;
    globals.set("log", log)?;

    Ok(())
}

/// A handler compiled from Lua source.
///
/// Carries its source text as the identity key used by the dispatcher.
#[derive(Debug)]
pub struct ScriptHandler {
    name: String,
    source: Arc<str>,
    lua: Lua,
    function: RegistryKey,
}

impl ScriptHandler {
    fn event_table(&self, event: &Event) -> mlua::Result<Table> {
        let json = event.to_json().map_err(mlua::Error::external)?;
        let table = match self.lua.to_value(&json)? {
            Value::Table(table) => table,
            other => {
                return Err(mlua::Error::runtime(format!(
                    "event converted to {} instead of a table",
                    other.type_name()
                )))
            }
        };

        if let Some(context) = event.context() {
            let metadata = Arc::clone(context);
            let get_var = self
                .lua
                .create_function(move |lua, name: String| match metadata.get_var(&name) {
                    Some(values) => Ok(Value::Table(lua.create_sequence_from(values)?)),
                    None => Ok(Value::Nil),
                })?;

            let ctx = self.lua.create_table()?;
            ctx.set("get_var", get_var)?;
            table.set("context", ctx)?;
        }

        Ok(table)
    }
}

impl Handler for ScriptHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, event: &Event) -> HandlerResult {
        let script_error = |e: mlua::Error| HandlerError::Script(e.to_string());

        let arg = self.event_table(event).map_err(script_error)?;
        let function: Function = self.lua.registry_value(&self.function).map_err(script_error)?;
        function.call::<()>(arg).map_err(script_error)
    }

    fn source(&self) -> Option<&str> {
        Some(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::{EventPayload, MetadataStore, TaskInfo};

    fn task_event() -> Event {
        Event::task_started(TaskInfo::new("zlib", "do_compile", 12))
    }

    #[test]
    fn test_compile_valid_source() {
        let handler = HandlerCompiler::new()
            .compile("local x = e.kind")
            .unwrap();
        assert_eq!(handler.source(), Some("local x = e.kind"));
        assert!(handler.name().starts_with("script:"));
    }

    #[test]
    fn test_compile_syntax_error() {
        let err = HandlerCompiler::new().compile("if then end end").unwrap_err();
        assert!(err.name.starts_with("script:"));
        assert!(!err.message.is_empty());
    }

    #[test]
    fn test_body_is_not_run_at_compile_time() {
        // The body would raise if it ran during compilation.
        let handler = HandlerCompiler::new()
            .compile("error('ran too early')")
            .unwrap();
        let err = handler.handle(&task_event()).unwrap_err();
        assert!(err.to_string().contains("ran too early"));
    }

    #[test]
    fn test_source_cannot_escape_its_function() {
        let source = "end, error('ran at compile'), function(e)";
        match HandlerCompiler::new().compile(source) {
            Err(err) => assert!(err.message.starts_with("syntax error"), "{}", err.message),
            Ok(_) => panic!("unbalanced source compiled"),
        }
    }

    #[test]
    fn test_top_level_return_ends_handler() {
        let handler = HandlerCompiler::new()
            .compile("if e.kind == 'TaskStarted' then return end\nerror('not skipped')")
            .unwrap();
        handler.handle(&task_event()).unwrap();
    }

    #[test]
    fn test_handler_sees_event_fields() {
        let handler = HandlerCompiler::new()
            .compile(
                r#"
                if e.kind ~= "TaskStarted" then error("bad kind " .. tostring(e.kind)) end
                if e.package ~= "zlib" then error("bad package") end
                if e.pid ~= 12 then error("bad pid") end
                "#,
            )
            .unwrap();
        handler.handle(&task_event()).unwrap();
    }

    #[test]
    fn test_sandbox_removes_file_access() {
        let handler = HandlerCompiler::new()
            .compile("if dofile ~= nil or load ~= nil or io ~= nil or os ~= nil then error('escaped') end")
            .unwrap();
        handler.handle(&task_event()).unwrap();
    }

    #[test]
    fn test_log_capability_is_available() {
        let handler = HandlerCompiler::new()
            .compile("log('info', 'task ' .. e.task)")
            .unwrap();
        handler.handle(&task_event()).unwrap();
    }

    #[test]
    fn test_context_accessor() {
        let handler = HandlerCompiler::new()
            .compile(
                r#"
                local machine = e.context.get_var("MACHINE")
                if machine[1] ~= "qemuarm" then error("wrong machine") end
                if e.context.get_var("UNSET") ~= nil then error("expected nil") end
                "#,
            )
            .unwrap();

        let metadata = MetadataStore::new().with_var("MACHINE", ["qemuarm"]).into_shared();
        let event = Event::new(EventPayload::ConfigParsed).with_context(metadata);
        handler.handle(&event).unwrap();
    }

    #[test]
    fn test_no_context_table_without_binding() {
        let handler = HandlerCompiler::new()
            .compile("if e.context ~= nil then error('unexpected context') end")
            .unwrap();
        handler.handle(&task_event()).unwrap();
    }

    #[test]
    fn test_script_mutation_does_not_touch_event() {
        let handler = HandlerCompiler::new()
            .compile("e.package = 'mutated'")
            .unwrap();
        let event = task_event();
        handler.handle(&event).unwrap();
        assert_eq!(event, task_event());
    }

    #[test]
    fn test_default_compiler_uses_sandbox_defaults() {
        assert_eq!(
            HandlerCompiler::default().memory_limit(),
            SandboxConfig::default().memory_limit_bytes
        );
        assert!(HandlerCompiler::new().memory_limit().is_some());
    }

    #[test]
    fn test_memory_limit_from_config() {
        let compiler = HandlerCompiler::from(&SandboxConfig {
            memory_limit_bytes: Some(1024 * 1024),
        });
        assert_eq!(compiler.memory_limit(), Some(1024 * 1024));

        let handler = compiler
            .compile("local t = {} for i = 1, 10000000 do t[i] = string.rep('x', 64) .. i end")
            .unwrap();
        assert!(matches!(
            handler.handle(&task_event()),
            Err(HandlerError::Script(_))
        ));
    }
}
