//! Persistent REPL session behind `/exec`.
//!
//! One environment table lives for the whole process and is shared by every `/exec`
//! request until a `:reset` / `%reset` sentinel replaces it. Input is first tried as an
//! expression (`return <src>`); only a *syntax* failure falls back to running it as
//! statements, so runtime errors in an expression are reported rather than retried.
//! Reading a name that was never assigned raises `name '<x>' is not defined`.

use crate::error::ConsoleResult;
use crate::log_buffer::LogBuffer;
use crate::lua_api::io_api::{self, OutputSink};
use crate::lua_api::render::{error_text, render_results};
use crate::lua_api::create_lua_state;
use mlua::{Function, Lua, MultiValue, Table, Value, VmState};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const RESET_COMMANDS: [&str; 2] = [":reset", "%reset"];
pub const RESET_MESSAGE: &str = "REPL state cleared.\n";
const CHUNK_NAME: &str = "=repl";

/// Result of one `/exec` call. Only the caller sees the OK/ERR prefix; the log gets raw text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvalOutcome {
    pub ok: bool,
    pub text: String,
}

impl EvalOutcome {
    pub fn render(&self) -> String {
        let prefix = if self.ok { "OK" } else { "ERR" };
        format!("{}\n{}", prefix, self.text)
    }
}

struct SessionInner {
    lua: Lua,
    env: Table,
}

impl SessionInner {
    fn new(memory_limit: usize) -> mlua::Result<Self> {
        let lua = create_lua_state(memory_limit)?;
        let env = new_env(&lua)?;
        Ok(Self { lua, env })
    }
}

pub struct EvalSession {
    inner: Mutex<SessionInner>,
    log: Arc<LogBuffer>,
    timeout: Duration,
    memory_limit: usize,
}

impl EvalSession {
    pub fn new(log: Arc<LogBuffer>, timeout: Duration, memory_limit: usize) -> ConsoleResult<Self> {
        Ok(Self {
            inner: Mutex::new(SessionInner::new(memory_limit)?),
            log,
            timeout,
            memory_limit,
        })
    }

    /// Run `src` against the session. Blocking; callers on the async loop use `spawn_blocking`.
    pub fn execute(&self, src: &str) -> EvalOutcome {
        let capture = Arc::new(Mutex::new(String::new()));
        let sink = OutputSink::capturing(self.log.clone(), capture.clone());
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let result = if is_reset(src) {
            SessionInner::new(self.memory_limit).map(|fresh| {
                *inner = fresh;
                sink.write(RESET_MESSAGE);
            })
        } else {
            self.evaluate(&inner, src, &sink)
        };

        let ok = match result {
            Ok(()) => true,
            Err(e) => {
                sink.write(&format!("{}\n", error_text(&e)));
                false
            }
        };
        drop(inner);

        let text = capture.lock().unwrap_or_else(|e| e.into_inner()).clone();
        EvalOutcome { ok, text }
    }

    fn evaluate(&self, inner: &SessionInner, src: &str, sink: &OutputSink) -> mlua::Result<()> {
        let SessionInner { lua, env } = inner;
        // print is rebound on every call so output lands in this call's capture
        io_api::register(lua, env, sink.clone())?;

        let deadline = Instant::now() + self.timeout;
        lua.set_interrupt(move |_| {
            if Instant::now() >= deadline {
                return Err(mlua::Error::runtime("execution timed out"));
            }
            Ok(VmState::Continue)
        });
        let result = eval_two_tier(lua, env, src, sink);
        lua.remove_interrupt();
        result
    }
}

fn is_reset(src: &str) -> bool {
    RESET_COMMANDS.contains(&src.trim())
}

fn eval_two_tier(lua: &Lua, env: &Table, src: &str, sink: &OutputSink) -> mlua::Result<()> {
    let as_expression = lua
        .load(format!("return {}", src))
        .set_name(CHUNK_NAME)
        .set_environment(env.clone())
        .into_function();

    match as_expression {
        Ok(f) => {
            let values: MultiValue = f.call(())?;
            let rendered = render_results(lua, values)?;
            if !rendered.is_empty() {
                sink.write(&(rendered + "\n"));
            }
            Ok(())
        }
        Err(mlua::Error::SyntaxError { .. }) => lua
            .load(src)
            .set_name(CHUNK_NAME)
            .set_environment(env.clone())
            .exec(),
        Err(e) => Err(e),
    }
}

/// Empty environment whose misses fall through to the sandboxed globals, and fail
/// loudly for names defined nowhere.
fn new_env(lua: &Lua) -> mlua::Result<Table> {
    let env = lua.create_table()?;
    let meta = lua.create_table()?;
    meta.set(
        "__index",
        lua.create_function(|lua, (_env, key): (Table, Value)| {
            let v: Value = lua.globals().get(key.clone())?;
            if v.is_nil() {
                let name = match &key {
                    Value::String(s) => s.to_string_lossy().to_string(),
                    other => format!("{:?}", other),
                };
                return Err(mlua::Error::runtime(format!("name '{}' is not defined", name)));
            }
            Ok(v)
        })?,
    )?;
    let setmetatable: Function = lua.globals().get("setmetatable")?;
    setmetatable.call::<()>((env.clone(), meta))?;
    Ok(env)
}
