//! `print` and `io.write` bound to the shared log buffer instead of any process-wide stdout.

use super::render::display_value;
use crate::log_buffer::LogBuffer;
use mlua::{Lua, Result, Table, Value, Variadic};
use std::sync::{Arc, Mutex};

/// Where script output goes: always the log buffer, plus an optional per-call capture
/// (the REPL returns what a statement printed to the caller).
#[derive(Clone)]
pub struct OutputSink {
    log: Arc<LogBuffer>,
    capture: Option<Arc<Mutex<String>>>,
}

impl OutputSink {
    pub fn log_only(log: Arc<LogBuffer>) -> Self {
        Self { log, capture: None }
    }

    pub fn capturing(log: Arc<LogBuffer>, capture: Arc<Mutex<String>>) -> Self {
        Self {
            log,
            capture: Some(capture),
        }
    }

    pub fn write(&self, s: &str) {
        if let Some(capture) = &self.capture {
            capture
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push_str(s);
        }
        self.log.append(s);
    }
}

/// Install `print` and an `io` table on `target` (a state's globals or a session env).
pub fn register(lua: &Lua, target: &Table, sink: OutputSink) -> Result<()> {
    let io = lua.create_table()?;

    // io.write(...) -> concatenates args, no separator, no newline
    let write_sink = sink.clone();
    io.set(
        "write",
        lua.create_function(move |lua, args: Variadic<Value>| {
            let mut out = String::new();
            for v in args.iter().cloned() {
                out.push_str(&display_value(lua, v)?);
            }
            write_sink.write(&out);
            Ok(())
        })?,
    )?;
    target.set("io", io)?;

    // print(...) -> tab-separated, newline at end
    let print_fn = lua.create_function(move |lua, args: Variadic<Value>| {
        let parts = args
            .iter()
            .cloned()
            .map(|v| display_value(lua, v))
            .collect::<Result<Vec<String>>>()?;
        sink.write(&(parts.join("\t") + "\n"));
        Ok(())
    })?;
    target.set("print", print_fn)?;

    Ok(())
}
