//! Background script runs: fire-and-forget, one fresh Lua state per run, output to the log.
//! Live runs are tracked in a registry keyed by run id, so overlapping runs never clobber
//! each other's bookkeeping.

use crate::error::ConsoleResult;
use crate::log_buffer::LogBuffer;
use crate::lua_api::create_lua_state;
use crate::lua_api::io_api::{self, OutputSink};
use crate::lua_api::render::error_text;
use crate::store::FileStore;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct RunRecord {
    pub name: String,
    pub started_at: Instant,
    seq: u64,
}

/// What the console page shows: whether anything runs, and the latest run's name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunState {
    pub active: bool,
    pub name: Option<String>,
    /// Number of live runs (more than one when runs overlap).
    pub live: usize,
}

#[derive(Default)]
pub struct RunRegistry {
    runs: DashMap<Uuid, RunRecord>,
    next_seq: AtomicU64,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.runs.insert(
            id,
            RunRecord {
                name: name.to_string(),
                started_at: Instant::now(),
                seq,
            },
        );
        id
    }

    /// Removes only this run's record.
    pub fn finish(&self, id: Uuid) -> Option<RunRecord> {
        self.runs.remove(&id).map(|(_, record)| record)
    }

    pub fn get(&self, id: Uuid) -> Option<RunRecord> {
        self.runs.get(&id).map(|r| r.value().clone())
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn state(&self) -> RunState {
        let latest = self
            .runs
            .iter()
            .max_by_key(|r| r.seq)
            .map(|r| r.name.clone());
        RunState {
            active: latest.is_some(),
            name: latest,
            live: self.runs.len(),
        }
    }
}

/// Drops the registry record when the run thread exits, panics included.
struct RunGuard {
    registry: Arc<RunRegistry>,
    id: Uuid,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Some(record) = self.registry.finish(self.id) {
            debug!(
                run = %self.id,
                script = %record.name,
                "[runner] released after {:?}",
                record.started_at.elapsed()
            );
        }
    }
}

pub struct ScriptRunner {
    store: Arc<FileStore>,
    log: Arc<LogBuffer>,
    registry: Arc<RunRegistry>,
    memory_limit: usize,
}

impl ScriptRunner {
    pub fn new(
        store: Arc<FileStore>,
        log: Arc<LogBuffer>,
        registry: Arc<RunRegistry>,
        memory_limit: usize,
    ) -> Self {
        Self {
            store,
            log,
            registry,
            memory_limit,
        }
    }

    /// Look up `name` and start it on a blocking thread. A missing file returns
    /// `NotFound` before anything is spawned. Does not wait for the script.
    pub async fn run_async(&self, name: &str) -> ConsoleResult<Uuid> {
        let code = self.store.read(name).await?;
        let id = self.registry.start(name);

        let guard = RunGuard {
            registry: self.registry.clone(),
            id,
        };
        let log = self.log.clone();
        let name = name.to_string();
        let memory_limit = self.memory_limit;

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            info!(run = %id, script = %name, "[runner] started");
            match run_script(&name, &code, log.clone(), memory_limit) {
                Ok(()) => info!(run = %id, script = %name, "[runner] finished"),
                Err(e) => {
                    let text = error_text(&e);
                    warn!(run = %id, script = %name, "[runner] failed: {}", text);
                    log.append(&format!("{}\n", text));
                }
            }
        });
        Ok(id)
    }

    pub fn state(&self) -> RunState {
        self.registry.state()
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }
}

/// Execute `code` in a brand-new state; shares nothing with the REPL session.
pub fn run_script(
    name: &str,
    code: &[u8],
    log: Arc<LogBuffer>,
    memory_limit: usize,
) -> mlua::Result<()> {
    let lua = create_lua_state(memory_limit)?;
    io_api::register(&lua, &lua.globals(), OutputSink::log_only(log))?;
    lua.load(code).set_name(format!("={}", name)).exec()
}
