use crate::auth::AuthGate;
use crate::config::ConsoleConfig;
use crate::device::DeviceControl;
use crate::error::ConsoleResult;
use crate::log_buffer::LogBuffer;
use crate::runner::{RunRegistry, ScriptRunner};
use crate::session::EvalSession;
use crate::store::FileStore;
use std::sync::Arc;

/// Everything the handlers touch. Built once at startup and shared as `Arc<ConsoleState>`.
pub struct ConsoleState {
    pub config: ConsoleConfig,
    pub auth: AuthGate,
    pub store: Arc<FileStore>,
    pub log: Arc<LogBuffer>,
    pub runner: ScriptRunner,
    pub session: Arc<EvalSession>,
    pub device: Arc<dyn DeviceControl>,
}

impl ConsoleState {
    pub fn new(config: ConsoleConfig, device: Arc<dyn DeviceControl>) -> ConsoleResult<Self> {
        let auth = AuthGate::new(
            &config.user,
            &config.password,
            config.require_auth,
            &config.realm,
        );
        let store = Arc::new(FileStore::open(&config.root, config.protected.clone())?);
        let log = Arc::new(LogBuffer::with_capacity(config.log_capacity));
        let runner = ScriptRunner::new(
            store.clone(),
            log.clone(),
            Arc::new(RunRegistry::new()),
            config.lua_memory_limit,
        );
        let session = Arc::new(EvalSession::new(
            log.clone(),
            config.exec_timeout,
            config.lua_memory_limit,
        )?);
        Ok(Self {
            config,
            auth,
            store,
            log,
            runner,
            session,
            device,
        })
    }
}
