//! Console configuration: compiled-in defaults, overridable through `DEVCONSOLE_*` env vars.

use crate::log_buffer::LOG_CAPACITY_BYTES;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const VERSION: &str = concat!("devconsole-", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_USER: &str = "admin";
pub const DEFAULT_PASSWORD: &str = "admin";
pub const DEFAULT_REALM: &str = "DEVCONSOLE";
pub const DEFAULT_ROOT: &str = "./device-fs";

/// Files the console boots from; never deletable.
pub const BOOT_SCRIPT: &str = "boot.lua";
pub const CONSOLE_SCRIPT: &str = "console.lua";

/// Max bytes read while looking for the end of the request head.
pub const MAX_HEAD_BYTES: usize = 64 * 1024;
/// Lua heap limit per state: 1 MB.
pub const LUA_MEMORY_LIMIT_BYTES: usize = 1024 * 1024;

#[derive(Clone, Debug)]
pub struct ConsoleConfig {
    pub addr: SocketAddr,
    pub user: String,
    pub password: String,
    pub require_auth: bool,
    pub realm: String,
    pub root: PathBuf,
    pub protected: BTreeSet<String>,
    /// Device address and network mode (`STA` / `AP`), supplied by the network bootstrap.
    pub device_ip: String,
    pub network_mode: String,
    pub log_capacity: usize,
    pub max_head: usize,
    pub recv_timeout: Duration,
    pub accept_timeout: Duration,
    pub exec_timeout: Duration,
    pub reset_delay: Duration,
    pub lua_memory_limit: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            user: DEFAULT_USER.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            require_auth: true,
            realm: DEFAULT_REALM.to_string(),
            root: PathBuf::from(DEFAULT_ROOT),
            protected: [BOOT_SCRIPT, CONSOLE_SCRIPT]
                .into_iter()
                .map(String::from)
                .collect(),
            device_ip: "0.0.0.0".to_string(),
            network_mode: "STA".to_string(),
            log_capacity: LOG_CAPACITY_BYTES,
            max_head: MAX_HEAD_BYTES,
            recv_timeout: Duration::from_secs(5),
            accept_timeout: Duration::from_millis(200),
            exec_timeout: Duration::from_secs(2),
            reset_delay: Duration::from_millis(400),
            lua_memory_limit: LUA_MEMORY_LIMIT_BYTES,
        }
    }
}

impl ConsoleConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup(key)`. Unparseable values keep the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(addr) = lookup("DEVCONSOLE_ADDR").and_then(|s| s.parse().ok()) {
            cfg.addr = addr;
        }
        if let Some(user) = lookup("DEVCONSOLE_USER") {
            cfg.user = user;
        }
        if let Some(password) = lookup("DEVCONSOLE_PASSWORD") {
            cfg.password = password;
        }
        if let Some(flag) = lookup("DEVCONSOLE_REQUIRE_AUTH").and_then(|s| parse_bool(&s)) {
            cfg.require_auth = flag;
        }
        if let Some(root) = lookup("DEVCONSOLE_ROOT") {
            cfg.root = PathBuf::from(root);
        }
        if let Some(ip) = lookup("DEVCONSOLE_IP") {
            cfg.device_ip = ip;
        }
        if let Some(mode) = lookup("DEVCONSOLE_MODE") {
            cfg.network_mode = mode.to_uppercase();
        }
        cfg
    }

    pub fn uses_default_credentials(&self) -> bool {
        self.require_auth && self.user == DEFAULT_USER && self.password == DEFAULT_PASSWORD
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
