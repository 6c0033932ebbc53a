//! Password-protected HTTP development console for a small networked device: file
//! management, background script runs, a persistent Lua REPL and a bounded log.

pub mod auth;
pub mod config;
pub mod device;
pub mod error;
pub mod handlers;
pub mod log_buffer;
pub mod lua_api;
pub mod net;
pub mod page;
pub mod runner;
pub mod server;
pub mod session;
pub mod state;
pub mod store;

pub use config::ConsoleConfig;
pub use device::{DeviceControl, ProcessDevice};
pub use error::{ConsoleError, ConsoleResult};
pub use state::ConsoleState;
