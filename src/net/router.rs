//! Route table: (method, path-without-query) → handler. Anything else is a 400.

use super::http_proto::{HttpMethod, split_query};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// GET `/`: console page.
    Root,
    /// GET `/run?f=<name>`: start a background run.
    Run,
    /// GET `/del?f=<name>`: delete an unprotected file.
    Delete,
    /// GET `/reset`: respond, then hard-reset the device.
    Reset,
    /// GET `/log`: raw log buffer.
    Log,
    /// POST `/save`: write a file, optionally run it.
    Save,
    /// POST `/exec`: evaluate in the REPL session.
    Exec,
}

impl Route {
    pub fn resolve(method: HttpMethod, path: &str) -> Option<Route> {
        let (route, _) = split_query(path);
        match (method, route) {
            (HttpMethod::Get, "/") => Some(Route::Root),
            (HttpMethod::Get, "/run") => Some(Route::Run),
            (HttpMethod::Get, "/del") => Some(Route::Delete),
            (HttpMethod::Get, "/reset") => Some(Route::Reset),
            (HttpMethod::Get, "/log") => Some(Route::Log),
            (HttpMethod::Post, "/save") => Some(Route::Save),
            (HttpMethod::Post, "/exec") => Some(Route::Exec),
            _ => None,
        }
    }

    /// Routes whose body must be completed from the socket before handling.
    pub fn reads_body(&self) -> bool {
        matches!(self, Route::Save | Route::Exec)
    }
}
