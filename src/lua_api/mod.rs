pub mod io_api;
pub mod render;

use mlua::{Lua, Result};

/// Sandboxed Luau state with a heap ceiling. Each background run gets its own; the
/// REPL session keeps one for its lifetime.
pub fn create_lua_state(memory_limit: usize) -> Result<Lua> {
    let lua = Lua::new();
    lua.sandbox(true)?;
    lua.set_memory_limit(memory_limit)?;
    Ok(lua)
}
