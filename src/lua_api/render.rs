//! Text forms of Lua values and errors for the log and the REPL response.

use mlua::{Function, Lua, MultiValue, Result, Value};

/// `tostring(v)`, as `print` shows it.
pub fn display_value(lua: &Lua, v: Value) -> Result<String> {
    if let Value::String(s) = &v {
        return Ok(s.to_string_lossy().to_string());
    }
    let tostring: Function = lua.globals().get("tostring")?;
    let s: mlua::String = tostring.call(v)?;
    Ok(s.to_string_lossy().to_string())
}

/// Like `display_value`, but strings are quoted so `"1"` and `1` read differently.
pub fn repr_value(lua: &Lua, v: Value) -> Result<String> {
    match &v {
        Value::String(s) => Ok(quote(&s.to_string_lossy().to_string())),
        _ => display_value(lua, v),
    }
}

/// Tab-joined representation of an expression's non-nil results.
pub fn render_results(lua: &Lua, values: MultiValue) -> Result<String> {
    let parts = values
        .iter()
        .filter(|v| !v.is_nil())
        .cloned()
        .map(|v| repr_value(lua, v))
        .collect::<Result<Vec<String>>>()?;
    Ok(parts.join("\t"))
}

/// Error message followed by the Lua traceback when there is one.
pub fn error_text(e: &mlua::Error) -> String {
    match e {
        mlua::Error::CallbackError { traceback, cause } => {
            format!("{}\n{}", error_text(cause), traceback)
        }
        mlua::Error::RuntimeError(msg) => msg.clone(),
        mlua::Error::SyntaxError { message, .. } => format!("syntax error: {}", message),
        other => other.to_string(),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_results() {
        let lua = Lua::new();
        let values: MultiValue = lua.load(r#"return 1, "a\nb", true"#).eval().unwrap();
        assert_eq!(render_results(&lua, values).unwrap(), "1\t\"a\\nb\"\ttrue");
    }

    #[test]
    fn test_nil_results_render_empty() {
        let lua = Lua::new();
        let values: MultiValue = lua.load("return nil").eval().unwrap();
        assert_eq!(render_results(&lua, values).unwrap(), "");
        let none: MultiValue = lua.load("return").eval().unwrap();
        assert_eq!(render_results(&lua, none).unwrap(), "");
    }

    #[test]
    fn test_error_text_keeps_message() {
        let lua = Lua::new();
        let err = lua.load(r#"error("boom")"#).exec().unwrap_err();
        assert!(error_text(&err).contains("boom"));
        let err = lua.load("x = = 1").exec().unwrap_err();
        assert!(error_text(&err).starts_with("syntax error"));
    }
}
