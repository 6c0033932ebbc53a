//! One function per route. Page-returning handlers never fail on user mistakes: those
//! become the page's status line. Only transport or setup problems surface as `Err`.

use crate::config::VERSION;
use crate::error::{ConsoleError, ConsoleResult};
use crate::net::http_proto::{Form, HttpRequest, HttpResponse};
use crate::net::router::Route;
use crate::page::{PageView, render_page};
use crate::state::ConsoleState;
use crate::store::sanitize_name;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const RESET_REPLY: &str = "Reset…";

pub async fn dispatch(
    route: Route,
    req: &HttpRequest,
    state: &Arc<ConsoleState>,
) -> ConsoleResult<HttpResponse> {
    debug!("[http] {} {}", req.method.as_str(), req.path);
    match route {
        Route::Root => page(state, "").await,
        Route::Run => handle_run(req, state).await,
        Route::Delete => handle_delete(req, state).await,
        Route::Reset => Ok(handle_reset(state)),
        Route::Log => Ok(HttpResponse::text(&state.log.read())),
        Route::Save => handle_save(req, state).await,
        Route::Exec => handle_exec(req, state).await,
    }
}

/// Render the console page with `status` as the message line.
pub async fn page(state: &ConsoleState, status: &str) -> ConsoleResult<HttpResponse> {
    let files = state.store.list().await?;
    let run = state.runner.state();
    let view = PageView {
        ip: &state.config.device_ip,
        mode: &state.config.network_mode,
        version: VERSION,
        status,
        files: &files,
        run: &run,
    };
    Ok(HttpResponse::html(&render_page(&view)))
}

async fn handle_run(req: &HttpRequest, state: &ConsoleState) -> ConsoleResult<HttpResponse> {
    let name = sanitize_name(&req.query().first_str("f").unwrap_or_default());
    let status = match state.runner.run_async(&name).await {
        Ok(_) => format!("OK: Running {}…", name),
        Err(e) => format!("ERR: {}", e),
    };
    page(state, &status).await
}

async fn handle_delete(req: &HttpRequest, state: &ConsoleState) -> ConsoleResult<HttpResponse> {
    let raw = req.query().first_str("f").unwrap_or_default();
    if raw.trim().is_empty() {
        return page(state, "ERR: No filename").await;
    }
    let name = sanitize_name(&raw);
    let status = match state.store.delete(&name).await {
        Ok(()) => {
            info!("[store] deleted {}", name);
            format!("OK: Deleted {}", name)
        }
        Err(e @ (ConsoleError::Protected(_) | ConsoleError::NotFound(_))) => format!("ERR: {}", e),
        Err(e) => format!("ERR: Delete failed: {}", e),
    };
    page(state, &status).await
}

fn handle_reset(state: &ConsoleState) -> HttpResponse {
    let device = state.device.clone();
    let delay = state.config.reset_delay;
    warn!("[device] reset in {:?}", delay);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        device.reset();
    });
    HttpResponse::text(RESET_REPLY)
}

async fn handle_save(req: &HttpRequest, state: &ConsoleState) -> ConsoleResult<HttpResponse> {
    let form = Form::parse(&req.body);
    let name = sanitize_name(&form.first_str("name").unwrap_or_default());
    let code = form.first("code").unwrap_or_default();

    if let Err(e) = state.store.write(&name, code).await {
        return page(state, &format!("ERR: Write failed: {}", e)).await;
    }
    info!("[store] saved {} ({} bytes)", name, code.len());

    if !form.contains("run") {
        return page(state, &format!("OK: Saved {}.", name)).await;
    }
    let status = match state.runner.run_async(&name).await {
        Ok(_) => format!("OK: Saved {}. Running…", name),
        Err(e) => format!("ERR: Saved but failed to run: {}", e),
    };
    page(state, &status).await
}

async fn handle_exec(req: &HttpRequest, state: &ConsoleState) -> ConsoleResult<HttpResponse> {
    let code = Form::parse(&req.body).first_str("code").unwrap_or_default();
    let session = state.session.clone();
    let outcome = tokio::task::spawn_blocking(move || session.execute(&code))
        .await
        .map_err(|e| ConsoleError::Execution(e.to_string()))?;
    Ok(HttpResponse::text(&outcome.render()))
}
