use devconsole::config::{BOOT_SCRIPT, VERSION};
use devconsole::{ConsoleConfig, ConsoleResult, ConsoleState, ProcessDevice, server};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ConsoleResult<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let config = ConsoleConfig::from_env();
    if config.uses_default_credentials() {
        warn!("[console] default credentials in use; set DEVCONSOLE_USER / DEVCONSOLE_PASSWORD");
    }

    let state = Arc::new(ConsoleState::new(config, Arc::new(ProcessDevice::default()))?);
    if !state.auth.is_enabled() {
        warn!("[console] authentication disabled");
    }
    info!("[console] {} storage at {}", VERSION, state.store.root().display());
    info!("[console] log buffer keeps the last {} bytes", state.log.capacity());

    let created = state.store.seed_bootstrap().await?;
    if !created.is_empty() {
        info!("[console] created {}", created.join(", "));
    }

    // boot script output goes to the log buffer like any other run
    if let Err(e) = state.runner.run_async(BOOT_SCRIPT).await {
        warn!("[console] {} not started: {}", BOOT_SCRIPT, e);
    }

    let listener = server::bind(state.config.addr).await?;
    info!(
        "[console] HTTP server on {} ({} mode, ip {})",
        listener.local_addr()?,
        state.config.network_mode,
        state.config.device_ip
    );
    server::serve(listener, state).await;
    Ok(())
}
