//! WARDEN probe entry point.
//!
//! Resolves the caller's privilege status once and prints it together with
//! the engine's debug snapshot. With `--watch` it keeps the engine running
//! and prints every status change until interrupted.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use warden_client::{init_tracing, ClientResult, HttpAuthority, ProbeConfig};
use warden_status::StatusEngine;

#[tokio::main]
async fn main() -> ClientResult<()> {
    let config = ProbeConfig::load()?;
    init_tracing(config.log_format)?;

    let transport = HttpAuthority::new(&config)?;
    info!(url = transport.url(), "Probing authority");

    let engine = StatusEngine::builder(Arc::new(transport))
        .config(config.status_config())
        .session_signal(Arc::new(config.auth.clone()))
        .start()?;

    let privileged = engine.lookup().await?;
    let report = json!({
        "privileged": privileged,
        "snapshot": engine.inspect(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if std::env::args().any(|arg| arg == "--watch") {
        watch(&engine).await?;
    }

    engine.shutdown();
    Ok(())
}

async fn watch(engine: &StatusEngine) -> ClientResult<()> {
    let mut changes = engine.changes();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                info!("Interrupted, stopping watch");
                return Ok(());
            }
            change = changes.recv() => match change {
                Ok(change) => println!("{}", serde_json::to_string(&change)?),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Watch fell behind, some changes were dropped");
                }
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}
