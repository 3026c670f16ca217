//! Agentvisor stdio server
//!
//! Speaks line-delimited JSON-RPC on stdin/stdout and logs to stderr.
//! Usage: `agentvisor [settings.json]`

use agentvisor_core::rpc::{SERVER_NAME, SERVER_VERSION};
use agentvisor_core::{AgentManager, RpcServer, SupervisorSettings, ToolDispatcher};
use anyhow::Context;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How long runtime shutdown waits for blocking tasks, such as a pending
/// stdin read, before abandoning them
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn main() -> anyhow::Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings_path = std::env::args_os().nth(1).map(PathBuf::from);
    run_to_completion(serve(settings_path))?
}

/// Drive `future` on a fresh multi-threaded runtime and shut it down without
/// waiting on blocking tasks longer than `SHUTDOWN_GRACE`.
///
/// `tokio::io::stdin` reads on a blocking thread that cannot be cancelled,
/// so a plain runtime drop would hang until the client sends another line.
fn run_to_completion<F: Future>(future: F) -> anyhow::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build the tokio runtime")?;

    let output = runtime.block_on(future);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    Ok(output)
}

async fn serve(settings_path: Option<PathBuf>) -> anyhow::Result<()> {
    let settings = SupervisorSettings::load(settings_path.as_deref())
        .context("failed to load supervisor settings")?;

    info!(
        "Starting {} v{} (configs: {:?}, executable: {})",
        SERVER_NAME, SERVER_VERSION, settings.configs_dir, settings.executable
    );

    let manager = Arc::new(AgentManager::new(settings));
    let server = RpcServer::new(ToolDispatcher::new(Arc::clone(&manager)));

    tokio::select! {
        result = server.serve(tokio::io::stdin(), tokio::io::stdout()) => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        signal = shutdown_signal() => {
            signal.context("failed to listen for shutdown signals")?;
            info!("Received shutdown signal");
        }
    }

    manager.stop_all().await?;
    info!("Server stopped");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
