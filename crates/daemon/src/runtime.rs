use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::DaemonConfig;
use crate::rpc::ws::serve_until_shutdown;
use crate::session::DaemonContext;

/// A daemon serving in a background task. Dropping the handle shuts it down.
pub struct DaemonHandle {
    local_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl DaemonHandle {
    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub async fn wait(mut self) {
        self.shutdown();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for DaemonHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Bind `listen_addr` and serve `ctx` in a background task.
pub async fn start(ctx: Arc<DaemonContext>, listen_addr: SocketAddr) -> Result<DaemonHandle> {
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind `{listen_addr}`"))?;
    let local_addr = listener.local_addr().context("failed to read bound address")?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
    let task = tokio::spawn(async move {
        if let Err(error) = serve_until_shutdown(listener, ctx, shutdown_rx).await {
            warn!(?error, "fuzzy daemon server terminated unexpectedly");
        }
    });

    Ok(DaemonHandle { local_addr, shutdown_tx, task: Some(task) })
}

/// Serve until ctrl-c.
pub async fn run(config: DaemonConfig) -> Result<()> {
    let listen_addr = config.listen_addr;
    let ctx = Arc::new(DaemonContext::from_config(config)?);
    let root = ctx.sandbox.root().to_path_buf();
    let editing = ctx.editing_enabled();

    let handle = start(ctx, listen_addr).await?;
    info!(
        addr = %handle.local_addr(),
        root = %root.display(),
        editing,
        "fuzzy daemon started"
    );

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutdown requested");
    handle.wait().await;
    Ok(())
}
