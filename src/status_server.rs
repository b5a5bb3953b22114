// src/status_server.rs

//! Plain-text status query surface.
//!
//! Every accepted connection receives the current status snapshot as one
//! `<child id> <STATUS>` line per tracked sub-process, then the connection is
//! closed. Reads never block the orchestrator: they come from the latest
//! published snapshot.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::{StatusHandle, StatusSnapshot};
use crate::errors::Result;

/// Pause after a failed `accept` before trying again.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Bind `addr` and serve status snapshots until the returned task is aborted.
///
/// Returns the bound address (useful with port 0) and the accept-loop task.
pub async fn spawn_status_server(
    addr: SocketAddr,
    status: StatusHandle,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, "status server listening");

    let handle = tokio::spawn(async move { serve(|| listener.accept(), status).await });

    Ok((local_addr, handle))
}

/// Accept loop: answer every connection `accept` yields with the latest
/// snapshot. Never returns.
pub async fn serve<A, Fut, W>(mut accept: A, status: StatusHandle)
where
    A: FnMut() -> Fut,
    Fut: Future<Output = io::Result<(W, SocketAddr)>>,
    W: AsyncWrite + Unpin + Send + 'static,
{
    loop {
        match accept().await {
            Ok((stream, peer)) => {
                let snapshot = status.get_status();
                tokio::spawn(async move {
                    if let Err(e) = write_snapshot(stream, &snapshot).await {
                        debug!(%peer, error = %e, "status client went away");
                    }
                });
            }
            Err(e) => {
                // Errors such as EMFILE persist until a descriptor frees up.
                warn!(error = %e, "status server accept failed; backing off");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

/// Render a snapshot as `<child id> <STATUS>` lines, in identity order.
pub fn render_snapshot(snapshot: &StatusSnapshot) -> String {
    let mut out = String::new();
    for (child_id, status) in snapshot.iter() {
        out.push_str(child_id);
        out.push(' ');
        out.push_str(&status.to_string());
        out.push('\n');
    }
    out
}

async fn write_snapshot<W>(mut stream: W, snapshot: &StatusSnapshot) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    stream.write_all(render_snapshot(snapshot).as_bytes()).await?;
    stream.shutdown().await
}
