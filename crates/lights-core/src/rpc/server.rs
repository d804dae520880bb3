//! TCP server accepting controller connections.
//!
//! Each accepted connection is served by its own [`RpcBridge`] with a fresh
//! [`JsonRpcEngine`]. All engines share one dispatcher.

use super::bridge::RpcBridge;
use super::engine::{JsonRpcEngine, RpcDispatch};
use crate::config::BridgeConfig;
use crate::Result;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

/// Handle to a running server. Dropping shuts the server down.
pub struct RpcServerHandle {
    pub addr: SocketAddr,
    pub port: u16,
    shutdown_tx: Option<oneshot::Sender<()>>,
    conn_shutdown_tx: watch::Sender<bool>,
    active_connections: Arc<AtomicUsize>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl RpcServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Stop accepting and tell every live bridge to close.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.conn_shutdown_tx.send(true);
    }

    /// Shut down and wait for the accept loop to exit.
    pub async fn join(mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for RpcServerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// JSON-RPC server over TCP.
pub struct RpcServer;

impl RpcServer {
    /// Bind `addr` and start serving in background tasks.
    ///
    /// Port `0` lets the OS pick; the chosen port is on the handle.
    pub async fn start<A, D>(addr: A, dispatch: Arc<D>) -> Result<RpcServerHandle>
    where
        A: ToSocketAddrs,
        D: RpcDispatch,
    {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let port = addr.port();

        info!("RPC server listening on {}", addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);
        let active_connections = Arc::new(AtomicUsize::new(0));

        let task_handle = tokio::spawn(Self::accept_loop(
            listener,
            dispatch,
            shutdown_rx,
            conn_shutdown_rx,
            Arc::clone(&active_connections),
        ));

        Ok(RpcServerHandle {
            addr,
            port,
            shutdown_tx: Some(shutdown_tx),
            conn_shutdown_tx,
            active_connections,
            task_handle: Some(task_handle),
        })
    }

    async fn accept_loop<D: RpcDispatch>(
        listener: TcpListener,
        dispatch: Arc<D>,
        mut shutdown_rx: oneshot::Receiver<()>,
        conn_shutdown_rx: watch::Receiver<bool>,
        active_connections: Arc<AtomicUsize>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("RPC server shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let current = active_connections.load(Ordering::Relaxed);
                            if current >= BridgeConfig::MAX_CONNECTIONS {
                                warn!(
                                    "Rejecting connection from {}: at max capacity ({})",
                                    peer_addr,
                                    BridgeConfig::MAX_CONNECTIONS
                                );
                                continue;
                            }

                            if let Err(e) = stream.set_nodelay(true) {
                                debug!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
                            }

                            active_connections.fetch_add(1, Ordering::Relaxed);
                            let engine = JsonRpcEngine::new(Arc::clone(&dispatch));
                            let bridge = RpcBridge::new(stream, engine)
                                .with_shutdown(conn_shutdown_rx.clone());
                            let conns = Arc::clone(&active_connections);

                            tokio::spawn(async move {
                                debug!("Connection from {}", peer_addr);
                                match bridge.run().await {
                                    Ok(()) => debug!("Connection {} closed", peer_addr),
                                    Err(e) => debug!("Connection {} ended: {}", peer_addr, e),
                                }
                                conns.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
            }
        }
    }
}
