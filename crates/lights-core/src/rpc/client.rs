//! Minimal TCP client for the controller's RPC server.
//!
//! Calls are serialized over one connection with a tokio `Mutex`, so the
//! client can be shared between tasks.

use super::protocol::{read_frame, write_frame, RpcError, RpcRequest, RpcResponse};
use crate::{LightsError, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct RpcClient {
    stream: Mutex<TcpStream>,
    addr: SocketAddr,
    next_id: AtomicU64,
}

impl RpcClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| LightsError::Protocol {
                message: format!("timed out connecting to {}", addr),
            })??;

        debug!("RPC client connected to {}", addr);

        Ok(Self {
            stream: Mutex::new(stream),
            addr,
            next_id: AtomicU64::new(1),
        })
    }

    /// Call `method` and return the raw response, error or not.
    pub async fn request(&self, method: &str, params: serde_json::Value) -> Result<RpcResponse> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(method, params, id);
        let request_bytes = serde_json::to_vec(&request)?;

        let mut stream = self.stream.lock().await;
        let (mut reader, mut writer) = stream.split();

        write_frame(&mut writer, &request_bytes).await?;
        let response_bytes = read_frame(&mut reader)
            .await?
            .ok_or_else(|| LightsError::Protocol {
                message: format!("connection to {} closed", self.addr),
            })?;

        serde_json::from_slice(&response_bytes).map_err(|e| LightsError::Json {
            message: format!("Failed to parse RPC response: {}", e),
            source: Some(e),
        })
    }

    /// Call `method`, turning an error response into `Err`.
    pub async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let response = self.request(method, params).await?;

        if let Some(RpcError { code, message, .. }) = response.error {
            return Err(LightsError::Other(format!("RPC error {}: {}", code, message)));
        }

        response
            .result
            .ok_or_else(|| LightsError::Other("RPC response missing result".to_string()))
    }

    /// Send a notification; the server sends nothing back.
    pub async fn notify(&self, method: &str, params: serde_json::Value) -> Result<()> {
        let request_bytes = serde_json::to_vec(&RpcRequest::notification(method, params))?;
        let mut stream = self.stream.lock().await;
        write_frame(&mut *stream, &request_bytes).await
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}
