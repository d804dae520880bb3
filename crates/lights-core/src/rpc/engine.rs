//! Poll-driven request/response engine.
//!
//! An engine never performs I/O itself. Bytes are pushed in with `feed`,
//! requests are processed by `poll_once`, and encoded responses are pulled
//! out with `take_outbound`. Engines are not reentrant: only one thread may
//! drive an engine, which the bridge guarantees.

use super::protocol::{encode_frame, try_decode_frame, RpcRequest, RpcResponse};
use crate::{LightsError, Result};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

/// Synchronous, non-reentrant RPC engine driven by a poll loop.
pub trait RpcEngine: Send {
    /// Append received bytes.
    fn feed(&mut self, bytes: &[u8]);

    /// Process every complete request buffered so far.
    ///
    /// An error means the connection cannot continue.
    fn poll_once(&mut self) -> Result<()>;

    /// Remove up to `max` bytes of encoded output, if any is pending.
    fn take_outbound(&mut self, max: usize) -> Option<Vec<u8>>;

    /// Bytes of encoded output not yet taken.
    fn pending_outbound(&self) -> usize;
}

/// Handles one decoded method call.
pub trait RpcDispatch: Send + Sync + 'static {
    fn dispatch(&self, method: &str, params: Value) -> Result<Value>;
}

impl<D: RpcDispatch + ?Sized> RpcDispatch for Arc<D> {
    fn dispatch(&self, method: &str, params: Value) -> Result<Value> {
        (**self).dispatch(method, params)
    }
}

/// JSON-RPC 2.0 over length-prefixed frames.
pub struct JsonRpcEngine<D> {
    dispatch: D,
    inbound: Vec<u8>,
    outbound: VecDeque<u8>,
}

impl<D: RpcDispatch> JsonRpcEngine<D> {
    pub fn new(dispatch: D) -> Self {
        Self {
            dispatch,
            inbound: Vec::new(),
            outbound: VecDeque::new(),
        }
    }

    fn handle_frame(&self, payload: &[u8]) -> Option<RpcResponse> {
        let request: RpcRequest = match serde_json::from_slice(payload) {
            Ok(request) => request,
            Err(e) => {
                debug!("Rejecting unparseable request: {}", e);
                return Some(RpcResponse::error(None, -32700, format!("Parse error: {}", e)));
            }
        };

        if request.jsonrpc != "2.0" {
            return Some(RpcResponse::error(
                request.id,
                -32600,
                "Invalid Request: expected jsonrpc 2.0".to_string(),
            ));
        }

        let params = request
            .params
            .unwrap_or_else(|| Value::Object(Default::default()));
        let outcome = self.dispatch.dispatch(&request.method, params);

        // Notifications are executed but never answered
        let id = request.id?;
        Some(match outcome {
            Ok(result) => RpcResponse::success(Some(id), result),
            Err(e) => RpcResponse::error(Some(id), e.to_rpc_error_code(), e.to_string()),
        })
    }

    fn push_response(&mut self, response: &RpcResponse) -> Result<()> {
        let payload = serde_json::to_vec(response)?;
        match encode_frame(&payload) {
            Ok(frame) => self.outbound.extend(frame),
            Err(e) => {
                warn!("Dropping response that cannot be framed: {}", e);
                let fallback = RpcResponse::error(response.id.clone(), -32603, e.to_string());
                self.outbound
                    .extend(encode_frame(&serde_json::to_vec(&fallback)?)?);
            }
        }
        Ok(())
    }
}

impl<D: RpcDispatch> RpcEngine for JsonRpcEngine<D> {
    fn feed(&mut self, bytes: &[u8]) {
        self.inbound.extend_from_slice(bytes);
    }

    fn poll_once(&mut self) -> Result<()> {
        while let Some(payload) = try_decode_frame(&mut self.inbound)? {
            if let Some(response) = self.handle_frame(&payload) {
                self.push_response(&response)?;
            }
        }
        Ok(())
    }

    fn take_outbound(&mut self, max: usize) -> Option<Vec<u8>> {
        if self.outbound.is_empty() || max == 0 {
            return None;
        }
        let n = max.min(self.outbound.len());
        Some(self.outbound.drain(..n).collect())
    }

    fn pending_outbound(&self) -> usize {
        self.outbound.len()
    }
}

impl<D> std::fmt::Debug for JsonRpcEngine<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcEngine")
            .field("inbound", &self.inbound.len())
            .field("outbound", &self.outbound.len())
            .finish()
    }
}

/// Returned for methods a dispatcher does not know.
pub fn method_not_found(method: &str) -> LightsError {
    LightsError::MethodNotFound {
        method: method.to_string(),
    }
}
