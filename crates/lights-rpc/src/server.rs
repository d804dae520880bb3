//! Server state and startup.

use crate::handlers::dispatch_method;
use lights_core::{LightController, RpcDispatch, RpcServer, RpcServerHandle};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

/// Shared state behind every connection.
pub struct AppState {
    pub controller: LightController,
}

impl AppState {
    pub fn new(controller: LightController) -> Self {
        Self { controller }
    }
}

impl RpcDispatch for AppState {
    fn dispatch(&self, method: &str, params: Value) -> lights_core::Result<Value> {
        debug!("RPC call: {}({:?})", method, params);

        let result = dispatch_method(self, method, &params);
        if let Err(e) = &result {
            error!("RPC error for {}: {}", method, e);
        }
        result
    }
}

/// Bind `host:port` and serve `state` on every connection.
pub async fn start_server(
    state: Arc<AppState>,
    host: &str,
    port: u16,
) -> lights_core::Result<RpcServerHandle> {
    RpcServer::start((host, port), state).await
}
