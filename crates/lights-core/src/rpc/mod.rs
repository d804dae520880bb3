//! Remote control over length-prefixed JSON-RPC 2.0.
//!
//! # Architecture
//!
//! - **Engine**: synchronous, poll-driven request processing ([`RpcEngine`])
//! - **Bridge**: per-connection read pump, write pump and poll step
//! - **Server**: TCP accept loop, one bridge per connection
//! - **Protocol**: shared framing and JSON-RPC types used by server and client

pub mod bridge;
pub mod client;
pub mod engine;
pub mod protocol;
pub mod server;

pub use bridge::RpcBridge;
pub use client::RpcClient;
pub use engine::{method_not_found, JsonRpcEngine, RpcDispatch, RpcEngine};
pub use protocol::{RpcRequest, RpcResponse};
pub use server::{RpcServer, RpcServerHandle};
