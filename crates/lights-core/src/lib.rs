//! Lights Core - headless library for a remotely driven LED strip.
//!
//! Clients set colors, brightness and write mode over JSON-RPC and upload
//! small WebAssembly programs ("animations") that a dedicated worker replays
//! frame by frame against the strip.
//!
//! # Example
//!
//! ```rust,ignore
//! use lights_core::{LightController, RecordingStrip, RpcServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> lights_core::Result<()> {
//!     let controller = LightController::builder("/var/lib/lights/animations")
//!         .leds(150)
//!         .build(RecordingStrip::with_history(256))?;
//!
//!     let dispatch = Arc::new(MyDispatch::new(controller));
//!     let server = RpcServer::start("127.0.0.1:30000", dispatch).await?;
//!     println!("listening on {}", server.addr());
//!     Ok(())
//! }
//! ```

pub mod animator;
pub mod cancel;
pub mod config;
pub mod controller;
pub mod error;
pub mod pixels;
pub mod rpc;
pub mod sandbox;
pub mod store;

// Re-export commonly used types
pub use animator::{Animator, Command, HandOff};
pub use cancel::CancellationToken;
pub use controller::{ControllerState, LightController, LightControllerBuilder};
pub use error::{LightsError, Result, ValidationError};
pub use pixels::{
    clamp, clamp_channel, Color, DriverError, PixelSurface, Position, RecordedFrame,
    RecordingStrip, StripDriver, StripProbe, SurfaceSnapshot, WriteMode,
};
pub use rpc::{
    JsonRpcEngine, RpcBridge, RpcClient, RpcDispatch, RpcEngine, RpcRequest, RpcResponse,
    RpcServer, RpcServerHandle,
};
pub use sandbox::{AnimationHandle, AnimationSandbox, SandboxProfile};
pub use store::AnimationStore;
