//! Centralized configuration for the lights controller.
//!
//! Tunables for the animator loop, the RPC bridge, the sandbox and the
//! on-disk store. Deployment settings (address, strip length, paths) come
//! from the binary's command line.

use std::time::Duration;

/// Strip defaults.
pub struct StripConfig;

impl StripConfig {
    /// LEDs per meter of the reference strip.
    pub const DEFAULT_DENSITY: usize = 30;
    /// Meters of strip.
    pub const DEFAULT_LENGTH: usize = 5;
    pub const DEFAULT_LEDS: usize = Self::DEFAULT_DENSITY * Self::DEFAULT_LENGTH;
    /// Frames kept by the headless recording driver.
    pub const RECORDING_HISTORY: usize = 256;
}

/// Animator worker timing.
pub struct AnimatorConfig;

impl AnimatorConfig {
    /// How long an idle worker waits on the hand-off cell before re-checking
    /// its stop flag.
    pub const IDLE_WAIT: Duration = Duration::from_secs(10);
    /// Attempts made by `pause` to force instant mode while the surface is busy.
    pub const BUSY_RETRY_ATTEMPTS: u32 = 50;
    pub const BUSY_RETRY_DELAY: Duration = Duration::from_millis(2);
    pub const THREAD_NAME: &'static str = "animator";
}

/// Sandbox capability boundary.
pub struct SandboxConfig;

impl SandboxConfig {
    /// Import module every host capability lives in.
    pub const HOST_MODULE: &'static str = "env";
    /// Export invoked once per frame.
    pub const ENTRYPOINT: &'static str = "animate";
    /// Upper bound for a single `sleep` capability call.
    pub const MAX_SLEEP: Duration = Duration::from_secs(10);
    /// Period of the epoch ticker that interrupts runaway guest code.
    pub const EPOCH_TICK: Duration = Duration::from_millis(10);
    /// Guest time allowed for instantiation, start function included.
    pub const INSTANTIATE_BUDGET: Duration = Duration::from_secs(1);
    /// Default wall time allowed for one frame. Longer than `MAX_SLEEP` so a
    /// single sleep never trips it.
    pub const FRAME_BUDGET: Duration = Duration::from_secs(15);
}

/// Per-connection bridge timing and limits.
pub struct BridgeConfig;

impl BridgeConfig {
    pub const READ_CHUNK_SIZE: usize = 4096;
    pub const WRITE_CHUNK_SIZE: usize = 4096;
    /// Bounded wait used by both pumps before re-checking the continue flag.
    pub const PUMP_WAIT: Duration = Duration::from_millis(100);
    /// Cadence of the engine poll step.
    pub const POLL_INTERVAL: Duration = Duration::from_millis(10);
    pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
    /// Read chunks buffered ahead of the poll step.
    pub const INBOUND_QUEUE_DEPTH: usize = 16;
    /// Write chunks buffered ahead of the socket. When full, the poll step
    /// stops taking new requests until the peer reads.
    pub const OUTBOUND_QUEUE_DEPTH: usize = 16;
    pub const MAX_CONNECTIONS: usize = 32;
}

/// Animation store layout.
pub struct StoreConfig;

impl StoreConfig {
    pub const ARTIFACT_EXTENSION: &'static str = "wasm";
    pub const MAX_NAME_LEN: usize = 128;
}
