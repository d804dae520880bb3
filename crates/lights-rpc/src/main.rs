//! Lights RPC Server - JSON-RPC front end for an addressable LED strip.
//!
//! Wraps the lights-core controller in a TCP server speaking length-prefixed
//! JSON-RPC 2.0. Without attached hardware the strip is the recording driver.

mod handlers;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use lights_core::config::StripConfig;
use lights_core::{LightController, RecordingStrip, SandboxProfile};
use server::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "lights-rpc")]
#[command(about = "JSON-RPC server for an addressable LED strip")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, env = "LIGHTS_PORT", default_value_t = 30000)]
    port: u16,

    /// Host to bind to
    #[arg(long, env = "LIGHTS_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Number of LEDs on the strip
    #[arg(long, env = "LIGHTS_LEDS", default_value_t = StripConfig::DEFAULT_LEDS)]
    leds: usize,

    /// Directory holding registered animations (defaults to the user data dir)
    #[arg(long, env = "LIGHTS_ANIMATIONS_DIR")]
    animations_dir: Option<PathBuf>,

    /// Do not link the `sleep` capability into animations
    #[arg(long, env = "LIGHTS_DISABLE_SLEEP")]
    disable_sleep: bool,

    /// Enable debug logging
    #[arg(short, long, env = "LIGHTS_DEBUG")]
    debug: bool,

    /// Log filter directives, e.g. `info,lights_core::rpc=debug` (overrides --debug)
    #[arg(long, env = "LIGHTS_LOG")]
    log: Option<String>,
}

/// Build the log filter from explicit directives, falling back to the
/// `--debug` level when none are given or they do not parse.
fn log_filter(debug: bool, directives: Option<&str>) -> EnvFilter {
    let level = if debug { "debug" } else { "info" };
    match directives.map(EnvFilter::try_new) {
        Some(Ok(filter)) => filter,
        Some(Err(e)) => {
            eprintln!("Ignoring invalid log directives: {}", e);
            EnvFilter::new(level)
        }
        None => EnvFilter::new(level),
    }
}

fn default_animations_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("lights").join("animations"))
        .context("no platform data directory; pass --animations-dir")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the RPC_PORT line
    FmtSubscriber::builder()
        .with_env_filter(log_filter(args.debug, args.log.as_deref()))
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    info!("Starting lights RPC server");

    let animations_dir = match args.animations_dir {
        Some(path) => path,
        None => default_animations_dir()?,
    };
    info!("Animations directory: {}", animations_dir.display());

    let controller = LightController::builder(&animations_dir)
        .leds(args.leds)
        .sandbox_profile(SandboxProfile {
            allow_sleep: !args.disable_sleep,
            ..SandboxProfile::default()
        })
        .build(RecordingStrip::with_history(StripConfig::RECORDING_HISTORY))
        .context("failed to start the controller")?;
    let state = Arc::new(AppState::new(controller));

    let server = server::start_server(Arc::clone(&state), &args.host, args.port)
        .await
        .with_context(|| format!("failed to bind {}:{}", args.host, args.port))?;

    // Read by supervisors and tests to discover the port
    println!("RPC_PORT={}", server.port);

    info!("RPC server running on {}", server.addr());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    server.join().await;
    state.controller.shutdown();

    Ok(())
}
