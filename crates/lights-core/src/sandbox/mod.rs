//! WebAssembly sandbox for animations.
//!
//! An animation is a wasm module exporting `animate: [] -> []`. Each call of
//! that export is one frame. The module can only reach the host through the
//! capability set in [`capabilities`].
//!
//! Guest code runs under wasmtime epoch interruption: a ticker thread advances
//! the engine epoch, and instantiation and each frame get a deadline. Code
//! still running past its deadline traps instead of pinning the thread.

mod capabilities;

use crate::cancel::CancellationToken;
use crate::config::SandboxConfig;
use crate::error::ValidationError;
use crate::pixels::PixelSurface;
use crate::{LightsError, Result};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, instrument};
use wasmtime::{Config, Engine, Extern, Instance, Linker, Module, Store, TypedFunc};

/// Which optional capabilities a deployment exposes.
#[derive(Debug, Clone, Copy)]
pub struct SandboxProfile {
    /// Link `env.sleep(f64)`. It blocks the animator thread for the duration.
    pub allow_sleep: bool,
    /// Wall time after which a frame still executing guest code is aborted.
    pub frame_budget: Duration,
}

impl Default for SandboxProfile {
    fn default() -> Self {
        Self {
            allow_sleep: true,
            frame_budget: SandboxConfig::FRAME_BUDGET,
        }
    }
}

/// Epoch ticks covering `budget`, at least one.
fn ticks(budget: Duration) -> u64 {
    let ticks = budget.as_millis() / SandboxConfig::EPOCH_TICK.as_millis().max(1);
    u64::try_from(ticks).unwrap_or(u64::MAX).max(1)
}

/// Advances the engine epoch until dropped.
struct EpochTicker {
    stop: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl EpochTicker {
    fn start(engine: Engine) -> Result<Self> {
        let stop = CancellationToken::new();
        let token = stop.clone();
        let thread = thread::Builder::new()
            .name("wasm-epoch".to_string())
            .spawn(move || {
                while token.should_continue() {
                    thread::sleep(SandboxConfig::EPOCH_TICK);
                    engine.increment_epoch();
                }
            })
            .map_err(|e| LightsError::Sandbox {
                message: format!("failed to start epoch ticker: {e}"),
            })?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }
}

impl Drop for EpochTicker {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Per-instance host data. `surface` is `None` for dry-run instances.
pub(crate) struct HostState {
    surface: Option<PixelSurface>,
}

/// A loaded animation, ready to run frames.
pub struct AnimationHandle {
    name: String,
    store: Store<HostState>,
    entrypoint: TypedFunc<(), ()>,
}

impl AnimationHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for AnimationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Compiles, validates and runs animations against a pixel surface.
pub struct AnimationSandbox {
    engine: Engine,
    linker: Linker<HostState>,
    surface: PixelSurface,
    frame_ticks: u64,
    _ticker: EpochTicker,
}

impl std::fmt::Debug for AnimationSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationSandbox")
            .field("surface", &self.surface)
            .field("frame_ticks", &self.frame_ticks)
            .finish_non_exhaustive()
    }
}

impl AnimationSandbox {
    pub fn new(surface: PixelSurface, profile: SandboxProfile) -> Result<Self> {
        let mut config = Config::new();
        config.epoch_interruption(true);
        let engine = Engine::new(&config).map_err(|e| LightsError::Sandbox {
            message: format!("failed to create wasm engine: {e:#}"),
        })?;
        let linker = capabilities::linker(&engine, profile).map_err(|e| LightsError::Sandbox {
            message: format!("failed to link host capabilities: {e:#}"),
        })?;
        let ticker = EpochTicker::start(engine.clone())?;

        Ok(Self {
            engine,
            linker,
            surface,
            frame_ticks: ticks(profile.frame_budget),
            _ticker: ticker,
        })
    }

    /// Check that `artifact` is a loadable animation.
    ///
    /// The module is instantiated in a dry run: capability calls made by its
    /// start function do not reach the strip.
    #[instrument(skip_all, fields(bytes = artifact.len()))]
    pub fn validate(&self, artifact: &[u8]) -> std::result::Result<(), ValidationError> {
        let mut store = Store::new(&self.engine, HostState { surface: None });
        self.instantiate(&mut store, artifact)?;
        debug!("Animation validated");
        Ok(())
    }

    /// Instantiate `artifact` against the live surface.
    #[instrument(skip(self, artifact))]
    pub fn load(
        &self,
        name: &str,
        artifact: &[u8],
    ) -> std::result::Result<AnimationHandle, ValidationError> {
        let mut store = Store::new(
            &self.engine,
            HostState {
                surface: Some(self.surface.clone()),
            },
        );
        let entrypoint = self.instantiate(&mut store, artifact)?;
        debug!("Animation loaded");

        Ok(AnimationHandle {
            name: name.to_string(),
            store,
            entrypoint,
        })
    }

    /// Run exactly one frame.
    ///
    /// A frame that outlives the profile's `frame_budget` fails with
    /// `FrameExecutionFailed`.
    pub fn run_frame(&self, handle: &mut AnimationHandle) -> Result<()> {
        handle.store.set_epoch_deadline(self.frame_ticks);
        handle
            .entrypoint
            .call(&mut handle.store, ())
            .map_err(|trap| LightsError::FrameExecutionFailed {
                animation: handle.name.clone(),
                message: format!("{trap:#}"),
            })
    }

    fn instantiate(
        &self,
        store: &mut Store<HostState>,
        artifact: &[u8],
    ) -> std::result::Result<TypedFunc<(), ()>, ValidationError> {
        let module = Module::new(&self.engine, artifact).map_err(load_error)?;
        store.set_epoch_deadline(ticks(SandboxConfig::INSTANTIATE_BUDGET));
        let instance = self
            .linker
            .instantiate(&mut *store, &module)
            .map_err(load_error)?;
        entrypoint(store, &instance)
    }
}

/// Resolve and type-check the `animate` export.
fn entrypoint(
    store: &mut Store<HostState>,
    instance: &Instance,
) -> std::result::Result<TypedFunc<(), ()>, ValidationError> {
    let func = match instance.get_export(&mut *store, SandboxConfig::ENTRYPOINT) {
        Some(Extern::Func(func)) => func,
        Some(other) => {
            return Err(ValidationError::InvalidEntrypointSignature {
                found: format!("a non-function export ({})", extern_kind(&other)),
            })
        }
        None => return Err(ValidationError::MissingEntrypoint),
    };

    let ty = func.ty(&*store);
    let (params, results) = (ty.params().len(), ty.results().len());
    if params != 0 || results != 0 {
        return Err(ValidationError::InvalidEntrypointSignature {
            found: format!("{params} params and {results} results"),
        });
    }

    func.typed::<(), ()>(&*store).map_err(load_error)
}

fn extern_kind(export: &Extern) -> &'static str {
    match export {
        Extern::Func(_) => "function",
        Extern::Global(_) => "global",
        Extern::Table(_) => "table",
        Extern::Memory(_) => "memory",
        _ => "other",
    }
}

fn load_error(err: wasmtime::Error) -> ValidationError {
    ValidationError::Load {
        message: format!("{err:#}"),
    }
}
