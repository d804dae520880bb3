//! The controller service object.
//!
//! Owns the surface, sandbox, store and animator. Built once at startup and
//! shared by every connection through an `Arc`.

use crate::animator::Animator;
use crate::config::StripConfig;
use crate::pixels::{Color, PixelSurface, Position, StripDriver, SurfaceSnapshot};
use crate::sandbox::{AnimationSandbox, SandboxProfile};
use crate::store::AnimationStore;
use crate::{LightsError, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a client can observe about the strip at once.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerState {
    pub leds: usize,
    /// The surface lock was held, so `surface` could not be read.
    pub busy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface: Option<SurfaceSnapshot>,
    pub animation: Option<String>,
}

/// Builder for [`LightController`].
#[derive(Debug, Clone)]
pub struct LightControllerBuilder {
    animations_dir: PathBuf,
    leds: usize,
    profile: SandboxProfile,
}

impl LightControllerBuilder {
    /// Strip length. Defaults to [`StripConfig::DEFAULT_LEDS`].
    pub fn leds(mut self, leds: usize) -> Self {
        self.leds = leds;
        self
    }

    pub fn sandbox_profile(mut self, profile: SandboxProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Open the store and start the animator against `driver`.
    pub fn build(self, driver: impl StripDriver + 'static) -> Result<LightController> {
        let surface = PixelSurface::new(self.leds, driver);
        let store = AnimationStore::open(self.animations_dir)?;
        let sandbox = Arc::new(AnimationSandbox::new(surface.clone(), self.profile)?);
        let animator = Animator::spawn(Arc::clone(&sandbox), store.clone(), surface.clone())?;

        info!(
            leds = self.leds,
            allow_sleep = self.profile.allow_sleep,
            "Controller ready, animations in {}",
            store.root().display()
        );

        Ok(LightController {
            surface,
            sandbox,
            store,
            animator,
        })
    }
}

/// Implements every remote operation on top of the core components.
#[derive(Debug)]
pub struct LightController {
    surface: PixelSurface,
    sandbox: Arc<AnimationSandbox>,
    store: AnimationStore,
    animator: Animator,
}

impl LightController {
    pub fn builder(animations_dir: impl Into<PathBuf>) -> LightControllerBuilder {
        LightControllerBuilder {
            animations_dir: animations_dir.into(),
            leds: StripConfig::DEFAULT_LEDS,
            profile: SandboxProfile::default(),
        }
    }

    pub fn leds(&self) -> usize {
        self.surface.len()
    }

    pub fn surface(&self) -> &PixelSurface {
        &self.surface
    }

    /// Set the pixels addressed by `position`. Every index must be on the strip.
    pub fn set(&self, position: &Position, color: Color) -> Result<bool> {
        position.check_bounds(self.surface.len())?;
        Ok(self.surface.set(position, color))
    }

    /// Assign colors by index from pixel 0. More colors than pixels is an error.
    pub fn set_all(&self, colors: &[Color]) -> Result<bool> {
        if colors.len() > self.surface.len() {
            return Err(LightsError::InvalidParams {
                message: format!(
                    "got {} colors for a strip of {} pixels",
                    colors.len(),
                    self.surface.len()
                ),
            });
        }
        Ok(self.surface.set_all(colors))
    }

    pub fn fill(&self, color: Color) -> bool {
        self.surface.fill(color)
    }

    pub fn brightness(&self, level: i64) -> bool {
        self.surface.brightness(level)
    }

    pub fn mode(&self, instant: bool) -> bool {
        self.surface.mode(instant)
    }

    pub fn show(&self) -> bool {
        self.surface.show()
    }

    /// Queue `name` on the animator. An unknown name is reported as `false`.
    pub fn animate(&self, name: &str) -> Result<bool> {
        AnimationStore::validate_name(name)?;
        match self.animator.queue(name) {
            Ok(()) => Ok(true),
            Err(LightsError::UnknownAnimation { name }) => {
                warn!("Cannot start unknown animation '{}'", name);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Halt the running animation; returns once no frame is in flight.
    pub fn stop_animation(&self) {
        self.animator.pause();
    }

    /// Validate `artifact` and persist it under `name`.
    ///
    /// Nothing is written when validation fails.
    pub fn register_animation(&self, name: &str, artifact: &[u8]) -> Result<()> {
        AnimationStore::validate_name(name)?;
        if let Err(e) = self.sandbox.validate(artifact) {
            warn!("Rejected animation '{}': {}", name, e);
            return Err(e.into());
        }
        self.store.save(name, artifact)
    }

    /// Forget `name`. A running instance keeps running until replaced or halted.
    pub fn unregister_animation(&self, name: &str) -> Result<()> {
        self.store.remove(name)
    }

    pub fn list_animations(&self) -> Result<Vec<String>> {
        self.store.list()
    }

    pub fn state(&self) -> ControllerState {
        let surface = self.surface.snapshot();
        ControllerState {
            leds: self.surface.len(),
            busy: surface.is_none(),
            surface,
            animation: self.animator.current(),
        }
    }

    /// Stop the animator for good. Surface calls keep working.
    pub fn shutdown(&self) {
        self.animator.stop();
    }
}
