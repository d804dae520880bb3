//! Host functions linked into every animation.
//!
//! This list is the whole privilege of an animation: no WASI, no clock, no
//! filesystem, no network. A module importing anything else fails to
//! instantiate.

use super::{HostState, SandboxProfile};
use crate::config::SandboxConfig;
use crate::pixels::{Color, PixelSurface, Position};
use std::thread;
use std::time::Duration;
use tracing::trace;
use wasmtime::{Caller, Engine, Linker};

const HOST: &str = SandboxConfig::HOST_MODULE;

/// Build the linker exposing the capability set for `profile`.
pub(super) fn linker(engine: &Engine, profile: SandboxProfile) -> anyhow::Result<Linker<HostState>> {
    let mut linker = Linker::new(engine);

    linker.func_wrap(HOST, "set_brightness", |caller: Caller<'_, HostState>, level: i32| {
        apply(&caller, "set_brightness", |surface| {
            surface.brightness(i64::from(level))
        });
    })?;

    linker.func_wrap(
        HOST,
        "fill",
        |caller: Caller<'_, HostState>, r: i32, g: i32, b: i32| {
            let color = Color::clamped(r.into(), g.into(), b.into());
            apply(&caller, "fill", |surface| surface.fill(color));
        },
    )?;

    linker.func_wrap(HOST, "set_instant_mode", |caller: Caller<'_, HostState>| {
        apply(&caller, "set_instant_mode", |surface| surface.mode(true));
    })?;

    linker.func_wrap(HOST, "set_queued_mode", |caller: Caller<'_, HostState>| {
        apply(&caller, "set_queued_mode", |surface| surface.mode(false));
    })?;

    linker.func_wrap(
        HOST,
        "set_pixel",
        |caller: Caller<'_, HostState>, index: i32, r: i32, g: i32, b: i32| {
            let Ok(index) = usize::try_from(index) else {
                trace!(index, "Ignoring negative pixel index");
                return;
            };
            let color = Color::clamped(r.into(), g.into(), b.into());
            apply(&caller, "set_pixel", |surface| {
                surface.set(&Position::Single(index), color)
            });
        },
    )?;

    linker.func_wrap(HOST, "show", |caller: Caller<'_, HostState>| {
        apply(&caller, "show", |surface| surface.show());
    })?;

    if profile.allow_sleep {
        linker.func_wrap(HOST, "sleep", |caller: Caller<'_, HostState>, seconds: f64| {
            if caller.data().surface.is_none() {
                return;
            }
            if let Some(duration) = sleep_duration(seconds) {
                thread::sleep(duration);
            }
        })?;
    }

    Ok(linker)
}

/// Run a surface operation if this store is attached to the live strip.
/// Dry-run stores (used for validation) drop the call.
fn apply(
    caller: &Caller<'_, HostState>,
    capability: &'static str,
    op: impl FnOnce(&PixelSurface) -> bool,
) {
    if let Some(surface) = caller.data().surface.as_ref() {
        if !op(surface) {
            trace!(capability, "Capability call dropped, surface busy");
        }
    }
}

/// Convert a guest-supplied duration, rejecting non-finite and non-positive
/// values and capping at [`SandboxConfig::MAX_SLEEP`].
fn sleep_duration(seconds: f64) -> Option<Duration> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    let max = SandboxConfig::MAX_SLEEP.as_secs_f64();
    Some(Duration::from_secs_f64(seconds.min(max)))
}
