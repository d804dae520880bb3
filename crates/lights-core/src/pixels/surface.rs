//! The shared pixel surface.
//!
//! RPC handlers and the animator worker both mutate the strip. Every
//! operation takes the surface lock with `try_lock` and gives up immediately
//! when it is held elsewhere, returning `false`. Callers treat that as
//! transient: commands and animation frames interleave at call granularity
//! and neither side can stall the other.

use super::{clamp, Color, Position, StripDriver};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use tracing::{debug, error, warn};

/// When writes reach the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Every mutating call is pushed to the device immediately.
    Instant,
    /// Writes only touch the buffer until `show`.
    #[serde(rename = "queue")]
    Queued,
}

/// Point-in-time copy of the surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurfaceSnapshot {
    pub pixels: Vec<Color>,
    pub brightness: f32,
    pub mode: WriteMode,
}

struct Strip {
    pixels: Vec<Color>,
    brightness: f32,
    mode: WriteMode,
    driver: Box<dyn StripDriver>,
}

impl Strip {
    fn render(&mut self) {
        if let Err(e) = self.driver.render(&self.pixels, self.brightness) {
            error!("Failed to write to strip: {}", e);
        }
    }

    /// Propagate a mutation if the surface is in instant mode.
    fn write_through(&mut self) {
        if self.mode == WriteMode::Instant {
            self.render();
        }
    }
}

/// Handle to the strip buffer. Clones share the same strip.
#[derive(Clone)]
pub struct PixelSurface {
    strip: Arc<Mutex<Strip>>,
    len: usize,
}

impl std::fmt::Debug for PixelSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelSurface").field("len", &self.len).finish()
    }
}

impl PixelSurface {
    /// Create a surface of `len` black pixels at full brightness in instant mode.
    pub fn new(len: usize, driver: impl StripDriver + 'static) -> Self {
        Self {
            strip: Arc::new(Mutex::new(Strip {
                pixels: vec![Color::BLACK; len],
                brightness: 1.0,
                mode: WriteMode::Instant,
                driver: Box::new(driver),
            })),
            len,
        }
    }

    /// Number of pixels; fixed for the lifetime of the surface.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Write `color` to every index implied by `position`, in order.
    /// Indices past the end of the strip are skipped.
    pub fn set(&self, position: &Position, color: Color) -> bool {
        self.try_with("set", |strip| {
            for index in position.indices() {
                match strip.pixels.get_mut(index) {
                    Some(pixel) => *pixel = color,
                    None => debug!(index, "Skipping out-of-range pixel"),
                }
            }
            strip.write_through();
        })
    }

    /// Assign `colors[i]` to pixel `i`; extra colors are ignored.
    pub fn set_all(&self, colors: &[Color]) -> bool {
        self.try_with("set_all", |strip| {
            for (pixel, color) in strip.pixels.iter_mut().zip(colors) {
                *pixel = *color;
            }
            strip.write_through();
        })
    }

    /// Write `color` to the whole strip.
    pub fn fill(&self, color: Color) -> bool {
        self.try_with("fill", |strip| {
            strip.pixels.fill(color);
            strip.write_through();
        })
    }

    /// Set brightness from a percentage, clamped to `[0, 100]`.
    pub fn brightness(&self, level: i64) -> bool {
        let fraction = clamp(level, 0, 100) as f32 / 100.0;
        self.try_with("brightness", |strip| {
            strip.brightness = fraction;
            strip.write_through();
        })
    }

    /// Switch the write mode. Does not flush anything already buffered.
    pub fn mode(&self, instant: bool) -> bool {
        let mode = if instant {
            WriteMode::Instant
        } else {
            WriteMode::Queued
        };
        self.try_with("mode", |strip| strip.mode = mode)
    }

    /// Push the buffer to the device. Only does anything in queued mode.
    pub fn show(&self) -> bool {
        self.try_with("show", |strip| {
            if strip.mode == WriteMode::Queued {
                strip.render();
            }
        })
    }

    /// Copy the current state, or `None` if the surface is busy.
    pub fn snapshot(&self) -> Option<SurfaceSnapshot> {
        let strip = self.try_lock("snapshot")?;
        Some(SurfaceSnapshot {
            pixels: strip.pixels.clone(),
            brightness: strip.brightness,
            mode: strip.mode,
        })
    }

    fn try_with(&self, op: &'static str, f: impl FnOnce(&mut Strip)) -> bool {
        match self.try_lock(op) {
            Some(mut strip) => {
                f(&mut *strip);
                true
            }
            None => false,
        }
    }

    fn try_lock(&self, op: &'static str) -> Option<MutexGuard<'_, Strip>> {
        match self.strip.try_lock() {
            Ok(strip) => Some(strip),
            Err(TryLockError::WouldBlock) => {
                debug!(op, "Pixel surface busy");
                None
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                warn!(op, "Recovering poisoned pixel surface lock");
                Some(poisoned.into_inner())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixels::{RecordingStrip, StripProbe};

    const RED: Color = Color::new(255, 0, 0);
    const BLUE: Color = Color::new(0, 0, 255);

    fn surface(len: usize) -> (PixelSurface, StripProbe) {
        let strip = RecordingStrip::with_history(64);
        let probe = strip.probe();
        (PixelSurface::new(len, strip), probe)
    }

    #[test]
    fn test_set_touches_exactly_the_range() {
        let (surface, _) = surface(8);
        assert!(surface.set(&Position::Range { start: 5, end: 2 }, RED));

        let pixels = surface.snapshot().unwrap().pixels;
        for (index, pixel) in pixels.iter().enumerate() {
            let expected = if (2..=5).contains(&index) { RED } else { Color::BLACK };
            assert_eq!(*pixel, expected, "pixel {index}");
        }
    }

    #[test]
    fn test_set_list_applies_each_entry() {
        let (surface, probe) = surface(4);
        assert!(surface.set(&Position::List(vec![3, 3, 1]), BLUE));

        let pixels = surface.snapshot().unwrap().pixels;
        assert_eq!(pixels, vec![Color::BLACK, BLUE, Color::BLACK, BLUE]);
        assert_eq!(probe.writes(), 1);
    }

    #[test]
    fn test_set_skips_out_of_range_indices() {
        let (surface, _) = surface(2);
        assert!(surface.set(&Position::List(vec![1, 7]), RED));
        assert_eq!(surface.snapshot().unwrap().pixels, vec![Color::BLACK, RED]);
    }

    #[test]
    fn test_brightness_is_clamped_percentage() {
        let (surface, _) = surface(1);

        surface.brightness(150);
        assert_eq!(surface.snapshot().unwrap().brightness, 1.0);

        surface.brightness(-10);
        assert_eq!(surface.snapshot().unwrap().brightness, 0.0);

        surface.brightness(57);
        assert!((surface.snapshot().unwrap().brightness - 0.57).abs() < f32::EPSILON);
    }

    #[test]
    fn test_instant_mode_writes_every_call() {
        let (surface, probe) = surface(3);
        surface.fill(RED);
        surface.set(&Position::Single(0), BLUE);
        assert_eq!(probe.writes(), 2);

        // show is a no-op in instant mode
        surface.show();
        assert_eq!(probe.writes(), 2);
        assert_eq!(probe.last_frame().unwrap().pixels, vec![BLUE, RED, RED]);
    }

    #[test]
    fn test_queued_mode_requires_show() {
        let (surface, probe) = surface(3);
        surface.mode(false);
        surface.fill(RED);
        surface.set(&Position::Single(2), BLUE);

        assert_eq!(probe.writes(), 0);
        assert_eq!(
            surface.snapshot().unwrap().pixels,
            vec![RED, RED, BLUE],
            "buffer is mutated even while queued"
        );

        surface.show();
        assert_eq!(probe.writes(), 1);
        assert_eq!(probe.last_frame().unwrap().pixels, vec![RED, RED, BLUE]);
    }

    #[test]
    fn test_switching_to_instant_does_not_flush() {
        let (surface, probe) = surface(2);
        surface.mode(false);
        surface.fill(RED);
        surface.mode(true);
        assert_eq!(probe.writes(), 0);
        assert_eq!(surface.snapshot().unwrap().mode, WriteMode::Instant);
    }

    #[test]
    fn test_set_all_assigns_by_index() {
        let (surface, _) = surface(3);
        assert!(surface.set_all(&[BLUE, RED]));
        assert_eq!(
            surface.snapshot().unwrap().pixels,
            vec![BLUE, RED, Color::BLACK]
        );
    }

    #[test]
    fn test_contended_lock_reports_busy() {
        let (surface, probe) = surface(2);
        let held = surface.strip.lock().unwrap();

        assert!(!surface.fill(RED));
        assert!(!surface.brightness(10));
        assert!(!surface.mode(false));
        assert!(!surface.show());
        assert!(surface.snapshot().is_none());

        drop(held);
        assert!(surface.fill(RED));
        assert_eq!(probe.writes(), 1);
    }

    #[test]
    fn test_mode_serializes_like_the_rpc_enum() {
        assert_eq!(serde_json::to_string(&WriteMode::Queued).unwrap(), "\"queue\"");
        assert_eq!(serde_json::to_string(&WriteMode::Instant).unwrap(), "\"instant\"");
    }
}
