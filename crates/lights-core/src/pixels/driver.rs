//! Device side of the pixel surface.
//!
//! The electrical protocol of a real strip lives behind [`StripDriver`].
//! [`RecordingStrip`] is the headless driver: it remembers what would have
//! been pushed to the LEDs, which is what the server runs with when no
//! hardware is attached and what tests assert against.

use super::Color;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::trace;

/// Failure reported by a strip driver while pushing a frame.
#[derive(Debug, Error)]
#[error("strip driver error: {0}")]
pub struct DriverError(pub String);

/// Pushes a full frame to the physical LEDs.
pub trait StripDriver: Send {
    fn render(&mut self, pixels: &[Color], brightness: f32) -> Result<(), DriverError>;
}

/// One frame as seen by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    /// 1-based write counter at the time of this frame.
    pub seq: u64,
    pub pixels: Vec<Color>,
    pub brightness: f32,
}

#[derive(Debug, Default)]
struct Recording {
    writes: u64,
    capacity: usize,
    history: VecDeque<RecordedFrame>,
}

/// Headless driver that records rendered frames.
#[derive(Debug, Clone)]
pub struct RecordingStrip {
    recording: Arc<Mutex<Recording>>,
}

impl RecordingStrip {
    /// Keep at most `capacity` frames of history (the newest ones).
    pub fn with_history(capacity: usize) -> Self {
        Self {
            recording: Arc::new(Mutex::new(Recording {
                capacity: capacity.max(1),
                ..Default::default()
            })),
        }
    }

    /// Read side of the recording, usable after the driver has been moved
    /// into a surface.
    pub fn probe(&self) -> StripProbe {
        StripProbe {
            recording: self.recording.clone(),
        }
    }
}

impl StripDriver for RecordingStrip {
    fn render(&mut self, pixels: &[Color], brightness: f32) -> Result<(), DriverError> {
        let mut recording = self
            .recording
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        recording.writes += 1;
        let seq = recording.writes;
        if recording.history.len() == recording.capacity {
            recording.history.pop_front();
        }
        recording.history.push_back(RecordedFrame {
            seq,
            pixels: pixels.to_vec(),
            brightness,
        });
        trace!(seq, brightness, "rendered frame");
        Ok(())
    }
}

/// Cloneable view into a [`RecordingStrip`].
#[derive(Debug, Clone)]
pub struct StripProbe {
    recording: Arc<Mutex<Recording>>,
}

impl StripProbe {
    /// Total frames pushed to the device so far.
    pub fn writes(&self) -> u64 {
        self.lock().writes
    }

    pub fn last_frame(&self) -> Option<RecordedFrame> {
        self.lock().history.back().cloned()
    }

    /// Retained frames, oldest first.
    pub fn history(&self) -> Vec<RecordedFrame> {
        self.lock().history.iter().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recording> {
        self.recording.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
