//! Pixel surface shared between RPC handlers and the animator.

mod color;
mod driver;
mod position;
mod surface;

pub use color::{clamp, clamp_channel, Color};
pub use driver::{DriverError, RecordedFrame, RecordingStrip, StripDriver, StripProbe};
pub use position::Position;
pub use surface::{PixelSurface, SurfaceSnapshot, WriteMode};
