//! RGB colors and channel clamping.

use serde::{Deserialize, Serialize};

/// Clamp `value` into `[lower, upper]`.
pub fn clamp(value: i64, lower: i64, upper: i64) -> i64 {
    if value > upper {
        upper
    } else if value < lower {
        lower
    } else {
        value
    }
}

/// Clamp an arbitrary integer into a color channel.
pub fn clamp_channel(value: i64) -> u8 {
    clamp(value, 0, 255) as u8
}

/// A single RGB pixel value.
///
/// Deserializes from any integers and clamps each channel, so out-of-range
/// input from a client is corrected rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "ChannelInput")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build a color from unchecked channel values, clamping each one.
    pub fn clamped(r: i64, g: i64, b: i64) -> Self {
        Self {
            r: clamp_channel(r),
            g: clamp_channel(g),
            b: clamp_channel(b),
        }
    }
}

/// Wire form of a color before clamping. Missing channels default to zero.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChannelInput {
    r: i64,
    g: i64,
    b: i64,
}

impl From<ChannelInput> for Color {
    fn from(raw: ChannelInput) -> Self {
        Color::clamped(raw.r, raw.g, raw.b)
    }
}
