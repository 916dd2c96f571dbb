//! Commands sent to a connected die.

use serde::{Deserialize, Serialize};

/// Parameters of a blink animation.
///
/// Encoded with [`codec::encode_blink`](crate::codec::encode_blink).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkParams {
    /// Number of blinks.
    pub count: u8,
    /// Total animation duration in milliseconds.
    pub duration_ms: u16,
    /// Color in 32-bit ARGB (alpha is ignored by the die).
    pub color: u32,
    /// Bit mask selecting which faces light up.
    pub face_mask: u32,
    /// Fading amount, 0 is a sharp transition and 255 the maximum fade.
    pub fade: u8,
    /// Loop byte, written to the die unchanged. Non-zero loops the
    /// animation until another one replaces it.
    pub looping: u8,
}

impl Default for BlinkParams {
    fn default() -> Self {
        Self {
            count: 2,
            duration_ms: 2000,
            color: 0x00FF_0000,
            face_mask: u32::MAX,
            fade: 0,
            looping: 0,
        }
    }
}
