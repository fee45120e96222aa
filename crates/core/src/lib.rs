#![warn(missing_docs)]
//! Core primitives shared across the workspace.

pub mod entity;
pub mod render_flags;

use serde::{Deserialize, Serialize};

pub use entity::{EntityNumber, EntityState, DEFAULT_STATE};
pub use render_flags::RenderFlags;

/// Number of an outgoing entity frame (32-bit on the wire).
///
/// Frame 0 is reserved for "no frame": a fresh connection has acknowledged
/// nothing and the first frame written is 1.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct FrameNumber(pub i32);

impl FrameNumber {
    /// The "no frame" sentinel.
    pub const NONE: Self = Self(0);

    /// Advance by `delta` frames.
    pub fn advance(self, delta: i32) -> Self {
        Self(self.0.wrapping_add(delta))
    }

    /// Frames elapsed since `earlier`, never negative.
    pub fn since(self, earlier: FrameNumber) -> i32 {
        self.0.saturating_sub(earlier.0).max(0)
    }

    /// True for any frame that was actually written.
    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}
