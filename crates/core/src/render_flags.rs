//! Render behaviour flags carried in every entity state.
//!
//! The flags travel as a single byte. Two of them matter to the network layer
//! itself: `VIEW_MODEL` marks an entity glued to the camera (always top
//! priority) and `LOW_PRECISION` selects the narrow angle encoding and costs the
//! entity some scheduling priority.

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Rendering behaviours of an entity.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct RenderFlags: u8 {
        /// Interpolate movement in steps (monsters).
        const STEP = 1 << 0;
        /// Leave a glowing trail behind.
        const GLOW_TRAIL = 1 << 1;
        /// Drawn as the first-person view model.
        const VIEW_MODEL = 1 << 2;
        /// Hidden from the owning client's own view.
        const EXTERIOR_MODEL = 1 << 3;
        /// Use narrow encodings for this entity.
        const LOW_PRECISION = 1 << 4;
        /// Apply the player colormap.
        const COLORMAPPED = 1 << 5;
        /// Cast a shadow.
        const SHADOW = 1 << 6;
        /// Emit a dynamic light.
        const LIGHT = 1 << 7;
    }
}

impl RenderFlags {
    /// Canonical names of the set flags, used in logs.
    pub fn names(self) -> Vec<&'static str> {
        self.iter_names().map(|(name, _)| name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_flag_bits_are_stable() {
        assert_eq!(RenderFlags::STEP.bits(), 1);
        assert_eq!(RenderFlags::VIEW_MODEL.bits(), 4);
        assert_eq!(RenderFlags::LOW_PRECISION.bits(), 16);
        assert_eq!(RenderFlags::LIGHT.bits(), 128);
        assert_eq!(RenderFlags::from_bits_retain(0xFF), RenderFlags::all());
    }

    #[test]
    fn names_list_set_flags() {
        let flags = RenderFlags::VIEW_MODEL | RenderFlags::SHADOW;
        assert_eq!(flags.names(), vec!["VIEW_MODEL", "SHADOW"]);
    }
}
