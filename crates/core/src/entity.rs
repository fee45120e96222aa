//! Network-visible entity snapshot.
//!
//! An [`EntityState`] is everything a viewer needs to draw one entity. The
//! server captures one per entity per frame; the client keeps a current and a
//! previous one per entity for interpolation.

use crate::RenderFlags;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Entity identity on the wire. 0 is the world and never a valid update target.
pub type EntityNumber = u16;

/// One entity's full visible snapshot at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// Entity identity (1..max entities).
    pub number: EntityNumber,
    /// Whether this slot holds a live entity.
    pub active: bool,
    /// Snapshot time in seconds (not transmitted).
    pub time: f64,
    /// World position.
    pub origin: Vec3,
    /// Orientation in degrees (pitch, yaw, roll).
    pub angles: Vec3,
    /// Index into the model table.
    pub model_index: u16,
    /// Animation frame.
    pub frame: u16,
    /// Skin index.
    pub skin: u8,
    /// Effect bitset, opaque to the protocol.
    pub effects: u32,
    /// Render behaviour flags.
    pub flags: RenderFlags,
    /// Opacity, 255 = opaque.
    pub alpha: u8,
    /// Scale in sixteenths, 16 = 1.0.
    pub scale: u8,
    /// Player colormap.
    pub colormap: u8,
    /// Glow radius (quarter units).
    pub glow_size: u8,
    /// Glow palette colour.
    pub glow_color: u8,
    /// Light colour (RGB × 256) and radius.
    pub light: [u16; 4],
    /// Light style index.
    pub light_style: u8,
    /// Light property flags.
    pub light_pflags: u8,
    /// Entity this one is attached to, 0 for none.
    pub tag_entity: EntityNumber,
    /// Tag point on `tag_entity`.
    pub tag_index: u8,
}

/// Implicit baseline of every entity that has never been seen.
pub const DEFAULT_STATE: EntityState = EntityState {
    number: 0,
    active: false,
    time: 0.0,
    origin: Vec3::ZERO,
    angles: Vec3::ZERO,
    model_index: 0,
    frame: 0,
    skin: 0,
    effects: 0,
    flags: RenderFlags::empty(),
    alpha: 255,
    scale: 16,
    colormap: 0,
    glow_size: 0,
    glow_color: 254,
    light: [0; 4],
    light_style: 0,
    light_pflags: 0,
    tag_entity: 0,
    tag_index: 0,
};

impl Default for EntityState {
    fn default() -> Self {
        DEFAULT_STATE
    }
}

impl EntityState {
    /// Default baseline stamped with `number`.
    pub fn cleared(number: EntityNumber) -> Self {
        Self {
            number,
            ..DEFAULT_STATE
        }
    }

    /// Live entity at `origin`, every other field at its default.
    pub fn spawned(number: EntityNumber, origin: Vec3) -> Self {
        Self {
            number,
            active: true,
            origin,
            ..DEFAULT_STATE
        }
    }

    /// True if this entity carries the view-model flag.
    #[inline]
    pub fn is_view_model(&self) -> bool {
        self.flags.contains(RenderFlags::VIEW_MODEL)
    }

    /// True if this entity asked for narrow encodings.
    #[inline]
    pub fn is_low_precision(&self) -> bool {
        self.flags.contains(RenderFlags::LOW_PRECISION)
    }

    /// True if this entity is attached to another one.
    #[inline]
    pub fn is_attached(&self) -> bool {
        self.tag_entity != 0
    }
}
