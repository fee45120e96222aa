//! Relevance scoring and priority buckets.
//!
//! Distance from the viewer dominates, but every frame an entity waits with
//! pending changes adds one level, so nothing with pending bits waits forever.
//! Entities glued to the camera (the viewer itself, view models, anything
//! attached to either, anything sitting exactly on the viewer) always score
//! the top level.

use crate::bits::DeltaBits;
use entsync_core::{EntityNumber, EntityState};
use tracing::warn;

/// Number of discrete priority levels.
pub const PRIORITY_LEVELS: usize = 32;

/// Highest level, reserved for entities that must never lag.
pub const TOP_PRIORITY: u8 = (PRIORITY_LEVELS - 1) as u8;

/// Longest attachment chain followed before giving up.
pub const MAX_ATTACHMENT_DEPTH: usize = 256;

/// One level is lost per this many units of distance.
const DISTANCE_PER_LEVEL: f32 = 16384.0 / PRIORITY_LEVELS as f32;

/// Penalty for entities that asked for low precision.
const LOW_PRECISION_PENALTY: i32 = (PRIORITY_LEVELS / 4) as i32;

/// Outcome of following an entity's attachment chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChainResolution {
    /// Some link is the viewer, a view model, or sits on the viewer.
    Viewer,
    /// The chain did not end within [`MAX_ATTACHMENT_DEPTH`] links.
    SelfReferential {
        /// Distance from the viewer to the last link visited.
        distance: f32,
        /// Some visited link carried the low-precision flag.
        low_precision: bool,
    },
    /// The chain ended at an unattached root.
    Resolved {
        /// Distance from the viewer to the root.
        distance: f32,
        /// Some link carried the low-precision flag.
        low_precision: bool,
    },
}

/// Follow `candidate`'s tag links through `lookup` and classify it.
///
/// A tag naming a slot `lookup` cannot resolve ends the chain at the current
/// link.
pub fn resolve_attachment<'a, F>(
    view: &EntityState,
    candidate: &'a EntityState,
    lookup: F,
) -> ChainResolution
where
    F: Fn(EntityNumber) -> Option<&'a EntityState>,
{
    let mut link = candidate;
    let mut low_precision = false;
    for _ in 0..MAX_ATTACHMENT_DEPTH {
        if view.number != 0 && link.number == view.number {
            return ChainResolution::Viewer;
        }
        if link.is_view_model() {
            return ChainResolution::Viewer;
        }
        low_precision |= link.is_low_precision();
        if !link.is_attached() {
            if link.origin == view.origin {
                return ChainResolution::Viewer;
            }
            return ChainResolution::Resolved {
                distance: view.origin.distance(link.origin),
                low_precision,
            };
        }
        match lookup(link.tag_entity) {
            Some(next) => link = next,
            None => {
                return ChainResolution::Resolved {
                    distance: view.origin.distance(link.origin),
                    low_precision,
                }
            }
        }
    }
    warn!(
        entity = candidate.number,
        depth = MAX_ATTACHMENT_DEPTH,
        "runaway loop following tag entity links"
    );
    ChainResolution::SelfReferential {
        distance: view.origin.distance(link.origin),
        low_precision,
    }
}

/// Priority level of `candidate` in `[0, PRIORITY_LEVELS)`.
///
/// 0 means nothing to send. `age` is frames since the entity last went out.
pub fn entity_priority<'a, F>(
    view: &EntityState,
    candidate: &'a EntityState,
    changed: DeltaBits,
    age: i32,
    lookup: F,
) -> u8
where
    F: Fn(EntityNumber) -> Option<&'a EntityState>,
{
    if changed.is_empty() {
        return 0;
    }
    if !candidate.active || changed.contains(DeltaBits::FULL_UPDATE) {
        return TOP_PRIORITY;
    }
    let (distance, low_precision) = match resolve_attachment(view, candidate, lookup) {
        ChainResolution::Viewer => return TOP_PRIORITY,
        ChainResolution::SelfReferential {
            distance,
            low_precision,
        }
        | ChainResolution::Resolved {
            distance,
            low_precision,
        } => (distance, low_precision),
    };
    let mut priority = (PRIORITY_LEVELS as i32 / 2)
        .saturating_add(age)
        .saturating_sub((distance / DISTANCE_PER_LEVEL) as i32);
    if low_precision {
        priority = priority.saturating_sub(LOW_PRECISION_PENALTY);
    }
    priority.clamp(1, TOP_PRIORITY as i32) as u8
}

/// Entity numbers grouped by priority level.
///
/// Owned by the connection and reused every frame.
#[derive(Debug, Clone)]
pub struct PriorityBuckets {
    levels: Vec<Vec<EntityNumber>>,
}

impl Default for PriorityBuckets {
    fn default() -> Self {
        Self {
            levels: vec![Vec::new(); PRIORITY_LEVELS],
        }
    }
}

impl PriorityBuckets {
    /// Empty buckets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty every bucket, keeping allocations.
    pub fn clear(&mut self) {
        for level in &mut self.levels {
            level.clear();
        }
    }

    /// Queue `number` at `priority`. Level 0 is never drained and is ignored.
    pub fn push(&mut self, priority: u8, number: EntityNumber) {
        if priority == 0 {
            return;
        }
        let level = (priority as usize).min(PRIORITY_LEVELS - 1);
        self.levels[level].push(number);
    }

    /// Queued entities across all levels.
    pub fn len(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(Vec::is_empty)
    }

    /// Entities at one level, in insertion order.
    pub fn level(&self, priority: u8) -> &[EntityNumber] {
        self.levels
            .get(priority as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Highest level first, insertion order within a level.
    pub fn drain_order(&self) -> impl Iterator<Item = EntityNumber> + '_ {
        self.levels[1..]
            .iter()
            .rev()
            .flat_map(|level| level.iter().copied())
    }
}
