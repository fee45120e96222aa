//! Field-by-field change detection between two snapshots.

use crate::bits::DeltaBits;
use crate::msg::quantize_angle8;
use entsync_core::EntityState;
use glam::Vec3;

/// Origin axes closer than this are considered unchanged.
pub const ORIGIN_EPSILON: f32 = 1.0 / 256.0;

/// Minimal changed-field mask taking `old` to `new`.
///
/// Floating fields use tolerances so imperceptible noise is not re-sent:
/// origins compare per axis against [`ORIGIN_EPSILON`], angles compare after
/// byte quantization. Integer fields compare exactly. Model, frame and effects
/// report each changed byte range separately so a low-byte change never drags
/// the high byte along.
pub fn delta_bits(old: &EntityState, new: &EntityState) -> DeltaBits {
    if !new.active {
        return if old.active {
            DeltaBits::FULL_UPDATE
        } else {
            DeltaBits::empty()
        };
    }

    let mut bits = DeltaBits::empty();
    if !old.active {
        bits |= DeltaBits::FULL_UPDATE;
    }
    if origin_changed(old.origin, new.origin) {
        bits |= DeltaBits::ORIGIN;
    }
    if angles_changed(old.angles, new.angles) {
        bits |= DeltaBits::ANGLES;
    }

    let model = old.model_index ^ new.model_index;
    if model & 0x00FF != 0 {
        bits |= DeltaBits::MODEL;
    }
    if model & 0xFF00 != 0 {
        bits |= DeltaBits::MODEL16;
    }
    let frame = old.frame ^ new.frame;
    if frame & 0x00FF != 0 {
        bits |= DeltaBits::FRAME;
    }
    if frame & 0xFF00 != 0 {
        bits |= DeltaBits::FRAME16;
    }
    let effects = old.effects ^ new.effects;
    if effects & 0x0000_00FF != 0 {
        bits |= DeltaBits::EFFECTS;
    }
    if effects & 0x0000_FF00 != 0 {
        bits |= DeltaBits::EFFECTS16;
    }
    if effects & 0xFFFF_0000 != 0 {
        bits |= DeltaBits::EFFECTS32;
    }

    if old.skin != new.skin {
        bits |= DeltaBits::SKIN;
    }
    if old.flags != new.flags {
        bits |= DeltaBits::FLAGS;
    }
    if old.alpha != new.alpha {
        bits |= DeltaBits::ALPHA;
    }
    if old.scale != new.scale {
        bits |= DeltaBits::SCALE;
    }
    if old.colormap != new.colormap {
        bits |= DeltaBits::COLORMAP;
    }
    if old.tag_entity != new.tag_entity || old.tag_index != new.tag_index {
        bits |= DeltaBits::ATTACHMENT;
    }
    if old.light != new.light
        || old.light_style != new.light_style
        || old.light_pflags != new.light_pflags
    {
        bits |= DeltaBits::LIGHT;
    }
    if old.glow_size != new.glow_size || old.glow_color != new.glow_color {
        bits |= DeltaBits::GLOW;
    }
    bits
}

fn origin_changed(old: Vec3, new: Vec3) -> bool {
    (new - old).abs().max_element() > ORIGIN_EPSILON
}

fn angles_changed(old: Vec3, new: Vec3) -> bool {
    old.to_array()
        .iter()
        .zip(new.to_array().iter())
        .any(|(&a, &b)| quantize_angle8(a) != quantize_angle8(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use entsync_core::RenderFlags;

    fn live(number: u16) -> EntityState {
        EntityState::spawned(number, Vec3::new(10.0, 20.0, 30.0))
    }

    #[test]
    fn identical_states_produce_nothing() {
        let state = live(1);
        assert!(delta_bits(&state, &state).is_empty());
    }

    #[test]
    fn sub_threshold_origin_noise_is_ignored() {
        let old = live(1);
        let mut new = old;
        new.origin.x += 1.0 / 512.0;
        assert!(delta_bits(&old, &new).is_empty());
        new.origin.z += 0.01;
        assert_eq!(delta_bits(&old, &new), DeltaBits::ORIGIN);
    }

    #[test]
    fn angles_compare_after_quantization() {
        let old = live(1);
        let mut new = old;
        new.angles.y = 0.3;
        assert!(delta_bits(&old, &new).is_empty());
        new.angles.y = 1.0;
        assert_eq!(delta_bits(&old, &new), DeltaBits::ANGLES);
    }

    #[test]
    fn model_bytes_flag_independently() {
        let old = EntityState {
            model_index: 0x0102,
            ..live(1)
        };
        let low = EntityState {
            model_index: 0x0103,
            ..old
        };
        assert_eq!(delta_bits(&old, &low), DeltaBits::MODEL);
        let high = EntityState {
            model_index: 0x0202,
            ..old
        };
        assert_eq!(delta_bits(&old, &high), DeltaBits::MODEL16);
    }

    #[test]
    fn effects_split_into_three_ranges() {
        let old = live(1);
        let new = EntityState {
            effects: 0x0001_0000,
            ..old
        };
        assert_eq!(delta_bits(&old, &new), DeltaBits::EFFECTS32);
        let new = EntityState {
            effects: 0x0000_0101,
            ..old
        };
        assert_eq!(
            delta_bits(&old, &new),
            DeltaBits::EFFECTS | DeltaBits::EFFECTS16
        );
    }

    #[test]
    fn activity_transitions_force_full_update() {
        let dead = EntityState::cleared(1);
        let alive = live(1);
        assert!(delta_bits(&dead, &alive).contains(DeltaBits::FULL_UPDATE | DeltaBits::ORIGIN));
        assert_eq!(delta_bits(&alive, &dead), DeltaBits::FULL_UPDATE);
        assert!(delta_bits(&dead, &dead).is_empty());
    }

    #[test]
    fn grouped_fields_share_a_bit() {
        let old = live(1);
        let new = EntityState {
            flags: RenderFlags::SHADOW,
            light_style: 3,
            glow_color: 7,
            tag_index: 2,
            ..old
        };
        assert_eq!(
            delta_bits(&old, &new),
            DeltaBits::FLAGS | DeltaBits::LIGHT | DeltaBits::GLOW | DeltaBits::ATTACHMENT
        );
    }
}
