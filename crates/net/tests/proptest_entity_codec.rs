//! Property tests for the entity record codec and the frame reader.
//!
//! Generated states stay on the wire's quantization grids (1/8 unit origins
//! in the compact range, byte-step angles) so a decoded state can be compared
//! for exact equality.

use entsync_core::{EntityState, RenderFlags, DEFAULT_STATE};
use entsync_net::codec::{decode_record, encode_update};
use entsync_net::priority::{entity_priority, TOP_PRIORITY};
use entsync_net::{delta_bits, ClientEntities, DeltaBits, MsgWriter, Precision, SyncConfig};
use glam::Vec3;
use proptest::prelude::*;

const MAX_ENTITIES: usize = 1024;

fn compact_axis() -> impl Strategy<Value = f32> {
    (-32768i32..32768).prop_map(|eighths| eighths as f32 / 8.0)
}

fn far_axis() -> impl Strategy<Value = f32> {
    (4096.0f32..1.0e6).prop_map(|v| v.round())
}

fn origin() -> impl Strategy<Value = Vec3> {
    prop_oneof![
        3 => (compact_axis(), compact_axis(), compact_axis())
            .prop_map(|(x, y, z)| Vec3::new(x, y, z)),
        1 => (far_axis(), compact_axis(), compact_axis())
            .prop_map(|(x, y, z)| Vec3::new(x, y, z)),
    ]
}

fn angle() -> impl Strategy<Value = f32> {
    (0i32..128).prop_map(|step| step as f32 * (360.0 / 256.0))
}

fn live_state(number: u16) -> impl Strategy<Value = EntityState> {
    (
        origin(),
        (angle(), angle(), angle()),
        any::<u16>(),
        any::<u16>(),
        any::<u8>(),
        any::<u32>(),
        any::<u8>(),
        (any::<u8>(), any::<u8>(), any::<u8>()),
        (0u16..MAX_ENTITIES as u16, any::<u8>()),
        (any::<[u16; 4]>(), any::<u8>(), any::<u8>()),
        (any::<u8>(), any::<u8>()),
    )
        .prop_map(
            move |(
                origin,
                (pitch, yaw, roll),
                model_index,
                frame,
                skin,
                effects,
                flags,
                (alpha, scale, colormap),
                (tag_entity, tag_index),
                (light, light_style, light_pflags),
                (glow_size, glow_color),
            )| EntityState {
                number,
                active: true,
                time: 0.0,
                origin,
                angles: Vec3::new(pitch, yaw, roll),
                model_index,
                frame,
                skin,
                effects,
                flags: RenderFlags::from_bits_retain(flags),
                alpha,
                scale,
                colormap,
                glow_size,
                glow_color,
                light,
                light_style,
                light_pflags,
                tag_entity,
                tag_index,
            },
        )
}

fn state_pair() -> impl Strategy<Value = (EntityState, EntityState)> {
    (1u16..MAX_ENTITIES as u16).prop_flat_map(|number| (live_state(number), live_state(number)))
}

fn round_trip(baseline: &EntityState, target: &EntityState, changed: DeltaBits) -> EntityState {
    let mut msg = MsgWriter::new();
    encode_update(target.number, target, changed, Precision::Standard, &mut msg);
    decode_record(msg.as_slice(), Precision::Standard, MAX_ENTITIES, baseline)
        .expect("record decodes")
        .expect("record is not a terminator")
        .state
}

proptest! {
    /// Decoding a delta on top of its baseline reproduces the target.
    #[test]
    fn delta_round_trips((baseline, target) in state_pair()) {
        let decoded = round_trip(&baseline, &target, delta_bits(&baseline, &target));
        prop_assert_eq!(decoded, target);
    }

    /// Fields outside the mask keep the baseline's value.
    #[test]
    fn unflagged_fields_keep_baseline((baseline, target) in state_pair()) {
        let decoded = round_trip(&baseline, &target, DeltaBits::SKIN);
        prop_assert_eq!(decoded.skin, target.skin);
        prop_assert_eq!(decoded.origin, baseline.origin);
        prop_assert_eq!(decoded.model_index, baseline.model_index);
        prop_assert_eq!(decoded.light, baseline.light);
    }

    /// A full update decodes against any baseline.
    #[test]
    fn full_update_ignores_baseline((baseline, target) in state_pair()) {
        let spawn_baseline = EntityState { active: true, ..DEFAULT_STATE };
        let bits = DeltaBits::FULL_UPDATE | delta_bits(&spawn_baseline, &target);
        let decoded = round_trip(&baseline, &target, bits);
        prop_assert_eq!(decoded, target);
    }

    /// Arbitrary bytes never panic the record decoder.
    #[test]
    fn arbitrary_record_bytes_dont_panic(
        bytes in prop::collection::vec(any::<u8>(), 0..256),
        low in any::<bool>(),
    ) {
        let precision = if low { Precision::Low } else { Precision::Standard };
        let _ = decode_record(&bytes, precision, MAX_ENTITIES, &DEFAULT_STATE);
    }

    /// Arbitrary packets never panic the client, even with a valid header.
    #[test]
    fn arbitrary_frames_dont_panic(
        body in prop::collection::vec(any::<u8>(), 0..512),
        with_header in any::<bool>(),
    ) {
        let config = SyncConfig { max_entities: MAX_ENTITIES, ..SyncConfig::default() };
        let mut client = ClientEntities::new(&config);
        let mut packet = Vec::new();
        if with_header {
            packet.push(entsync_net::msg::SVC_ENTITIES);
            packet.extend_from_slice(&0i32.to_le_bytes());
            packet.extend_from_slice(&1i32.to_le_bytes());
        }
        packet.extend_from_slice(&body);
        let _ = client.read_packet(&packet, 0.0);
    }

    /// Anything attached to the viewer, or sitting on it, is top priority.
    #[test]
    fn attached_or_coincident_is_top_priority(
        view_origin in origin(),
        offset in origin(),
        age in 0i32..1000,
        coincident in any::<bool>(),
    ) {
        let view = EntityState::spawned(1, view_origin);
        let candidate = if coincident {
            EntityState::spawned(2, view_origin)
        } else {
            EntityState { tag_entity: 1, ..EntityState::spawned(2, view_origin + offset) }
        };
        let states = [view, candidate];
        let priority = entity_priority(
            &view,
            &candidate,
            DeltaBits::ORIGIN,
            age,
            |number| states.iter().find(|s| s.number == number),
        );
        prop_assert_eq!(priority, TOP_PRIORITY);
    }
}
