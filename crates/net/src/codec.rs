//! Bit-exact encoding of one entity record.
//!
//! Fields live in a single table iterated in wire order. Each entry names the
//! bits that make it present, how the writer picks a wider form, and how the
//! field is written and read. Encoder and decoder walk the same table, so they
//! cannot disagree about order.

use crate::bits::DeltaBits;
use crate::config::Precision;
use crate::error::ProtocolError;
use crate::msg::{fits_compact_coord, MsgReader, MsgWriter, FRAME_TERMINATOR, REMOVE_BIT};
use entsync_core::{EntityNumber, EntityState, RenderFlags, DEFAULT_STATE};
use glam::Vec3;
use tracing::debug;

/// Fields of an entity record, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Render flags. Written first since they decide other widths.
    Flags,
    /// Position.
    Origin,
    /// Orientation.
    Angles,
    /// Model index.
    Model,
    /// Animation frame.
    Frame,
    /// Skin.
    Skin,
    /// Effects.
    Effects,
    /// Opacity.
    Alpha,
    /// Scale.
    Scale,
    /// Colormap.
    Colormap,
    /// Tag entity and index.
    Attachment,
    /// Light colour, radius, style and pflags.
    Light,
    /// Glow size and colour.
    Glow,
}

impl Field {
    /// Copy this field from `src` into `dst`.
    pub fn copy(self, dst: &mut EntityState, src: &EntityState) {
        match self {
            Field::Flags => dst.flags = src.flags,
            Field::Origin => dst.origin = src.origin,
            Field::Angles => dst.angles = src.angles,
            Field::Model => dst.model_index = src.model_index,
            Field::Frame => dst.frame = src.frame,
            Field::Skin => dst.skin = src.skin,
            Field::Effects => dst.effects = src.effects,
            Field::Alpha => dst.alpha = src.alpha,
            Field::Scale => dst.scale = src.scale,
            Field::Colormap => dst.colormap = src.colormap,
            Field::Attachment => {
                dst.tag_entity = src.tag_entity;
                dst.tag_index = src.tag_index;
            }
            Field::Light => {
                dst.light = src.light;
                dst.light_style = src.light_style;
                dst.light_pflags = src.light_pflags;
            }
            Field::Glow => {
                dst.glow_size = src.glow_size;
                dst.glow_color = src.glow_color;
            }
        }
    }
}

type WidenFn = fn(&EntityState, DeltaBits, Precision) -> DeltaBits;
type WriteFn = fn(&EntityState, DeltaBits, &mut MsgWriter);
type ReadFn = fn(&mut EntityState, DeltaBits, &mut MsgReader<'_>) -> Result<(), ProtocolError>;

/// One row of the field table.
pub struct FieldCodec {
    /// Which field this row encodes.
    pub field: Field,
    /// The field is present if any of these bits is set.
    pub presence: DeltaBits,
    widen: WidenFn,
    write: WriteFn,
    read: ReadFn,
}

impl FieldCodec {
    /// True if `bits` make this field present.
    pub fn is_present(&self, bits: DeltaBits) -> bool {
        bits.intersects(self.presence)
    }
}

/// Every field, in the order it appears on the wire.
pub static FIELD_TABLE: [FieldCodec; 13] = [
    FieldCodec {
        field: Field::Flags,
        presence: DeltaBits::FLAGS,
        widen: narrow,
        write: |s, _, msg| msg.write_u8(s.flags.bits()),
        read: |s, _, msg| {
            s.flags = RenderFlags::from_bits_retain(msg.read_u8()?);
            Ok(())
        },
    },
    FieldCodec {
        field: Field::Origin,
        presence: DeltaBits::ORIGIN,
        widen: widen_origin,
        write: write_origin,
        read: read_origin,
    },
    FieldCodec {
        field: Field::Angles,
        presence: DeltaBits::ANGLES,
        widen: widen_angles,
        write: write_angles,
        read: read_angles,
    },
    FieldCodec {
        field: Field::Model,
        presence: DeltaBits::ANY_MODEL,
        widen: narrow,
        write: |s, bits, msg| write_split_u16(s.model_index, bits.contains(DeltaBits::MODEL16), msg),
        read: |s, bits, msg| {
            s.model_index = read_split_u16(s.model_index, bits.contains(DeltaBits::MODEL16), msg)?;
            Ok(())
        },
    },
    FieldCodec {
        field: Field::Frame,
        presence: DeltaBits::ANY_FRAME,
        widen: narrow,
        write: |s, bits, msg| write_split_u16(s.frame, bits.contains(DeltaBits::FRAME16), msg),
        read: |s, bits, msg| {
            s.frame = read_split_u16(s.frame, bits.contains(DeltaBits::FRAME16), msg)?;
            Ok(())
        },
    },
    FieldCodec {
        field: Field::Skin,
        presence: DeltaBits::SKIN,
        widen: narrow,
        write: |s, _, msg| msg.write_u8(s.skin),
        read: |s, _, msg| {
            s.skin = msg.read_u8()?;
            Ok(())
        },
    },
    FieldCodec {
        field: Field::Effects,
        presence: DeltaBits::ANY_EFFECTS,
        widen: narrow,
        write: write_effects,
        read: read_effects,
    },
    FieldCodec {
        field: Field::Alpha,
        presence: DeltaBits::ALPHA,
        widen: narrow,
        write: |s, _, msg| msg.write_u8(s.alpha),
        read: |s, _, msg| {
            s.alpha = msg.read_u8()?;
            Ok(())
        },
    },
    FieldCodec {
        field: Field::Scale,
        presence: DeltaBits::SCALE,
        widen: narrow,
        write: |s, _, msg| msg.write_u8(s.scale),
        read: |s, _, msg| {
            s.scale = msg.read_u8()?;
            Ok(())
        },
    },
    FieldCodec {
        field: Field::Colormap,
        presence: DeltaBits::COLORMAP,
        widen: narrow,
        write: |s, _, msg| msg.write_u8(s.colormap),
        read: |s, _, msg| {
            s.colormap = msg.read_u8()?;
            Ok(())
        },
    },
    FieldCodec {
        field: Field::Attachment,
        presence: DeltaBits::ATTACHMENT,
        widen: narrow,
        write: |s, _, msg| {
            msg.write_u16(s.tag_entity);
            msg.write_u8(s.tag_index);
        },
        read: |s, _, msg| {
            s.tag_entity = msg.read_u16()?;
            s.tag_index = msg.read_u8()?;
            Ok(())
        },
    },
    FieldCodec {
        field: Field::Light,
        presence: DeltaBits::LIGHT,
        widen: narrow,
        write: |s, _, msg| {
            for component in s.light {
                msg.write_u16(component);
            }
            msg.write_u8(s.light_style);
            msg.write_u8(s.light_pflags);
        },
        read: |s, _, msg| {
            for component in s.light.iter_mut() {
                *component = msg.read_u16()?;
            }
            s.light_style = msg.read_u8()?;
            s.light_pflags = msg.read_u8()?;
            Ok(())
        },
    },
    FieldCodec {
        field: Field::Glow,
        presence: DeltaBits::GLOW,
        widen: narrow,
        write: |s, _, msg| {
            msg.write_u8(s.glow_size);
            msg.write_u8(s.glow_color);
        },
        read: |s, _, msg| {
            s.glow_size = msg.read_u8()?;
            s.glow_color = msg.read_u8()?;
            Ok(())
        },
    },
];

fn narrow(_: &EntityState, _: DeltaBits, _: Precision) -> DeltaBits {
    DeltaBits::empty()
}

fn widen_origin(state: &EntityState, _: DeltaBits, precision: Precision) -> DeltaBits {
    let compact = state.origin.to_array().into_iter().all(fits_compact_coord);
    if compact {
        DeltaBits::empty()
    } else if precision.allows_float_origin() {
        DeltaBits::ORIGIN32
    } else {
        debug!(
            "Entity {} origin {:?} outside compact range at low precision, clamping",
            state.number, state.origin
        );
        DeltaBits::empty()
    }
}

fn widen_angles(state: &EntityState, _: DeltaBits, precision: Precision) -> DeltaBits {
    if precision.allows_wide_angles() && !state.is_low_precision() {
        DeltaBits::ANGLES16
    } else {
        DeltaBits::empty()
    }
}

fn write_origin(state: &EntityState, bits: DeltaBits, msg: &mut MsgWriter) {
    for axis in state.origin.to_array() {
        if bits.contains(DeltaBits::ORIGIN32) {
            msg.write_coord32(axis);
        } else {
            msg.write_coord13(axis);
        }
    }
}

fn read_origin(
    state: &mut EntityState,
    bits: DeltaBits,
    msg: &mut MsgReader<'_>,
) -> Result<(), ProtocolError> {
    let mut origin = [0.0f32; 3];
    for axis in origin.iter_mut() {
        *axis = if bits.contains(DeltaBits::ORIGIN32) {
            msg.read_coord32()?
        } else {
            msg.read_coord13()?
        };
    }
    state.origin = Vec3::from_array(origin);
    Ok(())
}

fn write_angles(state: &EntityState, bits: DeltaBits, msg: &mut MsgWriter) {
    for angle in state.angles.to_array() {
        if bits.contains(DeltaBits::ANGLES16) {
            msg.write_angle16(angle);
        } else {
            msg.write_angle8(angle);
        }
    }
}

fn read_angles(
    state: &mut EntityState,
    bits: DeltaBits,
    msg: &mut MsgReader<'_>,
) -> Result<(), ProtocolError> {
    let mut angles = [0.0f32; 3];
    for angle in angles.iter_mut() {
        *angle = if bits.contains(DeltaBits::ANGLES16) {
            msg.read_angle16()?
        } else {
            msg.read_angle8()?
        };
    }
    state.angles = Vec3::from_array(angles);
    Ok(())
}

/// Narrow form replaces only the low byte of the receiver's value.
fn write_split_u16(value: u16, wide: bool, msg: &mut MsgWriter) {
    if wide {
        msg.write_u16(value);
    } else {
        msg.write_u8((value & 0xFF) as u8);
    }
}

fn read_split_u16(current: u16, wide: bool, msg: &mut MsgReader<'_>) -> Result<u16, ProtocolError> {
    if wide {
        msg.read_u16()
    } else {
        Ok((current & 0xFF00) | msg.read_u8()? as u16)
    }
}

fn write_effects(state: &EntityState, bits: DeltaBits, msg: &mut MsgWriter) {
    if bits.contains(DeltaBits::EFFECTS32) {
        msg.write_u32(state.effects);
    } else if bits.contains(DeltaBits::EFFECTS16) {
        msg.write_u16((state.effects & 0xFFFF) as u16);
    } else {
        msg.write_u8((state.effects & 0xFF) as u8);
    }
}

fn read_effects(
    state: &mut EntityState,
    bits: DeltaBits,
    msg: &mut MsgReader<'_>,
) -> Result<(), ProtocolError> {
    state.effects = if bits.contains(DeltaBits::EFFECTS32) {
        msg.read_u32()?
    } else if bits.contains(DeltaBits::EFFECTS16) {
        (state.effects & 0xFFFF_0000) | msg.read_u16()? as u32
    } else {
        (state.effects & 0xFFFF_FF00) | msg.read_u8()? as u32
    };
    Ok(())
}

/// Write the mask bytes, honouring the extension chain.
pub fn write_delta_bits(bits: DeltaBits, msg: &mut MsgWriter) {
    let bits = bits.with_extends();
    let raw = bits.bits();
    msg.write_u8((raw & 0xFF) as u8);
    if bits.contains(DeltaBits::EXTEND1) {
        msg.write_u8(((raw >> 8) & 0xFF) as u8);
        if bits.contains(DeltaBits::EXTEND2) {
            msg.write_u8(((raw >> 16) & 0xFF) as u8);
            if bits.contains(DeltaBits::EXTEND3) {
                msg.write_u8(((raw >> 24) & 0xFF) as u8);
            }
        }
    }
}

/// Read the mask bytes, following the extension chain.
pub fn read_delta_bits(msg: &mut MsgReader<'_>) -> Result<DeltaBits, ProtocolError> {
    let mut raw = msg.read_u8()? as u32;
    if raw & DeltaBits::EXTEND1.bits() != 0 {
        raw |= (msg.read_u8()? as u32) << 8;
        if raw & DeltaBits::EXTEND2.bits() != 0 {
            raw |= (msg.read_u8()? as u32) << 16;
            if raw & DeltaBits::EXTEND3.bits() != 0 {
                raw |= (msg.read_u8()? as u32) << 24;
            }
        }
    }
    Ok(DeltaBits::from_bits_retain(raw))
}

/// Final bitmask the writer will put on the wire for `changed`.
///
/// Adds the writer-chosen widths and normalises split fields so any width bit
/// also marks the field present.
pub fn wire_bits(state: &EntityState, changed: DeltaBits, precision: Precision) -> DeltaBits {
    let mut bits = changed.changes();
    for codec in FIELD_TABLE.iter() {
        if codec.is_present(bits) {
            bits |= (codec.widen)(state, bits, precision);
        }
    }
    bits.with_extends()
}

/// Encode one entity record.
///
/// An inactive state is written as a bare removal (`number | REMOVE_BIT`).
/// Returns the mask actually written, empty for a removal.
pub fn encode_update(
    number: EntityNumber,
    state: &EntityState,
    changed: DeltaBits,
    precision: Precision,
    msg: &mut MsgWriter,
) -> DeltaBits {
    if !state.active {
        msg.write_u16(number | REMOVE_BIT);
        return DeltaBits::empty();
    }
    let bits = wire_bits(state, changed, precision);
    msg.write_u16(number);
    write_delta_bits(bits, msg);
    for codec in FIELD_TABLE.iter() {
        if codec.is_present(bits) {
            (codec.write)(state, bits, msg);
        }
    }
    bits
}

/// Apply one record's mask and fields onto `state`.
///
/// A `FULL_UPDATE` mask first resets `state` to the default baseline (marked
/// active). The caller owns `state.number` and must restore it afterwards.
pub fn decode_update(
    msg: &mut MsgReader<'_>,
    precision: Precision,
    state: &mut EntityState,
) -> Result<DeltaBits, ProtocolError> {
    let bits = read_delta_bits(msg)?;
    if precision == Precision::Low && bits.intersects(DeltaBits::WRITE_WIDTHS) {
        return Err(ProtocolError::PrecisionViolation { bits: bits.bits() });
    }
    if bits.contains(DeltaBits::FULL_UPDATE) {
        *state = DEFAULT_STATE;
        state.active = true;
    }
    for codec in FIELD_TABLE.iter() {
        if codec.is_present(bits) {
            (codec.read)(state, bits, msg)?;
        }
    }
    Ok(bits)
}

/// Copy every field `bits` marks present from `src` into `dst`.
///
/// A `FULL_UPDATE` or an inactive `src` replaces `dst` wholesale.
pub fn merge_fields(dst: &mut EntityState, src: &EntityState, bits: DeltaBits) {
    if !src.active || bits.contains(DeltaBits::FULL_UPDATE) {
        *dst = *src;
        return;
    }
    for codec in FIELD_TABLE.iter() {
        if codec.is_present(bits) {
            codec.field.copy(dst, src);
        }
    }
    dst.active = true;
}

/// Leading short of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordHeader {
    /// End of the record list.
    Terminator,
    /// The entity left the view; no payload follows.
    Remove(EntityNumber),
    /// A mask and fields follow.
    Update(EntityNumber),
}

/// Read and validate a record's entity number.
pub fn read_record_header(
    msg: &mut MsgReader<'_>,
    max_entities: usize,
) -> Result<RecordHeader, ProtocolError> {
    let raw = msg.read_u16()?;
    if raw == FRAME_TERMINATOR {
        return Ok(RecordHeader::Terminator);
    }
    let number = raw & !REMOVE_BIT;
    if number == 0 || number as usize >= max_entities {
        return Err(ProtocolError::EntityOutOfRange {
            number: number as u32,
            max: max_entities,
        });
    }
    if raw & REMOVE_BIT != 0 {
        Ok(RecordHeader::Remove(number))
    } else {
        Ok(RecordHeader::Update(number))
    }
}

/// A record decoded on its own against a caller-supplied baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    /// Entity the record is for.
    pub number: EntityNumber,
    /// Mask read from the wire, empty for a removal.
    pub bits: DeltaBits,
    /// Baseline with the record applied.
    pub state: EntityState,
}

/// Decode a single record from `bytes` on top of `baseline`.
///
/// Returns `None` for the terminator.
pub fn decode_record(
    bytes: &[u8],
    precision: Precision,
    max_entities: usize,
    baseline: &EntityState,
) -> Result<Option<DecodedRecord>, ProtocolError> {
    let mut msg = MsgReader::new(bytes);
    let (number, bits, mut state) = match read_record_header(&mut msg, max_entities)? {
        RecordHeader::Terminator => return Ok(None),
        RecordHeader::Remove(number) => (number, DeltaBits::empty(), DEFAULT_STATE),
        RecordHeader::Update(number) => {
            let mut state = *baseline;
            let bits = decode_update(&mut msg, precision, &mut state)?;
            (number, bits, state)
        }
    };
    state.number = number;
    Ok(Some(DecodedRecord {
        number,
        bits,
        state,
    }))
}
