//! Little-endian message buffers and the fixed-point forms used on the wire.

use crate::error::ProtocolError;

/// Opcode introducing an entity frame.
pub const SVC_ENTITIES: u8 = 0x39;

/// Set on a record's entity number to mark a removal.
pub const REMOVE_BIT: u16 = 0x8000;

/// Ends the record list (a removal of entity 0, which can never be real).
pub const FRAME_TERMINATOR: u16 = 0x8000;

/// Opcode plus reference and current frame numbers.
pub const FRAME_HEADER_LEN: usize = 1 + 4 + 4;

/// Size of the terminator record.
pub const TERMINATOR_LEN: usize = 2;

/// Compact origins cover `[-COMPACT_COORD_LIMIT, COMPACT_COORD_LIMIT)`.
pub const COMPACT_COORD_LIMIT: f32 = 4096.0;

/// Compact coordinates carry three fractional bits.
const COORD13_SCALE: f32 = 8.0;

/// Fixed-point form of a compact coordinate.
pub fn quantize_coord13(value: f32) -> i16 {
    (value * COORD13_SCALE)
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Byte-scale angle (360/256 degrees per unit).
pub fn quantize_angle8(degrees: f32) -> u8 {
    ((degrees * (256.0 / 360.0)).round() as i32 & 0xFF) as u8
}

/// Short-scale angle (360/65536 degrees per unit).
pub fn quantize_angle16(degrees: f32) -> u16 {
    ((degrees * (65536.0 / 360.0)).round() as i32 & 0xFFFF) as u16
}

/// True if `value` survives the compact coordinate form without clamping.
///
/// Decided on the rounded fixed-point value, so coordinates just below
/// [`COMPACT_COORD_LIMIT`] that round up to it take the float form.
pub fn fits_compact_coord(value: f32) -> bool {
    let fixed = (value * COORD13_SCALE).round();
    (i16::MIN as f32..=i16::MAX as f32).contains(&fixed)
}

/// Growable output buffer.
#[derive(Debug, Default, Clone)]
pub struct MsgWriter {
    data: Vec<u8>,
}

impl MsgWriter {
    /// Empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty writer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Written bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Take the written bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Drop everything written after the first `len` bytes.
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    /// Drop everything written, keeping the allocation.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Append one byte.
    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Append an unsigned short.
    pub fn write_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a signed short.
    pub fn write_i16(&mut self, value: i16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a signed long.
    pub fn write_i32(&mut self, value: i32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Append an unsigned long.
    pub fn write_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a float.
    pub fn write_f32(&mut self, value: f32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a compact 13.3 fixed-point coordinate.
    pub fn write_coord13(&mut self, value: f32) {
        self.write_i16(quantize_coord13(value));
    }

    /// Append a full-precision coordinate.
    pub fn write_coord32(&mut self, value: f32) {
        self.write_f32(value);
    }

    /// Append a byte-scale angle.
    pub fn write_angle8(&mut self, degrees: f32) {
        self.write_u8(quantize_angle8(degrees));
    }

    /// Append a short-scale angle.
    pub fn write_angle16(&mut self, degrees: f32) {
        self.write_u16(quantize_angle16(degrees));
    }
}

/// Cursor over a received packet. Every read is bounds-checked.
#[derive(Debug, Clone)]
pub struct MsgReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> MsgReader<'a> {
    /// Start reading at the beginning of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Cursor position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// True once every byte was consumed.
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let end = self.pos + N;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or(ProtocolError::ShortRead {
                needed: N,
                offset: self.pos,
                len: self.data.len(),
            })?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.pos = end;
        Ok(out)
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take::<1>()?[0])
    }

    /// Read an unsigned short.
    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    /// Read a signed short.
    pub fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        Ok(i16::from_le_bytes(self.take()?))
    }

    /// Read a signed long.
    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    /// Read an unsigned long.
    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    /// Read a float.
    pub fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        Ok(f32::from_le_bytes(self.take()?))
    }

    /// Read a compact 13.3 fixed-point coordinate.
    pub fn read_coord13(&mut self) -> Result<f32, ProtocolError> {
        Ok(self.read_i16()? as f32 / COORD13_SCALE)
    }

    /// Read a full-precision coordinate.
    pub fn read_coord32(&mut self) -> Result<f32, ProtocolError> {
        self.read_f32()
    }

    /// Read a byte-scale angle.
    pub fn read_angle8(&mut self) -> Result<f32, ProtocolError> {
        Ok(self.read_u8()? as f32 * (360.0 / 256.0))
    }

    /// Read a short-scale angle, in `[-180, 180)`.
    pub fn read_angle16(&mut self) -> Result<f32, ProtocolError> {
        Ok(self.read_i16()? as f32 * (360.0 / 65536.0))
    }
}
