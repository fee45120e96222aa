//! Delta bitmask describing which fields a record carries.
//!
//! The mask is written as one to four bytes. Bit 7 of each byte says another
//! byte follows, so a record touching only the first seven fields costs one
//! byte of overhead.

bitflags::bitflags! {
    /// Changed-field mask of one entity record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeltaBits: u32 {
        /// Rebuild from the default baseline before applying the fields.
        const FULL_UPDATE = 1 << 0;
        /// Position.
        const ORIGIN = 1 << 1;
        /// Orientation.
        const ANGLES = 1 << 2;
        /// Low byte of the model index.
        const MODEL = 1 << 3;
        /// Low byte of the animation frame.
        const FRAME = 1 << 4;
        /// Skin.
        const SKIN = 1 << 5;
        /// Low byte of the effects.
        const EFFECTS = 1 << 6;
        /// A second mask byte follows.
        const EXTEND1 = 1 << 7;
        /// Render flags.
        const FLAGS = 1 << 8;
        /// Opacity.
        const ALPHA = 1 << 9;
        /// Scale.
        const SCALE = 1 << 10;
        /// Origin written as three floats instead of the compact form.
        const ORIGIN32 = 1 << 11;
        /// Angles written as shorts instead of bytes.
        const ANGLES16 = 1 << 12;
        /// High byte of the model index; the full short is written.
        const MODEL16 = 1 << 13;
        /// Colormap.
        const COLORMAP = 1 << 14;
        /// A third mask byte follows.
        const EXTEND2 = 1 << 15;
        /// Tag entity and tag index.
        const ATTACHMENT = 1 << 16;
        /// Light colour, radius, style and pflags.
        const LIGHT = 1 << 17;
        /// Glow size and colour.
        const GLOW = 1 << 18;
        /// Second byte of the effects; the low short is written.
        const EFFECTS16 = 1 << 19;
        /// Upper half of the effects; the full long is written.
        const EFFECTS32 = 1 << 20;
        /// High byte of the animation frame; the full short is written.
        const FRAME16 = 1 << 21;
        /// A fourth mask byte follows.
        const EXTEND3 = 1 << 23;
    }
}

impl DeltaBits {
    /// Bits that only describe the mask encoding itself.
    pub const EXTENDS: Self = Self::EXTEND1.union(Self::EXTEND2).union(Self::EXTEND3);

    /// Width bits chosen by the writer rather than by the change detector.
    pub const WRITE_WIDTHS: Self = Self::ORIGIN32.union(Self::ANGLES16);

    /// Any bit that makes the model field present.
    pub const ANY_MODEL: Self = Self::MODEL.union(Self::MODEL16);

    /// Any bit that makes the frame field present.
    pub const ANY_FRAME: Self = Self::FRAME.union(Self::FRAME16);

    /// Any bit that makes the effects field present.
    pub const ANY_EFFECTS: Self = Self::EFFECTS
        .union(Self::EFFECTS16)
        .union(Self::EFFECTS32);

    /// Strip encoding-only bits, leaving what the change detector tracks.
    pub fn changes(self) -> Self {
        self.difference(Self::EXTENDS | Self::WRITE_WIDTHS)
    }

    /// Set the extension bits needed to carry every set bit.
    pub fn with_extends(self) -> Self {
        let mut bits = self.difference(Self::EXTENDS);
        if bits.bits() >= 1 << 24 {
            bits |= Self::EXTEND3;
        }
        if bits.bits() >= 1 << 16 {
            bits |= Self::EXTEND2;
        }
        if bits.bits() >= 1 << 8 {
            bits |= Self::EXTEND1;
        }
        bits
    }

    /// Bytes the mask occupies on the wire, once extension bits are set.
    pub fn encoded_len(self) -> usize {
        let bits = self.with_extends();
        1 + [Self::EXTEND1, Self::EXTEND2, Self::EXTEND3]
            .iter()
            .filter(|&&extend| bits.contains(extend))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_byte_needs_no_extension() {
        let bits = (DeltaBits::ORIGIN | DeltaBits::ANGLES).with_extends();
        assert!(!bits.intersects(DeltaBits::EXTENDS));
        assert_eq!(bits.encoded_len(), 1);
    }

    #[test]
    fn extensions_chain_through_each_byte() {
        let bits = DeltaBits::GLOW.with_extends();
        assert!(bits.contains(DeltaBits::EXTEND1 | DeltaBits::EXTEND2));
        assert!(!bits.contains(DeltaBits::EXTEND3));
        assert_eq!(bits.encoded_len(), 3);

        let bits = DeltaBits::ALPHA.with_extends();
        assert_eq!(bits.encoded_len(), 2);
    }

    #[test]
    fn changes_strip_encoding_bits() {
        let bits = DeltaBits::ORIGIN | DeltaBits::ORIGIN32 | DeltaBits::EXTEND1 | DeltaBits::MODEL16;
        assert_eq!(bits.changes(), DeltaBits::ORIGIN | DeltaBits::MODEL16);
    }
}
