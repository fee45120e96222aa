use entsync_core::{EntityNumber, FrameNumber};
use thiserror::Error;

/// The byte stream and the local decode state disagree.
///
/// Every variant is fatal: the connection must be dropped or reset, never
/// resumed in place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A read ran past the end of the packet.
    #[error("read of {needed} bytes at offset {offset} overruns {len}-byte packet")]
    ShortRead {
        /// Bytes the read wanted.
        needed: usize,
        /// Cursor position at the time of the read.
        offset: usize,
        /// Total packet length.
        len: usize,
    },
    /// A record named entity 0 or a number beyond the negotiated maximum.
    #[error("entity number {number} outside 1..{max}")]
    EntityOutOfRange {
        /// Number read from the wire.
        number: u32,
        /// Negotiated entity capacity.
        max: usize,
    },
    /// The packet did not start with the entity frame opcode.
    #[error("unexpected opcode {0:#04x}")]
    UnexpectedOpcode(u8),
    /// A width bit the negotiated precision does not allow.
    #[error("delta bits {bits:#010x} use a width not permitted at low precision")]
    PrecisionViolation {
        /// Offending bitmask.
        bits: u32,
    },
    /// Bytes remained after the terminator, or the terminator never came.
    #[error("entity frame not terminated cleanly at offset {offset}")]
    MissingTerminator {
        /// Cursor position where the stream went wrong.
        offset: usize,
    },
}

/// Errors raised by the server-side database.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// Fatal wire-level failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Configuration rejected by [`crate::SyncConfig::validate`].
    #[error("invalid sync config: {0}")]
    InvalidConfig(String),
    /// The simulation handed in a state whose number the database cannot hold.
    #[error("entity number {number} outside 1..{max}")]
    EntityOutOfRange {
        /// Offending number.
        number: EntityNumber,
        /// Database capacity.
        max: usize,
    },
    /// The same entity number appeared twice in one snapshot list.
    #[error("entity {0} appears more than once in the frame snapshot")]
    DuplicateEntity(EntityNumber),
    /// The peer acknowledged a frame that was never written.
    #[error("ack for frame {acked:?} but latest written frame is {latest:?}")]
    AckFromFuture {
        /// Frame number the peer claimed.
        acked: FrameNumber,
        /// Newest frame actually written.
        latest: FrameNumber,
    },
}
