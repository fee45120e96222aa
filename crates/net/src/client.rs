//! Receiving side: applying entity frames to the client's entity table.

use crate::codec::{decode_update, read_record_header, RecordHeader};
use crate::config::{Precision, SyncConfig};
use crate::error::ProtocolError;
use crate::msg::{MsgReader, SVC_ENTITIES};
use entsync_core::{EntityNumber, EntityState, FrameNumber};
use tracing::{debug, trace};

/// Header and record counts of one applied frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientFrame {
    /// Newest frame the server knew we had when it wrote this one.
    pub reference_frame: FrameNumber,
    /// Number this frame carried. Echo it back as the ack.
    pub frame: FrameNumber,
    /// Update records applied.
    pub updated: usize,
    /// Removal records applied.
    pub removed: usize,
}

/// Client-side entity table.
///
/// Every slot keeps the state before and after the most recent record that
/// touched it, for interpolation.
#[derive(Debug, Clone)]
pub struct ClientEntities {
    precision: Precision,
    current: Vec<EntityState>,
    previous: Vec<EntityState>,
    latest_frame: FrameNumber,
}

impl ClientEntities {
    /// Empty table matching the server's negotiated `config`.
    pub fn new(config: &SyncConfig) -> Self {
        let current: Vec<EntityState> = (0..config.max_entities)
            .map(|number| EntityState::cleared(number as EntityNumber))
            .collect();
        Self {
            precision: config.precision,
            previous: current.clone(),
            current,
            latest_frame: FrameNumber::NONE,
        }
    }

    /// Apply one entity frame read from `msg`, stamping touched entities
    /// with `time`.
    ///
    /// Leaves the cursor just past the terminator so further messages in the
    /// same packet can be read. Any error is fatal for the connection: the
    /// table may hold a partially applied frame.
    pub fn read_frame(
        &mut self,
        msg: &mut MsgReader<'_>,
        time: f64,
    ) -> Result<ClientFrame, ProtocolError> {
        let opcode = msg.read_u8()?;
        if opcode != SVC_ENTITIES {
            return Err(ProtocolError::UnexpectedOpcode(opcode));
        }
        let reference_frame = FrameNumber(msg.read_i32()?);
        let frame = FrameNumber(msg.read_i32()?);
        let max_entities = self.current.len();
        let mut updated = 0;
        let mut removed = 0;

        loop {
            match read_record_header(msg, max_entities)? {
                RecordHeader::Terminator => break,
                RecordHeader::Remove(number) => {
                    let slot = number as usize;
                    self.previous[slot] = self.current[slot];
                    let was_active = self.current[slot].active;
                    self.current[slot] = EntityState {
                        time,
                        ..EntityState::cleared(number)
                    };
                    if was_active {
                        debug!("Entity {} is inactive", number);
                    }
                    trace!("Entity {} removed", number);
                    removed += 1;
                }
                RecordHeader::Update(number) => {
                    let slot = number as usize;
                    self.previous[slot] = self.current[slot];
                    let was_active = self.current[slot].active;
                    let state = &mut self.current[slot];
                    let bits = decode_update(msg, self.precision, state)?;
                    state.number = number;
                    state.active = true;
                    state.time = time;
                    if !was_active {
                        debug!("Entity {} is active", number);
                    }
                    trace!(
                        "Entity {} bits {:?} origin {} flags {:?}",
                        number,
                        bits,
                        state.origin,
                        state.flags.names()
                    );
                    updated += 1;
                }
            }
        }

        self.latest_frame = self.latest_frame.max(frame);
        Ok(ClientFrame {
            reference_frame,
            frame,
            updated,
            removed,
        })
    }

    /// Apply a packet holding exactly one entity frame.
    pub fn read_packet(&mut self, bytes: &[u8], time: f64) -> Result<ClientFrame, ProtocolError> {
        let mut msg = MsgReader::new(bytes);
        let frame = self.read_frame(&mut msg, time)?;
        if !msg.is_exhausted() {
            return Err(ProtocolError::MissingTerminator {
                offset: msg.position(),
            });
        }
        Ok(frame)
    }

    /// Current state of `number`.
    pub fn current(&self, number: EntityNumber) -> Option<&EntityState> {
        self.current.get(number as usize)
    }

    /// State of `number` before the last record that touched it.
    pub fn previous(&self, number: EntityNumber) -> Option<&EntityState> {
        self.previous.get(number as usize)
    }

    /// True if `number` is currently present.
    pub fn is_active(&self, number: EntityNumber) -> bool {
        self.current
            .get(number as usize)
            .map(|state| state.active)
            .unwrap_or(false)
    }

    /// Newest frame received.
    pub fn latest_frame(&self) -> FrameNumber {
        self.latest_frame
    }

    /// Every active entity.
    pub fn active(&self) -> impl Iterator<Item = &EntityState> {
        self.current.iter().filter(|state| state.active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::EntityFrameDatabase;
    use crate::msg::MsgWriter;
    use glam::Vec3;

    fn config() -> SyncConfig {
        SyncConfig {
            max_entities: 32,
            ..SyncConfig::default()
        }
    }

    #[test]
    fn applies_frames_written_by_the_database() {
        let mut db = EntityFrameDatabase::new(config()).unwrap();
        let mut client = ClientEntities::new(&config());
        let mut state = EntityState::spawned(7, Vec3::new(100.0, -20.0, 4.0));
        state.model_index = 300;

        let mut msg = MsgWriter::new();
        db.write_frame(&[state], 0, &mut msg).unwrap();
        let applied = client.read_packet(msg.as_slice(), 0.5).unwrap();
        assert_eq!(applied.frame, FrameNumber(1));
        assert_eq!(applied.updated, 1);
        assert_eq!(client.latest_frame(), FrameNumber(1));

        let received = client.current(7).unwrap();
        assert!(received.active);
        assert_eq!(received.number, 7);
        assert_eq!(received.origin, state.origin);
        assert_eq!(received.model_index, 300);
        assert_eq!(received.time, 0.5);
        assert!(!client.previous(7).unwrap().active);

        db.ack_frame(client.latest_frame(), 0).unwrap();
        msg.clear();
        db.write_frame(&[], 0, &mut msg).unwrap();
        let applied = client.read_packet(msg.as_slice(), 1.0).unwrap();
        assert_eq!(applied.reference_frame, FrameNumber(1));
        assert_eq!(applied.removed, 1);
        assert!(!client.is_active(7));
        assert_eq!(client.previous(7).unwrap().origin, state.origin);
    }

    #[test]
    fn wrong_opcode_is_rejected() {
        let mut client = ClientEntities::new(&config());
        assert_eq!(
            client.read_packet(&[0x01, 0, 0, 0, 0], 0.0),
            Err(ProtocolError::UnexpectedOpcode(0x01))
        );
    }

    #[test]
    fn trailing_bytes_after_terminator_are_rejected() {
        let mut client = ClientEntities::new(&config());
        let mut msg = MsgWriter::new();
        msg.write_u8(SVC_ENTITIES);
        msg.write_i32(0);
        msg.write_i32(1);
        msg.write_u16(crate::msg::FRAME_TERMINATOR);
        msg.write_u8(0xFF);
        assert_eq!(
            client.read_packet(msg.as_slice(), 0.0),
            Err(ProtocolError::MissingTerminator { offset: 11 })
        );
    }

    #[test]
    fn unterminated_frame_is_a_short_read() {
        let mut client = ClientEntities::new(&config());
        let mut msg = MsgWriter::new();
        msg.write_u8(SVC_ENTITIES);
        msg.write_i32(0);
        msg.write_i32(1);
        assert!(matches!(
            client.read_packet(msg.as_slice(), 0.0),
            Err(ProtocolError::ShortRead { .. })
        ));
    }
}
