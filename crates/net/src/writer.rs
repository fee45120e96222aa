//! Building one outgoing entity frame.
//!
//! Each call folds the simulation's snapshot into the database, scores every
//! entity with pending changes, then drains the priority buckets from the top
//! until the packet or the per-commit entry cap is full. Entities that do not
//! fit keep their pending bits and age into a higher bucket next frame.

use crate::bits::DeltaBits;
use crate::codec::encode_update;
use crate::database::{Commit, CommitEntry, EntityFrameDatabase};
use crate::delta::delta_bits;
use crate::error::SyncError;
use crate::msg::{MsgWriter, FRAME_HEADER_LEN, FRAME_TERMINATOR, SVC_ENTITIES, TERMINATOR_LEN};
use crate::priority::entity_priority;
use entsync_core::{EntityNumber, EntityState, FrameNumber, DEFAULT_STATE};
use tracing::{debug, trace};

/// What [`EntityFrameDatabase::write_frame`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame went into the message.
    Written {
        /// Number the frame carried.
        frame: FrameNumber,
        /// Entity records written.
        entities: usize,
        /// Bytes appended, header and terminator included.
        bytes: usize,
        /// Entities with pending bits left for a later frame.
        deferred: usize,
    },
    /// Nothing was pending. No bytes written, no frame number consumed.
    Idle,
    /// The packet log is at capacity. No bytes written.
    PacketLogFull,
    /// The message had no room for a useful frame. No bytes written.
    NoRoom,
}

impl FrameOutcome {
    /// Bytes appended to the message.
    pub fn bytes(&self) -> usize {
        match self {
            FrameOutcome::Written { bytes, .. } => *bytes,
            _ => 0,
        }
    }
}

impl EntityFrameDatabase {
    /// Observe `states` and append one entity frame to `msg`.
    ///
    /// `states` lists every entity the peer should see this frame; slots that
    /// were visible last frame and are missing now are removed. Listed states
    /// with `active == false` count as missing. `msg` may already hold other
    /// data; the frame never grows it past `max_packet_size`.
    ///
    /// Snapshot errors leave the database untouched.
    pub fn write_frame(
        &mut self,
        states: &[EntityState],
        view_entity: EntityNumber,
        msg: &mut MsgWriter,
    ) -> Result<FrameOutcome, SyncError> {
        self.check_snapshot(states)?;

        if self.log.is_full() {
            debug!(
                "Packet log full ({} commits), skipping frame",
                self.log.capacity()
            );
            return Ok(FrameOutcome::PacketLogFull);
        }
        let budget = self.config.max_packet_size;
        if msg.len() + FRAME_HEADER_LEN + TERMINATOR_LEN > budget {
            debug!("No room for entity frame ({} of {} bytes used)", msg.len(), budget);
            return Ok(FrameOutcome::NoRoom);
        }

        let frame = self.latest_frame.advance(1);
        self.observe(states, frame);
        self.fill_buckets(view_entity, frame);
        if self.buckets.is_empty() {
            return Ok(FrameOutcome::Idle);
        }

        let start = msg.len();
        msg.write_u8(SVC_ENTITIES);
        msg.write_i32(self.acked_frame.0);
        msg.write_i32(frame.0);

        let limit = budget - TERMINATOR_LEN;
        let precision = self.config.precision;
        let max_entries = self.config.max_commit_entries;
        let buckets = std::mem::take(&mut self.buckets);
        let mut scratch = std::mem::take(&mut self.scratch);
        let mut entries = Vec::new();
        let mut deferred = 0;

        for number in buckets.drain_order() {
            if entries.len() >= max_entries {
                deferred += 1;
                continue;
            }
            let slot = number as usize;
            let state = self.latest[slot];
            let mut bits = self.pending[slot];
            if state.active && bits.contains(DeltaBits::FULL_UPDATE) {
                let baseline = EntityState {
                    active: true,
                    ..DEFAULT_STATE
                };
                bits = DeltaBits::FULL_UPDATE | delta_bits(&baseline, &state);
            }

            scratch.clear();
            encode_update(number, &state, bits, precision, &mut scratch);
            if msg.len() + scratch.len() > limit {
                trace!(
                    "Entity {} ({} bytes) does not fit, deferring",
                    number,
                    scratch.len()
                );
                deferred += 1;
                continue;
            }
            msg.write_bytes(scratch.as_slice());
            entries.push(CommitEntry {
                number,
                bits,
                state,
            });
            self.pending[slot] = DeltaBits::empty();
            self.priorities[slot] = 0;
            self.update_frame[slot] = frame;
        }

        self.buckets = buckets;
        self.scratch = scratch;

        if entries.is_empty() {
            msg.truncate(start);
            debug!("No entity record fits in the remaining packet space");
            return Ok(FrameOutcome::NoRoom);
        }

        msg.write_u16(FRAME_TERMINATOR);
        let written = entries.len();
        self.log.push(Commit { frame, entries });
        self.latest_frame = frame;
        trace!(
            "Wrote frame {} with {} entities, {} deferred",
            frame.0,
            written,
            deferred
        );
        Ok(FrameOutcome::Written {
            frame,
            entities: written,
            bytes: msg.len() - start,
            deferred,
        })
    }

    fn check_snapshot(&mut self, states: &[EntityState]) -> Result<(), SyncError> {
        self.seen.fill(false);
        let max = self.config.max_entities;
        for state in states {
            let slot = state.number as usize;
            if slot == 0 || slot >= max {
                self.seen.fill(false);
                return Err(SyncError::EntityOutOfRange {
                    number: state.number,
                    max,
                });
            }
            if std::mem::replace(&mut self.seen[slot], true) {
                self.seen.fill(false);
                return Err(SyncError::DuplicateEntity(state.number));
            }
        }
        Ok(())
    }

    fn observe(&mut self, states: &[EntityState], frame: FrameNumber) {
        for state in states {
            let slot = state.number as usize;
            if !state.active {
                self.seen[slot] = false;
                continue;
            }
            if !self.visible[slot] {
                self.visible[slot] = true;
                self.update_frame[slot] = frame;
            }
            let previous = self.latest[slot];
            let changed = delta_bits(&previous, state);
            self.pending[slot] |= changed;
            self.latest[slot] = *state;
            // Sub-epsilon moves accumulate against the last flagged origin.
            if previous.active && !changed.contains(DeltaBits::ORIGIN) {
                self.latest[slot].origin = previous.origin;
            }
        }

        for slot in 1..self.config.max_entities {
            if !self.visible[slot] || self.seen[slot] {
                continue;
            }
            let number = slot as EntityNumber;
            self.visible[slot] = false;
            self.latest[slot] = EntityState::cleared(number);
            let peer_may_hold =
                self.reference[slot].active || !self.log.outstanding_bits(number).is_empty();
            self.pending[slot] = if peer_may_hold {
                DeltaBits::FULL_UPDATE
            } else {
                DeltaBits::empty()
            };
        }
    }

    fn fill_buckets(&mut self, view_entity: EntityNumber, now: FrameNumber) {
        self.buckets.clear();
        let view = self.view_state(view_entity);
        for slot in 1..self.config.max_entities {
            let priority = self.score(&view, slot, now);
            self.priorities[slot] = priority;
            self.buckets.push(priority, slot as EntityNumber);
        }
    }

    pub(crate) fn view_state(&self, view_entity: EntityNumber) -> EntityState {
        self.latest
            .get(view_entity as usize)
            .copied()
            .unwrap_or(DEFAULT_STATE)
    }

    pub(crate) fn score(&self, view: &EntityState, slot: usize, now: FrameNumber) -> u8 {
        let latest = &self.latest;
        entity_priority(
            view,
            &latest[slot],
            self.pending[slot],
            now.since(self.update_frame[slot]),
            |number| latest.get(number as usize),
        )
    }
}
