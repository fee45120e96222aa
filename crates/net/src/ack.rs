//! Reconciling acknowledgements with the packet log.
//!
//! An ack for frame N means the peer holds everything frame N carried. Every
//! commit older than N was lost: its bits are pending again unless a newer
//! commit still in flight carries them, or they are already pending.

use crate::bits::DeltaBits;
use crate::codec::merge_fields;
use crate::database::EntityFrameDatabase;
use crate::error::SyncError;
use entsync_core::{EntityNumber, FrameNumber};
use tracing::{trace, warn};

/// What [`EntityFrameDatabase::ack_frame`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// A non-positive ack reset the whole database.
    Reset,
    /// Nothing in the log was at or before the acked frame.
    Stale,
    /// Commits were retired.
    Applied {
        /// Entity records folded into the reference database.
        folded: usize,
        /// Commits found lost.
        lost_frames: usize,
        /// Entities whose bits were re-armed.
        rearmed: usize,
    },
}

impl EntityFrameDatabase {
    /// Process the peer's acknowledgement of `frame`.
    ///
    /// `view_entity` is used to re-score re-armed entities. Acking the same
    /// frame twice is a no-op. A frame newer than anything written is refused
    /// and changes nothing.
    pub fn ack_frame(
        &mut self,
        frame: FrameNumber,
        view_entity: EntityNumber,
    ) -> Result<AckOutcome, SyncError> {
        if !frame.is_valid() {
            self.reset();
            return Ok(AckOutcome::Reset);
        }
        if frame > self.latest_frame {
            warn!(
                "Ack for frame {} but latest written frame is {}",
                frame.0, self.latest_frame.0
            );
            return Err(SyncError::AckFromFuture {
                acked: frame,
                latest: self.latest_frame,
            });
        }

        let due = self.log.take_through(frame);
        if due.is_empty() {
            trace!("Ack for frame {} retired nothing", frame.0);
            return Ok(AckOutcome::Stale);
        }
        self.acked_frame = self.acked_frame.max(frame);

        let view = self.view_state(view_entity);
        let now = self.latest_frame;
        let mut folded = 0;
        let mut lost_frames = 0;
        let mut rearmed = 0;
        for commit in due {
            if commit.frame == frame {
                for entry in &commit.entries {
                    let reference = &mut self.reference[entry.number as usize];
                    merge_fields(reference, &entry.state, entry.bits);
                    reference.number = entry.number;
                }
                folded += commit.entries.len();
                continue;
            }

            lost_frames += 1;
            trace!("Frame {} lost, re-arming {} entities", commit.frame.0, commit.entries.len());
            for entry in &commit.entries {
                let slot = entry.number as usize;
                let in_flight = self.log.outstanding_bits(entry.number);
                if in_flight.contains(DeltaBits::FULL_UPDATE) {
                    continue;
                }
                let resend = entry.bits & !self.pending[slot] & !in_flight;
                if resend.is_empty() {
                    continue;
                }
                self.pending[slot] |= resend;
                self.priorities[slot] = self.score(&view, slot, now);
                rearmed += 1;
            }
        }

        Ok(AckOutcome::Applied {
            folded,
            lost_frames,
            rearmed,
        })
    }
}
