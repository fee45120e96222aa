//! Per-connection reference database and packet log.
//!
//! The database keeps three views of every entity slot:
//!
//! - `latest`: the state most recently observed from the simulation. Pending
//!   bits describe how this differs from what the peer is known to hold.
//! - `reference`: the state the peer has acknowledged.
//! - the commits in the packet log: what was sent but not yet acknowledged.
//!
//! Entity 0 is reserved and never transmitted.

use crate::bits::DeltaBits;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::msg::MsgWriter;
use crate::priority::PriorityBuckets;
use entsync_core::{EntityNumber, EntityState, FrameNumber};
use std::collections::VecDeque;
use tracing::debug;

/// One entity's contribution to a sent packet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommitEntry {
    /// Entity the record was for.
    pub number: EntityNumber,
    /// Change bits the record carried. `FULL_UPDATE` for removals.
    pub bits: DeltaBits,
    /// State as sent. Inactive for removals.
    pub state: EntityState,
}

/// Everything written into one outgoing frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    /// Frame number the packet carried.
    pub frame: FrameNumber,
    /// Records in the order they were written.
    pub entries: Vec<CommitEntry>,
}

impl Commit {
    /// Bits this commit carried for `number`, empty if absent.
    pub fn bits_for(&self, number: EntityNumber) -> DeltaBits {
        self.entries
            .iter()
            .filter(|entry| entry.number == number)
            .fold(DeltaBits::empty(), |acc, entry| acc | entry.bits)
    }
}

/// Bounded log of unacknowledged commits, oldest first.
#[derive(Debug, Clone)]
pub struct PacketLog {
    commits: VecDeque<Commit>,
    capacity: usize,
}

impl PacketLog {
    /// Empty log holding at most `capacity` commits.
    pub fn new(capacity: usize) -> Self {
        Self {
            commits: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Maximum number of commits.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Commits currently held.
    pub fn len(&self) -> usize {
        self.commits.len()
    }

    /// True if no commit is outstanding.
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// True if another commit would exceed capacity.
    pub fn is_full(&self) -> bool {
        self.commits.len() >= self.capacity
    }

    /// Outstanding commits, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Commit> {
        self.commits.iter()
    }

    /// Append a commit. The caller checks [`is_full`](Self::is_full) first.
    pub(crate) fn push(&mut self, commit: Commit) {
        debug_assert!(!self.is_full());
        self.commits.push_back(commit);
    }

    /// Remove and return every commit with a frame number `<= frame`.
    pub(crate) fn take_through(&mut self, frame: FrameNumber) -> Vec<Commit> {
        let (due, kept): (Vec<Commit>, Vec<Commit>) =
            self.commits.drain(..).partition(|commit| commit.frame <= frame);
        self.commits.extend(kept);
        due
    }

    /// Union of bits for `number` across every commit still held.
    pub fn outstanding_bits(&self, number: EntityNumber) -> DeltaBits {
        self.commits
            .iter()
            .fold(DeltaBits::empty(), |acc, commit| acc | commit.bits_for(number))
    }

    pub(crate) fn clear(&mut self) {
        self.commits.clear();
    }
}

/// Server-side state for one connection.
#[derive(Debug, Clone)]
pub struct EntityFrameDatabase {
    pub(crate) config: SyncConfig,
    pub(crate) latest: Vec<EntityState>,
    pub(crate) reference: Vec<EntityState>,
    pub(crate) visible: Vec<bool>,
    pub(crate) pending: Vec<DeltaBits>,
    pub(crate) priorities: Vec<u8>,
    pub(crate) update_frame: Vec<FrameNumber>,
    pub(crate) latest_frame: FrameNumber,
    pub(crate) acked_frame: FrameNumber,
    pub(crate) log: PacketLog,
    pub(crate) buckets: PriorityBuckets,
    pub(crate) scratch: MsgWriter,
    pub(crate) seen: Vec<bool>,
}

impl EntityFrameDatabase {
    /// Allocate a database sized by `config`.
    pub fn new(config: SyncConfig) -> Result<Self, SyncError> {
        config.validate()?;
        let slots = config.max_entities;
        let latest: Vec<EntityState> = (0..slots)
            .map(|number| EntityState::cleared(number as EntityNumber))
            .collect();
        Ok(Self {
            reference: latest.clone(),
            latest,
            visible: vec![false; slots],
            pending: vec![DeltaBits::empty(); slots],
            priorities: vec![0; slots],
            update_frame: vec![FrameNumber::NONE; slots],
            latest_frame: FrameNumber::NONE,
            acked_frame: FrameNumber::NONE,
            log: PacketLog::new(config.packet_log_capacity),
            buckets: PriorityBuckets::new(),
            scratch: MsgWriter::with_capacity(config.max_packet_size),
            seen: vec![false; slots],
            config,
        })
    }

    /// Forget everything the peer holds: every slot back to the default
    /// state, every commit discarded, frame numbering restarted.
    pub fn reset(&mut self) {
        debug!(
            "Resetting entity database ({} commits discarded)",
            self.log.len()
        );
        for (number, (latest, reference)) in self
            .latest
            .iter_mut()
            .zip(self.reference.iter_mut())
            .enumerate()
        {
            *latest = EntityState::cleared(number as EntityNumber);
            *reference = *latest;
        }
        self.visible.fill(false);
        self.pending.fill(DeltaBits::empty());
        self.priorities.fill(0);
        self.update_frame.fill(FrameNumber::NONE);
        self.latest_frame = FrameNumber::NONE;
        self.acked_frame = FrameNumber::NONE;
        self.log.clear();
    }

    /// Configuration the database was built with.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Acknowledged state of `number`, `None` if out of range.
    pub fn reference(&self, number: EntityNumber) -> Option<&EntityState> {
        self.reference.get(number as usize)
    }

    /// Most recently observed state of `number`.
    pub fn latest(&self, number: EntityNumber) -> Option<&EntityState> {
        self.latest.get(number as usize)
    }

    /// Bits still owed to the peer for `number`.
    pub fn pending(&self, number: EntityNumber) -> DeltaBits {
        self.pending
            .get(number as usize)
            .copied()
            .unwrap_or_else(DeltaBits::empty)
    }

    /// Priority `number` was last given, 0 if nothing is pending.
    pub fn priority(&self, number: EntityNumber) -> u8 {
        self.priorities.get(number as usize).copied().unwrap_or(0)
    }

    /// Frame in which `number` was last written, or spawned.
    pub fn last_update_frame(&self, number: EntityNumber) -> FrameNumber {
        self.update_frame
            .get(number as usize)
            .copied()
            .unwrap_or(FrameNumber::NONE)
    }

    /// True if `number` was present in the last snapshot.
    pub fn is_visible(&self, number: EntityNumber) -> bool {
        self.visible.get(number as usize).copied().unwrap_or(false)
    }

    /// Newest frame written.
    pub fn latest_frame(&self) -> FrameNumber {
        self.latest_frame
    }

    /// Newest frame acknowledged.
    pub fn acked_frame(&self) -> FrameNumber {
        self.acked_frame
    }

    /// Unacknowledged commits.
    pub fn commit_count(&self) -> usize {
        self.log.len()
    }

    /// The packet log itself.
    pub fn packet_log(&self) -> &PacketLog {
        &self.log
    }

    /// Entities with pending bits.
    pub fn pending_count(&self) -> usize {
        self.pending.iter().filter(|bits| !bits.is_empty()).count()
    }

    /// True once every slot's reference matches its latest state and nothing
    /// is pending or in flight.
    pub fn is_converged(&self) -> bool {
        self.log.is_empty()
            && self.pending.iter().all(|bits| bits.is_empty())
            && self
                .latest
                .iter()
                .zip(&self.reference)
                .all(|(latest, reference)| {
                    latest.active == reference.active
                        && (!latest.active
                            || crate::delta::delta_bits(reference, latest).is_empty())
                })
    }
}
