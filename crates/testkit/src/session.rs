//! One server connection and its client, wired through lossy links.

use crate::link::LossyLink;
use crate::metrics::SyncMetrics;
use anyhow::{Context, Result};
use entsync_core::{EntityNumber, EntityState, FrameNumber};
use entsync_net::delta::ORIGIN_EPSILON;
use entsync_net::msg::{fits_compact_coord, quantize_angle8};
use entsync_net::{
    AckOutcome, ClientEntities, ClientFrame, EntityFrameDatabase, FrameOutcome, MsgWriter,
    SyncConfig,
};
use tracing::debug;

/// Seconds of simulated time per frame.
pub const FRAME_SECONDS: f64 = 1.0 / 20.0;

/// Link and database settings for a [`Session`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Database sizing.
    pub sync: SyncConfig,
    /// Chance, in percent, that an entity frame or an ack is lost.
    pub loss_percent: u8,
    /// Frames between the client receiving a frame and the server seeing the ack.
    pub ack_delay_frames: u64,
    /// Seed for both links.
    pub seed: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            loss_percent: 0,
            ack_delay_frames: 0,
            seed: 0,
        }
    }
}

/// What happened during one [`Session::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// Frame index, counted from 1.
    pub index: u64,
    /// Writer outcome.
    pub outcome: FrameOutcome,
    /// Frames the client applied this step.
    pub applied: Vec<ClientFrame>,
    /// Ack results the server processed this step.
    pub acks: Vec<AckOutcome>,
}

/// Server database and client table joined by two [`LossyLink`]s.
pub struct Session {
    server: EntityFrameDatabase,
    client: ClientEntities,
    downlink: LossyLink<Vec<u8>>,
    uplink: LossyLink<FrameNumber>,
    view_entity: EntityNumber,
    index: u64,
    metrics: SyncMetrics,
}

impl Session {
    /// Connect a fresh client viewing from `view_entity`.
    pub fn new(config: &SessionConfig, view_entity: EntityNumber) -> Result<Self> {
        let server =
            EntityFrameDatabase::new(config.sync.clone()).context("invalid sync config")?;
        Ok(Self {
            client: ClientEntities::new(&config.sync),
            server,
            downlink: LossyLink::new(config.seed, config.loss_percent, 0),
            uplink: LossyLink::new(
                config.seed ^ 0x5eed_ac4b,
                config.loss_percent,
                config.ack_delay_frames,
            ),
            view_entity,
            index: 0,
            metrics: SyncMetrics::default(),
        })
    }

    /// Write one frame for `states`, deliver whatever is due both ways.
    pub fn step(&mut self, states: &[EntityState]) -> Result<StepReport> {
        self.index += 1;
        let now = self.index;
        let time = now as f64 * FRAME_SECONDS;

        let mut msg = MsgWriter::with_capacity(self.server.config().max_packet_size);
        let outcome = self
            .server
            .write_frame(states, self.view_entity, &mut msg)
            .with_context(|| format!("writing frame at step {now}"))?;
        self.record_outcome(&outcome);
        if let FrameOutcome::Written { .. } = outcome {
            if !self.downlink.send(now, msg.into_inner()) {
                self.metrics.packets_dropped += 1;
            }
        }

        let mut applied = Vec::new();
        for packet in self.downlink.deliver(now) {
            let frame = self
                .client
                .read_packet(&packet, time)
                .with_context(|| format!("client failed to apply packet at step {now}"))?;
            applied.push(frame);
        }
        // The client acks its newest frame on every outgoing packet, so a lost
        // ack is repaired by the next one.
        let acked = self.client.latest_frame();
        if acked.is_valid() && !self.uplink.send(now, acked) {
            self.metrics.acks_dropped += 1;
        }

        let mut acks = Vec::new();
        for ack in self.uplink.deliver(now) {
            let result = self
                .server
                .ack_frame(ack, self.view_entity)
                .with_context(|| format!("server rejected ack {ack:?}"))?;
            if let AckOutcome::Applied {
                lost_frames,
                rearmed,
                ..
            } = result
            {
                self.metrics.frames_lost += lost_frames as u64;
                self.metrics.entities_rearmed += rearmed as u64;
            }
            acks.push(result);
        }

        self.metrics.max_commits_outstanding = self
            .metrics
            .max_commits_outstanding
            .max(self.server.commit_count());
        self.metrics.max_pending_entities = self
            .metrics
            .max_pending_entities
            .max(self.server.pending_count());

        Ok(StepReport {
            index: now,
            outcome,
            applied,
            acks,
        })
    }

    fn record_outcome(&mut self, outcome: &FrameOutcome) {
        let metrics = &mut self.metrics;
        metrics.frames += 1;
        match *outcome {
            FrameOutcome::Written {
                entities,
                bytes,
                deferred,
                ..
            } => {
                metrics.frames_written += 1;
                metrics.bytes_sent += bytes as u64;
                metrics.records_sent += entities as u64;
                metrics.records_deferred += deferred as u64;
            }
            FrameOutcome::Idle => metrics.frames_idle += 1,
            FrameOutcome::PacketLogFull => metrics.frames_log_full += 1,
            FrameOutcome::NoRoom => metrics.frames_no_room += 1,
        }
    }

    /// Change the loss rate of both links.
    pub fn set_loss_percent(&mut self, loss_percent: u8) {
        self.downlink.set_loss_percent(loss_percent);
        self.uplink.set_loss_percent(loss_percent);
    }

    /// Entities whose client copy does not match the server's latest state,
    /// allowing for wire quantization.
    pub fn divergent_entities(&self) -> Vec<EntityNumber> {
        let max = self.server.config().max_entities;
        (1..max)
            .map(|slot| slot as EntityNumber)
            .filter(|&number| match (self.server.latest(number), self.client.current(number)) {
                (Some(server), Some(client)) => !same_on_wire(server, client),
                _ => false,
            })
            .collect()
    }

    /// Counters so far, with the current divergence filled in.
    pub fn metrics(&self) -> SyncMetrics {
        let mut metrics = self.metrics.clone();
        metrics.divergent_entities = self.divergent_entities().len();
        debug!("Session metrics after {} steps: {:?}", self.index, metrics);
        metrics
    }

    /// The server side.
    pub fn server(&self) -> &EntityFrameDatabase {
        &self.server
    }

    /// The client side.
    pub fn client(&self) -> &ClientEntities {
        &self.client
    }

    /// Steps taken.
    pub fn steps(&self) -> u64 {
        self.index
    }

    /// Frames still travelling either way.
    pub fn in_flight(&self) -> usize {
        self.downlink.in_flight() + self.uplink.in_flight()
    }
}

fn same_on_wire(server: &EntityState, client: &EntityState) -> bool {
    if server.active != client.active {
        return false;
    }
    if !server.active {
        return true;
    }
    let origin_close = server
        .origin
        .to_array()
        .into_iter()
        .zip(client.origin.to_array())
        .all(|(s, c)| {
            let quantum = if fits_compact_coord(s) { 1.0 / 16.0 } else { 0.0 };
            (s - c).abs() <= quantum + ORIGIN_EPSILON
        });
    let angles_close = server
        .angles
        .to_array()
        .into_iter()
        .zip(client.angles.to_array())
        .all(|(s, c)| {
            let steps = quantize_angle8(s).wrapping_sub(quantize_angle8(c));
            steps <= 1 || steps == u8::MAX
        });
    origin_close
        && angles_close
        && server.model_index == client.model_index
        && server.frame == client.frame
        && server.skin == client.skin
        && server.effects == client.effects
        && server.flags == client.flags
        && server.alpha == client.alpha
        && server.scale == client.scale
        && server.colormap == client.colormap
        && server.tag_entity == client.tag_entity
        && server.tag_index == client.tag_index
        && server.light == client.light
        && server.light_style == client.light_style
        && server.light_pflags == client.light_pflags
        && server.glow_size == client.glow_size
        && server.glow_color == client.glow_color
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneBuilder;

    #[test]
    fn lossless_session_converges_immediately() {
        let mut scene = SceneBuilder::new(3).entities(12).build();
        let mut session = Session::new(&SessionConfig::default(), scene.view_entity()).unwrap();
        for _ in 0..20 {
            let report = session.step(&scene.step()).unwrap();
            assert!(matches!(
                report.outcome,
                FrameOutcome::Written { .. } | FrameOutcome::Idle
            ));
            assert!(session.divergent_entities().is_empty());
        }
        let metrics = session.metrics();
        assert_eq!(metrics.frames, 20);
        assert_eq!(metrics.frames_lost, 0);
        assert_eq!(metrics.packets_dropped, 0);
    }

    #[test]
    fn lost_acks_do_not_wedge_a_full_log() {
        let config = SessionConfig {
            sync: SyncConfig {
                packet_log_capacity: 2,
                ..SyncConfig::default()
            },
            ..SessionConfig::default()
        };
        let mut session = Session::new(&config, 1).unwrap();
        let at = |x: f32| {
            [
                EntityState::spawned(1, glam::Vec3::ZERO),
                EntityState::spawned(2, glam::Vec3::new(x, 0.0, 0.0)),
            ]
        };
        session.uplink.set_loss_percent(100);
        let mut outcomes = Vec::new();
        for step in 0..3 {
            outcomes.push(session.step(&at(step as f32)).unwrap().outcome);
        }
        assert_eq!(outcomes[2], FrameOutcome::PacketLogFull);

        session.uplink.set_loss_percent(0);
        for _ in 0..10 {
            session.step(&at(10.0)).unwrap();
        }
        assert!(session.divergent_entities().is_empty());
        assert_eq!(session.server().commit_count(), 0);
        assert!(session.server().is_converged());
        assert!(session.metrics().acks_dropped >= 2);
    }

    #[test]
    fn quantized_copies_count_as_equal() {
        let server = EntityState::spawned(3, glam::Vec3::new(10.01, 0.0, 0.0));
        let client = EntityState::spawned(3, glam::Vec3::new(10.0, 0.0, 0.0));
        assert!(same_on_wire(&server, &client));
        let moved = EntityState::spawned(3, glam::Vec3::new(11.0, 0.0, 0.0));
        assert!(!same_on_wire(&moved, &client));
    }
}
