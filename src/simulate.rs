//! Headless server to client run over a lossy link.

use crate::config::SimConfig;
use anyhow::{Context, Result};
use entsync_net::{AckOutcome, FrameOutcome};
use entsync_testkit::{
    EventRecord, JsonlSink, Scene, SceneBuilder, Session, SessionConfig, StepReport, SyncMetrics,
};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct SimSummary {
    pub metrics: SyncMetrics,
    /// True if the client matched the server once the link went clean.
    pub converged: bool,
    pub elapsed: Duration,
}

/// Step the configured scene for `scene.frames` lossy frames, then
/// `scene.settle_frames` clean ones.
pub fn run(config: &SimConfig, mut events: Option<&mut JsonlSink>) -> Result<SimSummary> {
    config.validate().context("invalid simulation config")?;
    let started = Instant::now();
    let scene_cfg = &config.scene;

    let mut scene: Scene = SceneBuilder::new(scene_cfg.seed)
        .entities(scene_cfg.entities)
        .spread(scene_cfg.spread)
        .view_entity(scene_cfg.view_entity)
        .churn_per_mille(scene_cfg.churn_per_mille)
        .build();
    let session_cfg = SessionConfig {
        sync: config.sync.clone(),
        loss_percent: scene_cfg.loss_percent,
        ack_delay_frames: scene_cfg.ack_delay_frames,
        seed: scene_cfg.seed,
    };
    let mut session = Session::new(&session_cfg, scene.view_entity())?;

    info!(
        "Running {} frames with {} entities at {}% loss",
        scene_cfg.frames, scene_cfg.entities, scene_cfg.loss_percent
    );
    for _ in 0..scene_cfg.frames {
        let report = session.step(&scene.step())?;
        if let Some(sink) = events.as_deref_mut() {
            record_step(sink, &report)?;
        }
    }

    // Freeze the scene and stop dropping so outstanding loss can be repaired.
    session.set_loss_percent(0);
    let frozen = scene.snapshot();
    let settle = scene_cfg.settle_frames + scene_cfg.ack_delay_frames;
    for _ in 0..settle {
        let report = session.step(&frozen)?;
        if let Some(sink) = events.as_deref_mut() {
            record_step(sink, &report)?;
        }
    }

    let divergent = session.divergent_entities();
    if !divergent.is_empty() {
        debug!("Entities still divergent after settling: {:?}", divergent);
    }
    if let Some(sink) = events.as_deref_mut() {
        sink.flush()?;
    }

    Ok(SimSummary {
        metrics: session.metrics(),
        converged: divergent.is_empty(),
        elapsed: started.elapsed(),
    })
}

fn record_step(sink: &mut JsonlSink, report: &StepReport) -> Result<()> {
    let (kind, frame, payload) = match report.outcome {
        FrameOutcome::Written {
            frame,
            entities,
            bytes,
            deferred,
        } => (
            "frame_written",
            Some(frame),
            format!("entities={entities} bytes={bytes} deferred={deferred}"),
        ),
        FrameOutcome::Idle => ("frame_idle", None, String::new()),
        FrameOutcome::PacketLogFull => ("packet_log_full", None, String::new()),
        FrameOutcome::NoRoom => ("no_room", None, String::new()),
    };
    sink.write(&EventRecord {
        step: report.index,
        frame,
        kind,
        payload: &payload,
    })?;

    for applied in &report.applied {
        let payload = format!(
            "reference={} updated={} removed={}",
            applied.reference_frame.0, applied.updated, applied.removed
        );
        sink.write(&EventRecord {
            step: report.index,
            frame: Some(applied.frame),
            kind: "frame_applied",
            payload: &payload,
        })?;
    }

    for ack in &report.acks {
        let payload = match ack {
            AckOutcome::Applied {
                folded,
                lost_frames,
                rearmed,
            } => format!("folded={folded} lost={lost_frames} rearmed={rearmed}"),
            AckOutcome::Stale => continue,
            AckOutcome::Reset => "reset".to_string(),
        };
        sink.write(&EventRecord {
            step: report.index,
            frame: None,
            kind: "ack",
            payload: &payload,
        })?;
    }
    Ok(())
}
