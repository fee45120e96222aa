//! Full server to client sessions over the testkit's lossy link.

use entsync_core::{EntityState, RenderFlags};
use entsync_net::{FrameOutcome, Precision, SyncConfig};
use entsync_testkit::{SceneBuilder, Session, SessionConfig};
use glam::Vec3;

fn lossy(loss_percent: u8, ack_delay_frames: u64) -> SessionConfig {
    SessionConfig {
        sync: SyncConfig {
            max_entities: 256,
            ..SyncConfig::default()
        },
        loss_percent,
        ack_delay_frames,
        seed: 99,
    }
}

#[test]
fn heavy_loss_is_repaired_once_the_link_clears() {
    let mut scene = SceneBuilder::new(5).entities(120).churn_per_mille(20).build();
    let mut session = Session::new(&lossy(50, 3), scene.view_entity()).unwrap();
    for _ in 0..300 {
        session.step(&scene.step()).unwrap();
    }
    assert!(session.metrics().packets_dropped > 50);

    session.set_loss_percent(0);
    let frozen = scene.snapshot();
    for _ in 0..60 {
        session.step(&frozen).unwrap();
    }
    assert_eq!(session.divergent_entities(), Vec::<u16>::new());
    assert!(session.server().is_converged());
    assert_eq!(session.in_flight(), 0);
}

#[test]
fn view_model_is_refreshed_every_written_frame() {
    let viewer = EntityState::spawned(1, Vec3::ZERO);
    let mut weapon = EntityState {
        flags: RenderFlags::VIEW_MODEL,
        tag_entity: 1,
        ..EntityState::spawned(2, Vec3::new(0.0, 0.0, 8.0))
    };
    // A crowd of far entities that changes every frame and cannot all fit.
    let mut crowd: Vec<EntityState> = (3..200)
        .map(|n| EntityState::spawned(n, Vec3::new(3000.0, n as f32, 0.0)))
        .collect();
    let config = SessionConfig {
        sync: SyncConfig {
            max_entities: 256,
            max_packet_size: 256,
            ..SyncConfig::default()
        },
        ..SessionConfig::default()
    };
    let mut session = Session::new(&config, 1).unwrap();

    for step in 0..40u16 {
        weapon.frame = step;
        for entity in &mut crowd {
            entity.angles.y = (step as f32 * 9.0) % 360.0;
        }
        let mut states = vec![viewer, weapon];
        states.extend_from_slice(&crowd);
        let report = session.step(&states).unwrap();
        assert!(matches!(report.outcome, FrameOutcome::Written { .. }));
        assert_eq!(session.client().current(2).unwrap().frame, step);
    }
}

#[test]
fn low_precision_sessions_stay_in_sync() {
    let mut config = lossy(20, 1);
    config.sync.precision = Precision::Low;
    let mut scene = SceneBuilder::new(11).entities(50).spread(1500.0).build();
    let mut session = Session::new(&config, scene.view_entity()).unwrap();
    for _ in 0..150 {
        session.step(&scene.step()).unwrap();
    }
    session.set_loss_percent(0);
    let frozen = scene.snapshot();
    for _ in 0..40 {
        session.step(&frozen).unwrap();
    }
    assert!(session.divergent_entities().is_empty());
}
