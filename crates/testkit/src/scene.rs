//! Deterministic moving scene used to feed the writer.

use entsync_core::{EntityNumber, EntityState, RenderFlags};
use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Builder for a [`Scene`].
#[derive(Debug, Clone)]
pub struct SceneBuilder {
    seed: u64,
    entities: u16,
    spread: f32,
    view_entity: EntityNumber,
    churn_per_mille: u16,
}

impl SceneBuilder {
    /// Scene of 32 entities within 2048 units, viewed from entity 1.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            entities: 32,
            spread: 2048.0,
            view_entity: 1,
            churn_per_mille: 5,
        }
    }

    /// Number of entities, numbered from 1.
    pub fn entities(mut self, entities: u16) -> Self {
        self.entities = entities.max(1);
        self
    }

    /// Radius around the origin entities wander in.
    pub fn spread(mut self, spread: f32) -> Self {
        self.spread = spread.max(1.0);
        self
    }

    /// Entity the viewer is attached to.
    pub fn view_entity(mut self, view_entity: EntityNumber) -> Self {
        self.view_entity = view_entity;
        self
    }

    /// Chance per frame, in thousandths, that an entity vanishes or returns.
    pub fn churn_per_mille(mut self, churn: u16) -> Self {
        self.churn_per_mille = churn.min(1000);
        self
    }

    /// Place every entity.
    pub fn build(self) -> Scene {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let view_model = self.view_entity.checked_add(1);
        let movers = (1..=self.entities)
            .map(|number| {
                let mut base = EntityState::spawned(number, Vec3::ZERO);
                base.model_index = rng.gen_range(1..600);
                base.skin = rng.gen_range(0..4);
                if number == self.view_entity {
                    return Mover::still(base);
                }
                if Some(number) == view_model {
                    base.flags = RenderFlags::VIEW_MODEL;
                    base.tag_entity = self.view_entity;
                    return Mover::still(base);
                }
                if rng.gen_bool(0.1) {
                    base.flags |= RenderFlags::LOW_PRECISION;
                }
                if rng.gen_bool(0.05) {
                    base.effects = rng.gen();
                }
                Mover {
                    base,
                    center: Vec3::new(
                        rng.gen_range(-self.spread..self.spread),
                        rng.gen_range(-self.spread..self.spread),
                        rng.gen_range(-64.0..64.0),
                    ),
                    radius: rng.gen_range(0.0..self.spread / 8.0),
                    speed: rng.gen_range(0.0..0.05),
                    phase: rng.gen_range(0.0..std::f32::consts::TAU),
                    pinned: false,
                    hidden: false,
                }
            })
            .collect();
        Scene {
            rng,
            movers,
            view_entity: self.view_entity,
            churn_per_mille: self.churn_per_mille,
            frame: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct Mover {
    base: EntityState,
    center: Vec3,
    radius: f32,
    speed: f32,
    phase: f32,
    pinned: bool,
    hidden: bool,
}

impl Mover {
    fn still(base: EntityState) -> Self {
        Self {
            center: base.origin,
            base,
            radius: 0.0,
            speed: 0.0,
            phase: 0.0,
            pinned: true,
            hidden: false,
        }
    }

    fn state_at(&self, frame: u64) -> EntityState {
        let turn = self.phase + self.speed * frame as f32;
        let mut state = self.base;
        state.origin = self.center + Vec3::new(turn.cos(), turn.sin(), 0.0) * self.radius;
        state.angles = Vec3::new(0.0, turn.to_degrees().rem_euclid(360.0), 0.0);
        state.frame = ((frame / 4) % 16) as u16;
        state
    }
}

/// Entities moving on circles, some of them vanishing and returning.
#[derive(Debug)]
pub struct Scene {
    rng: StdRng,
    movers: Vec<Mover>,
    view_entity: EntityNumber,
    churn_per_mille: u16,
    frame: u64,
}

impl Scene {
    /// Entity the viewer sits on.
    pub fn view_entity(&self) -> EntityNumber {
        self.view_entity
    }

    /// Frames stepped so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Advance one frame and list the entities visible now.
    pub fn step(&mut self) -> Vec<EntityState> {
        self.frame += 1;
        let frame = self.frame;
        let churn = self.churn_per_mille;
        let rng = &mut self.rng;
        self.movers
            .iter_mut()
            .filter_map(|mover| {
                if !mover.pinned && churn > 0 && rng.gen_range(0..1000) < churn {
                    mover.hidden = !mover.hidden;
                }
                (!mover.hidden).then(|| mover.state_at(frame))
            })
            .collect()
    }

    /// Current states without advancing or churning.
    pub fn snapshot(&self) -> Vec<EntityState> {
        self.movers
            .iter()
            .filter(|mover| !mover.hidden)
            .map(|mover| mover.state_at(self.frame))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_scene() {
        let mut a = SceneBuilder::new(9).entities(20).build();
        let mut b = SceneBuilder::new(9).entities(20).build();
        for _ in 0..50 {
            assert_eq!(a.step(), b.step());
        }
    }

    #[test]
    fn viewer_and_view_model_are_always_present() {
        let mut scene = SceneBuilder::new(1)
            .entities(10)
            .churn_per_mille(1000)
            .build();
        for _ in 0..10 {
            let states = scene.step();
            let view_model = states.iter().find(|s| s.number == 2).unwrap();
            assert!(states.iter().any(|s| s.number == 1));
            assert!(view_model.is_view_model());
            assert_eq!(view_model.tag_entity, 1);
        }
    }

    #[test]
    fn numbers_are_unique_and_in_range() {
        let mut scene = SceneBuilder::new(4).entities(50).build();
        let states = scene.step();
        let mut numbers: Vec<u16> = states.iter().map(|s| s.number).collect();
        numbers.dedup();
        assert_eq!(numbers.len(), states.len());
        assert!(numbers.iter().all(|n| (1..=50).contains(n)));
        assert_eq!(scene.snapshot(), states);
    }
}
