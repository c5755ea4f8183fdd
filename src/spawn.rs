use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{
    MAX_ALIVE_SPIRITS, SPAWN_INTERVAL_MAX_MS, SPAWN_INTERVAL_MIN_MS, SPAWN_MAX_ATTEMPTS,
    SPAWN_MINIMUM_DISTANCE, SPAWN_RING_RADIUS, SPAWN_WAVE_SIZE,
};
use crate::error::ConfigError;
use crate::rng::Rng;
use crate::tasks::{Task, TaskList, TaskOwner, TaskStatus};
use crate::types::{EntityKind, GamePhase, Vec2};
use crate::world::Camera;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpawnInterval {
    Fixed {
        #[serde(rename = "everyMs")]
        every_ms: u64,
    },
    Random {
        #[serde(rename = "minMs")]
        min_ms: u64,
        #[serde(rename = "maxMs")]
        max_ms: u64,
    },
}

impl SpawnInterval {
    pub fn draw(&self, rng: &mut Rng) -> u64 {
        match *self {
            SpawnInterval::Fixed { every_ms } => every_ms,
            SpawnInterval::Random { min_ms, max_ms } => rng.range_u64(min_ms, max_ms),
        }
    }
}

/// Concrete sampling region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SpawnRegion {
    Viewport { min: Vec2, max: Vec2 },
    Disc { center: Vec2, radius: f32 },
    Ring { center: Vec2, radius: f32 },
}

impl SpawnRegion {
    pub fn sample(&self, rng: &mut Rng) -> Vec2 {
        match *self {
            SpawnRegion::Viewport { min, max } => {
                Vec2::new(rng.range_f32(min.x, max.x), rng.range_f32(min.y, max.y))
            }
            SpawnRegion::Disc { center, radius } => center + rng.inside_unit_circle() * radius,
            SpawnRegion::Ring { center, radius } => center + rng.unit_direction() * radius,
        }
    }
}

/// Region description resolved against the camera when a wave fires.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpawnArea {
    CameraRing { radius: f32 },
    CameraDisc { radius: f32 },
    Viewport,
}

impl SpawnArea {
    pub fn resolve(&self, camera: &Camera) -> SpawnRegion {
        match *self {
            SpawnArea::CameraRing { radius } => SpawnRegion::Ring {
                center: camera.center,
                radius,
            },
            SpawnArea::CameraDisc { radius } => SpawnRegion::Disc {
                center: camera.center,
                radius,
            },
            SpawnArea::Viewport => {
                let viewport = camera.viewport();
                SpawnRegion::Viewport {
                    min: viewport.min,
                    max: viewport.max,
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnSettings {
    /// What each wave is made of.
    pub kind: EntityKind,
    pub interval: SpawnInterval,
    #[serde(rename = "waveSize")]
    pub wave_size: usize,
    pub area: SpawnArea,
    #[serde(rename = "minimumDistance")]
    pub minimum_distance: f32,
    #[serde(rename = "maxAttempts")]
    pub max_attempts: u32,
    #[serde(rename = "maxAlive")]
    pub max_alive: usize,
    /// Phases that run the spawn loop.
    pub phases: Vec<GamePhase>,
}

impl Default for SpawnSettings {
    fn default() -> Self {
        Self {
            kind: EntityKind::Spirit,
            interval: SpawnInterval::Random {
                min_ms: SPAWN_INTERVAL_MIN_MS,
                max_ms: SPAWN_INTERVAL_MAX_MS,
            },
            wave_size: SPAWN_WAVE_SIZE,
            area: SpawnArea::CameraRing {
                radius: SPAWN_RING_RADIUS,
            },
            minimum_distance: SPAWN_MINIMUM_DISTANCE,
            max_attempts: SPAWN_MAX_ATTEMPTS,
            max_alive: MAX_ALIVE_SPIRITS,
            phases: vec![GamePhase::Battle, GamePhase::Undead],
        }
    }
}

impl SpawnSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.kind, EntityKind::Spirit | EntityKind::Bot) {
            return Err(ConfigError::UnspawnableKind(self.kind));
        }
        match self.interval {
            SpawnInterval::Fixed { every_ms: 0 } => {
                return Err(ConfigError::Zero {
                    field: "spawn.interval.everyMs".to_string(),
                })
            }
            SpawnInterval::Random { min_ms, max_ms } if min_ms == 0 || max_ms < min_ms => {
                return Err(ConfigError::Zero {
                    field: "spawn.interval (minMs must be positive and not above maxMs)"
                        .to_string(),
                })
            }
            _ => {}
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Zero {
                field: "spawn.maxAttempts".to_string(),
            });
        }
        if !(self.minimum_distance.is_finite() && self.minimum_distance >= 0.0) {
            return Err(ConfigError::non_positive(
                "spawn.minimumDistance",
                self.minimum_distance,
            ));
        }
        if let SpawnArea::CameraRing { radius } | SpawnArea::CameraDisc { radius } = self.area {
            if !(radius.is_finite() && radius > 0.0) {
                return Err(ConfigError::non_positive("spawn.area.radius", radius));
            }
        }
        Ok(())
    }
}

/// Repeating timer; a wave becomes due each time it elapses.
#[derive(Clone, Debug)]
pub struct SpawnLoop {
    interval: SpawnInterval,
    until_next_ms: u64,
    due: bool,
}

impl SpawnLoop {
    /// The first wave is due immediately.
    pub fn new(interval: SpawnInterval) -> Self {
        Self {
            interval,
            until_next_ms: 0,
            due: true,
        }
    }

    /// Consumes the pending wave and re-arms the timer.
    pub fn take_due(&mut self, rng: &mut Rng) -> bool {
        if !self.due {
            return false;
        }
        self.due = false;
        self.until_next_ms = self.interval.draw(rng).max(1);
        true
    }
}

impl Task for SpawnLoop {
    fn resume(&mut self, dt_ms: u64) -> TaskStatus {
        if !self.due {
            self.until_next_ms = self.until_next_ms.saturating_sub(dt_ms);
            if self.until_next_ms == 0 {
                self.due = true;
            }
        }
        TaskStatus::Continue
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WavePlan {
    pub positions: Vec<Vec2>,
    pub skipped: usize,
}

#[derive(Clone, Debug)]
pub struct SpawnDirector {
    settings: SpawnSettings,
    loops: TaskList<SpawnLoop>,
}

impl SpawnDirector {
    pub fn new(settings: SpawnSettings) -> Self {
        Self {
            settings,
            loops: TaskList::new(),
        }
    }

    pub fn settings(&self) -> &SpawnSettings {
        &self.settings
    }

    pub fn spawns_in(&self, phase: GamePhase) -> bool {
        self.settings.phases.contains(&phase)
    }

    pub fn start(&mut self, owner: TaskOwner) {
        if !self.loops.has_owner(owner) {
            self.loops
                .spawn(owner, SpawnLoop::new(self.settings.interval));
        }
    }

    pub fn stop(&mut self, owner: TaskOwner) -> bool {
        self.loops.cancel_owner(owner) > 0
    }

    pub fn is_running(&self, owner: TaskOwner) -> bool {
        self.loops.has_owner(owner)
    }

    /// Advances every loop and returns how many waves are due now.
    pub fn advance(&mut self, dt_ms: u64, rng: &mut Rng) -> usize {
        self.loops.run(dt_ms);
        self.loops
            .iter_mut()
            .map(|(_, spawn_loop)| spawn_loop.take_due(rng))
            .filter(|due| *due)
            .count()
    }

    /// Samples up to `count` points at least `minimum_distance` apart.
    /// Each slot gets `max_attempts` samples and is skipped when they run out.
    pub fn plan_wave<F>(
        &self,
        count: usize,
        region: &SpawnRegion,
        rng: &mut Rng,
        blocked: F,
    ) -> WavePlan
    where
        F: Fn(Vec2) -> bool,
    {
        let mut plan = WavePlan::default();
        for slot in 0..count {
            let mut placed = None;
            for _ in 0..self.settings.max_attempts {
                let candidate = region.sample(rng);
                if blocked(candidate) {
                    continue;
                }
                let crowded = plan
                    .positions
                    .iter()
                    .any(|other| other.distance(candidate) < self.settings.minimum_distance);
                if !crowded {
                    placed = Some(candidate);
                    break;
                }
            }
            match placed {
                Some(position) => plan.positions.push(position),
                None => {
                    warn!(
                        slot,
                        attempts = self.settings.max_attempts,
                        "no free spawn point, slot skipped"
                    );
                    plan.skipped += 1;
                }
            }
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn director(minimum_distance: f32) -> SpawnDirector {
        SpawnDirector::new(SpawnSettings {
            minimum_distance,
            ..SpawnSettings::default()
        })
    }

    #[test]
    fn crowded_region_under_spawns_instead_of_hanging() {
        let director = director(0.5);
        let mut rng = Rng::new(11);
        let region = SpawnRegion::Viewport {
            min: Vec2::new(0.0, 0.0),
            max: Vec2::new(0.5, 0.5),
        };
        let plan = director.plan_wave(10, &region, &mut rng, |_| false);
        assert!(plan.positions.len() < 10);
        assert!(!plan.positions.is_empty());
        assert_eq!(plan.positions.len() + plan.skipped, 10);
        for (i, a) in plan.positions.iter().enumerate() {
            for b in &plan.positions[i + 1..] {
                assert!(a.distance(*b) >= 0.5);
            }
        }
    }

    #[test]
    fn fully_blocked_region_spawns_nothing() {
        let director = director(0.5);
        let mut rng = Rng::new(12);
        let region = SpawnRegion::Disc {
            center: Vec2::ZERO,
            radius: 3.0,
        };
        let plan = director.plan_wave(4, &region, &mut rng, |_| true);
        assert!(plan.positions.is_empty());
        assert_eq!(plan.skipped, 4);
    }

    #[test]
    fn ring_samples_lie_on_circle() {
        let mut rng = Rng::new(13);
        let region = SpawnRegion::Ring {
            center: Vec2::new(3.0, 4.0),
            radius: 14.0,
        };
        for _ in 0..100 {
            let point = region.sample(&mut rng);
            assert!((point.distance(Vec2::new(3.0, 4.0)) - 14.0).abs() < 1e-3);
        }
    }

    #[test]
    fn loop_fires_immediately_then_on_interval() {
        let mut director = SpawnDirector::new(SpawnSettings {
            interval: SpawnInterval::Fixed { every_ms: 1_000 },
            ..SpawnSettings::default()
        });
        let mut rng = Rng::new(14);
        let owner = TaskOwner::Phase(GamePhase::Battle);
        director.start(owner);
        director.start(owner);
        assert_eq!(director.advance(0, &mut rng), 1);
        let mut waves = 0;
        for _ in 0..40 {
            waves += director.advance(50, &mut rng);
        }
        assert_eq!(waves, 2);
        assert!(director.stop(owner));
        assert_eq!(director.advance(5_000, &mut rng), 0);
    }

    #[test]
    fn random_interval_stays_in_bounds() {
        let interval = SpawnInterval::Random {
            min_ms: 5_000,
            max_ms: 15_000,
        };
        let mut rng = Rng::new(15);
        for _ in 0..500 {
            let ms = interval.draw(&mut rng);
            assert!((5_000..=15_000).contains(&ms));
        }
    }

    #[test]
    fn waves_may_only_carry_agents() {
        let mut settings = SpawnSettings {
            kind: EntityKind::Bot,
            ..SpawnSettings::default()
        };
        assert!(settings.validate().is_ok());
        settings.kind = EntityKind::Sailor;
        assert_eq!(
            settings.validate(),
            Err(ConfigError::UnspawnableKind(EntityKind::Sailor))
        );
    }
}
