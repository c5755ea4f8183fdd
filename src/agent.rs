use serde::{Deserialize, Serialize};

use crate::combat::{ProjectileWeapon, SpreadWeapon};
use crate::constants::BODY_RADIUS;
use crate::entity::EntityStore;
use crate::error::ConfigError;
use crate::locomotion::{GroundProbe, JumpController, JumpSettings};
use crate::rng::Rng;
use crate::types::{AgentState, EntityId, Faction, ProjectileKind, Vec2};
use crate::world::Level;

/// How the two engagement bands map onto states.
///
/// `RangedThenCloses` shoots from mid range and closes in to collide at
/// short range. `ChaseThenAttack` runs at the target until it is in range
/// and then shoots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementPolicy {
    RangedThenCloses,
    ChaseThenAttack,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentWeapon {
    Single(ProjectileWeapon),
    Spread(SpreadWeapon),
}

impl AgentWeapon {
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        match self {
            AgentWeapon::Single(weapon) => weapon.validate(&format!("{name}.weapon")),
            AgentWeapon::Spread(weapon) => weapon.validate(&format!("{name}.weapon")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundedLocomotion {
    pub jump: JumpSettings,
    pub probe: Option<GroundProbe>,
    #[serde(rename = "lookAhead")]
    pub look_ahead: f32,
    #[serde(rename = "probeDepth")]
    pub probe_depth: f32,
    #[serde(rename = "climbThreshold")]
    pub climb_threshold: f32,
    #[serde(rename = "jumpCooldownMs")]
    pub jump_cooldown_ms: u64,
    #[serde(rename = "randomJumpChance")]
    pub random_jump_chance: f32,
}

impl Default for GroundedLocomotion {
    fn default() -> Self {
        Self {
            jump: JumpSettings::default(),
            probe: Some(GroundProbe::below(BODY_RADIUS)),
            look_ahead: 1.0,
            probe_depth: 2.0,
            climb_threshold: 1.0,
            jump_cooldown_ms: 1_000,
            random_jump_chance: 0.002,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Locomotion {
    Floating,
    Grounded(GroundedLocomotion),
}

/// Tunables selected per spawned agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentBehaviorProfile {
    pub name: String,
    pub policy: EngagementPolicy,
    #[serde(rename = "detectionRange")]
    pub detection_range: f32,
    #[serde(rename = "attackRange")]
    pub attack_range: f32,
    #[serde(rename = "retreatRange")]
    pub retreat_range: Option<f32>,
    #[serde(rename = "moveSpeed")]
    pub move_speed: f32,
    #[serde(rename = "wanderSpeedMultiplier")]
    pub wander_speed_multiplier: f32,
    #[serde(rename = "chaseSpeedMultiplier")]
    pub chase_speed_multiplier: f32,
    #[serde(rename = "attackSpeedMultiplier")]
    pub attack_speed_multiplier: f32,
    #[serde(rename = "retreatSpeedMultiplier")]
    pub retreat_speed_multiplier: f32,
    #[serde(rename = "wanderRadius")]
    pub wander_radius: f32,
    #[serde(rename = "changeDirectionMs")]
    pub change_direction_ms: u64,
    #[serde(rename = "arrivalEpsilon")]
    pub arrival_epsilon: f32,
    #[serde(rename = "fireRate")]
    pub fire_rate: f32,
    pub weapon: Option<AgentWeapon>,
    pub locomotion: Locomotion,
    /// Re-run the nearest search every tick instead of keeping a valid target.
    #[serde(rename = "retargetEveryTick")]
    pub retarget_every_tick: bool,
}

impl Default for AgentBehaviorProfile {
    fn default() -> Self {
        Self::spirit()
    }
}

impl AgentBehaviorProfile {
    pub fn spirit() -> Self {
        Self {
            name: "spirit".to_string(),
            policy: EngagementPolicy::RangedThenCloses,
            detection_range: 12.0,
            attack_range: 3.0,
            retreat_range: None,
            move_speed: 3.0,
            wander_speed_multiplier: 0.5,
            chase_speed_multiplier: 1.0,
            attack_speed_multiplier: 0.5,
            retreat_speed_multiplier: 1.0,
            wander_radius: 5.0,
            change_direction_ms: 3_000,
            arrival_epsilon: 0.2,
            fire_rate: 1.0,
            weapon: Some(AgentWeapon::Single(ProjectileWeapon::default())),
            locomotion: Locomotion::Floating,
            retarget_every_tick: false,
        }
    }

    pub fn bot() -> Self {
        Self {
            name: "bot".to_string(),
            policy: EngagementPolicy::ChaseThenAttack,
            detection_range: 15.0,
            attack_range: 8.0,
            move_speed: 5.0,
            wander_speed_multiplier: 0.6,
            chase_speed_multiplier: 1.0,
            attack_speed_multiplier: 0.3,
            fire_rate: 2.0,
            weapon: Some(AgentWeapon::Spread(SpreadWeapon::default())),
            locomotion: Locomotion::Grounded(GroundedLocomotion::default()),
            retarget_every_tick: true,
            ..Self::spirit()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = self.name.as_str();
        for (field, value) in [
            ("detectionRange", self.detection_range),
            ("attackRange", self.attack_range),
            ("moveSpeed", self.move_speed),
            ("fireRate", self.fire_rate),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::non_positive(&format!("{name}.{field}"), value));
            }
        }
        if self.attack_range >= self.detection_range {
            return Err(ConfigError::RangeOrder {
                profile: self.name.clone(),
                attack: self.attack_range,
                detection: self.detection_range,
            });
        }
        if let Some(retreat) = self.retreat_range {
            if !(retreat.is_finite() && retreat > 0.0 && retreat < self.attack_range) {
                return Err(ConfigError::RetreatOrder {
                    profile: self.name.clone(),
                    retreat,
                    attack: self.attack_range,
                });
            }
        }
        if self.change_direction_ms == 0 {
            return Err(ConfigError::Zero {
                field: format!("{name}.changeDirectionMs"),
            });
        }
        match &self.weapon {
            Some(weapon) => weapon.validate(name)?,
            None => {
                return Err(ConfigError::MissingWeapon {
                    profile: self.name.clone(),
                })
            }
        }
        if let Locomotion::Grounded(grounded) = &self.locomotion {
            if grounded.probe.is_none() {
                return Err(ConfigError::MissingGroundProbe {
                    profile: self.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn fire_interval_ms(&self) -> u64 {
        (1000.0 / self.fire_rate).round() as u64
    }

    pub fn projectile_kind(&self) -> Option<ProjectileKind> {
        match &self.weapon {
            Some(AgentWeapon::Single(weapon)) => Some(weapon.kind),
            Some(AgentWeapon::Spread(weapon)) => Some(weapon.pellet.kind),
            None => None,
        }
    }

    fn speed_for(&self, state: AgentState) -> f32 {
        let multiplier = match state {
            AgentState::Wandering => self.wander_speed_multiplier,
            AgentState::Chasing => self.chase_speed_multiplier,
            AgentState::Attacking => self.attack_speed_multiplier,
            AgentState::Retreating => self.retreat_speed_multiplier,
        };
        self.move_speed * multiplier
    }
}

/// Pure state function of the distance to the current target.
pub fn classify(
    policy: EngagementPolicy,
    distance: Option<f32>,
    detection_range: f32,
    attack_range: f32,
    retreat_range: Option<f32>,
) -> AgentState {
    let Some(distance) = distance.filter(|d| *d <= detection_range) else {
        return AgentState::Wandering;
    };
    if retreat_range.is_some_and(|retreat| distance <= retreat) {
        return AgentState::Retreating;
    }
    let close = distance <= attack_range;
    match (policy, close) {
        (EngagementPolicy::RangedThenCloses, false) => AgentState::Attacking,
        (EngagementPolicy::RangedThenCloses, true) => AgentState::Chasing,
        (EngagementPolicy::ChaseThenAttack, false) => AgentState::Chasing,
        (EngagementPolicy::ChaseThenAttack, true) => AgentState::Attacking,
    }
}

/// What the agent sees of itself this tick.
#[derive(Clone, Copy, Debug)]
pub struct AgentSelf {
    pub id: EntityId,
    pub faction: Faction,
    pub position: Vec2,
    pub grounded: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgentDecision {
    pub state: AgentState,
    pub velocity: Vec2,
    /// Only the horizontal component applies; gravity owns the vertical.
    pub keep_vertical: bool,
    pub jump: bool,
    pub fire_at: Option<Vec2>,
}

#[derive(Clone, Debug)]
pub struct AgentBrain {
    profile: AgentBehaviorProfile,
    state: AgentState,
    target: Option<EntityId>,
    last_fire_ms: Option<u64>,
    last_direction_change_ms: u64,
    last_jump_ms: Option<u64>,
    spawn_origin: Vec2,
    wander_offset: Vec2,
    jump: JumpController,
    state_changes: u64,
}

impl AgentBrain {
    /// Refuses to activate an agent whose profile is incomplete.
    pub fn new(
        profile: AgentBehaviorProfile,
        spawn_origin: Vec2,
        now_ms: u64,
        rng: &mut Rng,
    ) -> Result<Self, ConfigError> {
        profile.validate()?;
        let mut brain = Self {
            profile,
            state: AgentState::Wandering,
            target: None,
            last_fire_ms: None,
            last_direction_change_ms: now_ms,
            last_jump_ms: None,
            spawn_origin,
            wander_offset: Vec2::ZERO,
            jump: JumpController::default(),
            state_changes: 0,
        };
        brain.reroll_wander(now_ms, rng);
        Ok(brain)
    }

    pub fn profile(&self) -> &AgentBehaviorProfile {
        &self.profile
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn target(&self) -> Option<EntityId> {
        self.target
    }

    pub fn state_changes(&self) -> u64 {
        self.state_changes
    }

    pub fn tick(
        &mut self,
        me: &AgentSelf,
        store: &EntityStore,
        level: &Level,
        now_ms: u64,
        dt_ms: u64,
        rng: &mut Rng,
    ) -> AgentDecision {
        self.refresh_target(me, store);
        let target_position = self
            .target
            .and_then(|id| store.get(id))
            .map(|entity| entity.position);
        let distance = target_position.map(|position| position.distance(me.position));

        let state = classify(
            self.profile.policy,
            distance,
            self.profile.detection_range,
            self.profile.attack_range,
            self.profile.retreat_range,
        );
        if state != self.state {
            self.state_changes += 1;
        }
        self.state = state;

        let heading = match (state, target_position) {
            (AgentState::Wandering, _) | (_, None) => self.wander_heading(me, now_ms, rng),
            (AgentState::Retreating, Some(target)) => me.position - target,
            (_, Some(target)) => target - me.position,
        };
        let speed = self.profile.speed_for(state);

        let (velocity, keep_vertical, jump) = match &self.profile.locomotion {
            Locomotion::Floating => (heading.normalize_or_zero() * speed, false, false),
            Locomotion::Grounded(grounded) => {
                let direction = if heading.x.abs() > self.profile.arrival_epsilon {
                    heading.x.signum()
                } else {
                    0.0
                };
                let wants_jump = self.wants_jump(
                    grounded,
                    me,
                    direction,
                    target_position.filter(|_| state != AgentState::Wandering),
                    level,
                    now_ms,
                    rng,
                );
                let jumped = self.jump.step(me.grounded, wants_jump, dt_ms, &grounded.jump);
                if jumped {
                    self.last_jump_ms = Some(now_ms);
                }
                (Vec2::new(direction * speed, 0.0), true, jumped)
            }
        };

        let mut fire_at = None;
        if state == AgentState::Attacking {
            if let Some(target) = target_position {
                let ready = self.last_fire_ms.map_or(true, |last| {
                    now_ms.saturating_sub(last) >= self.profile.fire_interval_ms()
                });
                if ready {
                    self.last_fire_ms = Some(now_ms);
                    fire_at = Some(target);
                }
            }
        }

        AgentDecision {
            state,
            velocity,
            keep_vertical,
            jump,
            fire_at,
        }
    }

    fn refresh_target(&mut self, me: &AgentSelf, store: &EntityStore) {
        let hostile = me.faction.hostile_targets();
        let still_valid = self.target.is_some_and(|id| {
            store
                .get(id)
                .is_some_and(|entity| entity.is_alive() && hostile.contains(&entity.faction))
        });
        if still_valid && !self.profile.retarget_every_tick {
            return;
        }
        let found = store
            .nearest(
                me.position,
                Some(me.id),
                self.profile.detection_range,
                |entity| hostile.contains(&entity.faction),
            )
            .map(|(id, _)| id);
        self.target = found;
    }

    fn wander_heading(&mut self, me: &AgentSelf, now_ms: u64, rng: &mut Rng) -> Vec2 {
        let due = now_ms.saturating_sub(self.last_direction_change_ms)
            >= self.profile.change_direction_ms;
        let arrived = self.wander_point().distance(me.position) <= self.profile.arrival_epsilon;
        if due || arrived {
            self.reroll_wander(now_ms, rng);
        }
        self.wander_point() - me.position
    }

    fn wander_point(&self) -> Vec2 {
        self.spawn_origin + self.wander_offset
    }

    fn reroll_wander(&mut self, now_ms: u64, rng: &mut Rng) {
        let radius = self.profile.wander_radius.max(0.0);
        self.wander_offset = match self.profile.locomotion {
            Locomotion::Floating => rng.inside_unit_circle() * radius,
            Locomotion::Grounded(_) => Vec2::new(rng.range_f32(-radius, radius), 0.0),
        };
        self.last_direction_change_ms = now_ms;
    }

    #[allow(clippy::too_many_arguments)]
    fn wants_jump(
        &self,
        grounded: &GroundedLocomotion,
        me: &AgentSelf,
        direction: f32,
        chase_target: Option<Vec2>,
        level: &Level,
        now_ms: u64,
        rng: &mut Rng,
    ) -> bool {
        if !me.grounded {
            return false;
        }
        let rested = self
            .last_jump_ms
            .map_or(true, |last| now_ms.saturating_sub(last) >= grounded.jump_cooldown_ms);
        if !rested {
            return false;
        }
        if direction != 0.0 {
            let ahead = Vec2::new(me.position.x + direction * grounded.look_ahead, me.position.y);
            if !level.ground_below(ahead, grounded.probe_depth) {
                return true;
            }
        }
        if chase_target.is_some_and(|target| target.y - me.position.y > grounded.climb_threshold) {
            return true;
        }
        rng.bool(grounded.random_jump_chance)
    }
}
