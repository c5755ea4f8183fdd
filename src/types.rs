use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };
    pub const RIGHT: Self = Self { x: 1.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        self.x.hypot(self.y)
    }

    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Unit vector in the same direction, or `None` for zero / non-finite input.
    pub fn normalized(self) -> Option<Self> {
        let len = self.length();
        if !len.is_finite() || len <= f32::EPSILON {
            return None;
        }
        Some(self * (1.0 / len))
    }

    pub fn normalize_or_zero(self) -> Self {
        self.normalized().unwrap_or(Self::ZERO)
    }

    pub fn angle_deg(self) -> f32 {
        self.y.atan2(self.x).to_degrees()
    }

    pub fn from_angle_deg(degrees: f32) -> Self {
        let radians = degrees.to_radians();
        Self::new(radians.cos(), radians.sin())
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Vec2 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity_{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectileId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Faction {
    Player,
    Bot,
    Spirit,
    Environment,
}

impl Faction {
    /// Whether a projectile owned by `self` may damage an entity of `target`.
    pub fn can_damage(self, target: Faction) -> bool {
        matches!(
            (self, target),
            (Faction::Player, Faction::Spirit)
                | (Faction::Bot, Faction::Spirit)
                | (Faction::Spirit, Faction::Player)
                | (Faction::Spirit, Faction::Bot)
        )
    }

    /// Factions an agent of this faction hunts.
    pub fn hostile_targets(self) -> &'static [Faction] {
        match self {
            Faction::Player | Faction::Bot => &[Faction::Spirit],
            Faction::Spirit => &[Faction::Player, Faction::Bot],
            Faction::Environment => &[],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Sailor,
    SpiritForm,
    Spirit,
    Bot,
}

impl EntityKind {
    pub fn key(self) -> &'static str {
        match self {
            EntityKind::Sailor => "sailor",
            EntityKind::SpiritForm => "spirit_form",
            EntityKind::Spirit => "spirit",
            EntityKind::Bot => "bot",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Wandering,
    Chasing,
    Attacking,
    Retreating,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectileKind {
    Pellet,
    SpiritBolt,
}

impl ProjectileKind {
    pub fn opposes(self, other: ProjectileKind) -> bool {
        self != other
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Fishing,
    Battle,
    Drowning,
    Undead,
    Possessing,
}

impl GamePhase {
    pub fn key(self) -> &'static str {
        match self {
            GamePhase::Fishing => "fishing",
            GamePhase::Battle => "battle",
            GamePhase::Drowning => "drowning",
            GamePhase::Undead => "undead",
            GamePhase::Possessing => "possessing",
        }
    }

    pub fn is_transitional(self) -> bool {
        matches!(self, GamePhase::Drowning | GamePhase::Possessing)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOverReason {
    Drowned,
    Banished,
    TimeLimit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactSurface {
    Terrain,
    Projectile,
}

/// Per-tick input snapshot for the player-controlled entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSnapshot {
    #[serde(rename = "horizontal")]
    pub horizontal_axis: f32,
    #[serde(rename = "vertical")]
    pub vertical_axis: f32,
    #[serde(rename = "jump")]
    pub jump_pressed: bool,
    #[serde(rename = "fire")]
    pub fire_pressed: bool,
    #[serde(rename = "interact")]
    pub interact_pressed: bool,
    #[serde(rename = "pointer")]
    pub pointer_world_position: Vec2,
}

impl InputSnapshot {
    pub fn clamped(mut self) -> Self {
        self.horizontal_axis = clamp_axis(self.horizontal_axis);
        self.vertical_axis = clamp_axis(self.vertical_axis);
        if !self.pointer_world_position.is_finite() {
            self.pointer_world_position = Vec2::ZERO;
        }
        self
    }
}

fn clamp_axis(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct EntityView {
    pub id: EntityId,
    pub kind: EntityKind,
    pub faction: Faction,
    pub x: f32,
    pub y: f32,
    pub speed: Vec2,
    pub grounded: bool,
    #[serde(rename = "facingRight")]
    pub facing_right: bool,
    pub health: f32,
    #[serde(rename = "maxHealth")]
    pub max_health: f32,
    #[serde(rename = "agentState")]
    pub agent_state: Option<AgentState>,
    pub controlled: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProjectileView {
    pub id: ProjectileId,
    pub kind: ProjectileKind,
    pub owner: Faction,
    pub x: f32,
    pub y: f32,
    pub velocity: Vec2,
}

#[derive(Clone, Debug, Serialize)]
pub struct PhaseView {
    pub phase: GamePhase,
    pub locked: bool,
    #[serde(rename = "timeScale")]
    pub time_scale: f32,
    #[serde(rename = "phaseElapsedMs")]
    pub phase_elapsed_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CueView {
    pub name: String,
    pub volume: f32,
    pub voice: Option<usize>,
    pub music: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    Damaged {
        #[serde(rename = "entityId")]
        entity_id: EntityId,
        amount: f32,
        ratio: f32,
    },
    Healed {
        #[serde(rename = "entityId")]
        entity_id: EntityId,
        amount: f32,
        ratio: f32,
    },
    Died {
        #[serde(rename = "entityId")]
        entity_id: EntityId,
        kind: EntityKind,
    },
    ProjectileFired {
        #[serde(rename = "projectileId")]
        projectile_id: ProjectileId,
        kind: ProjectileKind,
        owner: Faction,
    },
    ProjectileHit {
        #[serde(rename = "projectileId")]
        projectile_id: ProjectileId,
        #[serde(rename = "entityId")]
        entity_id: EntityId,
        applied: bool,
    },
    ProjectileImpact {
        #[serde(rename = "projectileId")]
        projectile_id: ProjectileId,
        surface: ImpactSurface,
    },
    ProjectilesCancelled {
        count: usize,
    },
    PhaseChanged {
        from: GamePhase,
        to: GamePhase,
    },
    PhaseChangeRejected {
        requested: GamePhase,
        current: GamePhase,
    },
    Possessed {
        #[serde(rename = "spiritId")]
        spirit_id: EntityId,
        #[serde(rename = "targetId")]
        target_id: EntityId,
    },
    WaveSpawned {
        kind: EntityKind,
        requested: usize,
        spawned: usize,
    },
    Drowned {
        #[serde(rename = "entityId")]
        entity_id: EntityId,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    #[serde(rename = "nowMs")]
    pub now_ms: u64,
    #[serde(rename = "realMs")]
    pub real_ms: u64,
    pub phase: PhaseView,
    pub entities: Vec<EntityView>,
    pub projectiles: Vec<ProjectileView>,
    pub events: Vec<RuntimeEvent>,
    pub cues: Vec<CueView>,
    #[serde(rename = "possessionTarget")]
    pub possession_target: Option<EntityId>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PhaseVisit {
    pub phase: GamePhase,
    #[serde(rename = "atMs")]
    pub at_ms: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct GameSummary {
    pub reason: Option<GameOverReason>,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    #[serde(rename = "realDurationMs")]
    pub real_duration_ms: u64,
    #[serde(rename = "finalPhase")]
    pub final_phase: GamePhase,
    pub phases: Vec<PhaseVisit>,
    #[serde(rename = "spiritsSpawned")]
    pub spirits_spawned: u32,
    #[serde(rename = "spiritsBanished")]
    pub spirits_banished: u32,
    pub waves: u32,
    pub possessions: u32,
    #[serde(rename = "shotsFired")]
    pub shots_fired: u32,
}
