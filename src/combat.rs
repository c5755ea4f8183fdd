use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::AudioSink;
use crate::constants::{
    CUE_PROJECTILE_HIT, CUE_SHOTGUN, CUE_SPIRIT_ATTACK, MUZZLE_OFFSET, PELLET_DAMAGE,
    PELLET_LIFETIME_MS, PELLET_SPEED, PROJECTILE_RADIUS, RECOIL_FORCE, SHOTGUN_PELLETS,
    SHOTGUN_SPREAD_DEG, SPIRIT_BOLT_DAMAGE, SPIRIT_BOLT_KNOCKBACK, SPIRIT_BOLT_LIFETIME_MS,
    SPIRIT_BOLT_SPEED,
};
use crate::entity::EntityStore;
use crate::error::{CombatError, ConfigError};
use crate::health::runtime_events;
use crate::rng::Rng;
use crate::types::{
    EntityId, Faction, ImpactSurface, ProjectileId, ProjectileKind, ProjectileView,
    RuntimeEvent, Vec2,
};
use crate::world::Level;

/// Single-projectile weapon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectileWeapon {
    pub kind: ProjectileKind,
    pub speed: f32,
    #[serde(rename = "lifetimeMs")]
    pub lifetime_ms: u64,
    pub damage: f32,
    pub knockback: f32,
    #[serde(rename = "muzzleOffset")]
    pub muzzle_offset: f32,
    pub cue: String,
}

impl Default for ProjectileWeapon {
    fn default() -> Self {
        Self {
            kind: ProjectileKind::SpiritBolt,
            speed: SPIRIT_BOLT_SPEED,
            lifetime_ms: SPIRIT_BOLT_LIFETIME_MS,
            damage: SPIRIT_BOLT_DAMAGE,
            knockback: SPIRIT_BOLT_KNOCKBACK,
            muzzle_offset: MUZZLE_OFFSET,
            cue: CUE_SPIRIT_ATTACK.to_string(),
        }
    }
}

impl ProjectileWeapon {
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(ConfigError::non_positive(&format!("{name}.speed"), self.speed));
        }
        if self.lifetime_ms == 0 {
            return Err(ConfigError::Zero {
                field: format!("{name}.lifetimeMs"),
            });
        }
        if !(self.damage.is_finite() && self.damage >= 0.0) {
            return Err(ConfigError::non_positive(&format!("{name}.damage"), self.damage));
        }
        Ok(())
    }

    pub fn shot(
        &self,
        origin: Vec2,
        aim: Vec2,
        owner: Option<EntityId>,
        faction: Faction,
    ) -> ShotSpec {
        let direction = aim.normalize_or_zero();
        ShotSpec {
            origin: origin + direction * self.muzzle_offset,
            direction,
            speed: self.speed,
            lifetime_ms: self.lifetime_ms,
            damage: self.damage,
            knockback: self.knockback,
            kind: self.kind,
            owner,
            owner_faction: faction,
        }
    }
}

/// Fan of pellets fired as one shot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpreadWeapon {
    pub pellet: ProjectileWeapon,
    #[serde(rename = "pelletCount")]
    pub pellet_count: u32,
    #[serde(rename = "spreadDeg")]
    pub spread_deg: f32,
    #[serde(rename = "recoilForce")]
    pub recoil_force: f32,
}

impl Default for SpreadWeapon {
    fn default() -> Self {
        Self {
            pellet: ProjectileWeapon {
                kind: ProjectileKind::Pellet,
                speed: PELLET_SPEED,
                lifetime_ms: PELLET_LIFETIME_MS,
                damage: PELLET_DAMAGE,
                knockback: 0.0,
                muzzle_offset: MUZZLE_OFFSET,
                cue: CUE_SHOTGUN.to_string(),
            },
            pellet_count: SHOTGUN_PELLETS,
            spread_deg: SHOTGUN_SPREAD_DEG,
            recoil_force: RECOIL_FORCE,
        }
    }
}

impl SpreadWeapon {
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        self.pellet.validate(&format!("{name}.pellet"))?;
        if self.pellet_count == 0 {
            return Err(ConfigError::Zero {
                field: format!("{name}.pelletCount"),
            });
        }
        if !(self.spread_deg.is_finite() && self.spread_deg >= 0.0) {
            return Err(ConfigError::non_positive(
                &format!("{name}.spreadDeg"),
                self.spread_deg,
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ShotSpec {
    pub origin: Vec2,
    pub direction: Vec2,
    pub speed: f32,
    pub lifetime_ms: u64,
    pub damage: f32,
    pub knockback: f32,
    pub kind: ProjectileKind,
    pub owner: Option<EntityId>,
    pub owner_faction: Faction,
}

impl ShotSpec {
    fn checked_direction(&self) -> Result<Vec2, CombatError> {
        if !self.origin.is_finite() {
            return Err(CombatError::InvalidOrigin(self.origin));
        }
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(CombatError::InvalidSpeed(self.speed));
        }
        if self.lifetime_ms == 0 {
            return Err(CombatError::ZeroLifetime);
        }
        if !(self.damage.is_finite() && self.damage >= 0.0) {
            return Err(CombatError::InvalidDamage(self.damage));
        }
        self.direction
            .normalized()
            .ok_or(CombatError::MissingDirection(self.direction))
    }
}

#[derive(Clone, Debug)]
pub struct Projectile {
    pub id: ProjectileId,
    pub kind: ProjectileKind,
    pub owner: Option<EntityId>,
    pub owner_faction: Faction,
    pub position: Vec2,
    pub velocity: Vec2,
    pub damage: f32,
    pub knockback: f32,
    pub remaining_ms: u64,
    pub radius: f32,
    has_hit: bool,
}

impl Projectile {
    pub fn has_hit(&self) -> bool {
        self.has_hit
    }

    pub fn view(&self) -> ProjectileView {
        ProjectileView {
            id: self.id,
            kind: self.kind,
            owner: self.owner_faction,
            x: self.position.x,
            y: self.position.y,
            velocity: self.velocity,
        }
    }
}

enum Impact {
    Entity(EntityId),
    Terrain,
}

/// Owns every projectile in flight and resolves their hits each tick.
#[derive(Clone, Debug, Default)]
pub struct CombatResolver {
    projectiles: Vec<Projectile>,
    next_id: u64,
    pending_events: Vec<RuntimeEvent>,
}

impl CombatResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    pub fn len(&self) -> usize {
        self.projectiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projectiles.is_empty()
    }

    pub fn fire_projectile(&mut self, spec: ShotSpec) -> Result<ProjectileId, CombatError> {
        let direction = spec.checked_direction()?;
        Ok(self.launch(&spec, direction))
    }

    /// Fires `pellet_count` projectiles, each perturbed uniformly within
    /// `±spread_deg` of the aim, and pushes `recoil_target` against the aim.
    pub fn fire_spread(
        &mut self,
        spec: ShotSpec,
        pellet_count: u32,
        spread_deg: f32,
        recoil_force: f32,
        recoil_target: &mut Vec2,
        rng: &mut Rng,
    ) -> Result<Vec<ProjectileId>, CombatError> {
        let direction = spec.checked_direction()?;
        let base_angle = direction.angle_deg();
        let spread = if spread_deg.is_finite() { spread_deg.abs() } else { 0.0 };
        let ids = (0..pellet_count)
            .map(|_| {
                let angle = base_angle + rng.range_f32(-spread, spread);
                self.launch(&spec, Vec2::from_angle_deg(angle))
            })
            .collect();
        if recoil_force.is_finite() {
            *recoil_target += -direction * recoil_force;
        }
        Ok(ids)
    }

    fn launch(&mut self, spec: &ShotSpec, direction: Vec2) -> ProjectileId {
        self.next_id += 1;
        let id = ProjectileId(self.next_id);
        self.projectiles.push(Projectile {
            id,
            kind: spec.kind,
            owner: spec.owner,
            owner_faction: spec.owner_faction,
            position: spec.origin,
            velocity: direction * spec.speed,
            damage: spec.damage,
            knockback: spec.knockback,
            remaining_ms: spec.lifetime_ms,
            radius: PROJECTILE_RADIUS,
            has_hit: false,
        });
        self.pending_events.push(RuntimeEvent::ProjectileFired {
            projectile_id: id,
            kind: spec.kind,
            owner: spec.owner_faction,
        });
        id
    }

    /// Drops every projectile in flight, silently.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.projectiles.len();
        self.projectiles.clear();
        count
    }

    pub fn cancel_faction(&mut self, faction: Faction) -> usize {
        let before = self.projectiles.len();
        self.projectiles
            .retain(|projectile| projectile.owner_faction != faction);
        before - self.projectiles.len()
    }

    /// Advances projectiles by `dt_ms` of world time.
    ///
    /// Order: opposing projectiles annihilate first, then each survivor
    /// takes its earliest contact along its swept path (entity or terrain),
    /// then anything whose lifetime ran out is removed without a cue.
    pub fn step(
        &mut self,
        dt_ms: u64,
        now_ms: u64,
        entities: &mut EntityStore,
        level: &Level,
        audio: &mut dyn AudioSink,
    ) -> Vec<RuntimeEvent> {
        let mut events = std::mem::take(&mut self.pending_events);
        if dt_ms == 0 {
            return events;
        }
        let dt = dt_ms as f32 / 1000.0;

        self.resolve_projectile_clashes(dt, audio, &mut events);

        for index in 0..self.projectiles.len() {
            if self.projectiles[index].has_hit {
                continue;
            }
            let (from, to) = {
                let projectile = &self.projectiles[index];
                (projectile.position, projectile.position + projectile.velocity * dt)
            };
            let impact = earliest_impact(&self.projectiles[index], from, to, entities, level);
            let projectile = &mut self.projectiles[index];
            match impact {
                Some((t, Impact::Entity(entity_id))) => {
                    projectile.has_hit = true;
                    projectile.position = from + (to - from) * t;
                    let mut applied = false;
                    if let Some(entity) = entities.get_mut(entity_id) {
                        let health_events =
                            entity.health.take_damage(projectile.damage, now_ms, audio);
                        applied = !health_events.is_empty();
                        if projectile.knockback > 0.0 {
                            let push = projectile.velocity.normalize_or_zero();
                            entity.velocity += push * projectile.knockback;
                        }
                        events.push(RuntimeEvent::ProjectileHit {
                            projectile_id: projectile.id,
                            entity_id,
                            applied,
                        });
                        events.extend(runtime_events(
                            entity_id,
                            entity.kind,
                            &entity.health,
                            &health_events,
                        ));
                    }
                    debug!(projectile = projectile.id.0, %entity_id, applied, "projectile hit");
                }
                Some((t, Impact::Terrain)) => {
                    projectile.has_hit = true;
                    projectile.position = from + (to - from) * t;
                    audio.play(CUE_PROJECTILE_HIT);
                    events.push(RuntimeEvent::ProjectileImpact {
                        projectile_id: projectile.id,
                        surface: ImpactSurface::Terrain,
                    });
                }
                None => {
                    projectile.position = to;
                    projectile.remaining_ms = projectile.remaining_ms.saturating_sub(dt_ms);
                }
            }
        }

        self.projectiles
            .retain(|projectile| !projectile.has_hit && projectile.remaining_ms > 0);
        events
    }

    fn resolve_projectile_clashes(
        &mut self,
        dt: f32,
        audio: &mut dyn AudioSink,
        events: &mut Vec<RuntimeEvent>,
    ) {
        for a in 0..self.projectiles.len() {
            for b in (a + 1)..self.projectiles.len() {
                let (first, second) = (&self.projectiles[a], &self.projectiles[b]);
                if first.has_hit || second.has_hit || !first.kind.opposes(second.kind) {
                    continue;
                }
                let offset = first.position - second.position;
                let relative = (first.velocity - second.velocity) * dt;
                if !swept_within(offset, relative, first.radius + second.radius) {
                    continue;
                }
                for index in [a, b] {
                    let projectile = &mut self.projectiles[index];
                    projectile.has_hit = true;
                    events.push(RuntimeEvent::ProjectileImpact {
                        projectile_id: projectile.id,
                        surface: ImpactSurface::Projectile,
                    });
                }
                audio.play(CUE_PROJECTILE_HIT);
            }
        }
    }
}

fn earliest_impact(
    projectile: &Projectile,
    from: Vec2,
    to: Vec2,
    entities: &EntityStore,
    level: &Level,
) -> Option<(f32, Impact)> {
    let mut best: Option<(f32, Impact)> = None;
    for entity in entities.iter() {
        if Some(entity.id) == projectile.owner
            || entity.health.is_dead()
            || !projectile.owner_faction.can_damage(entity.faction)
        {
            continue;
        }
        let reach = entity.radius + projectile.radius;
        if let Some(t) = segment_circle_hit(from, to, entity.position, reach) {
            // Strict comparison keeps the lowest id on ties.
            if best.as_ref().map_or(true, |(best_t, _)| t < *best_t) {
                best = Some((t, Impact::Entity(entity.id)));
            }
        }
    }
    if let Some(t) = level.first_solid_hit(from, to) {
        if best.as_ref().map_or(true, |(best_t, _)| t < *best_t) {
            best = Some((t, Impact::Terrain));
        }
    }
    best
}

/// Entry fraction of segment `from -> to` into a circle.
pub fn segment_circle_hit(from: Vec2, to: Vec2, center: Vec2, radius: f32) -> Option<f32> {
    let f = from - center;
    if f.length() <= radius {
        return Some(0.0);
    }
    let d = to - from;
    let a = d.dot(d);
    if a <= f32::EPSILON {
        return None;
    }
    let b = 2.0 * f.dot(d);
    let c = f.dot(f) - radius * radius;
    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return None;
    }
    let t = (-b - discriminant.sqrt()) / (2.0 * a);
    (0.0..=1.0).contains(&t).then_some(t)
}

/// Whether `offset + relative * t` comes within `radius` for some t in [0, 1].
fn swept_within(offset: Vec2, relative: Vec2, radius: f32) -> bool {
    let a = relative.dot(relative);
    let t = if a <= f32::EPSILON {
        0.0
    } else {
        (-offset.dot(relative) / a).clamp(0.0, 1.0)
    };
    (offset + relative * t).length() <= radius
}
