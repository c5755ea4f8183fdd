use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::agent::AgentBrain;
use crate::constants::{
    BODY_RADIUS, BOT_MAX_HEALTH, CUE_SPIRIT_HURT, INVULNERABILITY_MS, SAILOR_MAX_HEALTH,
    SAILOR_MOVE_SPEED, SHOTGUN_COOLDOWN_MS, SPIRIT_FORM_COOLDOWN_MS, SPIRIT_FORM_MAX_HEALTH,
    SPIRIT_FORM_MOVE_SPEED, SPIRIT_INVULNERABILITY_MS, SPIRIT_MAX_HEALTH,
};
use crate::error::ConfigError;
use crate::health::{Health, HealthCues};
use crate::locomotion::{GroundProbe, JumpController};
use crate::types::{AgentState, EntityId, EntityKind, EntityView, Faction, Vec2};

/// Per-kind body tunables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodySettings {
    #[serde(rename = "maxHealth")]
    pub max_health: f32,
    #[serde(rename = "invulnerabilityMs")]
    pub invulnerability_ms: u64,
    pub radius: f32,
    pub gravity: bool,
    #[serde(rename = "moveSpeed")]
    pub move_speed: f32,
    #[serde(rename = "fireCooldownMs")]
    pub fire_cooldown_ms: u64,
    /// Dead bodies stay in the world as inert husks instead of being removed.
    #[serde(rename = "persistOnDeath")]
    pub persist_on_death: bool,
    pub cues: HealthCues,
}

impl Default for BodySettings {
    fn default() -> Self {
        Self::for_kind(EntityKind::Sailor)
    }
}

impl BodySettings {
    pub fn for_kind(kind: EntityKind) -> Self {
        let sailor = Self {
            max_health: SAILOR_MAX_HEALTH,
            invulnerability_ms: INVULNERABILITY_MS,
            radius: BODY_RADIUS,
            gravity: true,
            move_speed: SAILOR_MOVE_SPEED,
            fire_cooldown_ms: SHOTGUN_COOLDOWN_MS,
            persist_on_death: false,
            cues: HealthCues::default(),
        };
        let spirit_cues = HealthCues {
            hurt: CUE_SPIRIT_HURT.to_string(),
            ..HealthCues::default()
        };
        match kind {
            EntityKind::Sailor => sailor,
            EntityKind::Bot => Self {
                max_health: BOT_MAX_HEALTH,
                ..sailor
            },
            EntityKind::SpiritForm => Self {
                max_health: SPIRIT_FORM_MAX_HEALTH,
                gravity: false,
                move_speed: SPIRIT_FORM_MOVE_SPEED,
                fire_cooldown_ms: SPIRIT_FORM_COOLDOWN_MS,
                cues: spirit_cues,
                ..sailor
            },
            EntityKind::Spirit => Self {
                max_health: SPIRIT_MAX_HEALTH,
                invulnerability_ms: SPIRIT_INVULNERABILITY_MS,
                gravity: false,
                cues: spirit_cues,
                ..sailor
            },
        }
    }

    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        for (field, value) in [
            ("maxHealth", self.max_health),
            ("radius", self.radius),
            ("moveSpeed", self.move_speed),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::non_positive(&format!("{name}.{field}"), value));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub enum Controller {
    /// Driven by the input snapshot of the current tick.
    Player,
    Agent(Box<AgentBrain>),
    Inert,
}

#[derive(Clone, Debug)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub faction: Faction,
    pub position: Vec2,
    pub velocity: Vec2,
    pub facing_right: bool,
    pub grounded: bool,
    pub health: Health,
    pub radius: f32,
    pub gravity: bool,
    pub move_speed: f32,
    pub fire_cooldown_ms: u64,
    pub controller: Controller,
    pub possessable: bool,
    /// Spawned by the director; purged on phase changes.
    pub hostile: bool,
    pub persist_on_death: bool,
    pub death_handled: bool,
    pub jump: JumpController,
    pub last_fire_ms: Option<u64>,
    pub ground_probe: Option<GroundProbe>,
}

impl Entity {
    pub fn new(
        id: EntityId,
        kind: EntityKind,
        faction: Faction,
        position: Vec2,
        settings: &BodySettings,
    ) -> Self {
        let ground_probe = settings
            .gravity
            .then(|| GroundProbe::below(settings.radius));
        Self {
            id,
            kind,
            faction,
            position,
            velocity: Vec2::ZERO,
            facing_right: true,
            grounded: false,
            health: Health::new(
                settings.max_health,
                settings.invulnerability_ms,
                settings.cues.clone(),
            ),
            radius: settings.radius,
            gravity: settings.gravity,
            move_speed: settings.move_speed,
            fire_cooldown_ms: settings.fire_cooldown_ms,
            controller: Controller::Inert,
            possessable: false,
            hostile: false,
            persist_on_death: settings.persist_on_death,
            death_handled: false,
            jump: JumpController::default(),
            last_fire_ms: None,
            ground_probe,
        }
    }

    pub fn half_extents(&self) -> Vec2 {
        Vec2::new(self.radius, self.radius)
    }

    pub fn is_alive(&self) -> bool {
        self.health.is_alive()
    }

    pub fn is_player_controlled(&self) -> bool {
        matches!(self.controller, Controller::Player)
    }

    pub fn brain(&self) -> Option<&AgentBrain> {
        match &self.controller {
            Controller::Agent(brain) => Some(brain),
            _ => None,
        }
    }

    pub fn agent_state(&self) -> Option<AgentState> {
        self.brain().map(AgentBrain::state)
    }

    /// Cooldown gate for player weapons; the first shot is never gated.
    pub fn fire_ready(&self, now_ms: u64) -> bool {
        self.last_fire_ms
            .map_or(true, |last| now_ms.saturating_sub(last) >= self.fire_cooldown_ms)
    }

    pub fn view(&self) -> EntityView {
        EntityView {
            id: self.id,
            kind: self.kind,
            faction: self.faction,
            x: self.position.x,
            y: self.position.y,
            speed: self.velocity,
            grounded: self.grounded,
            facing_right: self.facing_right,
            health: self.health.current(),
            max_health: self.health.max(),
            agent_state: self.agent_state(),
            controlled: self.is_player_controlled(),
        }
    }
}

/// Every live entity, iterated in ascending id order.
#[derive(Clone, Debug, Default)]
pub struct EntityStore {
    entities: BTreeMap<EntityId, Entity>,
    next_id: u64,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_id(&mut self) -> EntityId {
        self.next_id += 1;
        EntityId(self.next_id)
    }

    pub fn insert(&mut self, entity: Entity) {
        self.entities.insert(entity.id, entity);
    }

    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    pub fn count_alive(&self, kind: EntityKind) -> usize {
        self.iter()
            .filter(|entity| entity.kind == kind && entity.is_alive())
            .count()
    }

    pub fn count_hostiles(&self) -> usize {
        self.iter()
            .filter(|entity| entity.hostile && entity.is_alive())
            .count()
    }

    /// Closest living entity accepted by `filter` within `max_range` of
    /// `from`, skipping `exclude`. Equal distances resolve to the lower id.
    pub fn nearest<F>(
        &self,
        from: Vec2,
        exclude: Option<EntityId>,
        max_range: f32,
        filter: F,
    ) -> Option<(EntityId, f32)>
    where
        F: Fn(&Entity) -> bool,
    {
        let mut best: Option<(EntityId, f32)> = None;
        for entity in self.iter() {
            if Some(entity.id) == exclude || !entity.is_alive() || !filter(entity) {
                continue;
            }
            let distance = entity.position.distance(from);
            if distance > max_range {
                continue;
            }
            if best.map_or(true, |(_, best_distance)| distance < best_distance) {
                best = Some((entity.id, distance));
            }
        }
        best
    }

    /// Removes every entity matching `predicate` and returns their ids.
    pub fn purge<F>(&mut self, predicate: F) -> Vec<EntityId>
    where
        F: Fn(&Entity) -> bool,
    {
        let ids: Vec<EntityId> = self
            .iter()
            .filter(|entity| predicate(entity))
            .map(|entity| entity.id)
            .collect();
        for id in &ids {
            self.entities.remove(id);
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_at(store: &mut EntityStore, kind: EntityKind, faction: Faction, x: f32) -> EntityId {
        let id = store.allocate_id();
        store.insert(Entity::new(
            id,
            kind,
            faction,
            Vec2::new(x, 0.0),
            &BodySettings::for_kind(kind),
        ));
        id
    }

    #[test]
    fn nearest_prefers_lower_id_on_ties() {
        let mut store = EntityStore::new();
        let left = spawn_at(&mut store, EntityKind::Spirit, Faction::Spirit, -2.0);
        let right = spawn_at(&mut store, EntityKind::Spirit, Faction::Spirit, 2.0);
        assert!(left < right);
        let found = store.nearest(Vec2::ZERO, None, 10.0, |_| true);
        assert_eq!(found.map(|(id, _)| id), Some(left));
    }

    #[test]
    fn nearest_respects_range_filter_and_exclusion() {
        let mut store = EntityStore::new();
        let me = spawn_at(&mut store, EntityKind::Bot, Faction::Bot, 0.0);
        let far = spawn_at(&mut store, EntityKind::Spirit, Faction::Spirit, 20.0);
        assert!(store
            .nearest(Vec2::ZERO, Some(me), 10.0, |entity| entity.faction == Faction::Spirit)
            .is_none());
        assert_eq!(
            store
                .nearest(Vec2::ZERO, Some(me), 25.0, |entity| entity.faction == Faction::Spirit)
                .map(|(id, _)| id),
            Some(far)
        );
    }

    #[test]
    fn purge_removes_only_matching_entities() {
        let mut store = EntityStore::new();
        let sailor = spawn_at(&mut store, EntityKind::Sailor, Faction::Player, 0.0);
        let spirit = spawn_at(&mut store, EntityKind::Spirit, Faction::Spirit, 3.0);
        let purged = store.purge(|entity| entity.kind == EntityKind::Spirit);
        assert_eq!(purged, vec![spirit]);
        assert!(store.contains(sailor));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn fire_gate_opens_after_cooldown() {
        let mut store = EntityStore::new();
        let id = spawn_at(&mut store, EntityKind::Sailor, Faction::Player, 0.0);
        let entity = store.get_mut(id).expect("sailor");
        assert!(entity.fire_ready(0));
        entity.last_fire_ms = Some(1_000);
        assert!(!entity.fire_ready(1_499));
        assert!(entity.fire_ready(1_500));
    }
}
