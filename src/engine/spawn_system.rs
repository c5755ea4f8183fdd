use tracing::{debug, warn};

use super::utils::spawn_blocked;
use super::*;
use crate::agent::{AgentBehaviorProfile, AgentBrain};
use crate::constants::CUE_SPIRIT_SPAWN;
use crate::entity::Entity;
use crate::spawn::SpawnRegion;

impl GameEngine {
    fn make_body(&mut self, kind: EntityKind, faction: Faction, position: Vec2) -> Entity {
        let id = self.entities.allocate_id();
        Entity::new(id, kind, faction, position, self.settings.body(kind))
    }

    pub(super) fn spawn_sailor(&mut self, position: Vec2) -> EntityId {
        let mut sailor = self.make_body(EntityKind::Sailor, Faction::Player, position);
        sailor.controller = Controller::Player;
        let id = sailor.id;
        self.entities.insert(sailor);
        id
    }

    pub(super) fn spawn_spirit_form(&mut self, position: Vec2) -> EntityId {
        let mut form = self.make_body(EntityKind::SpiritForm, Faction::Player, position);
        form.controller = Controller::Player;
        let id = form.id;
        self.entities.insert(form);
        id
    }

    /// Agents whose profile does not validate are refused and never enter
    /// the store.
    fn spawn_agent(
        &mut self,
        kind: EntityKind,
        faction: Faction,
        position: Vec2,
        profile: AgentBehaviorProfile,
    ) -> Option<EntityId> {
        let brain = match AgentBrain::new(profile, position, self.now_ms, &mut self.rng) {
            Ok(brain) => brain,
            Err(error) => {
                warn!(kind = kind.key(), %error, "agent refused");
                return None;
            }
        };
        let mut body = self.make_body(kind, faction, position);
        body.controller = Controller::Agent(Box::new(brain));
        let id = body.id;
        self.entities.insert(body);
        Some(id)
    }

    pub(super) fn spawn_bot(&mut self, position: Vec2) -> Option<EntityId> {
        let profile = self.settings.bot.clone();
        let id = self.spawn_agent(EntityKind::Bot, Faction::Bot, position, profile)?;
        if let Some(bot) = self.entities.get_mut(id) {
            bot.possessable = true;
        }
        Some(id)
    }

    pub(super) fn spawn_spirit(&mut self, position: Vec2) -> Option<EntityId> {
        let profile = self.settings.spirit.clone();
        let id = self.spawn_agent(EntityKind::Spirit, Faction::Spirit, position, profile)?;
        if let Some(spirit) = self.entities.get_mut(id) {
            spirit.hostile = true;
        }
        self.audio.play(CUE_SPIRIT_SPAWN);
        Some(id)
    }

    /// Dispatches to the factory of an agent kind; player bodies are never
    /// spawned this way.
    fn spawn_kind(&mut self, kind: EntityKind, position: Vec2) -> Option<EntityId> {
        match kind {
            EntityKind::Spirit => self.spawn_spirit(position),
            EntityKind::Bot => self.spawn_bot(position),
            EntityKind::Sailor | EntityKind::SpiritForm => {
                warn!(kind = kind.key(), "not a wave kind");
                None
            }
        }
    }

    pub(super) fn update_spawning(&mut self, dt_ms: u64) {
        let waves = self.spawner.advance(dt_ms, &mut self.rng);
        if waves == 0 {
            return;
        }
        let settings = self.spawner.settings();
        let (kind, count) = (settings.kind, settings.wave_size);
        let region = settings.area.resolve(&self.camera);
        for _ in 0..waves {
            self.spawn_wave(kind, count, &region);
        }
    }

    /// One wave of `kind` agents inside `region`, capped by how many of that
    /// kind are already alive.
    pub(super) fn spawn_wave(&mut self, kind: EntityKind, count: usize, region: &SpawnRegion) {
        let max_alive = self.spawner.settings().max_alive;
        let alive = self.entities.count_alive(kind);
        let requested = count.min(max_alive.saturating_sub(alive));
        if requested == 0 {
            debug!(
                kind = kind.key(),
                alive,
                max_alive,
                "wave skipped at capacity"
            );
            return;
        }

        let radius = self.settings.body(kind).radius;
        let level = &self.level;
        let plan = self
            .spawner
            .plan_wave(requested, region, &mut self.rng, |point| {
                spawn_blocked(level, point, radius)
            });

        let mut spawned = 0;
        for position in plan.positions {
            if self.spawn_kind(kind, position).is_some() {
                spawned += 1;
            }
        }
        self.stats.waves += 1;
        if kind == EntityKind::Spirit {
            self.stats.spirits_spawned += spawned as u32;
        }
        self.events.push(RuntimeEvent::WaveSpawned {
            kind,
            requested,
            spawned,
        });
        debug!(
            kind = kind.key(),
            requested,
            spawned,
            skipped = plan.skipped,
            alive = self.entities.count_alive(kind),
            phase = self.phase.current().key(),
            "wave spawned"
        );
    }
}
