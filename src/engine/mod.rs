use tracing::{debug, info, warn};

use crate::agent::{AgentSelf, AgentWeapon, Locomotion};
use crate::audio::{AudioService, AudioSink};
use crate::boundary::{SceneBoundary, SceneLog};
use crate::combat::CombatResolver;
use crate::config::GameSettings;
use crate::constants::CUE_HUMAN_DROWN;
use crate::entity::{Controller, EntityStore};
use crate::error::ConfigError;
use crate::health::runtime_events;
use crate::locomotion::integrate_body;
use crate::phase::PhaseController;
use crate::player::{drive, Autopilot};
use crate::possession::PossessionController;
use crate::rng::Rng;
use crate::spawn::SpawnDirector;
use crate::types::{
    EntityId, EntityKind, Faction, GameOverReason, GamePhase, GameSummary, InputSnapshot,
    RuntimeEvent, Snapshot, Vec2,
};
use crate::world::{generate_level, Camera, Level};

mod phase_system;
mod spawn_system;
mod utils;

use self::utils::{bodies_touch, facing_direction};

#[derive(Clone, Debug, Default)]
struct RunStats {
    spirits_spawned: u32,
    spirits_banished: u32,
    waves: u32,
    possessions: u32,
    shots_fired: u32,
}

#[derive(Clone, Debug, Default)]
pub struct GameEngineOptions {
    /// Drive the player body with the built-in autopilot whenever no
    /// external input is set.
    pub autopilot: bool,
    /// Real-time cap for the whole run.
    pub time_limit_ms: Option<u64>,
}

pub struct GameEngine {
    pub settings: GameSettings,
    pub level: Level,
    pub seed: u32,

    rng: Rng,
    entities: EntityStore,
    combat: CombatResolver,
    phase: PhaseController,
    possession: PossessionController,
    spawner: SpawnDirector,
    audio: AudioService,
    scene: Box<dyn SceneBoundary + Send>,
    camera: Camera,
    controlled: Option<EntityId>,
    input: Option<InputSnapshot>,
    autopilot: Option<Autopilot>,
    events: Vec<RuntimeEvent>,
    stats: RunStats,

    tick_counter: u64,
    now_ms: u64,
    real_ms: u64,
    time_limit_ms: Option<u64>,
    ended: bool,
    end_reason: Option<GameOverReason>,
    last_sailor_position: Vec2,
    sailor_down: bool,
    battle_spawning_over: bool,
}

impl GameEngine {
    pub fn new(
        settings: GameSettings,
        seed: u32,
        options: GameEngineOptions,
    ) -> Result<Self, ConfigError> {
        Self::with_scene(settings, seed, options, Box::new(SceneLog::default()))
    }

    /// Validates the settings, generates the level and spawns the sailor.
    pub fn with_scene(
        settings: GameSettings,
        seed: u32,
        options: GameEngineOptions,
        scene: Box<dyn SceneBoundary + Send>,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let level = generate_level(&settings.world, seed);
        let camera = Camera::new(level.sailor_spawn, settings.world.camera_half_extents);

        let mut engine = Self {
            rng: Rng::new(seed),
            entities: EntityStore::new(),
            combat: CombatResolver::new(),
            phase: PhaseController::new(settings.phase.clone(), GamePhase::Fishing),
            possession: PossessionController::new(settings.possession.clone()),
            spawner: SpawnDirector::new(settings.spawn.clone()),
            audio: AudioService::new(settings.audio.clone()),
            scene,
            camera,
            controlled: None,
            input: None,
            autopilot: options.autopilot.then(Autopilot::default),
            events: Vec::new(),
            stats: RunStats::default(),
            tick_counter: 0,
            now_ms: 0,
            real_ms: 0,
            time_limit_ms: options.time_limit_ms,
            ended: false,
            end_reason: None,
            last_sailor_position: level.sailor_spawn,
            sailor_down: false,
            battle_spawning_over: false,
            settings,
            level,
            seed,
        };

        let sailor = engine.spawn_sailor(engine.level.sailor_spawn);
        engine.controlled = Some(sailor);
        engine.phase.start(&mut engine.audio, engine.scene.as_mut());
        info!(seed, "run started");
        Ok(engine)
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn end_reason(&self) -> Option<GameOverReason> {
        self.end_reason
    }

    pub fn current_phase(&self) -> GamePhase {
        self.phase.current()
    }

    pub fn controlled(&self) -> Option<EntityId> {
        self.controlled
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    pub fn tick(&self) -> u64 {
        self.tick_counter
    }

    /// External input for the controlled body. `None` hands control back
    /// to the autopilot (or to an idle body when it is disabled).
    pub fn set_input(&mut self, input: Option<InputSnapshot>) {
        self.input = input.map(InputSnapshot::clamped);
    }

    pub fn step(&mut self, dt_ms: u64) {
        if self.ended {
            return;
        }
        self.tick_counter += 1;
        self.real_ms = self.real_ms.saturating_add(dt_ms);

        let world_dt = self.phase.world_dt(dt_ms);
        self.phase
            .advance(dt_ms, world_dt, &mut self.audio, self.scene.as_mut());
        self.apply_phase_entries();
        self.audio.advance(dt_ms);

        if world_dt > 0 {
            self.now_ms = self.now_ms.saturating_add(world_dt);
            self.update_controlled(world_dt);
            self.update_agents(world_dt);
            self.integrate_bodies(world_dt);
            self.apply_contact_damage();
            let combat_events = self.combat.step(
                world_dt,
                self.now_ms,
                &mut self.entities,
                &self.level,
                &mut self.audio,
            );
            self.events.extend(combat_events);
            self.check_water();
            if !self.ended {
                self.handle_deaths();
            }
            if !self.ended {
                self.update_phase_timers();
                self.update_spawning(world_dt);
                self.apply_phase_entries();
            }
        }

        if let Some(position) = self
            .controlled
            .and_then(|id| self.entities.get(id))
            .map(|entity| entity.position)
        {
            self.camera.follow(position);
        }
        self.refresh_possession_target();
        self.events.extend(self.phase.drain_events());

        if let Some(limit) = self.time_limit_ms {
            if !self.ended && self.real_ms >= limit {
                self.end_run(GameOverReason::TimeLimit);
            }
        }
    }

    pub fn build_snapshot(&mut self, include_events: bool) -> Snapshot {
        Snapshot {
            tick: self.tick_counter,
            now_ms: self.now_ms,
            real_ms: self.real_ms,
            phase: self.phase.view(),
            entities: self.entities.iter().map(|entity| entity.view()).collect(),
            projectiles: self
                .combat
                .projectiles()
                .iter()
                .map(|projectile| projectile.view())
                .collect(),
            events: if include_events {
                std::mem::take(&mut self.events)
            } else {
                Vec::new()
            },
            cues: if include_events {
                self.audio.drain_cues()
            } else {
                Vec::new()
            },
            possession_target: self.possession.nearby(),
        }
    }

    pub fn build_summary(&self) -> GameSummary {
        GameSummary {
            reason: self.end_reason,
            duration_ms: self.now_ms,
            real_duration_ms: self.real_ms,
            final_phase: self.phase.current(),
            phases: self.phase.history().to_vec(),
            spirits_spawned: self.stats.spirits_spawned,
            spirits_banished: self.stats.spirits_banished,
            waves: self.stats.waves,
            possessions: self.stats.possessions,
            shots_fired: self.stats.shots_fired,
        }
    }

    fn update_controlled(&mut self, dt_ms: u64) {
        let Some(id) = self.controlled else {
            return;
        };
        let input = match (self.input, &self.autopilot) {
            (Some(input), _) => input,
            (None, Some(autopilot)) => match self.entities.get(id) {
                Some(entity) => autopilot.input(
                    entity,
                    &self.entities,
                    &self.level,
                    self.possession.settings().range,
                ),
                None => return,
            },
            (None, None) => InputSnapshot::default(),
        };

        let now_ms = self.now_ms;
        let Some(entity) = self.entities.get_mut(id) else {
            return;
        };
        if !entity.is_alive() {
            return;
        }
        let command = drive(entity, &input, &self.settings.player.jump, now_ms, dt_ms);
        if command.keep_vertical {
            entity.velocity.x = command.velocity.x;
        } else {
            entity.velocity = command.velocity;
        }
        if command.jump {
            entity.velocity.y = self.settings.player.jump.jump_force;
        }
        let kind = entity.kind;

        if let Some(aim) = command.fire {
            let weapon = match kind {
                EntityKind::SpiritForm => {
                    AgentWeapon::Single(self.settings.player.spirit_bolt.clone())
                }
                _ => AgentWeapon::Spread(self.settings.player.shotgun.clone()),
            };
            self.fire(id, &weapon, aim);
        }

        if command.interact && kind == EntityKind::SpiritForm {
            let possessed = self.possession.try_possess(
                id,
                &mut self.entities,
                &mut self.phase,
                &mut self.audio,
                self.scene.as_mut(),
            );
            if possessed {
                self.on_possessed();
            }
        }
    }

    fn update_agents(&mut self, dt_ms: u64) {
        for id in self.entities.ids() {
            let Some(entity) = self.entities.get_mut(id) else {
                continue;
            };
            if !entity.is_alive() || !matches!(entity.controller, Controller::Agent(_)) {
                continue;
            }
            let Controller::Agent(mut brain) =
                std::mem::replace(&mut entity.controller, Controller::Inert)
            else {
                continue;
            };
            let me = AgentSelf {
                id,
                faction: entity.faction,
                position: entity.position,
                grounded: entity.grounded,
            };
            let decision = brain.tick(
                &me,
                &self.entities,
                &self.level,
                self.now_ms,
                dt_ms,
                &mut self.rng,
            );
            let jump_force = match &brain.profile().locomotion {
                Locomotion::Grounded(grounded) => grounded.jump.jump_force,
                Locomotion::Floating => 0.0,
            };
            let weapon = decision
                .fire_at
                .and_then(|_| brain.profile().weapon.clone());

            let Some(entity) = self.entities.get_mut(id) else {
                continue;
            };
            entity.controller = Controller::Agent(brain);
            if decision.keep_vertical {
                entity.velocity.x = decision.velocity.x;
            } else {
                entity.velocity = decision.velocity;
            }
            if decision.jump {
                entity.velocity.y = jump_force;
            }
            if decision.velocity.x > 0.0 {
                entity.facing_right = true;
            } else if decision.velocity.x < 0.0 {
                entity.facing_right = false;
            }

            if let (Some(target), Some(weapon)) = (decision.fire_at, weapon) {
                let aim = (target - me.position)
                    .normalized()
                    .unwrap_or(facing_direction(entity.facing_right));
                self.fire(id, &weapon, aim);
            }
        }
    }

    fn fire(&mut self, shooter: EntityId, weapon: &AgentWeapon, aim: Vec2) {
        let Some(entity) = self.entities.get_mut(shooter) else {
            return;
        };
        let (origin, faction) = (entity.position, entity.faction);
        let outcome = match weapon {
            AgentWeapon::Single(single) => {
                let spec = single.shot(origin, aim, Some(shooter), faction);
                self.combat
                    .fire_projectile(spec)
                    .map(|_| single.cue.as_str())
            }
            AgentWeapon::Spread(spread) => {
                let spec = spread.pellet.shot(origin, aim, Some(shooter), faction);
                self.combat
                    .fire_spread(
                        spec,
                        spread.pellet_count,
                        spread.spread_deg,
                        spread.recoil_force,
                        &mut entity.velocity,
                        &mut self.rng,
                    )
                    .map(|_| spread.pellet.cue.as_str())
            }
        };
        match outcome {
            Ok(cue) => {
                self.audio.play(cue);
                self.stats.shots_fired += 1;
            }
            Err(error) => warn!(shooter = %shooter, %error, "shot rejected"),
        }
    }

    fn integrate_bodies(&mut self, dt_ms: u64) {
        for entity in self.entities.iter_mut() {
            if !entity.is_alive() {
                continue;
            }
            let step = integrate_body(
                entity.position,
                entity.velocity,
                entity.half_extents(),
                entity.gravity,
                dt_ms,
                &self.level,
            );
            entity.position = step.position;
            entity.velocity = step.velocity;
            let probed = entity.velocity.y <= 0.0
                && entity
                    .ground_probe
                    .is_some_and(|probe| probe.touches(&self.level, entity.position));
            entity.grounded = entity.gravity && (step.grounded || probed);
        }
    }

    /// Hostile spirits hurt whatever they overlap, through the usual
    /// invulnerability window.
    fn apply_contact_damage(&mut self) {
        let damage = self.settings.contact_damage;
        if damage <= 0.0 {
            return;
        }
        let spirits: Vec<(Vec2, f32)> = self
            .entities
            .iter()
            .filter(|entity| {
                entity.hostile && entity.faction == Faction::Spirit && entity.is_alive()
            })
            .map(|entity| (entity.position, entity.radius))
            .collect();
        if spirits.is_empty() {
            return;
        }
        for entity in self.entities.iter_mut() {
            if !entity.is_alive() || !Faction::Spirit.can_damage(entity.faction) {
                continue;
            }
            let touched = spirits.iter().any(|(position, radius)| {
                bodies_touch(*position, *radius, entity.position, entity.radius)
            });
            if !touched {
                continue;
            }
            let health_events = entity
                .health
                .take_damage(damage, self.now_ms, &mut self.audio);
            self.events.extend(runtime_events(
                entity.id,
                entity.kind,
                &entity.health,
                &health_events,
            ));
        }
    }

    /// Gravity bodies whose centre enters water drown on the spot. The
    /// player's sailor drowning ends the run.
    fn check_water(&mut self) {
        let drowned: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|entity| {
                entity.gravity && entity.is_alive() && self.level.in_water(entity.position)
            })
            .map(|entity| entity.id)
            .collect();
        for id in drowned {
            self.events.push(RuntimeEvent::Drowned { entity_id: id });
            if Some(id) == self.controlled {
                self.audio.play(CUE_HUMAN_DROWN);
                self.scene.restart_world();
                self.end_run(GameOverReason::Drowned);
                return;
            }
            if let Some(entity) = self.entities.remove(id) {
                debug!(entity = %id, kind = entity.kind.key(), "drowned");
            }
        }
    }

    fn handle_deaths(&mut self) {
        let dead: Vec<(EntityId, EntityKind, Vec2, bool)> = self
            .entities
            .iter()
            .filter(|entity| entity.health.is_dead() && !entity.death_handled)
            .map(|entity| (entity.id, entity.kind, entity.position, entity.hostile))
            .collect();
        for (id, kind, position, hostile) in dead {
            if let Some(entity) = self.entities.get_mut(id) {
                entity.death_handled = true;
                if entity.persist_on_death {
                    entity.controller = Controller::Inert;
                    entity.velocity = Vec2::ZERO;
                }
            }
            let controlled = Some(id) == self.controlled;
            if hostile {
                self.stats.spirits_banished += 1;
            }
            if controlled {
                self.controlled = None;
                match kind {
                    EntityKind::SpiritForm => {
                        self.scene.restart_world();
                        self.end_run(GameOverReason::Banished);
                        return;
                    }
                    _ => {
                        self.last_sailor_position = position;
                        self.sailor_down = true;
                    }
                }
            }
        }
        self.entities.purge(|entity| {
            entity.health.is_dead() && entity.death_handled && !entity.persist_on_death
        });
    }

    fn end_run(&mut self, reason: GameOverReason) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.end_reason = Some(reason);
        info!(
            reason = ?reason,
            real_ms = self.real_ms,
            phase = self.phase.current().key(),
            "run ended"
        );
    }

    fn refresh_possession_target(&mut self) {
        let form = self
            .controlled
            .filter(|id| {
                self.entities
                    .get(*id)
                    .is_some_and(|entity| entity.kind == EntityKind::SpiritForm)
            });
        match form {
            Some(id) if self.phase.current() == self.possession.settings().permitted_phase => {
                self.possession.refresh(&self.entities, id);
            }
            _ => self.possession.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::boundary::SceneBoundary;
    use crate::config::GameSettings;
    use crate::constants::TICK_MS;
    use crate::engine::{GameEngine, GameEngineOptions};
    use crate::spawn::SpawnInterval;
    use crate::types::{
        EntityId, EntityKind, GameOverReason, GamePhase, InputSnapshot, RuntimeEvent, Vec2,
    };

    #[derive(Clone, Default)]
    struct SharedScene(Arc<Mutex<Vec<String>>>);

    impl SceneBoundary for SharedScene {
        fn restart_world(&mut self) {
            self.0.lock().expect("scene log").push("restart".to_string());
        }

        fn load_phase_scene(&mut self, name: &str) {
            self.0.lock().expect("scene log").push(name.to_string());
        }
    }

    /// No spawning and a short fishing phase.
    fn quiet_settings() -> GameSettings {
        let mut settings = GameSettings::default();
        settings.phase.fishing_duration_ms = 100;
        settings.spawn.phases.clear();
        settings
    }

    fn manual(settings: GameSettings, seed: u32) -> GameEngine {
        GameEngine::new(
            settings,
            seed,
            GameEngineOptions {
                autopilot: false,
                time_limit_ms: None,
            },
        )
        .expect("valid settings")
    }

    fn run_ticks(engine: &mut GameEngine, ticks: usize) {
        for _ in 0..ticks {
            engine.step(TICK_MS);
        }
    }

    fn run_until_phase(engine: &mut GameEngine, phase: GamePhase, max_ticks: usize) {
        for _ in 0..max_ticks {
            if engine.current_phase() == phase && !engine.phase.is_locked() {
                return;
            }
            engine.step(TICK_MS);
        }
        panic!(
            "phase {:?} not reached, stuck in {:?}",
            phase,
            engine.current_phase()
        );
    }

    fn kill(engine: &mut GameEngine, id: EntityId) {
        let now = engine.now_ms;
        let entity = engine.entities.get_mut(id).expect("entity to kill");
        entity.health.take_damage(1_000.0, now, &mut engine.audio);
    }

    fn drown_sailor_into_undead(engine: &mut GameEngine) {
        run_until_phase(engine, GamePhase::Battle, 200);
        let sailor = engine.controlled().expect("sailor");
        kill(engine, sailor);
        engine.step(TICK_MS);
        assert_eq!(engine.current_phase(), GamePhase::Drowning);
        run_until_phase(engine, GamePhase::Undead, 100);
    }

    fn bot_id(engine: &GameEngine) -> EntityId {
        engine
            .entities
            .iter()
            .find(|entity| entity.kind == EntityKind::Bot)
            .map(|entity| entity.id)
            .expect("undead bot")
    }

    #[test]
    fn same_seed_produces_same_progression() {
        let mut settings = GameSettings::default();
        settings.phase.fishing_duration_ms = 1_000;
        settings.phase.battle_duration_ms = 20_000;
        let options = GameEngineOptions {
            autopilot: true,
            time_limit_ms: None,
        };
        let mut a = GameEngine::new(settings.clone(), 424_242, options.clone()).expect("engine a");
        let mut b = GameEngine::new(settings, 424_242, options).expect("engine b");

        for _ in 0..1_200 {
            a.step(TICK_MS);
            b.step(TICK_MS);
        }

        let sa = serde_json::to_string(&a.build_snapshot(true)).expect("snapshot a");
        let sb = serde_json::to_string(&b.build_snapshot(true)).expect("snapshot b");
        assert_eq!(sa, sb);
        let ya = serde_json::to_string(&a.build_summary()).expect("summary a");
        let yb = serde_json::to_string(&b.build_summary()).expect("summary b");
        assert_eq!(ya, yb);
        assert!(a.build_summary().spirits_spawned > 0);
    }

    #[test]
    fn battle_entry_pauses_world_but_not_real_time() {
        let mut engine = manual(quiet_settings(), 7);
        run_ticks(&mut engine, 2);
        assert_eq!(engine.current_phase(), GamePhase::Battle);
        assert!(engine.phase.is_locked());
        let world_before = engine.now_ms;
        let real_before = engine.real_ms;
        run_ticks(&mut engine, 20);
        assert_eq!(engine.now_ms, world_before);
        assert_eq!(engine.real_ms, real_before + 20 * TICK_MS);
        run_ticks(&mut engine, 21);
        assert!(!engine.phase.is_locked());
        assert!(engine.now_ms > world_before);
    }

    #[test]
    fn battle_waves_respect_max_alive() {
        let mut settings = quiet_settings();
        settings.spawn.phases = vec![GamePhase::Battle];
        settings.spawn.interval = SpawnInterval::Fixed { every_ms: 1_000 };
        settings.spawn.wave_size = 3;
        settings.spawn.max_alive = 4;
        let mut engine = manual(settings, 99);
        run_until_phase(&mut engine, GamePhase::Battle, 200);
        run_ticks(&mut engine, 1);
        assert_eq!(engine.entities.count_hostiles(), 3);
        run_ticks(&mut engine, 50);
        assert_eq!(engine.entities.count_hostiles(), 4);
        run_ticks(&mut engine, 40);
        assert_eq!(engine.entities.count_hostiles(), 4);
        let summary = engine.build_summary();
        assert_eq!(summary.spirits_spawned, 4);
        assert_eq!(summary.waves, 2);
    }

    #[test]
    fn shotgun_fires_once_per_cooldown() {
        let mut settings = GameSettings::default();
        settings.spawn.phases.clear();
        let mut engine = manual(settings, 3);
        let sailor = engine.controlled().expect("sailor");
        let position = engine.entities.get(sailor).expect("sailor body").position;
        engine.set_input(Some(InputSnapshot {
            fire_pressed: true,
            pointer_world_position: position + Vec2::new(5.0, 0.0),
            ..InputSnapshot::default()
        }));
        engine.step(TICK_MS);
        assert_eq!(engine.combat.len(), 5);
        assert_eq!(engine.build_summary().shots_fired, 1);
        run_ticks(&mut engine, 5);
        assert_eq!(engine.build_summary().shots_fired, 1);
        run_ticks(&mut engine, 5);
        assert_eq!(engine.build_summary().shots_fired, 2);
    }

    #[test]
    fn sailor_death_drowns_into_undead_with_spirit_form_and_bot() {
        let mut engine = manual(quiet_settings(), 11);
        drown_sailor_into_undead(&mut engine);

        let form = engine.controlled().expect("spirit form");
        let body = engine.entities.get(form).expect("spirit form body");
        assert_eq!(body.kind, EntityKind::SpiritForm);
        assert!(body.is_player_controlled());
        let bot = engine.entities.get(bot_id(&engine)).expect("bot");
        assert!(bot.possessable);
        assert!(!engine
            .entities
            .iter()
            .any(|entity| entity.kind == EntityKind::Sailor));
    }

    #[test]
    fn possession_hands_control_to_the_bot_and_returns_to_fishing() {
        let mut engine = manual(quiet_settings(), 12);
        drown_sailor_into_undead(&mut engine);
        let form = engine.controlled().expect("spirit form");
        let bot = bot_id(&engine);
        let bot_position = engine.entities.get(bot).expect("bot").position;
        engine.entities.get_mut(form).expect("form").position = bot_position + Vec2::new(1.0, 0.5);

        engine.set_input(Some(InputSnapshot {
            interact_pressed: true,
            ..InputSnapshot::default()
        }));
        engine.step(TICK_MS);
        assert_eq!(engine.current_phase(), GamePhase::Possessing);
        assert_eq!(engine.controlled(), Some(bot));
        assert!(!engine.entities.contains(form));
        let events = engine.build_snapshot(true).events;
        assert!(events.iter().any(|event| matches!(
            event,
            RuntimeEvent::Possessed {
                spirit_id,
                target_id,
            } if *spirit_id == form && *target_id == bot
        )));

        engine.set_input(None);
        run_until_phase(&mut engine, GamePhase::Fishing, 100);
        let body = engine.entities.get(bot).expect("possessed body");
        assert_eq!(body.kind, EntityKind::Sailor);
        assert!(body.is_player_controlled());
        assert_eq!(engine.build_summary().possessions, 1);
    }

    #[test]
    fn possession_out_of_range_changes_nothing() {
        let mut engine = manual(quiet_settings(), 13);
        drown_sailor_into_undead(&mut engine);
        let form = engine.controlled().expect("spirit form");
        let bot = bot_id(&engine);
        let bot_position = engine.entities.get(bot).expect("bot").position;
        engine.entities.get_mut(form).expect("form").position = bot_position + Vec2::new(0.0, 9.0);
        engine.set_input(Some(InputSnapshot {
            interact_pressed: true,
            ..InputSnapshot::default()
        }));
        engine.step(TICK_MS);
        assert_eq!(engine.current_phase(), GamePhase::Undead);
        assert_eq!(engine.controlled(), Some(form));
        assert_eq!(engine.build_summary().possessions, 0);
    }

    #[test]
    fn spirit_form_death_banishes_and_restarts_world() {
        let scene = SharedScene::default();
        let mut engine = GameEngine::with_scene(
            quiet_settings(),
            14,
            GameEngineOptions::default(),
            Box::new(scene.clone()),
        )
        .expect("engine");
        drown_sailor_into_undead(&mut engine);
        let form = engine.controlled().expect("spirit form");
        kill(&mut engine, form);
        engine.step(TICK_MS);
        assert!(engine.is_ended());
        assert_eq!(engine.end_reason(), Some(GameOverReason::Banished));
        let log = scene.0.lock().expect("scene log").clone();
        assert_eq!(log.first().map(String::as_str), Some("fishing"));
        assert!(log.contains(&"undead".to_string()));
        assert_eq!(log.last().map(String::as_str), Some("restart"));
    }

    #[test]
    fn sailor_in_water_ends_the_run() {
        let mut engine = manual(quiet_settings(), 15);
        let water = engine.level.water.first().copied().expect("level has a gap");
        let sailor = engine.controlled().expect("sailor");
        engine.entities.get_mut(sailor).expect("sailor").position = water.center();
        engine.step(TICK_MS);
        assert!(engine.is_ended());
        assert_eq!(engine.end_reason(), Some(GameOverReason::Drowned));
        let snapshot = engine.build_snapshot(true);
        assert!(snapshot
            .events
            .iter()
            .any(|event| matches!(
                event,
                RuntimeEvent::Drowned { entity_id } if *entity_id == sailor
            )));
        assert!(snapshot.cues.iter().any(|cue| cue.name == "human drown"));
    }

    #[test]
    fn undead_timeout_restores_a_sailor() {
        let mut settings = quiet_settings();
        settings.phase.undead_duration_ms = 500;
        let mut engine = manual(settings, 16);
        drown_sailor_into_undead(&mut engine);
        let form = engine.controlled().expect("spirit form");
        run_until_phase(&mut engine, GamePhase::Fishing, 40);
        let sailor = engine.controlled().expect("restored sailor");
        assert_ne!(sailor, form);
        assert_eq!(
            engine.entities.get(sailor).map(|entity| entity.kind),
            Some(EntityKind::Sailor)
        );
        assert!(!engine
            .entities
            .iter()
            .any(|entity| matches!(entity.kind, EntityKind::Bot | EntityKind::SpiritForm)));
    }

    #[test]
    fn build_snapshot_drains_events_when_requested() {
        let mut engine = manual(quiet_settings(), 17);
        run_ticks(&mut engine, 3);
        let peek = engine.build_snapshot(false);
        assert!(peek.events.is_empty());
        let first = engine.build_snapshot(true);
        assert!(first
            .events
            .iter()
            .any(|event| matches!(
                event,
                RuntimeEvent::PhaseChanged {
                    to: GamePhase::Battle,
                    ..
                }
            )));
        let second = engine.build_snapshot(true);
        assert!(second.events.is_empty());
    }

    #[test]
    fn time_limit_ends_the_run() {
        let mut engine = GameEngine::new(
            quiet_settings(),
            18,
            GameEngineOptions {
                autopilot: true,
                time_limit_ms: Some(1_000),
            },
        )
        .expect("engine");
        run_ticks(&mut engine, 19);
        assert!(!engine.is_ended());
        engine.step(TICK_MS);
        assert!(engine.is_ended());
        assert_eq!(engine.end_reason(), Some(GameOverReason::TimeLimit));
        let tick = engine.tick();
        engine.step(TICK_MS);
        assert_eq!(engine.tick(), tick);
    }

    #[test]
    fn invalid_settings_are_refused() {
        let mut settings = GameSettings::default();
        settings.spirit.attack_range = 20.0;
        assert!(GameEngine::new(settings, 1, GameEngineOptions::default()).is_err());
    }

    #[test]
    fn persisting_bodies_stay_dead_in_the_store() {
        let mut settings = quiet_settings();
        settings.bot_body.persist_on_death = true;
        let mut engine = manual(settings, 12);
        let bot = engine.spawn_bot(Vec2::new(12.0, 3.0)).expect("bot");
        let spirit = engine.spawn_spirit(Vec2::new(14.0, 5.0)).expect("spirit");

        kill(&mut engine, bot);
        kill(&mut engine, spirit);
        engine.handle_deaths();

        assert!(!engine.entities.contains(spirit));
        assert_eq!(engine.stats.spirits_banished, 1);
        let husk = engine.entities.get(bot).expect("persisting bot");
        assert!(husk.health.is_dead());
        assert!(husk.agent_state().is_none());
        assert!(engine
            .entities
            .nearest(Vec2::new(12.0, 3.0), None, 50.0, |entity| entity.id == bot)
            .is_none());

        engine.handle_deaths();
        assert!(engine.entities.contains(bot));
        assert_eq!(engine.stats.spirits_banished, 1);
    }
}
