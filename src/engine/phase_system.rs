use tracing::info;

use super::*;
use crate::tasks::TaskOwner;

impl GameEngine {
    /// Requests a phase change and applies its entry side effects at once.
    pub(super) fn request_phase(&mut self, to: GamePhase) -> bool {
        let changed = self.phase.request(to, &mut self.audio, self.scene.as_mut());
        self.apply_phase_entries();
        changed
    }

    /// Runs the side effects of every phase committed since the last call.
    pub(super) fn apply_phase_entries(&mut self) {
        for (from, to) in self.phase.take_entered() {
            self.enter_phase(from, to);
        }
    }

    fn enter_phase(&mut self, from: GamePhase, to: GamePhase) {
        let spawning_phases = self.spawner.settings().phases.clone();
        for owner in spawning_phases {
            if owner != to && self.spawner.stop(TaskOwner::Phase(owner)) {
                info!(phase = owner.key(), "spawn loop stopped");
            }
        }
        if self.spawner.spawns_in(to) {
            self.spawner.start(TaskOwner::Phase(to));
        }

        match to {
            GamePhase::Fishing => {
                self.purge_hostiles();
                let bots = self.entities.purge(|entity| {
                    entity.kind == EntityKind::Bot && !entity.is_player_controlled()
                });
                if !bots.is_empty() {
                    debug!(count = bots.len(), "idle bots removed");
                }
            }
            GamePhase::Battle => {
                self.battle_spawning_over = false;
            }
            GamePhase::Undead => {
                self.purge_hostiles();
                self.setup_undead();
            }
            GamePhase::Drowning | GamePhase::Possessing => {}
        }
        debug!(from = from.key(), to = to.key(), "phase entry applied");
    }

    fn purge_hostiles(&mut self) {
        let purged = self.entities.purge(|entity| entity.hostile);
        let cancelled = self.combat.cancel_faction(Faction::Spirit);
        if cancelled > 0 {
            self.events
                .push(RuntimeEvent::ProjectilesCancelled { count: cancelled });
        }
        if !purged.is_empty() {
            info!(count = purged.len(), cancelled, "hostiles purged");
        }
    }

    /// The player comes back as a spirit form where the sailor fell, and a
    /// bot joins the hunt.
    fn setup_undead(&mut self) {
        if let Some(id) = self.controlled.take() {
            self.entities.remove(id);
        }
        let form = self.spawn_spirit_form(self.last_sailor_position);
        self.controlled = Some(form);
        self.sailor_down = false;
        let bot_spawn = self.level.bot_spawn;
        if self.spawn_bot(bot_spawn).is_none() {
            warn!("undead phase started without a bot");
        }
    }

    /// Phase clocks run on world time; checked once per unpaused tick.
    pub(super) fn update_phase_timers(&mut self) {
        if self.phase.is_locked() {
            return;
        }
        let elapsed = self.phase.elapsed_ms();
        let durations = self.phase.settings().clone();
        let current = self.phase.current();

        if self.sailor_down && !current.is_transitional() && current != GamePhase::Undead {
            if self.request_phase(GamePhase::Drowning) {
                self.sailor_down = false;
            }
            return;
        }

        match current {
            GamePhase::Fishing if elapsed >= durations.fishing_duration_ms => {
                self.request_phase(GamePhase::Battle);
            }
            GamePhase::Battle => {
                if !self.battle_spawning_over && elapsed >= durations.battle_duration_ms {
                    self.battle_spawning_over = true;
                    self.spawner.stop(TaskOwner::Phase(GamePhase::Battle));
                    info!(
                        alive = self.entities.count_hostiles(),
                        "battle spawning over, waiting for the field to clear"
                    );
                }
                if self.battle_spawning_over && self.entities.count_hostiles() == 0 {
                    info!("battle cleared");
                    self.request_phase(GamePhase::Fishing);
                }
            }
            GamePhase::Undead if elapsed >= durations.undead_duration_ms => {
                self.restore_sailor();
                self.request_phase(GamePhase::Fishing);
            }
            _ => {}
        }
    }

    /// Undead ran out without a possession: a fresh sailor replaces the
    /// spirit form.
    fn restore_sailor(&mut self) {
        let position = self
            .controlled
            .take()
            .and_then(|id| self.entities.remove(id))
            .map(|form| form.position)
            .unwrap_or(self.last_sailor_position);
        let sailor = self.spawn_sailor(position);
        self.controlled = Some(sailor);
        info!(sailor = %sailor, "undead expired, sailor restored");
    }

    pub(super) fn on_possessed(&mut self) {
        let Some(possession) = self.possession.take_last() else {
            return;
        };
        self.controlled = Some(possession.target_id);
        self.stats.possessions += 1;
        self.events.push(RuntimeEvent::Possessed {
            spirit_id: possession.spirit_id,
            target_id: possession.target_id,
        });
        self.apply_phase_entries();
    }
}

#[cfg(test)]
mod tests {
    use crate::config::GameSettings;
    use crate::engine::{GameEngine, GameEngineOptions};
    use crate::tasks::TaskOwner;
    use crate::types::{GamePhase, RuntimeEvent, Vec2};

    fn engine() -> GameEngine {
        GameEngine::new(GameSettings::default(), 31, GameEngineOptions::default())
            .expect("engine")
    }

    #[test]
    fn battle_entry_starts_spawn_loop_and_fishing_stops_it() {
        let mut engine = engine();
        assert!(engine.request_phase(GamePhase::Battle));
        assert!(engine.spawner.is_running(TaskOwner::Phase(GamePhase::Battle)));
        engine.phase.advance(2_000, 0, &mut engine.audio, engine.scene.as_mut());
        assert!(engine.request_phase(GamePhase::Fishing));
        assert!(!engine.spawner.is_running(TaskOwner::Phase(GamePhase::Battle)));
    }

    #[test]
    fn fishing_entry_purges_hostiles_and_their_bolts() {
        let mut engine = engine();
        assert!(engine.request_phase(GamePhase::Battle));
        engine.phase.advance(2_000, 0, &mut engine.audio, engine.scene.as_mut());
        let spirit = engine.spawn_spirit(Vec2::new(8.0, 4.0)).expect("spirit");
        let sailor = engine.controlled().expect("sailor");
        let weapon = engine
            .settings
            .spirit
            .weapon
            .clone()
            .expect("spirit weapon");
        engine.fire(spirit, &weapon, Vec2::new(-1.0, 0.0));
        assert_eq!(engine.combat.len(), 1);

        assert!(engine.request_phase(GamePhase::Fishing));
        assert!(!engine.entities.contains(spirit));
        assert!(engine.entities.contains(sailor));
        assert!(engine.combat.is_empty());
        let events = engine.build_snapshot(true).events;
        assert!(events
            .iter()
            .any(|event| matches!(event, RuntimeEvent::ProjectilesCancelled { count: 1 })));
    }

    #[test]
    fn battle_returns_to_fishing_once_cleared_after_duration() {
        let mut settings = GameSettings::default();
        settings.phase.battle_duration_ms = 1_000;
        settings.spawn.phases.clear();
        let mut engine = GameEngine::new(settings, 32, GameEngineOptions::default())
            .expect("engine");
        assert!(engine.request_phase(GamePhase::Battle));
        engine.phase.advance(2_000, 0, &mut engine.audio, engine.scene.as_mut());
        let spirit = engine.spawn_spirit(Vec2::new(30.0, 6.0)).expect("spirit");

        engine.phase.advance(1_000, 1_000, &mut engine.audio, engine.scene.as_mut());
        engine.update_phase_timers();
        assert!(engine.battle_spawning_over);
        assert_eq!(engine.current_phase(), GamePhase::Battle);

        engine.entities.remove(spirit);
        engine.update_phase_timers();
        assert_eq!(engine.current_phase(), GamePhase::Fishing);
    }
}
