use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audio::AudioSink;
use crate::boundary::SceneBoundary;
use crate::constants::{CUE_POSSESSION, POSSESSION_RANGE};
use crate::entity::{Controller, EntityStore};
use crate::error::ConfigError;
use crate::phase::PhaseController;
use crate::types::{EntityId, EntityKind, Faction, GamePhase, Vec2};

/// Where the freshly possessed body ends up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PossessionSnap {
    /// Moves the body onto the spirit form, unchecked against terrain.
    Teleport,
    Stay,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PossessionSettings {
    pub range: f32,
    pub snap: PossessionSnap,
    #[serde(rename = "permittedPhase")]
    pub permitted_phase: GamePhase,
}

impl Default for PossessionSettings {
    fn default() -> Self {
        Self {
            range: POSSESSION_RANGE,
            snap: PossessionSnap::Teleport,
            permitted_phase: GamePhase::Undead,
        }
    }
}

impl PossessionSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.range.is_finite() && self.range > 0.0) {
            return Err(ConfigError::non_positive("possession.range", self.range));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Possession {
    pub spirit_id: EntityId,
    pub target_id: EntityId,
}

#[derive(Clone, Debug)]
pub struct PossessionController {
    settings: PossessionSettings,
    nearby: Option<EntityId>,
    last: Option<Possession>,
}

impl PossessionController {
    pub fn new(settings: PossessionSettings) -> Self {
        Self {
            settings,
            nearby: None,
            last: None,
        }
    }

    pub fn settings(&self) -> &PossessionSettings {
        &self.settings
    }

    pub fn nearby(&self) -> Option<EntityId> {
        self.nearby
    }

    pub fn take_last(&mut self) -> Option<Possession> {
        self.last.take()
    }

    /// Re-evaluates the closest possessable body within range of `actor`.
    pub fn refresh(&mut self, store: &EntityStore, actor: EntityId) -> Option<EntityId> {
        self.nearby = store.get(actor).and_then(|spirit| {
            store
                .nearest(spirit.position, Some(actor), self.settings.range, |entity| {
                    entity.possessable
                })
                .map(|(id, _)| id)
        });
        self.nearby
    }

    pub fn clear(&mut self) {
        self.nearby = None;
    }

    /// Hands control from the spirit form `actor` to the nearest possessable
    /// body. Returns false without side effects when out of range, in the
    /// wrong phase, or while the phase controller is locked.
    pub fn try_possess(
        &mut self,
        actor: EntityId,
        store: &mut EntityStore,
        phase: &mut PhaseController,
        audio: &mut dyn AudioSink,
        scene: &mut dyn SceneBoundary,
    ) -> bool {
        if phase.current() != self.settings.permitted_phase || phase.is_locked() {
            return false;
        }
        let Some(target_id) = self.refresh(store, actor) else {
            return false;
        };
        if !phase.request(GamePhase::Possessing, audio, scene) {
            return false;
        }

        let spirit_position = store
            .remove(actor)
            .map(|spirit| spirit.position)
            .unwrap_or(Vec2::ZERO);
        if let Some(target) = store.get_mut(target_id) {
            target.controller = Controller::Player;
            target.kind = EntityKind::Sailor;
            target.faction = Faction::Player;
            target.possessable = false;
            target.hostile = false;
            let max = target.health.max();
            target.health.set_health(max);
            if self.settings.snap == PossessionSnap::Teleport {
                target.position = spirit_position;
                target.velocity = Vec2::ZERO;
            }
        }
        audio.play(CUE_POSSESSION);
        info!(spirit = %actor, target = %target_id, "possessed");
        self.nearby = None;
        self.last = Some(Possession {
            spirit_id: actor,
            target_id,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioService, AudioSettings};
    use crate::boundary::SceneLog;
    use crate::entity::{BodySettings, Entity};
    use crate::phase::PhaseSettings;

    struct Fixture {
        store: EntityStore,
        phase: PhaseController,
        audio: AudioService,
        scene: SceneLog,
        spirit: EntityId,
        bot: EntityId,
    }

    fn fixture(bot_x: f32, phase: GamePhase) -> Fixture {
        let mut store = EntityStore::new();
        let spirit = store.allocate_id();
        store.insert(Entity::new(
            spirit,
            EntityKind::SpiritForm,
            Faction::Player,
            Vec2::new(0.0, 2.0),
            &BodySettings::for_kind(EntityKind::SpiritForm),
        ));
        let bot = store.allocate_id();
        let mut body = Entity::new(
            bot,
            EntityKind::Bot,
            Faction::Bot,
            Vec2::new(bot_x, 0.5),
            &BodySettings::for_kind(EntityKind::Bot),
        );
        body.possessable = true;
        store.insert(body);
        Fixture {
            store,
            phase: PhaseController::new(PhaseSettings::default(), phase),
            audio: AudioService::new(AudioSettings::default()),
            scene: SceneLog::default(),
            spirit,
            bot,
        }
    }

    fn attempt(controller: &mut PossessionController, fx: &mut Fixture) -> bool {
        controller.try_possess(
            fx.spirit,
            &mut fx.store,
            &mut fx.phase,
            &mut fx.audio,
            &mut fx.scene,
        )
    }

    #[test]
    fn out_of_range_fails_without_side_effects() {
        let mut fx = fixture(5.0, GamePhase::Undead);
        let mut controller = PossessionController::new(PossessionSettings::default());
        assert!(!attempt(&mut controller, &mut fx));
        assert_eq!(fx.phase.current(), GamePhase::Undead);
        assert!(fx.store.contains(fx.spirit));
        assert!(fx.phase.take_entered().is_empty());
    }

    #[test]
    fn wrong_phase_fails() {
        let mut fx = fixture(1.0, GamePhase::Battle);
        let mut controller = PossessionController::new(PossessionSettings::default());
        assert!(!attempt(&mut controller, &mut fx));
        assert_eq!(fx.phase.current(), GamePhase::Battle);
    }

    #[test]
    fn success_swaps_control_and_requests_one_transition() {
        let mut fx = fixture(2.0, GamePhase::Undead);
        let mut controller = PossessionController::new(PossessionSettings::default());
        assert!(attempt(&mut controller, &mut fx));
        let entered = fx.phase.take_entered();
        assert_eq!(entered, vec![(GamePhase::Undead, GamePhase::Possessing)]);
        assert!(fx.phase.is_locked());
        assert!(!fx.store.contains(fx.spirit));

        let body = fx.store.get(fx.bot).expect("possessed body");
        assert!(body.is_player_controlled());
        assert_eq!(body.faction, Faction::Player);
        assert_eq!(body.kind, EntityKind::Sailor);
        assert_eq!(body.position, Vec2::new(0.0, 2.0));
        assert_eq!(
            controller.take_last(),
            Some(Possession {
                spirit_id: fx.spirit,
                target_id: fx.bot,
            })
        );
    }

    #[test]
    fn stay_snap_keeps_body_in_place() {
        let mut fx = fixture(2.0, GamePhase::Undead);
        let mut controller = PossessionController::new(PossessionSettings {
            snap: PossessionSnap::Stay,
            ..PossessionSettings::default()
        });
        assert!(attempt(&mut controller, &mut fx));
        let body = fx.store.get(fx.bot).expect("possessed body");
        assert_eq!(body.position, Vec2::new(2.0, 0.5));
    }
}
