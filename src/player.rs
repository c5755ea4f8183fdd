use serde::{Deserialize, Serialize};

use crate::combat::{ProjectileWeapon, SpreadWeapon};
use crate::constants::SPIRIT_FORM_BOLT_SPEED;
use crate::entity::{Entity, EntityStore};
use crate::locomotion::JumpSettings;
use crate::types::{EntityId, EntityKind, Faction, InputSnapshot, ProjectileKind, Vec2};
use crate::world::Level;

/// Weapons and jump tuning for whatever body the player is driving.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerLoadout {
    pub shotgun: SpreadWeapon,
    #[serde(rename = "spiritBolt")]
    pub spirit_bolt: ProjectileWeapon,
    pub jump: JumpSettings,
}

impl Default for PlayerLoadout {
    fn default() -> Self {
        Self {
            shotgun: SpreadWeapon::default(),
            spirit_bolt: ProjectileWeapon {
                kind: ProjectileKind::SpiritBolt,
                speed: SPIRIT_FORM_BOLT_SPEED,
                knockback: 0.0,
                ..ProjectileWeapon::default()
            },
            jump: JumpSettings::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerCommand {
    pub velocity: Vec2,
    pub keep_vertical: bool,
    pub jump: bool,
    /// Aim direction of a shot that passed its cooldown this tick.
    pub fire: Option<Vec2>,
    pub interact: bool,
}

/// Turns one input snapshot into intent for the controlled body.
pub fn drive(
    entity: &mut Entity,
    input: &InputSnapshot,
    jump: &JumpSettings,
    now_ms: u64,
    dt_ms: u64,
) -> PlayerCommand {
    let input = input.clamped();
    if input.horizontal_axis > 0.0 {
        entity.facing_right = true;
    } else if input.horizontal_axis < 0.0 {
        entity.facing_right = false;
    }

    let (velocity, keep_vertical, jumped) = if entity.gravity {
        let jumped = entity
            .jump
            .step(entity.grounded, input.jump_pressed, dt_ms, jump);
        (
            Vec2::new(input.horizontal_axis * entity.move_speed, 0.0),
            true,
            jumped,
        )
    } else {
        let mut axes = Vec2::new(input.horizontal_axis, input.vertical_axis);
        if axes.length() > 1.0 {
            axes = axes.normalize_or_zero();
        }
        (axes * entity.move_speed, false, false)
    };

    let mut fire = None;
    if input.fire_pressed && entity.fire_ready(now_ms) {
        let facing = if entity.facing_right {
            Vec2::RIGHT
        } else {
            -Vec2::RIGHT
        };
        let aim = (input.pointer_world_position - entity.position)
            .normalized()
            .unwrap_or(facing);
        entity.last_fire_ms = Some(now_ms);
        fire = Some(aim);
    }

    PlayerCommand {
        velocity,
        keep_vertical,
        jump: jumped,
        fire,
        interact: input.interact_pressed,
    }
}

/// Deterministic stand-in for a human when no input arrives.
#[derive(Clone, Debug)]
pub struct Autopilot {
    pub engage_range: f32,
    pub preferred_min: f32,
    pub preferred_max: f32,
}

impl Default for Autopilot {
    fn default() -> Self {
        Self {
            engage_range: 10.0,
            preferred_min: 3.0,
            preferred_max: 6.0,
        }
    }
}

impl Autopilot {
    pub fn input(
        &self,
        controlled: &Entity,
        store: &EntityStore,
        level: &Level,
        possession_range: f32,
    ) -> InputSnapshot {
        let position = controlled.position;
        let nearest_spirit = store.nearest(position, Some(controlled.id), f32::INFINITY, |entity| {
            entity.faction == Faction::Spirit
        });
        match controlled.kind {
            EntityKind::SpiritForm => {
                self.spirit_form_input(controlled, store, nearest_spirit, possession_range)
            }
            _ => self.sailor_input(controlled, store, level, nearest_spirit),
        }
    }

    fn sailor_input(
        &self,
        controlled: &Entity,
        store: &EntityStore,
        level: &Level,
        nearest_spirit: Option<(EntityId, f32)>,
    ) -> InputSnapshot {
        let mut input = InputSnapshot::default();
        let Some((spirit_id, distance)) = nearest_spirit else {
            return input;
        };
        let Some(spirit) = store.get(spirit_id) else {
            return input;
        };
        let dx = spirit.position.x - controlled.position.x;
        input.pointer_world_position = spirit.position;
        input.fire_pressed = distance <= self.engage_range;
        input.horizontal_axis = if distance > self.preferred_max {
            dx.signum()
        } else if distance < self.preferred_min {
            -dx.signum()
        } else {
            0.0
        };
        if input.horizontal_axis != 0.0 {
            let ahead = controlled.position + Vec2::new(input.horizontal_axis, 0.0);
            if !level.ground_below(ahead, 2.0) {
                input.horizontal_axis = 0.0;
            }
        }
        input
    }

    fn spirit_form_input(
        &self,
        controlled: &Entity,
        store: &EntityStore,
        nearest_spirit: Option<(EntityId, f32)>,
        possession_range: f32,
    ) -> InputSnapshot {
        let mut input = InputSnapshot::default();
        let host = store.nearest(controlled.position, Some(controlled.id), f32::INFINITY, |entity| {
            entity.possessable
        });
        if let Some((host_id, distance)) = host {
            if let Some(host) = store.get(host_id) {
                let heading = (host.position - controlled.position).normalize_or_zero();
                input.horizontal_axis = heading.x;
                input.vertical_axis = heading.y;
                input.pointer_world_position = host.position;
                input.interact_pressed = distance <= possession_range;
            }
        }
        if let Some((spirit_id, distance)) = nearest_spirit {
            if distance <= self.engage_range {
                if let Some(spirit) = store.get(spirit_id) {
                    input.pointer_world_position = spirit.position;
                    input.fire_pressed = true;
                }
            }
        }
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::BodySettings;

    fn insert(
        store: &mut EntityStore,
        kind: EntityKind,
        faction: Faction,
        position: Vec2,
    ) -> EntityId {
        let id = store.allocate_id();
        store.insert(Entity::new(id, kind, faction, position, &BodySettings::for_kind(kind)));
        id
    }

    #[test]
    fn sailor_fire_respects_cooldown() {
        let mut store = EntityStore::new();
        let id = insert(&mut store, EntityKind::Sailor, Faction::Player, Vec2::new(0.0, 0.5));
        let sailor = store.get_mut(id).expect("sailor");
        let jump = JumpSettings::default();
        let input = InputSnapshot {
            fire_pressed: true,
            pointer_world_position: Vec2::new(5.0, 0.5),
            ..InputSnapshot::default()
        };
        let mut shots = 0;
        for tick in 0..20u64 {
            if drive(sailor, &input, &jump, tick * 50, 50).fire.is_some() {
                shots += 1;
            }
        }
        // 0, 500 ms
        assert_eq!(shots, 2);
    }

    #[test]
    fn aim_falls_back_to_facing_when_pointer_is_on_body() {
        let mut store = EntityStore::new();
        let id = insert(&mut store, EntityKind::Sailor, Faction::Player, Vec2::new(2.0, 0.5));
        let sailor = store.get_mut(id).expect("sailor");
        let input = InputSnapshot {
            horizontal_axis: -1.0,
            fire_pressed: true,
            pointer_world_position: Vec2::new(2.0, 0.5),
            ..InputSnapshot::default()
        };
        let command = drive(sailor, &input, &JumpSettings::default(), 0, 50);
        assert_eq!(command.fire, Some(Vec2::new(-1.0, 0.0)));
        assert!(command.keep_vertical);
        assert_eq!(command.velocity.x, -sailor.move_speed);
    }

    #[test]
    fn spirit_form_moves_freely() {
        let mut store = EntityStore::new();
        let id = insert(&mut store, EntityKind::SpiritForm, Faction::Player, Vec2::new(0.0, 3.0));
        let form = store.get_mut(id).expect("form");
        let input = InputSnapshot {
            horizontal_axis: 1.0,
            vertical_axis: 1.0,
            interact_pressed: true,
            ..InputSnapshot::default()
        };
        let command = drive(form, &input, &JumpSettings::default(), 0, 50);
        assert!(!command.keep_vertical);
        assert!((command.velocity.length() - form.move_speed).abs() < 1e-4);
        assert!(command.interact);
    }

    #[test]
    fn autopilot_engages_and_stops_at_edges() {
        let mut store = EntityStore::new();
        let level = Level::flat(10.0);
        let sailor = insert(&mut store, EntityKind::Sailor, Faction::Player, Vec2::new(9.6, 0.5));
        insert(&mut store, EntityKind::Spirit, Faction::Spirit, Vec2::new(18.0, 3.0));
        let autopilot = Autopilot::default();
        let input = autopilot.input(store.get(sailor).expect("sailor"), &store, &level, 3.0);
        assert!(input.fire_pressed);
        assert_eq!(input.horizontal_axis, 0.0);
        assert_eq!(input.pointer_world_position, Vec2::new(18.0, 3.0));
    }

    #[test]
    fn autopilot_spirit_form_seeks_host() {
        let mut store = EntityStore::new();
        let level = Level::flat(30.0);
        let form = insert(&mut store, EntityKind::SpiritForm, Faction::Player, Vec2::new(2.0, 2.0));
        let bot = insert(&mut store, EntityKind::Bot, Faction::Bot, Vec2::new(4.0, 2.0));
        if let Some(entity) = store.get_mut(bot) {
            entity.possessable = true;
        }
        let input = Autopilot::default().input(store.get(form).expect("form"), &store, &level, 3.0);
        assert!(input.interact_pressed);
        assert!(input.horizontal_axis > 0.99);
        assert!(!input.fire_pressed);
    }
}
