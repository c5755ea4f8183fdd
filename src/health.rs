use serde::{Deserialize, Serialize};

use crate::audio::AudioSink;
use crate::constants::{CUE_DEATH, CUE_HEAL, CUE_HUMAN_HURT};
use crate::types::{EntityId, EntityKind, RuntimeEvent};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthCues {
    pub hurt: String,
    pub heal: String,
    pub death: String,
}

impl Default for HealthCues {
    fn default() -> Self {
        Self {
            hurt: CUE_HUMAN_HURT.to_string(),
            heal: CUE_HEAL.to_string(),
            death: CUE_DEATH.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum HealthEvent {
    Damaged { amount: f32 },
    Healed { amount: f32 },
    Changed { ratio: f32 },
    Death,
}

/// Hit points with a hard invulnerability cooldown and one-way death.
///
/// `0 <= current <= max` holds after every call. A failed call (dead,
/// invulnerable, full, or a non-positive amount) returns no events and
/// requests no cue.
#[derive(Clone, Debug)]
pub struct Health {
    current: f32,
    max: f32,
    invulnerability_ms: u64,
    invulnerable_until_ms: u64,
    dead: bool,
    cues: HealthCues,
}

impl Health {
    pub fn new(max: f32, invulnerability_ms: u64, cues: HealthCues) -> Self {
        let max = if max.is_finite() && max > 0.0 { max } else { 1.0 };
        Self {
            current: max,
            max,
            invulnerability_ms,
            invulnerable_until_ms: 0,
            dead: false,
            cues,
        }
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn ratio(&self) -> f32 {
        self.current / self.max
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn is_alive(&self) -> bool {
        !self.dead
    }

    pub fn is_invulnerable(&self, now_ms: u64) -> bool {
        now_ms < self.invulnerable_until_ms
    }

    pub fn take_damage(
        &mut self,
        amount: f32,
        now_ms: u64,
        audio: &mut dyn AudioSink,
    ) -> Vec<HealthEvent> {
        if self.dead || self.is_invulnerable(now_ms) || !(amount.is_finite() && amount > 0.0) {
            return Vec::new();
        }
        let before = self.current;
        self.current = (self.current - amount).max(0.0);
        self.invulnerable_until_ms = now_ms.saturating_add(self.invulnerability_ms);
        audio.play(&self.cues.hurt);

        let mut events = vec![
            HealthEvent::Damaged {
                amount: before - self.current,
            },
            HealthEvent::Changed {
                ratio: self.ratio(),
            },
        ];
        if self.current <= 0.0 {
            self.current = 0.0;
            self.dead = true;
            audio.play(&self.cues.death);
            events.push(HealthEvent::Death);
        }
        events
    }

    pub fn heal(&mut self, amount: f32, audio: &mut dyn AudioSink) -> Vec<HealthEvent> {
        if self.dead || self.current >= self.max || !(amount.is_finite() && amount > 0.0) {
            return Vec::new();
        }
        let before = self.current;
        self.current = (self.current + amount).min(self.max);
        audio.play(&self.cues.heal);
        vec![
            HealthEvent::Healed {
                amount: self.current - before,
            },
            HealthEvent::Changed {
                ratio: self.ratio(),
            },
        ]
    }

    /// Administrative override: clamps, never kills and never starts invulnerability.
    pub fn set_health(&mut self, value: f32) -> Vec<HealthEvent> {
        let value = if value.is_finite() { value } else { 0.0 };
        self.current = value.clamp(0.0, self.max);
        vec![HealthEvent::Changed {
            ratio: self.ratio(),
        }]
    }
}

/// Folds health events into the runtime event stream of one entity.
pub fn runtime_events(
    entity_id: EntityId,
    kind: EntityKind,
    health: &Health,
    events: &[HealthEvent],
) -> Vec<RuntimeEvent> {
    events
        .iter()
        .filter_map(|event| match event {
            HealthEvent::Damaged { amount } => Some(RuntimeEvent::Damaged {
                entity_id,
                amount: *amount,
                ratio: health.ratio(),
            }),
            HealthEvent::Healed { amount } => Some(RuntimeEvent::Healed {
                entity_id,
                amount: *amount,
                ratio: health.ratio(),
            }),
            HealthEvent::Death => Some(RuntimeEvent::Died { entity_id, kind }),
            HealthEvent::Changed { .. } => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioService, AudioSettings};
    use crate::rng::Rng;

    fn make_health(max: f32, invulnerability_ms: u64) -> Health {
        Health::new(max, invulnerability_ms, HealthCues::default())
    }

    fn cue_names(audio: &mut AudioService) -> Vec<String> {
        audio.drain_cues().into_iter().map(|cue| cue.name).collect()
    }

    #[test]
    fn hits_inside_invulnerability_window_apply_once() {
        let mut audio = AudioService::new(AudioSettings::default());
        let mut health = make_health(10.0, 1_000);
        assert!(!health.take_damage(2.0, 5_000, &mut audio).is_empty());
        assert!(health.take_damage(2.0, 5_999, &mut audio).is_empty());
        assert_eq!(health.current(), 8.0);
    }

    #[test]
    fn hits_spaced_by_invulnerability_window_apply_twice() {
        let mut audio = AudioService::new(AudioSettings::default());
        let mut health = make_health(10.0, 1_000);
        health.take_damage(2.0, 5_000, &mut audio);
        assert!(!health.take_damage(2.0, 6_000, &mut audio).is_empty());
        assert_eq!(health.current(), 6.0);
    }

    #[test]
    fn death_is_emitted_once_and_health_never_goes_negative() {
        let mut audio = AudioService::new(AudioSettings::default());
        let mut health = make_health(3.0, 0);
        let mut deaths = 0;
        for step in 0..10u64 {
            let events = health.take_damage(2.0, step * 10, &mut audio);
            deaths += events
                .iter()
                .filter(|event| **event == HealthEvent::Death)
                .count();
            assert!(health.current() >= 0.0);
        }
        assert_eq!(deaths, 1);
        assert!(health.is_dead());
        assert_eq!(health.current(), 0.0);
    }

    #[test]
    fn lethal_hit_requests_hurt_then_death_cue() {
        let mut audio = AudioService::new(AudioSettings::default());
        let mut health = make_health(1.0, 0);
        health.take_damage(5.0, 0, &mut audio);
        assert_eq!(cue_names(&mut audio), vec!["human hurt", "death"]);
        health.take_damage(5.0, 10, &mut audio);
        assert!(cue_names(&mut audio).is_empty());
    }

    #[test]
    fn heal_is_noop_when_full_or_dead() {
        let mut audio = AudioService::new(AudioSettings::default());
        let mut health = make_health(5.0, 0);
        assert!(health.heal(1.0, &mut audio).is_empty());
        health.take_damage(2.0, 0, &mut audio);
        let events = health.heal(10.0, &mut audio);
        assert_eq!(events[0], HealthEvent::Healed { amount: 2.0 });
        assert_eq!(health.current(), 5.0);

        health.take_damage(50.0, 100, &mut audio);
        audio.drain_cues();
        assert!(health.heal(1.0, &mut audio).is_empty());
        assert!(audio.drain_cues().is_empty());
    }

    #[test]
    fn set_health_clamps_without_side_effects() {
        let mut audio = AudioService::new(AudioSettings::default());
        let mut health = make_health(4.0, 1_000);
        assert_eq!(
            health.set_health(99.0),
            vec![HealthEvent::Changed { ratio: 1.0 }]
        );
        health.set_health(-3.0);
        assert_eq!(health.current(), 0.0);
        assert!(health.is_alive());
        assert!(!health.is_invulnerable(0));
        assert!(audio.drain_cues().is_empty());

        let events = health.take_damage(1.0, 0, &mut audio);
        assert!(events.contains(&HealthEvent::Death));
    }

    #[test]
    fn random_operation_sequences_keep_health_in_bounds() {
        let mut audio = AudioService::new(AudioSettings::default());
        let mut rng = Rng::new(2024);
        for round in 0..50u32 {
            let mut health = make_health(rng.range_f32(1.0, 50.0), rng.range_u64(0, 500));
            let mut now_ms = 0u64;
            for _ in 0..200 {
                now_ms += rng.range_u64(0, 120);
                let amount = rng.range_f32(-5.0, 20.0);
                match rng.pick_index(3) {
                    0 => {
                        health.take_damage(amount, now_ms, &mut audio);
                    }
                    1 => {
                        health.heal(amount, &mut audio);
                    }
                    _ => {
                        health.set_health(amount * 3.0);
                    }
                }
                assert!(
                    (0.0..=health.max()).contains(&health.current()),
                    "round {round}: {} outside 0..={}",
                    health.current(),
                    health.max()
                );
            }
            audio.drain_cues();
        }
    }

    #[test]
    fn runtime_events_fold_ratio_into_damage() {
        let mut audio = AudioService::new(AudioSettings::default());
        let mut health = make_health(4.0, 0);
        let events = health.take_damage(1.0, 0, &mut audio);
        let folded = runtime_events(EntityId(7), EntityKind::Spirit, &health, &events);
        assert_eq!(folded.len(), 1);
        match &folded[0] {
            RuntimeEvent::Damaged {
                entity_id,
                amount,
                ratio,
            } => {
                assert_eq!(*entity_id, EntityId(7));
                assert_eq!(*amount, 1.0);
                assert_eq!(*ratio, 0.75);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
