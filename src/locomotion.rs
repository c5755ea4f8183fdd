use serde::{Deserialize, Serialize};

use crate::constants::{
    COYOTE_MS, GRAVITY, GROUND_PROBE_RADIUS, JUMP_BUFFER_MS, JUMP_FORCE, MAX_FALL_SPEED,
};
use crate::types::Vec2;
use crate::world::Level;

const REST_PROBE: f32 = 0.05;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JumpSettings {
    #[serde(rename = "jumpForce")]
    pub jump_force: f32,
    #[serde(rename = "coyoteMs")]
    pub coyote_ms: u64,
    #[serde(rename = "bufferMs")]
    pub buffer_ms: u64,
}

impl Default for JumpSettings {
    fn default() -> Self {
        Self {
            jump_force: JUMP_FORCE,
            coyote_ms: COYOTE_MS,
            buffer_ms: JUMP_BUFFER_MS,
        }
    }
}

/// Feet probe: a small circle offset from the body centre.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroundProbe {
    pub offset: Vec2,
    pub radius: f32,
}

impl GroundProbe {
    pub fn below(half_height: f32) -> Self {
        Self {
            offset: Vec2::new(0.0, -half_height),
            radius: GROUND_PROBE_RADIUS,
        }
    }

    pub fn touches(&self, level: &Level, position: Vec2) -> bool {
        level.overlaps_circle(position + self.offset, self.radius)
    }
}

/// Coyote time and jump buffering.
///
/// A jump fires when a buffered request overlaps a coyote window; both
/// windows are consumed so one press yields one jump.
#[derive(Clone, Debug, Default)]
pub struct JumpController {
    coyote_remaining_ms: u64,
    buffer_remaining_ms: u64,
}

impl JumpController {
    pub fn update_ground(&mut self, grounded: bool, dt_ms: u64, settings: &JumpSettings) {
        if grounded {
            self.coyote_remaining_ms = settings.coyote_ms;
        } else {
            self.coyote_remaining_ms = self.coyote_remaining_ms.saturating_sub(dt_ms);
        }
    }

    pub fn queue(&mut self, settings: &JumpSettings) {
        self.buffer_remaining_ms = settings.buffer_ms;
    }

    pub fn tick_buffer(&mut self, dt_ms: u64) {
        self.buffer_remaining_ms = self.buffer_remaining_ms.saturating_sub(dt_ms);
    }

    pub fn try_consume(&mut self) -> bool {
        if self.buffer_remaining_ms > 0 && self.coyote_remaining_ms > 0 {
            self.buffer_remaining_ms = 0;
            self.coyote_remaining_ms = 0;
            return true;
        }
        false
    }

    /// One tick of the usual order: ground, input, consume.
    pub fn step(
        &mut self,
        grounded: bool,
        pressed: bool,
        dt_ms: u64,
        settings: &JumpSettings,
    ) -> bool {
        self.update_ground(grounded, dt_ms, settings);
        if pressed {
            self.queue(settings);
        } else {
            self.tick_buffer(dt_ms);
        }
        self.try_consume()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyStep {
    pub position: Vec2,
    pub velocity: Vec2,
    pub grounded: bool,
}

/// Integrates one body against the level with axis-separated resolution.
pub fn integrate_body(
    position: Vec2,
    velocity: Vec2,
    half_extents: Vec2,
    gravity: bool,
    dt_ms: u64,
    level: &Level,
) -> BodyStep {
    let dt = dt_ms as f32 / 1000.0;
    let mut velocity = velocity;
    if gravity {
        velocity.y = (velocity.y + GRAVITY * dt).max(-MAX_FALL_SPEED);
    }

    let mut next = position;
    let moved_x = Vec2::new(position.x + velocity.x * dt, position.y);
    if level.collides_box(moved_x, half_extents) {
        velocity.x = 0.0;
    } else {
        next = moved_x;
    }

    let mut grounded = false;
    let moved_y = Vec2::new(next.x, next.y + velocity.y * dt);
    if level.collides_box(moved_y, half_extents) {
        if velocity.y < 0.0 {
            if let Some(top) = level.support_top(moved_y, half_extents) {
                if top <= next.y {
                    next.y = top + half_extents.y;
                }
            }
            grounded = true;
        }
        velocity.y = 0.0;
    } else {
        next = moved_y;
    }

    if !grounded && velocity.y <= 0.0 {
        grounded = level.collides_box(next + Vec2::new(0.0, -REST_PROBE), half_extents);
    }

    BodyStep {
        position: next,
        velocity,
        grounded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HALF: Vec2 = Vec2::new(0.5, 0.5);

    #[test]
    fn falling_body_lands_on_floor() {
        let level = Level::flat(20.0);
        let mut position = Vec2::new(5.0, 4.0);
        let mut velocity = Vec2::ZERO;
        let mut grounded = false;
        for _ in 0..60 {
            let step = integrate_body(position, velocity, HALF, true, 50, &level);
            position = step.position;
            velocity = step.velocity;
            grounded = step.grounded;
        }
        assert!(grounded);
        assert!((position.y - 0.5).abs() < 1e-4);
        assert_eq!(velocity.y, 0.0);
    }

    #[test]
    fn floating_body_keeps_vertical_velocity() {
        let level = Level::flat(20.0);
        let step = integrate_body(
            Vec2::new(5.0, 5.0),
            Vec2::new(0.0, 2.0),
            HALF,
            false,
            500,
            &level,
        );
        assert!((step.position.y - 6.0).abs() < 1e-5);
        assert_eq!(step.velocity.y, 2.0);
    }

    #[test]
    fn coyote_window_allows_late_jump() {
        let settings = JumpSettings::default();
        let mut jump = JumpController::default();
        assert!(!jump.step(true, false, 50, &settings));
        assert!(!jump.step(false, false, 50, &settings));
        assert!(jump.step(false, true, 50, &settings));
        assert!(!jump.step(false, true, 50, &settings));
    }

    #[test]
    fn buffered_press_fires_on_landing() {
        let settings = JumpSettings::default();
        let mut jump = JumpController::default();
        for _ in 0..10 {
            jump.step(false, false, 50, &settings);
        }
        assert!(!jump.step(false, true, 50, &settings));
        assert!(jump.step(true, false, 50, &settings));
    }

    #[test]
    fn stale_buffer_expires() {
        let settings = JumpSettings::default();
        let mut jump = JumpController::default();
        for _ in 0..10 {
            jump.step(false, false, 50, &settings);
        }
        jump.step(false, true, 50, &settings);
        for _ in 0..4 {
            jump.step(false, false, 50, &settings);
        }
        assert!(!jump.step(true, false, 50, &settings));
    }
}
