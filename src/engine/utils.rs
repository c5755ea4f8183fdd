use crate::types::Vec2;
use crate::world::Level;

pub(super) fn facing_direction(facing_right: bool) -> Vec2 {
    if facing_right {
        Vec2::RIGHT
    } else {
        -Vec2::RIGHT
    }
}

pub(super) fn bodies_touch(a: Vec2, a_radius: f32, b: Vec2, b_radius: f32) -> bool {
    a.distance(b) < a_radius + b_radius
}

/// A spawn point is unusable outside the level, inside terrain or in water.
pub(super) fn spawn_blocked(level: &Level, point: Vec2, radius: f32) -> bool {
    !level.bounds.contains(point)
        || level.collides_box(point, Vec2::new(radius, radius))
        || level.in_water(point)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touching_needs_strict_overlap() {
        assert!(bodies_touch(Vec2::ZERO, 0.5, Vec2::new(0.9, 0.0), 0.5));
        assert!(!bodies_touch(Vec2::ZERO, 0.5, Vec2::new(1.0, 0.0), 0.5));
    }

    #[test]
    fn spawn_points_in_terrain_or_outside_are_blocked() {
        let level = Level::flat(40.0);
        assert!(spawn_blocked(&level, Vec2::new(10.0, -1.0), 0.5));
        assert!(spawn_blocked(&level, Vec2::new(-5.0, 3.0), 0.5));
        assert!(spawn_blocked(&level, Vec2::new(10.0, 0.2), 0.5));
        assert!(!spawn_blocked(&level, Vec2::new(10.0, 3.0), 0.5));
    }

    #[test]
    fn facing_maps_to_unit_x() {
        assert_eq!(facing_direction(true), Vec2::RIGHT);
        assert_eq!(facing_direction(false), Vec2::new(-1.0, 0.0));
    }
}
