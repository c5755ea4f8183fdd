use serde::{Deserialize, Serialize};

use crate::constants::{CAMERA_HALF_HEIGHT, CAMERA_HALF_WIDTH};
use crate::error::ConfigError;
use crate::rng::Rng;
use crate::types::Vec2;

const SLAB_THICKNESS: f32 = 2.0;
const WATER_DEPTH: f32 = 6.0;
const WALL_HEIGHT: f32 = 40.0;
const SPAWN_SLAB_LENGTH: f32 = 16.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self {
            min: Vec2::new(min.x.min(max.x), min.y.min(max.y)),
            max: Vec2::new(min.x.max(max.x), min.y.max(max.y)),
        }
    }

    pub fn around(center: Vec2, half_extents: Vec2) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new((self.min.x + self.max.x) * 0.5, (self.min.y + self.max.y) * 0.5)
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }

    pub fn overlaps_circle(&self, center: Vec2, radius: f32) -> bool {
        let nearest = Vec2::new(
            center.x.clamp(self.min.x, self.max.x),
            center.y.clamp(self.min.y, self.max.y),
        );
        nearest.distance(center) <= radius
    }

    /// Entry fraction along `from -> to`, using the slab method.
    pub fn segment_hit(&self, from: Vec2, to: Vec2) -> Option<f32> {
        if self.contains(from) {
            return Some(0.0);
        }
        let delta = to - from;
        let mut t_min = 0.0f32;
        let mut t_max = 1.0f32;
        for (origin, dir, lo, hi) in [
            (from.x, delta.x, self.min.x, self.max.x),
            (from.y, delta.y, self.min.y, self.max.y),
        ] {
            if dir.abs() <= f32::EPSILON {
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / dir;
            let mut t0 = (lo - origin) * inv;
            let mut t1 = (hi - origin) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    pub length: f32,
    #[serde(rename = "slabMin")]
    pub slab_min: f32,
    #[serde(rename = "slabMax")]
    pub slab_max: f32,
    #[serde(rename = "gapMin")]
    pub gap_min: f32,
    #[serde(rename = "gapMax")]
    pub gap_max: f32,
    pub ledges: usize,
    #[serde(rename = "cameraHalfExtents")]
    pub camera_half_extents: Vec2,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            length: 96.0,
            slab_min: 10.0,
            slab_max: 18.0,
            gap_min: 2.0,
            gap_max: 3.5,
            ledges: 4,
            camera_half_extents: Vec2::new(CAMERA_HALF_WIDTH, CAMERA_HALF_HEIGHT),
        }
    }
}

impl WorldSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("world.length", self.length),
            ("world.slabMin", self.slab_min),
            ("world.slabMax", self.slab_max),
            ("world.gapMin", self.gap_min),
            ("world.gapMax", self.gap_max),
            ("world.cameraHalfExtents.x", self.camera_half_extents.x),
            ("world.cameraHalfExtents.y", self.camera_half_extents.y),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::non_positive(field, value));
            }
        }
        if self.length < SPAWN_SLAB_LENGTH {
            return Err(ConfigError::non_positive(
                "world.length (at least one spawn slab)",
                self.length,
            ));
        }
        Ok(())
    }
}

/// Static level geometry. Terrain is solid, water is a hazard volume under
/// every gap in the ground.
#[derive(Clone, Debug)]
pub struct Level {
    pub bounds: Aabb,
    pub solids: Vec<Aabb>,
    pub water: Vec<Aabb>,
    pub sailor_spawn: Vec2,
    pub bot_spawn: Vec2,
}

pub fn generate_level(settings: &WorldSettings, seed: u32) -> Level {
    let mut rng = Rng::new(seed ^ 0x5eab_ed00);
    let length = settings.length.max(SPAWN_SLAB_LENGTH);
    let mut solids = Vec::new();
    let mut water = Vec::new();
    let mut slabs = Vec::new();

    let mut cursor = 0.0f32;
    let mut first = true;
    while cursor < length {
        let slab_len = if first {
            SPAWN_SLAB_LENGTH
        } else {
            rng.range_f32(settings.slab_min, settings.slab_max.max(settings.slab_min))
        };
        let end = (cursor + slab_len).min(length);
        slabs.push((cursor, end));
        cursor = end;
        first = false;
        if cursor >= length {
            break;
        }
        let gap = rng.range_f32(settings.gap_min, settings.gap_max.max(settings.gap_min));
        if cursor + gap + 1.0 >= length {
            // Too short for a final slab; extend the last one instead.
            if let Some(last) = slabs.last_mut() {
                last.1 = length;
            }
            break;
        }
        water.push(Aabb::new(
            Vec2::new(cursor, -WATER_DEPTH),
            Vec2::new(cursor + gap, -0.5),
        ));
        cursor += gap;
    }

    for (start, end) in &slabs {
        solids.push(Aabb::new(
            Vec2::new(*start, -SLAB_THICKNESS),
            Vec2::new(*end, 0.0),
        ));
    }

    for _ in 0..settings.ledges {
        let width = rng.range_f32(3.0, 6.0);
        let x = rng.range_f32(SPAWN_SLAB_LENGTH, (length - width).max(SPAWN_SLAB_LENGTH));
        let y = rng.range_f32(3.0, 5.0);
        solids.push(Aabb::new(Vec2::new(x, y), Vec2::new(x + width, y + 0.5)));
    }

    // Seabed under the water and walls at both ends keep bodies in the level.
    solids.push(Aabb::new(
        Vec2::new(-1.0, -WATER_DEPTH - 1.0),
        Vec2::new(length + 1.0, -WATER_DEPTH),
    ));
    solids.push(Aabb::new(Vec2::new(-1.0, -WATER_DEPTH), Vec2::new(0.0, WALL_HEIGHT)));
    solids.push(Aabb::new(
        Vec2::new(length, -WATER_DEPTH),
        Vec2::new(length + 1.0, WALL_HEIGHT),
    ));

    Level {
        bounds: Aabb::new(
            Vec2::new(0.0, -WATER_DEPTH),
            Vec2::new(length, WALL_HEIGHT),
        ),
        solids,
        water,
        sailor_spawn: Vec2::new(4.0, 1.0),
        bot_spawn: Vec2::new(SPAWN_SLAB_LENGTH - 4.0, 1.0),
    }
}

impl Level {
    /// A single flat floor without gaps, used by tests and tooling.
    pub fn flat(length: f32) -> Self {
        Self {
            bounds: Aabb::new(Vec2::new(0.0, -WATER_DEPTH), Vec2::new(length, WALL_HEIGHT)),
            solids: vec![Aabb::new(
                Vec2::new(0.0, -SLAB_THICKNESS),
                Vec2::new(length, 0.0),
            )],
            water: Vec::new(),
            sailor_spawn: Vec2::new(4.0, 1.0),
            bot_spawn: Vec2::new(length - 4.0, 1.0),
        }
    }

    pub fn is_solid(&self, point: Vec2) -> bool {
        self.solids.iter().any(|solid| solid.contains(point))
    }

    pub fn collides_box(&self, center: Vec2, half_extents: Vec2) -> bool {
        let body = Aabb::around(center, half_extents);
        self.solids.iter().any(|solid| solid.overlaps(&body))
    }

    /// Highest top edge among solids overlapping the box.
    pub fn support_top(&self, center: Vec2, half_extents: Vec2) -> Option<f32> {
        let body = Aabb::around(center, half_extents);
        self.solids
            .iter()
            .filter(|solid| solid.overlaps(&body))
            .map(|solid| solid.max.y)
            .reduce(f32::max)
    }

    pub fn overlaps_circle(&self, center: Vec2, radius: f32) -> bool {
        self.solids
            .iter()
            .any(|solid| solid.overlaps_circle(center, radius))
    }

    pub fn first_solid_hit(&self, from: Vec2, to: Vec2) -> Option<f32> {
        self.solids
            .iter()
            .filter_map(|solid| solid.segment_hit(from, to))
            .reduce(f32::min)
    }

    pub fn in_water(&self, point: Vec2) -> bool {
        self.water.iter().any(|volume| volume.contains(point))
    }

    /// Downward probe: is there terrain within `depth` below `point`?
    pub fn ground_below(&self, point: Vec2, depth: f32) -> bool {
        self.first_solid_hit(point, point + Vec2::new(0.0, -depth))
            .is_some()
    }
}

/// Camera framing that follows the controlled entity.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub center: Vec2,
    pub half_extents: Vec2,
}

impl Camera {
    pub fn new(center: Vec2, half_extents: Vec2) -> Self {
        Self {
            center,
            half_extents,
        }
    }

    pub fn follow(&mut self, target: Vec2) {
        self.center = target;
    }

    pub fn viewport(&self) -> Aabb {
        Aabb::around(self.center, self.half_extents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_generates_same_level() {
        let settings = WorldSettings::default();
        let a = generate_level(&settings, 42);
        let b = generate_level(&settings, 42);
        assert_eq!(a.solids, b.solids);
        assert_eq!(a.water, b.water);
    }

    #[test]
    fn spawn_points_stand_on_ground_away_from_water() {
        for seed in 0..20 {
            let level = generate_level(&WorldSettings::default(), seed);
            assert!(level.ground_below(level.sailor_spawn, 2.0));
            assert!(level.ground_below(level.bot_spawn, 2.0));
            assert!(!level.in_water(level.sailor_spawn));
            assert!(!level.is_solid(level.sailor_spawn));
        }
    }

    #[test]
    fn every_gap_has_water_and_no_floor() {
        let level = generate_level(&WorldSettings::default(), 7);
        assert!(!level.water.is_empty());
        for volume in &level.water {
            let gap_point = Vec2::new(volume.center().x, 1.0);
            assert!(!level.ground_below(gap_point, 1.4));
            assert!(level.in_water(Vec2::new(gap_point.x, -1.0)));
        }
    }

    #[test]
    fn segment_hit_reports_entry_fraction() {
        let wall = Aabb::new(Vec2::new(5.0, -1.0), Vec2::new(6.0, 1.0));
        let t = wall
            .segment_hit(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0))
            .expect("segment crosses wall");
        assert!((t - 0.5).abs() < 1e-5);
        assert!(wall
            .segment_hit(Vec2::new(0.0, 2.0), Vec2::new(10.0, 2.0))
            .is_none());
        assert!(wall
            .segment_hit(Vec2::new(0.0, 0.0), Vec2::new(4.0, 0.0))
            .is_none());
    }

    #[test]
    fn flat_level_supports_bodies() {
        let level = Level::flat(20.0);
        assert!(level.collides_box(Vec2::new(3.0, 0.4), Vec2::new(0.5, 0.5)));
        assert_eq!(
            level.support_top(Vec2::new(3.0, 0.4), Vec2::new(0.5, 0.5)),
            Some(0.0)
        );
        assert!(!level.collides_box(Vec2::new(3.0, 0.6), Vec2::new(0.5, 0.5)));
    }
}
