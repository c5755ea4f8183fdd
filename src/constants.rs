pub const TICK_RATE: u32 = 20;
pub const TICK_MS: u64 = 1000 / TICK_RATE as u64;

pub const GRAVITY: f32 = -25.0;
pub const MAX_FALL_SPEED: f32 = 30.0;

pub const FISHING_DURATION_MS: u64 = 120_000;
pub const BATTLE_DURATION_MS: u64 = 300_000;
pub const UNDEAD_DURATION_MS: u64 = 300_000;
pub const TRANSITION_DELAY_MS: u64 = 2_000;

pub const SPAWN_INTERVAL_MIN_MS: u64 = 5_000;
pub const SPAWN_INTERVAL_MAX_MS: u64 = 15_000;
pub const SPAWN_WAVE_SIZE: usize = 3;
pub const SPAWN_RING_RADIUS: f32 = 14.0;
pub const SPAWN_MINIMUM_DISTANCE: f32 = 0.5;
pub const SPAWN_MAX_ATTEMPTS: u32 = 100;
pub const MAX_ALIVE_SPIRITS: usize = 12;

pub const SAILOR_MAX_HEALTH: f32 = 5.0;
pub const SPIRIT_MAX_HEALTH: f32 = 10.0;
pub const SPIRIT_FORM_MAX_HEALTH: f32 = 5.0;
pub const BOT_MAX_HEALTH: f32 = 10.0;
pub const INVULNERABILITY_MS: u64 = 1_000;
pub const SPIRIT_INVULNERABILITY_MS: u64 = 250;

pub const BODY_RADIUS: f32 = 0.5;
pub const PROJECTILE_RADIUS: f32 = 0.1;
pub const MUZZLE_OFFSET: f32 = 0.6;
pub const CONTACT_DAMAGE: f32 = 1.0;

pub const SAILOR_MOVE_SPEED: f32 = 5.0;
pub const SPIRIT_FORM_MOVE_SPEED: f32 = 5.0;
pub const JUMP_FORCE: f32 = 10.0;
pub const COYOTE_MS: u64 = 200;
pub const JUMP_BUFFER_MS: u64 = 200;
pub const GROUND_PROBE_RADIUS: f32 = 0.2;

pub const SHOTGUN_PELLETS: u32 = 5;
pub const SHOTGUN_SPREAD_DEG: f32 = 10.0;
pub const PELLET_SPEED: f32 = 20.0;
pub const PELLET_LIFETIME_MS: u64 = 3_000;
pub const PELLET_DAMAGE: f32 = 5.0;
pub const RECOIL_FORCE: f32 = 8.0;
pub const SHOTGUN_COOLDOWN_MS: u64 = 500;

pub const SPIRIT_BOLT_SPEED: f32 = 6.0;
pub const SPIRIT_FORM_BOLT_SPEED: f32 = 8.0;
pub const SPIRIT_BOLT_LIFETIME_MS: u64 = 5_000;
pub const SPIRIT_BOLT_DAMAGE: f32 = 1.0;
pub const SPIRIT_BOLT_KNOCKBACK: f32 = 5.0;
pub const SPIRIT_FORM_COOLDOWN_MS: u64 = 300;

pub const POSSESSION_RANGE: f32 = 3.0;
pub const AUDIO_VOICES: usize = 10;

pub const CAMERA_HALF_WIDTH: f32 = 16.0;
pub const CAMERA_HALF_HEIGHT: f32 = 9.0;

pub const CUE_SHOTGUN: &str = "shotgun";
pub const CUE_HUMAN_HURT: &str = "human hurt";
pub const CUE_HUMAN_DROWN: &str = "human drown";
pub const CUE_SPIRIT_ATTACK: &str = "spirit attack";
pub const CUE_SPIRIT_HURT: &str = "spirit hurt";
pub const CUE_HEAL: &str = "heal";
pub const CUE_DEATH: &str = "death";
pub const CUE_PROJECTILE_HIT: &str = "projectile hit";
pub const CUE_POSSESSION: &str = "possession";
pub const CUE_SPIRIT_SPAWN: &str = "spirit spawn";
