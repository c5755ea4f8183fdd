use std::path::PathBuf;

use thiserror::Error;

use crate::types::{EntityKind, Vec2};

/// A required reference or tunable is missing or out of range.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    #[error("{profile}: attack range {attack} must be below detection range {detection}")]
    RangeOrder {
        profile: String,
        attack: f32,
        detection: f32,
    },
    #[error("{profile}: retreat range {retreat} must be below attack range {attack}")]
    RetreatOrder {
        profile: String,
        retreat: f32,
        attack: f32,
    },
    #[error("{profile}: no projectile weapon assigned")]
    MissingWeapon { profile: String },
    #[error("{profile}: no ground probe assigned")]
    MissingGroundProbe { profile: String },
    #[error("{field} must be positive and finite (got {value})")]
    NonPositive { field: String, value: f32 },
    #[error("{field} must not be zero")]
    Zero { field: String },
    #[error("no body settings for {0:?}")]
    MissingBody(EntityKind),
    #[error("{0:?} cannot be spawned in waves")]
    UnspawnableKind(EntityKind),
}

impl ConfigError {
    pub(crate) fn non_positive(field: &str, value: f32) -> Self {
        Self::NonPositive {
            field: field.to_string(),
            value,
        }
    }
}

/// Rejected at projectile creation; nothing is spawned.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum CombatError {
    #[error("projectile direction {0:?} cannot be normalised")]
    MissingDirection(Vec2),
    #[error("projectile speed {0} must be positive")]
    InvalidSpeed(f32),
    #[error("projectile lifetime must be positive")]
    ZeroLifetime,
    #[error("projectile damage {0} must be finite and non-negative")]
    InvalidDamage(f32),
    #[error("projectile origin {0:?} is not finite")]
    InvalidOrigin(Vec2),
}

#[derive(Debug, Error)]
pub enum SettingsLoadError {
    #[error("failed to read settings {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}
