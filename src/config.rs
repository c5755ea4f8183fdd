use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agent::AgentBehaviorProfile;
use crate::audio::AudioSettings;
use crate::constants::CONTACT_DAMAGE;
use crate::entity::BodySettings;
use crate::error::{ConfigError, SettingsLoadError};
use crate::phase::PhaseSettings;
use crate::player::PlayerLoadout;
use crate::possession::PossessionSettings;
use crate::spawn::SpawnSettings;
use crate::types::EntityKind;
use crate::world::WorldSettings;

/// Every tunable of a run. Missing JSON fields fall back to the defaults
/// in `constants.rs`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    pub phase: PhaseSettings,
    pub spawn: SpawnSettings,
    pub spirit: AgentBehaviorProfile,
    pub bot: AgentBehaviorProfile,
    pub sailor: BodySettings,
    #[serde(rename = "spiritForm")]
    pub spirit_form: BodySettings,
    #[serde(rename = "spiritBody")]
    pub spirit_body: BodySettings,
    #[serde(rename = "botBody")]
    pub bot_body: BodySettings,
    pub player: PlayerLoadout,
    pub possession: PossessionSettings,
    pub audio: AudioSettings,
    pub world: WorldSettings,
    #[serde(rename = "contactDamage")]
    pub contact_damage: f32,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            phase: PhaseSettings::default(),
            spawn: SpawnSettings::default(),
            spirit: AgentBehaviorProfile::spirit(),
            bot: AgentBehaviorProfile::bot(),
            sailor: BodySettings::for_kind(EntityKind::Sailor),
            spirit_form: BodySettings::for_kind(EntityKind::SpiritForm),
            spirit_body: BodySettings::for_kind(EntityKind::Spirit),
            bot_body: BodySettings::for_kind(EntityKind::Bot),
            player: PlayerLoadout::default(),
            possession: PossessionSettings::default(),
            audio: AudioSettings::default(),
            world: WorldSettings::default(),
            contact_damage: CONTACT_DAMAGE,
        }
    }
}

impl GameSettings {
    pub fn load(path: &Path) -> Result<Self, SettingsLoadError> {
        let raw = fs::read_to_string(path).map_err(|source| SettingsLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self =
            serde_json::from_str(&raw).map_err(|source| SettingsLoadError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn body(&self, kind: EntityKind) -> &BodySettings {
        match kind {
            EntityKind::Sailor => &self.sailor,
            EntityKind::SpiritForm => &self.spirit_form,
            EntityKind::Spirit => &self.spirit_body,
            EntityKind::Bot => &self.bot_body,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.phase.validate()?;
        self.spawn.validate()?;
        self.spirit.validate()?;
        self.bot.validate()?;
        self.sailor.validate("sailor")?;
        self.spirit_form.validate("spiritForm")?;
        self.spirit_body.validate("spiritBody")?;
        self.bot_body.validate("botBody")?;
        self.player.shotgun.validate("player.shotgun")?;
        self.player.spirit_bolt.validate("player.spiritBolt")?;
        self.possession.validate()?;
        self.audio.validate()?;
        self.world.validate()?;
        if !(self.contact_damage.is_finite() && self.contact_damage >= 0.0) {
            return Err(ConfigError::non_positive("contactDamage", self.contact_damage));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(name: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("deepbound-{name}-{nanos}.json"))
    }

    #[test]
    fn defaults_are_valid() {
        assert!(GameSettings::default().validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings: GameSettings = serde_json::from_str(
            r#"{"phase":{"fishingDurationMs":5000},"spirit":{"attackRange":4.0}}"#,
        )
        .expect("partial settings parse");
        assert_eq!(settings.phase.fishing_duration_ms, 5_000);
        assert_eq!(settings.spirit.attack_range, 4.0);
        assert_eq!(settings.spirit.detection_range, 12.0);
        assert_eq!(settings.audio.voices, 10);
    }

    #[test]
    fn load_rejects_invalid_ranges() {
        let path = temp_path("invalid");
        fs::write(&path, r#"{"spirit":{"attackRange":30.0}}"#).expect("write temp config");
        let result = GameSettings::load(&path);
        let _ = fs::remove_file(&path);
        assert!(matches!(
            result,
            Err(SettingsLoadError::Invalid(ConfigError::RangeOrder { .. }))
        ));
    }

    #[test]
    fn load_reports_missing_file_and_bad_json() {
        let missing = temp_path("missing");
        assert!(matches!(
            GameSettings::load(&missing),
            Err(SettingsLoadError::Io { .. })
        ));

        let path = temp_path("garbage");
        fs::write(&path, "{not json").expect("write temp config");
        let result = GameSettings::load(&path);
        let _ = fs::remove_file(&path);
        assert!(matches!(result, Err(SettingsLoadError::Parse { .. })));
    }
}
