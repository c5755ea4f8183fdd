use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::{
    AUDIO_VOICES, CUE_DEATH, CUE_HEAL, CUE_HUMAN_DROWN, CUE_HUMAN_HURT, CUE_POSSESSION,
    CUE_PROJECTILE_HIT, CUE_SHOTGUN, CUE_SPIRIT_ATTACK, CUE_SPIRIT_HURT, CUE_SPIRIT_SPAWN,
};
use crate::error::ConfigError;
use crate::types::CueView;

/// Fire-and-forget playback requests. Implementations never block the tick.
pub trait AudioSink {
    fn play_cue(&mut self, name: &str, volume_scale: f32);

    fn play(&mut self, name: &str) {
        self.play_cue(name, 1.0);
    }

    fn play_music(&mut self, track: &str);
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CueSpec {
    pub name: String,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    pub volume: f32,
}

impl CueSpec {
    fn new(name: &str, duration_ms: u64, volume: f32) -> Self {
        Self {
            name: name.to_string(),
            duration_ms,
            volume,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub voices: usize,
    #[serde(rename = "masterVolume")]
    pub master_volume: f32,
    pub cues: Vec<CueSpec>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            voices: AUDIO_VOICES,
            master_volume: 1.0,
            cues: vec![
                CueSpec::new(CUE_SHOTGUN, 400, 0.9),
                CueSpec::new(CUE_HUMAN_HURT, 500, 1.0),
                CueSpec::new(CUE_HUMAN_DROWN, 2_000, 1.0),
                CueSpec::new(CUE_SPIRIT_ATTACK, 600, 0.7),
                CueSpec::new(CUE_SPIRIT_HURT, 400, 0.8),
                CueSpec::new(CUE_HEAL, 500, 0.8),
                CueSpec::new(CUE_DEATH, 1_200, 1.0),
                CueSpec::new(CUE_PROJECTILE_HIT, 250, 0.6),
                CueSpec::new(CUE_POSSESSION, 1_500, 1.0),
                CueSpec::new(CUE_SPIRIT_SPAWN, 800, 0.7),
            ],
        }
    }
}

impl AudioSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.voices == 0 {
            return Err(ConfigError::Zero {
                field: "audio.voices".to_string(),
            });
        }
        if !(self.master_volume.is_finite() && self.master_volume >= 0.0) {
            return Err(ConfigError::non_positive(
                "audio.masterVolume",
                self.master_volume,
            ));
        }
        Ok(())
    }
}

/// Named cue catalogue.
#[derive(Clone, Debug, Default)]
pub struct CueLibrary {
    cues: HashMap<String, CueSpec>,
}

impl CueLibrary {
    pub fn new(cues: &[CueSpec]) -> Self {
        Self {
            cues: cues
                .iter()
                .map(|cue| (cue.name.clone(), cue.clone()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CueSpec> {
        self.cues.get(name)
    }
}

#[derive(Clone, Debug, Default)]
struct Voice {
    cue: Option<String>,
    remaining_ms: u64,
    assigned_seq: u64,
}

/// Fixed set of voices. An idle voice is preferred; when all are busy the
/// one assigned longest ago is stolen.
#[derive(Clone, Debug)]
pub struct VoicePool {
    voices: Vec<Voice>,
    next_seq: u64,
}

impl VoicePool {
    pub fn new(size: usize) -> Self {
        Self {
            voices: vec![Voice::default(); size],
            next_seq: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.voices.len()
    }

    pub fn busy(&self) -> usize {
        self.voices.iter().filter(|voice| voice.cue.is_some()).count()
    }

    pub fn acquire(&mut self, cue: &str, duration_ms: u64) -> Option<usize> {
        let index = self
            .voices
            .iter()
            .position(|voice| voice.cue.is_none())
            .or_else(|| {
                self.voices
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, voice)| voice.assigned_seq)
                    .map(|(index, _)| index)
            })?;
        self.next_seq += 1;
        let voice = &mut self.voices[index];
        voice.cue = Some(cue.to_string());
        voice.remaining_ms = duration_ms.max(1);
        voice.assigned_seq = self.next_seq;
        Some(index)
    }

    pub fn advance(&mut self, dt_ms: u64) {
        for voice in &mut self.voices {
            if voice.cue.is_none() {
                continue;
            }
            voice.remaining_ms = voice.remaining_ms.saturating_sub(dt_ms);
            if voice.remaining_ms == 0 {
                voice.cue = None;
            }
        }
    }
}

/// The single audio service of a run. Accepted requests are queued as
/// [`CueView`]s until the next snapshot drains them.
#[derive(Clone, Debug)]
pub struct AudioService {
    library: CueLibrary,
    pool: VoicePool,
    master_volume: f32,
    current_music: Option<String>,
    outbox: Vec<CueView>,
}

impl AudioService {
    pub fn new(settings: AudioSettings) -> Self {
        Self {
            library: CueLibrary::new(&settings.cues),
            pool: VoicePool::new(settings.voices),
            master_volume: settings.master_volume,
            current_music: None,
            outbox: Vec::new(),
        }
    }

    pub fn current_music(&self) -> Option<&str> {
        self.current_music.as_deref()
    }

    pub fn pool(&self) -> &VoicePool {
        &self.pool
    }

    pub fn advance(&mut self, dt_ms: u64) {
        self.pool.advance(dt_ms);
    }

    pub fn drain_cues(&mut self) -> Vec<CueView> {
        std::mem::take(&mut self.outbox)
    }
}

impl AudioSink for AudioService {
    fn play_cue(&mut self, name: &str, volume_scale: f32) {
        let Some(spec) = self.library.get(name) else {
            warn!(cue = name, "unknown audio cue");
            return;
        };
        let volume = (spec.volume * volume_scale * self.master_volume).clamp(0.0, 1.0);
        let duration_ms = spec.duration_ms;
        let voice = self.pool.acquire(name, duration_ms);
        self.outbox.push(CueView {
            name: name.to_string(),
            volume,
            voice,
            music: false,
        });
    }

    fn play_music(&mut self, track: &str) {
        if self.current_music.as_deref() == Some(track) {
            return;
        }
        debug!(track, "switching music");
        self.current_music = Some(track.to_string());
        self.outbox.push(CueView {
            name: track.to_string(),
            volume: self.master_volume.clamp(0.0, 1.0),
            voice: None,
            music: true,
        });
    }
}
