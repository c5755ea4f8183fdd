use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audio::AudioSink;
use crate::boundary::SceneBoundary;
use crate::constants::{
    BATTLE_DURATION_MS, CUE_HUMAN_DROWN, FISHING_DURATION_MS, TRANSITION_DELAY_MS,
    UNDEAD_DURATION_MS,
};
use crate::error::ConfigError;
use crate::tasks::{Countdown, Task, TaskList, TaskOwner, TaskStatus};
use crate::types::{GamePhase, PhaseView, PhaseVisit, RuntimeEvent};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseSettings {
    #[serde(rename = "fishingDurationMs")]
    pub fishing_duration_ms: u64,
    #[serde(rename = "battleDurationMs")]
    pub battle_duration_ms: u64,
    #[serde(rename = "undeadDurationMs")]
    pub undead_duration_ms: u64,
    #[serde(rename = "transitionDelayMs")]
    pub transition_delay_ms: u64,
    #[serde(rename = "pauseWorldDuringTransition")]
    pub pause_world_during_transition: bool,
}

impl Default for PhaseSettings {
    fn default() -> Self {
        Self {
            fishing_duration_ms: FISHING_DURATION_MS,
            battle_duration_ms: BATTLE_DURATION_MS,
            undead_duration_ms: UNDEAD_DURATION_MS,
            transition_delay_ms: TRANSITION_DELAY_MS,
            pause_world_during_transition: true,
        }
    }
}

impl PhaseSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("phase.fishingDurationMs", self.fishing_duration_ms),
            ("phase.battleDurationMs", self.battle_duration_ms),
            ("phase.undeadDurationMs", self.undead_duration_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero {
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Real-time wait that releases the lock and optionally commits a phase.
#[derive(Clone, Debug)]
pub struct TransitionSequence {
    countdown: Countdown,
    destination: Option<GamePhase>,
}

impl Task for TransitionSequence {
    fn resume(&mut self, dt_ms: u64) -> TaskStatus {
        self.countdown.resume(dt_ms)
    }
}

/// Owns the single active phase and the transition lock.
#[derive(Clone, Debug)]
pub struct PhaseController {
    settings: PhaseSettings,
    phase: GamePhase,
    locked: bool,
    time_scale: f32,
    elapsed_ms: u64,
    real_ms: u64,
    sequences: TaskList<TransitionSequence>,
    entered: Vec<(GamePhase, GamePhase)>,
    events: Vec<RuntimeEvent>,
    history: Vec<PhaseVisit>,
}

impl PhaseController {
    pub fn new(settings: PhaseSettings, initial: GamePhase) -> Self {
        Self {
            settings,
            phase: initial,
            locked: false,
            time_scale: 1.0,
            elapsed_ms: 0,
            real_ms: 0,
            sequences: TaskList::new(),
            entered: Vec::new(),
            events: Vec::new(),
            history: vec![PhaseVisit {
                phase: initial,
                at_ms: 0,
            }],
        }
    }

    pub fn settings(&self) -> &PhaseSettings {
        &self.settings
    }

    pub fn current(&self) -> GamePhase {
        self.phase
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// World time spent in the current phase, frozen while locked.
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn history(&self) -> &[PhaseVisit] {
        &self.history
    }

    pub fn view(&self) -> PhaseView {
        PhaseView {
            phase: self.phase,
            locked: self.locked,
            time_scale: self.time_scale,
            phase_elapsed_ms: self.elapsed_ms,
        }
    }

    /// Plays the entry cues of the initial phase.
    pub fn start(&mut self, audio: &mut dyn AudioSink, scene: &mut dyn SceneBoundary) {
        announce(self.phase, audio, scene);
    }

    pub fn world_dt(&self, real_dt_ms: u64) -> u64 {
        if self.time_scale <= 0.0 {
            0
        } else {
            real_dt_ms
        }
    }

    /// Switches phase now. Rejected while locked; a request for the current
    /// phase is a no-op.
    pub fn request(
        &mut self,
        to: GamePhase,
        audio: &mut dyn AudioSink,
        scene: &mut dyn SceneBoundary,
    ) -> bool {
        if self.locked {
            info!(
                requested = to.key(),
                current = self.phase.key(),
                "phase change rejected while locked"
            );
            self.events.push(RuntimeEvent::PhaseChangeRejected {
                requested: to,
                current: self.phase,
            });
            return false;
        }
        if to == self.phase {
            return false;
        }
        self.commit(to, audio, scene);
        true
    }

    /// Advances transition sequences by real time and world-phase timers by
    /// world time.
    pub fn advance(
        &mut self,
        real_dt_ms: u64,
        world_dt_ms: u64,
        audio: &mut dyn AudioSink,
        scene: &mut dyn SceneBoundary,
    ) {
        self.real_ms += real_dt_ms;
        if !self.locked {
            self.elapsed_ms += world_dt_ms;
        }
        for (_, sequence) in self.sequences.run(real_dt_ms) {
            self.locked = false;
            self.time_scale = 1.0;
            if let Some(destination) = sequence.destination {
                self.commit(destination, audio, scene);
            }
        }
    }

    pub fn take_entered(&mut self) -> Vec<(GamePhase, GamePhase)> {
        std::mem::take(&mut self.entered)
    }

    pub fn drain_events(&mut self) -> Vec<RuntimeEvent> {
        std::mem::take(&mut self.events)
    }

    fn commit(&mut self, to: GamePhase, audio: &mut dyn AudioSink, scene: &mut dyn SceneBoundary) {
        let from = self.phase;
        self.phase = to;
        self.elapsed_ms = 0;
        self.history.push(PhaseVisit {
            phase: to,
            at_ms: self.real_ms,
        });
        self.entered.push((from, to));
        self.events.push(RuntimeEvent::PhaseChanged { from, to });
        info!(from = from.key(), to = to.key(), "phase changed");
        announce(to, audio, scene);

        match (from, to) {
            (GamePhase::Fishing, GamePhase::Battle) => self.lock(to, None),
            (_, GamePhase::Drowning) => self.lock(to, Some(GamePhase::Undead)),
            (_, GamePhase::Possessing) => self.lock(to, Some(GamePhase::Fishing)),
            _ => {}
        }
    }

    fn lock(&mut self, owner: GamePhase, destination: Option<GamePhase>) {
        self.locked = true;
        if self.settings.pause_world_during_transition {
            self.time_scale = 0.0;
        }
        self.sequences.spawn(
            TaskOwner::Phase(owner),
            TransitionSequence {
                countdown: Countdown::new(self.settings.transition_delay_ms),
                destination,
            },
        );
    }
}

fn announce(phase: GamePhase, audio: &mut dyn AudioSink, scene: &mut dyn SceneBoundary) {
    match phase {
        GamePhase::Fishing | GamePhase::Battle | GamePhase::Undead => audio.play_music(phase.key()),
        GamePhase::Drowning => audio.play(CUE_HUMAN_DROWN),
        GamePhase::Possessing => {}
    }
    scene.load_phase_scene(phase.key());
}
