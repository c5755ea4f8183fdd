use tracing::info;

/// Scene loading hooks. Calls are terminal: the core never waits on them.
pub trait SceneBoundary {
    fn restart_world(&mut self);
    fn load_phase_scene(&mut self, name: &str);
}

/// Records scene requests; the default boundary for headless runs.
#[derive(Clone, Debug, Default)]
pub struct SceneLog {
    pub restarts: u32,
    pub loaded: Vec<String>,
}

impl SceneBoundary for SceneLog {
    fn restart_world(&mut self) {
        self.restarts += 1;
        info!(restarts = self.restarts, "world restart requested");
    }

    fn load_phase_scene(&mut self, name: &str) {
        self.loaded.push(name.to_string());
    }
}
