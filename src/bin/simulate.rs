use clap::Parser;
use deepbound::config::GameSettings;
use deepbound::constants::TICK_MS;
use deepbound::engine::{GameEngine, GameEngineOptions};
use deepbound::error::ConfigError;
use deepbound::types::{EntityKind, GameOverReason, GamePhase, RuntimeEvent, Snapshot};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Run one scenario instead of the default pair.
    #[arg(long)]
    single: bool,
    /// Real-time cap per scenario.
    #[arg(long)]
    minutes: Option<u64>,
    #[arg(long)]
    seed: Option<u64>,
    /// JSON settings file; missing fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    match_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
    /// Emit logs on stderr as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    name: String,
    minutes: u64,
    seed: u32,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    seed: u32,
    minutes: u64,
    reason: Option<GameOverReason>,
    #[serde(rename = "finalPhase")]
    final_phase: GamePhase,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    #[serde(rename = "realDurationMs")]
    real_duration_ms: u64,
    waves: u32,
    #[serde(rename = "spiritsSpawned")]
    spirits_spawned: u32,
    #[serde(rename = "spiritsBanished")]
    spirits_banished: u32,
    possessions: u32,
    #[serde(rename = "shotsFired")]
    shots_fired: u32,
    #[serde(rename = "damageEvents")]
    damage_events: u32,
    #[serde(rename = "phaseChanges")]
    phase_changes: u32,
    #[serde(rename = "rejectedPhaseChanges")]
    rejected_phase_changes: u32,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    tick: u64,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioRunResult {
    #[serde(flatten)]
    result: ScenarioResultLine,
    #[serde(rename = "anomalyRecords")]
    anomaly_records: Vec<AnomalyRecord>,
    finished_tick: u64,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "matchId")]
    match_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: u64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: u64,
    #[serde(rename = "scenarioCount")]
    scenario_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "averageDurationMs")]
    average_duration_ms: u64,
    #[serde(rename = "reasonCounts")]
    reason_counts: BTreeMap<String, usize>,
    scenarios: Vec<ScenarioResultLine>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let settings = match cli.config.as_deref() {
        Some(path) => match GameSettings::load(path) {
            Ok(settings) => settings,
            Err(load_error) => {
                error!(path = %path.display(), error = %load_error, "settings rejected");
                std::process::exit(2);
            }
        },
        None => GameSettings::default(),
    };

    let scenarios = resolve_scenarios(&cli);
    let run_started_at_ms = now_ms();
    let seed_hint = scenarios.first().map(|scenario| scenario.seed).unwrap_or(0);
    let match_id = cli
        .match_id
        .clone()
        .unwrap_or_else(|| default_match_id(seed_hint, run_started_at_ms));
    let mut has_anomaly = false;
    let mut scenario_results = Vec::new();
    let mut reason_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_duration_ms = 0u64;
    let mut total_anomalies = 0usize;

    for scenario in scenarios {
        info!(
            match_id = %match_id,
            scenario = %scenario.name,
            seed = scenario.seed,
            minutes = scenario.minutes,
            "scenario started"
        );
        let scenario_run = match run_scenario(&scenario, &settings) {
            Ok(run) => run,
            Err(config_error) => {
                error!(scenario = %scenario.name, error = %config_error, "engine refused settings");
                std::process::exit(2);
            }
        };

        for anomaly in &scenario_run.anomaly_records {
            warn!(
                match_id = %match_id,
                scenario = %scenario.name,
                seed = scenario.seed,
                tick = anomaly.tick,
                message = %anomaly.message,
                "anomaly detected"
            );
        }

        if !scenario_run.result.anomalies.is_empty() {
            has_anomaly = true;
        }
        total_anomalies += scenario_run.anomaly_records.len();
        total_duration_ms += scenario_run.result.duration_ms;
        *reason_counts
            .entry(game_over_reason_key(scenario_run.result.reason))
            .or_insert(0) += 1;

        info!(
            match_id = %match_id,
            scenario = %scenario.name,
            seed = scenario.seed,
            tick = scenario_run.finished_tick,
            reason = %game_over_reason_key(scenario_run.result.reason),
            duration_ms = scenario_run.result.duration_ms,
            waves = scenario_run.result.waves,
            possessions = scenario_run.result.possessions,
            anomaly_count = scenario_run.anomaly_records.len(),
            "scenario finished"
        );

        match serde_json::to_string(&scenario_run.result) {
            Ok(line) => println!("{line}"),
            Err(serialize_error) => {
                error!(error = %serialize_error, "scenario result not serializable")
            }
        }
        scenario_results.push(scenario_run.result);
    }

    let run_finished_at_ms = now_ms();
    let summary = build_run_summary(
        match_id.clone(),
        run_started_at_ms,
        run_finished_at_ms,
        scenario_results,
        reason_counts,
        total_anomalies,
        total_duration_ms,
    );

    let mut summary_out_written: Option<String> = None;
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(write_error) = write_summary(path, &summary) {
            error!(
                match_id = %match_id,
                path = %path.display(),
                error = %write_error,
                "summary write failed"
            );
            std::process::exit(2);
        }
        summary_out_written = Some(path.to_string_lossy().to_string());
    }

    info!(
        match_id = %match_id,
        scenario_count = summary.scenario_count,
        anomaly_count = summary.anomaly_count,
        average_duration_ms = summary.average_duration_ms,
        summary_out = ?summary_out_written,
        "run finished"
    );

    if has_anomaly {
        std::process::exit(1);
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run_scenario(
    scenario: &Scenario,
    settings: &GameSettings,
) -> Result<ScenarioRunResult, ConfigError> {
    let time_limit_ms = scenario.minutes * 60_000;
    let mut engine = GameEngine::new(
        settings.clone(),
        scenario.seed,
        GameEngineOptions {
            autopilot: true,
            time_limit_ms: Some(time_limit_ms),
        },
    )?;

    let max_alive = settings.spawn.max_alive;
    let mut damage_events = 0;
    let mut phase_changes = 0;
    let mut rejected_phase_changes = 0;
    let mut anomalies = Vec::new();
    let mut anomaly_records = Vec::new();
    let mut anomaly_seen = HashSet::new();
    let mut tick_safety = 0u64;
    let mut last_tick = 0u64;
    let mut last_world_ms = 0u64;
    let mut last_paused = false;

    while !engine.is_ended() {
        engine.step(TICK_MS);
        let snapshot = engine.build_snapshot(true);
        last_tick = snapshot.tick;
        for message in
            collect_snapshot_anomalies(&snapshot, max_alive, last_paused, last_world_ms)
        {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                snapshot.tick,
                message,
            );
        }
        last_world_ms = snapshot.now_ms;
        last_paused = snapshot.phase.time_scale <= 0.0;
        tick_safety += 1;
        if tick_safety > time_limit_ms / TICK_MS + 20 {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                snapshot.tick,
                "tick safety limit exceeded".to_string(),
            );
            break;
        }

        for event in &snapshot.events {
            match event {
                RuntimeEvent::Damaged { .. } => damage_events += 1,
                RuntimeEvent::PhaseChanged { .. } => phase_changes += 1,
                RuntimeEvent::PhaseChangeRejected { .. } => rejected_phase_changes += 1,
                _ => {}
            }
        }
    }

    let summary = engine.build_summary();
    Ok(ScenarioRunResult {
        result: ScenarioResultLine {
            scenario: scenario.name.clone(),
            seed: scenario.seed,
            minutes: scenario.minutes,
            reason: summary.reason,
            final_phase: summary.final_phase,
            duration_ms: summary.duration_ms,
            real_duration_ms: summary.real_duration_ms,
            waves: summary.waves,
            spirits_spawned: summary.spirits_spawned,
            spirits_banished: summary.spirits_banished,
            possessions: summary.possessions,
            shots_fired: summary.shots_fired,
            damage_events,
            phase_changes,
            rejected_phase_changes,
            anomalies,
        },
        anomaly_records,
        finished_tick: last_tick,
    })
}

fn collect_snapshot_anomalies(
    snapshot: &Snapshot,
    max_alive: usize,
    previous_paused: bool,
    previous_world_ms: u64,
) -> Vec<String> {
    let mut anomalies = Vec::new();

    for entity in &snapshot.entities {
        if !entity.health.is_finite() || entity.health < 0.0 || entity.health > entity.max_health {
            anomalies.push(format!(
                "health out of range: {} {}/{}",
                entity.id, entity.health, entity.max_health
            ));
        }
        if !(entity.x.is_finite() && entity.y.is_finite()) {
            anomalies.push(format!("non-finite position: {}", entity.id));
        }
    }

    let controlled = snapshot
        .entities
        .iter()
        .filter(|entity| entity.controlled)
        .count();
    if controlled > 1 {
        anomalies.push(format!("{controlled} player-controlled entities"));
    }

    let hostiles = snapshot
        .entities
        .iter()
        .filter(|entity| entity.kind == EntityKind::Spirit)
        .count();
    if hostiles > max_alive {
        anomalies.push(format!("spirit population {hostiles} above cap {max_alive}"));
    }

    // A pause set during a tick only holds the clock from the next tick on.
    if previous_paused && snapshot.now_ms != previous_world_ms {
        anomalies.push("world time advanced while paused".to_string());
    }
    anomalies
}

fn resolve_scenarios(cli: &Cli) -> Vec<Scenario> {
    let seed = normalize_seed(cli.seed.unwrap_or_else(|| now_ms()));

    if cli.single || cli.minutes.is_some() {
        let minutes = cli.minutes.unwrap_or(3).clamp(1, 60);
        return vec![Scenario {
            name: format!("custom-{minutes}m"),
            minutes,
            seed,
        }];
    }

    vec![
        Scenario {
            name: "quick-check".to_string(),
            minutes: 3,
            seed,
        },
        Scenario {
            name: "full-cycle".to_string(),
            minutes: 15,
            seed: normalize_seed(seed as u64 + 1),
        },
    ]
}

fn normalize_seed(seed: u64) -> u32 {
    seed as u32
}

fn push_anomaly(
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
    tick: u64,
    message: String,
) {
    anomaly_records.push(AnomalyRecord {
        tick,
        message: message.clone(),
    });
    if anomaly_seen.insert(message.clone()) {
        anomalies.push(message);
    }
}

fn default_match_id(seed: u32, timestamp_ms: u64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_run_summary(
    match_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    scenarios: Vec<ScenarioResultLine>,
    reason_counts: BTreeMap<String, usize>,
    anomaly_count: usize,
    total_duration_ms: u64,
) -> RunSummary {
    let scenario_count = scenarios.len();
    let average_duration_ms = if scenario_count == 0 {
        0
    } else {
        total_duration_ms / scenario_count as u64
    };
    RunSummary {
        match_id,
        started_at_ms,
        finished_at_ms,
        scenario_count,
        anomaly_count,
        average_duration_ms,
        reason_counts,
        scenarios,
    }
}

fn game_over_reason_key(reason: Option<GameOverReason>) -> String {
    match reason {
        Some(GameOverReason::Drowned) => "drowned",
        Some(GameOverReason::Banished) => "banished",
        Some(GameOverReason::TimeLimit) => "time_limit",
        None => "unfinished",
    }
    .to_string()
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, summary_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_scenario_result(
        reason: Option<GameOverReason>,
        duration_ms: u64,
    ) -> ScenarioResultLine {
        ScenarioResultLine {
            scenario: "test".to_string(),
            seed: 42,
            minutes: 1,
            reason,
            final_phase: GamePhase::Fishing,
            duration_ms,
            real_duration_ms: duration_ms,
            waves: 0,
            spirits_spawned: 0,
            spirits_banished: 0,
            possessions: 0,
            shots_fired: 0,
            damage_events: 0,
            phase_changes: 0,
            rejected_phase_changes: 0,
            anomalies: Vec::new(),
        }
    }

    #[test]
    fn default_match_id_contains_seed_and_timestamp() {
        assert_eq!(default_match_id(42, 123456789), "sim-42-123456789");
    }

    #[test]
    fn build_run_summary_calculates_average_duration() {
        let summary = build_run_summary(
            "sim-42-1".to_string(),
            1,
            2,
            vec![
                make_scenario_result(Some(GameOverReason::TimeLimit), 60_000),
                make_scenario_result(Some(GameOverReason::Drowned), 90_000),
            ],
            BTreeMap::from([
                ("time_limit".to_string(), 1usize),
                ("drowned".to_string(), 1usize),
            ]),
            1,
            150_000,
        );
        assert_eq!(summary.average_duration_ms, 75_000);
        assert_eq!(summary.scenario_count, 2);
    }

    #[test]
    fn write_summary_returns_error_when_parent_does_not_exist() {
        let target = std::env::temp_dir()
            .join(format!("deepbound-missing-{}", now_ms()))
            .join("summary.json");
        let summary = build_run_summary(
            "sim-1-1".to_string(),
            1,
            2,
            vec![make_scenario_result(Some(GameOverReason::TimeLimit), 60_000)],
            BTreeMap::from([("time_limit".to_string(), 1usize)]),
            0,
            60_000,
        );
        assert!(write_summary(&target, &summary).is_err());
    }

    #[test]
    fn push_anomaly_keeps_records_and_deduplicates_summary_messages() {
        let mut anomalies = Vec::new();
        let mut records = Vec::new();
        let mut seen = HashSet::new();
        push_anomaly(&mut anomalies, &mut records, &mut seen, 10, "same anomaly".to_string());
        push_anomaly(&mut anomalies, &mut records, &mut seen, 11, "same anomaly".to_string());

        assert_eq!(anomalies.len(), 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tick, 10);
        assert_eq!(records[1].tick, 11);
    }

    #[test]
    fn short_scenario_runs_clean_to_its_time_limit() {
        let mut settings = GameSettings::default();
        settings.phase.fishing_duration_ms = 2_000;
        let scenario = Scenario {
            name: "unit".to_string(),
            minutes: 1,
            seed: 5,
        };
        let run = run_scenario(&scenario, &settings).expect("valid settings");
        assert!(run.result.anomalies.is_empty(), "{:?}", run.result.anomalies);
        assert!(run.result.phase_changes >= 1);
        assert!(run.result.reason.is_some());
    }

    #[test]
    fn reason_keys_cover_unfinished_runs() {
        assert_eq!(game_over_reason_key(None), "unfinished");
        assert_eq!(game_over_reason_key(Some(GameOverReason::Banished)), "banished");
    }
}
