use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use deepbound::config::GameSettings;
use deepbound::constants::TICK_MS;
use deepbound::engine::{GameEngine, GameEngineOptions};
use deepbound::protocol::{parse_client_message, ParsedClientMessage};
use deepbound::types::InputSnapshot;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tower_http::services::{ServeDir, ServeFile};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Pilot input older than this hands the body back to the autopilot.
const INPUT_STALE_MS: u64 = 500;
const OUTBOUND_QUEUE: usize = 256;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type SharedState = Arc<Mutex<ServerState>>;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// JSON settings file; missing fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    json_logs: bool,
}

#[derive(Clone)]
struct ClientContext {
    tx: mpsc::Sender<OutboundMessage>,
    name: Option<String>,
    spectator: bool,
}

#[derive(Clone, Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

struct ServerState {
    settings: GameSettings,
    clients: HashMap<String, ClientContext>,
    /// The one client whose input drives the controlled body.
    pilot: Option<String>,
    last_input_at_ms: Option<u64>,
    game: Option<GameEngine>,
}

impl ServerState {
    fn new(settings: GameSettings) -> Self {
        Self {
            settings,
            clients: HashMap::new(),
            pilot: None,
            last_input_at_ms: None,
            game: None,
        }
    }

    fn start_game(&mut self, seed: u32) -> bool {
        match GameEngine::new(self.settings.clone(), seed, engine_options()) {
            Ok(engine) => {
                info!(seed, "game started");
                self.game = Some(engine);
                self.last_input_at_ms = None;
                true
            }
            Err(config_error) => {
                error!(seed, error = %config_error, "engine refused settings");
                self.game = None;
                false
            }
        }
    }
}

fn engine_options() -> GameEngineOptions {
    GameEngineOptions {
        autopilot: true,
        time_limit_ms: None,
    }
}

#[tokio::main]
async fn main() {
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

    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let mut server_state = ServerState::new(settings);
    if !server_state.start_game(random_seed()) {
        std::process::exit(2);
    }
    let state = Arc::new(Mutex::new(server_state));
    start_tick_loop(state.clone());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let app = if let Some(static_dir) = resolve_static_dir() {
        let index_file = static_dir.join("index.html");
        info!(root = %static_dir.display(), "serving static client");
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        warn!("static client not found; serving /ws and /healthz only");
        app
    };

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(bind_error) => {
            error!(addr = %bind_addr, error = %bind_error, "failed to bind server socket");
            std::process::exit(2);
        }
    };

    info!(port, "listening");
    if let Err(serve_error) = axum::serve(listener, app).await {
        error!(error = %serve_error, "server runtime failed");
        std::process::exit(1);
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn resolve_static_dir() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var("STATIC_DIR") {
        let path = PathBuf::from(raw);
        if path.join("index.html").is_file() {
            return Some(path);
        }
    }

    [PathBuf::from("client"), PathBuf::from("dist/client")]
        .into_iter()
        .find(|path| path.join("index.html").is_file())
}

async fn healthz(State(state): State<SharedState>) -> impl IntoResponse {
    let guard = state.lock().await;
    let phase = guard.game.as_ref().map(|game| game.current_phase().key());
    Json(json!({ "ok": true, "phase": phase, "clients": guard.clients.len() }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_id("client");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_QUEUE);

    {
        let mut guard = state.lock().await;
        guard.clients.insert(
            client_id.clone(),
            ClientContext {
                tx: tx.clone(),
                name: None,
                spectator: true,
            },
        );
    }
    info!(client = %client_id, "client connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                let mut guard = state.lock().await;
                handle_client_message(&mut guard, &client_id, raw.as_str());
            }
            Message::Binary(raw) => {
                let mut guard = state.lock().await;
                match std::str::from_utf8(&raw) {
                    Ok(text) => handle_client_message(&mut guard, &client_id, text),
                    Err(_) => send_error(&mut guard, &client_id, "invalid utf8 message"),
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    {
        let mut guard = state.lock().await;
        disconnect_client(&mut guard, &client_id);
    }
    drop(tx);
    let _ = writer.await;
}

fn handle_client_message(state: &mut ServerState, client_id: &str, raw: &str) {
    let Some(message) = parse_client_message(raw) else {
        send_error(state, client_id, "invalid message");
        return;
    };

    match message {
        ParsedClientMessage::Hello { name, spectator } => {
            handle_hello(state, client_id, name, spectator);
        }
        ParsedClientMessage::Input(input) => {
            if state.pilot.as_deref() != Some(client_id) {
                return;
            }
            apply_pilot_input(state, input, now_ms());
        }
        ParsedClientMessage::Restart { seed } => {
            if !may_restart(state, client_id) {
                send_error(state, client_id, "only the pilot can restart");
                return;
            }
            let seed = seed.unwrap_or_else(random_seed);
            if state.start_game(seed) {
                broadcast(
                    state,
                    &json!({ "type": "restarted", "seed": seed }),
                    QueuePolicy::DisconnectOnFull,
                );
            } else {
                send_error(state, client_id, "restart refused");
            }
        }
        ParsedClientMessage::Ping { t } => {
            send_to_client(
                state,
                client_id,
                &json!({ "type": "pong", "t": t, "serverMs": now_ms() }),
                QueuePolicy::DropOnFull,
            );
        }
    }
}

fn handle_hello(state: &mut ServerState, client_id: &str, name: String, spectator: bool) {
    let Some(client) = state.clients.get_mut(client_id) else {
        return;
    };
    let name = sanitize_name(&name);
    client.name = Some(name.clone());
    client.spectator = spectator;

    if !spectator && state.pilot.is_none() {
        state.pilot = Some(client_id.to_string());
        state.last_input_at_ms = None;
        info!(client = %client_id, name = %name, "pilot assigned");
    }

    let pilot = state.pilot.as_deref() == Some(client_id);
    let seed = state.game.as_ref().map(|game| game.seed);
    let welcome = json!({
        "type": "welcome",
        "clientId": client_id,
        "name": name,
        "pilot": pilot,
        "seed": seed,
        "tickMs": TICK_MS,
    });
    send_to_client(state, client_id, &welcome, QueuePolicy::DisconnectOnFull);
}

fn may_restart(state: &ServerState, client_id: &str) -> bool {
    match state.pilot.as_deref() {
        Some(pilot) => pilot == client_id,
        None => true,
    }
}

fn apply_pilot_input(state: &mut ServerState, input: InputSnapshot, at_ms: u64) {
    state.last_input_at_ms = Some(at_ms);
    if let Some(game) = state.game.as_mut() {
        game.set_input(Some(input));
    }
}

fn input_is_stale(last_input_at_ms: Option<u64>, now: u64) -> bool {
    match last_input_at_ms {
        Some(at) => now.saturating_sub(at) > INPUT_STALE_MS,
        None => true,
    }
}

fn disconnect_client(state: &mut ServerState, client_id: &str) {
    if let Some(client) = state.clients.remove(client_id) {
        let _ = client.tx.try_send(OutboundMessage::Close {
            code: 1000,
            reason: "bye".to_string(),
        });
    }
    if state.pilot.as_deref() == Some(client_id) {
        state.pilot = None;
        state.last_input_at_ms = None;
        if let Some(game) = state.game.as_mut() {
            game.set_input(None);
        }
        info!(client = %client_id, "pilot left, autopilot resumes");
    } else {
        info!(client = %client_id, "client disconnected");
    }
}

fn start_tick_loop(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            tick_game(&mut guard);
        }
    });
}

fn tick_game(state: &mut ServerState) {
    let stale = input_is_stale(state.last_input_at_ms, now_ms());
    let snapshot = {
        let Some(game) = state.game.as_mut() else {
            return;
        };
        if stale {
            game.set_input(None);
        }
        game.step(TICK_MS);
        game.build_snapshot(true)
    };

    broadcast(
        state,
        &json!({
            "type": "state",
            "snapshot": snapshot,
        }),
        QueuePolicy::DropOnFull,
    );

    let summary = {
        let Some(game) = state.game.as_ref() else {
            return;
        };
        if game.is_ended() {
            Some(game.build_summary())
        } else {
            None
        }
    };

    if let Some(summary) = summary {
        info!(
            reason = ?summary.reason,
            duration_ms = summary.duration_ms,
            banished = summary.spirits_banished,
            "game over"
        );
        broadcast(
            state,
            &json!({
                "type": "game_over",
                "summary": summary,
            }),
            QueuePolicy::DisconnectOnFull,
        );
        state.game = None;
        state.last_input_at_ms = None;
    }
}

fn send_to_client(state: &mut ServerState, client_id: &str, message: &Value, policy: QueuePolicy) {
    let send_failed = match state.clients.get(client_id) {
        Some(client) => client
            .tx
            .try_send(OutboundMessage::Text(message.to_string()))
            .is_err(),
        None => false,
    };
    if send_failed && policy == QueuePolicy::DisconnectOnFull {
        disconnect_client(state, client_id);
    }
}

fn broadcast(state: &mut ServerState, message: &Value, policy: QueuePolicy) {
    let payload = message.to_string();
    let mut failed_clients = Vec::new();
    for (client_id, client) in &state.clients {
        // Clients start receiving frames once they have said hello.
        if client.name.is_none() {
            continue;
        }
        if client
            .tx
            .try_send(OutboundMessage::Text(payload.clone()))
            .is_err()
            && policy == QueuePolicy::DisconnectOnFull
        {
            failed_clients.push(client_id.clone());
        }
    }
    for client_id in failed_clients {
        warn!(client = %client_id, "outbound queue full, disconnecting");
        disconnect_client(state, &client_id);
    }
}

fn send_error(state: &mut ServerState, client_id: &str, message: &str) {
    send_to_client(
        state,
        client_id,
        &json!({ "type": "error", "message": message }),
        QueuePolicy::DropOnFull,
    );
}

fn sanitize_name(value: &str) -> String {
    let trimmed: String = value.trim().chars().take(16).collect();
    if trimmed.is_empty() {
        "Sailor".to_string()
    } else {
        trimmed
    }
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

fn random_seed() -> u32 {
    rand::rng().random()
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
