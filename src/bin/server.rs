use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use rand::Rng as _;
use rune_halls_server::factory::RandomSpawnFactory;
use rune_halls_server::protocol::{parse_client_command, ClientCommand};
use rune_halls_server::session::{Session, SessionOptions};
use rune_halls_server::types::{Coord, HallKind, SessionEvent};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler));

    let app = if let Some(static_dir) = resolve_static_dir() {
        let index_file = static_dir.join("index.html");
        info!(root = %static_dir.to_string_lossy(), "serving static client files");
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        warn!("no static client directory found; serving the game API only");
        app
    };

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind server socket");

    info!(port, "listening");
    axum::serve(listener, app)
        .await
        .expect("server runtime failed");
}

fn resolve_static_dir() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var("STATIC_DIR") {
        let path = PathBuf::from(raw);
        if path.join("index.html").is_file() {
            return Some(path);
        }
    }
    let candidates = [PathBuf::from("dist/client"), PathBuf::from("../client")];
    candidates
        .into_iter()
        .find(|path| path.join("index.html").is_file())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn ws_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(handle_socket)
}

struct Connection {
    id: String,
    name: String,
    session: Option<Arc<Session>>,
    forwarder: Option<JoinHandle<()>>,
}

/// One connection drives one session: commands in, events and state out.
async fn handle_socket(socket: WebSocket) {
    let id = format!("conn_{}", NEXT_ID.fetch_add(1, Ordering::Relaxed));
    info!(conn = %id, "client connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(256);
    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    let mut conn = Connection {
        id,
        name: "Player".to_string(),
        session: None,
        forwarder: None,
    };

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };
        match message {
            Message::Text(raw) => {
                let Some(command) = parse_client_command(raw.as_str()) else {
                    continue;
                };
                handle_command(&mut conn, command, &tx).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    info!(conn = %conn.id, "client disconnected");
    if let Some(forwarder) = conn.forwarder.take() {
        forwarder.abort();
    }
    if let Some(session) = conn.session.take() {
        session.end().await;
    }
    writer.abort();
}

async fn handle_command(conn: &mut Connection, command: ClientCommand, tx: &mpsc::Sender<String>) {
    match command {
        ClientCommand::Hello { name } => {
            conn.name = sanitize_name(&name);
            send(tx, json!({ "type": "welcome", "name": conn.name })).await;
        }
        ClientCommand::Start {
            hall,
            seed,
            time_limit_secs,
        } => {
            if let Some(forwarder) = conn.forwarder.take() {
                forwarder.abort();
            }
            if let Some(previous) = conn.session.take() {
                previous.end().await;
            }

            let seed = seed.unwrap_or_else(|| rand::rng().random());
            let options = SessionOptions {
                seed,
                starting_hall: hall.unwrap_or(HallKind::Earth),
                time_limit_secs_override: time_limit_secs,
            };
            let factory = Box::new(RandomSpawnFactory::new(seed.rotate_left(16)));
            match Session::new(options, factory) {
                Ok(session) => {
                    let session = Arc::new(session);
                    info!(conn = %conn.id, seed, hall = ?options.starting_hall, "game started");
                    send(
                        tx,
                        json!({
                            "type": "started",
                            "seed": seed,
                            "hall": options.starting_hall,
                            "timeLimitSecs": session.total_secs(),
                        }),
                    )
                    .await;
                    send(tx, state_payload(&session)).await;
                    conn.forwarder = Some(spawn_forwarder(Arc::clone(&session), tx.clone()));
                    conn.session = Some(session);
                }
                Err(error) => {
                    send_error(tx, &format!("could not start a game: {error}")).await;
                }
            }
        }
        ClientCommand::Step { dir } => {
            if let Some(session) = &conn.session {
                session.step_player(dir);
            }
        }
        ClientCommand::Interact { x, y } => {
            if let Some(session) = &conn.session {
                session.interact(Coord::new(x, y));
            }
        }
        ClientCommand::UseItem { item, dir } => {
            if let Some(session) = &conn.session {
                if let Err(error) = session.use_item(item, dir) {
                    send_error(tx, &error.to_string()).await;
                }
            }
        }
        ClientCommand::Freeze => {
            if let Some(session) = &conn.session {
                session.freeze();
            }
        }
        ClientCommand::Unfreeze => {
            if let Some(session) = &conn.session {
                session.unfreeze();
            }
        }
        ClientCommand::NextHall => {
            if let Some(session) = &conn.session {
                if session.advance_hall().await {
                    send(tx, state_payload(session)).await;
                } else {
                    send_error(tx, "there is no next hall").await;
                }
            }
        }
        ClientCommand::Save => {
            if let Some(session) = &conn.session {
                send(
                    tx,
                    json!({ "type": "snapshot", "snapshot": session.snapshot() }),
                )
                .await;
            }
        }
        ClientCommand::Load { snapshot } => {
            if let Some(session) = &conn.session {
                match session.restore(&snapshot).await {
                    Ok(()) => send(tx, state_payload(session)).await,
                    Err(error) => send_error(tx, &error.to_string()).await,
                }
            } else {
                send_error(tx, "start a game before loading").await;
            }
        }
        ClientCommand::Ping { t } => {
            send(tx, json!({ "type": "pong", "t": t })).await;
        }
    }
}

fn spawn_forwarder(session: Arc<Session>, tx: mpsc::Sender<String>) -> JoinHandle<()> {
    let mut events = session.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let payload = if matches!(event, SessionEvent::Changed) {
                        state_payload(&session)
                    } else {
                        json!({ "type": "event", "event": event })
                    };
                    if tx.send(payload.to_string()).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn state_payload(session: &Session) -> Value {
    json!({
        "type": "state",
        "hall": session.hall_kind(),
        "remainingSecs": session.remaining_secs(),
        "totalSecs": session.total_secs(),
        "player": session.player(),
        "occupants": session.occupant_views(),
        "runes": session.revealed_runes(),
        "monsterCounts": session.monster_counts(),
        "frozen": session.is_frozen(),
        "gameOver": session.game_over(),
    })
}

async fn send(tx: &mpsc::Sender<String>, payload: Value) {
    let _ = tx.send(payload.to_string()).await;
}

async fn send_error(tx: &mpsc::Sender<String>, message: &str) {
    let _ = tx
        .send(json!({ "type": "error", "message": message }).to_string())
        .await;
}

fn sanitize_name(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "Player".to_string();
    }
    trimmed.chars().take(16).collect()
}
