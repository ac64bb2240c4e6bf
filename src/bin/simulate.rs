//! Headless soak runner: drives a full session with a random-walk player,
//! checks the board invariant as it goes, and emits a JSON summary.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{SecondsFormat, Utc};
use clap::Parser;
use rune_halls_server::factory::RandomSpawnFactory;
use rune_halls_server::rng::Rng;
use rune_halls_server::session::{Session, SessionOptions};
use rune_halls_server::types::{Direction, EndReason, HallKind, PickupKind, SessionEvent};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long)]
    seed: Option<u32>,
    /// Starting hall (earth, air, water, fire).
    #[arg(long)]
    hall: Option<String>,
    /// Override the hall time budget, in seconds.
    #[arg(long)]
    time_limit: Option<i64>,
    /// Player action cadence in milliseconds.
    #[arg(long, default_value_t = 300)]
    step_ms: u64,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize)]
struct RunStats {
    steps: u64,
    #[serde(rename = "hallsCleared")]
    halls_cleared: u32,
    #[serde(rename = "hitsTaken")]
    hits_taken: u32,
    #[serde(rename = "pickupsCollected")]
    pickups_collected: u32,
    #[serde(rename = "runesRevealed")]
    runes_revealed: u32,
    anomalies: Vec<String>,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    seed: u32,
    hall: HallKind,
    #[serde(rename = "startedAt")]
    started_at: String,
    #[serde(rename = "finishedAt")]
    finished_at: String,
    reason: Option<EndReason>,
    #[serde(flatten)]
    stats: RunStats,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let seed = cli.seed.unwrap_or_else(|| now_ms() as u32);
    let starting_hall = cli
        .hall
        .as_deref()
        .map(|raw| HallKind::parse(raw).expect("hall must be earth, air, water or fire"))
        .unwrap_or(HallKind::Earth);
    let options = SessionOptions {
        seed,
        starting_hall,
        time_limit_secs_override: cli.time_limit,
    };
    let started_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    info!(seed, hall = ?starting_hall, "simulation starting");

    let factory = Box::new(RandomSpawnFactory::new(seed.rotate_left(8)));
    let session = Session::new(options, factory).expect("a fresh hall always lays out");
    let mut events = session.subscribe();
    let mut driver_rng = Rng::seeded(seed.rotate_left(24));
    let mut stats = RunStats::default();
    let mut reason = None;

    let mut step_timer = tokio::time::interval(std::time::Duration::from_millis(cli.step_ms));
    loop {
        tokio::select! {
            _ = step_timer.tick() => {
                if let Some(done) = session.game_over() {
                    reason = Some(done);
                    break;
                }
                drive_player(&session, &mut driver_rng, &mut stats);
                if !session.rep_ok() {
                    stats.anomalies.push(format!("board invariant broken at step {}", stats.steps));
                    warn!("board invariant broken, aborting run");
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(SessionEvent::HallCleared { hall }) => {
                    stats.halls_cleared += 1;
                    info!(?hall, "hall cleared, advancing");
                    session.advance_hall().await;
                }
                Ok(SessionEvent::GameOver { reason: done }) => {
                    reason = Some(done);
                    break;
                }
                Ok(SessionEvent::PlayerDamaged { .. }) => stats.hits_taken += 1,
                Ok(SessionEvent::PickupCollected { .. }) => stats.pickups_collected += 1,
                Ok(SessionEvent::RuneRevealed { .. }) => stats.runes_revealed += 1,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    session.end().await;
    let summary = RunSummary {
        seed,
        hall: starting_hall,
        started_at,
        finished_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        reason,
        stats,
    };
    let rendered =
        serde_json::to_string_pretty(&summary).expect("summary always serializes");
    println!("{rendered}");
    if let Some(path) = cli.summary_out {
        if let Err(error) = std::fs::write(&path, &rendered) {
            warn!(path = %path.display(), %error, "failed to write summary file");
        }
    }
}

/// One player action: a random step, then an interaction attempt on a
/// random adjacent cell, with the occasional item use thrown in.
fn drive_player(session: &Session, rng: &mut Rng, stats: &mut RunStats) {
    stats.steps += 1;
    let dir = Direction::ALL[rng.pick_index(Direction::ALL.len())];
    session.step_player(dir);

    let player = session.player();
    let at = rune_halls_server::types::Coord::new(player.x, player.y);
    let target = at.offset(Direction::ALL[rng.pick_index(Direction::ALL.len())]);
    session.interact(target);

    if rng.chance(0.05) {
        for item in [PickupKind::Cloak, PickupKind::Reveal] {
            let _ = session.use_item(item, None);
        }
        let _ = session.use_item(PickupKind::LureGem, Some(dir));
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
