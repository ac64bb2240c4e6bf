//! One running game: the hall behind its mutex, the countdown, the spawn
//! scheduler, and every live entity worker. The session owns the shared
//! pause flag and the shutdown signal, routes worker directives, and turns
//! terminal conditions into a single game-over notification.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::clock::{run_countdown, Countdown};
use crate::constants::{
    hall_time_limit_secs, BOARD_SIZE, CLOAK_DURATION_MS, EXTRA_TIME_SECS, RUNE_HINT_SPAN,
    RUNE_HINT_VALID_MS,
};
use crate::factory::SpawnFactory;
use crate::hall::{Hall, InteractOutcome, PlaceError, UseError};
use crate::layout;
use crate::rng::Rng;
use crate::scheduler::run_scheduler;
use crate::types::{
    Coord, Direction, EndReason, EntityId, HallKind, MonsterCounts, MonsterKind, OccupantKind,
    PickupKind, PlayerView, SessionEvent, SessionSnapshot,
};
use crate::workers::{
    archer::ArcherWorker, fighter::FighterWorker, pickup::PickupWorker, run_worker,
    wizard::WizardWorker, Directive, WorkerContext,
};

#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    pub seed: u32,
    pub starting_hall: HallKind,
    pub time_limit_secs_override: Option<i64>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            seed: 1,
            starting_hall: HallKind::Earth,
            time_limit_secs_override: None,
        }
    }
}

pub(crate) struct WorkerHandle {
    pub id: EntityId,
    pub cancel: watch::Sender<bool>,
    pub task: JoinHandle<()>,
}

pub(crate) struct SessionShared {
    pub hall: Arc<Mutex<Hall>>,
    pub clock: Arc<Countdown>,
    pub paused: watch::Sender<bool>,
    pub shutdown: watch::Sender<bool>,
    pub events: broadcast::Sender<SessionEvent>,
    pub workers: Mutex<Vec<WorkerHandle>>,
    pub directives: mpsc::Sender<Directive>,
    pub ended: Mutex<Option<EndReason>>,
    seed_counter: AtomicU32,
}

impl SessionShared {
    pub(crate) fn lock_hall(&self) -> MutexGuard<'_, Hall> {
        self.hall.lock().expect("hall mutex is never poisoned")
    }

    pub(crate) fn next_seed(&self) -> u32 {
        self.seed_counter.fetch_add(0x9e37_79b9, Ordering::Relaxed)
    }

    fn context(&self, id: EntityId, cancel: watch::Receiver<bool>) -> WorkerContext {
        WorkerContext {
            id,
            hall: Arc::clone(&self.hall),
            clock: Arc::clone(&self.clock),
            directives: self.directives.clone(),
            paused: self.paused.subscribe(),
            cancel,
            shutdown: self.shutdown.subscribe(),
        }
    }

    pub(crate) fn cancel_workers(&self, ids: &[EntityId]) {
        let workers = self.workers.lock().expect("worker list mutex");
        for handle in workers.iter() {
            if ids.contains(&handle.id) {
                let _ = handle.cancel.send(true);
            }
        }
    }

    pub(crate) fn live_worker_count(&self) -> usize {
        self.workers
            .lock()
            .expect("worker list mutex")
            .iter()
            .filter(|handle| !handle.task.is_finished())
            .count()
    }

    async fn drain_workers(&self) {
        let handles: Vec<WorkerHandle> = {
            let mut workers = self.workers.lock().expect("worker list mutex");
            std::mem::take(&mut *workers)
        };
        for handle in &handles {
            let _ = handle.cancel.send(true);
        }
        for handle in handles {
            let _ = handle.task.await;
        }
    }
}

pub(crate) fn start_monster_worker(shared: &Arc<SessionShared>, id: EntityId, kind: MonsterKind) {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let ctx = shared.context(id, cancel_rx);
    let task = match kind {
        MonsterKind::Archer => tokio::spawn(run_worker(ArcherWorker, ctx)),
        MonsterKind::Fighter => {
            tokio::spawn(run_worker(FighterWorker::new(shared.next_seed()), ctx))
        }
        MonsterKind::Wizard => tokio::spawn(run_worker(WizardWorker::new(), ctx)),
    };
    shared
        .workers
        .lock()
        .expect("worker list mutex")
        .push(WorkerHandle {
            id,
            cancel: cancel_tx,
            task,
        });
}

pub(crate) fn start_pickup_worker(shared: &Arc<SessionShared>, id: EntityId) {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let ctx = shared.context(id, cancel_rx);
    let task = tokio::spawn(run_worker(PickupWorker::new(), ctx));
    shared
        .workers
        .lock()
        .expect("worker list mutex")
        .push(WorkerHandle {
            id,
            cancel: cancel_tx,
            task,
        });
}

struct CoreTasks {
    clock: JoinHandle<()>,
    scheduler: JoinHandle<()>,
    supervisor: JoinHandle<()>,
}

pub struct Session {
    shared: Arc<SessionShared>,
    tasks: Mutex<Option<CoreTasks>>,
}

impl Session {
    pub fn new(
        options: SessionOptions,
        factory: Box<dyn SpawnFactory>,
    ) -> Result<Self, PlaceError> {
        let (events, _) = broadcast::channel(1024);
        let hall = layout::build_hall(
            options.starting_hall,
            events.clone(),
            Rng::seeded(options.seed),
        )?;
        let total = options
            .time_limit_secs_override
            .unwrap_or_else(|| hall_time_limit_secs(options.starting_hall));

        let (paused, _) = watch::channel(false);
        let (shutdown, _) = watch::channel(false);
        let (directive_tx, directive_rx) = mpsc::channel(64);
        let shared = Arc::new(SessionShared {
            hall: Arc::new(Mutex::new(hall)),
            clock: Arc::new(Countdown::new(total)),
            paused,
            shutdown,
            events: events.clone(),
            workers: Mutex::new(Vec::new()),
            directives: directive_tx,
            ended: Mutex::new(None),
            seed_counter: AtomicU32::new(options.seed.wrapping_add(0x51ed_2701)),
        });

        let clock_task = tokio::spawn(run_countdown(
            Arc::clone(&shared.clock),
            shared.paused.subscribe(),
            shared.shutdown.subscribe(),
            events.clone(),
        ));
        let scheduler_task = tokio::spawn(run_scheduler(Arc::clone(&shared), factory));
        let supervisor_task = tokio::spawn(run_supervisor(
            Arc::clone(&shared),
            directive_rx,
            events.subscribe(),
        ));

        info!(hall = ?options.starting_hall, seed = options.seed, "session started");
        Ok(Self {
            shared,
            tasks: Mutex::new(Some(CoreTasks {
                clock: clock_task,
                scheduler: scheduler_task,
                supervisor: supervisor_task,
            })),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn freeze(&self) {
        info!("session frozen");
        let _ = self.shared.paused.send(true);
    }

    pub fn unfreeze(&self) {
        info!("session unfrozen");
        let _ = self.shared.paused.send(false);
    }

    pub fn is_frozen(&self) -> bool {
        *self.shared.paused.borrow()
    }

    pub fn game_over(&self) -> Option<EndReason> {
        *self.shared.ended.lock().expect("end state mutex")
    }

    /// Player step in one of the four directions; a blocked or out-of-board
    /// step is a no-op. Returns whether the player moved.
    pub fn step_player(&self, dir: Direction) -> bool {
        if self.game_over().is_some() {
            return false;
        }
        self.shared.lock_hall().step_player(dir).is_ok()
    }

    /// Player interaction with an adjacent cell: pickup collection, rune
    /// reveal, or a no-op.
    pub fn interact(&self, at: Coord) -> InteractOutcome {
        if self.game_over().is_some() {
            return InteractOutcome::Nothing;
        }
        let (outcome, hall_kind) = {
            let mut hall = self.shared.lock_hall();
            (hall.interact(at), hall.kind())
        };
        match outcome {
            InteractOutcome::Collected { id, kind } => {
                if kind == PickupKind::ExtraTime {
                    self.shared.clock.add_secs(EXTRA_TIME_SECS);
                }
                self.shared.cancel_workers(&[id]);
            }
            InteractOutcome::RuneRevealed => {
                let event = if hall_kind == HallKind::Fire {
                    SessionEvent::GameOver {
                        reason: EndReason::Victory,
                    }
                } else {
                    SessionEvent::HallCleared { hall: hall_kind }
                };
                let _ = self.shared.events.send(event);
            }
            InteractOutcome::Nothing => {}
        }
        outcome
    }

    /// Uses a stored item: cloak (archer immunity window), reveal (rune
    /// hint for the UI), or lure gem (thrown one cell in a direction).
    pub fn use_item(&self, kind: PickupKind, dir: Option<Direction>) -> Result<(), UseError> {
        if !kind.goes_to_inventory() {
            return Err(UseError::NotUsable);
        }
        let mut hall = self.shared.lock_hall();
        match kind {
            PickupKind::Cloak => {
                if !hall.take_item(kind) {
                    return Err(UseError::NotInInventory);
                }
                hall.activate_cloak(Instant::now() + Duration::from_millis(CLOAK_DURATION_MS));
                info!("cloak activated");
                Ok(())
            }
            PickupKind::Reveal => {
                if !hall.take_item(kind) {
                    return Err(UseError::NotInInventory);
                }
                if let Some(rune) = hall.rune_coord() {
                    let _ = self.shared.events.send(SessionEvent::RuneHint {
                        x: rune.x,
                        y: rune.y,
                        width: RUNE_HINT_SPAN.min(BOARD_SIZE - rune.x),
                        height: RUNE_HINT_SPAN.min(BOARD_SIZE - rune.y),
                        valid_ms: RUNE_HINT_VALID_MS,
                    });
                }
                Ok(())
            }
            PickupKind::LureGem => {
                let dir = dir.ok_or(UseError::NotUsable)?;
                let target = hall.player().at.offset(dir);
                if !target.in_bounds() {
                    return Err(UseError::OutOfBounds);
                }
                if !hall.take_item(kind) {
                    return Err(UseError::NotInInventory);
                }
                hall.place_lure(target)?;
                info!(x = target.x, y = target.y, "lure gem thrown");
                Ok(())
            }
            _ => Err(UseError::NotUsable),
        }
    }

    /// Level transition: drains this hall's workers, discards the board,
    /// and lays out the next hall with a fresh time budget. The player's
    /// lives and inventory carry over. Returns `false` after the final
    /// hall.
    pub async fn advance_hall(&self) -> bool {
        eprintln!("DBG advance_hall: start");
        let next = self.shared.lock_hall().kind().next();
        let Some(next) = next else {
            return false;
        };
        eprintln!("DBG advance_hall: before drain");
        self.shared.drain_workers().await;
        eprintln!("DBG advance_hall: after drain");
        let (lives, inventory) = {
            let hall = self.shared.lock_hall();
            (hall.player().lives, hall.player().inventory.clone())
        };
        let fresh = match layout::build_hall(
            next,
            self.shared.events.clone(),
            Rng::seeded(self.shared.next_seed()),
        ) {
            Ok(hall) => hall,
            Err(error) => {
                warn!(%error, "next hall could not be laid out");
                return false;
            }
        };
        {
            let mut hall = self.shared.lock_hall();
            *hall = fresh;
            hall.carry_over_player(lives, inventory);
        }
        eprintln!("DBG advance_hall: hall rebuilt, resetting clock");
        self.shared.clock.reset(hall_time_limit_secs(next));
        info!(hall = ?next, "advanced to the next hall");
        eprintln!("DBG advance_hall: returning true");
        true
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let hall = self.shared.lock_hall();
        SessionSnapshot {
            hall: hall.kind(),
            remaining_secs: self.shared.clock.remaining_secs(),
            total_secs: self.shared.clock.total_secs(),
            occupants: hall.occupant_views(),
            runes: hall.rune_views(),
            player: hall.player_view(),
            saved_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Rebuilds the board and the worker set from persisted plain data:
    /// one worker per live monster and pickup in the snapshot.
    pub async fn restore(&self, snapshot: &SessionSnapshot) -> Result<(), PlaceError> {
        self.shared.drain_workers().await;
        let fresh = Hall::from_snapshot(
            snapshot,
            self.shared.events.clone(),
            Rng::seeded(self.shared.next_seed()),
        )?;
        let monsters = fresh.monster_entries();
        let pickups = fresh.pickup_entries();
        {
            let mut hall = self.shared.lock_hall();
            *hall = fresh;
        }
        self.shared.clock.reset(snapshot.total_secs);
        self.shared.clock.set_remaining(snapshot.remaining_secs);
        for (id, record) in monsters {
            start_monster_worker(&self.shared, id, record.kind);
        }
        for (id, _) in pickups {
            start_pickup_worker(&self.shared, id);
        }
        info!("session restored from snapshot");
        Ok(())
    }

    /// Orderly teardown: signals shutdown, then waits for the clock, the
    /// scheduler, the supervisor, and every worker to finish.
    pub async fn end(&self) {
        eprintln!("DBG end: start");
        let _ = self.shared.shutdown.send(true);
        let tasks = self.tasks.lock().expect("task list mutex").take();
        if let Some(tasks) = tasks {
            eprintln!("DBG end: await clock");
            let _ = tasks.clock.await;
            eprintln!("DBG end: await scheduler");
            let _ = tasks.scheduler.await;
            eprintln!("DBG end: await supervisor");
            let _ = tasks.supervisor.await;
        }
        eprintln!("DBG end: drain");
        self.shared.drain_workers().await;
        info!("session ended");
    }

    pub fn hall_kind(&self) -> HallKind {
        self.shared.lock_hall().kind()
    }

    pub fn remaining_secs(&self) -> i64 {
        self.shared.clock.remaining_secs()
    }

    pub fn total_secs(&self) -> i64 {
        self.shared.clock.total_secs()
    }

    pub fn player(&self) -> PlayerView {
        self.shared.lock_hall().player_view()
    }

    pub fn monster_counts(&self) -> MonsterCounts {
        self.shared.lock_hall().monster_counts()
    }

    pub fn occupant_views(&self) -> Vec<crate::types::OccupantView> {
        self.shared.lock_hall().occupant_views()
    }

    /// Runes the player has uncovered, the only ones a UI may draw.
    pub fn revealed_runes(&self) -> Vec<crate::types::RuneView> {
        self.shared
            .lock_hall()
            .rune_views()
            .into_iter()
            .filter(|rune| rune.revealed)
            .collect()
    }

    pub fn free_cells(&self) -> Vec<Coord> {
        self.shared.lock_hall().free_cells().iter().copied().collect()
    }

    pub fn free_cell_count(&self) -> usize {
        self.shared.lock_hall().free_cells().len()
    }

    pub fn live_worker_count(&self) -> usize {
        self.shared.live_worker_count()
    }

    /// Board self-check, used by the headless soak runner.
    pub fn rep_ok(&self) -> bool {
        self.shared.lock_hall().rep_ok()
    }

    #[cfg(test)]
    pub(crate) fn test_hall(&self) -> Arc<Mutex<Hall>> {
        Arc::clone(&self.shared.hall)
    }

    #[cfg(test)]
    pub(crate) async fn test_inject(&self, directive: Directive) {
        self.shared
            .directives
            .send(directive)
            .await
            .expect("supervisor is alive");
    }
}

async fn run_supervisor(
    shared: Arc<SessionShared>,
    mut directives: mpsc::Receiver<Directive>,
    mut events: broadcast::Receiver<SessionEvent>,
) {
    let mut shutdown = shared.shutdown.subscribe();
    loop {
        eprintln!("DBG supervisor: loop top");
        tokio::select! {
            directive = directives.recv() => match directive {
                Some(Directive::RespawnFighter { at }) => respawn_fighter(&shared, at),
                None => { eprintln!("DBG supervisor: directives closed"); break; }
            },
            event = events.recv() => match event {
                Ok(SessionEvent::GameOver { reason }) => {
                    *shared.ended.lock().expect("end state mutex") = Some(reason);
                    info!(?reason, "game over");
                    let _ = shared.shutdown.send(true);
                    break;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.changed() => { eprintln!("DBG supervisor: shutdown observed"); break; }
        }
    }
    eprintln!("DBG supervisor: returning");
}

fn respawn_fighter(shared: &Arc<SessionShared>, at: Coord) {
    let placed = {
        let mut hall = shared.lock_hall();
        hall.place(OccupantKind::Monster(MonsterKind::Fighter), at)
    };
    match placed {
        Ok(id) => {
            info!(x = at.x, y = at.y, "replacement fighter spawned");
            start_monster_worker(shared, id, MonsterKind::Fighter);
        }
        Err(error) => warn!(%error, "replacement fighter could not be placed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    struct FixedFactory {
        monster: MonsterKind,
        pickup: PickupKind,
    }

    impl SpawnFactory for FixedFactory {
        fn next_monster(&mut self) -> MonsterKind {
            self.monster
        }

        fn next_pickup(&mut self) -> PickupKind {
            self.pickup
        }
    }

    fn wizard_factory() -> Box<dyn SpawnFactory> {
        Box::new(FixedFactory {
            monster: MonsterKind::Wizard,
            pickup: PickupKind::Cloak,
        })
    }

    fn archer_factory() -> Box<dyn SpawnFactory> {
        Box::new(FixedFactory {
            monster: MonsterKind::Archer,
            pickup: PickupKind::Cloak,
        })
    }

    fn options(seed: u32, time_limit: i64) -> SessionOptions {
        SessionOptions {
            seed,
            starting_hall: HallKind::Earth,
            time_limit_secs_override: Some(time_limit),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn at_most_one_wizard_is_ever_alive() {
        let session = Session::new(options(5, 10_000), wizard_factory()).unwrap();
        // several spawn cycles; high time fraction keeps wizards on the
        // non-terminal rune strategy, so the cap is what limits them
        sleep(Duration::from_secs(70)).await;
        assert_eq!(session.monster_counts().wizards, 1);
        session.end().await;
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_leaves_no_live_workers() {
        let session = Session::new(options(6, 10_000), wizard_factory()).unwrap();
        sleep(Duration::from_secs(40)).await;
        assert!(session.live_worker_count() > 0);
        session.end().await;
        assert_eq!(session.live_worker_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn frozen_session_emits_no_changes_for_many_ticks() {
        let session = Session::new(options(7, 10_000), archer_factory()).unwrap();
        sleep(Duration::from_secs(5)).await;

        session.freeze();
        // let any in-flight decision land inside the benign window
        sleep(Duration::from_secs(2)).await;
        let mut events = session.subscribe();
        while events.try_recv().is_ok() {}

        sleep(Duration::from_secs(30)).await;
        assert!(
            events.try_recv().is_err(),
            "no board changes or clock ticks while frozen"
        );

        session.unfreeze();
        sleep(Duration::from_secs(2)).await;
        assert!(events.try_recv().is_ok(), "activity resumes after unfreeze");
        session.end().await;
    }

    #[tokio::test(start_paused = true)]
    async fn extra_time_pickup_credits_the_clock() {
        let session = Session::new(options(8, 10_000), archer_factory()).unwrap();
        let at = {
            let hall = session.test_hall();
            let mut hall = hall.lock().unwrap();
            let player = hall.player().at;
            let at = Direction::ALL
                .iter()
                .map(|dir| player.offset(*dir))
                .find(|cell| cell.in_bounds() && hall.free_cells().contains(cell))
                .expect("the player has an open neighbor");
            hall.place(OccupantKind::Pickup(PickupKind::ExtraTime), at)
                .unwrap();
            at
        };

        let before = session.remaining_secs();
        let outcome = session.interact(at);
        assert!(matches!(
            outcome,
            InteractOutcome::Collected {
                kind: PickupKind::ExtraTime,
                ..
            }
        ));
        assert_eq!(session.remaining_secs(), before + EXTRA_TIME_SECS);
        session.end().await;
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_restore_rebuilds_board_and_workers() {
        let session = Session::new(options(9, 10_000), wizard_factory()).unwrap();
        sleep(Duration::from_secs(13)).await;
        session.freeze();
        sleep(Duration::from_secs(1)).await;

        let snapshot = session.snapshot();
        let monsters = snapshot
            .occupants
            .iter()
            .filter(|view| matches!(view.kind, OccupantKind::Monster(_)))
            .count();
        let pickups = snapshot
            .occupants
            .iter()
            .filter(|view| matches!(view.kind, OccupantKind::Pickup(_)))
            .count();
        assert!(monsters > 0);

        session.restore(&snapshot).await.unwrap();
        assert!(session.rep_ok());
        assert_eq!(session.remaining_secs(), snapshot.remaining_secs);
        assert_eq!(session.live_worker_count(), monsters + pickups);

        let restored = session.snapshot();
        assert_eq!(
            serde_json::to_value(&restored.occupants).unwrap(),
            serde_json::to_value(&snapshot.occupants).unwrap()
        );
        assert_eq!(
            serde_json::to_value(&restored.player).unwrap(),
            serde_json::to_value(&snapshot.player).unwrap()
        );
        session.end().await;
    }

    #[tokio::test(start_paused = true)]
    async fn advancing_halls_carries_the_player_forward() {
        let session = Session::new(options(10, 10_000), archer_factory()).unwrap();
        {
            let hall = session.test_hall();
            hall.lock().unwrap().damage_player(1);
        }
        assert!(session.advance_hall().await);
        assert_eq!(session.hall_kind(), HallKind::Air);
        assert_eq!(session.total_secs(), hall_time_limit_secs(HallKind::Air));
        assert_eq!(session.player().lives, 2);
        session.end().await;
    }

    #[tokio::test(start_paused = true)]
    async fn revealing_the_fire_hall_rune_wins_the_game() {
        let session = Session::new(
            SessionOptions {
                seed: 11,
                starting_hall: HallKind::Fire,
                time_limit_secs_override: Some(10_000),
            },
            archer_factory(),
        )
        .unwrap();
        session.freeze();

        let rune_at = {
            let hall = session.test_hall();
            let mut hall = hall.lock().unwrap();
            let rune_at = hall.rune_coord().unwrap();
            let side = Direction::ALL
                .iter()
                .map(|dir| rune_at.offset(*dir))
                .find(|cell| cell.in_bounds() && hall.free_cells().contains(cell))
                .unwrap_or_else(|| {
                    let player_at = hall.player().at;
                    let cell = Direction::ALL
                        .iter()
                        .map(|dir| rune_at.offset(*dir))
                        .find(|cell| cell.in_bounds() && *cell != player_at)
                        .unwrap();
                    hall.remove(cell);
                    cell
                });
            let player = hall.player().id;
            hall.move_occupant(player, side).unwrap();
            rune_at
        };

        assert_eq!(session.interact(rune_at), InteractOutcome::RuneRevealed);
        sleep(Duration::from_millis(100)).await;
        assert_eq!(session.game_over(), Some(EndReason::Victory));
        session.end().await;
    }

    #[tokio::test(start_paused = true)]
    async fn respawn_directive_restores_a_fighter_at_the_same_cell() {
        let session = Session::new(options(12, 10_000), archer_factory()).unwrap();
        session.freeze();
        let at = {
            let hall = session.test_hall();
            let mut hall = hall.lock().unwrap();
            hall.random_free_cell().unwrap()
        };
        session.test_inject(Directive::RespawnFighter { at }).await;
        sleep(Duration::from_millis(100)).await;

        let hall = session.test_hall();
        let hall = hall.lock().unwrap();
        assert!(matches!(
            hall.occupant_at(at).map(|o| o.kind),
            Some(OccupantKind::Monster(MonsterKind::Fighter))
        ));
        drop(hall);
        session.end().await;
    }

    #[tokio::test(start_paused = true)]
    async fn running_out_of_time_ends_the_session() {
        let session = Session::new(options(13, 3), archer_factory()).unwrap();
        let mut events = session.subscribe();
        sleep(Duration::from_secs(10)).await;
        assert_eq!(session.game_over(), Some(EndReason::TimeExpired));

        let mut saw = false;
        while let Ok(event) = events.try_recv() {
            if matches!(
                event,
                SessionEvent::GameOver {
                    reason: EndReason::TimeExpired
                }
            ) {
                saw = true;
            }
        }
        assert!(saw);
        session.end().await;
    }
}
