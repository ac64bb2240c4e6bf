use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

use super::{Flow, Worker, WorkerContext};
use crate::constants::{
    DORMANT_GRACE_MS, RELOCATE_PLAYER_BELOW_PERCENT, RELOCATE_PLAYER_DELAY_MS,
    RELOCATE_RUNE_ABOVE_PERCENT, RELOCATE_RUNE_PERIOD_MS, WIZARD_TICK_MS,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StrategyKind {
    /// No-op; removes the wizard after a short grace period. Terminal.
    Dormant,
    /// Teleports the player to a random free cell after a delay, then
    /// removes the wizard. Terminal.
    RelocatePlayer,
    /// Periodically re-conceals the rune under another obstacle. Keeps
    /// cycling while time remains.
    RelocateRune,
}

/// Picks the behavior from the fraction of hall time remaining.
pub(crate) fn desired_strategy(percent_remaining: f64) -> StrategyKind {
    if percent_remaining < RELOCATE_PLAYER_BELOW_PERCENT {
        StrategyKind::RelocatePlayer
    } else if percent_remaining > RELOCATE_RUNE_ABOVE_PERCENT {
        StrategyKind::RelocateRune
    } else {
        StrategyKind::Dormant
    }
}

struct BehaviorHandle {
    kind: StrategyKind,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl BehaviorHandle {
    /// Signals the behavior task and waits for it to finish, so two
    /// behaviors never act for the same wizard at once.
    async fn stop_and_drain(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

/// Support monster. Never attacks or moves; each tick it re-evaluates the
/// time-driven strategy and hands the work to the active behavior task.
pub(crate) struct WizardWorker {
    active: Option<BehaviorHandle>,
}

impl WizardWorker {
    pub fn new() -> Self {
        Self { active: None }
    }

    #[cfg(test)]
    fn active_kind(&self) -> Option<StrategyKind> {
        self.active.as_ref().map(|handle| handle.kind)
    }
}

impl Worker for WizardWorker {
    fn label(&self) -> &'static str {
        "wizard"
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(WIZARD_TICK_MS)
    }

    async fn tick(&mut self, ctx: &mut WorkerContext) -> Flow {
        if ctx.lock_hall().monster(ctx.id).is_none() {
            // a terminal behavior removed the wizard
            return Flow::Exit;
        }

        let desired = desired_strategy(ctx.clock.percent_remaining());
        let stale = self
            .active
            .as_ref()
            .map(|handle| handle.kind != desired)
            .unwrap_or(true);
        if stale {
            if let Some(previous) = self.active.take() {
                debug!(
                    id = ctx.id,
                    from = ?previous.kind,
                    to = ?desired,
                    "wizard switches strategy"
                );
                previous.stop_and_drain().await;
            }
            self.active = Some(start_behavior(desired, ctx));
        }
        Flow::Continue
    }

    async fn stopped(&mut self, _ctx: &mut WorkerContext) {
        if let Some(active) = self.active.take() {
            active.stop_and_drain().await;
        }
    }
}

fn start_behavior(kind: StrategyKind, ctx: &WorkerContext) -> BehaviorHandle {
    let (stop, stop_rx) = watch::channel(false);
    let task = match kind {
        StrategyKind::Dormant => tokio::spawn(run_dormant(ctx.clone(), stop_rx)),
        StrategyKind::RelocatePlayer => tokio::spawn(run_relocate_player(ctx.clone(), stop_rx)),
        StrategyKind::RelocateRune => tokio::spawn(run_relocate_rune(ctx.clone(), stop_rx)),
    };
    BehaviorHandle { kind, stop, task }
}

async fn run_dormant(mut ctx: WorkerContext, mut stop: watch::Receiver<bool>) {
    if !behavior_wait(&mut ctx, &mut stop, Duration::from_millis(DORMANT_GRACE_MS)).await {
        return;
    }
    let mut hall = ctx.lock_hall();
    if hall.remove_monster(ctx.id) {
        info!(id = ctx.id, "idle wizard faded away");
    }
}

async fn run_relocate_player(mut ctx: WorkerContext, mut stop: watch::Receiver<bool>) {
    if !behavior_wait(
        &mut ctx,
        &mut stop,
        Duration::from_millis(RELOCATE_PLAYER_DELAY_MS),
    )
    .await
    {
        return;
    }
    let mut hall = ctx.lock_hall();
    if hall.monster(ctx.id).is_none() {
        return;
    }
    let _ = hall.teleport_player();
    hall.remove_monster(ctx.id);
    info!(id = ctx.id, "wizard relocated the player and vanished");
}

async fn run_relocate_rune(mut ctx: WorkerContext, mut stop: watch::Receiver<bool>) {
    loop {
        if !behavior_wait(
            &mut ctx,
            &mut stop,
            Duration::from_millis(RELOCATE_RUNE_PERIOD_MS),
        )
        .await
        {
            return;
        }
        if ctx.clock.remaining_secs() <= 0 {
            return;
        }
        let mut hall = ctx.lock_hall();
        if hall.monster(ctx.id).is_none() {
            return;
        }
        hall.relocate_rune();
    }
}

/// Sleeps, then parks while the session is frozen, before the behavior is
/// allowed to touch the board. Returns `false` when the behavior should
/// end instead.
async fn behavior_wait(
    ctx: &mut WorkerContext,
    stop: &mut watch::Receiver<bool>,
    wait: Duration,
) -> bool {
    tokio::select! {
        _ = sleep(wait) => {}
        _ = stop.changed() => return false,
        _ = ctx.cancel.changed() => return false,
        _ = ctx.shutdown.changed() => return false,
    }
    loop {
        if *stop.borrow() || ctx.stop_requested() {
            return false;
        }
        if !*ctx.paused.borrow_and_update() {
            return true;
        }
        tokio::select! {
            changed = ctx.paused.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
            _ = stop.changed() => return false,
            _ = ctx.cancel.changed() => return false,
            _ = ctx.shutdown.changed() => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Rig;
    use super::*;
    use crate::types::{Coord, MonsterKind, ObstacleKind, OccupantKind};

    fn place_wizard(rig: &Rig, at: Coord) -> crate::types::EntityId {
        rig.lock_hall()
            .place(OccupantKind::Monster(MonsterKind::Wizard), at)
            .unwrap()
    }

    #[test]
    fn strategy_follows_the_time_fraction() {
        assert_eq!(desired_strategy(10.0), StrategyKind::RelocatePlayer);
        assert_eq!(desired_strategy(29.9), StrategyKind::RelocatePlayer);
        assert_eq!(desired_strategy(30.0), StrategyKind::Dormant);
        assert_eq!(desired_strategy(50.0), StrategyKind::Dormant);
        assert_eq!(desired_strategy(70.0), StrategyKind::Dormant);
        assert_eq!(desired_strategy(70.1), StrategyKind::RelocateRune);
        assert_eq!(desired_strategy(100.0), StrategyKind::RelocateRune);
    }

    #[tokio::test(start_paused = true)]
    async fn low_time_wizard_relocates_the_player_and_vanishes() {
        let rig = Rig::new(100);
        rig.clock.set_remaining(10);
        let wizard = place_wizard(&rig, Coord::new(9, 9));
        let player_before = rig.lock_hall().player().at;

        let mut worker = WizardWorker::new();
        let mut ctx = rig.context(wizard);
        assert_eq!(worker.tick(&mut ctx).await, Flow::Continue);
        assert_eq!(worker.active_kind(), Some(StrategyKind::RelocatePlayer));

        sleep(Duration::from_millis(RELOCATE_PLAYER_DELAY_MS + 100)).await;
        {
            let hall = rig.lock_hall();
            assert_ne!(hall.player().at, player_before);
            assert!(hall.monster(wizard).is_none());
            assert!(hall.rep_ok());
        }
        assert_eq!(worker.tick(&mut ctx).await, Flow::Exit);
        worker.stopped(&mut ctx).await;
    }

    #[tokio::test(start_paused = true)]
    async fn high_time_wizard_keeps_relocating_the_rune() {
        let rig = Rig::new(100);
        rig.clock.set_remaining(90);
        let wizard = place_wizard(&rig, Coord::new(9, 9));
        {
            let mut hall = rig.lock_hall();
            for at in [Coord::new(2, 2), Coord::new(12, 3), Coord::new(5, 13)] {
                hall.place(OccupantKind::Obstacle(ObstacleKind::Wall), at)
                    .unwrap();
            }
            hall.place_rune(Coord::new(2, 2)).unwrap();
        }

        let mut worker = WizardWorker::new();
        let mut ctx = rig.context(wizard);
        worker.tick(&mut ctx).await;
        assert_eq!(worker.active_kind(), Some(StrategyKind::RelocateRune));

        let before = rig.lock_hall().rune_coord().unwrap();
        sleep(Duration::from_millis(RELOCATE_RUNE_PERIOD_MS + 100)).await;
        let after = rig.lock_hall().rune_coord().unwrap();
        assert_ne!(before, after);
        assert!(rig.lock_hall().monster(wizard).is_some());

        worker.stopped(&mut ctx).await;
    }

    #[tokio::test(start_paused = true)]
    async fn switching_stops_the_previous_behavior_before_the_next_acts() {
        let rig = Rig::new(100);
        rig.clock.set_remaining(50);
        let wizard = place_wizard(&rig, Coord::new(9, 9));

        let mut worker = WizardWorker::new();
        let mut ctx = rig.context(wizard);
        worker.tick(&mut ctx).await;
        assert_eq!(worker.active_kind(), Some(StrategyKind::Dormant));

        // switch before the dormant grace elapses: the wizard must survive,
        // because the old behavior is stopped and drained first
        sleep(Duration::from_millis(DORMANT_GRACE_MS / 2)).await;
        rig.clock.set_remaining(90);
        worker.tick(&mut ctx).await;
        assert_eq!(worker.active_kind(), Some(StrategyKind::RelocateRune));

        sleep(Duration::from_millis(DORMANT_GRACE_MS * 2)).await;
        assert!(rig.lock_hall().monster(wizard).is_some());

        worker.stopped(&mut ctx).await;
    }

    #[tokio::test(start_paused = true)]
    async fn dormant_wizard_fades_after_the_grace_period() {
        let rig = Rig::new(100);
        rig.clock.set_remaining(50);
        let wizard = place_wizard(&rig, Coord::new(4, 9));

        let mut worker = WizardWorker::new();
        let mut ctx = rig.context(wizard);
        worker.tick(&mut ctx).await;

        sleep(Duration::from_millis(DORMANT_GRACE_MS + 100)).await;
        assert!(rig.lock_hall().monster(wizard).is_none());
        assert_eq!(worker.tick(&mut ctx).await, Flow::Exit);
        worker.stopped(&mut ctx).await;
    }

    #[tokio::test(start_paused = true)]
    async fn frozen_session_defers_the_dormant_removal() {
        let rig = Rig::new(100);
        rig.clock.set_remaining(50);
        let wizard = place_wizard(&rig, Coord::new(4, 9));

        let mut worker = WizardWorker::new();
        let mut ctx = rig.context(wizard);
        worker.tick(&mut ctx).await;

        rig.paused.send(true).unwrap();
        sleep(Duration::from_millis(DORMANT_GRACE_MS * 3)).await;
        assert!(rig.lock_hall().monster(wizard).is_some());

        rig.paused.send(false).unwrap();
        sleep(Duration::from_millis(100)).await;
        assert!(rig.lock_hall().monster(wizard).is_none());

        worker.stopped(&mut ctx).await;
    }
}
