//! Per-entity control loops. Every live monster and pickup runs one task
//! built from the shared loop contract here: park while the session is
//! frozen, decide against a short-lived hall lock, apply, sleep the
//! type-specific interval, and exit within one interval of cancellation.

pub(crate) mod archer;
pub(crate) mod fighter;
pub(crate) mod pickup;
pub(crate) mod wizard;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::clock::Countdown;
use crate::hall::Hall;
use crate::types::{Coord, EntityId};

/// Requests a worker cannot serve itself and hands to the session
/// supervisor instead.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Directive {
    /// A wandering fighter lost a cell race and retired itself; spawn a
    /// replacement at its last coordinate.
    RespawnFighter { at: Coord },
}

#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub id: EntityId,
    pub hall: Arc<Mutex<Hall>>,
    pub clock: Arc<Countdown>,
    pub directives: mpsc::Sender<Directive>,
    pub paused: watch::Receiver<bool>,
    pub cancel: watch::Receiver<bool>,
    pub shutdown: watch::Receiver<bool>,
}

impl WorkerContext {
    pub fn lock_hall(&self) -> MutexGuard<'_, Hall> {
        self.hall.lock().expect("hall mutex is never poisoned")
    }

    pub fn stop_requested(&self) -> bool {
        *self.cancel.borrow() || *self.shutdown.borrow()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Exit,
}

/// One entity behavior. `tick` runs the decide/apply cycle; the driver owns
/// pausing, pacing and cancellation.
pub(crate) trait Worker {
    fn label(&self) -> &'static str;

    fn interval(&self) -> Duration;

    async fn tick(&mut self, ctx: &mut WorkerContext) -> Flow;

    /// Runs once after the loop ends, before the task returns.
    async fn stopped(&mut self, _ctx: &mut WorkerContext) {}
}

pub(crate) async fn run_worker<W: Worker>(mut worker: W, mut ctx: WorkerContext) {
    debug!(id = ctx.id, kind = worker.label(), "worker started");
    loop {
        if !wait_while_paused(&mut ctx).await {
            break;
        }
        if worker.tick(&mut ctx).await == Flow::Exit {
            break;
        }
        if !sleep_or_cancel(&mut ctx, worker.interval()).await {
            break;
        }
    }
    worker.stopped(&mut ctx).await;
    debug!(id = ctx.id, kind = worker.label(), "worker stopped");
}

/// Parks until the session is unfrozen. Returns `false` when the worker
/// should exit instead of resuming.
pub(crate) async fn wait_while_paused(ctx: &mut WorkerContext) -> bool {
    loop {
        if ctx.stop_requested() {
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
            _ = ctx.cancel.changed() => return false,
            _ = ctx.shutdown.changed() => return false,
        }
    }
}

/// Sleeps one tick interval, waking early on cancellation. Returns `false`
/// when the worker should exit.
pub(crate) async fn sleep_or_cancel(ctx: &mut WorkerContext, interval: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => !ctx.stop_requested(),
        _ = ctx.cancel.changed() => false,
        _ = ctx.shutdown.changed() => false,
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::Rig;
    use super::*;
    use crate::types::{MonsterKind, OccupantKind};
    use std::time::Duration;
    use tokio::time::sleep;

    struct CountingWorker {
        ticks: Arc<Mutex<u32>>,
    }

    impl Worker for CountingWorker {
        fn label(&self) -> &'static str {
            "counting"
        }

        fn interval(&self) -> Duration {
            Duration::from_millis(100)
        }

        async fn tick(&mut self, _ctx: &mut WorkerContext) -> Flow {
            *self.ticks.lock().unwrap() += 1;
            Flow::Continue
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_observed_within_one_interval() {
        let rig = Rig::new(30);
        let ticks = Arc::new(Mutex::new(0));
        let worker = CountingWorker {
            ticks: Arc::clone(&ticks),
        };
        let task = tokio::spawn(run_worker(worker, rig.context(1)));

        sleep(Duration::from_millis(250)).await;
        rig.cancel.send(true).unwrap();
        task.await.unwrap();
        let observed = *ticks.lock().unwrap();
        assert!(observed >= 2, "worker should have ticked before the cancel");
    }

    #[tokio::test(start_paused = true)]
    async fn frozen_worker_does_not_tick() {
        let rig = Rig::new(30);
        rig.paused.send(true).unwrap();
        let ticks = Arc::new(Mutex::new(0));
        let worker = CountingWorker {
            ticks: Arc::clone(&ticks),
        };
        let task = tokio::spawn(run_worker(worker, rig.context(1)));

        sleep(Duration::from_secs(5)).await;
        assert_eq!(*ticks.lock().unwrap(), 0);

        rig.paused.send(false).unwrap();
        sleep(Duration::from_millis(50)).await;
        assert!(*ticks.lock().unwrap() >= 1, "worker resumes within a tick");

        rig.shutdown.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn freeze_blocks_board_mutations_from_worker_ticks() {
        let mut rig = Rig::new(30);
        let fighter = rig
            .lock_hall()
            .place(
                OccupantKind::Monster(MonsterKind::Fighter),
                Coord::new(8, 8),
            )
            .unwrap();
        let worker = fighter::FighterWorker::new(5);
        rig.paused.send(true).unwrap();
        let task = tokio::spawn(run_worker(worker, rig.context(fighter)));

        while rig.events.try_recv().is_ok() {}
        sleep(Duration::from_secs(5)).await;
        assert!(
            rig.events.try_recv().is_err(),
            "no change notifications while frozen"
        );

        rig.shutdown.send(true).unwrap();
        task.await.unwrap();
    }
}
