use std::time::Duration;

use tracing::debug;

use super::{Flow, Worker, WorkerContext};
use crate::constants::{PICKUP_DESPAWN_TICKS, PICKUP_TICK_MS};

/// Lifecycle of a spawned pickup: the scheduler registers it on the board
/// before this worker starts; the worker burns down its duration and
/// removes it at zero. Collection by the player cancels the worker (and the
/// exists check below catches a collection that lands mid-tick).
pub(crate) struct PickupWorker {
    remaining_ticks: u32,
}

impl PickupWorker {
    pub fn new() -> Self {
        Self::with_duration(PICKUP_DESPAWN_TICKS)
    }

    pub fn with_duration(ticks: u32) -> Self {
        Self {
            remaining_ticks: ticks,
        }
    }
}

impl Worker for PickupWorker {
    fn label(&self) -> &'static str {
        "pickup"
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(PICKUP_TICK_MS)
    }

    async fn tick(&mut self, ctx: &mut WorkerContext) -> Flow {
        if ctx.lock_hall().pickup(ctx.id).is_none() {
            return Flow::Exit;
        }
        if self.remaining_ticks == 0 {
            ctx.lock_hall().remove_pickup(ctx.id);
            debug!(id = ctx.id, "pickup faded away");
            return Flow::Exit;
        }
        self.remaining_ticks -= 1;
        Flow::Continue
    }
}
