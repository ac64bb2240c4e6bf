use std::time::Duration;

use super::{Flow, Worker, WorkerContext};
use crate::constants::{ARCHER_DAMAGE, ARCHER_RANGE, ARCHER_TICK_MS};

/// Stationary ranged monster: never moves, never touches the board beyond
/// reading positions. Shoots the player whenever they stand within range
/// and no cloak is active; the tick interval doubles as the shot cooldown.
pub(crate) struct ArcherWorker;

impl Worker for ArcherWorker {
    fn label(&self) -> &'static str {
        "archer"
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(ARCHER_TICK_MS)
    }

    async fn tick(&mut self, ctx: &mut WorkerContext) -> Flow {
        let in_range = {
            let hall = ctx.lock_hall();
            let Some(record) = hall.monster(ctx.id) else {
                return Flow::Exit;
            };
            record.at.manhattan(hall.player().at) <= ARCHER_RANGE && !hall.cloak_active()
        };
        if in_range {
            ctx.lock_hall().damage_player(ARCHER_DAMAGE);
        }
        Flow::Continue
    }
}
