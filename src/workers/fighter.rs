use std::time::Duration;

use tracing::warn;

use super::{Directive, Flow, Worker, WorkerContext};
use crate::constants::{FIGHTER_DAMAGE, FIGHTER_TICK_MS};
use crate::rng::Rng;
use crate::types::{Coord, Direction};

/// Wandering melee monster. Strikes an adjacent player instead of moving;
/// otherwise wanders one cell per tick, biased toward a placed lure. A
/// lost cell race retires this worker and asks the session to spawn a
/// replacement at the same coordinate.
pub(crate) struct FighterWorker {
    rng: Rng,
}

impl FighterWorker {
    pub fn new(seed: u32) -> Self {
        Self {
            rng: Rng::seeded(seed),
        }
    }
}

impl Worker for FighterWorker {
    fn label(&self) -> &'static str {
        "fighter"
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(FIGHTER_TICK_MS)
    }

    async fn tick(&mut self, ctx: &mut WorkerContext) -> Flow {
        let (at, player_at, lure, open_neighbors) = {
            let hall = ctx.lock_hall();
            let Some(record) = hall.monster(ctx.id) else {
                return Flow::Exit;
            };
            let open: Vec<Coord> = Direction::ALL
                .iter()
                .map(|dir| record.at.offset(*dir))
                .filter(|cell| cell.in_bounds() && hall.free_cells().contains(cell))
                .collect();
            (record.at, hall.player().at, hall.lure(), open)
        };

        if at.adjacent(player_at) {
            // an attack tick never moves the monster
            ctx.lock_hall().damage_player(FIGHTER_DAMAGE);
            return Flow::Continue;
        }

        let Some(target) = choose_step(at, lure, &open_neighbors, &mut self.rng) else {
            return Flow::Continue;
        };
        let move_result = ctx.lock_hall().move_occupant(ctx.id, target);
        match move_result {
            Ok(()) => Flow::Continue,
            Err(error) => {
                warn!(id = ctx.id, %error, "fighter lost a cell race, retiring for a replacement");
                self.retire_after_race(ctx, at).await
            }
        }
    }
}

impl FighterWorker {
    /// Self-healing restart: drop the stale occupant, ask the session for a
    /// replacement fighter at the same coordinate, and end this worker.
    async fn retire_after_race(&mut self, ctx: &mut WorkerContext, at: Coord) -> Flow {
        ctx.lock_hall().remove_monster(ctx.id);
        let _ = ctx.directives.send(Directive::RespawnFighter { at }).await;
        Flow::Exit
    }
}

/// Picks the next cell: a strictly lure-ward step when a lure is placed
/// (standing still if none closes the distance), a uniformly random open
/// neighbor otherwise.
fn choose_step(
    at: Coord,
    lure: Option<Coord>,
    open_neighbors: &[Coord],
    rng: &mut Rng,
) -> Option<Coord> {
    if let Some(lure) = lure {
        let current = at.manhattan(lure);
        let closing: Vec<Coord> = open_neighbors
            .iter()
            .copied()
            .filter(|cell| cell.manhattan(lure) < current)
            .collect();
        return rng.pick(&closing).copied();
    }
    rng.pick(open_neighbors).copied()
}
