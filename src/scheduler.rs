//! Supervisory spawn loop: one random monster, a long wait, one random
//! pickup, a short wait, repeating while the session runs. Honors the
//! pause flag exactly like the entity workers and cancels every worker it
//! spawned before returning, so no loop outlives the session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::constants::{MONSTER_SPAWN_WAIT_MS, PICKUP_SPAWN_WAIT_MS, WIZARD_CAP};
use crate::factory::SpawnFactory;
use crate::session::{start_monster_worker, start_pickup_worker, SessionShared};
use crate::types::{EntityId, MonsterKind, OccupantKind};

pub(crate) async fn run_scheduler(
    shared: Arc<SessionShared>,
    mut factory: Box<dyn SpawnFactory>,
) {
    let mut paused = shared.paused.subscribe();
    let mut shutdown = shared.shutdown.subscribe();
    let mut spawned: Vec<EntityId> = Vec::new();

    loop {
        if !wait_unpaused(&mut paused, &mut shutdown).await {
            break;
        }
        if let Some(id) = spawn_monster(&shared, factory.as_mut()) {
            spawned.push(id);
        }
        if !wait_interval(&mut shutdown, MONSTER_SPAWN_WAIT_MS).await {
            break;
        }

        // the pause flag is re-checked before the second spawn of the cycle
        if !wait_unpaused(&mut paused, &mut shutdown).await {
            break;
        }
        if let Some(id) = spawn_pickup(&shared, factory.as_mut()) {
            spawned.push(id);
        }
        if !wait_interval(&mut shutdown, PICKUP_SPAWN_WAIT_MS).await {
            break;
        }
    }

    shared.cancel_workers(&spawned);
    info!("spawn scheduler stopped");
}

fn spawn_monster(shared: &Arc<SessionShared>, factory: &mut dyn SpawnFactory) -> Option<EntityId> {
    let (id, kind) = {
        let mut hall = shared.lock_hall();
        let Some(at) = hall.random_free_cell() else {
            debug!("no free cell, monster spawn skipped");
            return None;
        };
        let kind = factory.next_monster();
        if kind == MonsterKind::Wizard && hall.monster_count(MonsterKind::Wizard) >= WIZARD_CAP {
            debug!("wizard cap reached, spawn dropped");
            return None;
        }
        match hall.place(OccupantKind::Monster(kind), at) {
            Ok(id) => {
                info!(?kind, x = at.x, y = at.y, "monster spawned");
                (id, kind)
            }
            Err(error) => {
                debug!(%error, "monster spawn skipped");
                return None;
            }
        }
    };
    start_monster_worker(shared, id, kind);
    Some(id)
}

fn spawn_pickup(shared: &Arc<SessionShared>, factory: &mut dyn SpawnFactory) -> Option<EntityId> {
    let id = {
        let mut hall = shared.lock_hall();
        let Some(at) = hall.random_free_cell() else {
            debug!("no free cell, pickup spawn skipped");
            return None;
        };
        let kind = factory.next_pickup();
        match hall.place(OccupantKind::Pickup(kind), at) {
            Ok(id) => {
                info!(?kind, x = at.x, y = at.y, "pickup spawned");
                id
            }
            Err(error) => {
                debug!(%error, "pickup spawn skipped");
                return None;
            }
        }
    };
    start_pickup_worker(shared, id);
    Some(id)
}

async fn wait_unpaused(
    paused: &mut watch::Receiver<bool>,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        if *shutdown.borrow() {
            return false;
        }
        if !*paused.borrow_and_update() {
            return true;
        }
        tokio::select! {
            changed = paused.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
            _ = shutdown.changed() => return false,
        }
    }
}

async fn wait_interval(shutdown: &mut watch::Receiver<bool>, millis: u64) -> bool {
    tokio::select! {
        _ = sleep(Duration::from_millis(millis)) => !*shutdown.borrow(),
        _ = shutdown.changed() => false,
    }
}
