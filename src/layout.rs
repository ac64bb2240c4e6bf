//! Build phase: populates a fresh hall with its obstacle set and conceals
//! the rune under one of them. The player always starts in the top-left
//! corner; everything else lands on random free cells.

use tokio::sync::broadcast;
use tracing::info;

use crate::constants::hall_obstacle_budget;
use crate::hall::{Hall, PlaceError};
use crate::rng::Rng;
use crate::types::{Coord, HallKind, ObstacleKind, OccupantKind, SessionEvent};

pub const PLAYER_START: Coord = Coord { x: 0, y: 0 };

const OBSTACLE_MIX: [ObstacleKind; 4] = [
    ObstacleKind::Wall,
    ObstacleKind::CrackedWall,
    ObstacleKind::Block,
    ObstacleKind::Chest,
];

pub fn build_hall(
    kind: HallKind,
    events: broadcast::Sender<SessionEvent>,
    mut rng: Rng,
) -> Result<Hall, PlaceError> {
    let mut hall = Hall::new(kind, PLAYER_START, events, rng.clone())?;

    let budget = hall_obstacle_budget(kind);
    let mut placed = Vec::with_capacity(budget);
    while placed.len() < budget {
        let at = Coord::new(rng.range(0, 15), rng.range(0, 15));
        let shape = OBSTACLE_MIX[rng.pick_index(OBSTACLE_MIX.len())];
        match hall.place(OccupantKind::Obstacle(shape), at) {
            Ok(_) => placed.push(at),
            Err(PlaceError::CellOccupied) => continue,
            Err(error) => return Err(error),
        }
    }

    let rune_at = placed[rng.pick_index(placed.len())];
    hall.place_rune(rune_at)?;
    info!(?kind, obstacles = budget, "hall laid out");
    Ok(hall)
}
