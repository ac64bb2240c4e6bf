use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::constants::{BOARD_CELLS, BOARD_SIZE, MAX_LIVES, START_LIVES};
use crate::rng::Rng;
use crate::types::{
    Coord, Direction, EndReason, EntityId, HallKind, MonsterCounts, MonsterKind, Occupant,
    OccupantKind, OccupantView, PickupKind, PlayerView, RuneView, SessionEvent,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum PlaceError {
    #[error("coordinate is outside the hall")]
    OutOfBounds,
    #[error("the hall has no free cells left")]
    HallFull,
    #[error("cell is already occupied")]
    CellOccupied,
}

/// The two benign, retryable failures a worker can receive from
/// `move_occupant` when it races another worker between its decision and
/// apply steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("occupant is no longer where its owner recorded it")]
    OccupantNotFound,
    #[error("target cell is not free")]
    TargetOccupied,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum UseError {
    #[error("item is not in the inventory")]
    NotInInventory,
    #[error("item cannot be used from the inventory")]
    NotUsable,
    #[error("target is outside the hall")]
    OutOfBounds,
}

#[derive(Clone, Copy, Debug)]
pub struct Rune {
    pub revealed: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct MonsterRecord {
    pub kind: MonsterKind,
    pub at: Coord,
}

#[derive(Clone, Copy, Debug)]
pub struct PickupRecord {
    pub kind: PickupKind,
    pub at: Coord,
}

#[derive(Debug)]
pub struct PlayerStatus {
    pub id: EntityId,
    pub at: Coord,
    pub lives: i32,
    pub inventory: BTreeMap<PickupKind, u32>,
    pub cloak_until: Option<Instant>,
    pub lure: Option<Coord>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InteractOutcome {
    RuneRevealed,
    Collected { id: EntityId, kind: PickupKind },
    Nothing,
}

/// The authoritative board of one hall. Every mutation runs under the
/// session's mutex and re-establishes the free-cell complement before
/// returning; a change notification is broadcast after each one.
pub struct Hall {
    kind: HallKind,
    occupants: BTreeMap<Coord, Occupant>,
    free_cells: BTreeSet<Coord>,
    runes: BTreeMap<Coord, Rune>,
    monsters: BTreeMap<EntityId, MonsterRecord>,
    pickups: BTreeMap<EntityId, PickupRecord>,
    player: PlayerStatus,
    events: broadcast::Sender<SessionEvent>,
    rng: Rng,
    next_id: EntityId,
    ended: bool,
}

impl Hall {
    pub fn new(
        kind: HallKind,
        player_at: Coord,
        events: broadcast::Sender<SessionEvent>,
        rng: Rng,
    ) -> Result<Self, PlaceError> {
        let mut hall = Self {
            kind,
            occupants: BTreeMap::new(),
            free_cells: full_board(),
            runes: BTreeMap::new(),
            monsters: BTreeMap::new(),
            pickups: BTreeMap::new(),
            player: PlayerStatus {
                id: 0,
                at: player_at,
                lives: START_LIVES,
                inventory: BTreeMap::new(),
                cloak_until: None,
                lure: None,
            },
            events,
            rng,
            next_id: 0,
            ended: false,
        };
        let id = hall.place(OccupantKind::Player, player_at)?;
        hall.player.id = id;
        Ok(hall)
    }

    pub fn kind(&self) -> HallKind {
        self.kind
    }

    pub fn player(&self) -> &PlayerStatus {
        &self.player
    }

    pub fn occupants(&self) -> &BTreeMap<Coord, Occupant> {
        &self.occupants
    }

    pub fn free_cells(&self) -> &BTreeSet<Coord> {
        &self.free_cells
    }

    pub fn occupant_at(&self, at: Coord) -> Option<Occupant> {
        self.occupants.get(&at).copied()
    }

    pub fn monster(&self, id: EntityId) -> Option<MonsterRecord> {
        self.monsters.get(&id).copied()
    }

    pub fn monster_entries(&self) -> Vec<(EntityId, MonsterRecord)> {
        self.monsters
            .iter()
            .map(|(id, record)| (*id, *record))
            .collect()
    }

    pub fn pickup_entries(&self) -> Vec<(EntityId, PickupRecord)> {
        self.pickups
            .iter()
            .map(|(id, record)| (*id, *record))
            .collect()
    }

    pub fn pickup(&self, id: EntityId) -> Option<PickupRecord> {
        self.pickups.get(&id).copied()
    }

    pub fn rune_coord(&self) -> Option<Coord> {
        self.runes.keys().next().copied()
    }

    pub fn lure(&self) -> Option<Coord> {
        self.player.lure
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn monster_count(&self, kind: MonsterKind) -> usize {
        self.monsters
            .values()
            .filter(|record| record.kind == kind)
            .count()
    }

    pub fn monster_counts(&self) -> MonsterCounts {
        MonsterCounts {
            archers: self.monster_count(MonsterKind::Archer),
            fighters: self.monster_count(MonsterKind::Fighter),
            wizards: self.monster_count(MonsterKind::Wizard),
        }
    }

    pub fn place(&mut self, kind: OccupantKind, at: Coord) -> Result<EntityId, PlaceError> {
        if !at.in_bounds() {
            return Err(PlaceError::OutOfBounds);
        }
        if self.free_cells.is_empty() {
            return Err(PlaceError::HallFull);
        }
        if self.occupants.contains_key(&at) {
            return Err(PlaceError::CellOccupied);
        }

        self.next_id += 1;
        let id = self.next_id;
        self.occupants.insert(at, Occupant { id, kind });
        self.free_cells.remove(&at);
        match kind {
            OccupantKind::Monster(monster) => {
                self.monsters.insert(id, MonsterRecord { kind: monster, at });
            }
            OccupantKind::Pickup(pickup) => {
                self.pickups.insert(id, PickupRecord { kind: pickup, at });
            }
            _ => {}
        }
        self.changed();
        Ok(id)
    }

    /// Registers the hidden objective marker. A rune coexists with the
    /// occupant concealing it, the one exception to the one-per-cell rule.
    pub fn place_rune(&mut self, at: Coord) -> Result<(), PlaceError> {
        if !at.in_bounds() {
            return Err(PlaceError::OutOfBounds);
        }
        self.runes.insert(at, Rune { revealed: false });
        self.changed();
        Ok(())
    }

    pub fn remove(&mut self, at: Coord) -> Option<Occupant> {
        let occupant = self.occupants.remove(&at)?;
        self.free_cells.insert(at);
        self.monsters.remove(&occupant.id);
        self.pickups.remove(&occupant.id);
        self.changed();
        Some(occupant)
    }

    /// Removes a monster through its registry entry, tolerating a stale
    /// coordinate (the cell may have been taken over by a racing worker).
    pub fn remove_monster(&mut self, id: EntityId) -> bool {
        let Some(record) = self.monsters.remove(&id) else {
            return false;
        };
        if let Some(occupant) = self.occupants.get(&record.at) {
            if occupant.id == id {
                self.occupants.remove(&record.at);
                self.free_cells.insert(record.at);
            }
        }
        self.changed();
        true
    }

    pub fn remove_pickup(&mut self, id: EntityId) -> bool {
        let Some(record) = self.pickups.remove(&id) else {
            return false;
        };
        if let Some(occupant) = self.occupants.get(&record.at) {
            if occupant.id == id {
                self.occupants.remove(&record.at);
                self.free_cells.insert(record.at);
            }
        }
        self.changed();
        true
    }

    pub fn move_occupant(&mut self, id: EntityId, to: Coord) -> Result<(), MoveError> {
        let from = if id == self.player.id {
            self.player.at
        } else if let Some(record) = self.monsters.get(&id) {
            record.at
        } else {
            return Err(MoveError::OccupantNotFound);
        };
        let occupant = match self.occupants.get(&from) {
            Some(occupant) if occupant.id == id => *occupant,
            _ => return Err(MoveError::OccupantNotFound),
        };
        if !to.in_bounds() || !self.free_cells.contains(&to) {
            return Err(MoveError::TargetOccupied);
        }

        self.occupants.remove(&from);
        self.free_cells.insert(from);
        self.occupants.insert(to, occupant);
        self.free_cells.remove(&to);
        if id == self.player.id {
            self.player.at = to;
        } else if let Some(record) = self.monsters.get_mut(&id) {
            record.at = to;
        }
        // a monster stepping onto the lure consumes it
        if self.player.lure == Some(to) && matches!(occupant.kind, OccupantKind::Monster(_)) {
            self.player.lure = None;
        }
        self.changed();
        Ok(())
    }

    pub fn random_free_cell(&mut self) -> Option<Coord> {
        if self.free_cells.is_empty() {
            return None;
        }
        let index = self.rng.pick_index(self.free_cells.len());
        self.free_cells.iter().nth(index).copied()
    }

    /// Teleports the rune to a random cell currently holding an obstacle,
    /// preferring a cell other than its current one. Candidates are
    /// re-evaluated fresh on every call; the rune never lands on an empty
    /// cell. Returns whether the rune moved.
    pub fn relocate_rune(&mut self) -> bool {
        let Some(current) = self.runes.keys().next().copied() else {
            debug!("no rune to relocate");
            return false;
        };
        let mut candidates: Vec<Coord> = self
            .occupants
            .iter()
            .filter(|(_, occupant)| occupant.kind.is_obstacle())
            .map(|(coord, _)| *coord)
            .collect();
        candidates.retain(|coord| *coord != current);
        let Some(target) = self.rng.pick(&candidates).copied() else {
            debug!("no concealing cell available, rune stays");
            return false;
        };

        let rune = self
            .runes
            .remove(&current)
            .expect("rune was present under its recorded coordinate");
        self.runes.insert(target, rune);
        debug!(x = target.x, y = target.y, "rune relocated");
        self.changed();
        true
    }

    pub fn step_player(&mut self, dir: Direction) -> Result<(), MoveError> {
        let target = self.player.at.offset(dir);
        if !target.in_bounds() {
            return Err(MoveError::TargetOccupied);
        }
        let id = self.player.id;
        self.move_occupant(id, target)
    }

    /// Moves the player to a random free cell (the wizard's relocate-player
    /// behavior). Returns the landing cell when a free cell existed.
    pub fn teleport_player(&mut self) -> Option<Coord> {
        let target = self.random_free_cell()?;
        let id = self.player.id;
        self.move_occupant(id, target).ok()?;
        info!(x = target.x, y = target.y, "player relocated");
        Some(target)
    }

    pub fn damage_player(&mut self, amount: i32) {
        if self.ended {
            return;
        }
        self.player.lives = (self.player.lives - amount).max(0);
        let lives = self.player.lives;
        self.emit(SessionEvent::PlayerDamaged { lives });
        self.changed();
        if lives == 0 {
            self.ended = true;
            info!("player is out of lives");
            self.emit(SessionEvent::GameOver {
                reason: EndReason::PlayerDied,
            });
        }
    }

    pub fn heal_player(&mut self) {
        self.player.lives = (self.player.lives + 1).min(MAX_LIVES);
        self.changed();
    }

    /// Applies the surviving player's state to a freshly laid-out hall
    /// during a level transition.
    pub(crate) fn carry_over_player(&mut self, lives: i32, inventory: BTreeMap<PickupKind, u32>) {
        self.player.lives = lives;
        self.player.inventory = inventory;
        self.changed();
    }

    pub fn activate_cloak(&mut self, until: Instant) {
        self.player.cloak_until = Some(until);
    }

    pub fn cloak_active(&self) -> bool {
        self.player
            .cloak_until
            .map(|until| Instant::now() < until)
            .unwrap_or(false)
    }

    pub fn take_item(&mut self, kind: PickupKind) -> bool {
        match self.player.inventory.get_mut(&kind) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    self.player.inventory.remove(&kind);
                }
                true
            }
            _ => false,
        }
    }

    pub fn place_lure(&mut self, at: Coord) -> Result<(), UseError> {
        if !at.in_bounds() {
            return Err(UseError::OutOfBounds);
        }
        self.player.lure = Some(at);
        self.changed();
        Ok(())
    }

    /// Player interaction with an adjacent cell: reveals a concealed rune,
    /// collects a pickup, or does nothing.
    pub fn interact(&mut self, at: Coord) -> InteractOutcome {
        if !at.adjacent(self.player.at) {
            return InteractOutcome::Nothing;
        }
        let Some(occupant) = self.occupants.get(&at).copied() else {
            return InteractOutcome::Nothing;
        };
        match occupant.kind {
            OccupantKind::Obstacle(_) => match self.runes.get_mut(&at) {
                Some(rune) if !rune.revealed => {
                    rune.revealed = true;
                    info!(x = at.x, y = at.y, "rune revealed");
                    self.emit(SessionEvent::RuneRevealed { x: at.x, y: at.y });
                    self.changed();
                    InteractOutcome::RuneRevealed
                }
                _ => InteractOutcome::Nothing,
            },
            OccupantKind::Pickup(kind) => {
                self.occupants.remove(&at);
                self.free_cells.insert(at);
                self.pickups.remove(&occupant.id);
                match kind {
                    PickupKind::ExtraLife => {
                        self.player.lives = (self.player.lives + 1).min(MAX_LIVES);
                    }
                    kind if kind.goes_to_inventory() => {
                        *self.player.inventory.entry(kind).or_insert(0) += 1;
                    }
                    // ExtraTime is credited to the clock by the session
                    _ => {}
                }
                self.emit(SessionEvent::PickupCollected { kind });
                self.changed();
                InteractOutcome::Collected {
                    id: occupant.id,
                    kind,
                }
            }
            _ => InteractOutcome::Nothing,
        }
    }

    /// Representation invariant: the free-cell set is exactly the board
    /// minus the occupant keys, and every registry entry points at a live
    /// occupant.
    pub fn rep_ok(&self) -> bool {
        if self.free_cells.len() + self.occupants.len() != BOARD_CELLS {
            return false;
        }
        if self.free_cells.iter().any(|c| self.occupants.contains_key(c)) {
            return false;
        }
        if !self.occupants.keys().all(Coord::in_bounds) {
            return false;
        }
        let player_ok = matches!(
            self.occupants.get(&self.player.at),
            Some(occupant) if occupant.id == self.player.id
        );
        let monsters_ok = self.monsters.iter().all(|(id, record)| {
            matches!(self.occupants.get(&record.at), Some(o) if o.id == *id)
        });
        let pickups_ok = self.pickups.iter().all(|(id, record)| {
            matches!(self.occupants.get(&record.at), Some(o) if o.id == *id)
        });
        player_ok && monsters_ok && pickups_ok
    }

    pub fn occupant_views(&self) -> Vec<OccupantView> {
        self.occupants
            .iter()
            .map(|(coord, occupant)| OccupantView {
                kind: occupant.kind,
                x: coord.x,
                y: coord.y,
            })
            .collect()
    }

    pub fn rune_views(&self) -> Vec<RuneView> {
        self.runes
            .iter()
            .map(|(coord, rune)| RuneView {
                x: coord.x,
                y: coord.y,
                revealed: rune.revealed,
            })
            .collect()
    }

    pub fn player_view(&self) -> PlayerView {
        PlayerView {
            x: self.player.at.x,
            y: self.player.at.y,
            lives: self.player.lives,
            inventory: self.player.inventory.clone(),
        }
    }

    /// Rebuilds a hall from persisted plain data. Worker tasks are not
    /// restored here; the session respawns one per live monster and pickup.
    pub fn from_snapshot(
        snapshot: &crate::types::SessionSnapshot,
        events: broadcast::Sender<SessionEvent>,
        rng: Rng,
    ) -> Result<Self, PlaceError> {
        let player_at = Coord::new(snapshot.player.x, snapshot.player.y);
        let mut hall = Hall::new(snapshot.hall, player_at, events, rng)?;
        hall.player.lives = snapshot.player.lives;
        hall.player.inventory = snapshot.player.inventory.clone();
        for view in &snapshot.occupants {
            if matches!(view.kind, OccupantKind::Player) {
                continue;
            }
            hall.place(view.kind, Coord::new(view.x, view.y))?;
        }
        for rune in &snapshot.runes {
            hall.runes.insert(
                Coord::new(rune.x, rune.y),
                Rune {
                    revealed: rune.revealed,
                },
            );
        }
        Ok(hall)
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn changed(&self) {
        self.emit(SessionEvent::Changed);
    }
}

fn full_board() -> BTreeSet<Coord> {
    let mut cells = BTreeSet::new();
    for y in 0..BOARD_SIZE {
        for x in 0..BOARD_SIZE {
            cells.insert(Coord::new(x, y));
        }
    }
    cells
}
