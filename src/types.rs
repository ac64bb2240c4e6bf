use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::BOARD_SIZE;

/// Stable identity of a placed occupant. Moving an occupant relocates its
/// coordinate but never changes its id.
pub type EntityId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn in_bounds(&self) -> bool {
        self.x >= 0 && self.y >= 0 && self.x < BOARD_SIZE && self.y < BOARD_SIZE
    }

    pub fn offset(&self, dir: Direction) -> Coord {
        match dir {
            Direction::Up => Coord::new(self.x, self.y - 1),
            Direction::Down => Coord::new(self.x, self.y + 1),
            Direction::Left => Coord::new(self.x - 1, self.y),
            Direction::Right => Coord::new(self.x + 1, self.y),
        }
    }

    pub fn manhattan(&self, other: Coord) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    pub fn adjacent(&self, other: Coord) -> bool {
        self.manhattan(other) == 1
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HallKind {
    Earth,
    Air,
    Water,
    Fire,
}

impl HallKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "earth" => Some(Self::Earth),
            "air" => Some(Self::Air),
            "water" => Some(Self::Water),
            "fire" => Some(Self::Fire),
            _ => None,
        }
    }

    /// The hall that follows this one, or `None` after the final hall.
    pub fn next(self) -> Option<HallKind> {
        match self {
            Self::Earth => Some(Self::Air),
            Self::Air => Some(Self::Water),
            Self::Water => Some(Self::Fire),
            Self::Fire => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObstacleKind {
    Wall,
    CrackedWall,
    Block,
    Chest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickupKind {
    ExtraLife,
    Cloak,
    Reveal,
    LureGem,
    ExtraTime,
}

impl PickupKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "extra_life" => Some(Self::ExtraLife),
            "cloak" => Some(Self::Cloak),
            "reveal" => Some(Self::Reveal),
            "lure_gem" => Some(Self::LureGem),
            "extra_time" => Some(Self::ExtraTime),
            _ => None,
        }
    }

    /// Whether collection stores the item for later use instead of applying
    /// its effect on the spot.
    pub fn goes_to_inventory(self) -> bool {
        matches!(self, Self::Cloak | Self::Reveal | Self::LureGem)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonsterKind {
    Archer,
    Fighter,
    Wizard,
}

/// Closed set of things a cell can hold. Rendering and interaction rules
/// dispatch on this tag; each variant carries only the data its kind needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccupantKind {
    Obstacle(ObstacleKind),
    Pickup(PickupKind),
    Monster(MonsterKind),
    Player,
}

impl OccupantKind {
    pub fn is_obstacle(&self) -> bool {
        matches!(self, Self::Obstacle(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Occupant {
    pub id: EntityId,
    pub kind: OccupantKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    PlayerDied,
    TimeExpired,
    Victory,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Something on the board changed; the UI should redraw.
    Changed,
    ClockTick {
        remaining: i64,
    },
    PlayerDamaged {
        lives: i32,
    },
    PickupCollected {
        kind: PickupKind,
    },
    RuneRevealed {
        x: i32,
        y: i32,
    },
    RuneHint {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        #[serde(rename = "validMs")]
        valid_ms: u64,
    },
    HallCleared {
        hall: HallKind,
    },
    GameOver {
        reason: EndReason,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MonsterCounts {
    pub archers: usize,
    pub fighters: usize,
    pub wizards: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OccupantView {
    pub kind: OccupantKind,
    pub x: i32,
    pub y: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuneView {
    pub x: i32,
    pub y: i32,
    pub revealed: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub x: i32,
    pub y: i32,
    pub lives: i32,
    pub inventory: BTreeMap<PickupKind, u32>,
}

/// Plain-data view of a whole session, sufficient for an external
/// persistence adapter to serialize and restore a game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub hall: HallKind,
    #[serde(rename = "remainingSecs")]
    pub remaining_secs: i64,
    #[serde(rename = "totalSecs")]
    pub total_secs: i64,
    pub occupants: Vec<OccupantView>,
    pub runes: Vec<RuneView>,
    pub player: PlayerView,
    #[serde(rename = "savedAt")]
    pub saved_at: String,
}
