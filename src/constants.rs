use crate::types::HallKind;

pub const BOARD_SIZE: i32 = 16;
pub const BOARD_CELLS: usize = (BOARD_SIZE * BOARD_SIZE) as usize;

pub const START_LIVES: i32 = 3;
pub const MAX_LIVES: i32 = 3;

pub const ARCHER_RANGE: i32 = 4;
pub const ARCHER_DAMAGE: i32 = 1;
pub const ARCHER_TICK_MS: u64 = 5_000;
pub const FIGHTER_DAMAGE: i32 = 1;
pub const FIGHTER_TICK_MS: u64 = 500;
pub const WIZARD_TICK_MS: u64 = 1_000;
pub const PICKUP_TICK_MS: u64 = 1_000;
pub const PICKUP_DESPAWN_TICKS: u32 = 6;

pub const CLOCK_TICK_MS: u64 = 1_000;
pub const EXTRA_TIME_SECS: i64 = 5;

pub const MONSTER_SPAWN_WAIT_MS: u64 = 12_000;
pub const PICKUP_SPAWN_WAIT_MS: u64 = 3_000;
pub const WIZARD_CAP: usize = 1;

pub const RELOCATE_PLAYER_BELOW_PERCENT: f64 = 30.0;
pub const RELOCATE_RUNE_ABOVE_PERCENT: f64 = 70.0;
pub const DORMANT_GRACE_MS: u64 = 2_000;
pub const RELOCATE_PLAYER_DELAY_MS: u64 = 1_000;
pub const RELOCATE_RUNE_PERIOD_MS: u64 = 3_000;

pub const CLOAK_DURATION_MS: u64 = 6_000;
pub const RUNE_HINT_SPAN: i32 = 4;
pub const RUNE_HINT_VALID_MS: u64 = 10_000;

pub fn hall_time_limit_secs(kind: HallKind) -> i64 {
    match kind {
        HallKind::Earth => 30,
        HallKind::Air => 45,
        HallKind::Water => 65,
        HallKind::Fire => 85,
    }
}

pub fn hall_obstacle_budget(kind: HallKind) -> usize {
    match kind {
        HallKind::Earth => 6,
        HallKind::Air => 9,
        HallKind::Water => 13,
        HallKind::Fire => 17,
    }
}
