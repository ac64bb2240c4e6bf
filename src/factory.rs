use crate::rng::Rng;
use crate::types::{MonsterKind, PickupKind};

/// Capability to decide what the scheduler spawns next. Constructed by the
/// embedder and handed to the session: plain dependency injection, no
/// process-wide state.
pub trait SpawnFactory: Send {
    fn next_monster(&mut self) -> MonsterKind;
    fn next_pickup(&mut self) -> PickupKind;
}

/// Uniform random choice over the monster and pickup kinds, deterministic
/// from its seed.
pub struct RandomSpawnFactory {
    rng: Rng,
}

impl RandomSpawnFactory {
    pub fn new(seed: u32) -> Self {
        Self {
            rng: Rng::seeded(seed),
        }
    }
}

impl SpawnFactory for RandomSpawnFactory {
    fn next_monster(&mut self) -> MonsterKind {
        match self.rng.range(0, 2) {
            0 => MonsterKind::Archer,
            1 => MonsterKind::Fighter,
            _ => MonsterKind::Wizard,
        }
    }

    fn next_pickup(&mut self) -> PickupKind {
        match self.rng.range(0, 4) {
            0 => PickupKind::ExtraLife,
            1 => PickupKind::Cloak,
            2 => PickupKind::Reveal,
            3 => PickupKind::LureGem,
            _ => PickupKind::ExtraTime,
        }
    }
}
