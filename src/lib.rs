//! Concurrent entity-grid simulation core of the rune-halls game: a shared
//! 16x16 board mutated by one tokio task per live entity, a pausable
//! countdown, a spawn scheduler, and the session that ties them together.
//! The binaries expose it over WebSocket (`server`) and as a headless soak
//! runner (`simulate`).

pub mod clock;
pub mod constants;
pub mod factory;
pub mod hall;
pub mod layout;
pub mod protocol;
pub mod rng;
mod scheduler;
pub mod session;
pub mod types;
mod workers;
