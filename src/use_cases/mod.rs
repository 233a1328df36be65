// Use cases layer: race orchestration on top of the domain rules.

pub mod controller;
pub mod race;
pub mod race_loop;
pub mod types;

pub use controller::{RaceController, TickOutcome};
pub use race::{RaceHandle, RaceSettings, RaceStopped, spawn_race};
pub use race_loop::RaceTiming;
pub use types::{ConfigStaged, RaceCommand, RaceEvent};
