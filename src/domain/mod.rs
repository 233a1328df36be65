// Domain layer: race simulation types and rules.

pub mod clock;
pub mod config;
pub mod laps;
pub mod physics;
pub mod state;
pub mod terrain;

pub use clock::{Clock, MonotonicClock, RaceClock};
pub use config::{ConfigPatch, TrackConfig};
pub use laps::{LapCompleted, format_lap_time};
pub use state::{Player, RacePhase, RaceSnapshot, RaceState, RacerSnapshot, RacerState};
pub use terrain::TerrainMap;
