// Use-case level inputs/outputs for the race loop.

use crate::domain::{ConfigPatch, Player, TrackConfig};
use serde::Serialize;
use tokio::sync::oneshot;

/// Lap beeps played per racer per tick, at most.
pub const MAX_LAP_CUES_PER_TICK: usize = 3;

#[derive(Debug)]
pub enum RaceCommand {
    Start,
    Reset,
    // Control activation edge (pressed).
    Press { player: Player },
    // Control released; re-arms the impulse latch.
    Release { player: Player },
    // Merged onto the staged config when one is waiting, else onto the active one.
    ApplyConfig {
        patch: ConfigPatch,
        reply: Option<oneshot::Sender<ConfigStaged>>,
    },
}

/// Result of staging a configuration patch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfigStaged {
    pub config: TrackConfig,
    // False while a race is underway; the config waits for the next reset.
    pub applied: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RaceEvent {
    CountdownStarted { green_in_ms: u64 },
    Green,
    LapCompleted {
        player: Player,
        lap: u32,
        duration_ms: f64,
        // False for records past the per-tick cue limit.
        cue: bool,
    },
    Winner { player: Player },
    Reset,
}
