// Race state machine: Idle -> Countdown -> Running -> Finished -> Idle.
//
// The controller is the single writer of `RaceState`. Everything else gets
// snapshots or goes through the mutation API below.

use crate::domain::clock::{Clock, RaceClock};
use crate::domain::laps::{LapCompleted, update_laps};
use crate::domain::physics::{next_leader, tick_racer};
use crate::domain::{
    ConfigPatch, Player, RacePhase, RaceSnapshot, RaceState, TerrainMap, TrackConfig,
};
use std::sync::Arc;

// Draw-order parity flips once per this many simulation ticks.
const PARITY_PERIOD: u64 = 10;

/// What happened during one simulation tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    pub laps: Vec<(Player, LapCompleted)>,
    pub winner: Option<Player>,
}

pub struct RaceController {
    config: TrackConfig,
    // Staged configuration, swapped in on the next reset.
    pending_config: Option<TrackConfig>,
    terrain: Arc<TerrainMap>,
    state: RaceState,
    clock: RaceClock,
    // Bumped on start and reset; timers armed under an older epoch are stale.
    epoch: u64,
    tick: u64,
}

impl RaceController {
    pub fn new(config: TrackConfig, clock: Arc<dyn Clock>) -> Self {
        let config = config.clamped();
        Self {
            terrain: Arc::new(TerrainMap::build(&config)),
            config,
            pending_config: None,
            state: RaceState::new(),
            clock: RaceClock::new(clock),
            epoch: 0,
            tick: 0,
        }
    }

    pub fn phase(&self) -> RacePhase {
        self.state.phase
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn config(&self) -> &TrackConfig {
        &self.config
    }

    pub fn pending_config(&self) -> Option<&TrackConfig> {
        self.pending_config.as_ref()
    }

    pub fn terrain(&self) -> &Arc<TerrainMap> {
        &self.terrain
    }

    pub fn state(&self) -> &RaceState {
        &self.state
    }

    /// Idle -> Countdown. Returns false (and does nothing) from any other phase.
    pub fn start(&mut self) -> bool {
        if self.state.phase != RacePhase::Idle {
            return false;
        }
        self.state.phase = RacePhase::Countdown;
        self.epoch += 1;
        self.clock.restart();
        true
    }

    /// Countdown -> Running, if the countdown armed under `epoch` is still current.
    pub fn begin_race(&mut self, epoch: u64) -> bool {
        if self.state.phase != RacePhase::Countdown || epoch != self.epoch {
            return false;
        }

        let now = self.clock.now_ms();
        self.state.phase = RacePhase::Running;
        self.state.race_start_ms = Some(now);
        for player in Player::ALL {
            let racer = self.state.racer_mut(player);
            racer.armed = true;
            racer.lap_start_ms = Some(now);
            racer.lap_durations_ms.clear();
            racer.best_lap_ms = None;
            // Lap zero starts wherever the racer stands, so a mid-strip start earns no lap.
            racer.distance_at_race_start = racer.distance;
        }
        true
    }

    /// Control activation edge. Applies one impulse if the race runs and the latch is armed.
    pub fn press(&mut self, player: Player) -> bool {
        if !self.state.is_running() {
            return false;
        }
        let impulse = self.config.accel_impulse;
        let racer = self.state.racer_mut(player);
        if !racer.armed {
            return false;
        }
        racer.armed = false;
        racer.speed += impulse;
        true
    }

    /// Control released: re-arms the latch in any phase.
    pub fn release(&mut self, player: Player) {
        self.state.racer_mut(player).armed = true;
    }

    /// Advances the simulation by one tick using the race clock.
    pub fn step(&mut self) -> TickOutcome {
        if !matches!(self.state.phase, RacePhase::Countdown | RacePhase::Running) {
            return TickOutcome::default();
        }
        let (now, dt) = self.clock.next_frame();
        self.advance(now, dt)
    }

    /// Physics for both racers, then lap detection, then the win check.
    ///
    /// During the countdown only physics runs; laps and wins count from the green light.
    pub fn advance(&mut self, now_ms: f64, dt: f64) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if !matches!(self.state.phase, RacePhase::Countdown | RacePhase::Running) {
            return outcome;
        }

        tick_racer(&mut self.state.racer1, &self.terrain, &self.config, dt);
        tick_racer(&mut self.state.racer2, &self.terrain, &self.config, dt);
        self.state.leader = next_leader(
            self.state.leader,
            self.state.racer1.distance,
            self.state.racer2.distance,
        );

        self.tick += 1;
        if self.tick % PARITY_PERIOD == 0 {
            self.state.draw_order_parity = !self.state.draw_order_parity;
        }

        if self.state.phase != RacePhase::Running {
            return outcome;
        }

        for player in Player::ALL {
            let records = update_laps(self.state.racer_mut(player), self.config.length, now_ms);
            outcome
                .laps
                .extend(records.into_iter().map(|record| (player, record)));
        }

        // Racer one is evaluated first and wins a same-tick tie.
        let laps_to_win = self.config.laps_to_win;
        let winner = Player::ALL
            .into_iter()
            .find(|player| self.state.racer(*player).laps_completed >= laps_to_win);
        if let Some(player) = winner {
            self.state.phase = RacePhase::Finished;
            self.state.winner = Some(player);
            outcome.winner = Some(player);
        }

        outcome
    }

    /// Finished -> Idle once the announcement armed under `epoch` runs out.
    pub fn finish_elapsed(&mut self, epoch: u64) -> bool {
        if self.state.phase != RacePhase::Finished || epoch != self.epoch {
            return false;
        }
        self.reset();
        true
    }

    /// Returns to Idle from any phase, applying any staged configuration.
    pub fn reset(&mut self) {
        self.epoch += 1;
        self.state = RaceState::new();
        self.clock.restart();

        if let Some(config) = self.pending_config.take() {
            let reshaped =
                config.length != self.config.length || config.ramp_height != self.config.ramp_height;
            self.config = config;
            if reshaped {
                self.terrain = Arc::new(TerrainMap::build(&self.config));
            }
        }
    }

    /// Stages a new configuration. Applied at once when idle, otherwise on the next reset.
    pub fn stage_config(&mut self, config: TrackConfig) -> bool {
        self.pending_config = Some(config.clamped());
        if self.state.phase == RacePhase::Idle {
            self.reset();
            true
        } else {
            false
        }
    }

    /// Merges `patch` onto the staged config, or the active one when nothing is staged.
    pub fn stage_patch(&mut self, patch: &ConfigPatch) -> (TrackConfig, bool) {
        let base = self.pending_config.unwrap_or(self.config);
        let config = patch.apply_to(base);
        let applied = self.stage_config(config);
        (config, applied)
    }

    pub fn snapshot(&self) -> RaceSnapshot {
        let now = self.clock.now_ms();
        let race_elapsed_ms = self.state.race_start_ms.map(|start| now - start);
        RaceSnapshot {
            tick: self.tick,
            phase: self.state.phase,
            racer1: self.state.racer1.snapshot(now, race_elapsed_ms),
            racer2: self.state.racer2.snapshot(now, race_elapsed_ms),
            leader: self.state.leader,
            winner: self.state.winner,
            start_enabled: self.state.phase == RacePhase::Idle,
            race_elapsed_ms,
            draw_order_parity: self.state.draw_order_parity,
            config: self.config,
        }
    }
}
