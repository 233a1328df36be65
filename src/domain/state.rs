// Domain-level race state and read-only snapshots handed to observers.

use super::config::TrackConfig;
use serde::{Deserialize, Serialize};

/// One of the two competitors. Serialized as `1` or `2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Player {
    One,
    Two,
}

impl Player {
    pub const ALL: [Player; 2] = [Player::One, Player::Two];

    pub fn number(self) -> u8 {
        match self {
            Player::One => 1,
            Player::Two => 2,
        }
    }
}

impl TryFrom<u8> for Player {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Player::One),
            2 => Ok(Player::Two),
            other => Err(format!("unknown player {other}")),
        }
    }
}

impl From<Player> for u8 {
    fn from(player: Player) -> Self {
        player.number()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RacePhase {
    Idle,
    Countdown,
    Running,
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RacerState {
    pub speed: f64,
    pub distance: f64,
    pub laps_completed: u32,
    pub lap_start_ms: Option<f64>,
    // Chronological order.
    pub lap_durations_ms: Vec<f64>,
    pub best_lap_ms: Option<f64>,
    pub distance_at_race_start: f64,
    // Cleared when an impulse is applied, re-armed on release.
    pub armed: bool,
}

impl RacerState {
    pub fn new() -> Self {
        Self {
            speed: 0.0,
            distance: 0.0,
            laps_completed: 0,
            lap_start_ms: None,
            lap_durations_ms: Vec::new(),
            best_lap_ms: None,
            distance_at_race_start: 0.0,
            armed: true,
        }
    }

    /// Snapshot including derived timing statistics.
    pub fn snapshot(&self, now_ms: f64, race_elapsed_ms: Option<f64>) -> RacerSnapshot {
        let average_speed = match race_elapsed_ms {
            Some(elapsed) if elapsed > 0.0 => {
                (self.distance - self.distance_at_race_start) / (elapsed / 1000.0)
            }
            _ => 0.0,
        };

        RacerSnapshot {
            speed: self.speed,
            distance: self.distance,
            laps: self.laps_completed,
            average_speed,
            current_lap_ms: self.lap_start_ms.map(|start| now_ms - start),
            last_lap_ms: self.lap_durations_ms.last().copied(),
            best_lap_ms: self.best_lap_ms,
            lap_times_ms: self.lap_durations_ms.clone(),
            armed: self.armed,
        }
    }
}

impl Default for RacerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Authoritative state of one race. Only the race controller mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceState {
    pub racer1: RacerState,
    pub racer2: RacerState,
    pub leader: Option<Player>,
    pub phase: RacePhase,
    pub winner: Option<Player>,
    pub race_start_ms: Option<f64>,
    // Cosmetic renderer tie-break only.
    pub draw_order_parity: bool,
}

impl RaceState {
    pub fn new() -> Self {
        Self {
            racer1: RacerState::new(),
            racer2: RacerState::new(),
            leader: None,
            phase: RacePhase::Idle,
            winner: None,
            race_start_ms: None,
            draw_order_parity: false,
        }
    }

    pub fn racer(&self, player: Player) -> &RacerState {
        match player {
            Player::One => &self.racer1,
            Player::Two => &self.racer2,
        }
    }

    pub fn racer_mut(&mut self, player: Player) -> &mut RacerState {
        match player {
            Player::One => &mut self.racer1,
            Player::Two => &mut self.racer2,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == RacePhase::Running
    }
}

impl Default for RaceState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RacerSnapshot {
    pub speed: f64,
    pub distance: f64,
    pub laps: u32,
    /// Strip positions per second since the green light.
    pub average_speed: f64,
    pub current_lap_ms: Option<f64>,
    pub last_lap_ms: Option<f64>,
    pub best_lap_ms: Option<f64>,
    pub lap_times_ms: Vec<f64>,
    pub armed: bool,
}

/// Immutable view of the race published after every tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceSnapshot {
    pub tick: u64,
    pub phase: RacePhase,
    pub racer1: RacerSnapshot,
    pub racer2: RacerSnapshot,
    pub leader: Option<Player>,
    pub winner: Option<Player>,
    pub start_enabled: bool,
    pub race_elapsed_ms: Option<f64>,
    pub draw_order_parity: bool,
    pub config: TrackConfig,
}

impl RaceSnapshot {
    pub fn racer(&self, player: Player) -> &RacerSnapshot {
        match player {
            Player::One => &self.racer1,
            Player::Two => &self.racer2,
        }
    }

    /// Leader as a wire code: 0 none, 1 or 2.
    pub fn leader_code(&self) -> u8 {
        self.leader.map_or(0, Player::number)
    }
}

impl Default for RaceSnapshot {
    fn default() -> Self {
        let idle = RacerState::new().snapshot(0.0, None);
        Self {
            tick: 0,
            phase: RacePhase::Idle,
            racer1: idle.clone(),
            racer2: idle,
            leader: None,
            winner: None,
            start_enabled: true,
            race_elapsed_ms: None,
            draw_order_parity: false,
            config: TrackConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_numbers_round_trip_through_serde() {
        let json = serde_json::to_string(&Player::Two).expect("serialize player");
        assert_eq!(json, "2");
        let parsed: Player = serde_json::from_str("1").expect("parse player");
        assert_eq!(parsed, Player::One);
        assert!(serde_json::from_str::<Player>("3").is_err());
    }

    #[test]
    fn average_speed_uses_distance_since_green() {
        let racer = RacerState {
            distance: 150.0,
            distance_at_race_start: 50.0,
            ..RacerState::new()
        };

        let snapshot = racer.snapshot(0.0, Some(4_000.0));
        assert_eq!(snapshot.average_speed, 25.0);

        let before_green = racer.snapshot(0.0, None);
        assert_eq!(before_green.average_speed, 0.0);
    }

    #[test]
    fn current_lap_is_measured_from_lap_start() {
        let racer = RacerState {
            lap_start_ms: Some(1_000.0),
            lap_durations_ms: vec![4_000.0, 3_500.0],
            best_lap_ms: Some(3_500.0),
            ..RacerState::new()
        };

        let snapshot = racer.snapshot(2_250.0, Some(8_750.0));
        assert_eq!(snapshot.current_lap_ms, Some(1_250.0));
        assert_eq!(snapshot.last_lap_ms, Some(3_500.0));
        assert_eq!(snapshot.best_lap_ms, Some(3_500.0));
    }
}
