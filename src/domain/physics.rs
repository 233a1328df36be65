use super::config::TrackConfig;
use super::state::{Player, RacerState};
use super::terrain::{BASELINE, TerrainMap};

/// Strip index under `distance`, wrapped with a floored modulo.
pub fn track_position(distance: f64, length: usize) -> usize {
    if length == 0 {
        return 0;
    }
    (distance.floor() as i64).rem_euclid(length as i64) as usize
}

/// Integrates one racer for one step of size `dt`.
pub fn tick_racer(racer: &mut RacerState, terrain: &TerrainMap, config: &TrackConfig, dt: f64) {
    let gravity = terrain.get(track_position(racer.distance, terrain.len()));

    // slope
    if gravity < BASELINE {
        racer.speed -= config.gravity * (BASELINE - gravity) * dt;
    }
    if gravity > BASELINE {
        racer.speed += config.gravity * (gravity - BASELINE) * dt;
    }

    // friction decays speed toward zero (and amplifies it if already negative)
    racer.speed -= racer.speed * config.friction * dt;

    racer.distance += racer.speed * dt;
}

/// Strictly greater distance takes the lead; a tie keeps the current leader.
pub fn next_leader(current: Option<Player>, distance1: f64, distance2: f64) -> Option<Player> {
    if distance1 > distance2 {
        Some(Player::One)
    } else if distance2 > distance1 {
        Some(Player::Two)
    } else {
        current
    }
}
