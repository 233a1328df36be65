// Lap detection and lap-time bookkeeping.

use super::state::RacerState;

/// One lap credited to a racer during a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LapCompleted {
    /// 1-based lap number.
    pub lap: u32,
    pub duration_ms: f64,
}

/// Whole laps covered since the start-of-race baseline.
pub fn completed_laps(distance: f64, distance_at_race_start: f64, length: usize) -> u32 {
    if length == 0 {
        return 0;
    }
    ((distance - distance_at_race_start).max(0.0) / length as f64).floor() as u32
}

/// Credits any newly completed laps to `racer`, never decreasing its count.
///
/// When one tick covers several laps, every lap gets a record stamped with the
/// same `now_ms`: the first carries the time since the lap started, the rest
/// are zero-length. This is an accepted approximation.
pub fn update_laps(racer: &mut RacerState, length: usize, now_ms: f64) -> Vec<LapCompleted> {
    let completed = completed_laps(racer.distance, racer.distance_at_race_start, length);
    if completed <= racer.laps_completed {
        return Vec::new();
    }

    let mut records = Vec::with_capacity((completed - racer.laps_completed) as usize);
    for lap in racer.laps_completed + 1..=completed {
        let duration_ms = now_ms - racer.lap_start_ms.unwrap_or(now_ms);
        racer.lap_start_ms = Some(now_ms);
        racer.lap_durations_ms.push(duration_ms);
        racer.best_lap_ms = Some(match racer.best_lap_ms {
            Some(best) => best.min(duration_ms),
            None => duration_ms,
        });
        records.push(LapCompleted { lap, duration_ms });
    }
    racer.laps_completed = completed;
    records
}

/// Renders a lap time as `[minutes:]SS.mmm`; absent times render as `—`.
pub fn format_lap_time(ms: Option<f64>) -> String {
    let Some(ms) = ms.filter(|ms| ms.is_finite()) else {
        return "—".to_string();
    };
    let total = ms.round().max(0.0) as u64;
    let minutes = total / 60_000;
    let seconds = (total % 60_000) / 1000;
    let millis = total % 1000;
    if minutes > 0 {
        format!("{minutes}:{seconds:02}.{millis:03}")
    } else {
        format!("{seconds:02}.{millis:03}")
    }
}
