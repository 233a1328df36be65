use super::controller::{RaceController, TickOutcome};
use super::types::{ConfigStaged, MAX_LAP_CUES_PER_TICK, RaceCommand, RaceEvent};
use crate::domain::{Player, RacePhase, RaceSnapshot, TerrainMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, broadcast, mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Fixed delays driving the race lifecycle.
#[derive(Debug, Clone, Copy)]
pub struct RaceTiming {
    pub tick_interval: Duration,
    pub countdown: Duration,
    pub win_delay: Duration,
}

/// Output channels the race task publishes to.
pub struct RacePublishers {
    pub snapshot_tx: watch::Sender<RaceSnapshot>,
    pub terrain_tx: watch::Sender<Arc<TerrainMap>>,
    pub event_tx: broadcast::Sender<RaceEvent>,
}

// A pending deadline tagged with the controller epoch it was armed under.
#[derive(Debug, Clone, Copy)]
struct Timer {
    at: Instant,
    epoch: u64,
}

// Resolves with the timer's epoch at its deadline; never resolves when unset.
async fn wait_for(timer: Option<Timer>) -> u64 {
    match timer {
        Some(timer) => {
            tokio::time::sleep_until(timer.at).await;
            timer.epoch
        }
        None => std::future::pending().await,
    }
}

/// Single owner of the race controller. Runs until shutdown or until every
/// command sender is dropped.
pub async fn race_task(
    mut controller: RaceController,
    mut command_rx: mpsc::Receiver<RaceCommand>,
    publishers: RacePublishers,
    timing: RaceTiming,
    shutdown: Arc<Notify>,
) {
    let mut interval = tokio::time::interval(timing.tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut countdown: Option<Timer> = None;
    let mut announcement: Option<Timer> = None;

    publishers.terrain_tx.send_replace(controller.terrain().clone());
    publishers.snapshot_tx.send_replace(controller.snapshot());

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                debug!("race loop stopping");
                break;
            }
            command = command_rx.recv() => {
                let Some(command) = command else {
                    break;
                };
                let terrain_before = controller.terrain().clone();
                match command {
                    RaceCommand::Start => {
                        if controller.start() {
                            countdown = Some(Timer {
                                at: Instant::now() + timing.countdown,
                                epoch: controller.epoch(),
                            });
                            announcement = None;
                            info!(countdown_ms = timing.countdown.as_millis() as u64, "countdown started");
                            let _ = publishers.event_tx.send(RaceEvent::CountdownStarted {
                                green_in_ms: timing.countdown.as_millis() as u64,
                            });
                        } else {
                            debug!(phase = ?controller.phase(), "start ignored");
                        }
                    }
                    RaceCommand::Reset => {
                        controller.reset();
                        countdown = None;
                        announcement = None;
                        info!("race reset");
                        let _ = publishers.event_tx.send(RaceEvent::Reset);
                    }
                    RaceCommand::Press { player } => {
                        let applied = controller.press(player);
                        debug!(player = player.number(), applied, "press");
                    }
                    RaceCommand::Release { player } => {
                        controller.release(player);
                    }
                    RaceCommand::ApplyConfig { patch, reply } => {
                        let (config, applied) = controller.stage_patch(&patch);
                        info!(applied, length = config.length, laps_to_win = config.laps_to_win, "config staged");
                        if applied {
                            let _ = publishers.event_tx.send(RaceEvent::Reset);
                        }
                        if let Some(reply) = reply {
                            let _ = reply.send(ConfigStaged { config, applied });
                        }
                    }
                }
                publish_terrain_if_changed(&publishers, &terrain_before, &controller);
            }
            epoch = wait_for(countdown) => {
                countdown = None;
                if controller.begin_race(epoch) {
                    info!("green light");
                    let _ = publishers.event_tx.send(RaceEvent::Green);
                }
            }
            epoch = wait_for(announcement) => {
                announcement = None;
                let terrain_before = controller.terrain().clone();
                if controller.finish_elapsed(epoch) {
                    info!("race reset after win");
                    let _ = publishers.event_tx.send(RaceEvent::Reset);
                    publish_terrain_if_changed(&publishers, &terrain_before, &controller);
                }
            }
            _ = interval.tick() => {
                if !matches!(controller.phase(), RacePhase::Countdown | RacePhase::Running) {
                    continue;
                }
                let outcome = controller.step();
                if let Some(player) = outcome.winner {
                    announcement = Some(Timer {
                        at: Instant::now() + timing.win_delay,
                        epoch: controller.epoch(),
                    });
                    info!(player = player.number(), "winner");
                }
                publish_outcome(&publishers.event_tx, outcome);
            }
        }

        publishers.snapshot_tx.send_replace(controller.snapshot());
    }
}

fn publish_terrain_if_changed(
    publishers: &RacePublishers,
    before: &Arc<TerrainMap>,
    controller: &RaceController,
) {
    if !Arc::ptr_eq(before, controller.terrain()) {
        publishers.terrain_tx.send_replace(controller.terrain().clone());
    }
}

// Lap events first, then the winner, so observers see the deciding lap before the result.
fn publish_outcome(event_tx: &broadcast::Sender<RaceEvent>, outcome: TickOutcome) {
    for player in Player::ALL {
        let laps = outcome.laps.iter().filter(|(who, _)| *who == player);
        for (index, (_, record)) in laps.enumerate() {
            info!(
                player = player.number(),
                lap = record.lap,
                duration_ms = record.duration_ms,
                "lap completed"
            );
            let _ = event_tx.send(RaceEvent::LapCompleted {
                player,
                lap: record.lap,
                duration_ms: record.duration_ms,
                cue: index < MAX_LAP_CUES_PER_TICK,
            });
        }
    }
    if let Some(player) = outcome.winner {
        let _ = event_tx.send(RaceEvent::Winner { player });
    }
}
