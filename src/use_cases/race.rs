// Race orchestration: wires channels and spawns the race task.

use super::controller::RaceController;
use super::race_loop::{RacePublishers, RaceTiming, race_task};
use super::types::{RaceCommand, RaceEvent};
use crate::domain::{Clock, RaceSnapshot, TerrainMap, TrackConfig};
use std::sync::Arc;
use tokio::sync::{Notify, broadcast, mpsc, watch};

/// Shared configuration for spawning the race task.
#[derive(Debug, Clone)]
pub struct RaceSettings {
    /// Capacity for inbound race commands.
    pub command_channel_capacity: usize,
    /// Capacity for broadcast race events.
    pub event_broadcast_capacity: usize,
    pub timing: RaceTiming,
}

/// Error returned when the race task is no longer accepting commands.
#[derive(Debug)]
pub struct RaceStopped;

/// Channels for talking to a running race task.
#[derive(Clone)]
pub struct RaceHandle {
    /// Sender for commands into the race task.
    pub command_tx: mpsc::Sender<RaceCommand>,
    /// Latest published race snapshot.
    pub snapshot_rx: watch::Receiver<RaceSnapshot>,
    /// Current gravity map.
    pub terrain_rx: watch::Receiver<Arc<TerrainMap>>,
    /// Broadcast sender for race events (subscribe to observe).
    pub event_tx: broadcast::Sender<RaceEvent>,
    /// Stops the race task when notified.
    pub shutdown: Arc<Notify>,
}

impl RaceHandle {
    pub async fn send(&self, command: RaceCommand) -> Result<(), RaceStopped> {
        self.command_tx.send(command).await.map_err(|_| RaceStopped)
    }

    pub fn snapshot(&self) -> RaceSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn terrain(&self) -> Arc<TerrainMap> {
        self.terrain_rx.borrow().clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RaceEvent> {
        self.event_tx.subscribe()
    }
}

/// Creates the race controller and spawns its authoritative loop.
pub fn spawn_race(settings: &RaceSettings, config: TrackConfig, clock: Arc<dyn Clock>) -> RaceHandle {
    let controller = RaceController::new(config, clock);

    let (command_tx, command_rx) = mpsc::channel::<RaceCommand>(settings.command_channel_capacity);
    let (snapshot_tx, snapshot_rx) = watch::channel(controller.snapshot());
    let (terrain_tx, terrain_rx) = watch::channel(controller.terrain().clone());
    let (event_tx, _event_rx) = broadcast::channel::<RaceEvent>(settings.event_broadcast_capacity);
    let shutdown = Arc::new(Notify::new());

    tokio::spawn(race_task(
        controller,
        command_rx,
        RacePublishers {
            snapshot_tx,
            terrain_tx,
            event_tx: event_tx.clone(),
        },
        settings.timing,
        shutdown.clone(),
    ));

    RaceHandle {
        command_tx,
        snapshot_rx,
        terrain_rx,
        event_tx,
        shutdown,
    }
}
