use crate::interface_adapters::telemetry::TelemetryService;
use crate::use_cases::RaceHandle;
use axum::extract::ws::Utf8Bytes;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

pub struct AppState {
    // Channels into and out of the race task.
    pub race: RaceHandle,
    // Serial link to the display device.
    pub telemetry: Arc<TelemetryService>,
    // Serialized snapshots and events, shared across all observers.
    pub feed_tx: broadcast::Sender<Utf8Bytes>,
    // Latest serialized snapshot for new observers and lag recovery.
    pub feed_latest_tx: watch::Sender<Utf8Bytes>,
}
