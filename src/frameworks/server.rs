// Framework bootstrap for the race server runtime.

use crate::domain::MonotonicClock;
use crate::frameworks::config;
use crate::interface_adapters::net::{
    command_handler, config_handler, connect_handler, disconnect_handler, race_handler,
    spawn_feed_serializer, status_handler, terrain_handler, test_handler, ws_handler,
};
use crate::interface_adapters::serial::SerialConnector;
use crate::interface_adapters::state::AppState;
use crate::interface_adapters::telemetry::TelemetryService;
use crate::use_cases::{RaceSettings, RaceTiming, spawn_race};

use axum::{
    Router,
    extract::ws::Utf8Bytes,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::{io::Result, sync::Arc};
use tokio::sync::{broadcast, watch};

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/status", get(status_handler))
        .route("/api/race", get(race_handler))
        .route("/api/terrain", get(terrain_handler))
        .route("/api/command", post(command_handler))
        .route("/api/config", post(config_handler))
        .route("/api/telemetry/connect", post(connect_handler))
        .route("/api/telemetry/disconnect", post(disconnect_handler))
        .route("/api/telemetry/test", post(test_handler))
        .with_state(state)
}

pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    let address = listener.local_addr()?;
    let state = build_state().await;
    let app = router(state.clone());

    tracing::info!(%address, "listening");

    // Serve app and report errors rather than panicking
    let served = axum::serve(listener, app).await.inspect_err(|e| {
        tracing::error!(error = %e, "server error");
    });

    state.race.shutdown.notify_one();
    let _ = state.telemetry.disconnect().await;
    served
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::http_port()));

    // Bind TCP listener with error handling
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

async fn build_state() -> Arc<AppState> {
    let track = config::track_config_or_default(&config::track_file());

    // The race task is the single owner of race state.
    let race = spawn_race(
        &RaceSettings {
            command_channel_capacity: config::COMMAND_CHANNEL_CAPACITY,
            event_broadcast_capacity: config::EVENT_BROADCAST_CAPACITY,
            timing: RaceTiming {
                tick_interval: config::TICK_INTERVAL,
                countdown: config::COUNTDOWN,
                win_delay: config::WIN_ANNOUNCEMENT,
            },
        },
        track,
        Arc::new(MonotonicClock::new()),
    );

    let serial_port = config::serial_port();
    let connector = SerialConnector::new(
        serial_port
            .clone()
            .unwrap_or_else(|| config::DEFAULT_SERIAL_PORT.to_string()),
        config::baud_rate(),
        config::RESET_PULSE,
    );
    tracing::debug!(
        port = connector.path(),
        baud = config::baud_rate(),
        "serial connector configured"
    );
    let telemetry = Arc::new(TelemetryService::new(
        Arc::new(connector),
        race.snapshot_rx.clone(),
        config::STATE_SEND_INTERVAL,
    ));

    let (feed_tx, _feed_rx) = broadcast::channel::<Utf8Bytes>(config::FEED_BROADCAST_CAPACITY);
    let (feed_latest_tx, _feed_latest_rx) = watch::channel::<Utf8Bytes>(Utf8Bytes::from(""));

    let state = Arc::new(AppState {
        race,
        telemetry,
        feed_tx,
        feed_latest_tx,
    });
    spawn_feed_serializer(&state);

    if serial_port.is_some() {
        // Transport errors are non-fatal; the race keeps running untethered.
        if let Err(e) = state.telemetry.connect().await {
            tracing::warn!(error = %e, "telemetry auto-connect failed");
        }
    }

    state
}
