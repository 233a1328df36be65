use crate::domain::RaceSnapshot;
use crate::interface_adapters::protocol::{ClientCommand, ServerMessage};
use crate::interface_adapters::state::AppState;
use crate::use_cases::{RaceCommand, RaceEvent};

use axum::{
    Error,
    extract::{
        State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures::SinkExt;
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{Instrument, debug, error, info, info_span, warn};

const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_INVALID_JSON: u32 = 10;

#[derive(Debug)]
enum NetError {
    #[allow(dead_code)]
    Ws(axum::Error),
    RaceClosed,
    FeedClosed,
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

fn next_connection_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

fn encode(message: &ServerMessage) -> Option<Utf8Bytes> {
    match serde_json::to_string(message) {
        Ok(txt) => Some(Utf8Bytes::from(txt)),
        Err(e) => {
            error!(error = ?e, "failed to serialize feed message");
            None
        }
    }
}

/// Serializes every snapshot and race event once and shares the bytes with all observers.
pub async fn feed_serializer(
    mut snapshot_rx: watch::Receiver<RaceSnapshot>,
    mut event_rx: broadcast::Receiver<RaceEvent>,
    feed_tx: broadcast::Sender<Utf8Bytes>,
    feed_latest_tx: watch::Sender<Utf8Bytes>,
) {
    loop {
        tokio::select! {
            // Events of a tick are sent before its snapshot is published.
            biased;
            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        if let Some(bytes) = encode(&ServerMessage::Event(event)) {
                            let _ = feed_tx.send(bytes);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "feed serializer lagged on race events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("race events channel closed; serializer exiting");
                        break;
                    }
                }
            }
            changed = snapshot_rx.changed() => {
                if changed.is_err() {
                    warn!("snapshot channel closed; serializer exiting");
                    break;
                }
                let snapshot = snapshot_rx.borrow_and_update().clone();
                if let Some(bytes) = encode(&ServerMessage::Snapshot(snapshot.into())) {
                    // Keep the latest snapshot for new observers and lag recovery.
                    feed_latest_tx.send_replace(bytes.clone());
                    let _ = feed_tx.send(bytes);
                }
            }
        }
    }
}

/// Seeds the latest-snapshot slot and spawns the feed serializer.
pub fn spawn_feed_serializer(state: &AppState) {
    let snapshot = state.race.snapshot();
    if let Some(bytes) = encode(&ServerMessage::Snapshot(snapshot.into())) {
        state.feed_latest_tx.send_replace(bytes);
    }
    tokio::spawn(feed_serializer(
        state.race.snapshot_rx.clone(),
        state.race.subscribe_events(),
        state.feed_tx.clone(),
        state.feed_latest_tx.clone(),
    ));
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let span = info_span!("conn", conn_id = next_connection_id());
    ws.on_upgrade(move |socket| handle_socket(socket, state).instrument(span))
}

struct ConnCtx {
    command_tx: mpsc::Sender<RaceCommand>,
    feed_rx: broadcast::Receiver<Utf8Bytes>,
    feed_latest_rx: watch::Receiver<Utf8Bytes>,

    msgs_in: u64,
    msgs_out: u64,
    bytes_in: u64,
    bytes_out: u64,
    invalid_json: u32,
    lag_recovery_count: u64,

    last_command_full_log: Instant,
    last_feed_lag_log: Instant,
    last_invalid_log: Instant,

    close_frame: Option<CloseFrame>,
}

enum LoopControl {
    Continue,
    Disconnect,
}

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    // Subscribe before sending anything so no feed message is missed.
    let feed_rx = state.feed_tx.subscribe();
    let feed_latest_rx = state.feed_latest_tx.subscribe();

    let initial = feed_latest_rx.borrow().clone();
    if !initial.is_empty() {
        if let Err(e) = socket.send(Message::Text(initial)).await {
            warn!(error = %e, "failed to send initial snapshot");
            return;
        }
    }

    let now = Instant::now() - LOG_THROTTLE;
    let mut ctx = ConnCtx {
        command_tx: state.race.command_tx.clone(),
        feed_rx,
        feed_latest_rx,
        msgs_in: 0,
        msgs_out: 1,
        bytes_in: 0,
        bytes_out: 0,
        invalid_json: 0,
        lag_recovery_count: 0,
        last_command_full_log: now,
        last_feed_lag_log: now,
        last_invalid_log: now,
        close_frame: None,
    };
    info!("observer connected");

    if let Err(e) = run_client_loop(&mut socket, &mut ctx).await {
        warn!(error = ?e, "client loop exited with error");
    }

    debug!(
        msgs_in = ctx.msgs_in,
        msgs_out = ctx.msgs_out,
        bytes_in = ctx.bytes_in,
        bytes_out = ctx.bytes_out,
        invalid_json = ctx.invalid_json,
        lag_recovery_count = ctx.lag_recovery_count,
        "connection stats"
    );
    info!("observer disconnected");
}

async fn run_client_loop(socket: &mut WebSocket, ctx: &mut ConnCtx) -> Result<(), NetError> {
    let mut fatal: Option<NetError> = None;

    loop {
        let disconnect = tokio::select! {
            incoming = socket.recv() => {
                match handle_incoming_ws(incoming, ctx).await {
                    Ok(LoopControl::Continue) => false,
                    Ok(LoopControl::Disconnect) => true,
                    Err(e) => {
                        fatal = Some(e);
                        true
                    }
                }
            }
            feed = ctx.feed_rx.recv() => {
                match feed {
                    Ok(bytes) => matches!(
                        forward_bytes(bytes, socket, ctx).await,
                        LoopControl::Disconnect
                    ),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        if should_log(&mut ctx.last_feed_lag_log) {
                            warn!(missed = n, "feed lagged; sending latest snapshot");
                        }
                        // Resync with the newest snapshot; skipped events are lost.
                        let latest = ctx.feed_latest_rx.borrow().clone();
                        ctx.lag_recovery_count += 1;
                        matches!(
                            forward_bytes(latest, socket, ctx).await,
                            LoopControl::Disconnect
                        )
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        fatal = Some(NetError::FeedClosed);
                        true
                    }
                }
            }
        };

        if disconnect {
            if let Some(frame) = ctx.close_frame.take() {
                let _ = socket.send(Message::Close(Some(frame))).await;
            }
            if let Err(err) = socket.close().await.map_err(NetError::Ws) {
                debug!(error = ?err, "socket close error");
            }
            break;
        }
    }

    match fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn handle_incoming_ws(
    incoming: Option<Result<Message, Error>>,
    ctx: &mut ConnCtx,
) -> Result<LoopControl, NetError> {
    match incoming {
        Some(Ok(Message::Text(text))) => {
            ctx.msgs_in += 1;
            ctx.bytes_in += text.len() as u64;

            match serde_json::from_str::<ClientCommand>(&text) {
                Ok(command) => send_command(ctx, command.into()).await,
                Err(parse_err) => {
                    ctx.invalid_json += 1;
                    if should_log(&mut ctx.last_invalid_log) {
                        warn!(bytes = text.len(), error = %parse_err, "failed to parse client command");
                    }
                    if ctx.invalid_json > MAX_INVALID_JSON {
                        ctx.close_frame = Some(CloseFrame {
                            code: close_code::POLICY,
                            reason: "too many invalid messages".into(),
                        });
                        return Ok(LoopControl::Disconnect);
                    }
                    Ok(LoopControl::Continue)
                }
            }
        }
        Some(Ok(Message::Binary(_))) => {
            ctx.close_frame = Some(CloseFrame {
                code: close_code::UNSUPPORTED,
                reason: "binary messages not supported".into(),
            });
            Ok(LoopControl::Disconnect)
        }
        Some(Ok(Message::Ping(_) | Message::Pong(_))) => Ok(LoopControl::Continue),
        Some(Ok(Message::Close(_))) => Ok(LoopControl::Disconnect),
        Some(Err(e)) => {
            warn!(error = %e, "websocket recv error");
            Ok(LoopControl::Disconnect)
        }
        None => {
            info!("websocket closed");
            Ok(LoopControl::Disconnect)
        }
    }
}

enum Delivery {
    Queued,
    Dropped(RaceCommand),
    Closed,
}

// Live input must not stall the socket, so a full queue drops presses.
// Releases always get through: a lost release leaves the racer's latch disarmed.
async fn deliver_command(command_tx: &mpsc::Sender<RaceCommand>, command: RaceCommand) -> Delivery {
    match command_tx.try_send(command) {
        Ok(()) => Delivery::Queued,
        Err(mpsc::error::TrySendError::Full(command @ RaceCommand::Release { .. })) => {
            match command_tx.send(command).await {
                Ok(()) => Delivery::Queued,
                Err(_) => Delivery::Closed,
            }
        }
        Err(mpsc::error::TrySendError::Full(command)) => Delivery::Dropped(command),
        Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
    }
}

async fn send_command(ctx: &mut ConnCtx, command: RaceCommand) -> Result<LoopControl, NetError> {
    match deliver_command(&ctx.command_tx, command).await {
        Delivery::Queued => Ok(LoopControl::Continue),
        Delivery::Dropped(command) => {
            if should_log(&mut ctx.last_command_full_log) {
                warn!(?command, "command channel full; dropping command");
            }
            Ok(LoopControl::Continue)
        }
        Delivery::Closed => Err(NetError::RaceClosed),
    }
}

async fn forward_bytes(bytes: Utf8Bytes, socket: &mut WebSocket, ctx: &mut ConnCtx) -> LoopControl {
    let len = bytes.len();
    match socket.send(Message::Text(bytes)).await {
        Ok(()) => {
            ctx.msgs_out += 1;
            ctx.bytes_out += len as u64;
            LoopControl::Continue
        }
        Err(err) => {
            warn!(error = ?err, "failed to send feed message");
            LoopControl::Disconnect
        }
    }
}
