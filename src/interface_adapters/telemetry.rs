// Telemetry link: mirrors race state to the display device over a
// line-oriented transport and watches its replies.

use crate::domain::RaceSnapshot;
use crate::interface_adapters::protocol::{ConfigFrame, DeviceReply, StateFrame, TelemetryMessage};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::{Mutex, Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

// Queued diagnostic commands per link.
const COMMAND_QUEUE_CAPACITY: usize = 32;
// Longest inbound line kept; anything longer is discarded unread.
const MAX_DEVICE_LINE: usize = 4096;

/// Link state shown to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum LinkStatus {
    Disconnected,
    Connecting,
    Connected,
    // Device announced itself with `{"arduino":"ready"}`.
    Ready,
    Error(String),
}

impl LinkStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkStatus::Connected | LinkStatus::Ready)
    }
}

#[derive(Debug)]
pub enum TelemetryError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Serial(String),
    NotConnected,
    AlreadyConnected,
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::Io(e) => write!(f, "io error: {e}"),
            TelemetryError::Serialization(e) => write!(f, "serialization error: {e}"),
            TelemetryError::Serial(e) => write!(f, "serial port error: {e}"),
            TelemetryError::NotConnected => write!(f, "telemetry link is not connected"),
            TelemetryError::AlreadyConnected => write!(f, "telemetry link is already connected"),
        }
    }
}

impl From<std::io::Error> for TelemetryError {
    fn from(e: std::io::Error) -> Self {
        TelemetryError::Io(e)
    }
}

impl From<serde_json::Error> for TelemetryError {
    fn from(e: serde_json::Error) -> Self {
        TelemetryError::Serialization(e)
    }
}

pub type DeviceReader = Box<dyn AsyncRead + Send + Unpin>;
pub type DeviceWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An opened device transport, split into halves.
pub struct DeviceIo {
    /// Human-readable transport name (port path).
    pub label: String,
    pub reader: DeviceReader,
    pub writer: DeviceWriter,
}

// Port for opening the device transport.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn open(&self) -> Result<DeviceIo, TelemetryError>;
}

/// Channels one link task works with.
pub struct LinkChannels {
    pub snapshot_rx: watch::Receiver<RaceSnapshot>,
    pub command_rx: mpsc::Receiver<TelemetryMessage>,
    pub status_tx: watch::Sender<LinkStatus>,
    pub shutdown: Arc<Notify>,
}

async fn write_message(
    writer: &mut DeviceWriter,
    message: &TelemetryMessage,
) -> Result<(), TelemetryError> {
    let line = message.to_line()?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Drives one connection: config once, state every `state_interval`,
/// queued commands as they arrive, and a continuous read pump.
///
/// Returns `Ok(())` on shutdown; a read or write failure ends the link with an error.
pub async fn run_link(
    io: DeviceIo,
    channels: LinkChannels,
    state_interval: Duration,
) -> Result<(), TelemetryError> {
    let DeviceIo {
        label,
        reader,
        mut writer,
    } = io;
    let LinkChannels {
        snapshot_rx,
        mut command_rx,
        status_tx,
        shutdown,
    } = channels;
    let mut reader = BufReader::new(reader);

    let config = ConfigFrame::from(&snapshot_rx.borrow().config);
    write_message(&mut writer, &TelemetryMessage::Config(config)).await?;
    debug!(port = %label, "config sent");

    let mut interval = tokio::time::interval(state_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut line = Vec::new();

    let result = loop {
        tokio::select! {
            _ = shutdown.notified() => {
                break Ok(());
            }
            _ = interval.tick() => {
                let frame = StateFrame::from(&*snapshot_rx.borrow());
                if let Err(e) = write_message(&mut writer, &TelemetryMessage::State(frame)).await {
                    break Err(e);
                }
            }
            Some(message) = command_rx.recv() => {
                if let Err(e) = write_message(&mut writer, &message).await {
                    break Err(e);
                }
                debug!(port = %label, ?message, "command sent");
            }
            read = read_device_line(&mut reader, &mut line) => {
                match read {
                    Ok(0) => {
                        break Err(TelemetryError::Io(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "device closed the link",
                        )));
                    }
                    Ok(_) if !line.ends_with(b"\n") => {
                        if line.len() >= MAX_DEVICE_LINE {
                            warn!(port = %label, bytes = line.len(), "device line too long; discarded");
                            line.clear();
                        }
                    }
                    Ok(_) => {
                        let text = String::from_utf8_lossy(&line);
                        let text = text.trim();
                        if !text.is_empty() {
                            debug!(port = %label, line = %text, "device line");
                            if DeviceReply::parse(text) == DeviceReply::Ready {
                                info!(port = %label, "device ready");
                                status_tx.send_replace(LinkStatus::Ready);
                            }
                        }
                        line.clear();
                    }
                    Err(e) => break Err(e.into()),
                }
            }
        }
    };

    // Best effort; the transport may already be gone.
    let _ = writer.shutdown().await;
    result
}

// Reads up to the next newline without letting `line` grow past the cap.
async fn read_device_line<R>(reader: &mut R, line: &mut Vec<u8>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let budget = MAX_DEVICE_LINE.saturating_sub(line.len()) as u64;
    (&mut *reader).take(budget).read_until(b'\n', line).await
}

struct ActiveLink {
    label: String,
    command_tx: mpsc::Sender<TelemetryMessage>,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

/// Owns at most one telemetry link at a time.
pub struct TelemetryService {
    connector: Arc<dyn DeviceConnector>,
    snapshot_rx: watch::Receiver<RaceSnapshot>,
    status_tx: watch::Sender<LinkStatus>,
    state_interval: Duration,
    active: Mutex<Option<ActiveLink>>,
}

impl TelemetryService {
    pub fn new(
        connector: Arc<dyn DeviceConnector>,
        snapshot_rx: watch::Receiver<RaceSnapshot>,
        state_interval: Duration,
    ) -> Self {
        let (status_tx, _status_rx) = watch::channel(LinkStatus::Disconnected);
        Self {
            connector,
            snapshot_rx,
            status_tx,
            state_interval,
            active: Mutex::new(None),
        }
    }

    pub fn status(&self) -> LinkStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<LinkStatus> {
        self.status_tx.subscribe()
    }

    /// Port label of the live link, if any.
    pub async fn port(&self) -> Option<String> {
        let active = self.active.lock().await;
        active
            .as_ref()
            .filter(|link| !link.task.is_finished())
            .map(|link| link.label.clone())
    }

    /// Opens the transport and spawns the link task. Returns the port label.
    pub async fn connect(&self) -> Result<String, TelemetryError> {
        let mut active = self.active.lock().await;
        if active.as_ref().is_some_and(|link| !link.task.is_finished()) {
            return Err(TelemetryError::AlreadyConnected);
        }

        self.status_tx.send_replace(LinkStatus::Connecting);
        let io = match self.connector.open().await {
            Ok(io) => io,
            Err(e) => {
                warn!(error = %e, "telemetry connect failed");
                self.status_tx.send_replace(LinkStatus::Error(e.to_string()));
                return Err(e);
            }
        };

        let label = io.label.clone();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let shutdown = Arc::new(Notify::new());
        let channels = LinkChannels {
            snapshot_rx: self.snapshot_rx.clone(),
            command_rx,
            status_tx: self.status_tx.clone(),
            shutdown: shutdown.clone(),
        };

        self.status_tx.send_replace(LinkStatus::Connected);
        info!(port = %label, "telemetry connected");

        let status_tx = self.status_tx.clone();
        let state_interval = self.state_interval;
        let task_label = label.clone();
        let task = tokio::spawn(async move {
            match run_link(io, channels, state_interval).await {
                Ok(()) => {
                    info!(port = %task_label, "telemetry disconnected");
                    status_tx.send_replace(LinkStatus::Disconnected);
                }
                Err(e) => {
                    warn!(port = %task_label, error = %e, "telemetry link failed");
                    status_tx.send_replace(LinkStatus::Error(e.to_string()));
                }
            }
        });

        *active = Some(ActiveLink {
            label: label.clone(),
            command_tx,
            shutdown,
            task,
        });
        Ok(label)
    }

    /// Stops the link task and waits for it to release the transport.
    pub async fn disconnect(&self) -> Result<(), TelemetryError> {
        let Some(link) = self.active.lock().await.take() else {
            return Err(TelemetryError::NotConnected);
        };
        let was_live = !link.task.is_finished();
        link.shutdown.notify_one();
        if let Err(e) = link.task.await {
            warn!(error = %e, "telemetry task ended abnormally");
        }
        self.status_tx.send_replace(LinkStatus::Disconnected);
        if was_live {
            Ok(())
        } else {
            Err(TelemetryError::NotConnected)
        }
    }

    /// Queues a diagnostic message on the live link.
    pub async fn send(&self, message: TelemetryMessage) -> Result<(), TelemetryError> {
        let active = self.active.lock().await;
        let link = active
            .as_ref()
            .filter(|link| !link.task.is_finished())
            .ok_or(TelemetryError::NotConnected)?;
        link.command_tx
            .send(message)
            .await
            .map_err(|_| TelemetryError::NotConnected)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tokio::io::DuplexStream;

    // Hands out in-memory transports; the test keeps the device end.
    pub(crate) struct DuplexConnector {
        devices: std::sync::Mutex<Vec<DuplexStream>>,
    }

    impl DuplexConnector {
        pub(crate) fn new() -> Self {
            Self {
                devices: std::sync::Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn take_device(&self) -> Option<DuplexStream> {
            self.devices.lock().expect("devices mutex poisoned").pop()
        }
    }

    #[async_trait]
    impl DeviceConnector for DuplexConnector {
        async fn open(&self) -> Result<DeviceIo, TelemetryError> {
            let (host, device) = tokio::io::duplex(4096);
            self.devices
                .lock()
                .expect("devices mutex poisoned")
                .push(device);
            let (reader, writer) = tokio::io::split(host);
            Ok(DeviceIo {
                label: "duplex".to_string(),
                reader: Box::new(reader),
                writer: Box::new(writer),
            })
        }
    }

    pub(crate) struct FailingConnector;

    #[async_trait]
    impl DeviceConnector for FailingConnector {
        async fn open(&self) -> Result<DeviceIo, TelemetryError> {
            Err(TelemetryError::Serial("no such port".to_string()))
        }
    }
}
