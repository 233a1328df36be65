// Serial transport for the telemetry link.

use crate::interface_adapters::telemetry::{DeviceConnector, DeviceIo, TelemetryError};
use async_trait::async_trait;
use std::time::Duration;
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::debug;

impl From<tokio_serial::Error> for TelemetryError {
    fn from(e: tokio_serial::Error) -> Self {
        TelemetryError::Serial(e.to_string())
    }
}

/// The DTR/RTS pair that resets the microcontroller.
pub trait ResetLines {
    fn set_reset_lines(&mut self, asserted: bool) -> Result<(), TelemetryError>;
}

impl ResetLines for SerialStream {
    fn set_reset_lines(&mut self, asserted: bool) -> Result<(), TelemetryError> {
        self.write_data_terminal_ready(asserted)?;
        self.write_request_to_send(asserted)?;
        Ok(())
    }
}

/// Deasserts both reset lines, waits `hold`, then asserts them again.
pub async fn pulse_reset<L: ResetLines + ?Sized>(
    lines: &mut L,
    hold: Duration,
) -> Result<(), TelemetryError> {
    lines.set_reset_lines(false)?;
    tokio::time::sleep(hold).await;
    lines.set_reset_lines(true)
}

/// Opens a serial port and resets the device behind it.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    path: String,
    baud_rate: u32,
    reset_pulse: Duration,
}

impl SerialConnector {
    pub fn new(path: impl Into<String>, baud_rate: u32, reset_pulse: Duration) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            reset_pulse,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl DeviceConnector for SerialConnector {
    async fn open(&self) -> Result<DeviceIo, TelemetryError> {
        let mut port = tokio_serial::new(&self.path, self.baud_rate).open_native_async()?;
        debug!(port = %self.path, baud = self.baud_rate, "serial port opened");

        pulse_reset(&mut port, self.reset_pulse).await?;

        let (reader, writer) = tokio::io::split(port);
        Ok(DeviceIo {
            label: self.path.clone(),
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }
}
