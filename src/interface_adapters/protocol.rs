// Wire protocol DTOs: the newline-delimited JSON spoken to the display device,
// and the JSON payloads of the control API and WebSocket feed.

use crate::domain::config::ConfigPatch;
use crate::domain::{
    Player, RacePhase, RaceSnapshot, RacerSnapshot, TrackConfig, format_lap_time,
};
use crate::use_cases::{RaceCommand, RaceEvent};
use serde::{Deserialize, Serialize};

/// One line on the telemetry link.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryMessage {
    Config(ConfigFrame),
    State(StateFrame),
    Ping,
    Effect { name: String },
    // Bare text command, sent without JSON framing.
    RawCommand(String),
}

// JSON-framed variants, tagged by `type` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum JsonFrame {
    Config(ConfigFrame),
    State(StateFrame),
    Ping,
    Effect { name: String },
}

impl TelemetryMessage {
    /// Encodes the message as a single line, including the trailing `\n`.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let frame = match self {
            TelemetryMessage::Config(config) => JsonFrame::Config(*config),
            TelemetryMessage::State(state) => JsonFrame::State(*state),
            TelemetryMessage::Ping => JsonFrame::Ping,
            TelemetryMessage::Effect { name } => JsonFrame::Effect { name: name.clone() },
            TelemetryMessage::RawCommand(command) => return Ok(format!("{command}\n")),
        };
        let mut line = serde_json::to_string(&frame)?;
        line.push('\n');
        Ok(line)
    }

    /// Decodes one outbound line; anything that is not a known JSON frame is a raw command.
    pub fn from_line(line: &str) -> Self {
        let line = line.trim();
        match serde_json::from_str::<JsonFrame>(line) {
            Ok(JsonFrame::Config(config)) => TelemetryMessage::Config(config),
            Ok(JsonFrame::State(state)) => TelemetryMessage::State(state),
            Ok(JsonFrame::Ping) => TelemetryMessage::Ping,
            Ok(JsonFrame::Effect { name }) => TelemetryMessage::Effect { name },
            Err(_) => TelemetryMessage::RawCommand(line.to_string()),
        }
    }
}

/// Track configuration as the device expects it, sent once per connection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFrame {
    pub max_led: usize,
    pub loop_max: u32,
    pub acel: f64,
    pub kf: f64,
    pub kg: f64,
    pub tail: u32,
}

impl From<&TrackConfig> for ConfigFrame {
    fn from(config: &TrackConfig) -> Self {
        Self {
            max_led: config.length,
            loop_max: config.laps_to_win,
            acel: config.accel_impulse,
            kf: config.friction,
            kg: config.gravity,
            tail: config.trail_length,
        }
    }
}

/// Race state mirrored to the device on a fixed cadence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateFrame {
    pub dist1: f64,
    pub dist2: f64,
    pub speed1: f64,
    pub speed2: f64,
    pub loop1: u32,
    pub loop2: u32,
    /// 0 none, 1 or 2.
    pub leader: u8,
    /// 1 while the race runs, else 0.
    pub running: u8,
}

impl From<&RaceSnapshot> for StateFrame {
    fn from(snapshot: &RaceSnapshot) -> Self {
        Self {
            dist1: snapshot.racer1.distance,
            dist2: snapshot.racer2.distance,
            speed1: snapshot.racer1.speed,
            speed2: snapshot.racer2.speed,
            loop1: snapshot.racer1.laps,
            loop2: snapshot.racer2.laps,
            leader: snapshot.leader_code(),
            running: u8::from(snapshot.phase == RacePhase::Running),
        }
    }
}

/// Connection-diagnostic commands accepted by the test endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestCommand {
    Ping,
    Flash,
    Jogador1,
    Jogador2,
    Simular,
    Demo,
    Limpar,
}

impl TestCommand {
    pub fn to_message(self) -> TelemetryMessage {
        match self {
            TestCommand::Ping => TelemetryMessage::Ping,
            TestCommand::Flash => TelemetryMessage::Effect {
                name: "flash".to_string(),
            },
            TestCommand::Jogador1 => TelemetryMessage::RawCommand("jogador1".to_string()),
            TestCommand::Jogador2 => TelemetryMessage::RawCommand("jogador2".to_string()),
            TestCommand::Simular => TelemetryMessage::RawCommand("simular".to_string()),
            TestCommand::Demo => TelemetryMessage::RawCommand("demo".to_string()),
            TestCommand::Limpar => TelemetryMessage::RawCommand("limpar".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestCommandRequest {
    pub command: TestCommand,
}

/// Interpretation of one inbound device line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceReply {
    Ready,
    Diagnostic(String),
}

#[derive(Deserialize)]
struct ReadyProbe {
    arduino: Option<String>,
}

impl DeviceReply {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match serde_json::from_str::<ReadyProbe>(line) {
            Ok(ReadyProbe {
                arduino: Some(status),
            }) if status == "ready" => DeviceReply::Ready,
            _ => DeviceReply::Diagnostic(line.to_string()),
        }
    }
}

/// Commands accepted by `POST /api/command` and inbound WebSocket text frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum ClientCommand {
    Start,
    Reset,
    Press { player: Player },
    Release { player: Player },
}

impl From<ClientCommand> for RaceCommand {
    fn from(command: ClientCommand) -> Self {
        match command {
            ClientCommand::Start => RaceCommand::Start,
            ClientCommand::Reset => RaceCommand::Reset,
            ClientCommand::Press { player } => RaceCommand::Press { player },
            ClientCommand::Release { player } => RaceCommand::Release { player },
        }
    }
}

/// Partial configuration update using the device field names.
///
/// Fields arrive as loose numbers (form inputs); absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdateDto {
    pub max_led: Option<f64>,
    pub loop_max: Option<f64>,
    pub acel: Option<f64>,
    pub kf: Option<f64>,
    pub kg: Option<f64>,
    pub tail: Option<f64>,
    pub ramp_height: Option<f64>,
}

impl From<ConfigUpdateDto> for ConfigPatch {
    fn from(update: ConfigUpdateDto) -> Self {
        ConfigPatch {
            length: update.max_led,
            laps_to_win: update.loop_max,
            trail_length: update.tail,
            accel_impulse: update.acel,
            friction: update.kf,
            gravity: update.kg,
            ramp_height: update.ramp_height,
        }
    }
}

/// Per-racer timing rendered for display.
#[derive(Debug, Clone, Serialize)]
pub struct RacerTimingDto {
    pub speed: String,
    pub average_speed: String,
    pub current_lap: String,
    pub last_lap: String,
    pub best_lap: String,
    pub laps: Vec<String>,
}

impl From<&RacerSnapshot> for RacerTimingDto {
    fn from(racer: &RacerSnapshot) -> Self {
        Self {
            speed: format!("{:.2}", racer.speed),
            average_speed: format!("{:.2}", racer.average_speed),
            current_lap: format_lap_time(racer.current_lap_ms),
            last_lap: format_lap_time(racer.last_lap_ms),
            best_lap: format_lap_time(racer.best_lap_ms),
            laps: racer
                .lap_times_ms
                .iter()
                .map(|ms| format_lap_time(Some(*ms)))
                .collect(),
        }
    }
}

/// Race snapshot plus display-ready timing strings.
#[derive(Debug, Clone, Serialize)]
pub struct RaceSnapshotDto {
    #[serde(flatten)]
    pub snapshot: RaceSnapshot,
    pub timing1: RacerTimingDto,
    pub timing2: RacerTimingDto,
}

impl From<RaceSnapshot> for RaceSnapshotDto {
    fn from(snapshot: RaceSnapshot) -> Self {
        Self {
            timing1: RacerTimingDto::from(&snapshot.racer1),
            timing2: RacerTimingDto::from(&snapshot.racer2),
            snapshot,
        }
    }
}

/// Messages the server pushes to WebSocket observers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    Snapshot(RaceSnapshotDto),
    Event(RaceEvent),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn as_json(message: &TelemetryMessage) -> Value {
        let line = message.to_line().expect("encode");
        assert!(line.ends_with('\n'));
        serde_json::from_str(line.trim_end()).expect("line is json")
    }

    #[test]
    fn config_frame_uses_device_field_names() {
        let message = TelemetryMessage::Config(ConfigFrame::from(&TrackConfig::default()));
        assert_eq!(
            as_json(&message),
            json!({
                "type": "config",
                "maxLed": 100,
                "loopMax": 5,
                "acel": 0.2,
                "kf": 0.015,
                "kg": 0.003,
                "tail": 3
            })
        );
    }

    #[test]
    fn state_frame_reports_running_flag_and_leader_code() {
        let mut snapshot = RaceSnapshot::default();
        snapshot.phase = RacePhase::Running;
        snapshot.leader = Some(Player::Two);
        snapshot.racer1.distance = 12.5;
        snapshot.racer2.distance = 14.0;
        snapshot.racer2.speed = 0.75;
        snapshot.racer2.laps = 1;

        let value = as_json(&TelemetryMessage::State(StateFrame::from(&snapshot)));
        assert_eq!(
            value,
            json!({
                "type": "state",
                "dist1": 12.5,
                "dist2": 14.0,
                "speed1": 0.0,
                "speed2": 0.75,
                "loop1": 0,
                "loop2": 1,
                "leader": 2,
                "running": 1
            })
        );

        snapshot.phase = RacePhase::Countdown;
        assert_eq!(StateFrame::from(&snapshot).running, 0);
    }

    #[test]
    fn diagnostic_commands_map_to_wire_lines() {
        assert_eq!(TestCommand::Ping.to_message().to_line().unwrap(), "{\"type\":\"ping\"}\n");
        assert_eq!(
            TestCommand::Flash.to_message().to_line().unwrap(),
            "{\"type\":\"effect\",\"name\":\"flash\"}\n"
        );
        assert_eq!(TestCommand::Limpar.to_message().to_line().unwrap(), "limpar\n");

        let request: TestCommandRequest =
            serde_json::from_str(r#"{"command":"jogador2"}"#).expect("parse");
        assert_eq!(request.command, TestCommand::Jogador2);
    }

    #[test]
    fn outbound_lines_decode_back_to_messages() {
        assert_eq!(TelemetryMessage::from_line("{\"type\":\"ping\"}\n"), TelemetryMessage::Ping);
        assert_eq!(
            TelemetryMessage::from_line("simular\n"),
            TelemetryMessage::RawCommand("simular".to_string())
        );
    }

    #[test]
    fn only_arduino_ready_counts_as_device_ready() {
        assert_eq!(DeviceReply::parse("{\"arduino\":\"ready\"}\r\n"), DeviceReply::Ready);
        assert_eq!(
            DeviceReply::parse("{\"arduino\":\"booting\"}"),
            DeviceReply::Diagnostic("{\"arduino\":\"booting\"}".to_string())
        );
        assert_eq!(
            DeviceReply::parse("p1T42"),
            DeviceReply::Diagnostic("p1T42".to_string())
        );
    }

    #[test]
    fn client_commands_parse_player_numbers() {
        let press: ClientCommand =
            serde_json::from_str(r#"{"command":"press","player":2}"#).expect("parse");
        assert_eq!(press, ClientCommand::Press { player: Player::Two });

        let start: ClientCommand = serde_json::from_str(r#"{"command":"start"}"#).expect("parse");
        assert!(matches!(RaceCommand::from(start), RaceCommand::Start));

        assert!(serde_json::from_str::<ClientCommand>(r#"{"command":"press","player":3}"#).is_err());
    }

    #[test]
    fn config_update_clamps_and_keeps_missing_fields() {
        let update: ConfigUpdateDto =
            serde_json::from_str(r#"{"maxLed": 4000, "loopMax": 0, "acel": 7.5, "tail": 3.6}"#)
                .expect("parse");
        let config = ConfigPatch::from(update).apply_to(TrackConfig::default());

        assert_eq!(config.length, 1000);
        assert_eq!(config.laps_to_win, 1);
        assert_eq!(config.accel_impulse, 5.0);
        assert_eq!(config.trail_length, 4);
        assert_eq!(config.friction, 0.015);
        assert_eq!(config.gravity, 0.003);
    }

    #[test]
    fn snapshot_message_carries_formatted_timing() {
        let mut snapshot = RaceSnapshot::default();
        snapshot.racer1.best_lap_ms = Some(65_432.0);
        snapshot.racer1.lap_times_ms = vec![65_432.0];

        let value = serde_json::to_value(ServerMessage::Snapshot(snapshot.into())).expect("encode");
        assert_eq!(value["type"], "Snapshot");
        assert_eq!(value["data"]["phase"], "idle");
        assert_eq!(value["data"]["timing1"]["best_lap"], "1:05.432");
        assert_eq!(value["data"]["timing1"]["laps"], json!(["1:05.432"]));
        assert_eq!(value["data"]["timing2"]["last_lap"], "—");
    }
}
