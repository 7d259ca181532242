use serde::{Deserialize, Serialize};

use crate::source::SourceEvent;
use crate::types::RawReading;

/// Messages arriving on the events topic, discriminated by `type`.
/// Unknown types and malformed payloads are parse errors; the reader drops
/// them (counted), never retries.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteMessage {
    Connected {
        #[serde(default)]
        message: Option<String>,
    },
    Rep {
        amplitude: f64,
        #[serde(default)]
        rep_count: Option<u32>,
    },
    Status {
        sample_idx: u64,
        #[serde(default)]
        rep_count: Option<u32>,
    },
    ResetAck,
    ExerciseDetected {
        exercise: String,
        #[serde(default)]
        rep_count: u32,
    },
    AutoDetectStarted {
        #[serde(default)]
        samples_needed: Option<u32>,
    },
}

impl From<RemoteMessage> for SourceEvent {
    fn from(msg: RemoteMessage) -> Self {
        match msg {
            RemoteMessage::Connected { .. } => SourceEvent::Connected,
            RemoteMessage::Rep { amplitude, .. } => SourceEvent::Rep { amplitude },
            RemoteMessage::Status { sample_idx, .. } => SourceEvent::Heartbeat { sample_idx },
            RemoteMessage::ResetAck => SourceEvent::ResetAck,
            RemoteMessage::ExerciseDetected { exercise, rep_count } => {
                SourceEvent::ExerciseDetected { exercise, rep_count }
            }
            RemoteMessage::AutoDetectStarted { .. } => SourceEvent::AutoDetectStarted,
        }
    }
}

/// Outbound control message, `{"action": "..."}`.
#[derive(Serialize, Debug)]
pub struct ControlMessage {
    pub action: &'static str,
}

pub const ACTION_START_AUTO_DETECT: &str = "start_auto_detect";
pub const ACTION_RESET: &str = "reset";

pub fn parse_event(payload: &[u8]) -> Result<RemoteMessage, String> {
    let payload_str =
        std::str::from_utf8(payload).map_err(|e| format!("invalid UTF-8: {}", e))?;
    serde_json::from_str::<RemoteMessage>(payload_str)
        .map_err(|e| format!("JSON parsing error: {}", e))
}

pub fn parse_sample(payload: &[u8]) -> Result<RawReading, String> {
    let payload_str =
        std::str::from_utf8(payload).map_err(|e| format!("invalid UTF-8: {}", e))?;
    serde_json::from_str::<RawReading>(payload_str)
        .map_err(|e| format!("JSON parsing error: {}", e))
}

pub fn control_payload(action: &'static str) -> String {
    serde_json::to_string(&ControlMessage { action }).expect("control message serializes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_event_type() {
        let cases: [(&str, SourceEvent); 6] = [
            (
                r#"{"type":"connected","message":"Pipeline reset for new session"}"#,
                SourceEvent::Connected,
            ),
            (
                r#"{"type":"rep","rep_count":3,"amplitude":24.51}"#,
                SourceEvent::Rep { amplitude: 24.51 },
            ),
            (
                r#"{"type":"status","sample_idx":500,"rep_count":3}"#,
                SourceEvent::Heartbeat { sample_idx: 500 },
            ),
            (r#"{"type":"reset_ack"}"#, SourceEvent::ResetAck),
            (
                r#"{"type":"exercise_detected","exercise":"bicep_curl","rep_count":5}"#,
                SourceEvent::ExerciseDetected {
                    exercise: "bicep_curl".to_string(),
                    rep_count: 5,
                },
            ),
            (
                r#"{"type":"auto_detect_started","samples_needed":200}"#,
                SourceEvent::AutoDetectStarted,
            ),
        ];
        for (payload, expected) in cases {
            let event: SourceEvent = parse_event(payload.as_bytes()).unwrap().into();
            assert_eq!(event, expected, "payload {}", payload);
        }
    }

    #[test]
    fn rejects_unknown_and_malformed_messages() {
        assert!(parse_event(br#"{"type":"speed","speed_deviation":0.1}"#).is_err());
        assert!(parse_event(b"not json at all").is_err());
        assert!(parse_event(&[0xff, 0xfe]).is_err());
        assert!(parse_event(br#"{"type":"rep"}"#).is_err(), "rep without amplitude");
    }

    #[test]
    fn parses_samples_with_and_without_timestamp() {
        let s = parse_sample(br#"{"x":0.1,"y":-0.2,"z":9.8,"timestamp":1700000000000}"#).unwrap();
        assert_eq!(s.timestamp, Some(1_700_000_000_000));
        let s = parse_sample(br#"{"x":1,"y":2,"z":3}"#).unwrap();
        assert_eq!(s.timestamp, None);
        assert_eq!(s.x, 1.0);
    }

    #[test]
    fn control_messages_carry_the_action() {
        assert_eq!(
            control_payload(ACTION_START_AUTO_DETECT),
            r#"{"action":"start_auto_detect"}"#
        );
        assert_eq!(control_payload(ACTION_RESET), r#"{"action":"reset"}"#);
    }
}
