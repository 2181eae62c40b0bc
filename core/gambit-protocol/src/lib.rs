//! Wire types for the Gambit mission-control backend.
//!
//! This crate is shared by the command client, the realtime client and the
//! console so the payload shapes cannot drift between them. The backend
//! remains the authority on what it sends; decoding here is deliberately
//! tolerant of extra fields and unknown enum values.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod models;

pub use models::*;

/// Realtime endpoint path, relative to the WebSocket base URL.
pub const REALTIME_PATH: &str = "/ws/indicators";
/// Query parameter carrying the bearer token on the realtime handshake.
pub const TOKEN_QUERY_PARAM: &str = "token";
/// HLS playlist for the live camera feed, relative to the API base URL.
pub const VIDEO_STREAM_PATH: &str = "/video/live/index.m3u8";

pub const NETWORK_ERROR_CODE: &str = "NETWORK_ERROR";
pub const NETWORK_ERROR_DETAIL: &str = "Network error";

/// Event names carried in the `event` field of a realtime envelope.
pub mod event_names {
    pub const INDICATORS: &str = "indicators";
    pub const RECORD_STATUS: &str = "record_status";
    pub const MISSION_STATUS: &str = "mission_status";
    pub const RECORD_DONE: &str = "record_done";
    /// Synthetic; emitted by the client on connection changes, never sent by the backend.
    pub const CONNECTION: &str = "connection";
}

/// Error body returned by the backend on non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(code: &str, detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            code: code.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Shape used when an error body cannot be parsed or never arrived.
    pub fn network_error() -> Self {
        Self::new(NETWORK_ERROR_CODE, NETWORK_ERROR_DETAIL)
    }
}

/// Raw realtime frame as it arrives on the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            timestamp: Some(Utc::now().to_rfc3339()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is not a valid envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("payload for '{event}' does not match its schema: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A realtime event decoded at the boundary.
///
/// Known event names get typed payloads; everything else lands in
/// [`RealtimeEvent::Other`] so newer backend events still reach observers
/// registered under their literal name.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    Indicators(SystemIndicators),
    RecordStatus(RecordStatus),
    MissionStatus(Mission),
    RecordDone(RecordDone),
    Connection(ConnectionChange),
    Other { event: String, data: Value },
}

impl RealtimeEvent {
    pub fn name(&self) -> &str {
        match self {
            RealtimeEvent::Indicators(_) => event_names::INDICATORS,
            RealtimeEvent::RecordStatus(_) => event_names::RECORD_STATUS,
            RealtimeEvent::MissionStatus(_) => event_names::MISSION_STATUS,
            RealtimeEvent::RecordDone(_) => event_names::RECORD_DONE,
            RealtimeEvent::Connection(_) => event_names::CONNECTION,
            RealtimeEvent::Other { event, .. } => event,
        }
    }

    pub fn connection(connected: bool) -> Self {
        RealtimeEvent::Connection(ConnectionChange { connected })
    }

    /// Decodes an envelope's payload according to its event name.
    ///
    /// A backend frame named `connection` is passed through as `Other`: the
    /// typed connection event is reserved for the client's own transitions.
    pub fn from_envelope(envelope: Envelope) -> Result<Self, DecodeError> {
        let Envelope { event, data, .. } = envelope;
        match event.as_str() {
            event_names::INDICATORS => payload(&event, data).map(RealtimeEvent::Indicators),
            event_names::RECORD_STATUS => payload(&event, data).map(RealtimeEvent::RecordStatus),
            event_names::MISSION_STATUS => {
                payload(&event, data).map(RealtimeEvent::MissionStatus)
            }
            event_names::RECORD_DONE => payload(&event, data).map(RealtimeEvent::RecordDone),
            _ => Ok(RealtimeEvent::Other { event, data }),
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(event: &str, data: Value) -> Result<T, DecodeError> {
    serde_json::from_value(data).map_err(|source| DecodeError::Payload {
        event: event.to_string(),
        source,
    })
}

/// Parses one inbound text frame into a typed event.
pub fn parse_frame(text: &str) -> Result<RealtimeEvent, DecodeError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(DecodeError::Malformed)?;
    RealtimeEvent::from_envelope(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_mission_status_with_sparse_payload() {
        let frame = r#"{"event":"mission_status","data":{"status":"RUNNING","id":"m1"},"timestamp":"2026-01-30T12:00:00Z"}"#;
        let event = parse_frame(frame).unwrap();
        match event {
            RealtimeEvent::MissionStatus(mission) => {
                assert_eq!(mission.id, "m1");
                assert_eq!(mission.status, MissionState::Running);
                assert!(mission.created_at.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn parses_indicators() {
        let frame = json!({
            "event": "indicators",
            "data": {
                "cpu": 41.5, "temp": 52.0, "disk": 12.0, "mem": 63.0,
                "battery": 87.0, "sat": 11, "fps": 29.97, "connected": true
            },
            "timestamp": "2026-01-30T12:00:00Z"
        })
        .to_string();

        let event = parse_frame(&frame).unwrap();
        assert_eq!(event.name(), event_names::INDICATORS);
        let RealtimeEvent::Indicators(indicators) = event else {
            panic!("expected indicators");
        };
        assert_eq!(indicators.sat, 11.0);
        assert!(indicators.connected);
    }

    #[test]
    fn unknown_event_is_passed_through() {
        let frame = r#"{"event":"calibration_step","data":{"step":3}}"#;
        let event = parse_frame(frame).unwrap();
        assert_eq!(event.name(), "calibration_step");
        assert_eq!(
            event,
            RealtimeEvent::Other {
                event: "calibration_step".to_string(),
                data: json!({"step": 3}),
            }
        );
    }

    #[test]
    fn backend_connection_event_is_not_typed() {
        let frame = r#"{"event":"connection","data":{"connected":true}}"#;
        let event = parse_frame(frame).unwrap();
        assert!(matches!(event, RealtimeEvent::Other { .. }));
        assert_eq!(event.name(), event_names::CONNECTION);
    }

    #[test]
    fn rejects_non_json_frame() {
        assert!(matches!(
            parse_frame("not json"),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_envelope_without_event() {
        assert!(matches!(
            parse_frame(r#"{"data":{}}"#),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_known_event_with_wrong_payload() {
        let frame = r#"{"event":"record_done","data":{"path":42}}"#;
        match parse_frame(frame) {
            Err(DecodeError::Payload { event, .. }) => assert_eq!(event, "record_done"),
            other => panic!("expected payload error, got {:?}", other),
        }
    }

    #[test]
    fn error_response_tolerates_missing_fields() {
        let error: ErrorResponse = serde_json::from_str(r#"{"detail":"Invalid credentials"}"#).unwrap();
        assert_eq!(error.detail, "Invalid credentials");
        assert!(error.code.is_empty());
    }

    #[test]
    fn network_error_shape() {
        let error = ErrorResponse::network_error();
        assert_eq!(error.code, NETWORK_ERROR_CODE);
        assert_eq!(error.detail, NETWORK_ERROR_DETAIL);
        assert!(chrono::DateTime::parse_from_rfc3339(&error.timestamp).is_ok());
    }
}
