//! Payloads carried in the `data` field of client requests and the
//! server's direct replies. Room notifications have their own payloads
//! in `sanguo-room`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use sanguo_protocol::{Envelope, ProtocolError};
use sanguo_room::{QueueStatus, RoomInfo, RoomPlayer};

/// `auth`
#[derive(Debug, Deserialize)]
pub(crate) struct AuthRequest {
    pub token: String,
}

/// `set_ready`
#[derive(Debug, Deserialize)]
pub(crate) struct SetReadyRequest {
    #[serde(default = "ready_by_default")]
    pub ready: bool,
}

impl Default for SetReadyRequest {
    fn default() -> Self {
        Self { ready: true }
    }
}

fn ready_by_default() -> bool {
    true
}

/// `select_generals`
#[derive(Debug, Deserialize)]
pub(crate) struct SelectGeneralsRequest {
    pub generals: Vec<String>,
}

/// `room_joined`
#[derive(Debug, Serialize)]
pub(crate) struct RoomJoined {
    pub room: RoomInfo,
    pub players: Vec<RoomPlayer>,
}

/// `room_list`
#[derive(Debug, Serialize)]
pub(crate) struct RoomList {
    pub rooms: Vec<RoomInfo>,
}

/// `match_status`
#[derive(Debug, Serialize)]
pub(crate) struct MatchStatus {
    pub in_queue: bool,
    #[serde(flatten)]
    pub status: Option<QueueStatus>,
}

/// Decodes `data`, treating an absent payload as `T::default()`.
pub(crate) fn payload_or_default<T>(envelope: &Envelope) -> Result<T, ProtocolError>
where
    T: DeserializeOwned + Default,
{
    if envelope.data.is_null() {
        Ok(T::default())
    } else {
        envelope.data_as()
    }
}

#[cfg(test)]
mod tests {
    use sanguo_protocol::MessageKind;
    use sanguo_room::RoomConfig;

    use super::*;

    fn envelope(raw: &str) -> Envelope {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_missing_payload_uses_defaults() {
        let env = envelope(r#"{"type":"create_room"}"#);
        let config: RoomConfig = payload_or_default(&env).unwrap();
        assert_eq!(config, RoomConfig::default());

        let ready: SetReadyRequest = payload_or_default(&envelope(r#"{"type":"set_ready"}"#)).unwrap();
        assert!(ready.ready);
    }

    #[test]
    fn test_partial_room_config() {
        let env = envelope(r#"{"type":"create_room","data":{"name":"Red Cliffs","max_players":2}}"#);
        let config: RoomConfig = payload_or_default(&env).unwrap();
        assert_eq!(config.name, "Red Cliffs");
        assert_eq!(config.max_players, 2);
        assert!(config.enable_synergy);
    }

    #[test]
    fn test_wrong_payload_shape_is_a_protocol_error() {
        let env = envelope(r#"{"type":"select_generals","data":{"generals":"guan_yu"}}"#);
        let result: Result<SelectGeneralsRequest, _> = env.data_as();
        assert!(matches!(result, Err(ProtocolError::InvalidPayload { .. })));
        assert_eq!(env.kind, MessageKind::SelectGenerals);
    }

    #[test]
    fn test_match_status_flattens_queue_position() {
        let queued = MatchStatus {
            in_queue: true,
            status: Some(QueueStatus {
                position: 2,
                queued: 5,
                waited_seconds: 3,
            }),
        };
        let json = serde_json::to_value(&queued).unwrap();
        assert_eq!(json["position"], 2);
        assert_eq!(json["queued"], 5);
        assert_eq!(json["in_queue"], true);

        let idle = serde_json::to_value(MatchStatus {
            in_queue: false,
            status: None,
        })
        .unwrap();
        assert_eq!(idle, serde_json::json!({ "in_queue": false }));
    }
}
