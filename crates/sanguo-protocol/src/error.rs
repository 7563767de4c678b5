//! Error types for the protocol layer.
//!
//! A `ProtocolError` always means the bytes or the JSON shape were wrong.
//! Room and engine failures have their own error types further up.

/// Errors raised while encoding or decoding wire messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing a value to bytes failed.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes were not a well-formed envelope (bad JSON, unknown
    /// `type`, wrong field types).
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The envelope decoded, but its `data` did not match the payload
    /// expected for its `type`.
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    /// The message is structurally valid but breaks a protocol rule,
    /// e.g. a gameplay message without a `room_id`.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
