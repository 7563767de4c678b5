//! Wire protocol for the Sanguo game server.
//!
//! Everything that crosses the transport boundary lives here:
//!
//! - **Identities** ([`PlayerId`], [`RoomId`]) shared by every other crate.
//! - **Envelope** ([`Envelope`], [`MessageKind`]): the
//!   `{type, room_id, player_id, data}` frame carried over WebSocket.
//! - **Codec** ([`Codec`], [`JsonCodec`]): envelope ⇄ bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Room / Engine (typed payloads)
//! ```
//!
//! The protocol layer never interprets `data`; the server decodes it into
//! the typed request for the envelope's [`MessageKind`].

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{Envelope, ErrorBody, MessageKind, PlayerId, RoomId};
