//! # Sanguo
//!
//! Server for a Three Kingdoms turn-based strategy game played over
//! WebSocket.
//!
//! Clients authenticate, gather in rooms (or let matchmaking group them by
//! rank), and play server-authoritative matches: every action goes through
//! the room's turn engine, and every change is pushed back to the room's
//! members as JSON envelopes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sanguo::prelude::*;
//!
//! # async fn start() -> Result<(), SanguoError> {
//! sanguo::logging::init();
//! let server = SanguoServer::builder()
//!     .config(ServerConfig::from_env()?)
//!     .build(DevAuthenticator)
//!     .await?;
//! server.run_until(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await
//! # }
//! ```

mod config;
mod error;
mod handler;
pub mod logging;
mod messages;
mod outbound;
mod server;

pub use config::{ConfigError, ServerConfig};
pub use error::SanguoError;
pub use server::{SanguoServer, SanguoServerBuilder};

pub mod prelude {
    pub use crate::{ConfigError, SanguoError, SanguoServer, SanguoServerBuilder, ServerConfig};
    pub use sanguo_engine::{Action, ActionRequest, ActionResponse, Catalog, StaticCatalog};
    pub use sanguo_protocol::{Envelope, MessageKind, PlayerId, RoomId};
    pub use sanguo_room::{HistorySink, MatchHistory, MatchmakingConfig, RoomConfig, RoomSettings};
    pub use sanguo_session::{Authenticator, DevAuthenticator, PlayerIdentity};
}
