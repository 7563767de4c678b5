//! Rooms, the room registry, and matchmaking for Sanguo.
//!
//! A [`Room`] owns one match's membership and, once started, its
//! [`TurnEngine`](sanguo_engine::TurnEngine). Each playing room runs a
//! phase driver task that forces the match on when a phase or turn runs
//! out of time.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: creates, finds, lists and removes rooms
//! - [`Room`]: membership, readiness, picks, and action routing
//! - [`MatchmakingQueue`]: clusters waiting players by rank into rooms
//! - [`RoomNotifier`] / [`HistorySink`]: where notifications and
//!   finished matches go

mod config;
mod driver;
mod error;
mod matchmaking;
mod registry;
mod room;
mod services;

pub use config::{GameMode, MAX_ROOM_SIZE, MIN_ROOM_SIZE, RoomConfig, RoomSettings, RoomStatus};
pub use error::RoomError;
pub use matchmaking::{MatchPlayer, MatchPreference, MatchmakingConfig, MatchmakingQueue, QueueStatus};
pub use registry::RoomRegistry;
pub use room::{Room, RoomInfo, RoomPlayer};
pub use services::{
    GameOverSummary, HistorySink, LogHistorySink, MatchFound, MatchHistory, Notification,
    RoomNotifier, RoomServices, RoomSnapshot,
};
