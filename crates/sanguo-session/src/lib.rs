//! Player identity and connection tracking for Sanguo.
//!
//! Credential checks live outside the server. This crate defines the
//! [`Authenticator`] hook the handshake calls, the [`PlayerIdentity`] it
//! yields, and a [`SessionManager`] that remembers who is connected and
//! which room each player currently sits in.

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod manager;

pub use auth::{Authenticator, DevAuthenticator, PlayerIdentity};
pub use error::SessionError;
pub use manager::{Session, SessionManager};
