//! Authentication hook.
//!
//! The server never validates credentials itself. Whatever issues tokens
//! (an HTTP login endpoint, a JWT provider) plugs in through
//! [`Authenticator`], and the handshake trusts the identity it returns.

use sanguo_protocol::PlayerId;
use serde::{Deserialize, Serialize};

use crate::SessionError;

/// A verified player, as returned by an [`Authenticator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerIdentity {
    pub id: PlayerId,
    pub name: String,
    /// Matchmaking rating.
    pub rank: i32,
}

/// Validates a client's token and returns who they are.
///
/// # Example
///
/// ```rust
/// use sanguo_protocol::PlayerId;
/// use sanguo_session::{Authenticator, PlayerIdentity, SessionError};
///
/// struct AllowList;
///
/// impl Authenticator for AllowList {
///     async fn authenticate(&self, token: &str) -> Result<PlayerIdentity, SessionError> {
///         match token {
///             "secret-1" => Ok(PlayerIdentity { id: PlayerId(1), name: "Guan Yu".into(), rank: 1200 }),
///             _ => Err(SessionError::AuthFailed("unknown token".into())),
///         }
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<PlayerIdentity, SessionError>> + Send;
}

/// Development authenticator. Tokens have the form `id:name[:rank]`;
/// rank defaults to [`DevAuthenticator::DEFAULT_RANK`].
///
/// Accepts anyone who can type a number. Not for production.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevAuthenticator;

impl DevAuthenticator {
    pub const DEFAULT_RANK: i32 = 1000;
}

impl Authenticator for DevAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<PlayerIdentity, SessionError> {
        let mut parts = token.splitn(3, ':');

        let id = parts
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| SessionError::AuthFailed("token must start with a numeric id".into()))?;

        let name = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SessionError::AuthFailed("token is missing a display name".into()))?;

        let rank = match parts.next() {
            Some(raw) => raw
                .parse()
                .map_err(|_| SessionError::AuthFailed(format!("invalid rank {raw:?}")))?,
            None => Self::DEFAULT_RANK,
        };

        Ok(PlayerIdentity {
            id: PlayerId(id),
            name: name.to_owned(),
            rank,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dev_auth_parses_full_token() {
        let who = DevAuthenticator.authenticate("7:Zhao Yun:1450").await.unwrap();
        assert_eq!(who.id, PlayerId(7));
        assert_eq!(who.name, "Zhao Yun");
        assert_eq!(who.rank, 1450);
    }

    #[tokio::test]
    async fn test_dev_auth_defaults_rank() {
        let who = DevAuthenticator.authenticate("3:Cao Cao").await.unwrap();
        assert_eq!(who.rank, DevAuthenticator::DEFAULT_RANK);
    }

    #[tokio::test]
    async fn test_dev_auth_rejects_malformed_tokens() {
        for token in ["", "abc:name", "4", "4:", "4:Lu Bu:high"] {
            let result = DevAuthenticator.authenticate(token).await;
            assert!(
                matches!(result, Err(SessionError::AuthFailed(_))),
                "token {token:?} should be rejected"
            );
        }
    }
}
