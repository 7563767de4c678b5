//! The connection table rooms notify through.
//!
//! Each connected player has a bounded channel drained by that
//! connection's writer task. Rooms deliver with `try_send`, so a slow
//! client loses notifications instead of stalling a room.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use sanguo_protocol::{Envelope, PlayerId, RoomId};
use sanguo_room::{Notification, RoomNotifier};

/// Envelopes buffered per connection before notifications are dropped.
pub(crate) const OUTBOUND_CAPACITY: usize = 256;

#[derive(Default)]
pub(crate) struct Outbound {
    players: RwLock<HashMap<PlayerId, mpsc::Sender<Envelope>>>,
}

impl Outbound {
    /// Opens a channel for `player_id`, replacing any previous one.
    pub(crate) fn attach(
        &self,
        player_id: PlayerId,
    ) -> (mpsc::Sender<Envelope>, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        self.players
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(player_id, tx.clone());
        (tx, rx)
    }

    /// Removes `player_id`'s channel if it is still `tx`. A newer
    /// connection's channel is left alone.
    pub(crate) fn detach(&self, player_id: PlayerId, tx: &mpsc::Sender<Envelope>) {
        let mut players = self.players.write().unwrap_or_else(PoisonError::into_inner);
        if players.get(&player_id).is_some_and(|current| current.same_channel(tx)) {
            players.remove(&player_id);
        }
    }

    #[cfg(test)]
    pub(crate) fn is_attached(&self, player_id: PlayerId) -> bool {
        self.players
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&player_id)
    }
}

impl RoomNotifier for Outbound {
    fn notify(&self, room_id: RoomId, recipients: &[PlayerId], notification: &Notification) {
        let envelope = match notification.to_envelope(room_id) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(%room_id, %error, kind = %notification.kind(), "notification did not encode");
                return;
            }
        };

        let players = self.players.read().unwrap_or_else(PoisonError::into_inner);
        for &player_id in recipients {
            let Some(tx) = players.get(&player_id) else {
                debug!(%room_id, %player_id, "recipient not connected");
                continue;
            };
            match tx.try_send(envelope.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(%room_id, %player_id, kind = %envelope.kind, "outbound queue full, dropping");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(%room_id, %player_id, "connection already closing");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use sanguo_protocol::MessageKind;
    use sanguo_room::MatchFound;

    use super::*;

    fn found(room: u64, players: &[u64]) -> Notification {
        Notification::MatchFound(MatchFound {
            room_id: RoomId(room),
            players: players.iter().copied().map(PlayerId).collect(),
        })
    }

    #[tokio::test]
    async fn test_notify_reaches_attached_recipients_only() {
        let outbound = Outbound::default();
        let (_tx1, mut rx1) = outbound.attach(PlayerId(1));
        let (_tx2, mut rx2) = outbound.attach(PlayerId(2));

        outbound.notify(RoomId(4), &[PlayerId(1), PlayerId(3)], &found(4, &[1, 3]));

        let envelope = rx1.recv().await.unwrap();
        assert_eq!(envelope.kind, MessageKind::MatchFound);
        assert_eq!(envelope.room_id, Some(RoomId(4)));
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let outbound = Outbound::default();
        let (_tx, mut rx) = outbound.attach(PlayerId(1));
        for _ in 0..OUTBOUND_CAPACITY + 10 {
            outbound.notify(RoomId(1), &[PlayerId(1)], &found(1, &[1]));
        }
        let mut delivered = 0;
        while rx.try_recv().is_ok() {
            delivered += 1;
        }
        assert_eq!(delivered, OUTBOUND_CAPACITY);
    }

    #[test]
    fn test_stale_detach_keeps_newer_connection() {
        let outbound = Outbound::default();
        let (old_tx, _old_rx) = outbound.attach(PlayerId(1));
        let (new_tx, _new_rx) = outbound.attach(PlayerId(1));

        outbound.detach(PlayerId(1), &old_tx);
        assert!(outbound.is_attached(PlayerId(1)));
        outbound.detach(PlayerId(1), &new_tx);
        assert!(!outbound.is_attached(PlayerId(1)));
    }
}
