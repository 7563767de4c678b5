//! Per-connection handler: authentication, message routing, heartbeat.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive `auth` → validate the token → send `auth_ok`
//!   2. Spawn the writer, which drains the player's outbound channel
//!      (replies and room notifications) and pings on an interval
//!   3. Loop: receive envelopes → route → queue the reply
//!   4. On close: leave the matchmaking queue, release the session, and
//!      tell the room the player is gone

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use sanguo_engine::{Action, ActionRequest};
use sanguo_protocol::{Codec, Envelope, MessageKind, PlayerId, ProtocolError, RoomId};
use sanguo_room::{MatchFound, MatchPreference, Room, RoomConfig, RoomError};
use sanguo_session::{Authenticator, PlayerIdentity, Session};
use sanguo_transport::{Connection, WebSocketConnection};

use crate::messages::{
    AuthRequest, MatchStatus, RoomJoined, RoomList, SelectGeneralsRequest, SetReadyRequest,
    payload_or_default,
};
use crate::server::ServerState;
use crate::SanguoError;

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, C>>,
    mut stop: watch::Receiver<bool>,
) -> Result<(), SanguoError>
where
    A: Authenticator,
    C: Codec,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    debug!(%conn_id, peer = %conn.peer_addr(), "handling new connection");

    let identity = match authenticate(&conn, &state).await {
        Ok(identity) => identity,
        Err(err) => {
            refuse(&conn, &state.codec, &err).await;
            return Err(err);
        }
    };
    let player_id = identity.id;
    let auth_ok = Envelope::with_payload(MessageKind::AuthOk, &identity)?.for_player(player_id);

    let registered = state.sessions.lock().await.register(identity.clone()).map(|_| ());
    if let Err(err) = registered {
        let err = SanguoError::from(err);
        refuse(&conn, &state.codec, &err).await;
        return Err(err);
    }
    info!(%conn_id, %player_id, name = %identity.name, "player authenticated");

    let (tx, rx) = state.outbound.attach(player_id);
    let writer = tokio::spawn(write_loop(Arc::clone(&conn), Arc::clone(&state), player_id, rx));

    if tx.send(auth_ok).await.is_ok() {
        read_loop(&conn, &state, &identity, &tx, &mut stop).await;
    }

    // Dropping the last sender ends the writer once it has flushed.
    state.outbound.detach(player_id, &tx);
    drop(tx);
    if let Err(e) = writer.await {
        warn!(%player_id, error = %e, "writer task ended abnormally");
    }
    release(&state, player_id).await;
    if let Err(e) = conn.close().await {
        debug!(%player_id, error = %e, "close failed");
    }
    Ok(())
}

/// Reads the first frame, which must be `auth` with a valid token.
async fn authenticate<A, C>(
    conn: &WebSocketConnection,
    state: &ServerState<A, C>,
) -> Result<PlayerIdentity, SanguoError>
where
    A: Authenticator,
    C: Codec,
{
    let data = match time::timeout(state.config.auth_timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage("connection closed before auth".into()).into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(ProtocolError::InvalidMessage("auth timed out".into()).into()),
    };

    let envelope: Envelope = state.codec.decode(&data)?;
    if envelope.kind != MessageKind::Auth {
        return Err(ProtocolError::InvalidMessage(format!(
            "first message must be auth, got {}",
            envelope.kind
        ))
        .into());
    }
    let AuthRequest { token } = envelope.data_as()?;
    Ok(state.auth.authenticate(&token).await?)
}

/// Best-effort `error` reply before the connection is dropped.
async fn refuse(conn: &WebSocketConnection, codec: &impl Codec, err: &SanguoError) {
    if matches!(err, SanguoError::Transport(_)) {
        return;
    }
    debug!(conn_id = %conn.id(), error = %err, "refusing connection");
    if let Ok(bytes) = codec.encode(&error_envelope(err)) {
        let _ = conn.send(&bytes).await;
    }
}

async fn read_loop<A, C>(
    conn: &WebSocketConnection,
    state: &ServerState<A, C>,
    identity: &PlayerIdentity,
    tx: &mpsc::Sender<Envelope>,
    stop: &mut watch::Receiver<bool>,
) where
    A: Authenticator,
    C: Codec,
{
    let player_id = identity.id;
    loop {
        if *stop.borrow() {
            break;
        }
        let frame = tokio::select! {
            frame = time::timeout(state.config.idle_timeout, conn.recv()) => frame,
            _ = stop.changed() => {
                info!(%player_id, "server shutting down, closing connection");
                break;
            }
        };
        let data = match frame {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                info!(%player_id, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                debug!(%player_id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                info!(%player_id, "connection timed out");
                break;
            }
        };

        let reply = match state.codec.decode::<Envelope>(&data) {
            Ok(envelope) => {
                let kind = envelope.kind;
                match route(state, identity, envelope).await {
                    Ok(reply) => reply,
                    Err(err) => {
                        debug!(%player_id, %kind, error = %err, "request refused");
                        Some(error_envelope(&err))
                    }
                }
            }
            Err(e) => {
                debug!(%player_id, error = %e, "failed to decode envelope");
                Some(error_envelope(&e.into()))
            }
        };
        if let Some(reply) = reply {
            if tx.send(reply).await.is_err() {
                break;
            }
        }
    }
}

/// Forwards queued envelopes to the socket and pings on every heartbeat.
/// Ends when every sender is gone or a write fails.
async fn write_loop<A, C>(
    conn: Arc<WebSocketConnection>,
    state: Arc<ServerState<A, C>>,
    player_id: PlayerId,
    mut rx: mpsc::Receiver<Envelope>,
) where
    A: Authenticator,
    C: Codec,
{
    let period = state.config.heartbeat_interval;
    let mut heartbeat = time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let envelope = tokio::select! {
            next = rx.recv() => match next {
                Some(envelope) => envelope,
                None => break,
            },
            _ = heartbeat.tick() => Envelope::new(MessageKind::Ping),
        };

        let bytes = match state.codec.encode(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%player_id, kind = %envelope.kind, error = %e, "failed to encode envelope");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            debug!(%player_id, error = %e, "send failed, stopping writer");
            break;
        }
    }
}

/// Handles one request. `Ok(None)` means the answer arrives as a room
/// notification instead of a direct reply.
async fn route<A, C>(
    state: &ServerState<A, C>,
    who: &PlayerIdentity,
    envelope: Envelope,
) -> Result<Option<Envelope>, SanguoError>
where
    A: Authenticator,
    C: Codec,
{
    let player_id = who.id;
    let reply = match envelope.kind {
        MessageKind::Ping => Envelope {
            data: envelope.data,
            ..Envelope::new(MessageKind::Pong)
        },
        MessageKind::Pong => return Ok(None),

        MessageKind::CreateRoom => {
            ensure_free(state, player_id, None).await?;
            let config: RoomConfig = payload_or_default(&envelope)?;
            let room = state.registry.create_room(player_id, who.name.clone(), config).await?;
            state.sessions.lock().await.enter_room(player_id, room.id())?;
            room_joined(&room).await?
        }
        MessageKind::JoinRoom => {
            let room_id = envelope.require_room()?;
            ensure_free(state, player_id, Some(room_id)).await?;
            state.registry.join_room(room_id, player_id, who.name.clone()).await?;
            state.sessions.lock().await.enter_room(player_id, room_id)?;
            let room = state.registry.get_room(room_id).await?;
            room_joined(&room).await?
        }
        MessageKind::LeaveRoom => {
            let room_id = seated_room(state, player_id, &envelope).await?;
            let left = state.registry.leave_room(room_id, player_id).await;
            // Forget the room only once the player is out of it.
            if matches!(
                left,
                Ok(()) | Err(RoomError::RoomNotFound(_) | RoomError::NotInRoom(..))
            ) {
                state.sessions.lock().await.leave_room(player_id)?;
            }
            left?;
            Envelope::new(MessageKind::LeaveRoom).in_room(room_id)
        }
        MessageKind::ListRooms => Envelope::with_payload(
            MessageKind::RoomList,
            &RoomList {
                rooms: state.registry.list_rooms().await,
            },
        )?,

        MessageKind::SetReady => {
            let room_id = seated_room(state, player_id, &envelope).await?;
            let SetReadyRequest { ready } = payload_or_default(&envelope)?;
            state.registry.set_ready(room_id, player_id, ready).await?;
            return Ok(None);
        }
        MessageKind::SelectGenerals => {
            let room_id = seated_room(state, player_id, &envelope).await?;
            let SelectGeneralsRequest { generals } = envelope.data_as()?;
            state.registry.select_generals(room_id, player_id, generals).await?;
            return Ok(None);
        }
        MessageKind::StartGame => {
            let room_id = seated_room(state, player_id, &envelope).await?;
            let room = state.registry.get_room(room_id).await?;
            if room.info().await.host != player_id {
                return Err(RoomError::InvalidAction("only the host can start the match".into()).into());
            }
            room.start_game().await?;
            return Ok(None);
        }

        MessageKind::JoinMatch => {
            ensure_free(state, player_id, None).await?;
            let preference: MatchPreference = payload_or_default(&envelope)?;
            state
                .matchmaking
                .enqueue(player_id, who.name.clone(), who.rank, preference)
                .await?;
            match_status(state, player_id).await?
        }
        MessageKind::LeaveMatch => {
            state.matchmaking.dequeue(player_id).await;
            match_status(state, player_id).await?
        }
        MessageKind::MatchStatus => match_status(state, player_id).await?,

        MessageKind::GameAction => {
            let room_id = seated_room(state, player_id, &envelope).await?;
            let action: Action = envelope.data_as()?;
            let request = ActionRequest::new(player_id, action);
            let response = state.registry.handle_action(room_id, &request).await?;
            if !response.success {
                debug!(%room_id, %player_id, reason = %response.message, "action rejected");
            }
            Envelope::with_payload(MessageKind::ActionResponse, &response)?.in_room(room_id)
        }

        MessageKind::Auth => {
            return Err(ProtocolError::InvalidMessage("already authenticated".into()).into());
        }
        MessageKind::AuthOk
        | MessageKind::RoomList
        | MessageKind::RoomJoined
        | MessageKind::MatchFound
        | MessageKind::ActionResponse
        | MessageKind::RoomUpdate
        | MessageKind::GameStart
        | MessageKind::GameEvents
        | MessageKind::GameOver
        | MessageKind::Error => {
            return Err(ProtocolError::InvalidMessage(format!(
                "{} is sent by the server only",
                envelope.kind
            ))
            .into());
        }
    };
    Ok(Some(reply))
}

/// A player sits in at most one room and is never seated and queued at
/// once. `joining` is the room being (re)joined, which does not count.
async fn ensure_free<A, C>(
    state: &ServerState<A, C>,
    player_id: PlayerId,
    joining: Option<RoomId>,
) -> Result<(), RoomError>
where
    A: Authenticator,
    C: Codec,
{
    let current = state.sessions.lock().await.current_room(&player_id);
    if let Some(room_id) = current {
        if Some(room_id) != joining {
            return Err(RoomError::InvalidState(format!("already in room {room_id}")));
        }
    }
    if state.matchmaking.status(player_id).await.is_some() {
        return Err(RoomError::AlreadyQueued(player_id));
    }
    Ok(())
}

/// The room the player sits in. A `room_id` on the envelope may repeat
/// it but never name another room.
async fn seated_room<A, C>(
    state: &ServerState<A, C>,
    player_id: PlayerId,
    envelope: &Envelope,
) -> Result<RoomId, RoomError>
where
    A: Authenticator,
    C: Codec,
{
    let seated = state.sessions.lock().await.current_room(&player_id);
    match (envelope.room_id, seated) {
        (Some(named), Some(seated)) if named != seated => Err(RoomError::NotInRoom(player_id, named)),
        (_, Some(seated)) => Ok(seated),
        (Some(named), None) => Err(RoomError::NotInRoom(player_id, named)),
        (None, None) => Err(RoomError::InvalidState(format!("{} requires a room", envelope.kind))),
    }
}

async fn room_joined(room: &Room) -> Result<Envelope, ProtocolError> {
    let body = RoomJoined {
        room: room.info().await,
        players: room.players().await,
    };
    Ok(Envelope::with_payload(MessageKind::RoomJoined, &body)?.in_room(room.id()))
}

async fn match_status<A, C>(
    state: &ServerState<A, C>,
    player_id: PlayerId,
) -> Result<Envelope, ProtocolError>
where
    A: Authenticator,
    C: Codec,
{
    let status = state.matchmaking.status(player_id).await;
    Envelope::with_payload(
        MessageKind::MatchStatus,
        &MatchStatus {
            in_queue: status.is_some(),
            status,
        },
    )
}

/// Undoes everything a connection held.
async fn release<A, C>(state: &ServerState<A, C>, player_id: PlayerId)
where
    A: Authenticator,
    C: Codec,
{
    state.matchmaking.dequeue(player_id).await;
    let session = state.sessions.lock().await.unregister(player_id);
    if let Ok(Session {
        room: Some(room_id), ..
    }) = session
    {
        if let Err(e) = state.registry.disconnect_player(room_id, player_id).await {
            debug!(%room_id, %player_id, error = %e, "room already gone");
        }
    }
}

/// Records a matchmade room on each member's session. A member whose
/// session is already gone is taken back out of the room.
pub(crate) async fn seat_match<A, C>(state: &ServerState<A, C>, found: MatchFound)
where
    A: Authenticator,
    C: Codec,
{
    let room_id = found.room_id;
    for player_id in found.players {
        let seated = state.sessions.lock().await.enter_room(player_id, room_id);
        if let Err(e) = seated {
            debug!(%room_id, %player_id, error = %e, "matched player already gone");
            if let Err(e) = state.registry.disconnect_player(room_id, player_id).await {
                debug!(%room_id, %player_id, error = %e, "room already gone");
            }
        }
    }
}

fn error_envelope(err: &SanguoError) -> Envelope {
    Envelope::error(err.status_code(), err.to_string())
}
