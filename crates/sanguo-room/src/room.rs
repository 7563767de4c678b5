//! One room: its membership and, once started, its match.
//!
//! All state sits behind a single `tokio::sync::Mutex`. Every operation
//! locks, mutates and releases without awaiting anything else, so actions
//! for one room apply in arrival order and a slow room never blocks
//! another. Waiting for players happens in the phase driver, outside the
//! lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rand::seq::IndexedRandom;
use serde::Serialize;
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use sanguo_engine::{
    ActionRequest, ActionResponse, EventPayload, GameEvent, GameState, Position, Seat, TurnEngine,
    WaitPoint,
};
use sanguo_protocol::{PlayerId, RoomId};

use crate::config::{GameMode, RoomConfig, RoomSettings, RoomStatus};
use crate::driver;
use crate::services::{
    GameOverSummary, MatchHistory, Notification, RoomServices, RoomSnapshot,
};
use crate::RoomError;

/// A member of a room. Exists from join until leave, independent of the
/// match's `PlayerState`.
#[derive(Debug, Clone, Serialize)]
pub struct RoomPlayer {
    pub id: PlayerId,
    pub name: String,
    pub is_ready: bool,
    pub connected: bool,
    /// Milliseconds since the Unix epoch.
    pub joined_at: u64,
    /// General catalog keys chosen while waiting.
    pub picks: Vec<String>,
}

impl RoomPlayer {
    pub(crate) fn new(id: PlayerId, name: String, is_ready: bool) -> Self {
        Self {
            id,
            name,
            is_ready,
            connected: true,
            joined_at: now_millis(),
            picks: Vec::new(),
        }
    }
}

/// A room as it appears in listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomInfo {
    pub id: RoomId,
    pub name: String,
    pub host: PlayerId,
    pub max_players: usize,
    pub current_players: usize,
    pub status: RoomStatus,
    pub game_mode: GameMode,
}

pub struct Room {
    id: RoomId,
    config: RoomConfig,
    settings: Arc<RoomSettings>,
    services: RoomServices,
    inner: Mutex<RoomInner>,
    /// Set, under the room lock, when the last member leaves or the
    /// server shuts down. A closed room accepts nothing and is never
    /// listed. Readable without the lock so the registry can sweep.
    closed: AtomicBool,
    /// Signalled after every change the phase driver may be waiting on.
    pub(crate) changed: Notify,
    shutdown: watch::Receiver<bool>,
}

struct RoomInner {
    status: RoomStatus,
    host: PlayerId,
    /// Join order. Seats, and so teams, follow it.
    roster: Vec<RoomPlayer>,
    engine: Option<TurnEngine>,
    started_at: Option<Instant>,
    driver: Option<JoinHandle<()>>,
}

impl RoomInner {
    fn position(&self, player_id: PlayerId) -> Option<usize> {
        self.roster.iter().position(|p| p.id == player_id)
    }

    fn member_mut(&mut self, player_id: PlayerId) -> Option<&mut RoomPlayer> {
        self.roster.iter_mut().find(|p| p.id == player_id)
    }
}

impl Room {
    /// A room that starts with `host` (and `others`) already seated, so
    /// it is never empty.
    pub(crate) fn new(
        id: RoomId,
        host: RoomPlayer,
        others: Vec<RoomPlayer>,
        config: RoomConfig,
        settings: Arc<RoomSettings>,
        services: RoomServices,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let host_id = host.id;
        let mut roster = Vec::with_capacity(config.max_players);
        roster.push(host);
        roster.extend(others);
        Self {
            id,
            config,
            settings,
            services,
            inner: Mutex::new(RoomInner {
                status: RoomStatus::Waiting,
                host: host_id,
                roster,
                engine: None,
                started_at: None,
                driver: None,
            }),
            closed: AtomicBool::new(false),
            changed: Notify::new(),
            shutdown,
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub(crate) fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    // -- Reads --------------------------------------------------------------

    pub async fn info(&self) -> RoomInfo {
        let inner = self.inner.lock().await;
        self.info_locked(&inner)
    }

    /// The listing entry, or `None` once the room is closed.
    pub(crate) async fn listing(&self) -> Option<RoomInfo> {
        let inner = self.inner.lock().await;
        (!self.is_closed()).then(|| self.info_locked(&inner))
    }

    pub async fn status(&self) -> RoomStatus {
        self.inner.lock().await.status
    }

    pub async fn players(&self) -> Vec<RoomPlayer> {
        self.inner.lock().await.roster.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// A copy of the match state, if the match has started.
    pub async fn snapshot(&self) -> Option<GameState> {
        let inner = self.inner.lock().await;
        inner.engine.as_ref().map(|engine| engine.state().clone())
    }

    // -- Membership ---------------------------------------------------------

    /// Adds a member. A player who is already a member is just marked
    /// connected again.
    pub async fn add_player(&self, player_id: PlayerId, name: impl Into<String>) -> Result<(), RoomError> {
        let mut inner = self.inner.lock().await;
        if self.is_closed() {
            return Err(RoomError::RoomNotFound(self.id));
        }
        if let Some(member) = inner.member_mut(player_id) {
            member.connected = true;
            self.broadcast_update(&inner);
            return Ok(());
        }
        if !inner.status.is_joinable() {
            return Err(RoomError::GameInProgress(self.id));
        }
        if inner.roster.len() >= self.config.max_players {
            return Err(RoomError::RoomFull(self.id));
        }

        inner.roster.push(RoomPlayer::new(player_id, name.into(), false));
        info!(room_id = %self.id, %player_id, players = inner.roster.len(), "player joined");
        self.broadcast_update(&inner);
        Ok(())
    }

    /// Removes a member. Returns `true` if that emptied the room, which is
    /// then closed; the registry drops it from its table.
    pub async fn remove_player(&self, player_id: PlayerId) -> Result<bool, RoomError> {
        let mut inner = self.inner.lock().await;
        self.remove_locked(&mut inner, player_id)
    }

    /// A member's connection dropped. Outside a running match this is a
    /// leave; during one the player stays listed but stops taking part
    /// until the match ends. Returns `true` if the room emptied.
    pub async fn disconnect(&self, player_id: PlayerId) -> Result<bool, RoomError> {
        let mut inner = self.inner.lock().await;
        if inner.status != RoomStatus::Playing {
            return self.remove_locked(&mut inner, player_id);
        }
        if self.is_closed() {
            return Err(RoomError::RoomNotFound(self.id));
        }
        let member = inner
            .member_mut(player_id)
            .ok_or(RoomError::NotInRoom(player_id, self.id))?;
        member.connected = false;
        info!(room_id = %self.id, %player_id, "player disconnected");
        self.mark_absent_locked(&mut inner, player_id);
        if self.is_closed() {
            return Ok(true);
        }
        self.broadcast_update(&inner);
        Ok(false)
    }

    pub async fn set_ready(&self, player_id: PlayerId, ready: bool) -> Result<(), RoomError> {
        let mut inner = self.inner.lock().await;
        self.check_waiting(&inner)?;
        let member = inner
            .member_mut(player_id)
            .ok_or(RoomError::NotInRoom(player_id, self.id))?;
        member.is_ready = ready;
        debug!(room_id = %self.id, %player_id, ready, "readiness changed");
        self.broadcast_update(&inner);
        Ok(())
    }

    /// Records which generals `player_id` brings into the match.
    pub async fn select_generals(&self, player_id: PlayerId, keys: Vec<String>) -> Result<(), RoomError> {
        let mut inner = self.inner.lock().await;
        self.check_waiting(&inner)?;
        if inner.position(player_id).is_none() {
            return Err(RoomError::NotInRoom(player_id, self.id));
        }
        if self.config.enable_random_pick {
            return Err(RoomError::InvalidAction("this room deals random generals".into()));
        }
        let limit = self.settings.generals_per_player;
        if keys.is_empty() || keys.len() > limit {
            return Err(RoomError::InvalidAction(format!(
                "pick between 1 and {limit} generals, got {}",
                keys.len()
            )));
        }
        for (i, key) in keys.iter().enumerate() {
            if self.services.catalog.general(key).is_none() {
                return Err(RoomError::InvalidAction(format!("unknown general {key:?}")));
            }
            if keys[..i].contains(key) {
                return Err(RoomError::InvalidAction(format!("general {key:?} picked twice")));
            }
        }

        if let Some(member) = inner.member_mut(player_id) {
            member.picks = keys;
        }
        debug!(room_id = %self.id, %player_id, "generals selected");
        self.broadcast_update(&inner);
        Ok(())
    }

    // -- Match --------------------------------------------------------------

    /// Seeds the match from the roster and starts the phase driver.
    /// Needs at least the minimum number of members, all ready.
    pub async fn start_game(self: &Arc<Self>) -> Result<(), RoomError> {
        let mut inner = self.inner.lock().await;
        self.check_waiting(&inner)?;

        let (need, _) = self.settings.size_bounds();
        let have = inner.roster.len();
        if have < need {
            return Err(RoomError::NotEnoughPlayers { need, have });
        }
        let not_ready: Vec<PlayerId> = inner
            .roster
            .iter()
            .filter(|p| !p.is_ready)
            .map(|p| p.id)
            .collect();
        if !not_ready.is_empty() {
            return Err(RoomError::PlayersNotReady(not_ready));
        }

        let seats = self.seat_roster(&inner.roster);
        let mut engine = TurnEngine::new(
            self.id,
            seats,
            self.settings.rules_for(&self.config),
            Arc::clone(&self.services.catalog),
        );
        if self.config.game_mode == GameMode::RandomTerrain {
            self.scatter_terrain(&mut engine);
        }
        let state = engine.state().clone();

        debug_assert!(inner.status.can_transition_to(RoomStatus::Playing));
        inner.status = RoomStatus::Playing;
        inner.started_at = Some(Instant::now());
        inner.engine = Some(engine);
        info!(room_id = %self.id, players = have, "match started");

        self.broadcast_update(&inner);
        self.broadcast(&inner, &Notification::GameStart(Box::new(state)));
        inner.driver = Some(tokio::spawn(driver::run(Arc::clone(self), self.shutdown.clone())));
        Ok(())
    }

    /// Routes a game action to the match. A room that is not playing, or
    /// a sender who is not a member, gets a failed response.
    pub async fn handle_action(&self, request: &ActionRequest) -> ActionResponse {
        let mut inner = self.inner.lock().await;
        if self.is_closed() || inner.status != RoomStatus::Playing {
            return ActionResponse::rejected("match is not in progress");
        }
        if inner.position(request.player_id).is_none() {
            return ActionResponse::rejected(format!(
                "player {} is not in room {}",
                request.player_id, self.id
            ));
        }
        let Some(engine) = inner.engine.as_mut() else {
            return ActionResponse::rejected("match is not in progress");
        };

        let response = engine.dispatch(request);
        if response.success {
            self.after_step(&mut inner, response.events.clone());
        }
        response
    }

    /// What the phase driver should wait on, or `None` once there is
    /// nothing left to drive.
    pub(crate) async fn wait_point(&self) -> Option<WaitPoint> {
        let inner = self.inner.lock().await;
        if self.is_closed() {
            return None;
        }
        inner
            .engine
            .as_ref()
            .filter(|engine| !engine.is_finished())
            .map(TurnEngine::wait_point)
    }

    /// The budget for `point` ran out. Does nothing if the match has
    /// moved on since.
    pub(crate) async fn expire(&self, point: WaitPoint) {
        let mut inner = self.inner.lock().await;
        if self.is_closed() {
            return;
        }
        let events = match inner.engine.as_mut() {
            Some(engine) if engine.wait_point() == point => engine.force_advance(),
            _ => return,
        };
        debug!(room_id = %self.id, round = point.round, phase = %point.phase, "budget elapsed, forcing on");
        self.after_step(&mut inner, events);
    }

    /// Closes the room for shutdown and hands back its driver, if any.
    pub(crate) async fn close(&self) -> Option<JoinHandle<()>> {
        let mut inner = self.inner.lock().await;
        self.close_locked(&mut inner);
        inner.driver.take()
    }

    // -- Internals ----------------------------------------------------------

    fn check_waiting(&self, inner: &RoomInner) -> Result<(), RoomError> {
        if self.is_closed() {
            return Err(RoomError::RoomNotFound(self.id));
        }
        if inner.status != RoomStatus::Waiting {
            return Err(RoomError::GameInProgress(self.id));
        }
        Ok(())
    }

    fn remove_locked(&self, inner: &mut RoomInner, player_id: PlayerId) -> Result<bool, RoomError> {
        if self.is_closed() {
            return Err(RoomError::RoomNotFound(self.id));
        }
        let index = inner
            .position(player_id)
            .ok_or(RoomError::NotInRoom(player_id, self.id))?;
        inner.roster.remove(index);
        info!(room_id = %self.id, %player_id, players = inner.roster.len(), "player left");
        self.mark_absent_locked(inner, player_id);
        if self.is_closed() {
            return Ok(true);
        }
        if self.settle_roster(inner) {
            return Ok(true);
        }
        self.broadcast_update(inner);
        Ok(false)
    }

    /// Closes an empty room, or hands the host seat on if the host is
    /// gone. Returns `true` if the room closed.
    fn settle_roster(&self, inner: &mut RoomInner) -> bool {
        let Some(next_host) = inner.roster.first().map(|p| p.id) else {
            self.close_locked(inner);
            info!(room_id = %self.id, "room emptied and closed");
            return true;
        };
        if inner.position(inner.host).is_none() {
            inner.host = next_host;
            debug!(room_id = %self.id, host = %next_host, "host handed over");
        }
        false
    }

    fn close_locked(&self, _inner: &mut RoomInner) {
        self.closed.store(true, Ordering::Release);
        self.changed.notify_one();
    }

    fn mark_absent_locked(&self, inner: &mut RoomInner, player_id: PlayerId) {
        let events = match inner.engine.as_mut() {
            Some(engine) if !engine.is_finished() => engine.mark_absent(player_id),
            _ => return,
        };
        self.after_step(inner, events);
    }

    /// Broadcasts what the engine just did, settles a finished match and
    /// wakes the driver.
    fn after_step(&self, inner: &mut RoomInner, events: Vec<GameEvent>) {
        if !events.is_empty() {
            self.broadcast(inner, &Notification::GameEvents(events));
        }
        self.finish_if_over(inner);
        self.changed.notify_one();
    }

    fn finish_if_over(&self, inner: &mut RoomInner) {
        if inner.status != RoomStatus::Playing {
            return;
        }
        let Some(state) = inner.engine.as_ref().map(TurnEngine::state) else {
            return;
        };
        if !state.is_finished {
            return;
        }

        let reason = state.events.iter().rev().find_map(|e| match e.payload {
            EventPayload::GameOver { reason, .. } => Some(reason),
            _ => None,
        });
        let summary = GameOverSummary {
            winner: state.winner,
            round: state.round,
            reason,
        };
        let history = MatchHistory {
            room_id: self.id,
            winner: state.winner,
            rounds: state.round,
            duration_seconds: inner.started_at.map_or(0, |t| t.elapsed().as_secs()),
            players: state.players.clone(),
            events: state.events.clone(),
            terrains: state.terrains.values().cloned().collect(),
        };

        inner.status = RoomStatus::Finished;
        info!(room_id = %self.id, rounds = history.rounds, "room finished");
        self.services.history.record(history);
        self.broadcast(inner, &Notification::GameOver(summary));

        // Members who dropped mid-match leave with it.
        let before = inner.roster.len();
        inner.roster.retain(|p| p.connected);
        if inner.roster.len() < before {
            debug!(room_id = %self.id, dropped = before - inner.roster.len(), "absent members removed");
        }
        if self.settle_roster(inner) {
            return;
        }
        self.broadcast_update(inner);
    }

    /// Seats in join order. Picks are used unless the room deals random
    /// generals or the player picked nothing.
    fn seat_roster(&self, roster: &[RoomPlayer]) -> Vec<Seat> {
        let catalog = &self.services.catalog;
        let keys: Vec<&str> = catalog.generals().iter().map(|g| g.key.as_str()).collect();
        let mut rng = rand::rng();

        roster
            .iter()
            .map(|member| {
                let generals = if self.config.enable_random_pick || member.picks.is_empty() {
                    keys.choose_multiple(&mut rng, self.settings.generals_per_player)
                        .map(|key| (*key).to_owned())
                        .collect()
                } else {
                    member.picks.clone()
                };
                Seat {
                    id: member.id,
                    name: member.name.clone(),
                    generals,
                }
            })
            .collect()
    }

    /// Drops random neutral terrain onto open tiles between the home rows.
    fn scatter_terrain(&self, engine: &mut TurnEngine) {
        let (width, height) = (engine.rules().board_width, engine.rules().board_height);
        let occupied: Vec<Position> = engine
            .state()
            .players
            .iter()
            .flat_map(|p| p.generals.iter().map(|g| g.position))
            .collect();
        let open: Vec<Position> = (1..height - 1)
            .flat_map(|y| (0..width).map(move |x| Position::new(x, y)))
            .filter(|pos| !occupied.contains(pos))
            .collect();
        let keys: Vec<String> = self
            .services
            .catalog
            .terrains()
            .iter()
            .map(|t| t.key.clone())
            .collect();

        let mut rng = rand::rng();
        let spots: Vec<Position> = open
            .choose_multiple(&mut rng, self.settings.random_terrain_count)
            .copied()
            .collect();
        for position in spots {
            if let Some(key) = keys.choose(&mut rng) {
                engine.seed_terrain(key, position);
            }
        }
    }

    fn info_locked(&self, inner: &RoomInner) -> RoomInfo {
        RoomInfo {
            id: self.id,
            name: self.config.name.clone(),
            host: inner.host,
            max_players: self.config.max_players,
            current_players: inner.roster.len(),
            status: inner.status,
            game_mode: self.config.game_mode,
        }
    }

    /// Sends to every connected member.
    fn broadcast(&self, inner: &RoomInner, notification: &Notification) {
        let recipients: Vec<PlayerId> = inner
            .roster
            .iter()
            .filter(|p| p.connected)
            .map(|p| p.id)
            .collect();
        if recipients.is_empty() {
            return;
        }
        self.services
            .notifier
            .notify(self.id, &recipients, notification);
    }

    fn broadcast_update(&self, inner: &RoomInner) {
        let snapshot = RoomSnapshot {
            info: self.info_locked(inner),
            players: inner.roster.clone(),
        };
        self.broadcast(inner, &Notification::RoomUpdate(snapshot));
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
