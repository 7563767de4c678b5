//! The matchmaking queue.
//!
//! Players wait in a pool keyed by id. Every tick the pool is sorted by
//! `(rank, enqueued_at)` and cut into groups: repeatedly take the widest
//! run of players whose rank spread stays within the threshold, capped
//! at the largest room size (and at the smallest size any member asked
//! for). Each group becomes a room with every member ready. The tick
//! holds the pool lock throughout, so enqueue and dequeue never race it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use sanguo_protocol::PlayerId;
use sanguo_tick::{TickConfig, TickScheduler};

use crate::config::{MIN_ROOM_SIZE, RoomConfig};
use crate::registry::RoomRegistry;
use crate::services::{MatchFound, Notification};
use crate::RoomError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingConfig {
    /// Time between ticks.
    pub interval: Duration,
    /// Upper bound on the random delay before the first tick.
    pub jitter: Duration,
    /// Largest allowed rank spread inside one group.
    pub rank_threshold: i32,
    /// Largest group, further capped by the registry's room size bounds.
    pub max_group: usize,
    /// Start the match as soon as the room exists.
    pub auto_start: bool,
    /// Settings for matched rooms. `name` and `max_players` are set per group.
    pub room: RoomConfig,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            jitter: Duration::from_millis(500),
            rank_threshold: 100,
            max_group: 6,
            auto_start: true,
            room: RoomConfig::default(),
        }
    }
}

/// What a player asks of the group they land in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchPreference {
    /// Upper bound on the group size.
    pub max_players: Option<usize>,
    pub role: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MatchPlayer {
    pub id: PlayerId,
    pub name: String,
    pub rank: i32,
    pub enqueued_at: Instant,
    pub preference: MatchPreference,
}

/// Where a player stands in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    /// 1-based, by time of arrival.
    pub position: usize,
    pub queued: usize,
    pub waited_seconds: u64,
}

pub struct MatchmakingQueue {
    pool: Mutex<HashMap<PlayerId, MatchPlayer>>,
    registry: Arc<RoomRegistry>,
    config: MatchmakingConfig,
}

impl MatchmakingQueue {
    pub fn new(registry: Arc<RoomRegistry>, config: MatchmakingConfig) -> Self {
        Self {
            pool: Mutex::new(HashMap::new()),
            registry,
            config,
        }
    }

    pub async fn enqueue(
        &self,
        player_id: PlayerId,
        name: impl Into<String>,
        rank: i32,
        preference: MatchPreference,
    ) -> Result<(), RoomError> {
        let mut pool = self.pool.lock().await;
        if pool.contains_key(&player_id) {
            return Err(RoomError::AlreadyQueued(player_id));
        }
        pool.insert(
            player_id,
            MatchPlayer {
                id: player_id,
                name: name.into(),
                rank,
                enqueued_at: Instant::now(),
                preference,
            },
        );
        info!(%player_id, rank, queued = pool.len(), "player queued");
        Ok(())
    }

    /// Removes a player if queued. Returns whether they were.
    pub async fn dequeue(&self, player_id: PlayerId) -> bool {
        let removed = self.pool.lock().await.remove(&player_id).is_some();
        if removed {
            info!(%player_id, "player left the queue");
        }
        removed
    }

    pub async fn status(&self, player_id: PlayerId) -> Option<QueueStatus> {
        let pool = self.pool.lock().await;
        let me = pool.get(&player_id)?;
        let ahead = pool
            .values()
            .filter(|p| (p.enqueued_at, p.id) < (me.enqueued_at, me.id))
            .count();
        Some(QueueStatus {
            position: ahead + 1,
            queued: pool.len(),
            waited_seconds: me.enqueued_at.elapsed().as_secs(),
        })
    }

    pub async fn len(&self) -> usize {
        self.pool.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pool.lock().await.is_empty()
    }

    /// Forms as many groups as the pool allows and turns each into a
    /// room. Returns the groups placed. A group the registry refuses goes
    /// back into the pool.
    pub async fn tick(&self) -> Vec<MatchFound> {
        self.tick_with(|_| async {}).await
    }

    /// [`tick`](Self::tick), handing each placed group to `on_match`
    /// before its members hear of it.
    pub async fn tick_with<F, Fut>(&self, mut on_match: F) -> Vec<MatchFound>
    where
        F: FnMut(MatchFound) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut pool = self.pool.lock().await;
        if pool.len() < MIN_ROOM_SIZE {
            return Vec::new();
        }

        let (low, high) = self.registry.settings().size_bounds();
        let groups = form_groups(
            pool.values().cloned().collect(),
            self.config.rank_threshold,
            low,
            self.config.max_group.min(high),
        );

        let mut formed = Vec::with_capacity(groups.len());
        for group in groups {
            for player in &group {
                pool.remove(&player.id);
            }
            match self.place(&group, &mut on_match).await {
                Ok(found) => formed.push(found),
                Err(error) => {
                    warn!(%error, players = group.len(), "could not place group, returning it to the pool");
                    for player in group {
                        pool.insert(player.id, player);
                    }
                }
            }
        }
        formed
    }

    async fn place<F, Fut>(&self, group: &[MatchPlayer], on_match: &mut F) -> Result<MatchFound, RoomError>
    where
        F: FnMut(MatchFound) -> Fut,
        Fut: Future<Output = ()>,
    {
        let config = RoomConfig {
            name: format!("Ranked match ({} players)", group.len()),
            max_players: group.len(),
            ..self.config.room.clone()
        };
        let members = group.iter().map(|p| (p.id, p.name.clone())).collect();
        let room = self.registry.create_group_room(members, config).await?;
        let room_id = room.id();
        let players: Vec<PlayerId> = group.iter().map(|p| p.id).collect();

        info!(
            %room_id,
            players = players.len(),
            min_rank = group.first().map_or(0, |p| p.rank),
            max_rank = group.last().map_or(0, |p| p.rank),
            "match formed"
        );
        let found = MatchFound { room_id, players };
        on_match(found.clone()).await;
        self.registry.notifier().notify(
            room_id,
            &found.players,
            &Notification::MatchFound(found.clone()),
        );

        if self.config.auto_start {
            if let Err(error) = room.start_game().await {
                warn!(%room_id, %error, "matched room did not start");
            }
        }
        Ok(found)
    }

    /// Runs [`MatchmakingQueue::tick`] on a fixed interval until
    /// `shutdown` turns true or its sender goes away. Every group placed
    /// is handed to `on_match` before its members are told.
    pub async fn run<F, Fut>(self: Arc<Self>, mut shutdown: watch::Receiver<bool>, mut on_match: F)
    where
        F: FnMut(MatchFound) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut ticker = TickScheduler::new(TickConfig {
            jitter: self.config.jitter,
            ..TickConfig::every(self.config.interval)
        });
        info!(interval_ms = self.config.interval.as_millis() as u64, "matchmaking started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.wait_for_tick() => {
                    let formed = self.tick_with(&mut on_match).await;
                    ticker.record_tick_end();
                    if !formed.is_empty() {
                        debug!(rooms = formed.len(), "matchmaking tick formed rooms");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        let stats = ticker.stats();
        info!(
            ticks = stats.ticks,
            slow_ticks = stats.slow_ticks,
            longest_work_ms = stats.longest_work.as_millis() as u64,
            "matchmaking stopped"
        );
    }

    pub fn spawn<F, Fut>(self: &Arc<Self>, shutdown: watch::Receiver<bool>, on_match: F) -> JoinHandle<()>
    where
        F: FnMut(MatchFound) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(Arc::clone(self).run(shutdown, on_match))
    }
}

/// Cuts `players` into rank-coherent groups of `min_size..=max_size`.
/// Players left over stay out of every group.
pub(crate) fn form_groups(
    mut players: Vec<MatchPlayer>,
    threshold: i32,
    min_size: usize,
    max_size: usize,
) -> Vec<Vec<MatchPlayer>> {
    players.sort_by(|a, b| {
        a.rank
            .cmp(&b.rank)
            .then(a.enqueued_at.cmp(&b.enqueued_at))
            .then(a.id.cmp(&b.id))
    });
    let min_size = min_size.max(MIN_ROOM_SIZE);

    let mut groups = Vec::new();
    while let Some((start, len)) = widest_window(&players, threshold, max_size) {
        if len < min_size {
            break;
        }
        groups.push(players.drain(start..start + len).collect());
    }
    groups
}

/// Start and length of the widest valid window; the earliest on ties.
fn widest_window(players: &[MatchPlayer], threshold: i32, max_size: usize) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    for (start, first) in players.iter().enumerate() {
        let mut cap = max_size;
        let mut len = 0;
        for player in &players[start..] {
            if player.rank.saturating_sub(first.rank) > threshold {
                break;
            }
            let wanted = player.preference.max_players.unwrap_or(max_size);
            cap = cap.min(wanted.max(MIN_ROOM_SIZE));
            if len + 1 > cap {
                break;
            }
            len += 1;
        }
        if best.is_none_or(|(_, widest)| len > widest) {
            best = Some((start, len));
        }
    }
    best
}
