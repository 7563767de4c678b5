//! The room registry: the one authority on which rooms exist.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

use sanguo_engine::{ActionRequest, ActionResponse};
use sanguo_protocol::{PlayerId, RoomId};

use crate::config::{RoomConfig, RoomSettings};
use crate::room::{Room, RoomInfo, RoomPlayer};
use crate::services::{RoomNotifier, RoomServices};
use crate::RoomError;

static NEXT_ROOM_ID: AtomicU64 = AtomicU64::new(1);

/// Tracks every live room.
///
/// The table lock only guards existence (create, look up, remove, list);
/// each room guards its own state. Lookups clone the `Arc<Room>` and
/// release the table before touching the room.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, Arc<Room>>>,
    settings: Arc<RoomSettings>,
    services: RoomServices,
    shutdown: watch::Sender<bool>,
}

impl RoomRegistry {
    pub fn new(settings: RoomSettings, services: RoomServices) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            rooms: RwLock::new(HashMap::new()),
            settings: Arc::new(settings),
            services,
            shutdown,
        }
    }

    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    pub fn notifier(&self) -> &Arc<dyn RoomNotifier> {
        &self.services.notifier
    }

    /// Fires once [`RoomRegistry::shutdown`] starts.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Creates a room with `host` seated and ready.
    pub async fn create_room(
        &self,
        host: PlayerId,
        host_name: impl Into<String>,
        config: RoomConfig,
    ) -> Result<Arc<Room>, RoomError> {
        self.register(config, RoomPlayer::new(host, host_name.into(), true), Vec::new())
            .await
    }

    /// Creates a room holding a whole group at once, every member ready.
    /// The first member hosts.
    pub async fn create_group_room(
        &self,
        members: Vec<(PlayerId, String)>,
        config: RoomConfig,
    ) -> Result<Arc<Room>, RoomError> {
        let mut members = members
            .into_iter()
            .map(|(id, name)| RoomPlayer::new(id, name, true));
        let host = members
            .next()
            .ok_or(RoomError::NotEnoughPlayers { need: 1, have: 0 })?;
        self.register(config, host, members.collect()).await
    }

    async fn register(
        &self,
        config: RoomConfig,
        host: RoomPlayer,
        others: Vec<RoomPlayer>,
    ) -> Result<Arc<Room>, RoomError> {
        if *self.shutdown.borrow() {
            return Err(RoomError::InvalidState("server is shutting down".into()));
        }
        config.validate(&self.settings)?;
        if others.len() + 1 > config.max_players {
            return Err(RoomError::InvalidConfig(format!(
                "{} members do not fit max_players {}",
                others.len() + 1,
                config.max_players
            )));
        }

        let host_id = host.id;
        let mut rooms = self.rooms.write().await;
        sweep_closed(&mut rooms);
        if rooms.len() >= self.settings.max_rooms {
            warn!(limit = self.settings.max_rooms, "room limit reached");
            return Err(RoomError::TooManyRooms(self.settings.max_rooms));
        }
        let id = RoomId(NEXT_ROOM_ID.fetch_add(1, Ordering::Relaxed));
        let room = Arc::new(Room::new(
            id,
            host,
            others,
            config,
            Arc::clone(&self.settings),
            self.services.clone(),
            self.shutdown.subscribe(),
        ));
        rooms.insert(id, Arc::clone(&room));
        drop(rooms);

        info!(room_id = %id, host = %host_id, "room created");
        Ok(room)
    }

    pub async fn get_room(&self, room_id: RoomId) -> Result<Arc<Room>, RoomError> {
        self.rooms
            .read()
            .await
            .get(&room_id)
            .filter(|room| !room.is_closed())
            .cloned()
            .ok_or(RoomError::RoomNotFound(room_id))
    }

    pub async fn join_room(
        &self,
        room_id: RoomId,
        player_id: PlayerId,
        name: impl Into<String>,
    ) -> Result<(), RoomError> {
        self.get_room(room_id).await?.add_player(player_id, name).await
    }

    /// Removes a member. A room this empties is gone from the table, and
    /// from listings, by the time this returns.
    pub async fn leave_room(&self, room_id: RoomId, player_id: PlayerId) -> Result<(), RoomError> {
        let room = self.get_room(room_id).await?;
        if room.remove_player(player_id).await? {
            self.forget(&room).await;
        }
        Ok(())
    }

    /// A member's connection dropped; see [`Room::disconnect`].
    pub async fn disconnect_player(&self, room_id: RoomId, player_id: PlayerId) -> Result<(), RoomError> {
        let room = self.get_room(room_id).await?;
        if room.disconnect(player_id).await? {
            self.forget(&room).await;
        }
        Ok(())
    }

    /// Open rooms, ordered by id.
    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let rooms: Vec<Arc<Room>> = self.rooms.read().await.values().cloned().collect();
        let mut infos = Vec::with_capacity(rooms.len());
        for room in rooms {
            if let Some(info) = room.listing().await {
                infos.push(info);
            }
        }
        infos.sort_by_key(|info| info.id);
        infos
    }

    pub async fn set_ready(&self, room_id: RoomId, player_id: PlayerId, ready: bool) -> Result<(), RoomError> {
        self.get_room(room_id).await?.set_ready(player_id, ready).await
    }

    pub async fn select_generals(
        &self,
        room_id: RoomId,
        player_id: PlayerId,
        keys: Vec<String>,
    ) -> Result<(), RoomError> {
        self.get_room(room_id).await?.select_generals(player_id, keys).await
    }

    pub async fn start_game(&self, room_id: RoomId) -> Result<(), RoomError> {
        self.get_room(room_id).await?.start_game().await
    }

    pub async fn handle_action(
        &self,
        room_id: RoomId,
        request: &ActionRequest,
    ) -> Result<ActionResponse, RoomError> {
        let room = self.get_room(room_id).await?;
        let response = room.handle_action(request).await;
        if room.is_closed() {
            self.forget(&room).await;
        }
        Ok(response)
    }

    /// Rooms still open. Rooms a phase driver closed are swept here.
    pub async fn room_count(&self) -> usize {
        let mut rooms = self.rooms.write().await;
        sweep_closed(&mut rooms);
        rooms.len()
    }

    /// Stops every phase driver and empties the table. Each room is
    /// closed under its own lock, so mutations already in flight finish
    /// first.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let rooms: Vec<Arc<Room>> = self.rooms.write().await.drain().map(|(_, room)| room).collect();

        let mut drivers = Vec::new();
        for room in &rooms {
            if let Some(driver) = room.close().await {
                drivers.push(driver);
            }
        }
        for driver in drivers {
            if let Err(error) = driver.await {
                warn!(%error, "phase driver ended abnormally");
            }
        }
        info!(rooms = rooms.len(), "room registry shut down");
    }

    async fn forget(&self, room: &Arc<Room>) {
        let mut rooms = self.rooms.write().await;
        if rooms.get(&room.id()).is_some_and(|r| Arc::ptr_eq(r, room)) {
            rooms.remove(&room.id());
            info!(room_id = %room.id(), "room removed");
        }
    }
}

/// Drops rooms that closed without going through [`RoomRegistry::forget`],
/// such as a finished match whose members had all disconnected.
fn sweep_closed(rooms: &mut HashMap<RoomId, Arc<Room>>) {
    rooms.retain(|room_id, room| {
        let open = !room.is_closed();
        if !open {
            debug!(%room_id, "closed room swept");
        }
        open
    });
}
