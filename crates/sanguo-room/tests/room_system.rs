//! Integration tests for rooms, the registry, the phase driver and
//! matchmaking, using the built-in catalog and recording collaborators.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sanguo_engine::{Action, ActionRequest, Phase, Rules, StaticCatalog};
use sanguo_protocol::{MessageKind, PlayerId, RoomId};
use sanguo_room::{
    GameMode, HistorySink, MatchHistory, MatchPreference, MatchmakingConfig, MatchmakingQueue,
    Notification, RoomConfig, RoomError, RoomNotifier, RoomRegistry, RoomServices, RoomSettings,
    RoomStatus,
};
use tokio::sync::watch;

// =========================================================================
// Recording collaborators
// =========================================================================

#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<(RoomId, Vec<PlayerId>, MessageKind)>>,
}

impl RoomNotifier for Recorder {
    fn notify(&self, room_id: RoomId, recipients: &[PlayerId], notification: &Notification) {
        self.sent
            .lock()
            .unwrap()
            .push((room_id, recipients.to_vec(), notification.kind()));
    }
}

impl Recorder {
    fn kinds_for(&self, player: PlayerId) -> Vec<MessageKind> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, to, _)| to.contains(&player))
            .map(|(_, _, kind)| *kind)
            .collect()
    }
}

#[derive(Default)]
struct Archive {
    records: Mutex<Vec<MatchHistory>>,
}

impl HistorySink for Archive {
    fn record(&self, history: MatchHistory) {
        self.records.lock().unwrap().push(history);
    }
}

struct Fixture {
    registry: Arc<RoomRegistry>,
    notes: Arc<Recorder>,
    archive: Arc<Archive>,
}

fn fixture(settings: RoomSettings) -> Fixture {
    let notes = Arc::new(Recorder::default());
    let archive = Arc::new(Archive::default());
    let catalog = Arc::new(StaticCatalog::builtin().expect("built-in catalog is valid"));
    let services = RoomServices::new(notes.clone(), archive.clone(), catalog);
    Fixture {
        registry: Arc::new(RoomRegistry::new(settings, services)),
        notes,
        archive,
    }
}

fn quick_settings() -> RoomSettings {
    RoomSettings {
        prepare_budget: Duration::from_secs(1),
        deploy_budget: Duration::from_secs(2),
        turn_budget: Duration::from_secs(3),
        ..RoomSettings::default()
    }
}

fn pid(id: u64) -> PlayerId {
    PlayerId(id)
}

fn sized(max_players: usize) -> RoomConfig {
    RoomConfig {
        max_players,
        ..RoomConfig::default()
    }
}

/// Host 1 plus player 2, both ready, match started.
async fn started_duel(fx: &Fixture) -> RoomId {
    let room = fx.registry.create_room(pid(1), "host", sized(2)).await.unwrap();
    let room_id = room.id();
    fx.registry.join_room(room_id, pid(2), "guest").await.unwrap();
    fx.registry.set_ready(room_id, pid(2), true).await.unwrap();
    fx.registry.start_game(room_id).await.unwrap();
    room_id
}

// =========================================================================
// Registry
// =========================================================================

#[tokio::test]
async fn test_create_room_registers_host_as_ready_member() {
    let fx = fixture(RoomSettings::default());
    let a = fx.registry.create_room(pid(1), "liu bei", RoomConfig::default()).await.unwrap();
    let b = fx.registry.create_room(pid(2), "cao cao", RoomConfig::default()).await.unwrap();
    assert_ne!(a.id(), b.id());
    assert_eq!(fx.registry.room_count().await, 2);

    let players = a.players().await;
    assert_eq!(players.len(), 1);
    assert_eq!(players[0].id, pid(1));
    assert!(players[0].is_ready);

    let listed = fx.registry.list_rooms().await;
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|info| info.current_players == 1));
    assert!(listed.iter().all(|info| info.status == RoomStatus::Waiting));
}

#[tokio::test]
async fn test_room_ceiling() {
    let fx = fixture(RoomSettings {
        max_rooms: 2,
        ..RoomSettings::default()
    });
    fx.registry.create_room(pid(1), "a", RoomConfig::default()).await.unwrap();
    fx.registry.create_room(pid(2), "b", RoomConfig::default()).await.unwrap();
    let third = fx.registry.create_room(pid(3), "c", RoomConfig::default()).await;
    assert!(matches!(third, Err(RoomError::TooManyRooms(2))));
    assert_eq!(fx.registry.room_count().await, 2);
}

#[tokio::test]
async fn test_max_players_outside_two_to_six_is_rejected() {
    let fx = fixture(RoomSettings::default());
    for max_players in [1, 7] {
        let result = fx.registry.create_room(pid(1), "host", sized(max_players)).await;
        assert!(matches!(result, Err(RoomError::InvalidConfig(_))));
    }
    assert_eq!(fx.registry.room_count().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_fill_exactly_to_capacity() {
    for max_players in 2..=6 {
        let fx = fixture(RoomSettings::default());
        let room = fx.registry.create_room(pid(1), "host", sized(max_players)).await.unwrap();

        let mut joins = Vec::new();
        for id in 2..=12 {
            let registry = Arc::clone(&fx.registry);
            let room_id = room.id();
            joins.push(tokio::spawn(async move {
                registry.join_room(room_id, pid(id), format!("p{id}")).await
            }));
        }

        let (mut joined, mut full) = (0, 0);
        for join in joins {
            match join.await.unwrap() {
                Ok(()) => joined += 1,
                Err(RoomError::RoomFull(_)) => full += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(joined + 1, max_players, "host plus joiners fill the room");
        assert_eq!(full, 11 - joined);
        assert_eq!(room.players().await.len(), max_players);
    }
}

#[tokio::test]
async fn test_last_leave_removes_room_before_returning() {
    let fx = fixture(RoomSettings::default());
    let room = fx.registry.create_room(pid(1), "host", RoomConfig::default()).await.unwrap();
    let room_id = room.id();
    fx.registry.join_room(room_id, pid(2), "guest").await.unwrap();

    fx.registry.leave_room(room_id, pid(1)).await.unwrap();
    assert_eq!(fx.registry.list_rooms().await.len(), 1);
    assert_eq!(room.info().await.host, pid(2), "host hands over to the next member");

    fx.registry.leave_room(room_id, pid(2)).await.unwrap();
    assert!(fx.registry.list_rooms().await.is_empty());
    assert_eq!(fx.registry.room_count().await, 0);
    assert!(matches!(
        fx.registry.get_room(room_id).await,
        Err(RoomError::RoomNotFound(_))
    ));

    // A stale handle cannot bring the room back.
    assert!(room.is_closed());
    assert!(matches!(
        room.add_player(pid(3), "late").await,
        Err(RoomError::RoomNotFound(_))
    ));
}

#[tokio::test]
async fn test_leave_requires_membership() {
    let fx = fixture(RoomSettings::default());
    let room = fx.registry.create_room(pid(1), "host", RoomConfig::default()).await.unwrap();
    let result = fx.registry.leave_room(room.id(), pid(9)).await;
    assert!(matches!(result, Err(RoomError::NotInRoom(..))));
    assert!(matches!(
        fx.registry.leave_room(RoomId(u64::MAX), pid(1)).await,
        Err(RoomError::RoomNotFound(_))
    ));
}

#[tokio::test]
async fn test_membership_changes_are_broadcast() {
    let fx = fixture(RoomSettings::default());
    let room = fx.registry.create_room(pid(1), "host", RoomConfig::default()).await.unwrap();
    fx.registry.join_room(room.id(), pid(2), "guest").await.unwrap();
    fx.registry.set_ready(room.id(), pid(2), true).await.unwrap();

    let host_saw = fx.notes.kinds_for(pid(1));
    assert_eq!(host_saw, vec![MessageKind::RoomUpdate, MessageKind::RoomUpdate]);
}

// =========================================================================
// Starting a match
// =========================================================================

#[tokio::test]
async fn test_start_requires_every_member_ready() {
    let fx = fixture(RoomSettings::default());
    let room = fx.registry.create_room(pid(1), "host", sized(4)).await.unwrap();
    let room_id = room.id();
    for id in 2..=4 {
        fx.registry.join_room(room_id, pid(id), format!("p{id}")).await.unwrap();
    }
    fx.registry.set_ready(room_id, pid(2), true).await.unwrap();
    fx.registry.set_ready(room_id, pid(3), true).await.unwrap();

    let early = fx.registry.start_game(room_id).await;
    assert!(matches!(early, Err(RoomError::PlayersNotReady(ref ids)) if ids == &vec![pid(4)]));
    assert!(room.snapshot().await.is_none());

    fx.registry.set_ready(room_id, pid(4), true).await.unwrap();
    fx.registry.start_game(room_id).await.unwrap();

    let state = room.snapshot().await.expect("match started");
    assert_eq!(state.round, 1);
    assert_eq!(state.current_phase, Phase::Prepare);
    assert_eq!(state.players.len(), 4);
    assert!(state.players.iter().all(|p| p.generals.len() == 1));
    assert_eq!(room.status().await, RoomStatus::Playing);
    assert!(fx.notes.kinds_for(pid(4)).contains(&MessageKind::GameStart));
}

#[tokio::test]
async fn test_start_needs_two_players() {
    let fx = fixture(RoomSettings::default());
    let room = fx.registry.create_room(pid(1), "host", RoomConfig::default()).await.unwrap();
    let result = fx.registry.start_game(room.id()).await;
    assert!(matches!(result, Err(RoomError::NotEnoughPlayers { need: 2, have: 1 })));
}

#[tokio::test]
async fn test_started_room_refuses_joins_and_restarts() {
    let fx = fixture(RoomSettings::default());
    let room = fx.registry.create_room(pid(1), "host", sized(3)).await.unwrap();
    fx.registry.join_room(room.id(), pid(2), "guest").await.unwrap();
    fx.registry.set_ready(room.id(), pid(2), true).await.unwrap();
    fx.registry.start_game(room.id()).await.unwrap();

    let join = fx.registry.join_room(room.id(), pid(3), "late").await;
    assert!(matches!(join, Err(RoomError::GameInProgress(_))));
    let again = fx.registry.start_game(room.id()).await;
    assert!(matches!(again, Err(RoomError::GameInProgress(_))));
    assert!(fx.registry.list_rooms().await[0].status == RoomStatus::Playing);
}

#[tokio::test]
async fn test_selected_generals_are_fielded() {
    let fx = fixture(RoomSettings::default());
    let room = fx.registry.create_room(pid(1), "host", sized(2)).await.unwrap();
    fx.registry.join_room(room.id(), pid(2), "guest").await.unwrap();

    let unknown = fx
        .registry
        .select_generals(room.id(), pid(1), vec!["lu_bu_the_unknown".into()])
        .await;
    assert!(matches!(unknown, Err(RoomError::InvalidAction(_))));
    let too_many = fx
        .registry
        .select_generals(room.id(), pid(1), vec!["guan_yu".into(), "zhang_fei".into()])
        .await;
    assert!(matches!(too_many, Err(RoomError::InvalidAction(_))));

    fx.registry
        .select_generals(room.id(), pid(1), vec!["guan_yu".into()])
        .await
        .unwrap();
    fx.registry.set_ready(room.id(), pid(2), true).await.unwrap();
    fx.registry.start_game(room.id()).await.unwrap();

    let state = room.snapshot().await.unwrap();
    assert_eq!(state.players[0].generals[0].key, "guan_yu");
}

#[tokio::test]
async fn test_random_pick_room_refuses_selection() {
    let fx = fixture(RoomSettings::default());
    let config = RoomConfig {
        enable_random_pick: true,
        ..RoomConfig::default()
    };
    let room = fx.registry.create_room(pid(1), "host", config).await.unwrap();
    let result = room.select_generals(pid(1), vec!["guan_yu".into()]).await;
    assert!(matches!(result, Err(RoomError::InvalidAction(_))));
}

#[tokio::test]
async fn test_random_terrain_mode_seeds_the_board() {
    let fx = fixture(RoomSettings::default());
    let config = RoomConfig {
        max_players: 2,
        game_mode: GameMode::RandomTerrain,
        ..RoomConfig::default()
    };
    let room = fx.registry.create_room(pid(1), "host", config).await.unwrap();
    fx.registry.join_room(room.id(), pid(2), "guest").await.unwrap();
    fx.registry.set_ready(room.id(), pid(2), true).await.unwrap();
    fx.registry.start_game(room.id()).await.unwrap();

    let state = room.snapshot().await.unwrap();
    assert_eq!(state.terrains.len(), 4);
    assert!(state.terrains.values().all(|t| t.owner.is_none()));
    assert!(state.terrains.keys().all(|pos| pos.y > 0 && pos.y < 7));
}

// =========================================================================
// Actions and the phase driver
// =========================================================================

#[tokio::test]
async fn test_action_before_start_is_a_failed_response() {
    let fx = fixture(RoomSettings::default());
    let room = fx.registry.create_room(pid(1), "host", RoomConfig::default()).await.unwrap();
    let response = fx
        .registry
        .handle_action(room.id(), &ActionRequest::new(pid(1), Action::EndPhase))
        .await
        .unwrap();
    assert!(!response.success);
    assert_eq!(response.message, "match is not in progress");
}

#[tokio::test(start_paused = true)]
async fn test_driver_forces_phases_on_timeout() {
    let fx = fixture(quick_settings());
    let room_id = started_duel(&fx).await;
    let room = fx.registry.get_room(room_id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(room.snapshot().await.unwrap().current_phase, Phase::Deploy);

    tokio::time::sleep(Duration::from_millis(2100)).await;
    let state = room.snapshot().await.unwrap();
    assert_eq!(state.current_phase, Phase::Combat);
    assert_eq!(state.active_player, Some(pid(1)));

    tokio::time::sleep(Duration::from_millis(3100)).await;
    assert_eq!(room.snapshot().await.unwrap().active_player, Some(pid(2)));
}

#[tokio::test(start_paused = true)]
async fn test_deploy_ends_early_when_everyone_is_ready() {
    let fx = fixture(quick_settings());
    let room_id = started_duel(&fx).await;
    tokio::time::sleep(Duration::from_millis(1100)).await;

    for id in [1, 2] {
        let response = fx
            .registry
            .handle_action(room_id, &ActionRequest::new(pid(id), Action::EndPhase))
            .await
            .unwrap();
        assert!(response.success, "{}", response.message);
    }
    let room = fx.registry.get_room(room_id).await.unwrap();
    assert_eq!(room.snapshot().await.unwrap().current_phase, Phase::Combat);
    assert!(fx.notes.kinds_for(pid(2)).contains(&MessageKind::GameEvents));
}

#[tokio::test(start_paused = true)]
async fn test_match_reaching_ceiling_is_recorded() {
    let fx = fixture(RoomSettings {
        rules: Rules {
            round_ceiling: 1,
            ..Rules::default()
        },
        ..quick_settings()
    });
    let room_id = started_duel(&fx).await;
    let room = fx.registry.get_room(room_id).await.unwrap();

    // prepare 1s + deploy 2s + two 3s turns
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(room.status().await, RoomStatus::Finished);
    let state = room.snapshot().await.unwrap();
    assert!(state.is_finished);
    assert_eq!(state.round, 1);

    let records = fx.archive.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].room_id, room_id);
    assert_eq!(records[0].winner, None);
    assert_eq!(records[0].players.len(), 2);
    assert!(fx.notes.kinds_for(pid(1)).contains(&MessageKind::GameOver));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_in_combat_passes_the_turn() {
    let fx = fixture(quick_settings());
    let room_id = started_duel(&fx).await;
    tokio::time::sleep(Duration::from_millis(3200)).await;

    let room = fx.registry.get_room(room_id).await.unwrap();
    assert_eq!(room.snapshot().await.unwrap().active_player, Some(pid(1)));

    fx.registry.disconnect_player(room_id, pid(1)).await.unwrap();
    let state = room.snapshot().await.unwrap();
    assert_eq!(state.active_player, Some(pid(2)));
    assert!(!state.players[0].participating);

    let players = room.players().await;
    assert_eq!(players.len(), 2, "a disconnected player stays listed");
    assert!(!players[0].connected);
}

#[tokio::test]
async fn test_disconnect_while_waiting_is_a_leave() {
    let fx = fixture(RoomSettings::default());
    let room = fx.registry.create_room(pid(1), "host", RoomConfig::default()).await.unwrap();
    fx.registry.disconnect_player(room.id(), pid(1)).await.unwrap();
    assert_eq!(fx.registry.room_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_match_frees_its_slot() {
    let fx = fixture(RoomSettings {
        max_rooms: 1,
        ..quick_settings()
    });
    let room_id = started_duel(&fx).await;
    let room = fx.registry.get_room(room_id).await.unwrap();

    fx.registry.disconnect_player(room_id, pid(1)).await.unwrap();
    fx.registry.disconnect_player(room_id, pid(2)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(room.status().await, RoomStatus::Finished);
    assert!(room.is_closed());
    assert_eq!(fx.archive.records.lock().unwrap().len(), 1);
    assert!(fx.registry.list_rooms().await.is_empty());
    assert_eq!(fx.registry.room_count().await, 0);
    assert!(matches!(
        fx.registry.get_room(room_id).await,
        Err(RoomError::RoomNotFound(_))
    ));

    fx.registry
        .create_room(pid(3), "next", RoomConfig::default())
        .await
        .expect("the slot is free again");
}

#[tokio::test(start_paused = true)]
async fn test_finished_match_drops_absent_members() {
    let fx = fixture(RoomSettings {
        rules: Rules {
            round_ceiling: 1,
            ..Rules::default()
        },
        ..quick_settings()
    });
    let room_id = started_duel(&fx).await;
    let room = fx.registry.get_room(room_id).await.unwrap();

    fx.registry.disconnect_player(room_id, pid(1)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(room.status().await, RoomStatus::Finished);
    let players = room.players().await;
    assert_eq!(players.len(), 1);
    assert_eq!(players[0].id, pid(2));
    assert_eq!(room.info().await.host, pid(2));
    assert!(!room.is_closed());

    // Dropping out of a finished room is a leave.
    fx.registry.disconnect_player(room_id, pid(2)).await.unwrap();
    assert!(room.is_closed());
    assert_eq!(fx.registry.room_count().await, 0);
}

#[tokio::test]
async fn test_closed_room_does_not_count_toward_ceiling() {
    let fx = fixture(RoomSettings {
        max_rooms: 1,
        ..RoomSettings::default()
    });
    let room = fx.registry.create_room(pid(1), "host", RoomConfig::default()).await.unwrap();
    // Closed but still in the table, as between a room emptying and the
    // registry dropping it.
    room.remove_player(pid(1)).await.unwrap();
    assert!(room.is_closed());

    fx.registry
        .create_room(pid(2), "next", RoomConfig::default())
        .await
        .expect("closed rooms are swept before the ceiling check");
    assert_eq!(fx.registry.room_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_drivers_and_empties_the_table() {
    let fx = fixture(quick_settings());
    let room_id = started_duel(&fx).await;
    let room = fx.registry.get_room(room_id).await.unwrap();

    fx.registry.shutdown().await;
    assert_eq!(fx.registry.room_count().await, 0);
    assert!(room.is_closed());

    tokio::time::sleep(Duration::from_secs(30)).await;
    let state = room.snapshot().await.unwrap();
    assert_eq!(state.current_phase, Phase::Prepare, "no driver is left to advance it");

    let refused = fx.registry.create_room(pid(5), "late", RoomConfig::default()).await;
    assert!(matches!(refused, Err(RoomError::InvalidState(_))));
}

// =========================================================================
// Matchmaking
// =========================================================================

fn queue(fx: &Fixture) -> Arc<MatchmakingQueue> {
    Arc::new(MatchmakingQueue::new(
        Arc::clone(&fx.registry),
        MatchmakingConfig::default(),
    ))
}

#[tokio::test]
async fn test_enqueue_twice_is_rejected_and_dequeue_is_idempotent() {
    let fx = fixture(RoomSettings::default());
    let queue = queue(&fx);
    queue.enqueue(pid(1), "a", 1000, MatchPreference::default()).await.unwrap();
    let again = queue.enqueue(pid(1), "a", 1000, MatchPreference::default()).await;
    assert!(matches!(again, Err(RoomError::AlreadyQueued(_))));

    assert!(queue.dequeue(pid(1)).await);
    assert!(!queue.dequeue(pid(1)).await);
    assert!(queue.is_empty().await);
}

#[tokio::test]
async fn test_queue_status_reports_position() {
    let fx = fixture(RoomSettings::default());
    let queue = queue(&fx);
    queue.enqueue(pid(1), "a", 1000, MatchPreference::default()).await.unwrap();
    queue.enqueue(pid(2), "b", 3000, MatchPreference::default()).await.unwrap();

    let status = queue.status(pid(2)).await.unwrap();
    assert_eq!(status.position, 2);
    assert_eq!(status.queued, 2);
    assert!(queue.status(pid(3)).await.is_none());
}

#[tokio::test]
async fn test_tick_groups_by_rank_band_and_starts_rooms() {
    let fx = fixture(RoomSettings::default());
    let queue = queue(&fx);
    let ranks = [1000, 1020, 1010, 2990, 3000, 2980];
    for (i, rank) in ranks.into_iter().enumerate() {
        let id = i as u64 + 1;
        queue
            .enqueue(pid(id), format!("p{id}"), rank, MatchPreference::default())
            .await
            .unwrap();
    }

    let rooms = queue.tick().await;
    assert_eq!(rooms.len(), 2);
    assert!(queue.is_empty().await);

    let mut seen = Vec::new();
    for found in rooms {
        let room = fx.registry.get_room(found.room_id).await.unwrap();
        assert_eq!(room.status().await, RoomStatus::Playing);
        let members: Vec<u64> = room.players().await.iter().map(|p| p.id.0).collect();
        let found_members: Vec<u64> = found.players.iter().map(|p| p.0).collect();
        assert_eq!(members, found_members);
        assert!((2..=6).contains(&members.len()));
        let low_band = members.iter().all(|id| *id <= 3);
        let high_band = members.iter().all(|id| *id >= 4);
        assert!(low_band || high_band, "bands mixed: {members:?}");
        seen.extend(members);
    }
    seen.sort_unstable();
    assert_eq!(seen, vec![1, 2, 3, 4, 5, 6], "every player matched exactly once");

    let found = fx.notes.kinds_for(pid(1));
    assert!(found.contains(&MessageKind::MatchFound));
}

#[tokio::test]
async fn test_match_hook_runs_before_members_are_told() {
    let fx = fixture(RoomSettings::default());
    let queue = queue(&fx);
    queue.enqueue(pid(1), "a", 1000, MatchPreference::default()).await.unwrap();
    queue.enqueue(pid(2), "b", 1010, MatchPreference::default()).await.unwrap();

    let mut seen = Vec::new();
    let formed = queue
        .tick_with(|found| {
            let told = fx.notes.kinds_for(pid(1)).contains(&MessageKind::MatchFound);
            seen.push((found.room_id, told));
            async {}
        })
        .await;

    assert_eq!(formed.len(), 1);
    assert_eq!(seen, vec![(formed[0].room_id, false)]);
    assert!(fx.notes.kinds_for(pid(1)).contains(&MessageKind::MatchFound));
}

#[tokio::test]
async fn test_unplaceable_group_returns_to_the_pool() {
    let fx = fixture(RoomSettings {
        max_rooms: 1,
        ..RoomSettings::default()
    });
    fx.registry.create_room(pid(99), "squatter", RoomConfig::default()).await.unwrap();
    let queue = queue(&fx);
    queue.enqueue(pid(1), "a", 1000, MatchPreference::default()).await.unwrap();
    queue.enqueue(pid(2), "b", 1010, MatchPreference::default()).await.unwrap();

    assert!(queue.tick().await.is_empty());
    assert_eq!(queue.len().await, 2);
    assert!(queue.status(pid(1)).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_ticker_matches_on_interval_until_shutdown() {
    let fx = fixture(RoomSettings::default());
    let queue = queue(&fx);
    let (stop, stopped) = watch::channel(false);
    let (found_tx, mut found_rx) = tokio::sync::mpsc::unbounded_channel();
    let task = queue.spawn(stopped, move |found| {
        let found_tx = found_tx.clone();
        async move {
            let _ = found_tx.send(found);
        }
    });

    queue.enqueue(pid(1), "a", 1500, MatchPreference::default()).await.unwrap();
    queue.enqueue(pid(2), "b", 1550, MatchPreference::default()).await.unwrap();
    assert_eq!(fx.registry.room_count().await, 0);

    // Interval plus the largest first-tick jitter.
    tokio::time::sleep(Duration::from_millis(2600)).await;
    assert!(queue.is_empty().await);
    assert_eq!(fx.registry.room_count().await, 1);

    let found = found_rx.try_recv().expect("the placed group is handed over");
    assert_eq!(found.players, vec![pid(1), pid(2)]);
    let room = fx.registry.get_room(found.room_id).await.unwrap();
    assert_eq!(room.players().await.len(), 2);

    stop.send(true).unwrap();
    task.await.unwrap();
    assert!(found_rx.try_recv().is_err(), "one group, one hand-over");
}
