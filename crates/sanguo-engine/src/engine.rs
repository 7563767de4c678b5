//! The round/phase state machine for one match.
//!
//! `TurnEngine` owns the match's [`GameState`] and is the only thing that
//! mutates it. It never waits on anything: the owner (a room and its
//! phase driver) decides when a phase has run out of time and calls
//! [`TurnEngine::force_advance`].
//!
//! ```text
//! new() ──→ Prepare ──force_advance──→ Deploy ──all ready / timeout──→ Combat
//!              ▲                                                         │
//!              │                         last turn passed / timeout      ▼
//!              └──────────── round += 1 ────────────────────────────── EndRound ──→ Finished
//! ```
//!
//! Prepare waits only for the prepare budget so clients can show the new
//! round. EndRound resolves in the same call that enters it.

use std::sync::Arc;

use tracing::{debug, info};

use sanguo_protocol::{PlayerId, RoomId};

use crate::action::ActionKind;
use crate::catalog::{CardDef, Catalog};
use crate::effect::{BuffKind, EffectKind, Stat, TargetScope, TerrainTrigger};
use crate::ids::{GeneralId, TerrainId};
use crate::model::{
    EventPayload, FinishReason, GameEvent, GameState, Phase, PlayerState, Position, SynergyState,
    Team,
};
use crate::rules::{Rules, VictoryCondition};

/// A player taking a seat in a new match.
#[derive(Debug, Clone)]
pub struct Seat {
    pub id: PlayerId,
    pub name: String,
    /// General catalog keys.
    pub generals: Vec<String>,
}

/// Identifies what the match is currently waiting for. Compare two
/// snapshots to tell whether anything moved in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPoint {
    pub round: u32,
    pub phase: Phase,
    pub turn_seq: u64,
    pub active_player: Option<PlayerId>,
}

/// Who or what an effect comes from.
pub(crate) struct EffectSource {
    pub player: Option<PlayerId>,
    pub general: Option<GeneralId>,
    pub action: Option<ActionKind>,
    /// Attack bonus of the source general. `None` for fixed damage
    /// (terrain, synergies), which also ignores defense.
    pub attack: Option<i32>,
}

impl EffectSource {
    pub fn ambient(owner: Option<PlayerId>) -> Self {
        Self {
            player: owner,
            general: None,
            action: None,
            attack: None,
        }
    }

    pub fn event(&self, payload: EventPayload) -> GameEvent {
        let mut event = GameEvent::new(payload);
        event.player_id = self.player;
        event.general_id = self.general;
        event.action = self.action;
        event
    }
}

pub struct TurnEngine {
    pub(crate) state: GameState,
    pub(crate) rules: Rules,
    pub(crate) catalog: Arc<dyn Catalog>,
}

impl TurnEngine {
    /// Seeds a match: teams alternate by seat, generals line up on their
    /// team's home row, every player gets the catalog's starting hand.
    /// Starts in round 1, Prepare.
    pub fn new(room_id: RoomId, seats: Vec<Seat>, rules: Rules, catalog: Arc<dyn Catalog>) -> Self {
        let mut placed = [0usize; 2];

        let players = seats
            .into_iter()
            .enumerate()
            .map(|(seat, s)| {
                let team = Team::for_seat(seat);
                let slot = &mut placed[team as usize];
                let generals = s
                    .generals
                    .iter()
                    .filter_map(|key| {
                        let Some(def) = catalog.general(key) else {
                            debug!(%room_id, player_id = %s.id, key = %key, "unknown general skipped");
                            return None;
                        };
                        let general = def.instantiate(home_position(&rules, team, *slot));
                        *slot += 1;
                        Some(general)
                    })
                    .collect();
                let hand = catalog
                    .starting_hand()
                    .iter()
                    .filter_map(|key| catalog.card(key))
                    .map(CardDef::instantiate)
                    .collect();

                PlayerState {
                    id: s.id,
                    name: s.name,
                    team,
                    generals,
                    hand,
                    is_alive: true,
                    action_points: rules.action_points,
                    participating: true,
                    phase_done: false,
                }
            })
            .collect();

        let synergies = if rules.enable_synergy {
            catalog
                .synergies()
                .iter()
                .map(|def| SynergyState {
                    key: def.key.clone(),
                    name: def.name.clone(),
                    active_for: Vec::new(),
                })
                .collect()
        } else {
            Vec::new()
        };

        let mut engine = Self {
            state: GameState {
                room_id,
                round: 1,
                current_phase: Phase::Prepare,
                players,
                terrains: Default::default(),
                events: Vec::new(),
                winner: None,
                is_finished: false,
                active_player: None,
                turn_seq: 1,
                synergies,
            },
            rules,
            catalog,
        };
        engine.emit(GameEvent::new(EventPayload::PhaseChanged {
            round: 1,
            phase: Phase::Prepare,
        }));
        info!(%room_id, players = engine.state.players.len(), "match seeded");
        engine
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn phase(&self) -> Phase {
        self.state.current_phase
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished
    }

    pub fn wait_point(&self) -> WaitPoint {
        WaitPoint {
            round: self.state.round,
            phase: self.state.current_phase,
            turn_seq: self.state.turn_seq,
            active_player: self.state.active_player,
        }
    }

    /// Ends whatever the match is waiting on because its time ran out.
    ///
    /// Prepare resolves into Deploy; Deploy moves on to Combat without
    /// the stragglers; in Combat the active player's turn passes.
    /// Returns the events this produced.
    pub fn force_advance(&mut self) -> Vec<GameEvent> {
        let mark = self.state.events.len();
        let room_id = self.state.room_id;
        match self.state.current_phase {
            Phase::Prepare => self.resolve_prepare(),
            Phase::Deploy => {
                debug!(%room_id, round = self.state.round, "deploy budget elapsed");
                self.begin_combat();
            }
            Phase::Combat => match self.state.active_player {
                Some(player_id) => {
                    debug!(%room_id, %player_id, "turn budget elapsed");
                    self.pass_turn(player_id);
                }
                None => self.end_round(),
            },
            // EndRound resolves as soon as it is entered.
            Phase::EndRound | Phase::Finished => {}
        }
        self.events_since(mark)
    }

    /// Takes a player out of the match (left or disconnected). Anything
    /// the match was waiting on from them is treated as timed out.
    pub fn mark_absent(&mut self, player_id: PlayerId) -> Vec<GameEvent> {
        let mark = self.state.events.len();
        if self.state.is_finished {
            return Vec::new();
        }
        let Some(player) = self.state.players.iter_mut().find(|p| p.id == player_id) else {
            return Vec::new();
        };
        if !player.participating {
            return Vec::new();
        }
        player.participating = false;
        self.emit(GameEvent::new(EventPayload::PlayerLeft).by(player_id));
        info!(room_id = %self.state.room_id, %player_id, "player no longer participating");

        match self.state.current_phase {
            Phase::Deploy => self.check_deploy_complete(),
            Phase::Combat if self.state.active_player == Some(player_id) => {
                self.pass_turn(player_id)
            }
            _ => {}
        }
        self.events_since(mark)
    }

    /// Places neutral terrain from the catalog, as a random-terrain room
    /// does before play begins. Returns `None` for an unknown key, an
    /// off-board position or a tile that already has terrain.
    pub fn seed_terrain(&mut self, key: &str, position: Position) -> Option<TerrainId> {
        if !self.rules.on_board(position) || self.state.terrains.contains_key(&position) {
            return None;
        }
        let terrain = self.catalog.terrain(key)?.instantiate(position, None);
        let terrain_id = terrain.id;
        self.state.terrains.insert(position, terrain);
        self.emit(GameEvent::new(EventPayload::TerrainDeployed {
            terrain_id,
            terrain: key.to_owned(),
            position,
        }));
        Some(terrain_id)
    }

    // -- Events -------------------------------------------------------------

    pub(crate) fn emit(&mut self, event: GameEvent) {
        self.state.events.push(event);
    }

    pub(crate) fn events_since(&self, mark: usize) -> Vec<GameEvent> {
        self.state.events[mark..].to_vec()
    }

    fn enter(&mut self, phase: Phase) {
        debug_assert!(
            self.state.current_phase.can_transition_to(phase),
            "illegal phase transition {} -> {}",
            self.state.current_phase,
            phase
        );
        self.state.current_phase = phase;
        self.state.turn_seq += 1;
        debug!(room_id = %self.state.room_id, round = self.state.round, %phase, "phase entered");
        self.emit(GameEvent::new(EventPayload::PhaseChanged {
            round: self.state.round,
            phase,
        }));
    }

    // -- Lookups ------------------------------------------------------------

    /// `(seat, index)` of a general.
    pub(crate) fn locate(&self, id: GeneralId) -> Option<(usize, usize)> {
        self.state.players.iter().enumerate().find_map(|(seat, p)| {
            p.generals
                .iter()
                .position(|g| g.id == id)
                .map(|index| (seat, index))
        })
    }

    pub(crate) fn seat_of(&self, player_id: PlayerId) -> Option<usize> {
        self.state.players.iter().position(|p| p.id == player_id)
    }

    pub(crate) fn living_generals(&self, team: Team) -> Vec<GeneralId> {
        self.state
            .players
            .iter()
            .filter(|p| p.team == team)
            .flat_map(|p| p.generals.iter())
            .filter(|g| g.is_alive())
            .map(|g| g.id)
            .collect()
    }

    pub(crate) fn living_at(&self, position: Position) -> Vec<GeneralId> {
        self.state
            .players
            .iter()
            .flat_map(|p| p.generals.iter())
            .filter(|g| g.is_alive() && g.position == position)
            .map(|g| g.id)
            .collect()
    }

    // -- Effects ------------------------------------------------------------

    /// Applies one effect to one general and records what happened.
    /// Fallen or unknown targets are skipped.
    pub(crate) fn apply_effect(&mut self, kind: &EffectKind, target: GeneralId, source: &EffectSource) {
        let Some((seat, index)) = self.locate(target) else {
            return;
        };
        let general = &mut self.state.players[seat].generals[index];
        if !general.is_alive() {
            return;
        }

        let payload = match kind {
            EffectKind::Damage { amount } => {
                let amount = match source.attack {
                    Some(attack) => (amount + attack - general.modifier(Stat::Defense)).max(0),
                    None => *amount,
                };
                let dealt = general.take_damage(amount);
                EventPayload::Damaged {
                    target,
                    amount: dealt,
                    remaining_hp: general.current_hp,
                }
            }
            EffectKind::Heal { amount } => {
                let healed = general.heal(*amount);
                EventPayload::Healed {
                    target,
                    amount: healed,
                    current_hp: general.current_hp,
                }
            }
            EffectKind::ApplyBuff { buff } => {
                let buff = buff.instantiate(source.player);
                let payload = EventPayload::BuffApplied {
                    target,
                    buff_id: buff.id,
                    name: buff.name.clone(),
                };
                general.buffs.push(buff);
                payload
            }
            EffectKind::RemoveDebuffs => {
                let before = general.buffs.len();
                general.buffs.retain(|b| b.kind != BuffKind::Debuff);
                EventPayload::DebuffsRemoved {
                    target,
                    count: before - general.buffs.len(),
                }
            }
        };
        let fell = !general.is_alive();

        self.emit(source.event(payload));
        if fell {
            let player = &mut self.state.players[seat];
            player.refresh_alive();
            let owner = player.id;
            info!(room_id = %self.state.room_id, general_id = %target, player_id = %owner, "general fell");
            self.emit(GameEvent::new(EventPayload::GeneralFell { target }).by(owner));
        }
    }

    // -- Prepare ------------------------------------------------------------

    fn resolve_prepare(&mut self) {
        self.apply_terrain(TerrainTrigger::Stay, None);

        let points = self.rules.action_points;
        for player in &mut self.state.players {
            player.action_points = points;
            player.phase_done = false;
            for general in &mut player.generals {
                general.has_acted = false;
            }
        }

        if self.rules.enable_synergy {
            self.evaluate_synergies();
        }

        self.enter(Phase::Deploy);
        self.check_deploy_complete();
    }

    /// Fires every activated terrain's `trigger` effects on the living
    /// generals standing on it, optionally limited to one position.
    pub(crate) fn apply_terrain(&mut self, trigger: TerrainTrigger, only: Option<Position>) {
        let mut hits = Vec::new();
        for terrain in self.state.terrains.values() {
            if !terrain.is_activated || only.is_some_and(|pos| pos != terrain.position) {
                continue;
            }
            let occupants = self.living_at(terrain.position);
            for effect in terrain.effects.iter().filter(|e| e.trigger == trigger) {
                if let Some(kind) = effect.kind.as_effect() {
                    for &general in &occupants {
                        hits.push((kind.clone(), general, terrain.owner));
                    }
                }
            }
        }
        for (kind, general, owner) in hits {
            self.apply_effect(&kind, general, &EffectSource::ambient(owner));
        }
    }

    fn evaluate_synergies(&mut self) {
        let catalog = Arc::clone(&self.catalog);
        let mut hits = Vec::new();

        for (slot, def) in catalog.synergies().iter().enumerate() {
            let terrain_ok = def.terrain.as_ref().is_none_or(|key| {
                self.state
                    .terrains
                    .values()
                    .any(|t| t.is_activated && &t.key == key)
            });

            let mut active_for = Vec::new();
            for team in [Team::Red, Team::Blue] {
                let members: Option<Vec<GeneralId>> = def
                    .generals
                    .iter()
                    .map(|key| self.living_by_key(team, key))
                    .collect();
                let Some(members) = members.filter(|_| terrain_ok) else {
                    continue;
                };
                active_for.push(team);

                for effect in &def.effects {
                    let targets = match effect.target {
                        TargetScope::Caster | TargetScope::Ally | TargetScope::Targets => {
                            members.clone()
                        }
                        TargetScope::AllAllies => self.living_generals(team),
                        TargetScope::Enemy | TargetScope::AllEnemies => {
                            self.living_generals(team.opponent())
                        }
                    };
                    for general in targets {
                        hits.push((effect.kind.clone(), general));
                    }
                }
            }

            let Some(state) = self.state.synergies.get_mut(slot) else {
                continue;
            };
            let newly: Vec<Team> = active_for
                .iter()
                .filter(|t| !state.active_for.contains(t))
                .copied()
                .collect();
            state.active_for = active_for;
            for team in newly {
                info!(room_id = %self.state.room_id, synergy = %def.key, %team, "synergy activated");
                self.emit(GameEvent::new(EventPayload::SynergyActivated {
                    synergy: def.key.clone(),
                    team,
                }));
            }
        }

        for (kind, general) in hits {
            self.apply_effect(&kind, general, &EffectSource::ambient(None));
        }
    }

    fn living_by_key(&self, team: Team, key: &str) -> Option<GeneralId> {
        self.state
            .players
            .iter()
            .filter(|p| p.team == team)
            .flat_map(|p| p.generals.iter())
            .find(|g| g.is_alive() && g.key == key)
            .map(|g| g.id)
    }

    // -- Deploy / Combat ----------------------------------------------------

    pub(crate) fn check_deploy_complete(&mut self) {
        if self.state.current_phase != Phase::Deploy {
            return;
        }
        let all_ready = self
            .state
            .players
            .iter()
            .filter(|p| p.is_eligible())
            .all(|p| p.phase_done);
        if all_ready {
            self.begin_combat();
        }
    }

    fn begin_combat(&mut self) {
        self.enter(Phase::Combat);
        for player in &mut self.state.players {
            player.phase_done = false;
        }
        self.advance_turn(None);
    }

    /// Ends `player_id`'s combat turn if it is theirs.
    pub(crate) fn pass_turn(&mut self, player_id: PlayerId) {
        if self.state.current_phase != Phase::Combat || self.state.active_player != Some(player_id) {
            return;
        }
        let seat = self.seat_of(player_id);
        if let Some(seat) = seat {
            self.state.players[seat].phase_done = true;
        }
        self.state.active_player = None;
        self.advance_turn(seat);
    }

    /// Gives the turn to the next eligible seat after `after`. Players
    /// with no action points left are passed over. Enters EndRound when
    /// nobody is left.
    fn advance_turn(&mut self, after: Option<usize>) {
        let mut cursor = after;
        loop {
            let start = cursor.map_or(0, |seat| seat + 1);
            let next = (start..self.state.players.len()).find(|&seat| {
                let p = &self.state.players[seat];
                p.is_eligible() && !p.phase_done
            });
            match next {
                Some(seat) if self.state.players[seat].action_points == 0 => {
                    self.state.players[seat].phase_done = true;
                    cursor = Some(seat);
                }
                Some(seat) => {
                    let player_id = self.state.players[seat].id;
                    self.state.active_player = Some(player_id);
                    self.state.turn_seq += 1;
                    self.emit(GameEvent::new(EventPayload::TurnStarted).by(player_id));
                    return;
                }
                None => {
                    self.end_round();
                    return;
                }
            }
        }
    }

    // -- EndRound -----------------------------------------------------------

    fn end_round(&mut self) {
        self.state.active_player = None;
        self.enter(Phase::EndRound);

        self.tick_terrain();
        self.tick_buffs_and_cooldowns();

        let red = self.state.team_standing(Team::Red);
        let blue = self.state.team_standing(Team::Blue);
        match (red, blue) {
            (true, true) => {}
            (true, false) => return self.finish(Some(Team::Red), FinishReason::Elimination),
            (false, true) => return self.finish(Some(Team::Blue), FinishReason::Elimination),
            (false, false) => return self.finish(None, FinishReason::Elimination),
        }

        if self.state.round >= self.rules.round_ceiling {
            let winner = self.tiebreak();
            return self.finish(winner, FinishReason::RoundCeiling);
        }

        self.state.round += 1;
        self.enter(Phase::Prepare);
    }

    fn tick_terrain(&mut self) {
        let mut expired = Vec::new();
        for terrain in self.state.terrains.values_mut() {
            if terrain.duration > 0 {
                terrain.duration -= 1;
                if terrain.duration == 0 {
                    expired.push(terrain.position);
                }
            }
        }
        for position in expired {
            if let Some(terrain) = self.state.terrains.remove(&position) {
                debug!(room_id = %self.state.room_id, terrain = %terrain.key, %position, "terrain expired");
                self.emit(GameEvent::new(EventPayload::TerrainExpired {
                    terrain_id: terrain.id,
                    position,
                }));
            }
        }
    }

    fn tick_buffs_and_cooldowns(&mut self) {
        let mut expired = Vec::new();
        for general in self.state.players.iter_mut().flat_map(|p| p.generals.iter_mut()) {
            for buff in &mut general.buffs {
                if buff.duration > 0 {
                    buff.duration -= 1;
                    if buff.duration == 0 {
                        expired.push((general.id, buff.id));
                    }
                }
            }
            general.buffs.retain(|b| b.duration != 0);

            for skill in &mut general.skills {
                skill.current_cooldown = skill.current_cooldown.saturating_sub(1);
            }
        }
        for (target, buff_id) in expired {
            self.emit(GameEvent::new(EventPayload::BuffExpired { target, buff_id }));
        }
    }

    fn tiebreak(&self) -> Option<Team> {
        let team_of = |player_id: PlayerId| self.state.player(player_id).map(|p| p.team);
        let score = |team: Team| -> i64 {
            match self.rules.victory {
                VictoryCondition::KillLord => 0,
                VictoryCondition::TerrainControl => self
                    .state
                    .terrains
                    .values()
                    .filter(|t| t.owner.and_then(team_of) == Some(team))
                    .count() as i64,
                VictoryCondition::Resource => self
                    .state
                    .players
                    .iter()
                    .filter(|p| p.team == team)
                    .flat_map(|p| p.generals.iter())
                    .map(|g| i64::from(g.current_hp))
                    .sum(),
            }
        };
        let (red, blue) = (score(Team::Red), score(Team::Blue));
        match red.cmp(&blue) {
            std::cmp::Ordering::Greater => Some(Team::Red),
            std::cmp::Ordering::Less => Some(Team::Blue),
            std::cmp::Ordering::Equal => None,
        }
    }

    fn finish(&mut self, winner: Option<Team>, reason: FinishReason) {
        self.state.winner = winner;
        self.state.is_finished = true;
        self.enter(Phase::Finished);
        match winner {
            Some(team) => info!(room_id = %self.state.room_id, round = self.state.round, %team, ?reason, "match finished"),
            None => info!(room_id = %self.state.room_id, round = self.state.round, ?reason, "match finished in a draw"),
        }
        self.emit(GameEvent::new(EventPayload::GameOver { winner, reason }));
    }
}

/// Home row placement: red fills from the top row down, blue from the
/// bottom row up.
fn home_position(rules: &Rules, team: Team, slot: usize) -> Position {
    let width = rules.board_width.max(1) as usize;
    let x = (slot % width) as i32;
    let row = (slot / width) as i32;
    match team {
        Team::Red => Position::new(x, row),
        Team::Blue => Position::new(x, rules.board_height - 1 - row),
    }
}
