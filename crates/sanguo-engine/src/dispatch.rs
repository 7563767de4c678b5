//! Action validation and resolution.
//!
//! Checks run in a fixed order: the match is live, the phase allows the
//! action kind, the actor may act (participating, alive, owns what they
//! reference, holds the turn), then costs. Everything is checked before
//! anything is written, so a rejected action leaves the state exactly as
//! it was.

use tracing::debug;

use sanguo_protocol::PlayerId;

use crate::action::{Action, ActionKind, ActionRequest, ActionResponse, Rejection};
use crate::effect::{Effect, EffectKind, Stat, TargetScope, TerrainEffectKind, TerrainTrigger};
use crate::engine::{EffectSource, TurnEngine};
use crate::ids::{CardId, GeneralId};
use crate::model::{EventPayload, GameEvent, Phase, Position, SkillKind, Team};

type Plan = Vec<(EffectKind, GeneralId)>;

impl TurnEngine {
    /// Validates and applies one action.
    pub fn dispatch(&mut self, request: &ActionRequest) -> ActionResponse {
        let mark = self.state.events.len();
        let kind = request.action.kind();

        match self.try_dispatch(request) {
            Ok(message) => {
                self.settle_after(request.player_id);
                ActionResponse::accepted(message, self.events_since(mark))
            }
            Err(rejection) => {
                debug!(
                    room_id = %self.state.room_id,
                    player_id = %request.player_id,
                    action = %kind,
                    %rejection,
                    "action rejected"
                );
                rejection.into()
            }
        }
    }

    fn try_dispatch(&mut self, request: &ActionRequest) -> Result<String, Rejection> {
        if self.state.is_finished {
            return Err(Rejection::NotPlaying);
        }
        let kind = request.action.kind();
        let phase = self.state.current_phase;
        if !self.rules.phase_policy.permits(phase, kind) {
            return Err(Rejection::PhaseForbids { action: kind, phase });
        }
        let seat = self.check_actor(request.player_id)?;

        match &request.action {
            Action::PlayCard {
                card_id,
                general_id,
                targets,
            } => self.play_card(seat, *card_id, *general_id, targets),
            Action::UseSkill {
                general_id,
                skill_id,
                targets,
            } => self.use_skill(seat, *general_id, skill_id, targets),
            Action::Move { general_id, to } => self.move_general(seat, *general_id, *to),
            Action::DeployTerrain { terrain, position } => self.deploy_terrain(seat, terrain, *position),
            Action::EndPhase => Ok(self.end_phase(seat)),
        }
    }

    /// After a successful action: a Deploy may now be complete, and a
    /// combat turn passes once its player is out of points or out of the
    /// fight.
    fn settle_after(&mut self, player_id: PlayerId) {
        match self.state.current_phase {
            Phase::Deploy => self.check_deploy_complete(),
            Phase::Combat if self.state.active_player == Some(player_id) => {
                let spent = self
                    .state
                    .player(player_id)
                    .is_none_or(|p| p.action_points == 0 || !p.is_eligible());
                if spent {
                    self.pass_turn(player_id);
                }
            }
            _ => {}
        }
    }

    // -- Checks -------------------------------------------------------------

    fn check_actor(&self, player_id: PlayerId) -> Result<usize, Rejection> {
        let seat = self
            .seat_of(player_id)
            .ok_or(Rejection::NotParticipating(player_id))?;
        let player = &self.state.players[seat];
        if !player.participating {
            return Err(Rejection::NotParticipating(player_id));
        }
        if !player.is_alive {
            return Err(Rejection::Eliminated(player_id));
        }
        match self.state.current_phase {
            Phase::Combat if self.state.active_player != Some(player_id) => {
                Err(Rejection::NotYourTurn(player_id))
            }
            Phase::Deploy if player.phase_done => Err(Rejection::PhaseAlreadyEnded(player_id)),
            _ => Ok(seat),
        }
    }

    /// Index of `general_id` among the seat's generals, if it may act.
    fn check_general(&self, seat: usize, general_id: GeneralId) -> Result<usize, Rejection> {
        let player = &self.state.players[seat];
        let index = player
            .generals
            .iter()
            .position(|g| g.id == general_id)
            .ok_or(Rejection::NotOwner {
                general: general_id,
                player: player.id,
            })?;
        let general = &player.generals[index];
        if !general.is_alive() {
            return Err(Rejection::GeneralFallen(general_id));
        }
        if general.has_acted {
            return Err(Rejection::AlreadyActed(general_id));
        }
        Ok(index)
    }

    fn check_cost(&self, seat: usize, need: u32) -> Result<(), Rejection> {
        let have = self.state.players[seat].action_points;
        if have < need {
            return Err(Rejection::NotEnoughActionPoints { need, have });
        }
        Ok(())
    }

    /// Works out who every effect lands on, without touching anything.
    fn plan_effects(
        &self,
        seat: usize,
        caster: GeneralId,
        effects: &[Effect],
        requested: &[GeneralId],
    ) -> Result<Plan, Rejection> {
        let team = self.state.players[seat].team;
        let team_of = |id: GeneralId| self.locate(id).map(|(s, _)| self.state.players[s].team);

        for &id in requested {
            if !self.state.general(id).is_some_and(|g| g.is_alive()) {
                return Err(Rejection::InvalidTarget(id));
            }
        }
        let first_on = |side: Team| {
            requested
                .iter()
                .copied()
                .find(|&id| team_of(id) == Some(side))
        };

        let mut plan = Vec::new();
        for effect in effects {
            let targets = match effect.target {
                TargetScope::Caster => vec![caster],
                TargetScope::Ally => vec![first_on(team).ok_or(Rejection::MissingTarget(TargetScope::Ally))?],
                TargetScope::Enemy => vec![
                    first_on(team.opponent()).ok_or(Rejection::MissingTarget(TargetScope::Enemy))?,
                ],
                TargetScope::AllAllies => self.living_generals(team),
                TargetScope::AllEnemies => self.living_generals(team.opponent()),
                TargetScope::Targets if requested.is_empty() => {
                    return Err(Rejection::MissingTarget(TargetScope::Targets));
                }
                TargetScope::Targets => requested.to_vec(),
            };
            plan.extend(targets.into_iter().map(|t| (effect.kind.clone(), t)));
        }
        Ok(plan)
    }

    fn source(&self, seat: usize, general_index: usize, action: ActionKind) -> EffectSource {
        let player = &self.state.players[seat];
        let general = &player.generals[general_index];
        EffectSource {
            player: Some(player.id),
            general: Some(general.id),
            action: Some(action),
            attack: Some(general.modifier(Stat::Attack)),
        }
    }

    // -- Actions ------------------------------------------------------------

    fn play_card(
        &mut self,
        seat: usize,
        card_id: CardId,
        general_id: GeneralId,
        targets: &[GeneralId],
    ) -> Result<String, Rejection> {
        let gi = self.check_general(seat, general_id)?;
        let card_index = self.state.players[seat]
            .hand
            .iter()
            .position(|c| c.id == card_id)
            .ok_or(Rejection::CardNotInHand(card_id))?;
        let cost = self.rules.card_cost;
        self.check_cost(seat, cost)?;
        let plan = self.plan_effects(
            seat,
            general_id,
            &self.state.players[seat].hand[card_index].effects,
            targets,
        )?;

        let source = self.source(seat, gi, ActionKind::PlayCard);
        let player = &mut self.state.players[seat];
        let card = player.hand.remove(card_index);
        player.action_points -= cost;
        player.generals[gi].has_acted = true;

        let message = format!("{} played {}", player.generals[gi].name, card.name);
        self.emit(source.event(
            EventPayload::CardPlayed {
                card_id,
                card: card.key,
            },
        ));
        self.apply_plan(plan, &source);
        Ok(message)
    }

    fn use_skill(
        &mut self,
        seat: usize,
        general_id: GeneralId,
        skill_id: &str,
        targets: &[GeneralId],
    ) -> Result<String, Rejection> {
        let gi = self.check_general(seat, general_id)?;
        let general = &self.state.players[seat].generals[gi];
        let si = general
            .skills
            .iter()
            .position(|s| s.key == skill_id)
            .ok_or_else(|| Rejection::UnknownSkill {
                general: general_id,
                skill: skill_id.to_owned(),
            })?;
        let skill = &general.skills[si];
        if skill.kind != SkillKind::Active {
            return Err(Rejection::NotActivatable(skill.key.clone()));
        }
        if skill.current_cooldown > 0 {
            return Err(Rejection::OnCooldown {
                skill: skill.key.clone(),
                rounds: skill.current_cooldown,
            });
        }
        let cost = self.rules.skill_cost;
        self.check_cost(seat, cost)?;
        let plan = self.plan_effects(seat, general_id, &skill.effects, targets)?;

        let source = self.source(seat, gi, ActionKind::UseSkill);
        let player = &mut self.state.players[seat];
        player.action_points -= cost;
        let general = &mut player.generals[gi];
        general.has_acted = true;
        let skill = &mut general.skills[si];
        skill.current_cooldown = skill.cooldown;

        let message = format!("{} used {}", general.name, skill.name);
        let key = skill.key.clone();
        self.emit(source.event(EventPayload::SkillUsed { skill: key }));
        self.apply_plan(plan, &source);
        Ok(message)
    }

    fn move_general(&mut self, seat: usize, general_id: GeneralId, to: Position) -> Result<String, Rejection> {
        let gi = self.check_general(seat, general_id)?;
        if !self.rules.on_board(to) {
            return Err(Rejection::OffBoard(to));
        }
        let general = &self.state.players[seat].generals[gi];
        let from = general.position;
        let range = (self.rules.move_range as i32 + general.modifier(Stat::Movement)).max(1) as u32;
        if from.distance(to) > range {
            return Err(Rejection::OutOfRange { from, to, range });
        }
        if from == to || !self.living_at(to).is_empty() {
            return Err(Rejection::Occupied(to));
        }
        let extra: u32 = self
            .state
            .terrains
            .get(&to)
            .filter(|t| t.is_activated)
            .map(|t| {
                t.effects
                    .iter()
                    .filter_map(|e| match e.kind {
                        TerrainEffectKind::MovementLimit { extra_cost } => Some(extra_cost),
                        _ => None,
                    })
                    .sum::<u32>()
            })
            .unwrap_or(0);
        let cost = self.rules.move_cost + extra;
        self.check_cost(seat, cost)?;

        let source = self.source(seat, gi, ActionKind::Move);
        let player = &mut self.state.players[seat];
        player.action_points -= cost;
        let general = &mut player.generals[gi];
        general.position = to;
        let message = format!("{} moved to {to}", general.name);

        self.emit(source.event(EventPayload::GeneralMoved { from, to, cost }));
        self.apply_terrain(TerrainTrigger::Enter, Some(to));
        Ok(message)
    }

    fn deploy_terrain(&mut self, seat: usize, key: &str, position: Position) -> Result<String, Rejection> {
        if !self.rules.on_board(position) {
            return Err(Rejection::OffBoard(position));
        }
        if self.state.terrains.contains_key(&position) {
            return Err(Rejection::TerrainPresent(position));
        }
        let def = self
            .catalog
            .terrain(key)
            .ok_or_else(|| Rejection::UnknownTerrain(key.to_owned()))?;
        let cost = self.rules.deploy_cost;
        self.check_cost(seat, cost)?;

        let player_id = self.state.players[seat].id;
        let terrain = def.instantiate(position, Some(player_id));
        self.state.players[seat].action_points -= cost;

        let message = format!("{} deployed at {position}", terrain.name);
        let event = GameEvent::new(EventPayload::TerrainDeployed {
            terrain_id: terrain.id,
            terrain: terrain.key.clone(),
            position,
        })
        .by(player_id)
        .from_action(ActionKind::DeployTerrain);
        self.state.terrains.insert(position, terrain);
        self.emit(event);
        Ok(message)
    }

    fn end_phase(&mut self, seat: usize) -> String {
        let player_id = self.state.players[seat].id;
        self.emit(
            GameEvent::new(EventPayload::PhaseEnded)
                .by(player_id)
                .from_action(ActionKind::EndPhase),
        );
        match self.state.current_phase {
            Phase::Combat => {
                self.pass_turn(player_id);
                "turn ended".to_owned()
            }
            _ => {
                self.state.players[seat].phase_done = true;
                "ready for combat".to_owned()
            }
        }
    }

    fn apply_plan(&mut self, plan: Plan, source: &EffectSource) {
        for (kind, target) in plan {
            self.apply_effect(&kind, target, source);
        }
    }
}
