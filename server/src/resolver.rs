//! Validates and applies player actions against a match.
//!
//! Every action is checked in full before anything is written, and the
//! registry runs the resolver on a draft copy, so a rejected action never
//! leaves a trace. Turn order is enforced only by comparing the submitter
//! with the current player: out-of-turn submissions are rejected on the
//! spot rather than queued.

use crate::ability;
use crate::error::{GameError, MoveRejection};
use crate::game::{Match, TurnRotation};
use crate::registry::SessionRegistry;
use log::debug;
use shared::{ActionRequest, MatchSnapshot, Position};
use std::sync::Arc;
use std::time::Duration;

/// A validated player request, ready to be resolved against a match
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Step to an orthogonally adjacent free cell for one action point
    Move { target: Position },
    /// Cast a known ability at whatever entity stands on `target`
    UseAbility { ability_id: String, target: Position },
    /// Hand the turn to the next player
    EndTurn,
}

impl Action {
    /// The wire name of the action type, echoed back in `action_result`.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Move { .. } => "Move",
            Action::UseAbility { .. } => "UseAbility",
            Action::EndTurn => "EndTurn",
        }
    }

    /// Builds an action from a `submit_action` payload.
    ///
    /// # Errors
    /// `BadRequest` when a required field is missing, `InvalidActionType`
    /// when `type` names no known action.
    pub fn from_request(request: &ActionRequest) -> Result<Self, GameError> {
        let target = || {
            request
                .target_position
                .ok_or_else(|| GameError::BadRequest("targetPosition is required".to_string()))
        };

        match request.action_type.as_str() {
            "Move" => Ok(Action::Move { target: target()? }),
            "UseAbility" => {
                let ability_id = request
                    .ability_id
                    .clone()
                    .ok_or_else(|| GameError::BadRequest("abilityId is required".to_string()))?;
                Ok(Action::UseAbility {
                    ability_id,
                    target: target()?,
                })
            }
            "EndTurn" => Ok(Action::EndTurn),
            other => Err(GameError::InvalidActionType(other.to_string())),
        }
    }
}

/// What a successful action changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Moved {
        to: Position,
        action_points: u32,
    },
    AbilityUsed {
        ability_id: String,
        target_id: String,
        target_health: i32,
        action_points: u32,
    },
    TurnEnded(TurnRotation),
}

impl ActionOutcome {
    /// Short human-readable summary for the submitter.
    pub fn describe(&self) -> String {
        match self {
            ActionOutcome::Moved { to, .. } => format!("moved to ({}, {})", to.x, to.y),
            ActionOutcome::AbilityUsed {
                ability_id,
                target_id,
                target_health,
                ..
            } => format!("{} hit {} (health {})", ability_id, target_id, target_health),
            ActionOutcome::TurnEnded(rotation) => {
                format!("turn passed to {}", rotation.current_player)
            }
        }
    }

    /// The turn change, if the action ended the turn.
    pub fn rotation(&self) -> Option<&TurnRotation> {
        match self {
            ActionOutcome::TurnEnded(rotation) => Some(rotation),
            _ => None,
        }
    }
}

/// Everything the caller needs after a successful action, captured before the
/// match lock is released.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReport {
    pub outcome: ActionOutcome,
    pub finished: bool,
    pub players: Vec<String>,
    pub snapshot: MatchSnapshot,
}

/// Decides whether a match has reached its end. Runs after every successful
/// action; returning true marks the match `Finished`.
pub trait TerminalCheck: Send + Sync {
    fn is_terminal(&self, game: &Match) -> bool;
}

/// The default: matches never end on their own.
pub struct NeverTerminal;

impl TerminalCheck for NeverTerminal {
    fn is_terminal(&self, _game: &Match) -> bool {
        false
    }
}

impl<F> TerminalCheck for F
where
    F: Fn(&Match) -> bool + Send + Sync,
{
    fn is_terminal(&self, game: &Match) -> bool {
        self(game)
    }
}

/// Applies actions to matches under the registry's per-match lock
///
/// Holds the per-turn action point allowance granted on every rotation and
/// the terminal check consulted after every successful action.
pub struct ActionResolver {
    action_points_per_turn: u32,
    terminal: Arc<dyn TerminalCheck>,
}

impl ActionResolver {
    /// A resolver whose matches never end on their own.
    pub fn new(action_points_per_turn: u32) -> Self {
        Self::with_terminal_check(action_points_per_turn, Arc::new(NeverTerminal))
    }

    /// A resolver that finishes a match once `terminal` reports true.
    pub fn with_terminal_check(action_points_per_turn: u32, terminal: Arc<dyn TerminalCheck>) -> Self {
        Self {
            action_points_per_turn,
            terminal,
        }
    }

    /// Runs `action` for `player_id` against the stored match.
    pub async fn submit(
        &self,
        registry: &SessionRegistry,
        match_id: &str,
        player_id: &str,
        action: Action,
    ) -> Result<ActionReport, GameError> {
        registry
            .mutate(match_id, |game| {
                let outcome = self.apply(game, player_id, &action)?;
                Ok(self.report(game, outcome))
            })
            .await
    }

    /// Ends the current turn on behalf of a player who let it run past
    /// `timeout`. Returns `None` when the turn is not overdue or the match is
    /// not in progress.
    pub async fn expire_turn(
        &self,
        registry: &SessionRegistry,
        match_id: &str,
        timeout: Duration,
    ) -> Result<Option<ActionReport>, GameError> {
        registry
            .mutate(match_id, |game| {
                let Some(stalling) = game.current_player().map(str::to_string) else {
                    return Ok(None);
                };
                if game.turn_elapsed() < timeout {
                    return Ok(None);
                }

                debug!("Turn of {} in match {} timed out", stalling, game.id());
                let outcome = self.apply(game, &stalling, &Action::EndTurn)?;
                Ok(Some(self.report(game, outcome)))
            })
            .await
    }

    /// Validates and applies one action to `game`.
    ///
    /// The caller must be the current player; this also rejects every action
    /// against a match that has not started or has finished. On success the
    /// terminal check runs and may finish the match.
    ///
    /// # Errors
    /// `WrongTurn` for anyone but the current player, otherwise the
    /// action-specific rejection. `game` may be partially written on error,
    /// which is why callers go through [`SessionRegistry::mutate`].
    pub fn apply(
        &self,
        game: &mut Match,
        player_id: &str,
        action: &Action,
    ) -> Result<ActionOutcome, GameError> {
        if game.current_player() != Some(player_id) {
            return Err(GameError::WrongTurn);
        }
        if !game.contains_player(player_id) || game.entity(player_id).is_none() {
            return Err(GameError::PlayerNotFound(player_id.to_string()));
        }

        let outcome = match action {
            Action::Move { target } => self.apply_move(game, player_id, *target)?,
            Action::UseAbility { ability_id, target } => {
                self.apply_ability(game, player_id, ability_id, *target)?
            }
            Action::EndTurn => {
                ActionOutcome::TurnEnded(game.advance_turn(self.action_points_per_turn)?)
            }
        };

        if self.terminal.is_terminal(game) {
            game.finish();
        }

        Ok(outcome)
    }

    fn apply_move(
        &self,
        game: &mut Match,
        player_id: &str,
        target: Position,
    ) -> Result<ActionOutcome, GameError> {
        let (origin, available) = actor_state(game, player_id)?;

        if !origin.is_adjacent(&target) {
            return Err(GameError::InvalidMove(MoveRejection::NotAdjacent));
        }
        if !game.grid().contains(&target) {
            return Err(GameError::InvalidMove(MoveRejection::OutOfBounds));
        }
        if available == 0 {
            return Err(GameError::InsufficientActionPoints {
                needed: 1,
                available,
            });
        }
        if game
            .occupant_at(&target)
            .is_some_and(|occupant| occupant.id() != player_id)
        {
            return Err(GameError::InvalidMove(MoveRejection::CellOccupied));
        }

        let actor = game
            .entity_mut(player_id)
            .ok_or_else(|| GameError::PlayerNotFound(player_id.to_string()))?;
        actor.set_position(target);
        let action_points = spend(actor, 1)?;

        Ok(ActionOutcome::Moved {
            to: target,
            action_points,
        })
    }

    fn apply_ability(
        &self,
        game: &mut Match,
        player_id: &str,
        ability_id: &str,
        target: Position,
    ) -> Result<ActionOutcome, GameError> {
        let ability = ability::lookup(ability_id)
            .ok_or_else(|| GameError::AbilityNotFound(ability_id.to_string()))?;

        let known = game
            .entity(player_id)
            .and_then(|entity| entity.player_data())
            .is_some_and(|data| data.abilities.contains(ability_id));
        if !known {
            return Err(GameError::AbilityNotOwned(ability_id.to_string()));
        }

        let (origin, available) = actor_state(game, player_id)?;
        if available < ability.cost {
            return Err(GameError::InsufficientActionPoints {
                needed: ability.cost,
                available,
            });
        }

        let distance = origin.manhattan_distance(&target);
        if !ability.in_range(distance) {
            return Err(GameError::OutOfRange {
                distance,
                min: ability.min_range,
                max: ability.max_range,
            });
        }

        let target_id = game
            .occupant_at(&target)
            .map(|entity| entity.id().to_string())
            .ok_or(GameError::NoValidTarget)?;

        debug!("{} casts {} on {}", player_id, ability.name, target_id);

        // Self-targeting is allowed; the cost is paid whoever is hit
        let target_entity = game.entity_mut(&target_id).ok_or(GameError::NoValidTarget)?;
        target_entity.apply_magnitude(ability.magnitude);
        let target_health = target_entity.health();

        let actor = game
            .entity_mut(player_id)
            .ok_or_else(|| GameError::PlayerNotFound(player_id.to_string()))?;
        let action_points = spend(actor, ability.cost)?;

        Ok(ActionOutcome::AbilityUsed {
            ability_id: ability.id.to_string(),
            target_id,
            target_health,
            action_points,
        })
    }

    fn report(&self, game: &Match, outcome: ActionOutcome) -> ActionReport {
        ActionReport {
            outcome,
            finished: game.status() == shared::MatchStatus::Finished,
            players: game.players().to_vec(),
            snapshot: game.snapshot(),
        }
    }
}

fn actor_state(game: &Match, player_id: &str) -> Result<(Position, u32), GameError> {
    let actor = game
        .entity(player_id)
        .ok_or_else(|| GameError::PlayerNotFound(player_id.to_string()))?;
    let data = actor
        .player_data()
        .ok_or_else(|| GameError::PlayerNotFound(player_id.to_string()))?;
    Ok((actor.position(), data.action_points))
}

fn spend(actor: &mut crate::entity::Entity, cost: u32) -> Result<u32, GameError> {
    let id = actor.id().to_string();
    let data = actor
        .player_data_mut()
        .ok_or(GameError::PlayerNotFound(id))?;
    data.action_points = data.action_points.saturating_sub(cost);
    Ok(data.action_points)
}
