//! One authoritative game session.
//!
//! A `Match` owns its players, every placed entity and the board geometry.
//! Status follows the player count: fewer than two players means
//! `WaitingForPlayers`, two players with a current-player pointer means
//! `InProgress`. `Finished` is only reached through the terminal hook.

use crate::ability::STARTING_ABILITIES;
use crate::entity::Entity;
use crate::error::{GameError, MoveRejection};
use crate::grid::Grid;
use log::info;
use shared::{
    LobbyInfo, MatchSnapshot, MatchStatus, MatchSummary, PlayerView, Position, Slot, MAX_PLAYERS,
    PLAYER_MAX_HEALTH,
};
use std::time::{Duration, Instant};

/// Result of admitting a player into a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub slot: Slot,
    /// False when the player was already seated (idempotent re-join).
    pub newly_admitted: bool,
}

/// How the turn moved after an `EndTurn` or a timeout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRotation {
    pub previous_player: String,
    pub current_player: String,
    /// Turn counter after the rotation.
    pub turn: u32,
    /// True when play returned to the opening player.
    pub wrapped: bool,
}

/// One two-player match: seats, entities on the grid and whose turn it is
///
/// A match is only ever changed through `SessionRegistry::mutate`, which
/// works on a clone. Every field is therefore plain owned data.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    id: String,
    sequence: u64,
    /// Player identities in slot order.
    players: Vec<String>,
    /// Every placed entity, players included.
    entities: Vec<Entity>,
    grid: Grid,
    turn: u32,
    current_player: Option<String>,
    /// Index into `players` of whoever opens each round.
    first_player: usize,
    status: MatchStatus,
    turn_started_at: Instant,
}

impl Match {
    /// An empty match waiting for players. `sequence` orders matches by
    /// creation so matchmaking can fill the oldest first.
    pub fn new(id: String, sequence: u64, grid: Grid) -> Self {
        Self {
            id,
            sequence,
            players: Vec::with_capacity(MAX_PLAYERS),
            entities: Vec::new(),
            grid,
            turn: 0,
            current_player: None,
            first_player: 0,
            status: MatchStatus::WaitingForPlayers,
            turn_started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Creation order within the owning registry.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn status(&self) -> MatchStatus {
        self.status
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn current_player(&self) -> Option<&str> {
        self.current_player.as_deref()
    }

    pub fn players(&self) -> &[String] {
        &self.players
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS
    }

    pub fn contains_player(&self, player_id: &str) -> bool {
        self.players.iter().any(|id| id == player_id)
    }

    pub fn slot_of(&self, player_id: &str) -> Option<Slot> {
        self.players
            .iter()
            .position(|id| id == player_id)
            .and_then(Slot::from_index)
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.id() == id)
    }

    pub fn entity_mut(&mut self, id: &str) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|entity| entity.id() == id)
    }

    /// The entity standing on `position`, derived from entity positions.
    pub fn occupant_at(&self, position: &Position) -> Option<&Entity> {
        self.grid.occupant_at(&self.entities, position)
    }

    /// Time since the current player was granted the turn.
    pub fn turn_elapsed(&self) -> Duration {
        self.turn_started_at.elapsed()
    }

    /// Places a non-player entity on a free in-bounds cell.
    pub fn place_entity(&mut self, entity: Entity) -> Result<(), GameError> {
        let position = entity.position();
        if !self.grid.contains(&position) {
            return Err(GameError::InvalidMove(MoveRejection::OutOfBounds));
        }
        if self.grid.is_occupied(&self.entities, &position) {
            return Err(GameError::InvalidMove(MoveRejection::CellOccupied));
        }
        if self.entity(entity.id()).is_some() {
            return Err(GameError::BadRequest(format!(
                "entity {} already exists",
                entity.id()
            )));
        }
        self.entities.push(entity);
        Ok(())
    }

    /// Seats a player in the next free slot at that slot's spawn corner.
    ///
    /// Re-admitting an identity that is already seated is a no-op.
    pub fn admit_player(&mut self, player_id: &str, name: &str) -> Result<Admission, GameError> {
        if let Some(slot) = self.slot_of(player_id) {
            return Ok(Admission {
                slot,
                newly_admitted: false,
            });
        }

        if self.is_full() || self.status != MatchStatus::WaitingForPlayers {
            return Err(GameError::MatchFull(self.id.clone()));
        }

        let slot = Slot::from_index(self.players.len())
            .ok_or_else(|| GameError::MatchFull(self.id.clone()))?;
        let spawn = self.grid.spawn_point(slot);
        if self.grid.is_occupied(&self.entities, &spawn) {
            return Err(GameError::InvalidMove(MoveRejection::CellOccupied));
        }

        let player = Entity::player(player_id, name, spawn, PLAYER_MAX_HEALTH, STARTING_ABILITIES);
        self.entities.push(player);
        self.players.push(player_id.to_string());

        info!(
            "Player {} joined match {} as {:?} at ({}, {})",
            player_id, self.id, slot, spawn.x, spawn.y
        );

        Ok(Admission {
            slot,
            newly_admitted: true,
        })
    }

    /// Removes a player from a match that has not started yet.
    pub fn remove_waiting_player(&mut self, player_id: &str) -> bool {
        if self.status != MatchStatus::WaitingForPlayers || !self.contains_player(player_id) {
            return false;
        }

        self.players.retain(|id| id != player_id);
        self.entities.retain(|entity| entity.id() != player_id);

        // Remaining players slide down one slot and take that slot's corner.
        for (index, id) in self.players.clone().iter().enumerate() {
            if let Some(slot) = Slot::from_index(index) {
                let spawn = self.grid.spawn_point(slot);
                if let Some(entity) = self.entity_mut(id) {
                    entity.set_position(spawn);
                }
            }
        }

        info!("Player {} left waiting match {}", player_id, self.id);
        true
    }

    /// Starts play once both seats are taken. `first_player` is the slot index
    /// that opens every round.
    pub fn start(&mut self, first_player: usize, action_points: u32) -> Result<(), GameError> {
        if !self.is_full() {
            return Err(GameError::BadRequest(format!(
                "match {} needs {} players to start",
                self.id, MAX_PLAYERS
            )));
        }

        let first_player = first_player % self.players.len();
        let opener = self.players[first_player].clone();

        self.first_player = first_player;
        self.status = MatchStatus::InProgress;
        self.grant_turn(&opener, action_points);

        info!("Match {} started, {} opens", self.id, opener);
        Ok(())
    }

    /// Hands the turn to the next player in order. The turn counter advances
    /// when play returns to the opening player.
    pub fn advance_turn(&mut self, action_points: u32) -> Result<TurnRotation, GameError> {
        let previous = self.current_player.clone().ok_or(GameError::WrongTurn)?;
        let index = self
            .players
            .iter()
            .position(|id| *id == previous)
            .ok_or_else(|| GameError::PlayerNotFound(previous.clone()))?;

        let next = (index + 1) % self.players.len();
        let wrapped = next == self.first_player;
        if wrapped {
            self.turn += 1;
        }

        let current = self.players[next].clone();
        self.grant_turn(&current, action_points);

        Ok(TurnRotation {
            previous_player: previous,
            current_player: current,
            turn: self.turn,
            wrapped,
        })
    }

    /// Ends the match. Clearing the current player makes every later
    /// action fail with `WrongTurn`.
    pub fn finish(&mut self) {
        self.status = MatchStatus::Finished;
        self.current_player = None;
        info!("Match {} finished after turn {}", self.id, self.turn);
    }

    fn grant_turn(&mut self, player_id: &str, action_points: u32) {
        if let Some(data) = self
            .entity_mut(player_id)
            .and_then(|entity| entity.player_data_mut())
        {
            data.action_points = action_points;
        }
        self.current_player = Some(player_id.to_string());
        self.turn_started_at = Instant::now();
    }

    pub fn player_views(&self) -> Vec<PlayerView> {
        self.players
            .iter()
            .enumerate()
            .filter_map(|(index, id)| {
                let slot = Slot::from_index(index)?;
                self.entity(id)?.to_player_view(slot)
            })
            .collect()
    }

    /// Full view of the match as sent in `lobby_state` and friends.
    ///
    /// `turn_order` starts with the opening player; the grid occupancy is
    /// rebuilt from entity positions.
    pub fn snapshot(&self) -> MatchSnapshot {
        let turn_order = (0..self.players.len())
            .map(|offset| self.players[(self.first_player + offset) % self.players.len()].clone())
            .collect();

        MatchSnapshot {
            match_id: self.id.clone(),
            status: self.status,
            turn: self.turn,
            current_player_id: self.current_player.clone(),
            turn_order,
            players: self.player_views(),
            entities: self.entities.iter().map(Entity::to_view).collect(),
            grid: self.grid.view(&self.entities),
        }
    }

    /// Lightweight listing entry for `match_list`.
    pub fn summary(&self) -> MatchSummary {
        MatchSummary {
            id: self.id.clone(),
            player_count: self.players.len(),
            max_players: MAX_PLAYERS,
            status: self.status,
        }
    }

    /// The lobby payload addressed to `player_id`, or `None` if they are
    /// not seated here.
    pub fn lobby_info(&self, player_id: &str) -> Option<LobbyInfo> {
        Some(LobbyInfo {
            match_id: self.id.clone(),
            players: self.player_views(),
            slot: self.slot_of(player_id)?,
            my_player_id: player_id.to_string(),
            current_player_id: self.current_player.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_match() -> Match {
        Match::new("match-test".to_string(), 1, Grid::new(10, 10))
    }

    fn started_match() -> Match {
        let mut game = new_match();
        game.admit_player("p1", "Alice").unwrap();
        game.admit_player("p2", "Bob").unwrap();
        game.start(0, 5).unwrap();
        game
    }

    fn action_points(game: &Match, id: &str) -> u32 {
        game.entity(id).unwrap().player_data().unwrap().action_points
    }

    #[test]
    fn test_new_match_is_waiting() {
        let game = new_match();
        assert_eq!(game.status(), MatchStatus::WaitingForPlayers);
        assert_eq!(game.turn(), 0);
        assert!(game.current_player().is_none());
        assert_eq!(game.player_count(), 0);
    }

    #[test]
    fn test_admission_uses_positional_slots() {
        let mut game = new_match();

        let first = game.admit_player("p1", "Alice").unwrap();
        assert_eq!(first.slot, Slot::Player1);
        assert_eq!(game.entity("p1").unwrap().position(), Position::new(0, 0));

        let second = game.admit_player("p2", "Bob").unwrap();
        assert_eq!(second.slot, Slot::Player2);
        assert_eq!(game.entity("p2").unwrap().position(), Position::new(9, 9));

        // Admission alone does not start the match
        assert_eq!(game.status(), MatchStatus::WaitingForPlayers);
    }

    #[test]
    fn test_readmission_is_idempotent() {
        let mut game = new_match();
        game.admit_player("p1", "Alice").unwrap();
        let again = game.admit_player("p1", "Alice").unwrap();

        assert!(!again.newly_admitted);
        assert_eq!(again.slot, Slot::Player1);
        assert_eq!(game.player_count(), 1);
        assert_eq!(game.entities().len(), 1);
    }

    #[test]
    fn test_third_player_is_rejected() {
        let mut game = started_match();
        assert_eq!(
            game.admit_player("p3", "Carol"),
            Err(GameError::MatchFull("match-test".to_string()))
        );
    }

    #[test]
    fn test_start_grants_opener_action_points() {
        let game = started_match();
        assert_eq!(game.status(), MatchStatus::InProgress);
        assert_eq!(game.current_player(), Some("p1"));
        assert_eq!(action_points(&game, "p1"), 5);
        assert_eq!(action_points(&game, "p2"), 0);
    }

    #[test]
    fn test_start_requires_two_players() {
        let mut game = new_match();
        game.admit_player("p1", "Alice").unwrap();
        assert!(game.start(0, 5).is_err());
        assert_eq!(game.status(), MatchStatus::WaitingForPlayers);
    }

    #[test]
    fn test_turn_rotation_wraps_to_opener() {
        let mut game = started_match();

        let rotation = game.advance_turn(5).unwrap();
        assert_eq!(rotation.current_player, "p2");
        assert!(!rotation.wrapped);
        assert_eq!(game.turn(), 0);
        assert_eq!(action_points(&game, "p2"), 5);

        let rotation = game.advance_turn(5).unwrap();
        assert_eq!(rotation.current_player, "p1");
        assert!(rotation.wrapped);
        assert_eq!(game.turn(), 1);
    }

    #[test]
    fn test_rotation_with_second_player_opening() {
        let mut game = new_match();
        game.admit_player("p1", "Alice").unwrap();
        game.admit_player("p2", "Bob").unwrap();
        game.start(1, 5).unwrap();

        assert_eq!(game.current_player(), Some("p2"));
        assert_eq!(game.snapshot().turn_order, vec!["p2", "p1"]);

        game.advance_turn(5).unwrap();
        assert_eq!(game.turn(), 0);
        game.advance_turn(5).unwrap();
        assert_eq!(game.current_player(), Some("p2"));
        assert_eq!(game.turn(), 1);
    }

    #[test]
    fn test_remove_waiting_player() {
        let mut game = new_match();
        game.admit_player("p1", "Alice").unwrap();

        assert!(game.remove_waiting_player("p1"));
        assert_eq!(game.player_count(), 0);
        assert!(game.entities().is_empty());

        // The freed match accepts a new first player
        let admission = game.admit_player("p3", "Carol").unwrap();
        assert_eq!(admission.slot, Slot::Player1);
    }

    #[test]
    fn test_started_match_keeps_departed_players() {
        let mut game = started_match();
        assert!(!game.remove_waiting_player("p2"));
        assert_eq!(game.player_count(), 2);
    }

    #[test]
    fn test_place_entity_validates_cell() {
        let mut game = started_match();

        let rock = Entity::actor("rock", "obstacle", Position::new(4, 4), 50, None);
        assert!(game.place_entity(rock).is_ok());

        let blocked = Entity::actor("crate", "obstacle", Position::new(4, 4), 5, None);
        assert_eq!(
            game.place_entity(blocked),
            Err(GameError::InvalidMove(MoveRejection::CellOccupied))
        );

        let outside = Entity::actor("crate", "obstacle", Position::new(10, 4), 5, None);
        assert_eq!(
            game.place_entity(outside),
            Err(GameError::InvalidMove(MoveRejection::OutOfBounds))
        );
    }

    #[test]
    fn test_snapshot_is_consistent() {
        let mut game = started_match();
        game.place_entity(Entity::actor("rock", "obstacle", Position::new(2, 3), 50, None))
            .unwrap();
        let snapshot = game.snapshot();

        assert_eq!(snapshot.players.len(), 2);
        assert_eq!(snapshot.entities.len(), 3);
        assert_eq!(snapshot.current_player_id.as_deref(), Some("p1"));
        assert_eq!(snapshot.grid.cells[0][0].as_deref(), Some("p1"));
        assert_eq!(snapshot.grid.cells[9][9].as_deref(), Some("p2"));
        assert_eq!(snapshot.grid.cells[3][2].as_deref(), Some("rock"));
    }

    #[test]
    fn test_finish_clears_current_player() {
        let mut game = started_match();
        game.finish();
        assert_eq!(game.status(), MatchStatus::Finished);
        assert!(game.current_player().is_none());
        assert_eq!(game.summary().status, MatchStatus::Finished);
    }

    #[test]
    fn test_lobby_info() {
        let game = started_match();
        let info = game.lobby_info("p2").unwrap();
        assert_eq!(info.slot, Slot::Player2);
        assert_eq!(info.my_player_id, "p2");
        assert_eq!(info.current_player_id.as_deref(), Some("p1"));
        assert!(game.lobby_info("stranger").is_none());
    }
}
