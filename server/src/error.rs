//! Error taxonomy for match operations.
//!
//! Every variant is a recoverable validation failure: the resolver returns it
//! to the caller, the match is left untouched, and the network layer turns it
//! into an `error` event for the submitting connection.

use shared::{ProtocolError, ServerEvent};
use thiserror::Error;

/// Why a `Move` was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveRejection {
    #[error("target cell is not adjacent")]
    NotAdjacent,
    #[error("target cell is outside the grid")]
    OutOfBounds,
    #[error("target cell is occupied")]
    CellOccupied,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("match {0} not found")]
    MatchNotFound(String),
    #[error("match {0} is full")]
    MatchFull(String),
    #[error("it is not your turn")]
    WrongTurn,
    #[error("player {0} not found in match")]
    PlayerNotFound(String),
    #[error("invalid move: {0}")]
    InvalidMove(MoveRejection),
    #[error("not enough action points (need {needed}, have {available})")]
    InsufficientActionPoints { needed: u32, available: u32 },
    #[error("ability {0} does not exist")]
    AbilityNotFound(String),
    #[error("ability {0} is not known by this player")]
    AbilityNotOwned(String),
    #[error("target at distance {distance} is outside range [{min}, {max}]")]
    OutOfRange { distance: u32, min: u32, max: u32 },
    #[error("no valid target in the selected cell")]
    NoValidTarget,
    #[error("invalid action type: {0}")]
    InvalidActionType(String),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl GameError {
    pub fn code(&self) -> &'static str {
        match self {
            GameError::MatchNotFound(_) => "MatchNotFound",
            GameError::MatchFull(_) => "MatchFull",
            GameError::WrongTurn => "WrongTurn",
            GameError::PlayerNotFound(_) => "PlayerNotFound",
            GameError::InvalidMove(_) => "InvalidMove",
            GameError::InsufficientActionPoints { .. } => "InsufficientActionPoints",
            GameError::AbilityNotFound(_) => "AbilityNotFound",
            GameError::AbilityNotOwned(_) => "AbilityNotOwned",
            GameError::OutOfRange { .. } => "OutOfRange",
            GameError::NoValidTarget => "NoValidTarget",
            GameError::InvalidActionType(_) => "InvalidActionType",
            GameError::BadRequest(_) => "BadRequest",
        }
    }

    /// HTTP-style status carried in error events.
    pub fn status(&self) -> u16 {
        match self {
            GameError::MatchNotFound(_) | GameError::PlayerNotFound(_) => 404,
            _ => 400,
        }
    }

    pub fn to_event(&self) -> ServerEvent {
        ServerEvent::error(self.code(), self.status(), self.to_string())
    }
}

impl From<ProtocolError> for GameError {
    fn from(err: ProtocolError) -> Self {
        GameError::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(GameError::MatchNotFound("m".into()).status(), 404);
        assert_eq!(GameError::PlayerNotFound("p".into()).status(), 404);
        assert_eq!(GameError::WrongTurn.status(), 400);
        assert_eq!(GameError::NoValidTarget.status(), 400);
    }

    #[test]
    fn test_error_event_carries_code_and_reason() {
        let err = GameError::InvalidMove(MoveRejection::CellOccupied);
        match err.to_event() {
            ServerEvent::Error(payload) => {
                assert_eq!(payload.code, "InvalidMove");
                assert_eq!(payload.status, 400);
                assert_eq!(payload.reason, "invalid move: target cell is occupied");
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_move_rejection_messages() {
        assert_eq!(MoveRejection::NotAdjacent.to_string(), "target cell is not adjacent");
        assert_eq!(
            MoveRejection::OutOfBounds.to_string(),
            "target cell is outside the grid"
        );
    }

    #[test]
    fn test_protocol_errors_become_bad_requests() {
        let err: GameError = ProtocolError::UnknownEvent("dance".into()).into();
        assert_eq!(err.code(), "BadRequest");
        assert!(err.to_string().contains("dance"));
    }
}
