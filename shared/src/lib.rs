//! Wire protocol shared by the tactics server and its clients.
//!
//! Every message on the wire is a JSON envelope `{"eventName": ..., "data": ...}`
//! carried in a single websocket text frame. Inbound events are decoded in two
//! steps (envelope first, then the payload for the named event) so that clients
//! may send `{}` or `null` for events that carry no data.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_GRID_WIDTH: i32 = 10;
pub const DEFAULT_GRID_HEIGHT: i32 = 10;
pub const ACTION_POINTS_PER_TURN: u32 = 5;
pub const PLAYER_MAX_HEALTH: i32 = 100;
pub const MAX_PLAYERS: usize = 2;

/// A cell coordinate on the board. `(0, 0)` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan_distance(&self, other: &Position) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// True only for the four orthogonal neighbours.
    pub fn is_adjacent(&self, other: &Position) -> bool {
        self.manhattan_distance(other) == 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchStatus {
    WaitingForPlayers,
    InProgress,
    Finished,
}

/// Positional seat in a match. The first joiner always takes `Player1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Player1,
    Player2,
}

impl Slot {
    pub fn from_index(index: usize) -> Option<Slot> {
        match index {
            0 => Some(Slot::Player1),
            1 => Some(Slot::Player2),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: String,
    pub name: String,
    pub slot: Slot,
    pub health: i32,
    pub max_health: i32,
    pub action_points: u32,
    pub ability_ids: Vec<String>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityView {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub position: Position,
    pub health: i32,
    pub max_health: i32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub owner_id: Option<String>,
}

/// Occupancy matrix indexed as `cells[y][x]`, holding the occupant's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridView {
    pub width: i32,
    pub height: i32,
    pub cells: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSnapshot {
    pub match_id: String,
    pub status: MatchStatus,
    pub turn: u32,
    pub current_player_id: Option<String>,
    pub turn_order: Vec<String>,
    pub players: Vec<PlayerView>,
    pub entities: Vec<EntityView>,
    pub grid: GridView,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub id: String,
    pub player_count: usize,
    pub max_players: usize,
    pub status: MatchStatus,
}

/// Generic action submission. `type` is kept as a raw string so that an
/// unknown action kind reaches the resolver and is reported as such.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    #[serde(default)]
    pub game_id: Option<String>,
    #[serde(default)]
    pub player_id: Option<String>,
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub target_position: Option<Position>,
    #[serde(default)]
    pub ability_id: Option<String>,
    #[serde(default)]
    pub target_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListFilter {
    #[serde(default)]
    pub status: Option<MatchStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub match_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub event_name: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown event: {0}")]
    UnknownEvent(String),
}

/// Events a client may send.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    MatchmakingRequest,
    InitDataRequest,
    EndTurn,
    SubmitAction(ActionRequest),
    ListMatches(ListFilter),
    CreateMatch,
    JoinMatch(JoinRequest),
}

impl ClientEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientEvent::MatchmakingRequest => "matchmaking_request",
            ClientEvent::InitDataRequest => "init_data_request",
            ClientEvent::EndTurn => "end_turn",
            ClientEvent::SubmitAction(_) => "submit_action",
            ClientEvent::ListMatches(_) => "list_matches",
            ClientEvent::CreateMatch => "create_match",
            ClientEvent::JoinMatch(_) => "join_match",
        }
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let Envelope { event_name, data } = envelope;

        let event = match event_name.as_str() {
            "matchmaking_request" => ClientEvent::MatchmakingRequest,
            "init_data_request" => ClientEvent::InitDataRequest,
            "end_turn" => ClientEvent::EndTurn,
            "create_match" => ClientEvent::CreateMatch,
            "submit_action" => ClientEvent::SubmitAction(serde_json::from_value(data)?),
            "join_match" => ClientEvent::JoinMatch(serde_json::from_value(data)?),
            "list_matches" => {
                if data.is_null() {
                    ClientEvent::ListMatches(ListFilter::default())
                } else {
                    ClientEvent::ListMatches(serde_json::from_value(data)?)
                }
            }
            _ => return Err(ProtocolError::UnknownEvent(event_name)),
        };

        Ok(event)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let data = match self {
            ClientEvent::SubmitAction(request) => serde_json::to_value(request)?,
            ClientEvent::ListMatches(filter) => serde_json::to_value(filter)?,
            ClientEvent::JoinMatch(request) => serde_json::to_value(request)?,
            _ => Value::Object(Default::default()),
        };

        serde_json::to_string(&Envelope {
            event_name: self.event_name().to_string(),
            data,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyInfo {
    pub match_id: String,
    pub players: Vec<PlayerView>,
    pub slot: Slot,
    pub my_player_id: String,
    #[serde(default)]
    pub current_player_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitData {
    pub match_id: String,
    pub state: MatchSnapshot,
    pub my_player_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    pub match_id: String,
    pub state: MatchSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnChange {
    pub match_id: String,
    pub current_player_id: String,
    pub turn: u32,
    pub state: MatchSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionAck {
    pub action: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchList {
    pub matches: Vec<MatchSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCreated {
    pub match_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub status: u16,
    pub reason: String,
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventName", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    LobbyCreated(LobbyInfo),
    LobbyReady(LobbyInfo),
    InitDataResponse(InitData),
    LobbyState(StateUpdate),
    TurnChanged(TurnChange),
    ActionResult(ActionAck),
    MatchList(MatchList),
    MatchCreated(MatchCreated),
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn error(code: &str, status: u16, reason: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            code: code.to_string(),
            status,
            reason: reason.into(),
        })
    }
}
