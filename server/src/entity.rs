//! Placed objects on the board.
//!
//! Every entity shares one attribute block (identity, position, health,
//! owner). Players add a payload with their display name, remaining action
//! points and known abilities; generic actors carry only a type tag.

use shared::{EntityView, PlayerView, Position, Slot};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityAttributes {
    pub id: String,
    pub position: Position,
    pub health: i32,
    pub max_health: i32,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerData {
    pub name: String,
    pub action_points: u32,
    pub abilities: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKind {
    Player(PlayerData),
    Actor { type_tag: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub attributes: EntityAttributes,
    pub kind: EntityKind,
}

impl Entity {
    /// A player owns itself and starts at full health with no action points;
    /// points are granted when the player first gains the turn.
    pub fn player<I, S>(id: &str, name: &str, position: Position, max_health: i32, abilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attributes: EntityAttributes {
                id: id.to_string(),
                position,
                health: max_health,
                max_health,
                owner: Some(id.to_string()),
            },
            kind: EntityKind::Player(PlayerData {
                name: name.to_string(),
                action_points: 0,
                abilities: abilities.into_iter().map(Into::into).collect(),
            }),
        }
    }

    pub fn actor(
        id: &str,
        type_tag: &str,
        position: Position,
        max_health: i32,
        owner: Option<String>,
    ) -> Self {
        Self {
            attributes: EntityAttributes {
                id: id.to_string(),
                position,
                health: max_health,
                max_health,
                owner,
            },
            kind: EntityKind::Actor {
                type_tag: type_tag.to_string(),
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.attributes.id
    }

    pub fn position(&self) -> Position {
        self.attributes.position
    }

    pub fn set_position(&mut self, position: Position) {
        self.attributes.position = position;
    }

    pub fn health(&self) -> i32 {
        self.attributes.health
    }

    pub fn max_health(&self) -> i32 {
        self.attributes.max_health
    }

    /// Health is clamped to `[0, max_health]` on every write.
    pub fn set_health(&mut self, health: i32) {
        self.attributes.health = health.clamp(0, self.attributes.max_health);
    }

    /// Positive magnitudes damage, negative ones heal.
    pub fn apply_magnitude(&mut self, magnitude: i32) {
        self.set_health(self.attributes.health.saturating_sub(magnitude));
    }

    pub fn type_tag(&self) -> &str {
        match &self.kind {
            EntityKind::Player(_) => "player",
            EntityKind::Actor { type_tag } => type_tag,
        }
    }

    pub fn player_data(&self) -> Option<&PlayerData> {
        match &self.kind {
            EntityKind::Player(data) => Some(data),
            EntityKind::Actor { .. } => None,
        }
    }

    pub fn player_data_mut(&mut self) -> Option<&mut PlayerData> {
        match &mut self.kind {
            EntityKind::Player(data) => Some(data),
            EntityKind::Actor { .. } => None,
        }
    }

    pub fn to_view(&self) -> EntityView {
        EntityView {
            id: self.attributes.id.clone(),
            entity_type: self.type_tag().to_string(),
            position: self.attributes.position,
            health: self.attributes.health,
            max_health: self.attributes.max_health,
            owner_id: self.attributes.owner.clone(),
        }
    }

    /// Returns `None` for non-player entities.
    pub fn to_player_view(&self, slot: Slot) -> Option<PlayerView> {
        let data = self.player_data()?;
        Some(PlayerView {
            id: self.attributes.id.clone(),
            name: data.name.clone(),
            slot,
            health: self.attributes.health,
            max_health: self.attributes.max_health,
            action_points: data.action_points,
            ability_ids: data.abilities.iter().cloned().collect(),
            position: self.attributes.position,
        })
    }
}
