//! Board geometry and the occupancy view derived from entity positions.
//!
//! The grid never stores occupants itself. Occupancy is always recomputed
//! from the entity list of the owning match, so it cannot drift from the
//! authoritative positions.

use crate::entity::Entity;
use shared::{GridView, Position, Slot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub width: i32,
    pub height: i32,
}

impl Grid {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn contains(&self, position: &Position) -> bool {
        position.x >= 0 && position.x < self.width && position.y >= 0 && position.y < self.height
    }

    /// Player1 starts at the top-left corner, player2 at the opposite one.
    pub fn spawn_point(&self, slot: Slot) -> Position {
        match slot {
            Slot::Player1 => Position::new(0, 0),
            Slot::Player2 => Position::new(self.width - 1, self.height - 1),
        }
    }

    pub fn occupant_at<'a>(&self, entities: &'a [Entity], position: &Position) -> Option<&'a Entity> {
        entities.iter().find(|entity| entity.position() == *position)
    }

    pub fn is_occupied(&self, entities: &[Entity], position: &Position) -> bool {
        self.occupant_at(entities, position).is_some()
    }

    /// Builds the `cells[y][x]` occupancy matrix for serialization.
    pub fn view(&self, entities: &[Entity]) -> GridView {
        let mut cells = vec![vec![None; self.width.max(0) as usize]; self.height.max(0) as usize];

        for entity in entities {
            let position = entity.position();
            if self.contains(&position) {
                cells[position.y as usize][position.x as usize] = Some(entity.id().to_string());
            }
        }

        GridView {
            width: self.width,
            height: self.height,
            cells,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;

    fn grid() -> Grid {
        Grid::new(10, 8)
    }

    #[test]
    fn test_bounds() {
        let grid = grid();
        assert!(grid.contains(&Position::new(0, 0)));
        assert!(grid.contains(&Position::new(9, 7)));
        assert!(!grid.contains(&Position::new(10, 7)));
        assert!(!grid.contains(&Position::new(9, 8)));
        assert!(!grid.contains(&Position::new(-1, 0)));
    }

    #[test]
    fn test_spawn_points_are_opposite_corners() {
        let grid = grid();
        assert_eq!(grid.spawn_point(Slot::Player1), Position::new(0, 0));
        assert_eq!(grid.spawn_point(Slot::Player2), Position::new(9, 7));
    }

    #[test]
    fn test_occupancy_follows_entities() {
        let grid = grid();
        let mut entities = vec![
            Entity::actor("rock", "obstacle", Position::new(3, 2), 10, None),
            Entity::actor("crate", "obstacle", Position::new(0, 7), 5, None),
        ];

        assert!(grid.is_occupied(&entities, &Position::new(3, 2)));
        assert_eq!(
            grid.occupant_at(&entities, &Position::new(0, 7)).map(|e| e.id()),
            Some("crate")
        );
        assert!(!grid.is_occupied(&entities, &Position::new(4, 2)));

        entities[0].set_position(Position::new(4, 2));
        assert!(!grid.is_occupied(&entities, &Position::new(3, 2)));
        assert!(grid.is_occupied(&entities, &Position::new(4, 2)));
    }

    #[test]
    fn test_view_matrix_layout() {
        let grid = grid();
        let entities = vec![Entity::actor("rock", "obstacle", Position::new(3, 2), 10, None)];
        let view = grid.view(&entities);

        assert_eq!(view.cells.len(), 8);
        assert!(view.cells.iter().all(|row| row.len() == 10));
        assert_eq!(view.cells[2][3].as_deref(), Some("rock"));

        let occupied = view.cells.iter().flatten().filter(|c| c.is_some()).count();
        assert_eq!(occupied, 1);
    }
}
