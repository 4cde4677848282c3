//! Static catalog of abilities players can invoke.

/// A single-target ability. `magnitude` is subtracted from the target's
/// health, so negative values heal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ability {
    pub id: &'static str,
    pub name: &'static str,
    pub cost: u32,
    pub min_range: u32,
    pub max_range: u32,
    pub magnitude: i32,
}

impl Ability {
    pub fn in_range(&self, distance: u32) -> bool {
        distance >= self.min_range && distance <= self.max_range
    }
}

pub const FIREBALL: Ability = Ability {
    id: "fireball",
    name: "Fireball",
    cost: 2,
    min_range: 2,
    max_range: 5,
    magnitude: 20,
};

pub const HEAL: Ability = Ability {
    id: "heal",
    name: "Heal",
    cost: 3,
    min_range: 0,
    max_range: 1,
    magnitude: -25,
};

pub const CATALOG: [Ability; 2] = [FIREBALL, HEAL];

/// Abilities every player knows when they join.
pub const STARTING_ABILITIES: [&str; 2] = [FIREBALL.id, HEAL.id];

pub fn lookup(id: &str) -> Option<&'static Ability> {
    CATALOG.iter().find(|ability| ability.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("fireball"), Some(&FIREBALL));
        assert_eq!(lookup("heal").map(|a| a.cost), Some(3));
        assert!(lookup("meteor").is_none());
    }

    #[test]
    fn test_range_is_inclusive() {
        assert!(!FIREBALL.in_range(1));
        assert!(FIREBALL.in_range(2));
        assert!(FIREBALL.in_range(5));
        assert!(!FIREBALL.in_range(6));

        assert!(HEAL.in_range(0));
        assert!(HEAL.in_range(1));
        assert!(!HEAL.in_range(2));
    }

    #[test]
    fn test_starting_abilities_exist() {
        for id in STARTING_ABILITIES {
            assert!(lookup(id).is_some(), "missing ability {}", id);
        }
    }
}
