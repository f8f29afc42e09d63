//! Discrete action spaces and their mapping onto player commands

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainingError};
use crate::infra::Vec2;

/// Number of movement actions (idle + 8 compass directions)
pub const MOVEMENT_ACTIONS: usize = 9;

/// Number of combat actions (movement actions + 3 fire commands)
pub const COMBAT_ACTIONS: usize = 12;

const DIAGONAL: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Compass direction unit vectors in action-index order (screen y grows downwards)
const DIRECTIONS: [(f32, f32); 8] = [
    (0.0, -1.0),           // N
    (DIAGONAL, -DIAGONAL), // NE
    (1.0, 0.0),            // E
    (DIAGONAL, DIAGONAL),  // SE
    (0.0, 1.0),            // S
    (-DIAGONAL, DIAGONAL), // SW
    (-1.0, 0.0),           // W
    (-DIAGONAL, -DIAGONAL), // NW
];

static ACTION_NAMES: [&str; COMBAT_ACTIONS] = [
    "idle",
    "north",
    "north-east",
    "east",
    "south-east",
    "south",
    "south-west",
    "west",
    "north-west",
    "shoot-nearest",
    "shoot-target",
    "intercept",
];

/// Fire command attached to an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FireCommand {
    /// Shoot the nearest enemy
    Nearest,
    /// Shoot the enemy closest to the current target marker
    AtTarget,
    /// Shoot down the nearest incoming projectile
    Intercept,
}

/// A decoded action index
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GameAction {
    /// Unit movement direction, zero when idle or firing
    pub direction: Vec2,
    pub fire: Option<FireCommand>,
}

impl GameAction {
    pub fn idle() -> Self {
        Self {
            direction: Vec2::ZERO,
            fire: None,
        }
    }

    /// Velocity for a player moving at `speed`
    pub fn velocity(&self, speed: f32) -> Vec2 {
        self.direction.scale(speed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionSpace {
    /// Idle plus 8 directions
    Movement,
    /// Movement plus shoot-nearest, shoot-target and intercept
    Combat,
}

impl ActionSpace {
    pub fn size(&self) -> usize {
        match self {
            ActionSpace::Movement => MOVEMENT_ACTIONS,
            ActionSpace::Combat => COMBAT_ACTIONS,
        }
    }

    /// Decode an action index; indices outside the space are rejected
    pub fn decode(&self, index: usize) -> Result<GameAction> {
        if index >= self.size() {
            return Err(TrainingError::InvalidAction {
                action: index,
                action_count: self.size(),
            });
        }

        let action = match index {
            0 => GameAction::idle(),
            1..=8 => {
                let (x, y) = DIRECTIONS[index - 1];
                GameAction {
                    direction: Vec2::new(x, y),
                    fire: None,
                }
            }
            9 => GameAction {
                direction: Vec2::ZERO,
                fire: Some(FireCommand::Nearest),
            },
            10 => GameAction {
                direction: Vec2::ZERO,
                fire: Some(FireCommand::AtTarget),
            },
            _ => GameAction {
                direction: Vec2::ZERO,
                fire: Some(FireCommand::Intercept),
            },
        };
        Ok(action)
    }

    /// Human-readable action names for debug overlays, indexed like the actions
    pub fn action_names(&self) -> &'static [&'static str] {
        &ACTION_NAMES[..self.size()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_space_sizes() {
        assert_eq!(ActionSpace::Movement.size(), 9);
        assert_eq!(ActionSpace::Combat.size(), 12);
        assert_eq!(ActionSpace::Combat.action_names().len(), 12);
    }

    #[test]
    fn test_decode_directions_are_unit_length() {
        for index in 1..=8 {
            let action = ActionSpace::Movement.decode(index).unwrap();
            assert!((action.direction.length() - 1.0).abs() < 1e-5);
            assert!(action.fire.is_none());
        }
        assert_eq!(ActionSpace::Movement.decode(0).unwrap(), GameAction::idle());
    }

    #[test]
    fn test_decode_rejects_out_of_range() {
        assert!(matches!(
            ActionSpace::Movement.decode(9),
            Err(TrainingError::InvalidAction {
                action: 9,
                action_count: 9
            })
        ));
        let intercept = ActionSpace::Combat.decode(11).unwrap();
        assert_eq!(intercept.fire, Some(FireCommand::Intercept));
    }

    #[test]
    fn test_velocity_scales_direction() {
        let east = ActionSpace::Movement.decode(3).unwrap();
        assert_eq!(east.velocity(200.0), Vec2::new(200.0, 0.0));
    }
}
