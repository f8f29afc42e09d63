use serde::{Deserialize, Serialize};

use crate::infra::{ScreenBounds, Vec2};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
    /// Remaining lives; one life is lost per hit
    pub lives: u32,
    pub max_lives: u32,
    /// Snapshot time until which further hits are ignored
    pub invulnerable_until: f32,
}

impl PlayerState {
    pub fn new(position: Vec2, max_lives: u32) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            radius: 12.0,
            lives: max_lives,
            max_lives,
            invulnerable_until: 0.0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.lives > 0
    }

    /// Returns the player after moving with `velocity` for `dt` seconds, kept on screen
    pub fn moved(&self, velocity: Vec2, dt: f32, bounds: &ScreenBounds) -> Self {
        Self {
            position: bounds.clamp(self.position + velocity.scale(dt), self.radius),
            velocity,
            ..self.clone()
        }
    }

    /// Returns the player after taking `hits` hits at time `now`
    pub fn damaged(&self, hits: u32, now: f32, grace: f32) -> Self {
        if hits == 0 || now < self.invulnerable_until {
            return self.clone();
        }
        Self {
            lives: self.lives.saturating_sub(hits),
            invulnerable_until: now + grace,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moved_returns_new_value() {
        let bounds = ScreenBounds::new(100.0, 100.0);
        let player = PlayerState::new(Vec2::new(50.0, 50.0), 3);
        let moved = player.moved(Vec2::new(100.0, 0.0), 0.1, &bounds);

        assert_eq!(player.position, Vec2::new(50.0, 50.0));
        assert!((moved.position.x - 60.0).abs() < 1e-4);
        assert_eq!(moved.velocity, Vec2::new(100.0, 0.0));
    }

    #[test]
    fn test_damage_respects_grace_period() {
        let player = PlayerState::new(Vec2::ZERO, 3);
        let hit = player.damaged(1, 1.0, 0.5);
        assert_eq!(hit.lives, 2);

        let ignored = hit.damaged(1, 1.2, 0.5);
        assert_eq!(ignored.lives, 2);

        let second = hit.damaged(1, 1.6, 0.5);
        assert_eq!(second.lives, 1);
    }
}
