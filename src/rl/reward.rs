//! Reward shaping - combines weighted terms into one scalar per step

use serde::{Deserialize, Serialize};

use crate::state::GameSnapshot;

/// Weights of every reward term. Positive values; signs are applied by the shaper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardWeights {
    /// Per destroyed enemy
    pub kill: f32,
    /// Per destroyed incoming projectile
    pub intercept: f32,
    /// Per life lost
    pub damage: f32,
    /// Per step survived
    pub survival_step: f32,
    /// Extra survival bonus on the final step of an episode survived
    pub survival_episode_end: f32,
    /// Distance (px) from an edge below which the wall penalty applies
    pub edge_margin: f32,
    /// Penalty at the edge itself, scaled linearly to zero at the margin
    pub edge_penalty: f32,
    /// Displacement (px) over the stationary window below which the player counts as idle
    pub stationary_threshold: f32,
    pub stationary_penalty: f32,
    /// Per alive companion
    pub ally_alive: f32,
    /// Scaled by formation efficiency in [0, 1]
    pub formation: f32,
    /// Flat bonus while fire support is active
    pub fire_support: f32,
    /// Terminal penalty on game over
    pub game_over: f32,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            kill: 10.0,
            intercept: 5.0,
            damage: 20.0,
            survival_step: 0.1,
            survival_episode_end: 50.0,
            edge_margin: 50.0,
            edge_penalty: 0.5,
            stationary_threshold: 20.0,
            stationary_penalty: 0.2,
            ally_alive: 0.05,
            formation: 0.2,
            fire_support: 0.1,
            game_over: 100.0,
        }
    }
}

/// Switches for each reward term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardTerms {
    pub kill: bool,
    pub intercept: bool,
    pub damage: bool,
    pub survival: bool,
    pub edge: bool,
    pub stationary: bool,
    pub coordination: bool,
    pub game_over: bool,
}

impl RewardTerms {
    pub fn all() -> Self {
        Self {
            kill: true,
            intercept: true,
            damage: true,
            survival: true,
            edge: true,
            stationary: true,
            coordination: true,
            game_over: true,
        }
    }

    pub fn none() -> Self {
        Self {
            kill: false,
            intercept: false,
            damage: false,
            survival: false,
            edge: false,
            stationary: false,
            coordination: false,
            game_over: false,
        }
    }
}

impl Default for RewardTerms {
    fn default() -> Self {
        Self::all()
    }
}

/// What changed between two consecutive snapshots
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StepDelta {
    pub enemies_destroyed: u32,
    pub projectiles_intercepted: u32,
    pub health_lost: u32,
    /// Player displacement over the stationary window, `None` until the window is full
    pub window_displacement: Option<f32>,
    /// Last step of the episode
    pub episode_ended: bool,
}

/// Reward split by term, useful for debugging the shaping
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub kill: f32,
    pub intercept: f32,
    pub damage: f32,
    pub survival: f32,
    pub edge: f32,
    pub stationary: f32,
    pub coordination: f32,
    pub game_over: f32,
}

impl RewardBreakdown {
    /// Signed sum of all terms, not re-normalized
    pub fn total(&self) -> f32 {
        self.kill
            + self.intercept
            + self.damage
            + self.survival
            + self.edge
            + self.stationary
            + self.coordination
            + self.game_over
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewardShaper {
    weights: RewardWeights,
    terms: RewardTerms,
}

impl RewardShaper {
    pub fn new(weights: RewardWeights, terms: RewardTerms) -> Self {
        Self { weights, terms }
    }

    pub fn weights(&self) -> &RewardWeights {
        &self.weights
    }

    pub fn terms(&self) -> RewardTerms {
        self.terms
    }

    /// Scalar reward for a step ending in `after`
    pub fn shape(&self, delta: &StepDelta, after: &GameSnapshot) -> f32 {
        self.breakdown(delta, after).total()
    }

    pub fn breakdown(&self, delta: &StepDelta, after: &GameSnapshot) -> RewardBreakdown {
        let w = &self.weights;
        let mut out = RewardBreakdown::default();

        if self.terms.kill {
            out.kill = w.kill * delta.enemies_destroyed as f32;
        }
        if self.terms.intercept {
            out.intercept = w.intercept * delta.projectiles_intercepted as f32;
        }
        if self.terms.damage {
            out.damage = -w.damage * delta.health_lost as f32;
        }
        if self.terms.survival && !after.game_over {
            out.survival = w.survival_step;
            if delta.episode_ended {
                out.survival += w.survival_episode_end;
            }
        }
        if self.terms.edge && w.edge_margin > 0.0 {
            let (dx, dy) = after.bounds.edge_distances(&after.player.position);
            let closest = dx.min(dy);
            if closest < w.edge_margin {
                out.edge = -w.edge_penalty * (w.edge_margin - closest) / w.edge_margin;
            }
        }
        if self.terms.stationary
            && let Some(displacement) = delta.window_displacement
            && displacement < w.stationary_threshold
        {
            out.stationary = -w.stationary_penalty;
        }
        if self.terms.coordination && !after.companions.is_empty() {
            out.coordination = w.ally_alive * after.alive_companions().count() as f32
                + w.formation * after.formation_efficiency();
            if after.fire_support_active() {
                out.coordination += w.fire_support;
            }
        }
        if self.terms.game_over && after.game_over {
            out.game_over = -w.game_over;
        }

        out
    }
}

impl Default for RewardShaper {
    fn default() -> Self {
        Self::new(RewardWeights::default(), RewardTerms::all())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{ScreenBounds, Vec2};
    use crate::state::{Companion, CompanionRole, PlayerState};

    fn centered() -> GameSnapshot {
        GameSnapshot::new(
            ScreenBounds::new(800.0, 600.0),
            PlayerState::new(Vec2::new(400.0, 300.0), 3),
        )
    }

    #[test]
    fn test_two_kills_and_survival_only() {
        let shaper = RewardShaper::default();
        let delta = StepDelta {
            enemies_destroyed: 2,
            ..StepDelta::default()
        };

        let reward = shaper.shape(&delta, &centered());
        let w = shaper.weights();
        assert_eq!(reward, 2.0 * w.kill + w.survival_step);
    }

    #[test]
    fn test_reward_is_deterministic() {
        let shaper = RewardShaper::default();
        let mut after = centered();
        after.player.position = Vec2::new(10.0, 300.0);
        let delta = StepDelta {
            health_lost: 1,
            projectiles_intercepted: 1,
            window_displacement: Some(3.0),
            ..StepDelta::default()
        };

        assert_eq!(shaper.shape(&delta, &after), shaper.shape(&delta, &after));
    }

    #[test]
    fn test_edge_penalty_scales_with_proximity() {
        let shaper = RewardShaper::new(
            RewardWeights::default(),
            RewardTerms {
                edge: true,
                ..RewardTerms::none()
            },
        );
        let mut after = centered();
        assert_eq!(shaper.shape(&StepDelta::default(), &after), 0.0);

        after.player.position = Vec2::new(25.0, 300.0);
        let half = shaper.shape(&StepDelta::default(), &after);
        assert!((half + 0.25).abs() < 1e-6);

        after.player.position = Vec2::new(0.0, 300.0);
        let full = shaper.shape(&StepDelta::default(), &after);
        assert!((full + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_stationary_penalty_needs_full_window() {
        let shaper = RewardShaper::new(
            RewardWeights::default(),
            RewardTerms {
                stationary: true,
                ..RewardTerms::none()
            },
        );
        let after = centered();

        let warming_up = StepDelta::default();
        assert_eq!(shaper.shape(&warming_up, &after), 0.0);

        let idle = StepDelta {
            window_displacement: Some(5.0),
            ..StepDelta::default()
        };
        assert_eq!(shaper.shape(&idle, &after), -0.2);

        let moving = StepDelta {
            window_displacement: Some(60.0),
            ..StepDelta::default()
        };
        assert_eq!(shaper.shape(&moving, &after), 0.0);
    }

    #[test]
    fn test_game_over_penalty_replaces_survival() {
        let shaper = RewardShaper::default();
        let mut after = centered();
        after.game_over = true;
        after.player.lives = 0;

        let breakdown = shaper.breakdown(
            &StepDelta {
                health_lost: 1,
                episode_ended: true,
                ..StepDelta::default()
            },
            &after,
        );
        assert_eq!(breakdown.survival, 0.0);
        assert_eq!(breakdown.game_over, -100.0);
        assert_eq!(breakdown.total(), -120.0);
    }

    #[test]
    fn test_coordination_bonus() {
        let shaper = RewardShaper::new(
            RewardWeights::default(),
            RewardTerms {
                coordination: true,
                ..RewardTerms::none()
            },
        );
        let mut after = centered();
        after.time = 5.0;
        after.companions = vec![Companion {
            role: CompanionRole::Gunner,
            position: Vec2::new(480.0, 300.0),
            last_shot_time: 4.5,
            alive: true,
        }];

        let reward = shaper.shape(&StepDelta::default(), &after);
        assert!((reward - (0.05 + 0.2 + 0.1)).abs() < 1e-6);
    }
}
