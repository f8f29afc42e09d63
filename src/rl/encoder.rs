//! State encoder for RL - converts a GameSnapshot to a fixed-length feature vector

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainingError};
use crate::state::GameSnapshot;

/// Distance feature written for an absent entity ("far away")
pub const ABSENT_DISTANCE: f32 = 1.0;

/// Player features: position (2), velocity (2), lives (1), game over (1), edge distance (2)
pub const PLAYER_FEATURES: usize = 8;
/// Enemy slot: offset (2), distance (1)
pub const ENEMY_FEATURES: usize = 3;
/// Projectile slot: offset (2), velocity (2), distance (1)
pub const PROJECTILE_FEATURES: usize = 5;
/// Target block: offset (2), distance (1)
pub const TARGET_FEATURES: usize = 3;
/// Companion block: alive fraction, formation efficiency, fire support, formation threat
pub const COMPANION_FEATURES: usize = 4;

/// Configuration for the state encoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Number of nearest enemies to encode
    pub max_enemies: usize,
    /// Number of nearest projectiles to encode
    pub max_projectiles: usize,
    /// Whether the target block is part of the vector
    pub include_target: bool,
    /// Whether the companion block is part of the vector
    pub include_companions: bool,
    /// Roster size used to normalize the alive-companion count
    pub max_companions: usize,
    /// Speed (px/s) mapped to a velocity feature of 1.0
    pub speed_scale: f32,
}

impl EncoderConfig {
    /// 30 features: player, 4 enemies, 2 projectiles
    pub fn compact() -> Self {
        Self {
            max_enemies: 4,
            max_projectiles: 2,
            include_target: false,
            include_companions: false,
            max_companions: 4,
            speed_scale: 400.0,
        }
    }

    /// 42 features: player, 4 enemies, 3 projectiles, target and companions
    pub fn tactical() -> Self {
        Self {
            max_projectiles: 3,
            include_target: true,
            include_companions: true,
            ..Self::compact()
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self::compact()
    }
}

/// State encoder for converting snapshots to flat feature vectors
#[derive(Debug, Clone)]
pub struct StateEncoder {
    config: EncoderConfig,
}

impl StateEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Length D of every vector produced by this encoder
    pub fn state_size(&self) -> usize {
        PLAYER_FEATURES
            + ENEMY_FEATURES * self.config.max_enemies
            + PROJECTILE_FEATURES * self.config.max_projectiles
            + if self.config.include_target { TARGET_FEATURES } else { 0 }
            + if self.config.include_companions { COMPANION_FEATURES } else { 0 }
    }

    pub fn enemy_offset(&self) -> usize {
        PLAYER_FEATURES
    }

    pub fn projectile_offset(&self) -> usize {
        self.enemy_offset() + ENEMY_FEATURES * self.config.max_enemies
    }

    /// Start of the target block, if encoded
    pub fn target_offset(&self) -> Option<usize> {
        self.config
            .include_target
            .then(|| self.projectile_offset() + PROJECTILE_FEATURES * self.config.max_projectiles)
    }

    /// Start of the companion block, if encoded
    pub fn companion_offset(&self) -> Option<usize> {
        self.config.include_companions.then(|| {
            self.projectile_offset()
                + PROJECTILE_FEATURES * self.config.max_projectiles
                + if self.config.include_target { TARGET_FEATURES } else { 0 }
        })
    }

    /// Fail when a vector does not match this encoder's dimensionality
    pub fn check(&self, state: &[f32]) -> Result<()> {
        if state.len() != self.state_size() {
            return Err(TrainingError::Encoding {
                expected: self.state_size(),
                actual: state.len(),
            });
        }
        Ok(())
    }

    /// Encode a snapshot
    pub fn encode(&self, snapshot: &GameSnapshot) -> Vec<f32> {
        let mut obs = Vec::with_capacity(self.state_size());

        let width = snapshot.bounds.width.max(1.0);
        let height = snapshot.bounds.height.max(1.0);
        let diagonal = snapshot.bounds.diagonal().max(1.0);
        let player = &snapshot.player;
        let origin = player.position;

        // Player
        obs.push(origin.x / width);
        obs.push(origin.y / height);
        obs.push(self.scale_speed(player.velocity.x));
        obs.push(self.scale_speed(player.velocity.y));
        obs.push(if player.max_lives > 0 {
            player.lives as f32 / player.max_lives as f32
        } else {
            0.0
        });
        obs.push(if snapshot.game_over { 1.0 } else { 0.0 });
        let (edge_x, edge_y) = snapshot.bounds.edge_distances(&origin);
        obs.push(edge_x / (width / 2.0));
        obs.push(edge_y / (height / 2.0));

        // Enemies, nearest first
        let enemies = snapshot.enemies_by_distance();
        for slot in 0..self.config.max_enemies {
            match enemies.get(slot) {
                Some(enemy) => {
                    let offset = enemy.position - origin;
                    obs.push(offset.x / width);
                    obs.push(offset.y / height);
                    obs.push((offset.length() / diagonal).min(ABSENT_DISTANCE));
                }
                None => obs.extend_from_slice(&[0.0, 0.0, ABSENT_DISTANCE]),
            }
        }

        // Projectiles, nearest first
        let projectiles = snapshot.projectiles_by_distance();
        for slot in 0..self.config.max_projectiles {
            match projectiles.get(slot) {
                Some(projectile) => {
                    let offset = projectile.position - origin;
                    obs.push(offset.x / width);
                    obs.push(offset.y / height);
                    obs.push(self.scale_speed(projectile.velocity.x));
                    obs.push(self.scale_speed(projectile.velocity.y));
                    obs.push((offset.length() / diagonal).min(ABSENT_DISTANCE));
                }
                None => obs.extend_from_slice(&[0.0, 0.0, 0.0, 0.0, ABSENT_DISTANCE]),
            }
        }

        if self.config.include_target {
            match snapshot.target {
                Some(target) => {
                    let offset = target - origin;
                    obs.push(offset.x / width);
                    obs.push(offset.y / height);
                    obs.push((offset.length() / diagonal).min(ABSENT_DISTANCE));
                }
                None => obs.extend_from_slice(&[0.0, 0.0, ABSENT_DISTANCE]),
            }
        }

        if self.config.include_companions {
            let alive = snapshot.alive_companions().count();
            if snapshot.companions.is_empty() {
                obs.extend_from_slice(&[0.0; COMPANION_FEATURES]);
            } else {
                obs.push((alive as f32 / self.config.max_companions.max(1) as f32).min(1.0));
                obs.push(snapshot.formation_efficiency());
                obs.push(if snapshot.fire_support_active() { 1.0 } else { 0.0 });
                obs.push(snapshot.formation_threat.unwrap_or(0.0).clamp(0.0, 1.0));
            }
        }

        debug_assert_eq!(obs.len(), self.state_size());
        obs
    }

    fn scale_speed(&self, value: f32) -> f32 {
        (value / self.config.speed_scale).clamp(-1.0, 1.0)
    }
}
