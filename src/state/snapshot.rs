//! Per-tick snapshot handed to the learning core by the game layer

use serde::{Deserialize, Serialize};

use crate::infra::{ScreenBounds, Vec2};

use super::PlayerState;

/// Distance at which a companion is considered perfectly in formation
pub const IDEAL_FORMATION_SPACING: f32 = 80.0;

/// Seconds after a companion shot during which fire support counts as active
pub const FIRE_SUPPORT_WINDOW: f32 = 1.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyState {
    pub id: u32,
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
    pub health: u32,
    pub is_boss: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileState {
    pub position: Vec2,
    pub velocity: Vec2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub position: Vec2,
    pub radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompanionRole {
    Wingman,
    Gunner,
    Scout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Companion {
    pub role: CompanionRole,
    pub position: Vec2,
    /// Snapshot time of the last shot, negative when the companion never fired
    pub last_shot_time: f32,
    pub alive: bool,
}

/// Everything the core sees of the game in one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// Seconds since the episode started
    pub time: f32,
    /// Steps since the episode started
    #[serde(default)]
    pub step: usize,
    pub bounds: ScreenBounds,
    pub player: PlayerState,
    pub enemies: Vec<EnemyState>,
    pub projectiles: Vec<ProjectileState>,
    pub obstacles: Vec<Obstacle>,
    pub companions: Vec<Companion>,
    pub target: Option<Vec2>,
    pub formation_threat: Option<f32>,
    pub game_over: bool,
}

impl GameSnapshot {
    pub fn new(bounds: ScreenBounds, player: PlayerState) -> Self {
        Self {
            time: 0.0,
            step: 0,
            bounds,
            player,
            enemies: Vec::new(),
            projectiles: Vec::new(),
            obstacles: Vec::new(),
            companions: Vec::new(),
            target: None,
            formation_threat: None,
            game_over: false,
        }
    }

    /// Enemies ordered nearest-first relative to the player
    pub fn enemies_by_distance(&self) -> Vec<&EnemyState> {
        let origin = self.player.position;
        let mut enemies: Vec<&EnemyState> = self.enemies.iter().collect();
        enemies.sort_by(|a, b| {
            origin
                .distance(&a.position)
                .total_cmp(&origin.distance(&b.position))
        });
        enemies
    }

    /// Projectiles ordered nearest-first relative to the player
    pub fn projectiles_by_distance(&self) -> Vec<&ProjectileState> {
        let origin = self.player.position;
        let mut projectiles: Vec<&ProjectileState> = self.projectiles.iter().collect();
        projectiles.sort_by(|a, b| {
            origin
                .distance(&a.position)
                .total_cmp(&origin.distance(&b.position))
        });
        projectiles
    }

    pub fn alive_companions(&self) -> impl Iterator<Item = &Companion> {
        self.companions.iter().filter(|c| c.alive)
    }

    /// Mean closeness of alive companions to the ideal spacing around the player, in [0, 1]
    pub fn formation_efficiency(&self) -> f32 {
        let scores: Vec<f32> = self
            .alive_companions()
            .map(|c| {
                let dist = c.position.distance(&self.player.position);
                (1.0 - (dist - IDEAL_FORMATION_SPACING).abs() / IDEAL_FORMATION_SPACING).max(0.0)
            })
            .collect();

        if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f32>() / scores.len() as f32
        }
    }

    /// True when any alive companion fired within the support window
    pub fn fire_support_active(&self) -> bool {
        self.alive_companions().any(|c| {
            c.last_shot_time >= 0.0 && self.time - c.last_shot_time <= FIRE_SUPPORT_WINDOW
        })
    }
}
