//! Simulated arena - offline environment the trainers run episodes against
//!
//! Every transition is pure: `step` takes the previous snapshot and returns a new one.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::infra::{ScreenBounds, Vec2};
use crate::state::{
    Companion, CompanionRole, EnemyState, GameSnapshot, IDEAL_FORMATION_SPACING, Obstacle,
    PlayerState, ProjectileState,
};

use super::action_space::{ActionSpace, FireCommand};
use super::curriculum::DifficultyConfig;
use super::encoder::EncoderConfig;
use super::reward::{RewardShaper, RewardTerms, RewardWeights};

const ENEMY_RADIUS: f32 = 14.0;
const BOSS_RADIUS: f32 = 32.0;
const BOSS_HEALTH: u32 = 8;
const PROJECTILE_RADIUS: f32 = 4.0;
const HAZARD_RADIUS: f32 = 30.0;
/// Minimum spawn distance from the player
const SAFE_SPAWN_DISTANCE: f32 = 200.0;
const SPAWN_ATTEMPTS: usize = 16;
/// Distance at which enemies count towards the formation threat
const THREAT_RADIUS: f32 = 150.0;

/// Physical constants of the arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaConfig {
    pub bounds: ScreenBounds,
    /// Player speed in px/s
    pub player_speed: f32,
    /// Seconds per step
    pub dt: f32,
    pub max_lives: u32,
    /// Enemy speed in px/s before the difficulty multiplier
    pub base_enemy_speed: f32,
    /// Reach of player and companion shots
    pub shot_range: f32,
    pub projectile_speed: f32,
    /// Per-enemy chance to fire on a step
    pub enemy_fire_chance: f32,
    /// Invulnerability after a hit, in seconds
    pub hit_grace: f32,
    /// Stealth range enemies only react inside this radius
    pub detection_radius: f32,
    /// Seconds between gunner companion shots
    pub companion_fire_interval: f32,
    /// Distance at which a waypoint counts as reached
    pub target_radius: f32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            bounds: ScreenBounds::default(),
            player_speed: 240.0,
            dt: 1.0 / 30.0,
            max_lives: 3,
            base_enemy_speed: 90.0,
            shot_range: 350.0,
            projectile_speed: 220.0,
            enemy_fire_chance: 0.01,
            hit_grace: 1.0,
            detection_radius: 160.0,
            companion_fire_interval: 1.0,
            target_radius: 30.0,
        }
    }
}

/// Specialized training scenario, one per agent of the cyclic roster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrainingRange {
    /// Dodge and survive
    Movement,
    /// Clear waves of enemies
    Shooting,
    /// Follow waypoints under pressure
    Patrol,
    /// Reach waypoints without being noticed
    Stealth,
    /// Take down a boss and its escort
    Boss,
}

impl TrainingRange {
    pub const ALL: [TrainingRange; 5] = [
        TrainingRange::Movement,
        TrainingRange::Shooting,
        TrainingRange::Patrol,
        TrainingRange::Stealth,
        TrainingRange::Boss,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TrainingRange::Movement => "movement",
            TrainingRange::Shooting => "shooting",
            TrainingRange::Patrol => "patrol",
            TrainingRange::Stealth => "stealth",
            TrainingRange::Boss => "boss",
        }
    }

    pub fn encoder_config(&self) -> EncoderConfig {
        match self {
            TrainingRange::Movement | TrainingRange::Stealth => EncoderConfig::compact(),
            TrainingRange::Shooting | TrainingRange::Patrol | TrainingRange::Boss => {
                EncoderConfig::tactical()
            }
        }
    }

    pub fn action_space(&self) -> ActionSpace {
        match self {
            TrainingRange::Shooting | TrainingRange::Boss => ActionSpace::Combat,
            TrainingRange::Movement | TrainingRange::Patrol | TrainingRange::Stealth => {
                ActionSpace::Movement
            }
        }
    }

    pub fn reward_shaper(&self) -> RewardShaper {
        let defaults = RewardWeights::default();
        match self {
            TrainingRange::Movement => RewardShaper::new(
                defaults,
                RewardTerms {
                    kill: false,
                    intercept: false,
                    ..RewardTerms::all()
                },
            ),
            TrainingRange::Shooting => RewardShaper::new(
                RewardWeights {
                    stationary_penalty: 0.0,
                    ..defaults
                },
                RewardTerms::all(),
            ),
            TrainingRange::Patrol => RewardShaper::new(
                RewardWeights {
                    stationary_penalty: 0.5,
                    ..defaults
                },
                RewardTerms::all(),
            ),
            TrainingRange::Stealth => RewardShaper::new(
                RewardWeights {
                    damage: 40.0,
                    ..defaults
                },
                RewardTerms {
                    kill: false,
                    intercept: false,
                    coordination: false,
                    ..RewardTerms::all()
                },
            ),
            TrainingRange::Boss => RewardShaper::new(
                RewardWeights {
                    kill: 25.0,
                    intercept: 8.0,
                    ..defaults
                },
                RewardTerms::all(),
            ),
        }
    }

    /// Whether destroying every enemy ends the episode
    pub fn ends_on_clear(&self) -> bool {
        matches!(self, TrainingRange::Shooting | TrainingRange::Boss)
    }

    fn uses_waypoints(&self) -> bool {
        matches!(self, TrainingRange::Patrol | TrainingRange::Stealth)
    }
}

/// What happened during one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepEvents {
    pub enemies_destroyed: u32,
    pub projectiles_intercepted: u32,
    pub health_lost: u32,
    pub shots_fired: u32,
    pub shots_hit: u32,
    pub target_reached: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArenaStep {
    pub snapshot: GameSnapshot,
    pub events: StepEvents,
    ends_on_clear: bool,
}

impl ArenaStep {
    /// No enemies left in a range that ends on a clear
    pub fn cleared(&self) -> bool {
        self.ends_on_clear && self.snapshot.enemies.is_empty()
    }

    pub fn is_terminal(&self) -> bool {
        self.snapshot.game_over || self.cleared()
    }
}

#[derive(Debug, Clone)]
pub struct Arena {
    config: ArenaConfig,
    difficulty: DifficultyConfig,
    range: TrainingRange,
}

impl Arena {
    pub fn new(config: ArenaConfig) -> Self {
        Self {
            config,
            difficulty: DifficultyConfig::default(),
            range: TrainingRange::Movement,
        }
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    pub fn difficulty(&self) -> &DifficultyConfig {
        &self.difficulty
    }

    pub fn range(&self) -> TrainingRange {
        self.range
    }

    /// Start an episode with the given difficulty in the given range
    pub fn reset(
        &mut self,
        difficulty: DifficultyConfig,
        range: TrainingRange,
        rng: &mut impl Rng,
    ) -> GameSnapshot {
        self.difficulty = difficulty;
        self.range = range;

        let bounds = self.config.bounds;
        let player = PlayerState::new(bounds.center(), self.config.max_lives);
        let mut snapshot = GameSnapshot::new(bounds, player);

        let mut next_id = 0;
        if range == TrainingRange::Boss {
            snapshot.enemies.push(self.spawn_enemy(&snapshot, next_id, true, rng));
            next_id += 1;
        }
        for _ in 0..difficulty.enemy_count {
            snapshot.enemies.push(self.spawn_enemy(&snapshot, next_id, false, rng));
            next_id += 1;
        }

        snapshot.obstacles = (0..difficulty.hazard_count)
            .map(|_| Obstacle {
                position: self.spawn_point(&snapshot, HAZARD_RADIUS, rng),
                radius: HAZARD_RADIUS,
            })
            .collect();

        let roles = [
            CompanionRole::Gunner,
            CompanionRole::Wingman,
            CompanionRole::Scout,
        ];
        snapshot.companions = (0..difficulty.companion_count)
            .map(|i| Companion {
                role: roles[i % roles.len()],
                position: formation_slot(&snapshot.player.position, i, &bounds),
                last_shot_time: -1.0,
                alive: true,
            })
            .collect();

        if range.uses_waypoints() {
            snapshot.target = Some(self.spawn_point(&snapshot, self.config.target_radius, rng));
        }
        snapshot.formation_threat = formation_threat(&snapshot);

        snapshot
    }

    /// Advance one step. `action` is an index into the current range's action space.
    pub fn step(
        &self,
        snapshot: &GameSnapshot,
        action: usize,
        rng: &mut impl Rng,
    ) -> Result<ArenaStep> {
        let decoded = self.range.action_space().decode(action)?;
        let cfg = &self.config;
        let bounds = snapshot.bounds;
        let mut events = StepEvents::default();
        let mut next = snapshot.clone();
        next.time = snapshot.time + cfg.dt;
        next.step = snapshot.step + 1;

        // Player
        next.player = snapshot
            .player
            .moved(decoded.velocity(cfg.player_speed), cfg.dt, &bounds);

        if let Some(command) = decoded.fire {
            events.shots_fired += 1;
            let hit = match command {
                FireCommand::Nearest => {
                    let origin = next.player.position;
                    nearest_enemy_within(&next.enemies, &origin, &origin, cfg.shot_range)
                        .map(|i| damage_enemy(&mut next.enemies, i, &mut events))
                        .is_some()
                }
                FireCommand::AtTarget => {
                    let origin = next.player.position;
                    let aim = next.target.unwrap_or(origin);
                    nearest_enemy_within(&next.enemies, &aim, &origin, cfg.shot_range)
                        .map(|i| damage_enemy(&mut next.enemies, i, &mut events))
                        .is_some()
                }
                FireCommand::Intercept => {
                    let origin = next.player.position;
                    let nearest = next
                        .projectiles
                        .iter()
                        .enumerate()
                        .filter(|(_, p)| p.position.distance(&origin) <= cfg.shot_range)
                        .min_by(|(_, a), (_, b)| {
                            a.position
                                .distance(&origin)
                                .total_cmp(&b.position.distance(&origin))
                        })
                        .map(|(i, _)| i);
                    if let Some(i) = nearest {
                        next.projectiles.remove(i);
                        events.projectiles_intercepted += 1;
                    }
                    nearest.is_some()
                }
            };
            if hit {
                events.shots_hit += 1;
            }
        }

        // Companions keep formation and the gunners fire on their own
        let player_pos = next.player.position;
        for (slot, companion) in next.companions.iter_mut().enumerate() {
            if !companion.alive {
                continue;
            }
            companion.position = formation_slot(&player_pos, slot, &bounds);
            let ready = companion.last_shot_time < 0.0
                || next.time - companion.last_shot_time >= cfg.companion_fire_interval;
            if companion.role == CompanionRole::Gunner
                && ready
                && let Some(i) = nearest_enemy_within(
                    &next.enemies,
                    &companion.position,
                    &companion.position,
                    cfg.shot_range,
                )
            {
                companion.last_shot_time = next.time;
                damage_enemy(&mut next.enemies, i, &mut events);
            }
        }

        // Enemies pursue and fire
        let enemy_speed = cfg.base_enemy_speed * self.difficulty.enemy_speed;
        let stealth = self.range == TrainingRange::Stealth;
        let mut fired = Vec::new();
        for enemy in next.enemies.iter_mut() {
            let to_player = player_pos - enemy.position;
            let aware = !stealth || to_player.length() <= cfg.detection_radius;
            let speed = if enemy.is_boss {
                enemy_speed * 0.6
            } else {
                enemy_speed
            };
            enemy.velocity = if aware {
                to_player.normalized().scale(speed)
            } else {
                Vec2::ZERO
            };
            enemy.position =
                bounds.clamp(enemy.position + enemy.velocity.scale(cfg.dt), enemy.radius);

            let chance = if enemy.is_boss {
                cfg.enemy_fire_chance * 3.0
            } else {
                cfg.enemy_fire_chance
            };
            if aware && rng.random::<f32>() < chance {
                fired.push(ProjectileState {
                    position: enemy.position,
                    velocity: to_player.normalized().scale(cfg.projectile_speed),
                });
            }
        }
        next.projectiles.extend(fired);

        for projectile in next.projectiles.iter_mut() {
            projectile.position = projectile.position + projectile.velocity.scale(cfg.dt);
        }
        next.projectiles.retain(|p| bounds.contains(&p.position));

        // Collisions
        let player_radius = next.player.radius;
        let mut hits = 0;
        let before = next.projectiles.len();
        next.projectiles.retain(|p| {
            p.position.distance(&player_pos) > player_radius + PROJECTILE_RADIUS
        });
        hits += (before - next.projectiles.len()) as u32;

        // Rammers are destroyed on contact, bosses survive it
        let before = next.enemies.len();
        let mut boss_contact = false;
        next.enemies.retain(|e| {
            let touching = e.position.distance(&player_pos) <= player_radius + e.radius;
            if touching && e.is_boss {
                boss_contact = true;
            }
            !touching || e.is_boss
        });
        hits += (before - next.enemies.len()) as u32;
        if boss_contact {
            hits += 1;
        }

        if next
            .obstacles
            .iter()
            .any(|o| o.position.distance(&player_pos) <= player_radius + o.radius)
        {
            hits += 1;
        }

        for companion in next.companions.iter_mut().filter(|c| c.alive) {
            if next
                .enemies
                .iter()
                .any(|e| e.position.distance(&companion.position) <= e.radius + player_radius)
            {
                companion.alive = false;
            }
        }

        let lives_before = next.player.lives;
        next.player = next.player.damaged(hits, next.time, cfg.hit_grace);
        events.health_lost = lives_before - next.player.lives;
        next.game_over = !next.player.is_alive();

        // Boss waves
        if self.difficulty.boss_spawn_interval > 0
            && next.step % self.difficulty.boss_spawn_interval == 0
        {
            let id = next_enemy_id(&next.enemies);
            let boss = self.spawn_enemy(&next, id, true, rng);
            tracing::debug!("Boss {} spawned at step {}", id, next.step);
            next.enemies.push(boss);
        }

        if let Some(target) = next.target
            && target.distance(&player_pos) <= cfg.target_radius
        {
            events.target_reached = true;
            next.target = Some(self.spawn_point(&next, cfg.target_radius, rng));
        }

        next.formation_threat = formation_threat(&next);

        Ok(ArenaStep {
            snapshot: next,
            events,
            ends_on_clear: self.range.ends_on_clear(),
        })
    }

    fn spawn_enemy(
        &self,
        snapshot: &GameSnapshot,
        id: u32,
        is_boss: bool,
        rng: &mut impl Rng,
    ) -> EnemyState {
        let radius = if is_boss { BOSS_RADIUS } else { ENEMY_RADIUS };
        EnemyState {
            id,
            position: self.spawn_point(snapshot, radius, rng),
            velocity: Vec2::ZERO,
            radius,
            health: if is_boss { BOSS_HEALTH } else { 1 },
            is_boss,
        }
    }

    /// Random point inside the screen, away from the player when possible
    fn spawn_point(&self, snapshot: &GameSnapshot, margin: f32, rng: &mut impl Rng) -> Vec2 {
        let bounds = snapshot.bounds;
        let max_x = (bounds.width - margin).max(margin + 1.0);
        let max_y = (bounds.height - margin).max(margin + 1.0);

        let mut point = bounds.center();
        for _ in 0..SPAWN_ATTEMPTS {
            point = Vec2::new(
                rng.random_range(margin..max_x),
                rng.random_range(margin..max_y),
            );
            if point.distance(&snapshot.player.position) >= SAFE_SPAWN_DISTANCE {
                break;
            }
        }
        point
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new(ArenaConfig::default())
    }
}

/// Index of the enemy nearest to `aim` that `shooter` can reach
fn nearest_enemy_within(
    enemies: &[EnemyState],
    aim: &Vec2,
    shooter: &Vec2,
    range: f32,
) -> Option<usize> {
    enemies
        .iter()
        .enumerate()
        .filter(|(_, e)| e.position.distance(shooter) <= range)
        .min_by(|(_, a), (_, b)| a.position.distance(aim).total_cmp(&b.position.distance(aim)))
        .map(|(i, _)| i)
}

fn damage_enemy(enemies: &mut Vec<EnemyState>, index: usize, events: &mut StepEvents) {
    let enemy = &mut enemies[index];
    enemy.health = enemy.health.saturating_sub(1);
    if enemy.health == 0 {
        enemies.remove(index);
        events.enemies_destroyed += 1;
    }
}

fn next_enemy_id(enemies: &[EnemyState]) -> u32 {
    enemies.iter().map(|e| e.id + 1).max().unwrap_or(0)
}

/// Formation position of companion `slot`, spread evenly around the player
fn formation_slot(player: &Vec2, slot: usize, bounds: &ScreenBounds) -> Vec2 {
    let angle = std::f32::consts::FRAC_PI_2 * slot as f32 + std::f32::consts::FRAC_PI_4;
    let offset = Vec2::new(angle.cos(), angle.sin()).scale(IDEAL_FORMATION_SPACING);
    bounds.clamp(*player + offset, 0.0)
}

/// Share of enemies near the player, only meaningful with companions around
fn formation_threat(snapshot: &GameSnapshot) -> Option<f32> {
    if snapshot.companions.is_empty() {
        return None;
    }
    if snapshot.enemies.is_empty() {
        return Some(0.0);
    }
    let near = snapshot
        .enemies
        .iter()
        .filter(|e| e.position.distance(&snapshot.player.position) <= THREAT_RADIUS)
        .count();
    Some(near as f32 / snapshot.enemies.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::curriculum::{CurriculumPhase, PhaseSettings};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn phase(index: usize) -> DifficultyConfig {
        DifficultyConfig::from(&PhaseSettings::default_phases()[index])
    }

    #[test]
    fn test_reset_follows_difficulty() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut arena = Arena::default();
        let snapshot = arena.reset(phase(2), TrainingRange::Patrol, &mut rng);

        assert_eq!(snapshot.enemies.len(), 6);
        assert_eq!(snapshot.obstacles.len(), 2);
        assert_eq!(snapshot.companions.len(), 2);
        assert!(snapshot.target.is_some());
        assert_eq!(snapshot.player.lives, 3);
        assert!(!snapshot.game_over);
    }

    #[test]
    fn test_boss_range_starts_with_boss() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut arena = Arena::default();
        let snapshot = arena.reset(DifficultyConfig::default(), TrainingRange::Boss, &mut rng);
        assert_eq!(snapshot.enemies.iter().filter(|e| e.is_boss).count(), 1);
        assert_eq!(snapshot.enemies.len(), 3);
    }

    #[test]
    fn test_step_is_pure_and_advances_time() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut arena = Arena::default();
        let snapshot = arena.reset(phase(0), TrainingRange::Movement, &mut rng);
        let copy = snapshot.clone();

        let step = arena.step(&snapshot, 3, &mut rng).unwrap();
        assert_eq!(snapshot, copy);
        assert!((step.snapshot.time - arena.config().dt).abs() < 1e-6);
        assert!(step.snapshot.player.position.x > snapshot.player.position.x);
    }

    #[test]
    fn test_boss_waves_follow_the_step_counter() {
        let mut rng = StdRng::seed_from_u64(17);
        let mut arena = Arena::default();
        let difficulty = DifficultyConfig {
            enemy_count: 0,
            boss_spawn_interval: 7000,
            ..DifficultyConfig::default()
        };
        let mut snapshot = arena.reset(difficulty, TrainingRange::Movement, &mut rng);
        // Accumulated float time drifts this far into an episode
        snapshot.step = 6999;
        snapshot.time = 233.2;

        let spawned = arena.step(&snapshot, 0, &mut rng).unwrap().snapshot;
        assert_eq!(spawned.step, 7000);
        assert_eq!(spawned.enemies.iter().filter(|e| e.is_boss).count(), 1);

        let after = arena.step(&spawned, 0, &mut rng).unwrap().snapshot;
        assert_eq!(after.step, 7001);
        assert_eq!(after.enemies.iter().filter(|e| e.is_boss).count(), 1);
    }

    #[test]
    fn test_rejects_action_outside_range_space() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut arena = Arena::default();
        let snapshot = arena.reset(phase(0), TrainingRange::Movement, &mut rng);
        assert!(arena.step(&snapshot, 9, &mut rng).is_err());
    }

    #[test]
    fn test_shooting_nearest_destroys_enemy_in_range() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut arena = Arena::default();
        let mut snapshot = arena.reset(phase(0), TrainingRange::Shooting, &mut rng);
        snapshot.enemies.truncate(1);
        snapshot.enemies[0].position = snapshot.player.position + Vec2::new(100.0, 0.0);

        let step = arena.step(&snapshot, 9, &mut rng).unwrap();
        assert_eq!(step.events.shots_fired, 1);
        assert_eq!(step.events.shots_hit, 1);
        assert_eq!(step.events.enemies_destroyed, 1);
        assert!(step.cleared());
        assert!(step.is_terminal());
    }

    #[test]
    fn test_projectile_hit_costs_a_life() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut arena = Arena::new(ArenaConfig {
            enemy_fire_chance: 0.0,
            ..ArenaConfig::default()
        });
        let mut snapshot = arena.reset(phase(0), TrainingRange::Movement, &mut rng);
        snapshot.enemies.clear();
        snapshot.projectiles.push(ProjectileState {
            position: snapshot.player.position,
            velocity: Vec2::ZERO,
        });

        let step = arena.step(&snapshot, 0, &mut rng).unwrap();
        assert_eq!(step.events.health_lost, 1);
        assert_eq!(step.snapshot.player.lives, 2);
        assert!(step.snapshot.projectiles.is_empty());
        assert!(!step.cleared());
    }

    #[test]
    fn test_last_life_ends_the_game() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut arena = Arena::default();
        let mut snapshot = arena.reset(phase(0), TrainingRange::Movement, &mut rng);
        snapshot.player.lives = 1;
        snapshot.enemies.truncate(1);
        snapshot.enemies[0].position = snapshot.player.position;

        let step = arena.step(&snapshot, 0, &mut rng).unwrap();
        assert!(step.snapshot.game_over);
        assert!(step.is_terminal());
    }

    #[test]
    fn test_stealth_enemies_ignore_distant_player() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut arena = Arena::default();
        let mut snapshot = arena.reset(phase(0), TrainingRange::Stealth, &mut rng);
        snapshot.enemies.truncate(1);
        snapshot.enemies[0].position = Vec2::new(20.0, 20.0);

        let step = arena.step(&snapshot, 0, &mut rng).unwrap();
        assert_eq!(step.snapshot.enemies[0].position, Vec2::new(20.0, 20.0));
    }

    #[test]
    fn test_reaching_waypoint_moves_it() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut arena = Arena::default();
        let mut snapshot = arena.reset(phase(0), TrainingRange::Patrol, &mut rng);
        snapshot.enemies.clear();
        snapshot.target = Some(snapshot.player.position);

        let step = arena.step(&snapshot, 0, &mut rng).unwrap();
        assert!(step.events.target_reached);
        assert!(step.snapshot.target.is_some());
    }

    #[test]
    fn test_range_presets() {
        assert_eq!(TrainingRange::Movement.action_space(), ActionSpace::Movement);
        assert_eq!(TrainingRange::Boss.action_space(), ActionSpace::Combat);
        assert!(TrainingRange::Shooting.encoder_config().include_target);
        assert!(!TrainingRange::Stealth.reward_shaper().terms().kill);
        assert_eq!(phase(4).phase, CurriculumPhase::MasterLevel);
    }
}
