//! Curriculum scheduler - ordered difficulty phases advanced on measured performance

use serde::{Deserialize, Serialize};

use super::metrics::MovingAverage;

/// Episodes kept in the performance window
pub const PERFORMANCE_WINDOW: usize = 50;

/// Kills per episode at which the combat score saturates
pub const COMBAT_CEILING: f32 = 10.0;

/// Flat score bonus for a perfect run
pub const PERFECT_BONUS: f32 = 0.1;

const SURVIVAL_WEIGHT: f32 = 0.4;
const COMBAT_WEIGHT: f32 = 0.3;
const EFFICIENCY_WEIGHT: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CurriculumPhase {
    BasicMovement,
    SlowEnemies,
    NormalDifficulty,
    AdvancedTactics,
    MasterLevel,
}

impl CurriculumPhase {
    pub fn name(&self) -> &'static str {
        match self {
            CurriculumPhase::BasicMovement => "basic movement",
            CurriculumPhase::SlowEnemies => "slow enemies",
            CurriculumPhase::NormalDifficulty => "normal difficulty",
            CurriculumPhase::AdvancedTactics => "advanced tactics",
            CurriculumPhase::MasterLevel => "master level",
        }
    }
}

/// Parameters of one curriculum phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSettings {
    pub phase: CurriculumPhase,
    pub min_episodes: usize,
    pub max_episodes: usize,
    /// Moving-average score needed to advance after `min_episodes`
    pub performance_threshold: f32,
    pub enemy_count: usize,
    /// Multiplier on the base enemy speed
    pub enemy_speed: f32,
    /// Steps between boss spawns, 0 disables bosses
    pub boss_spawn_interval: usize,
    pub hazard_count: usize,
    pub companion_count: usize,
    pub learning_rate: f32,
}

impl PhaseSettings {
    pub fn default_phases() -> Vec<PhaseSettings> {
        vec![
            PhaseSettings {
                phase: CurriculumPhase::BasicMovement,
                min_episodes: 50,
                max_episodes: 200,
                performance_threshold: 0.5,
                enemy_count: 2,
                enemy_speed: 0.5,
                boss_spawn_interval: 0,
                hazard_count: 0,
                companion_count: 0,
                learning_rate: 0.01,
            },
            PhaseSettings {
                phase: CurriculumPhase::SlowEnemies,
                min_episodes: 100,
                max_episodes: 300,
                performance_threshold: 0.55,
                enemy_count: 4,
                enemy_speed: 0.7,
                boss_spawn_interval: 0,
                hazard_count: 1,
                companion_count: 1,
                learning_rate: 0.008,
            },
            PhaseSettings {
                phase: CurriculumPhase::NormalDifficulty,
                min_episodes: 150,
                max_episodes: 400,
                performance_threshold: 0.6,
                enemy_count: 6,
                enemy_speed: 1.0,
                boss_spawn_interval: 600,
                hazard_count: 2,
                companion_count: 2,
                learning_rate: 0.005,
            },
            PhaseSettings {
                phase: CurriculumPhase::AdvancedTactics,
                min_episodes: 200,
                max_episodes: 500,
                performance_threshold: 0.65,
                enemy_count: 8,
                enemy_speed: 1.25,
                boss_spawn_interval: 400,
                hazard_count: 3,
                companion_count: 3,
                learning_rate: 0.003,
            },
            PhaseSettings {
                phase: CurriculumPhase::MasterLevel,
                min_episodes: 250,
                max_episodes: usize::MAX,
                performance_threshold: 0.7,
                enemy_count: 10,
                enemy_speed: 1.5,
                boss_spawn_interval: 300,
                hazard_count: 4,
                companion_count: 4,
                learning_rate: 0.001,
            },
        ]
    }
}

/// Difficulty handed to the environment for one episode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyConfig {
    pub phase: CurriculumPhase,
    pub enemy_count: usize,
    pub enemy_speed: f32,
    pub boss_spawn_interval: usize,
    pub hazard_count: usize,
    pub companion_count: usize,
    pub learning_rate: f32,
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        Self {
            phase: CurriculumPhase::BasicMovement,
            enemy_count: 2,
            enemy_speed: 0.5,
            boss_spawn_interval: 0,
            hazard_count: 0,
            companion_count: 0,
            learning_rate: 0.01,
        }
    }
}

impl From<&PhaseSettings> for DifficultyConfig {
    fn from(settings: &PhaseSettings) -> Self {
        Self {
            phase: settings.phase,
            enemy_count: settings.enemy_count,
            enemy_speed: settings.enemy_speed,
            boss_spawn_interval: settings.boss_spawn_interval,
            hazard_count: settings.hazard_count,
            companion_count: settings.companion_count,
            learning_rate: settings.learning_rate,
        }
    }
}

/// How an episode went, as input to the composite score
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub steps_survived: usize,
    pub max_steps: usize,
    pub enemies_destroyed: u32,
    pub projectiles_intercepted: u32,
    pub shots_fired: u32,
    pub shots_hit: u32,
    pub lives_lost: u32,
    pub max_lives: u32,
    pub game_over: bool,
}

impl PerformanceSnapshot {
    /// Survived the whole episode without losing a life
    pub fn is_perfect(&self) -> bool {
        !self.game_over && self.lives_lost == 0 && self.steps_survived >= self.max_steps
    }

    /// Weighted score in [0, 1]
    pub fn composite_score(&self) -> f32 {
        let survival = if self.max_steps > 0 {
            (self.steps_survived as f32 / self.max_steps as f32).min(1.0)
        } else {
            0.0
        };

        let combat = ((self.enemies_destroyed + self.projectiles_intercepted) as f32
            / COMBAT_CEILING)
            .min(1.0);

        let accuracy = if self.shots_fired > 0 {
            self.shots_hit as f32 / self.shots_fired as f32
        } else {
            1.0
        };
        let health_kept = if self.max_lives > 0 {
            1.0 - (self.lives_lost as f32 / self.max_lives as f32).min(1.0)
        } else {
            0.0
        };
        let efficiency = 0.5 * accuracy + 0.5 * health_kept;

        let mut score =
            SURVIVAL_WEIGHT * survival + COMBAT_WEIGHT * combat + EFFICIENCY_WEIGHT * efficiency;
        if self.is_perfect() {
            score += PERFECT_BONUS;
        }
        score.clamp(0.0, 1.0)
    }
}

/// Result of recording one episode's performance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceUpdate {
    pub score: f32,
    pub moving_average: f32,
    /// Phase entered by this call, if it advanced
    pub advanced_to: Option<CurriculumPhase>,
}

#[derive(Debug, Clone)]
pub struct CurriculumScheduler {
    phases: Vec<PhaseSettings>,
    phase_index: usize,
    episodes_recorded_in_phase: usize,
    total_episodes: usize,
    window: MovingAverage,
}

impl CurriculumScheduler {
    /// Scheduler over `phases` in order. An empty list falls back to the default phases.
    pub fn new(phases: Vec<PhaseSettings>) -> Self {
        let phases = if phases.is_empty() {
            PhaseSettings::default_phases()
        } else {
            phases
        };
        Self {
            phases,
            phase_index: 0,
            episodes_recorded_in_phase: 0,
            total_episodes: 0,
            window: MovingAverage::new(PERFORMANCE_WINDOW),
        }
    }

    pub fn phase_index(&self) -> usize {
        self.phase_index
    }

    pub fn current(&self) -> &PhaseSettings {
        &self.phases[self.phase_index]
    }

    pub fn phase(&self) -> CurriculumPhase {
        self.current().phase
    }

    pub fn is_terminal(&self) -> bool {
        self.phase_index + 1 >= self.phases.len()
    }

    pub fn total_episodes(&self) -> usize {
        self.total_episodes
    }

    pub fn episodes_in_phase(&self) -> usize {
        self.episodes_recorded_in_phase
    }

    pub fn moving_average(&self) -> f32 {
        self.window.average()
    }

    /// Difficulty for the next episode
    pub fn start_new_episode(&mut self) -> DifficultyConfig {
        self.total_episodes += 1;
        DifficultyConfig::from(self.current())
    }

    pub fn record_performance(&mut self, snapshot: &PerformanceSnapshot) -> PerformanceUpdate {
        self.record_score(snapshot.composite_score())
    }

    /// Push a score in [0, 1] and apply the advancement rule
    pub fn record_score(&mut self, score: f32) -> PerformanceUpdate {
        let score = score.clamp(0.0, 1.0);
        self.window.push(score);
        self.episodes_recorded_in_phase += 1;
        let moving_average = self.window.average();

        let settings = self.current();
        let ready = self.episodes_recorded_in_phase >= settings.min_episodes
            && moving_average >= settings.performance_threshold;
        let exhausted = self.episodes_recorded_in_phase >= settings.max_episodes;

        let advanced_to = if !self.is_terminal() && (ready || exhausted) {
            let from = settings.phase;
            self.phase_index += 1;
            self.episodes_recorded_in_phase = 0;
            self.window.clear();

            let to = self.phase();
            tracing::info!(
                "Curriculum advanced from {} to {} (avg score {:.3}{})",
                from.name(),
                to.name(),
                moving_average,
                if ready { "" } else { ", episode cap reached" }
            );
            Some(to)
        } else {
            None
        };

        PerformanceUpdate {
            score,
            moving_average,
            advanced_to,
        }
    }

    /// Start a new run from the first phase
    pub fn reset(&mut self) {
        self.phase_index = 0;
        self.episodes_recorded_in_phase = 0;
        self.total_episodes = 0;
        self.window.clear();
    }
}

impl Default for CurriculumScheduler {
    fn default() -> Self {
        Self::new(PhaseSettings::default_phases())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_phases(min_episodes: usize, max_episodes: usize, threshold: f32) -> Vec<PhaseSettings> {
        let mut phases = PhaseSettings::default_phases();
        phases[0].min_episodes = min_episodes;
        phases[0].max_episodes = max_episodes;
        phases[0].performance_threshold = threshold;
        phases.truncate(2);
        phases
    }

    #[test]
    fn test_advances_on_min_episode_with_good_average() {
        let mut scheduler = CurriculumScheduler::new(two_phases(100, 1000, 0.6));

        for _ in 0..99 {
            scheduler.start_new_episode();
            let update = scheduler.record_score(0.65);
            assert!(update.advanced_to.is_none());
        }
        scheduler.start_new_episode();
        let update = scheduler.record_score(0.65);
        assert_eq!(update.advanced_to, Some(CurriculumPhase::SlowEnemies));
        assert_eq!(scheduler.phase_index(), 1);
        assert_eq!(scheduler.episodes_in_phase(), 0);
        assert_eq!(scheduler.moving_average(), 0.0);
    }

    #[test]
    fn test_does_not_advance_below_threshold() {
        let mut scheduler = CurriculumScheduler::new(two_phases(100, 1000, 0.6));
        for _ in 0..100 {
            scheduler.start_new_episode();
            assert!(scheduler.record_score(0.55).advanced_to.is_none());
        }
        assert_eq!(scheduler.phase_index(), 0);
    }

    #[test]
    fn test_never_advances_before_min_episodes() {
        let mut scheduler = CurriculumScheduler::new(two_phases(10, 1000, 0.0));
        for i in 1..10 {
            scheduler.record_score(1.0);
            assert_eq!(scheduler.phase_index(), 0, "advanced after {} episodes", i);
        }
        scheduler.record_score(1.0);
        assert_eq!(scheduler.phase_index(), 1);
    }

    #[test]
    fn test_max_episodes_forces_advance() {
        let mut scheduler = CurriculumScheduler::new(two_phases(5, 20, 0.9));
        for _ in 0..19 {
            scheduler.record_score(0.0);
        }
        assert_eq!(scheduler.phase_index(), 0);
        let update = scheduler.record_score(0.0);
        assert_eq!(update.advanced_to, Some(CurriculumPhase::SlowEnemies));
    }

    #[test]
    fn test_terminal_phase_is_absorbing_and_index_monotonic() {
        let mut scheduler = CurriculumScheduler::new(two_phases(1, 1, 0.0));
        let mut last = 0;
        for i in 0..100 {
            scheduler.record_score((i % 7) as f32 / 7.0);
            assert!(scheduler.phase_index() >= last);
            last = scheduler.phase_index();
        }
        assert_eq!(scheduler.phase_index(), 1);
        assert!(scheduler.is_terminal());

        scheduler.reset();
        assert_eq!(scheduler.phase_index(), 0);
    }

    #[test]
    fn test_start_new_episode_reports_current_phase() {
        let mut scheduler = CurriculumScheduler::default();
        let difficulty = scheduler.start_new_episode();
        assert_eq!(difficulty.phase, CurriculumPhase::BasicMovement);
        assert_eq!(difficulty.enemy_count, 2);
        assert_eq!(scheduler.total_episodes(), 1);
        // Only recorded episodes count towards advancement
        assert_eq!(scheduler.episodes_in_phase(), 0);
        scheduler.record_score(0.1);
        assert_eq!(scheduler.episodes_in_phase(), 1);
    }

    #[test]
    fn test_composite_score_bounds_and_perfect_bonus() {
        let perfect = PerformanceSnapshot {
            steps_survived: 500,
            max_steps: 500,
            enemies_destroyed: 25,
            projectiles_intercepted: 0,
            shots_fired: 30,
            shots_hit: 30,
            lives_lost: 0,
            max_lives: 3,
            game_over: false,
        };
        assert!(perfect.is_perfect());
        assert_eq!(perfect.composite_score(), 1.0);

        let died = PerformanceSnapshot {
            steps_survived: 100,
            game_over: true,
            lives_lost: 3,
            shots_hit: 0,
            enemies_destroyed: 0,
            ..perfect
        };
        // survival 0.2 * 0.4, no combat, accuracy 0 and no health left
        assert!((died.composite_score() - 0.08).abs() < 1e-5);
    }
}
