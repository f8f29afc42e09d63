//! Episode runner - one full encode, select, step, shape, record loop

use std::collections::VecDeque;

use rand::Rng;

use crate::error::Result;
use crate::infra::Vec2;

use super::arena::{Arena, TrainingRange};
use super::curriculum::{DifficultyConfig, PerformanceSnapshot};
use super::encoder::StateEncoder;
use super::experience::{Experience, ExperienceSink};
use super::reward::{RewardShaper, StepDelta};
use super::value::{QLearningConfig, ValueApproximator};

/// Steps over which player displacement is measured for the stationary penalty
pub const STATIONARY_WINDOW: usize = 30;

/// Everything one learner needs to play and learn in its range
#[derive(Debug, Clone)]
pub struct Learner {
    pub range: TrainingRange,
    pub encoder: StateEncoder,
    pub shaper: RewardShaper,
    pub model: ValueApproximator,
}

impl Learner {
    /// Fresh learner using the range's presets
    pub fn new(range: TrainingRange, config: QLearningConfig, rng: &mut impl Rng) -> Self {
        let encoder = StateEncoder::new(range.encoder_config());
        let model = ValueApproximator::new(
            encoder.state_size(),
            range.action_space().size(),
            config,
            rng,
        );
        Self::with_model(range, model)
    }

    pub fn with_model(range: TrainingRange, model: ValueApproximator) -> Self {
        Self {
            range,
            encoder: StateEncoder::new(range.encoder_config()),
            shaper: range.reward_shaper(),
            model,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeOutcome {
    pub total_reward: f32,
    pub steps: usize,
    /// Mean squared TD error of the end-of-episode training pass
    pub loss: f32,
    pub performance: PerformanceSnapshot,
    /// Ended because every enemy was destroyed
    pub cleared: bool,
}

impl EpisodeOutcome {
    pub fn survived(&self) -> bool {
        !self.performance.game_over
    }

    pub fn is_perfect(&self) -> bool {
        self.performance.is_perfect()
    }
}

/// Player displacement between the oldest and newest position of a sliding window
#[derive(Debug, Clone)]
pub(crate) struct DisplacementWindow {
    positions: VecDeque<Vec2>,
    size: usize,
}

impl DisplacementWindow {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            positions: VecDeque::with_capacity(size + 1),
            size,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.positions.clear();
    }

    pub(crate) fn push(&mut self, position: Vec2) -> Option<f32> {
        self.positions.push_back(position);
        if self.positions.len() > self.size {
            self.positions.pop_front();
        }
        if self.positions.len() < self.size {
            return None;
        }
        match (self.positions.front(), self.positions.back()) {
            (Some(first), Some(last)) => Some(first.distance(last)),
            _ => None,
        }
    }
}

/// Play one episode against `arena`, feed every experience to `sink`, then train on the episode.
///
/// Training happens once the episode is over: the approximator sees the episode in
/// `batch_size` chunks followed by `replay_batches` batches sampled from the sink's
/// replay buffer, the total reward goes into the learning-rate adaptation and epsilon
/// decays one notch.
pub fn run_episode(
    learner: &mut Learner,
    arena: &mut Arena,
    difficulty: DifficultyConfig,
    max_steps: usize,
    rng: &mut impl Rng,
    sink: &mut dyn ExperienceSink,
) -> Result<EpisodeOutcome> {
    let mut snapshot = arena.reset(difficulty, learner.range, rng);
    let mut state = learner.encoder.encode(&snapshot);
    let mut window = DisplacementWindow::new(STATIONARY_WINDOW);
    window.push(snapshot.player.position);

    let mut experiences = Vec::with_capacity(max_steps);
    let mut performance = PerformanceSnapshot {
        max_steps,
        max_lives: snapshot.player.max_lives,
        ..PerformanceSnapshot::default()
    };
    let mut total_reward = 0.0;
    let mut steps = 0;
    let mut cleared = false;

    while steps < max_steps {
        let action = learner.model.select_action(&state, rng)?;
        let result = arena.step(&snapshot, action, rng)?;
        steps += 1;

        let done = result.is_terminal() || steps >= max_steps;
        let events = result.events;
        let delta = StepDelta {
            enemies_destroyed: events.enemies_destroyed,
            projectiles_intercepted: events.projectiles_intercepted,
            health_lost: events.health_lost,
            window_displacement: window.push(result.snapshot.player.position),
            episode_ended: done,
        };
        let reward = learner.shaper.shape(&delta, &result.snapshot);
        let next_state = learner.encoder.encode(&result.snapshot);

        let experience = Experience::new(
            state,
            action,
            reward,
            next_state.clone(),
            done,
            1.0 - learner.model.epsilon(),
        );
        sink.record(experience.clone());
        experiences.push(experience);

        total_reward += reward;
        performance.enemies_destroyed += events.enemies_destroyed;
        performance.projectiles_intercepted += events.projectiles_intercepted;
        performance.shots_fired += events.shots_fired;
        performance.shots_hit += events.shots_hit;
        performance.lives_lost += events.health_lost;

        cleared = result.cleared();
        snapshot = result.snapshot;
        state = next_state;
        if done {
            break;
        }
    }
    sink.finish_episode();

    performance.game_over = snapshot.game_over;
    // An early clear counts as surviving the whole episode
    performance.steps_survived = if cleared && !snapshot.game_over {
        max_steps
    } else {
        steps
    };

    let batch_size = learner.model.config().batch_size.max(1);
    let mut loss_sum = 0.0;
    let mut batches = 0;
    for batch in experiences.chunks(batch_size) {
        loss_sum += learner.model.train_batch(batch)?;
        batches += 1;
    }
    for _ in 0..learner.model.config().replay_batches {
        let replay = sink.sample_replay(&mut *rng, batch_size);
        if replay.is_empty() {
            break;
        }
        loss_sum += learner.model.train_batch(&replay)?;
        batches += 1;
    }
    let loss = if batches > 0 {
        loss_sum / batches as f32
    } else {
        0.0
    };
    learner.model.record_episode(total_reward);

    Ok(EpisodeOutcome {
        total_reward,
        steps,
        loss,
        performance,
        cleared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::experience::{DiscardSink, ExperienceStore, StoreConfig};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_episode_records_every_step() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut learner =
            Learner::new(TrainingRange::Movement, QLearningConfig::default(), &mut rng);
        let mut arena = Arena::default();
        let mut store = ExperienceStore::with_session_id(StoreConfig::default(), "test");

        let outcome = run_episode(
            &mut learner,
            &mut arena,
            DifficultyConfig::default(),
            60,
            &mut rng,
            &mut store,
        )
        .unwrap();

        assert!(outcome.steps >= 1 && outcome.steps <= 60);
        assert_eq!(store.experiences_recorded(), outcome.steps);
        assert_eq!(store.episodes_completed(), 1);
        assert_eq!(store.current_len(), 0);
        assert_eq!(outcome.performance.max_steps, 60);
        assert!(outcome.loss >= 0.0);

        let replayed = 2 * outcome.steps.min(32);
        assert_eq!(
            learner.model.totals().experiences_processed as usize,
            outcome.steps + replayed
        );
    }

    #[test]
    fn test_replay_needs_a_replaying_sink() {
        let mut rng = StdRng::seed_from_u64(8);
        let config = QLearningConfig {
            replay_batches: 3,
            ..QLearningConfig::default()
        };
        let mut learner = Learner::new(TrainingRange::Movement, config, &mut rng);

        let outcome = run_episode(
            &mut learner,
            &mut Arena::default(),
            DifficultyConfig::default(),
            50,
            &mut rng,
            &mut DiscardSink,
        )
        .unwrap();

        assert_eq!(
            learner.model.totals().experiences_processed as usize,
            outcome.steps
        );
    }

    #[test]
    fn test_episode_trains_and_decays_epsilon() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut learner =
            Learner::new(TrainingRange::Shooting, QLearningConfig::default(), &mut rng);
        let before = learner.model.weights().to_vec();
        let epsilon = learner.model.epsilon();

        run_episode(
            &mut learner,
            &mut Arena::default(),
            DifficultyConfig::default(),
            40,
            &mut rng,
            &mut DiscardSink,
        )
        .unwrap();

        assert!(learner.model.epsilon() < epsilon);
        assert_ne!(learner.model.weights(), before.as_slice());
        assert_eq!(learner.model.totals().episodes_processed, 1);
    }

    #[test]
    fn test_zero_steps_is_a_no_op_episode() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut learner = Learner::new(TrainingRange::Patrol, QLearningConfig::default(), &mut rng);
        let outcome = run_episode(
            &mut learner,
            &mut Arena::default(),
            DifficultyConfig::default(),
            0,
            &mut rng,
            &mut DiscardSink,
        )
        .unwrap();

        assert_eq!(outcome.steps, 0);
        assert_eq!(outcome.loss, 0.0);
        assert_eq!(outcome.total_reward, 0.0);
    }

    #[test]
    fn test_displacement_window_waits_until_full() {
        let mut window = DisplacementWindow::new(3);
        assert_eq!(window.push(Vec2::new(0.0, 0.0)), None);
        assert_eq!(window.push(Vec2::new(1.0, 0.0)), None);
        assert_eq!(window.push(Vec2::new(2.0, 0.0)), Some(2.0));
        assert_eq!(window.push(Vec2::new(2.0, 0.0)), Some(1.0));
    }
}
