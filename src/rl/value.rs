//! Linear action-value model trained with one-step Q-learning
//!
//! `Q(s, a) = dot(w_a, s)` with one weight vector per action. Each update moves
//! `w_a` along the state by `alpha * (target - Q(s, a))`, where the target is the
//! reward plus the discounted best next-state value (just the reward on terminal
//! steps). The update is unbounded; `gradient_clip` caps the TD error used in it
//! when large rewards make the weights diverge.

use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainingError};

use super::experience::{Experience, now_millis, write_json};
use super::metrics::MovingAverage;

/// Version written into every model snapshot
pub const SNAPSHOT_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QLearningConfig {
    /// Initial step size alpha
    pub learning_rate: f32,
    /// Discount factor gamma
    pub discount: f32,
    /// Initial exploration rate epsilon
    pub epsilon: f32,
    pub epsilon_min: f32,
    /// Multiplicative epsilon decay applied after every episode
    pub epsilon_decay: f32,
    /// Number of experiences per training batch
    pub batch_size: usize,
    /// Replay batches trained after each episode sweep
    pub replay_batches: usize,
    /// Adapt alpha from the recent episode rewards
    pub adaptive_learning_rate: bool,
    pub min_learning_rate: f32,
    pub max_learning_rate: f32,
    /// Average episode reward below which alpha grows and above which it decays
    pub adapt_threshold: f32,
    pub adapt_increase: f32,
    pub adapt_decay: f32,
    /// Episodes in the reward moving average
    pub reward_window: usize,
    /// Cap on |TD error| inside the update, `None` keeps the plain rule
    pub gradient_clip: Option<f32>,
    /// Half-width of the uniform weight initialization, zero for all-zero weights
    pub init_scale: f32,
}

impl Default for QLearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            discount: 0.95,
            epsilon: 0.3,
            epsilon_min: 0.05,
            epsilon_decay: 0.995,
            batch_size: 32,
            replay_batches: 2,
            adaptive_learning_rate: true,
            min_learning_rate: 0.0005,
            max_learning_rate: 0.05,
            adapt_threshold: 0.0,
            adapt_increase: 1.02,
            adapt_decay: 0.995,
            reward_window: 50,
            gradient_clip: None,
            init_scale: 0.01,
        }
    }
}

/// Hyperparameters stored alongside the weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub learning_rate: f32,
    pub discount_factor: f32,
    pub exploration_rate: f32,
    pub batch_size: usize,
    pub action_count: usize,
    pub state_size: usize,
}

/// Cumulative training counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingTotals {
    pub episodes_processed: u64,
    pub experiences_processed: u64,
    pub average_episode_reward: f32,
    pub average_loss: f32,
    pub batches_trained: u64,
}

/// Versioned export of a value table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub version: u32,
    pub hyperparameters: Hyperparameters,
    /// One row of `state_size` weights per action
    pub weights: Vec<Vec<f32>>,
    pub exported_at_ms: i64,
    pub metrics: TrainingTotals,
}

#[derive(Debug, Clone)]
pub struct ValueApproximator {
    config: QLearningConfig,
    state_size: usize,
    action_count: usize,
    weights: Vec<Vec<f32>>,
    learning_rate: f32,
    epsilon: f32,
    recent_rewards: MovingAverage,
    totals: TrainingTotals,
}

impl ValueApproximator {
    /// Fresh model with weights drawn from `[-init_scale, init_scale]`
    pub fn new(
        state_size: usize,
        action_count: usize,
        config: QLearningConfig,
        rng: &mut impl Rng,
    ) -> Self {
        let scale = config.init_scale;
        let weights = (0..action_count)
            .map(|_| {
                (0..state_size)
                    .map(|_| {
                        if scale > 0.0 {
                            rng.random_range(-scale..=scale)
                        } else {
                            0.0
                        }
                    })
                    .collect()
            })
            .collect();
        Self::with_weights(state_size, action_count, config, weights)
    }

    pub fn zeros(state_size: usize, action_count: usize, config: QLearningConfig) -> Self {
        let weights = vec![vec![0.0; state_size]; action_count];
        Self::with_weights(state_size, action_count, config, weights)
    }

    fn with_weights(
        state_size: usize,
        action_count: usize,
        config: QLearningConfig,
        weights: Vec<Vec<f32>>,
    ) -> Self {
        Self {
            learning_rate: config.learning_rate,
            epsilon: config.epsilon,
            recent_rewards: MovingAverage::new(config.reward_window),
            config,
            state_size,
            action_count,
            weights,
            totals: TrainingTotals::default(),
        }
    }

    pub fn state_size(&self) -> usize {
        self.state_size
    }

    pub fn action_count(&self) -> usize {
        self.action_count
    }

    pub fn config(&self) -> &QLearningConfig {
        &self.config
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    /// Override alpha, clamped to the configured range
    pub fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate =
            learning_rate.clamp(self.config.min_learning_rate, self.config.max_learning_rate);
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    pub fn set_epsilon(&mut self, epsilon: f32) {
        self.epsilon = epsilon.clamp(0.0, 1.0);
    }

    pub fn weights(&self) -> &[Vec<f32>] {
        &self.weights
    }

    pub fn totals(&self) -> &TrainingTotals {
        &self.totals
    }

    fn check_state(&self, state: &[f32]) -> Result<()> {
        if state.len() != self.state_size {
            return Err(TrainingError::Encoding {
                expected: self.state_size,
                actual: state.len(),
            });
        }
        Ok(())
    }

    fn check_action(&self, action: usize) -> Result<()> {
        if action >= self.action_count {
            return Err(TrainingError::InvalidAction {
                action,
                action_count: self.action_count,
            });
        }
        Ok(())
    }

    fn dot(weights: &[f32], state: &[f32]) -> f32 {
        weights.iter().zip(state).map(|(w, s)| w * s).sum()
    }

    /// Value estimate of every action
    pub fn q_values(&self, state: &[f32]) -> Result<Vec<f32>> {
        self.check_state(state)?;
        Ok(self.weights.iter().map(|w| Self::dot(w, state)).collect())
    }

    pub fn q_value(&self, state: &[f32], action: usize) -> Result<f32> {
        self.check_state(state)?;
        self.check_action(action)?;
        Ok(Self::dot(&self.weights[action], state))
    }

    /// Greedy action; ties go to the lowest index
    pub fn best_action(&self, state: &[f32]) -> Result<usize> {
        let q = self.q_values(state)?;
        Ok(argmax(&q))
    }

    /// Epsilon-greedy action selection
    pub fn select_action(&self, state: &[f32], rng: &mut impl Rng) -> Result<usize> {
        self.check_state(state)?;
        if self.action_count > 0 && rng.random::<f32>() < self.epsilon {
            return Ok(rng.random_range(0..self.action_count));
        }
        self.best_action(state)
    }

    fn max_q(&self, state: &[f32]) -> f32 {
        self.weights
            .iter()
            .map(|w| Self::dot(w, state))
            .fold(f32::NEG_INFINITY, f32::max)
    }

    /// Target value of an experience under the current weights
    pub fn target(&self, experience: &Experience) -> Result<f32> {
        if experience.done {
            return Ok(experience.reward);
        }
        self.check_state(&experience.next_state)?;
        Ok(experience.reward + self.config.discount * self.max_q(&experience.next_state))
    }

    /// `target - Q(s, a)` without updating
    pub fn td_error(&self, experience: &Experience) -> Result<f32> {
        let current = self.q_value(&experience.state, experience.action)?;
        Ok(self.target(experience)? - current)
    }

    /// One Q-learning step; returns the TD error measured before the step
    pub fn update(&mut self, experience: &Experience) -> Result<f32> {
        let td_error = self.td_error(experience)?;

        let delta = match self.config.gradient_clip {
            Some(limit) => td_error.clamp(-limit, limit),
            None => td_error,
        };
        let step = self.learning_rate * delta;
        for (w, s) in self.weights[experience.action]
            .iter_mut()
            .zip(&experience.state)
        {
            *w += step * s;
        }

        self.totals.experiences_processed += 1;
        Ok(td_error)
    }

    /// Sweep a batch in order; returns the mean squared TD error
    pub fn train_batch(&mut self, batch: &[Experience]) -> Result<f32> {
        if batch.is_empty() {
            return Ok(0.0);
        }

        let mut squared = 0.0;
        for experience in batch {
            let td_error = self.update(experience)?;
            squared += td_error * td_error;
        }
        let loss = squared / batch.len() as f32;

        self.totals.batches_trained += 1;
        let n = self.totals.batches_trained as f32;
        self.totals.average_loss += (loss - self.totals.average_loss) / n;
        Ok(loss)
    }

    /// Feed an episode reward into the alpha adaptation and epsilon decay
    pub fn record_episode(&mut self, total_reward: f32) {
        self.recent_rewards.push(total_reward);
        self.totals.episodes_processed += 1;
        let n = self.totals.episodes_processed as f32;
        self.totals.average_episode_reward +=
            (total_reward - self.totals.average_episode_reward) / n;

        if self.config.adaptive_learning_rate {
            let factor = if self.recent_rewards.average() < self.config.adapt_threshold {
                self.config.adapt_increase
            } else {
                self.config.adapt_decay
            };
            self.set_learning_rate(self.learning_rate * factor);
        }

        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
    }

    pub fn recent_reward_average(&self) -> f32 {
        self.recent_rewards.average()
    }

    pub fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot {
            version: SNAPSHOT_VERSION,
            hyperparameters: Hyperparameters {
                learning_rate: self.learning_rate,
                discount_factor: self.config.discount,
                exploration_rate: self.epsilon,
                batch_size: self.config.batch_size,
                action_count: self.action_count,
                state_size: self.state_size,
            },
            weights: self.weights.clone(),
            exported_at_ms: now_millis(),
            metrics: self.totals.clone(),
        }
    }

    /// Rebuild a model from a snapshot; the snapshot's alpha, gamma and epsilon win
    pub fn from_snapshot(snapshot: ModelSnapshot, config: QLearningConfig) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(TrainingError::Config(format!(
                "snapshot version {} is not supported (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }

        let hp = &snapshot.hyperparameters;
        let shape_ok = snapshot.weights.len() == hp.action_count
            && snapshot.weights.iter().all(|row| row.len() == hp.state_size);
        if !shape_ok {
            return Err(TrainingError::Config(format!(
                "snapshot weights do not match {} actions x {} features",
                hp.action_count, hp.state_size
            )));
        }

        let config = QLearningConfig {
            discount: hp.discount_factor,
            batch_size: hp.batch_size,
            ..config
        };
        let mut model =
            Self::with_weights(hp.state_size, hp.action_count, config, snapshot.weights);
        model.set_learning_rate(hp.learning_rate);
        model.set_epsilon(hp.exploration_rate);
        model.totals = snapshot.metrics;
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, &self.snapshot())
    }

    pub fn load(path: &Path, config: QLearningConfig) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).map_err(|e| TrainingError::persistence(path, e))?;
        let snapshot: ModelSnapshot =
            serde_json::from_str(&raw).map_err(|e| TrainingError::corrupt(path, e))?;
        Self::from_snapshot(snapshot, config)
    }

    /// Load a snapshot if it exists and matches the expected shape, else start fresh.
    /// Returns the model and whether it came from disk.
    pub fn load_or_init(
        path: &Path,
        state_size: usize,
        action_count: usize,
        config: QLearningConfig,
        rng: &mut impl Rng,
    ) -> (Self, bool) {
        if !path.exists() {
            tracing::debug!("No snapshot at {}, initializing fresh weights", path.display());
            return (Self::new(state_size, action_count, config, rng), false);
        }

        match Self::load(path, config.clone()) {
            Ok(model) if model.state_size == state_size && model.action_count == action_count => {
                tracing::info!(
                    "Loaded model from {} ({} episodes trained)",
                    path.display(),
                    model.totals.episodes_processed
                );
                (model, true)
            }
            Ok(model) => {
                tracing::warn!(
                    "Snapshot {} has shape {}x{}, expected {}x{}; starting fresh",
                    path.display(),
                    model.action_count,
                    model.state_size,
                    action_count,
                    state_size
                );
                (Self::new(state_size, action_count, config, rng), false)
            }
            Err(err) => {
                tracing::warn!("Cannot load snapshot: {}; starting fresh", err);
                (Self::new(state_size, action_count, config, rng), false)
            }
        }
    }
}

/// Index of the largest value, first one on ties
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::TempDir;

    fn config() -> QLearningConfig {
        QLearningConfig {
            adaptive_learning_rate: false,
            max_learning_rate: 1.0,
            ..QLearningConfig::default()
        }
    }

    fn unit_state(size: usize, hot: usize) -> Vec<f32> {
        let mut state = vec![0.0; size];
        state[hot] = 1.0;
        state
    }

    #[test]
    fn test_argmax_ties_go_to_first() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0, 2.0]), 1);
        assert_eq!(argmax(&[0.0, 0.0, 0.0]), 0);
    }

    #[test]
    fn test_wrong_state_length_fails_fast() {
        let model = ValueApproximator::zeros(30, 9, config());
        let mut rng = StdRng::seed_from_u64(1);

        assert!(matches!(
            model.q_values(&[0.0; 42]),
            Err(TrainingError::Encoding {
                expected: 30,
                actual: 42
            })
        ));
        assert!(model.select_action(&[0.0; 12], &mut rng).is_err());
    }

    #[test]
    fn test_invalid_action_rejected() {
        let mut model = ValueApproximator::zeros(4, 3, config());
        let exp = Experience::new(vec![0.0; 4], 3, 1.0, vec![0.0; 4], true, 1.0);
        assert!(matches!(
            model.update(&exp),
            Err(TrainingError::InvalidAction { .. })
        ));
    }

    #[test]
    fn test_update_reduces_squared_td_error() {
        let mut rng = StdRng::seed_from_u64(42);
        for &alpha in &[0.01_f32, 0.1, 0.5, 0.9, 1.0] {
            for trial in 0..20 {
                let cfg = QLearningConfig {
                    learning_rate: alpha,
                    init_scale: 0.5,
                    ..config()
                };
                let mut model = ValueApproximator::new(6, 4, cfg, &mut rng);

                // Unit-norm state so alpha * |s|^2 stays in (0, 1]
                let raw: Vec<f32> = (0..6).map(|_| rng.random_range(-1.0..1.0)).collect();
                let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-3);
                let state: Vec<f32> = raw.iter().map(|x| x / norm).collect();

                let exp = Experience::new(
                    state,
                    trial % 4,
                    rng.random_range(-50.0..50.0),
                    vec![0.0; 6],
                    true,
                    1.0,
                );

                let before = model.td_error(&exp).unwrap();
                model.update(&exp).unwrap();
                let after = model.td_error(&exp).unwrap();
                assert!(
                    after * after < before * before,
                    "alpha {}: {} -> {}",
                    alpha,
                    before,
                    after
                );
            }
        }
    }

    #[test]
    fn test_non_terminal_target_uses_discounted_max() {
        let mut model = ValueApproximator::zeros(2, 2, config());
        model.weights[1] = vec![2.0, 0.0];
        let exp = Experience::new(vec![0.0, 1.0], 0, 1.0, vec![1.0, 0.0], false, 1.0);

        let target = model.target(&exp).unwrap();
        assert!((target - (1.0 + 0.95 * 2.0)).abs() < 1e-6);
    }

    #[test]
    fn test_gradient_clip_limits_step() {
        let cfg = QLearningConfig {
            learning_rate: 1.0,
            gradient_clip: Some(1.0),
            ..config()
        };
        let mut model = ValueApproximator::zeros(2, 1, cfg);
        let exp = Experience::new(vec![1.0, 0.0], 0, 100.0, vec![0.0, 0.0], true, 1.0);

        let td = model.update(&exp).unwrap();
        assert_eq!(td, 100.0);
        assert_eq!(model.weights()[0], vec![1.0, 0.0]);
    }

    #[test]
    fn test_train_batch_reports_mse() {
        let mut model = ValueApproximator::zeros(3, 2, config());
        let batch = vec![
            Experience::new(unit_state(3, 0), 0, 2.0, vec![0.0; 3], true, 1.0),
            Experience::new(unit_state(3, 1), 1, -4.0, vec![0.0; 3], true, 1.0),
        ];

        let loss = model.train_batch(&batch).unwrap();
        assert!((loss - (4.0 + 16.0) / 2.0).abs() < 1e-5);
        assert_eq!(model.totals().experiences_processed, 2);
        assert_eq!(model.train_batch(&[]).unwrap(), 0.0);
    }

    #[test]
    fn test_epsilon_greedy_extremes() {
        let mut model = ValueApproximator::zeros(2, 3, config());
        model.weights[2] = vec![1.0, 1.0];
        let mut rng = StdRng::seed_from_u64(3);

        model.set_epsilon(0.0);
        for _ in 0..20 {
            assert_eq!(model.select_action(&[1.0, 1.0], &mut rng).unwrap(), 2);
        }

        model.set_epsilon(1.0);
        let mut seen = [false; 3];
        for _ in 0..200 {
            seen[model.select_action(&[1.0, 1.0], &mut rng).unwrap()] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_learning_rate_adapts_within_bounds() {
        let cfg = QLearningConfig {
            learning_rate: 0.01,
            min_learning_rate: 0.005,
            max_learning_rate: 0.02,
            adapt_threshold: 10.0,
            adapt_increase: 1.5,
            adapt_decay: 0.5,
            ..QLearningConfig::default()
        };
        let mut model = ValueApproximator::zeros(2, 2, cfg);

        model.record_episode(-5.0);
        assert!((model.learning_rate() - 0.015).abs() < 1e-6);
        model.record_episode(-5.0);
        assert!((model.learning_rate() - 0.02).abs() < 1e-6);

        for _ in 0..50 {
            model.record_episode(500.0);
        }
        assert!((model.learning_rate() - 0.005).abs() < 1e-6);
        assert!(model.epsilon() >= model.config().epsilon_min);
    }

    #[test]
    fn test_snapshot_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("movement.json");
        let mut rng = StdRng::seed_from_u64(9);

        let mut model = ValueApproximator::new(30, 9, config(), &mut rng);
        model.record_episode(12.0);
        model.save(&path).unwrap();

        let (loaded, from_disk) =
            ValueApproximator::load_or_init(&path, 30, 9, config(), &mut rng);
        assert!(from_disk);
        assert_eq!(loaded.weights(), model.weights());
        assert_eq!(loaded.totals().episodes_processed, 1);
    }

    #[test]
    fn test_missing_or_corrupt_snapshot_falls_back() {
        let dir = TempDir::new().unwrap();
        let mut rng = StdRng::seed_from_u64(5);

        let missing = dir.path().join("missing.json");
        let (model, from_disk) =
            ValueApproximator::load_or_init(&missing, 42, 12, config(), &mut rng);
        assert!(!from_disk);
        assert_eq!(model.weights().len(), 12);
        assert_eq!(model.weights()[0].len(), 42);

        let corrupt = dir.path().join("corrupt.json");
        std::fs::write(&corrupt, "{\"version\": 2, \"weights\": [").unwrap();
        let (_, from_disk) = ValueApproximator::load_or_init(&corrupt, 42, 12, config(), &mut rng);
        assert!(!from_disk);

        let mismatched = dir.path().join("mismatched.json");
        ValueApproximator::zeros(30, 9, config()).save(&mismatched).unwrap();
        let (model, from_disk) =
            ValueApproximator::load_or_init(&mismatched, 42, 12, config(), &mut rng);
        assert!(!from_disk);
        assert_eq!(model.state_size(), 42);
    }
}
