//! Parallel training coordinator - K independent environments behind an admission gate
//!
//! Each environment owns its learner, arena, curriculum and RNG. The only shared
//! state is the experience store and the aggregate results, both behind a mutex.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::error::{Result, TrainingError};
use crate::infra::CancellationFlag;

use super::arena::{Arena, ArenaConfig, TrainingRange};
use super::curriculum::{CurriculumPhase, CurriculumScheduler, PERFORMANCE_WINDOW, PhaseSettings};
use super::episode::{EpisodeOutcome, Learner, run_episode};
use super::experience::{SharedExperienceStore, StreamSink};
use super::metrics::TrainingMetrics;
use super::value::{QLearningConfig, ValueApproximator};

/// File name of the best environment's model inside `model_dir`
pub const BEST_MODEL_FILE: &str = "parallel_best.json";

#[derive(Debug, Clone)]
pub struct ParallelConfig {
    /// Number of independent environments (K)
    pub environments: usize,
    /// Environments allowed to run at the same time
    pub max_concurrency: usize,
    /// Episodes across all environments
    pub total_episodes: usize,
    /// Step budget per episode
    pub max_steps: usize,
    /// Environment `i` seeds its RNG with `seed + i`
    pub seed: u64,
    pub range: TrainingRange,
    pub q_learning: QLearningConfig,
    pub arena: ArenaConfig,
    pub phases: Vec<PhaseSettings>,
    /// Write every finished episode to the store's data directory
    pub persist_episodes: bool,
    /// Where to export the best environment's model
    pub model_dir: Option<PathBuf>,
    /// Episodes between progress log lines, counted in aggregate and per environment
    pub log_interval: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            environments: 4,
            max_concurrency: 4,
            total_episodes: 100,
            max_steps: 500,
            seed: 42,
            range: TrainingRange::Shooting,
            q_learning: QLearningConfig::default(),
            arena: ArenaConfig::default(),
            phases: PhaseSettings::default_phases(),
            persist_episodes: false,
            model_dir: None,
            log_interval: 25,
        }
    }
}

/// Statistics shared by all environments
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateResults {
    pub total_episodes: usize,
    /// Running mean of episode rewards
    pub average_reward: f32,
    /// Best composite performance score seen
    pub best_performance: f32,
    pub perfect_runs: usize,
    pub total_steps: usize,
}

impl AggregateResults {
    /// Fold one finished episode in; callers hold the lock for the whole update
    pub fn record(&mut self, outcome: &EpisodeOutcome, score: f32) {
        self.total_episodes += 1;
        let n = self.total_episodes as f32;
        self.average_reward += (outcome.total_reward - self.average_reward) / n;
        self.best_performance = self.best_performance.max(score);
        if outcome.is_perfect() {
            self.perfect_runs += 1;
        }
        self.total_steps += outcome.steps;
    }
}

/// What one environment did
#[derive(Debug, Clone)]
pub struct EnvironmentReport {
    pub index: usize,
    pub episodes_completed: usize,
    pub average_reward: f32,
    pub best_score: f32,
    pub final_phase: CurriculumPhase,
    /// Windowed statistics of the environment's recent episodes
    pub metrics: TrainingMetrics,
    pub model: ValueApproximator,
}

#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub aggregate: AggregateResults,
    pub environments: Vec<EnvironmentReport>,
    pub cancelled: bool,
    /// Path of the exported best model, if one was written
    pub best_model: Option<PathBuf>,
    pub elapsed: Duration,
}

impl TrainingReport {
    /// Environment with the highest average reward
    pub fn best_environment(&self) -> Option<&EnvironmentReport> {
        self.environments
            .iter()
            .filter(|env| env.episodes_completed > 0)
            .max_by(|a, b| a.average_reward.total_cmp(&b.average_reward))
    }
}

/// Split `total` episodes over `environments`, giving the remainder to the first ones
pub fn episode_split(total: usize, environments: usize) -> Vec<usize> {
    let environments = environments.max(1);
    let base = total / environments;
    let remainder = total % environments;
    (0..environments)
        .map(|i| base + usize::from(i < remainder))
        .collect()
}

pub struct ParallelTrainingCoordinator {
    config: ParallelConfig,
    store: SharedExperienceStore,
    results: Arc<Mutex<AggregateResults>>,
}

impl ParallelTrainingCoordinator {
    pub fn new(config: ParallelConfig, store: SharedExperienceStore) -> Self {
        Self {
            config,
            store,
            results: Arc::new(Mutex::new(AggregateResults::default())),
        }
    }

    pub fn config(&self) -> &ParallelConfig {
        &self.config
    }

    pub fn store(&self) -> &SharedExperienceStore {
        &self.store
    }

    /// Copy of the aggregate results so far
    pub fn results(&self) -> AggregateResults {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run every environment to completion or until `cancel` is set.
    ///
    /// Environments run on the blocking pool; a failing environment is logged and the
    /// others carry on.
    pub async fn run(&self, cancel: &CancellationFlag) -> Result<TrainingReport> {
        let start = Instant::now();
        let split = episode_split(self.config.total_episodes, self.config.environments);
        let gate = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));

        tracing::info!(
            "Starting parallel training: {} environments, {} episodes, concurrency {}",
            split.len(),
            self.config.total_episodes,
            self.config.max_concurrency.max(1)
        );

        let mut handles = Vec::with_capacity(split.len());
        for (index, episodes) in split.into_iter().enumerate() {
            let permit = gate
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| TrainingError::Worker(e.to_string()))?;

            let worker = EnvironmentWorker {
                index,
                episodes,
                config: self.config.clone(),
                store: self.store.clone(),
                results: self.results.clone(),
                cancel: cancel.clone(),
            };
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                worker.run()
            }));
        }

        let mut environments = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(Ok(report)) => environments.push(report),
                Ok(Err(err)) => tracing::error!("Environment failed: {}", err),
                Err(err) => tracing::error!("Environment task panicked: {}", err),
            }
        }

        let mut report = TrainingReport {
            aggregate: self.results(),
            environments,
            cancelled: cancel.is_cancelled(),
            best_model: None,
            elapsed: start.elapsed(),
        };

        if let Some(dir) = &self.config.model_dir
            && let Some(best) = report.best_environment()
        {
            let path = dir.join(BEST_MODEL_FILE);
            match best.model.save(&path) {
                Ok(()) => {
                    tracing::info!(
                        "Saved model of environment {} (avg reward {:.2}) to {}",
                        best.index,
                        best.average_reward,
                        path.display()
                    );
                    report.best_model = Some(path);
                }
                Err(err) => tracing::warn!("Failed to save best model: {}", err),
            }
        }

        let aggregate = &report.aggregate;
        tracing::info!(
            "Parallel training {}: {} episodes, avg reward {:.2}, best score {:.3}, perfect runs {}, {:.1}s",
            if report.cancelled { "cancelled" } else { "finished" },
            aggregate.total_episodes,
            aggregate.average_reward,
            aggregate.best_performance,
            aggregate.perfect_runs,
            report.elapsed.as_secs_f64()
        );

        Ok(report)
    }
}

/// State owned by one environment for the length of its run
struct EnvironmentWorker {
    index: usize,
    episodes: usize,
    config: ParallelConfig,
    store: SharedExperienceStore,
    results: Arc<Mutex<AggregateResults>>,
    cancel: CancellationFlag,
}

impl EnvironmentWorker {
    fn run(self) -> Result<EnvironmentReport> {
        let config = &self.config;
        let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(self.index as u64));
        let mut learner = Learner::new(config.range, config.q_learning.clone(), &mut rng);
        let mut curriculum = CurriculumScheduler::new(config.phases.clone());
        let mut arena = Arena::new(config.arena.clone());
        let mut sink = StreamSink::new(self.store.clone(), self.index, config.persist_episodes);
        let mut metrics = TrainingMetrics::new(PERFORMANCE_WINDOW);
        let label = format!("env {}", self.index);

        let mut completed = 0;
        let mut reward_sum = 0.0;
        let mut best_score: f32 = 0.0;

        tracing::debug!("Environment {} starting {} episodes", self.index, self.episodes);

        for _ in 0..self.episodes {
            if self.cancel.is_cancelled() {
                tracing::info!(
                    "Environment {} stopping after {} episodes",
                    self.index,
                    completed
                );
                break;
            }

            let difficulty = curriculum.start_new_episode();
            let outcome = run_episode(
                &mut learner,
                &mut arena,
                difficulty,
                config.max_steps,
                &mut rng,
                &mut sink,
            )?;
            let update = curriculum.record_performance(&outcome.performance);
            if update.advanced_to.is_some() {
                learner
                    .model
                    .set_learning_rate(curriculum.current().learning_rate);
            }

            completed += 1;
            reward_sum += outcome.total_reward;
            best_score = best_score.max(update.score);
            metrics.record_episode(
                outcome.total_reward,
                outcome.steps,
                outcome.loss,
                outcome.survived(),
                outcome.is_perfect(),
            );
            if config.log_interval > 0 && completed % config.log_interval == 0 {
                metrics.log_to_console(&label);
            }

            let mut results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
            results.record(&outcome, update.score);
            if config.log_interval > 0 && results.total_episodes % config.log_interval == 0 {
                tracing::info!(
                    "Progress: {}/{} episodes, avg reward {:.2}, best score {:.3}",
                    results.total_episodes,
                    config.total_episodes,
                    results.average_reward,
                    results.best_performance
                );
            }
        }
        if completed > 0 {
            metrics.log_to_console(&label);
        }

        Ok(EnvironmentReport {
            index: self.index,
            episodes_completed: completed,
            average_reward: if completed > 0 {
                reward_sum / completed as f32
            } else {
                0.0
            },
            best_score,
            final_phase: curriculum.phase(),
            metrics,
            model: learner.model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::experience::{ExperienceStore, StoreConfig, lock_store};

    fn quick_config() -> ParallelConfig {
        ParallelConfig {
            environments: 4,
            max_concurrency: 2,
            total_episodes: 100,
            max_steps: 15,
            range: TrainingRange::Movement,
            ..ParallelConfig::default()
        }
    }

    fn shared_store() -> SharedExperienceStore {
        ExperienceStore::with_session_id(StoreConfig::default(), "parallel").into_shared()
    }

    #[test]
    fn test_episode_split_is_exact() {
        assert_eq!(episode_split(100, 4), vec![25, 25, 25, 25]);
        assert_eq!(episode_split(10, 4), vec![3, 3, 2, 2]);
        assert_eq!(episode_split(3, 0), vec![3]);
        assert_eq!(episode_split(7, 3).iter().sum::<usize>(), 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_four_environments_count_exactly_one_hundred() {
        let store = shared_store();
        let coordinator = ParallelTrainingCoordinator::new(quick_config(), store.clone());

        let report = coordinator.run(&CancellationFlag::new()).await.unwrap();

        assert!(!report.cancelled);
        assert_eq!(report.aggregate.total_episodes, 100);
        assert_eq!(report.environments.len(), 4);
        assert_eq!(
            report
                .environments
                .iter()
                .map(|e| e.episodes_completed)
                .sum::<usize>(),
            100
        );
        for env in &report.environments {
            assert_eq!(env.metrics.total_episodes, env.episodes_completed);
            assert!(env.metrics.episode_lengths.average() <= 15.0);
        }

        let store = lock_store(&store);
        assert_eq!(store.episodes_completed(), 100);
        assert_eq!(store.experiences_recorded(), report.aggregate.total_steps);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_run_does_no_episodes() {
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let coordinator = ParallelTrainingCoordinator::new(quick_config(), shared_store());

        let report = coordinator.run(&cancel).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.aggregate.total_episodes, 0);
        assert!(report.best_environment().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_exports_best_model() {
        let dir = tempfile::tempdir().unwrap();
        let config = ParallelConfig {
            environments: 2,
            total_episodes: 6,
            model_dir: Some(dir.path().to_path_buf()),
            ..quick_config()
        };
        let coordinator = ParallelTrainingCoordinator::new(config, shared_store());

        let report = coordinator.run(&CancellationFlag::new()).await.unwrap();
        let path = report.best_model.unwrap();
        assert_eq!(path, dir.path().join(BEST_MODEL_FILE));

        let (model, loaded) = ValueApproximator::load_or_init(
            &path,
            30,
            9,
            QLearningConfig::default(),
            &mut StdRng::seed_from_u64(0),
        );
        assert!(loaded);
        assert!(model.totals().episodes_processed > 0);
    }

    #[test]
    fn test_aggregate_running_average() {
        let mut results = AggregateResults::default();
        let mut outcome = EpisodeOutcome {
            total_reward: 10.0,
            steps: 5,
            loss: 0.0,
            performance: Default::default(),
            cleared: false,
        };
        results.record(&outcome, 0.4);
        outcome.total_reward = 20.0;
        results.record(&outcome, 0.2);

        assert_eq!(results.total_episodes, 2);
        assert!((results.average_reward - 15.0).abs() < 1e-6);
        assert_eq!(results.best_performance, 0.4);
        assert_eq!(results.total_steps, 10);
    }
}
