//! Multi-agent cyclic orchestrator - trains a roster of range specialists one block at a time
//!
//! ```text
//! cycle 1: movement ×N → shooting ×N → patrol ×N → stealth ×N → boss ×N → persist all
//! cycle 2: ...
//! ```
//!
//! Cancellation is checked before every agent block, cycle and time limits before
//! every cycle. Every exit path persists the whole roster.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::Result;
use crate::infra::{BlockSummary, CancellationFlag, TrainingObserver};

use super::arena::{Arena, ArenaConfig, TrainingRange};
use super::curriculum::{CurriculumPhase, CurriculumScheduler, PERFORMANCE_WINDOW, PhaseSettings};
use super::episode::{EpisodeOutcome, Learner, run_episode};
use super::experience::{DiscardSink, SharedExperienceStore, StreamSink};
use super::metrics::TrainingMetrics;
use super::value::{QLearningConfig, ValueApproximator};

/// Result of one training episode of an agent
#[derive(Debug, Clone, PartialEq)]
pub struct AgentEpisode {
    pub outcome: EpisodeOutcome,
    /// Composite curriculum score of the episode
    pub score: f32,
    pub advanced_to: Option<CurriculumPhase>,
}

/// Learning state shown in progress reports
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentStatus {
    pub phase: CurriculumPhase,
    pub epsilon: f32,
    pub learning_rate: f32,
}

/// Contract every agent of the roster implements
pub trait TrainableAgent: Send {
    fn name(&self) -> &str;

    /// Write the agent's model into `dir`, returning the file written
    fn save_model(&self, dir: &Path) -> Result<PathBuf>;

    /// Replace the model with the one stored in `dir`, or with fresh weights when there
    /// is no usable snapshot. Returns true when the model came from disk.
    fn load_model(&mut self, dir: &Path, rng: &mut StdRng) -> bool;

    fn train_episode(&mut self, rng: &mut StdRng) -> Result<AgentEpisode>;

    fn status(&self) -> AgentStatus;

    /// Windowed training statistics, when the agent keeps them
    fn metrics(&self) -> Option<&TrainingMetrics> {
        None
    }
}

/// Agent bound to one training range
pub struct RangeAgent {
    name: String,
    learner: Learner,
    curriculum: CurriculumScheduler,
    metrics: TrainingMetrics,
    arena: Arena,
    max_steps: usize,
    config: QLearningConfig,
    sink: Option<StreamSink>,
}

impl RangeAgent {
    pub fn new(
        range: TrainingRange,
        config: QLearningConfig,
        arena: ArenaConfig,
        max_steps: usize,
        rng: &mut StdRng,
    ) -> Self {
        Self {
            name: range.name().to_string(),
            learner: Learner::new(range, config.clone(), rng),
            curriculum: CurriculumScheduler::new(PhaseSettings::default_phases()),
            metrics: TrainingMetrics::new(PERFORMANCE_WINDOW),
            arena: Arena::new(arena),
            max_steps,
            config,
            sink: None,
        }
    }

    /// Record this agent's episodes into `store` under `stream`, writing each to disk
    pub fn with_store(mut self, store: SharedExperienceStore, stream: usize) -> Self {
        self.sink = Some(StreamSink::new(store, stream, true));
        self
    }

    pub fn range(&self) -> TrainingRange {
        self.learner.range
    }

    pub fn model(&self) -> &ValueApproximator {
        &self.learner.model
    }

    pub fn curriculum(&self) -> &CurriculumScheduler {
        &self.curriculum
    }

    fn model_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.json", self.name))
    }
}

impl TrainableAgent for RangeAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn save_model(&self, dir: &Path) -> Result<PathBuf> {
        let path = self.model_path(dir);
        self.learner.model.save(&path)?;
        Ok(path)
    }

    fn load_model(&mut self, dir: &Path, rng: &mut StdRng) -> bool {
        let path = self.model_path(dir);
        let (model, loaded) = ValueApproximator::load_or_init(
            &path,
            self.learner.encoder.state_size(),
            self.learner.range.action_space().size(),
            self.config.clone(),
            rng,
        );
        self.learner.model = model;
        loaded
    }

    fn train_episode(&mut self, rng: &mut StdRng) -> Result<AgentEpisode> {
        let difficulty = self.curriculum.start_new_episode();
        let outcome = match self.sink.as_mut() {
            Some(sink) => run_episode(
                &mut self.learner,
                &mut self.arena,
                difficulty,
                self.max_steps,
                rng,
                sink,
            )?,
            None => run_episode(
                &mut self.learner,
                &mut self.arena,
                difficulty,
                self.max_steps,
                rng,
                &mut DiscardSink,
            )?,
        };

        let update = self.curriculum.record_performance(&outcome.performance);
        if update.advanced_to.is_some() {
            self.learner
                .model
                .set_learning_rate(self.curriculum.current().learning_rate);
        }
        self.metrics.record_episode(
            outcome.total_reward,
            outcome.steps,
            outcome.loss,
            outcome.survived(),
            outcome.is_perfect(),
        );

        Ok(AgentEpisode {
            outcome,
            score: update.score,
            advanced_to: update.advanced_to,
        })
    }

    fn status(&self) -> AgentStatus {
        AgentStatus {
            phase: self.curriculum.phase(),
            epsilon: self.learner.model.epsilon(),
            learning_rate: self.learner.model.learning_rate(),
        }
    }

    fn metrics(&self) -> Option<&TrainingMetrics> {
        Some(&self.metrics)
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Directory holding one `<agent>.json` snapshot per agent
    pub model_dir: PathBuf,
    pub episodes_per_cycle: usize,
    /// Step budget per episode
    pub max_steps: usize,
    /// Stop after this many cycles; unlimited when `None`
    pub max_cycles: Option<usize>,
    /// Stop at the first cycle boundary after this much time; unlimited when `None`
    pub session_duration: Option<Duration>,
    pub seed: u64,
    pub q_learning: QLearningConfig,
    pub arena: ArenaConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            episodes_per_cycle: 50,
            max_steps: 1000,
            max_cycles: None,
            session_duration: None,
            seed: 42,
            q_learning: QLearningConfig::default(),
            arena: ArenaConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    CycleLimit,
    SessionElapsed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycles_completed: usize,
    pub stop_reason: StopReason,
    pub elapsed: Duration,
}

pub struct MultiAgentCyclicOrchestrator {
    config: OrchestratorConfig,
    agents: Vec<Box<dyn TrainableAgent>>,
    observer: Box<dyn TrainingObserver>,
    rng: StdRng,
    loaded: usize,
    cycles_completed: usize,
}

impl MultiAgentCyclicOrchestrator {
    /// Default roster: one agent per training range
    pub fn new(config: OrchestratorConfig, observer: Box<dyn TrainingObserver>) -> Self {
        Self::build(config, observer, None)
    }

    /// Default roster recording every episode into `store`
    pub fn with_store(
        config: OrchestratorConfig,
        observer: Box<dyn TrainingObserver>,
        store: SharedExperienceStore,
    ) -> Self {
        Self::build(config, observer, Some(store))
    }

    fn build(
        config: OrchestratorConfig,
        observer: Box<dyn TrainingObserver>,
        store: Option<SharedExperienceStore>,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let agents: Vec<Box<dyn TrainableAgent>> = TrainingRange::ALL
            .iter()
            .enumerate()
            .map(|(stream, range)| {
                let agent = RangeAgent::new(
                    *range,
                    config.q_learning.clone(),
                    config.arena.clone(),
                    config.max_steps,
                    &mut rng,
                );
                let agent = match &store {
                    Some(store) => agent.with_store(store.clone(), stream),
                    None => agent,
                };
                Box::new(agent) as Box<dyn TrainableAgent>
            })
            .collect();
        Self::with_agents_and_rng(config, agents, observer, rng)
    }

    /// Custom roster; every agent tries to load its snapshot from `model_dir`
    pub fn with_agents(
        config: OrchestratorConfig,
        agents: Vec<Box<dyn TrainableAgent>>,
        observer: Box<dyn TrainingObserver>,
    ) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self::with_agents_and_rng(config, agents, observer, rng)
    }

    fn with_agents_and_rng(
        config: OrchestratorConfig,
        mut agents: Vec<Box<dyn TrainableAgent>>,
        observer: Box<dyn TrainingObserver>,
        mut rng: StdRng,
    ) -> Self {
        let mut loaded = 0;
        for agent in agents.iter_mut() {
            if agent.load_model(&config.model_dir, &mut rng) {
                loaded += 1;
            } else {
                tracing::info!("{} starts with fresh weights", agent.name());
            }
        }
        tracing::info!(
            "Roster ready: {} agents, {} loaded from {}",
            agents.len(),
            loaded,
            config.model_dir.display()
        );

        Self {
            config,
            agents,
            observer,
            rng,
            loaded,
            cycles_completed: 0,
        }
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name().to_string()).collect()
    }

    /// Agents whose model came from disk at construction
    pub fn loaded_from_disk(&self) -> usize {
        self.loaded
    }

    pub fn cycles_completed(&self) -> usize {
        self.cycles_completed
    }

    /// Train cycle after cycle until cancelled or a configured limit is hit.
    ///
    /// An agent's block of `episodes_per_cycle` episodes is never interrupted; the
    /// cancellation flag is honored before the next block starts.
    pub fn run_cyclic_training(
        &mut self,
        cancel: &CancellationFlag,
        episodes_per_cycle: usize,
    ) -> CycleReport {
        let start = Instant::now();
        let names = self.agent_names();

        let stop_reason = 'cycles: loop {
            if let Some(max_cycles) = self.config.max_cycles
                && self.cycles_completed >= max_cycles
            {
                break StopReason::CycleLimit;
            }
            if let Some(duration) = self.config.session_duration
                && start.elapsed() >= duration
            {
                break StopReason::SessionElapsed;
            }

            let cycle = self.cycles_completed + 1;
            let cycle_start = Instant::now();
            self.observer.on_cycle_start(cycle, &names);

            for agent in self.agents.iter_mut() {
                if cancel.is_cancelled() {
                    tracing::info!(
                        "Cancellation requested before {} in cycle {}",
                        agent.name(),
                        cycle
                    );
                    break 'cycles StopReason::Cancelled;
                }

                let summary = train_block(
                    agent.as_mut(),
                    episodes_per_cycle,
                    &mut self.rng,
                    self.observer.as_mut(),
                );
                self.observer
                    .on_agent_block_finished(cycle, agent.name(), &summary);
            }

            self.persist_all();
            self.cycles_completed = cycle;
            self.observer.on_cycle_finished(cycle, cycle_start.elapsed());
        };

        self.persist_all();

        let report = CycleReport {
            cycles_completed: self.cycles_completed,
            stop_reason,
            elapsed: start.elapsed(),
        };
        tracing::info!(
            "Cyclic training stopped ({:?}) after {} cycles in {:.1}s",
            report.stop_reason,
            report.cycles_completed,
            report.elapsed.as_secs_f64()
        );
        report
    }

    /// Save every agent's model. Failures are logged and do not stop the others.
    pub fn persist_all(&mut self) -> (usize, usize) {
        let mut saved = 0;
        let mut failed = 0;
        for agent in &self.agents {
            match agent.save_model(&self.config.model_dir) {
                Ok(path) => {
                    tracing::debug!("Saved {} to {}", agent.name(), path.display());
                    saved += 1;
                }
                Err(err) => {
                    tracing::warn!("Failed to save {}: {}", agent.name(), err);
                    failed += 1;
                }
            }
        }
        self.observer.on_models_persisted(saved, failed);
        (saved, failed)
    }
}

fn train_block(
    agent: &mut dyn TrainableAgent,
    episodes: usize,
    rng: &mut StdRng,
    observer: &mut dyn TrainingObserver,
) -> BlockSummary {
    let mut completed = 0;
    let mut reward_sum = 0.0;
    let mut best_reward = f32::NEG_INFINITY;
    let mut perfect_runs = 0;

    for episode in 1..=episodes {
        match agent.train_episode(rng) {
            Ok(result) => {
                completed += 1;
                reward_sum += result.outcome.total_reward;
                best_reward = best_reward.max(result.outcome.total_reward);
                if result.outcome.is_perfect() {
                    perfect_runs += 1;
                }
                observer.on_episode_finished(agent.name(), episode, &result.outcome);
                if let Some(phase) = result.advanced_to {
                    observer.on_phase_advanced(agent.name(), phase);
                }
            }
            Err(err) => {
                tracing::error!("{} episode {} failed: {}", agent.name(), episode, err);
                break;
            }
        }
    }

    if completed > 0
        && let Some(metrics) = agent.metrics()
    {
        metrics.log_to_console(agent.name());
    }

    let status = agent.status();
    BlockSummary {
        episodes: completed,
        average_reward: if completed > 0 {
            reward_sum / completed as f32
        } else {
            0.0
        },
        best_reward: if completed > 0 { best_reward } else { 0.0 },
        perfect_runs,
        phase: status.phase,
        epsilon: status.epsilon,
        learning_rate: status.learning_rate,
    }
}
