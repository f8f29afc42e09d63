use std::time::Duration;

use crate::rl::{CurriculumPhase, EpisodeOutcome};

/// Summary of one agent's block of episodes within a cycle
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSummary {
    pub episodes: usize,
    pub average_reward: f32,
    pub best_reward: f32,
    pub perfect_runs: usize,
    pub phase: CurriculumPhase,
    pub epsilon: f32,
    pub learning_rate: f32,
}

/// Trait for observing training progress
pub trait TrainingObserver: Send {
    /// Called before the first agent of a cycle trains
    fn on_cycle_start(&mut self, cycle: usize, agents: &[String]);

    /// Called when an agent finished its episodes for the cycle
    fn on_agent_block_finished(&mut self, cycle: usize, agent: &str, summary: &BlockSummary);

    /// Called after every training episode
    fn on_episode_finished(&mut self, _agent: &str, _episode: usize, _outcome: &EpisodeOutcome) {
        // Default implementation does nothing
    }

    /// Called when an agent's curriculum moved to a new phase
    fn on_phase_advanced(&mut self, agent: &str, phase: CurriculumPhase);

    /// Called after the roster was written to disk
    fn on_models_persisted(&mut self, saved: usize, failed: usize);

    /// Called when a cycle completed
    fn on_cycle_finished(&mut self, cycle: usize, elapsed: Duration);
}
