use std::time::Duration;

use crate::rl::{CurriculumPhase, EpisodeOutcome};

use super::observer::{BlockSummary, TrainingObserver};

/// Fans every event out to a list of observers
pub struct CompositeObserver {
    observers: Vec<Box<dyn TrainingObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Box<dyn TrainingObserver>>) -> Self {
        Self { observers }
    }
}

impl TrainingObserver for CompositeObserver {
    fn on_cycle_start(&mut self, cycle: usize, agents: &[String]) {
        for observer in &mut self.observers {
            observer.on_cycle_start(cycle, agents);
        }
    }

    fn on_agent_block_finished(&mut self, cycle: usize, agent: &str, summary: &BlockSummary) {
        for observer in &mut self.observers {
            observer.on_agent_block_finished(cycle, agent, summary);
        }
    }

    fn on_episode_finished(&mut self, agent: &str, episode: usize, outcome: &EpisodeOutcome) {
        for observer in &mut self.observers {
            observer.on_episode_finished(agent, episode, outcome);
        }
    }

    fn on_phase_advanced(&mut self, agent: &str, phase: CurriculumPhase) {
        for observer in &mut self.observers {
            observer.on_phase_advanced(agent, phase);
        }
    }

    fn on_models_persisted(&mut self, saved: usize, failed: usize) {
        for observer in &mut self.observers {
            observer.on_models_persisted(saved, failed);
        }
    }

    fn on_cycle_finished(&mut self, cycle: usize, elapsed: Duration) {
        for observer in &mut self.observers {
            observer.on_cycle_finished(cycle, elapsed);
        }
    }
}
