use std::time::Duration;

use tracing::{debug, info, warn};

use crate::rl::{CurriculumPhase, EpisodeOutcome};

use super::observer::{BlockSummary, TrainingObserver};

/// Logs training progress through `tracing`
#[derive(Debug, Default)]
pub struct DefaultObserver;

impl TrainingObserver for DefaultObserver {
    fn on_cycle_start(&mut self, cycle: usize, agents: &[String]) {
        info!("Cycle {} started ({} agents)", cycle, agents.len());
    }

    fn on_agent_block_finished(&mut self, cycle: usize, agent: &str, summary: &BlockSummary) {
        info!(
            "[cycle {}] {}: {} episodes, avg reward {:.2}, best {:.2}, perfect {}, phase {}, eps {:.3}, lr {:.4}",
            cycle,
            agent,
            summary.episodes,
            summary.average_reward,
            summary.best_reward,
            summary.perfect_runs,
            summary.phase.name(),
            summary.epsilon,
            summary.learning_rate
        );
    }

    fn on_episode_finished(&mut self, agent: &str, episode: usize, outcome: &EpisodeOutcome) {
        debug!(
            "{} episode {}: reward {:.2}, steps {}, loss {:.4}",
            agent, episode, outcome.total_reward, outcome.steps, outcome.loss
        );
    }

    fn on_phase_advanced(&mut self, agent: &str, phase: CurriculumPhase) {
        info!("{} advanced to {}", agent, phase.name());
    }

    fn on_models_persisted(&mut self, saved: usize, failed: usize) {
        if failed > 0 {
            warn!("Persisted {} models, {} failed", saved, failed);
        } else {
            info!("Persisted {} models", saved);
        }
    }

    fn on_cycle_finished(&mut self, cycle: usize, elapsed: Duration) {
        info!("Cycle {} finished in {:.1}s", cycle, elapsed.as_secs_f64());
    }
}
