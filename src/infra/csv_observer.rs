use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::rl::{CurriculumPhase, EpisodeOutcome};

use super::observer::{BlockSummary, TrainingObserver};

/// Writes scalar curves as `step,value` CSV files, one file per tag
pub struct CsvMetricsObserver {
    log_dir: PathBuf,
    episodes: HashMap<String, usize>,
}

impl CsvMetricsObserver {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let log_dir = log_dir.into();
        if let Err(err) = fs::create_dir_all(&log_dir) {
            tracing::warn!("Cannot create metrics directory {}: {}", log_dir.display(), err);
        }
        Self {
            log_dir,
            episodes: HashMap::new(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Path of the CSV file backing `tag`
    pub fn scalar_path(&self, tag: &str) -> PathBuf {
        self.log_dir.join(format!("{}.csv", tag.replace('/', "_")))
    }

    /// Append one scalar sample
    pub fn log_scalar(&mut self, tag: &str, value: f32, step: usize) {
        let path = self.scalar_path(tag);
        let file_exists = path.exists();
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| {
                if !file_exists {
                    writeln!(file, "step,value")?;
                }
                writeln!(file, "{},{}", step, value)
            });

        if let Err(err) = result {
            tracing::warn!("Cannot write metric {}: {}", path.display(), err);
        }
    }
}

impl TrainingObserver for CsvMetricsObserver {
    fn on_cycle_start(&mut self, _cycle: usize, _agents: &[String]) {}

    fn on_agent_block_finished(&mut self, cycle: usize, agent: &str, summary: &BlockSummary) {
        self.log_scalar(&format!("{}/block_reward", agent), summary.average_reward, cycle);
        self.log_scalar(&format!("{}/epsilon", agent), summary.epsilon, cycle);
        self.log_scalar(&format!("{}/learning_rate", agent), summary.learning_rate, cycle);
    }

    fn on_episode_finished(&mut self, agent: &str, _episode: usize, outcome: &EpisodeOutcome) {
        let step = {
            let counter = self.episodes.entry(agent.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };
        self.log_scalar(&format!("{}/reward", agent), outcome.total_reward, step);
        self.log_scalar(&format!("{}/length", agent), outcome.steps as f32, step);
        self.log_scalar(&format!("{}/loss", agent), outcome.loss, step);
    }

    fn on_phase_advanced(&mut self, agent: &str, phase: CurriculumPhase) {
        let step = self.episodes.get(agent).copied().unwrap_or(0);
        self.log_scalar(&format!("{}/phase", agent), phase as usize as f32, step);
    }

    fn on_models_persisted(&mut self, _saved: usize, _failed: usize) {}

    fn on_cycle_finished(&mut self, _cycle: usize, _elapsed: Duration) {
        tracing::debug!("Metrics written to {}", self.log_dir.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::PerformanceSnapshot;

    #[test]
    fn test_scalar_csv_has_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut observer = CsvMetricsObserver::new(dir.path());
        observer.log_scalar("movement/reward", 1.5, 1);
        observer.log_scalar("movement/reward", 2.5, 2);

        let content = fs::read_to_string(observer.scalar_path("movement/reward")).unwrap();
        assert_eq!(content, "step,value\n1,1.5\n2,2.5\n");
    }

    #[test]
    fn test_episode_steps_are_per_agent() {
        let dir = tempfile::tempdir().unwrap();
        let mut observer = CsvMetricsObserver::new(dir.path());
        let outcome = EpisodeOutcome {
            total_reward: 3.0,
            steps: 10,
            loss: 0.5,
            performance: PerformanceSnapshot::default(),
            cleared: false,
        };
        observer.on_episode_finished("boss", 1, &outcome);
        observer.on_episode_finished("boss", 2, &outcome);
        observer.on_episode_finished("stealth", 1, &outcome);

        let boss = fs::read_to_string(observer.scalar_path("boss/length")).unwrap();
        assert_eq!(boss, "step,value\n1,10\n2,10\n");
        let stealth = fs::read_to_string(observer.scalar_path("stealth/reward")).unwrap();
        assert_eq!(stealth, "step,value\n1,3\n");
    }
}
