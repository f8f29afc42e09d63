//! Runtime configuration read from `ARCADE_RL_*` environment variables

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, TrainingError};
use crate::rl::{OrchestratorConfig, ParallelConfig, StoreConfig, TrainingRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Train the whole roster cycle after cycle
    Cyclic,
    /// Train K environments of one range concurrently
    Parallel,
    /// Merge persisted episodes into one file
    Export,
}

impl FromStr for RunMode {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cyclic" => Ok(RunMode::Cyclic),
            "parallel" => Ok(RunMode::Parallel),
            "export" => Ok(RunMode::Export),
            other => Err(TrainingError::Config(format!("unknown mode '{}'", other))),
        }
    }
}

fn parse_range(s: &str) -> Result<TrainingRange> {
    let name = s.trim().to_ascii_lowercase();
    TrainingRange::ALL
        .iter()
        .copied()
        .find(|range| range.name() == name)
        .ok_or_else(|| TrainingError::Config(format!("unknown training range '{}'", s)))
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: RunMode,
    pub data_dir: PathBuf,
    pub model_dir: PathBuf,
    /// CSV metrics are written here when set
    pub metrics_dir: Option<PathBuf>,
    pub export_path: PathBuf,
    pub seed: u64,
    /// Total episodes of a parallel run
    pub episodes: usize,
    pub environments: usize,
    pub concurrency: usize,
    pub max_steps: usize,
    pub episodes_per_cycle: usize,
    pub max_cycles: Option<usize>,
    pub session_duration: Option<Duration>,
    /// Range trained by the parallel mode
    pub range: TrainingRange,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Cyclic,
            data_dir: PathBuf::from("training_data"),
            model_dir: PathBuf::from("models"),
            metrics_dir: None,
            export_path: PathBuf::from("training_data/consolidated.json"),
            seed: 42,
            episodes: 1000,
            environments: 4,
            concurrency: 4,
            max_steps: 1000,
            episodes_per_cycle: 50,
            max_cycles: None,
            session_duration: None,
            range: TrainingRange::Shooting,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let session_minutes: Option<u64> = parse_var(&get, "ARCADE_RL_SESSION_MINUTES")?;

        Ok(Self {
            mode: parse_var(&get, "ARCADE_RL_MODE")?.unwrap_or(defaults.mode),
            data_dir: get("ARCADE_RL_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            model_dir: get("ARCADE_RL_MODEL_DIR").map_or(defaults.model_dir, PathBuf::from),
            metrics_dir: get("ARCADE_RL_METRICS_DIR").map(PathBuf::from),
            export_path: get("ARCADE_RL_EXPORT_PATH").map_or(defaults.export_path, PathBuf::from),
            seed: parse_var(&get, "ARCADE_RL_SEED")?.unwrap_or(defaults.seed),
            episodes: parse_var(&get, "ARCADE_RL_EPISODES")?.unwrap_or(defaults.episodes),
            environments: parse_var(&get, "ARCADE_RL_ENVIRONMENTS")?
                .unwrap_or(defaults.environments),
            concurrency: parse_var(&get, "ARCADE_RL_CONCURRENCY")?
                .unwrap_or(defaults.concurrency),
            max_steps: parse_var(&get, "ARCADE_RL_MAX_STEPS")?.unwrap_or(defaults.max_steps),
            episodes_per_cycle: parse_var(&get, "ARCADE_RL_EPISODES_PER_CYCLE")?
                .unwrap_or(defaults.episodes_per_cycle),
            max_cycles: parse_var(&get, "ARCADE_RL_MAX_CYCLES")?,
            session_duration: session_minutes.map(|m| Duration::from_secs(m * 60)),
            range: match get("ARCADE_RL_RANGE") {
                Some(value) => parse_range(&value)?,
                None => defaults.range,
            },
        })
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            data_dir: self.data_dir.clone(),
            ..StoreConfig::default()
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            model_dir: self.model_dir.clone(),
            episodes_per_cycle: self.episodes_per_cycle,
            max_steps: self.max_steps,
            max_cycles: self.max_cycles,
            session_duration: self.session_duration,
            seed: self.seed,
            ..OrchestratorConfig::default()
        }
    }

    pub fn parallel_config(&self) -> ParallelConfig {
        ParallelConfig {
            environments: self.environments,
            max_concurrency: self.concurrency,
            total_episodes: self.episodes,
            max_steps: self.max_steps,
            seed: self.seed,
            range: self.range,
            persist_episodes: true,
            model_dir: Some(self.model_dir.clone()),
            ..ParallelConfig::default()
        }
    }
}

fn parse_var<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match get(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| TrainingError::Config(format!("{} has invalid value '{}'", key, value))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.mode, RunMode::Cyclic);
        assert_eq!(config.seed, 42);
        assert!(config.max_cycles.is_none());
        assert!(config.session_duration.is_none());
    }

    #[test]
    fn test_reads_values() {
        let config = AppConfig::from_lookup(lookup(&[
            ("ARCADE_RL_MODE", "Parallel"),
            ("ARCADE_RL_ENVIRONMENTS", "8"),
            ("ARCADE_RL_SESSION_MINUTES", "90"),
            ("ARCADE_RL_RANGE", "boss"),
            ("ARCADE_RL_MAX_CYCLES", ""),
        ]))
        .unwrap();

        assert_eq!(config.mode, RunMode::Parallel);
        assert_eq!(config.environments, 8);
        assert_eq!(config.session_duration, Some(Duration::from_secs(5400)));
        assert_eq!(config.range, TrainingRange::Boss);
        assert!(config.max_cycles.is_none());

        let parallel = config.parallel_config();
        assert_eq!(parallel.environments, 8);
        assert_eq!(parallel.range, TrainingRange::Boss);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(AppConfig::from_lookup(lookup(&[("ARCADE_RL_SEED", "abc")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("ARCADE_RL_MODE", "train")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("ARCADE_RL_RANGE", "racing")])).is_err());
    }
}
