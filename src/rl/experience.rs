//! Experience store - per-step experiences grouped into episodes, persisted as JSON

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::{Rng, RngCore};
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::macros::format_description;

use crate::error::{Result, TrainingError};

/// Stream used by the single-writer entry points
pub const MAIN_STREAM: usize = 0;

/// Store shared between concurrent training environments
pub type SharedExperienceStore = Arc<Mutex<ExperienceStore>>;

/// Lock a shared store, recovering the data if another environment panicked while holding it
pub fn lock_store(store: &SharedExperienceStore) -> MutexGuard<'_, ExperienceStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One transition as seen by the learner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub state: Vec<f32>,
    pub action: usize,
    pub reward: f32,
    pub next_state: Vec<f32>,
    pub done: bool,
    /// Recorded for compatibility; the learning update does not read it
    pub confidence: f32,
    /// Unix time in milliseconds
    pub timestamp_ms: i64,
}

impl Experience {
    pub fn new(
        state: Vec<f32>,
        action: usize,
        reward: f32,
        next_state: Vec<f32>,
        done: bool,
        confidence: f32,
    ) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            done,
            confidence,
            timestamp_ms: now_millis(),
        }
    }
}

/// A finalized episode. Produced once by the store and only read afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub episode_number: u64,
    pub session_id: String,
    pub experience_count: usize,
    pub total_reward: f32,
    /// Unix time in milliseconds
    pub created_at_ms: i64,
    pub experiences: Vec<Experience>,
}

/// Result of a bulk load; unreadable files are listed instead of failing the batch
#[derive(Debug, Default)]
pub struct EpisodeBatch {
    pub episodes: Vec<Episode>,
    pub skipped: Vec<PathBuf>,
}

impl EpisodeBatch {
    pub fn total_experiences(&self) -> usize {
        self.episodes.iter().map(|e| e.experiences.len()).sum()
    }
}

/// Aggregate artifact for offline training
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedExport {
    pub exported_at_ms: i64,
    pub total_episodes: usize,
    pub total_experiences: usize,
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding one JSON file per episode
    pub data_dir: PathBuf,
    /// Most recent experiences kept per stream for replay sampling
    pub replay_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("training_data"),
            replay_capacity: 10_000,
        }
    }
}

#[derive(Debug, Default)]
struct EpisodeBuffer {
    experiences: Vec<Experience>,
    total_reward: f32,
}

#[derive(Debug)]
pub struct ExperienceStore {
    config: StoreConfig,
    session_id: String,
    next_episode: u64,
    streams: HashMap<usize, EpisodeBuffer>,
    replay: HashMap<usize, VecDeque<Experience>>,
    experiences_recorded: usize,
    episodes_completed: usize,
}

impl ExperienceStore {
    /// Create a store whose session id is derived from the current time
    pub fn new(config: StoreConfig) -> Self {
        Self::with_session_id(config, session_id_now())
    }

    pub fn with_session_id(config: StoreConfig, session_id: impl Into<String>) -> Self {
        Self {
            config,
            session_id: session_id.into(),
            next_episode: 1,
            streams: HashMap::new(),
            replay: HashMap::new(),
            experiences_recorded: 0,
            episodes_completed: 0,
        }
    }

    pub fn into_shared(self) -> SharedExperienceStore {
        Arc::new(Mutex::new(self))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn record_experience(&mut self, experience: Experience) {
        self.record_stream_experience(MAIN_STREAM, experience);
    }

    /// Append to the in-progress episode of `stream`
    pub fn record_stream_experience(&mut self, stream: usize, experience: Experience) {
        let capacity = self.config.replay_capacity;
        if capacity > 0 {
            let replay = self.replay.entry(stream).or_default();
            if replay.len() >= capacity {
                replay.pop_front();
            }
            replay.push_back(experience.clone());
        }

        let buffer = self.streams.entry(stream).or_default();
        buffer.total_reward += experience.reward;
        buffer.experiences.push(experience);
        self.experiences_recorded += 1;
    }

    pub fn end_episode(&mut self) -> Episode {
        self.end_stream_episode(MAIN_STREAM)
    }

    /// Finalize the in-progress episode of `stream` and reset its buffer.
    /// Numbers come from one counter shared by all streams and are never reused.
    pub fn end_stream_episode(&mut self, stream: usize) -> Episode {
        let buffer = self.streams.remove(&stream).unwrap_or_default();
        let episode_number = self.next_episode;
        self.next_episode += 1;
        self.episodes_completed += 1;

        Episode {
            episode_number,
            session_id: self.session_id.clone(),
            experience_count: buffer.experiences.len(),
            total_reward: buffer.total_reward,
            created_at_ms: now_millis(),
            experiences: buffer.experiences,
        }
    }

    /// Experiences in the in-progress episode of the main stream
    pub fn current_len(&self) -> usize {
        self.stream_len(MAIN_STREAM)
    }

    pub fn stream_len(&self, stream: usize) -> usize {
        self.streams.get(&stream).map_or(0, |b| b.experiences.len())
    }

    pub fn experiences_recorded(&self) -> usize {
        self.experiences_recorded
    }

    pub fn episodes_completed(&self) -> usize {
        self.episodes_completed
    }

    pub fn replay_len(&self) -> usize {
        self.stream_replay_len(MAIN_STREAM)
    }

    pub fn stream_replay_len(&self, stream: usize) -> usize {
        self.replay.get(&stream).map_or(0, VecDeque::len)
    }

    /// Uniform sample without replacement from the main stream's replay buffer
    pub fn sample_replay<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        batch_size: usize,
    ) -> Vec<Experience> {
        self.sample_stream_replay(MAIN_STREAM, rng, batch_size)
    }

    /// Uniform sample without replacement from the replay buffer of `stream`
    pub fn sample_stream_replay<R: Rng + ?Sized>(
        &self,
        stream: usize,
        rng: &mut R,
        batch_size: usize,
    ) -> Vec<Experience> {
        let Some(replay) = self.replay.get(&stream) else {
            return Vec::new();
        };
        let pool: Vec<&Experience> = replay.iter().collect();
        pool.choose_multiple(rng, batch_size.min(pool.len()))
            .map(|e| (*e).clone())
            .collect()
    }

    pub fn episode_path(&self, episode: &Episode) -> PathBuf {
        self.config.data_dir.join(format!(
            "episode_{}_{:06}.json",
            episode.session_id, episode.episode_number
        ))
    }

    /// Write an episode, logging instead of failing the caller
    pub fn persist_episode(&self, episode: &Episode) -> Option<PathBuf> {
        match self.try_persist_episode(episode) {
            Ok(path) => Some(path),
            Err(err) => {
                tracing::warn!(
                    "Failed to persist episode {} of session {}: {}",
                    episode.episode_number,
                    episode.session_id,
                    err
                );
                None
            }
        }
    }

    pub fn try_persist_episode(&self, episode: &Episode) -> Result<PathBuf> {
        let path = self.episode_path(episode);
        write_json(&path, episode)?;
        tracing::trace!(
            "Persisted episode {} ({} experiences) to {}",
            episode.episode_number,
            episode.experience_count,
            path.display()
        );
        Ok(path)
    }

    pub fn load_all_episodes(&self) -> EpisodeBatch {
        load_episodes_from(&self.config.data_dir)
    }

    /// Merge every persisted episode into one file at `output`
    pub fn export_consolidated(&self, output: &Path) -> Result<ConsolidatedExport> {
        let batch = self.load_all_episodes();
        let export = ConsolidatedExport {
            exported_at_ms: now_millis(),
            total_episodes: batch.episodes.len(),
            total_experiences: batch.total_experiences(),
            episodes: batch.episodes,
        };
        write_json(output, &export)?;

        tracing::info!(
            "Exported {} episodes ({} experiences) to {}",
            export.total_episodes,
            export.total_experiences,
            output.display()
        );
        Ok(export)
    }
}

/// Destination for the experiences of a running episode
pub trait ExperienceSink {
    fn record(&mut self, experience: Experience);

    /// Close the in-progress episode, returning it when the sink keeps episodes
    fn finish_episode(&mut self) -> Option<Episode>;

    /// Replay batch drawn from earlier experiences; empty when the sink keeps none
    fn sample_replay(&mut self, _rng: &mut dyn RngCore, _batch_size: usize) -> Vec<Experience> {
        Vec::new()
    }
}

impl ExperienceSink for ExperienceStore {
    fn record(&mut self, experience: Experience) {
        self.record_experience(experience);
    }

    fn finish_episode(&mut self) -> Option<Episode> {
        Some(self.end_episode())
    }

    fn sample_replay(&mut self, rng: &mut dyn RngCore, batch_size: usize) -> Vec<Experience> {
        self.sample_stream_replay(MAIN_STREAM, rng, batch_size)
    }
}

/// One environment's view of a shared store
#[derive(Debug, Clone)]
pub struct StreamSink {
    store: SharedExperienceStore,
    stream: usize,
    persist: bool,
}

impl StreamSink {
    /// Records into `stream` of `store`; with `persist` every finished episode is written to disk
    pub fn new(store: SharedExperienceStore, stream: usize, persist: bool) -> Self {
        Self {
            store,
            stream,
            persist,
        }
    }
}

impl ExperienceSink for StreamSink {
    fn record(&mut self, experience: Experience) {
        lock_store(&self.store).record_stream_experience(self.stream, experience);
    }

    fn finish_episode(&mut self) -> Option<Episode> {
        let mut store = lock_store(&self.store);
        let episode = store.end_stream_episode(self.stream);
        if self.persist {
            store.persist_episode(&episode);
        }
        Some(episode)
    }

    fn sample_replay(&mut self, rng: &mut dyn RngCore, batch_size: usize) -> Vec<Experience> {
        lock_store(&self.store).sample_stream_replay(self.stream, rng, batch_size)
    }
}

/// Sink that keeps nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

impl ExperienceSink for DiscardSink {
    fn record(&mut self, _experience: Experience) {}

    fn finish_episode(&mut self) -> Option<Episode> {
        None
    }
}

/// Load every `*.json` episode in `dir`, skipping unreadable files with a warning
pub fn load_episodes_from(dir: &Path) -> EpisodeBatch {
    let mut batch = EpisodeBatch::default();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!("Cannot read episode directory {}: {}", dir.display(), err);
            return batch;
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension().is_some_and(|ext| ext == "json")
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with("episode_"))
        })
        .collect();
    paths.sort();

    for path in paths {
        match read_episode(&path) {
            Ok(episode) => batch.episodes.push(episode),
            Err(err) => {
                tracing::warn!("Skipping episode file: {}", err);
                batch.skipped.push(path);
            }
        }
    }

    batch.episodes.sort_by(|a, b| {
        (&a.session_id, a.episode_number).cmp(&(&b.session_id, b.episode_number))
    });
    batch
}

fn read_episode(path: &Path) -> Result<Episode> {
    let raw = fs::read_to_string(path).map_err(|e| TrainingError::persistence(path, e))?;
    serde_json::from_str(&raw).map_err(|e| TrainingError::corrupt(path, e))
}

/// Serialize to a sibling temp file, then rename over `path`
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| TrainingError::persistence(parent, e))?;
    }

    let json = serde_json::to_vec(value).map_err(|e| TrainingError::corrupt(path, e))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| TrainingError::persistence(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| TrainingError::persistence(path, e))
}

pub(crate) fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Session id from the local start time, e.g. `20261014-093015-123`
pub fn session_id_now() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let stamp = now
        .format(format_description!("[year][month][day]-[hour][minute][second]"))
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    format!("{}-{:03}", stamp, now.millisecond())
}
