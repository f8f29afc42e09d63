//! Live agent - per-tick decisions for the running game, with optional online learning
//!
//! Nothing here touches the disk. Experiences gathered while playing stay in an
//! in-memory store, and finished episodes wait in the agent until the host takes them
//! with [`LiveAgent::take_finished_episodes`].

use std::path::Path;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::Result;
use crate::infra::Vec2;
use crate::state::GameSnapshot;

use super::action_space::GameAction;
use super::arena::{StepEvents, TrainingRange};
use super::encoder::StateEncoder;
use super::episode::{DisplacementWindow, Learner, STATIONARY_WINDOW};
use super::experience::{Episode, Experience, ExperienceStore, StoreConfig, session_id_now};
use super::reward::StepDelta;
use super::value::{QLearningConfig, ValueApproximator, argmax};

/// What the game should do this tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickDecision {
    pub action: usize,
    pub game_action: GameAction,
    pub action_name: &'static str,
    /// Player velocity to apply, px/s
    pub velocity: Vec2,
    /// Value estimate of every action, for debug overlays
    pub q_values: Vec<f32>,
}

#[derive(Debug, Clone)]
struct PendingStep {
    state: Vec<f32>,
    action: usize,
}

pub struct LiveAgent {
    learner: Learner,
    rng: StdRng,
    player_speed: f32,
    explore: bool,
    online_learning: bool,
    store: ExperienceStore,
    finished: Vec<Episode>,
    window: DisplacementWindow,
    pending: Option<PendingStep>,
    episode_reward: f32,
}

impl LiveAgent {
    pub fn new(learner: Learner, player_speed: f32, seed: u64) -> Self {
        Self {
            learner,
            rng: StdRng::seed_from_u64(seed),
            player_speed,
            explore: false,
            online_learning: false,
            store: ExperienceStore::with_session_id(StoreConfig::default(), session_id_now()),
            finished: Vec::new(),
            window: DisplacementWindow::new(STATIONARY_WINDOW),
            pending: None,
            episode_reward: 0.0,
        }
    }

    /// Agent for `range` using the snapshot at `path`, or fresh weights if it cannot be used
    pub fn from_snapshot_file(
        range: TrainingRange,
        path: &Path,
        config: QLearningConfig,
        player_speed: f32,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let (model, _) = ValueApproximator::load_or_init(
            path,
            StateEncoder::new(range.encoder_config()).state_size(),
            range.action_space().size(),
            config,
            &mut rng,
        );
        Self::new(Learner::with_model(range, model), player_speed, seed)
    }

    /// Keep epsilon-greedy exploration on while playing
    pub fn with_exploration(mut self, explore: bool) -> Self {
        self.explore = explore;
        self
    }

    /// Update the model after every observed step
    pub fn with_online_learning(mut self, enabled: bool) -> Self {
        self.online_learning = enabled;
        self
    }

    pub fn learner(&self) -> &Learner {
        &self.learner
    }

    pub fn store(&self) -> &ExperienceStore {
        &self.store
    }

    /// Episodes closed since the last call, oldest first
    pub fn take_finished_episodes(&mut self) -> Vec<Episode> {
        std::mem::take(&mut self.finished)
    }

    /// Choose the action for this tick
    pub fn decide(&mut self, snapshot: &GameSnapshot) -> Result<TickDecision> {
        let state = self.learner.encoder.encode(snapshot);
        let q_values = self.learner.model.q_values(&state)?;
        let action = if self.explore {
            self.learner.model.select_action(&state, &mut self.rng)?
        } else {
            argmax(&q_values)
        };
        let action_space = self.learner.range.action_space();
        let game_action = action_space.decode(action)?;

        if self.window.is_empty() {
            self.window.push(snapshot.player.position);
        }
        self.pending = Some(PendingStep { state, action });
        Ok(TickDecision {
            action,
            game_action,
            action_name: action_space.action_names()[action],
            velocity: game_action.velocity(self.player_speed),
            q_values,
        })
    }

    /// Feed back the result of the last decision. Returns the shaped reward, or `None`
    /// when there was no pending decision.
    pub fn observe(
        &mut self,
        next: &GameSnapshot,
        events: &StepEvents,
        done: bool,
    ) -> Result<Option<f32>> {
        let Some(pending) = self.pending.take() else {
            return Ok(None);
        };

        let delta = StepDelta {
            enemies_destroyed: events.enemies_destroyed,
            projectiles_intercepted: events.projectiles_intercepted,
            health_lost: events.health_lost,
            window_displacement: self.window.push(next.player.position),
            episode_ended: done,
        };
        let reward = self.learner.shaper.shape(&delta, next);
        let next_state = self.learner.encoder.encode(next);
        let experience = Experience::new(
            pending.state,
            pending.action,
            reward,
            next_state,
            done,
            1.0 - self.learner.model.epsilon(),
        );

        if self.online_learning {
            self.learner.model.update(&experience)?;
        }
        self.store.record_experience(experience);
        self.episode_reward += reward;

        if done {
            let episode = self.store.end_episode();
            tracing::debug!(
                "Live episode {} finished: {} steps, reward {:.2}",
                episode.episode_number,
                episode.experience_count,
                episode.total_reward
            );
            self.finished.push(episode);
            if self.online_learning {
                self.learner.model.record_episode(self.episode_reward);
            }
            self.episode_reward = 0.0;
            self.window.clear();
        }

        Ok(Some(reward))
    }
}
