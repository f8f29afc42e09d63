//! Reinforcement learning core: linear Q-learning agents trained against a simulated arena
//!
//! # Architecture
//!
//! ```text
//! GameSnapshot
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  StateEncoder                                               │
//! │  - Fixed-length feature vector, absent entities padded      │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ValueApproximator                                          │
//! │  - Q(s, a) = w_a · s, epsilon-greedy selection              │
//! │  - TD(0) updates, adaptive learning rate                    │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Arena::step  →  RewardShaper  →  ExperienceStore           │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CurriculumScheduler                                        │
//! │  - Composite score window, phase advancement                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Training is driven either by [`ParallelTrainingCoordinator`] (K environments of one
//! range) or by [`MultiAgentCyclicOrchestrator`] (one agent per range, trained in turn).
//! [`LiveAgent`] serves the running game.

pub mod action_space;
pub mod arena;
pub mod curriculum;
pub mod encoder;
pub mod episode;
pub mod executor;
pub mod experience;
pub mod metrics;
pub mod orchestrator;
pub mod parallel;
pub mod reward;
pub mod value;

pub use action_space::{ActionSpace, FireCommand, GameAction};
pub use arena::{Arena, ArenaConfig, ArenaStep, StepEvents, TrainingRange};
pub use curriculum::{
    CurriculumPhase, CurriculumScheduler, DifficultyConfig, PerformanceSnapshot, PhaseSettings,
};
pub use encoder::{EncoderConfig, StateEncoder};
pub use episode::{EpisodeOutcome, Learner, run_episode};
pub use executor::{LiveAgent, TickDecision};
pub use experience::{
    Episode, EpisodeBatch, Experience, ExperienceSink, ExperienceStore, SharedExperienceStore,
    StoreConfig, StreamSink,
};
pub use metrics::{MovingAverage, TrainingMetrics};
pub use orchestrator::{
    MultiAgentCyclicOrchestrator, OrchestratorConfig, RangeAgent, StopReason, TrainableAgent,
};
pub use parallel::{AggregateResults, ParallelConfig, ParallelTrainingCoordinator, TrainingReport};
pub use reward::{RewardShaper, RewardTerms, RewardWeights, StepDelta};
pub use value::{QLearningConfig, ValueApproximator};
