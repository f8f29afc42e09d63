pub mod config;
pub mod error;
pub mod infra;
pub mod rl;
pub mod state;

// Re-export commonly used types for convenience
pub use error::{Result, TrainingError};
pub use infra::{CancellationFlag, ScreenBounds, Vec2};
pub use state::GameSnapshot;
