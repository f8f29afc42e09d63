mod cancellation;
mod composite_observer;
mod csv_observer;
mod default_observer;
mod observer;
mod types;

pub use cancellation::CancellationFlag;
pub use composite_observer::CompositeObserver;
pub use csv_observer::CsvMetricsObserver;
pub use default_observer::DefaultObserver;
pub use observer::{BlockSummary, TrainingObserver};
pub use types::{ScreenBounds, Vec2};
