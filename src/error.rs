use std::io;
use std::path::PathBuf;

/// Errors raised by the learning subsystem.
///
/// Only `Encoding` and `InvalidAction` are meant to stop a caller: they point at a
/// configuration mismatch that would otherwise corrupt training silently. The
/// persistence variants are logged and skipped by the best-effort entry points.
#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("state vector has length {actual}, expected {expected}")]
    Encoding { expected: usize, actual: usize },

    #[error("action {action} is outside the action space of size {action_count}")]
    InvalidAction { action: usize, action_count: usize },

    #[error("I/O failure on {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt record {}: {source}", path.display())]
    CorruptRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("training worker failed: {0}")]
    Worker(String),
}

impl TrainingError {
    pub fn persistence(path: impl Into<PathBuf>, source: io::Error) -> Self {
        TrainingError::Persistence {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        TrainingError::CorruptRecord {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, TrainingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_error_message() {
        let err = TrainingError::Encoding {
            expected: 42,
            actual: 30,
        };
        assert_eq!(err.to_string(), "state vector has length 30, expected 42");
    }

    #[test]
    fn test_persistence_error_keeps_path() {
        let err = TrainingError::persistence(
            "models/movement.json",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("models/movement.json"));
    }
}
