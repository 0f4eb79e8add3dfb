//! Error types

use thiserror::Error;

/// Errors raised while training or evaluating knowledge-tracing models
#[derive(Debug, Error)]
pub enum Error {
    #[error("Model {0} not supported")]
    UnsupportedModel(String),

    #[error("Model {0} has no trainable architecture")]
    NotTrainable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No {0} registered in the execution context")]
    MissingCollaborator(&'static str),

    #[error("AUC is undefined: {samples} samples with only one class present ({positives} positive)")]
    UndefinedAuc { samples: usize, positives: usize },

    #[error("Split '{0}' produced no batches")]
    EmptySplit(&'static str),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for knowledge-tracing operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnsupportedModel("gpt-kt".to_string());
        assert_eq!(err.to_string(), "Model gpt-kt not supported");

        let err = Error::UndefinedAuc { samples: 4, positives: 4 };
        assert!(err.to_string().contains("only one class"));

        let err = Error::MissingCollaborator("baseline model factory");
        assert!(err.to_string().contains("baseline model factory"));

        let err = Error::EmptySplit("validation");
        assert!(err.to_string().contains("validation"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
