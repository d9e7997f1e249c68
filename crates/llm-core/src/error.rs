use std::process::ExitStatus;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Model file '{path}' is not readable: {source}")]
    ModelFileUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Decode(#[from] ggml_parser::GGMLError),

    #[error("unknown ggml type: {0}")]
    UnsupportedModelType(String),

    #[error("Runner binary '{0}' not found")]
    RunnerNotFound(String),

    #[error("Failed to start runner: {0}")]
    RunnerSpawn(#[source] std::io::Error),

    #[error("Runner exited before it was ready ({0})")]
    RunnerExited(ExitStatus),

    #[error("Runner not ready after {0}s")]
    RunnerTimeout(u64),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Prediction failed: {0}")]
    Prediction(String),

    #[error("Model is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, LlmError>;
