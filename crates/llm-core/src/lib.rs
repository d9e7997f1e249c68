//! Model loading for GGML-family model files.
//!
//! [`new_model`] decodes a file's header with `ggml-parser`, then hands
//! the file to the backend registered for its model type. The built-in
//! `llama` backend runs a llama.cpp server process and streams
//! completions from it.

pub mod error;
pub mod generate;
pub mod model;
pub mod options;
pub mod runner;

pub use error::{LlmError, Result};
pub use generate::PartialResult;
pub use model::{BackendConstructor, BackendRegistry, Model, new_model};
pub use options::{BackendOptions, SamplingOptions};
pub use runner::LlamaServer;
