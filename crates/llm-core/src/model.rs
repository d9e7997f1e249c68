//! The `Model` capability and the factory that picks a backend for a file.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use ggml_parser::ModelDescriptor;
use tracing::{debug, info};

use crate::error::{LlmError, Result};
use crate::generate::PartialResult;
use crate::options::BackendOptions;
use crate::runner::LlamaServer;

/// A loaded model that can stream predictions.
pub trait Model: Send {
    /// Generate a completion for `prompt`, continuing from `context`
    /// (the `context` of a previous final [`PartialResult`], or empty).
    ///
    /// `on_token` is called once per streamed piece; the last call has
    /// `done` set.
    fn predict(
        &mut self,
        context: &[i32],
        prompt: &str,
        on_token: &mut dyn FnMut(PartialResult),
    ) -> Result<()>;

    /// Release backend resources. Further `predict` calls fail.
    fn close(&mut self);
}

/// Builds a backend for a decoded model file.
pub type BackendConstructor =
    fn(&Path, &ModelDescriptor, &BackendOptions) -> Result<Box<dyn Model>>;

/// Backend constructors keyed by model type.
pub struct BackendRegistry {
    constructors: HashMap<String, BackendConstructor>,
}

impl Default for BackendRegistry {
    /// Registry with every built-in backend wired.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("llama", LlamaServer::open);
        registry
    }
}

impl BackendRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Add or replace the constructor for `model_type`.
    pub fn register(&mut self, model_type: &str, constructor: BackendConstructor) -> &mut Self {
        self.constructors.insert(model_type.to_string(), constructor);
        self
    }

    pub fn model_types(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Decode the header of `path` and hand the file to the matching backend.
    ///
    /// The file handle used for decoding is closed before the backend is
    /// constructed.
    pub fn open(&self, path: &Path, options: &BackendOptions) -> Result<Box<dyn Model>> {
        let descriptor = read_descriptor(path, &options.hint)?;

        let constructor = self
            .constructors
            .get(descriptor.model_type())
            .ok_or_else(|| LlmError::UnsupportedModelType(descriptor.model_type().to_string()))?;

        info!(
            path = %path.display(),
            model_type = descriptor.model_type(),
            container = descriptor.container().name(),
            file_type = %descriptor.file_type(),
            "Opening model"
        );
        constructor(path, &descriptor, options)
    }
}

/// Open `path` with the built-in backends.
pub fn new_model(path: &Path, options: &BackendOptions) -> Result<Box<dyn Model>> {
    BackendRegistry::default().open(path, options)
}

fn read_descriptor(path: &Path, hint: &str) -> Result<ModelDescriptor> {
    let unavailable = |source: io::Error| LlmError::ModelFileUnavailable {
        path: path.display().to_string(),
        source,
    };

    let metadata = fs::metadata(path).map_err(unavailable)?;
    if !metadata.is_file() {
        return Err(unavailable(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }

    let mut file = fs::File::open(path).map_err(unavailable)?;
    let descriptor = ggml_parser::decode(&mut file, hint)?;
    debug!(path = %path.display(), "Header decoded, file released");
    Ok(descriptor)
}
