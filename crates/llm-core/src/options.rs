//! Backend options, shared by every model type.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Parameters for [`crate::new_model`].
///
/// Unknown to the header decoder; only `hint` is consulted before a
/// backend is chosen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendOptions {
    /// Architecture whose hyperparameter layout the header is read with.
    #[serde(default = "default_hint")]
    pub hint: String,
    /// Runner executable; `llama-server` from `PATH` when unset.
    #[serde(default)]
    pub runner_path: Option<PathBuf>,
    /// Context size in tokens.
    #[serde(default = "default_ctx_size")]
    pub ctx_size: u32,
    /// Layers to offload to GPU. -1 = all.
    #[serde(default = "default_gpu_layers")]
    pub n_gpu_layers: i32,
    /// Worker threads; runner default when unset.
    #[serde(default)]
    pub threads: Option<u32>,
    /// Use memory-mapped I/O.
    #[serde(default = "default_true")]
    pub use_mmap: bool,
    /// Lock model memory (prevent swapping).
    #[serde(default)]
    pub use_mlock: bool,
    /// How long to wait for the runner to report healthy.
    #[serde(default = "default_load_timeout")]
    pub load_timeout_secs: u64,
    #[serde(default)]
    pub sampling: SamplingOptions,
}

fn default_hint() -> String {
    "llama".into()
}
fn default_ctx_size() -> u32 {
    2048
}
fn default_gpu_layers() -> i32 {
    -1
}
fn default_true() -> bool {
    true
}
fn default_load_timeout() -> u64 {
    60
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            hint: default_hint(),
            runner_path: None,
            ctx_size: default_ctx_size(),
            n_gpu_layers: default_gpu_layers(),
            threads: None,
            use_mmap: true,
            use_mlock: false,
            load_timeout_secs: default_load_timeout(),
            sampling: SamplingOptions::default(),
        }
    }
}

/// Sampling configuration sent with every completion.
///
/// Field names follow the runner's `/completion` request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingOptions {
    pub temperature: f32,
    pub top_k: i32,
    pub top_p: f32,
    pub repeat_penalty: f32,
    /// -1 = random.
    pub seed: i64,
    /// Maximum tokens to generate. -1 = until a stop condition.
    pub n_predict: i32,
    /// Prompt tokens to keep when the context overflows.
    pub n_keep: i32,
    /// Stop-word strings.
    pub stop: Vec<String>,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            top_k: 40,
            top_p: 0.9,
            repeat_penalty: 1.1,
            seed: -1,
            n_predict: -1,
            n_keep: 0,
            stop: Vec::new(),
        }
    }
}
