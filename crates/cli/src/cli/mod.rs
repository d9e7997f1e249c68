pub mod config_cmd;
pub mod info;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ggml-loader",
    version,
    about = "Inspect GGML model headers and run them through a llama.cpp runner"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode a model file's header and print it as JSON.
    Info(InfoArgs),

    /// Load a model and generate text (interactive without --prompt).
    Run(RunArgs),

    /// View / edit configuration.
    Config(ConfigArgs),
}

//  Subcommand argument structs

#[derive(Debug, clap::Args, Clone)]
pub struct InfoArgs {
    /// Path to a ggml / ggmf / ggjt / ggla model file.
    pub path: PathBuf,

    /// Architecture used to read the hyperparameters (overrides config).
    #[arg(long)]
    pub hint: Option<String>,
}

#[derive(Debug, clap::Args, Clone)]
pub struct RunArgs {
    /// Path to a model file.
    pub model: PathBuf,

    /// Generate a single completion for this prompt and exit.
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Architecture used to read the hyperparameters (overrides config).
    #[arg(long)]
    pub hint: Option<String>,

    /// llama.cpp server executable.
    #[arg(long, env = "GGML_RUNNER")]
    pub runner: Option<PathBuf>,

    /// Context size (overrides config).
    #[arg(long)]
    pub ctx_size: Option<u32>,

    /// GPU layers (-1 = all, 0 = CPU only).
    #[arg(long, allow_hyphen_values = true)]
    pub n_gpu_layers: Option<i32>,

    /// Threads.
    #[arg(long)]
    pub threads: Option<u32>,

    /// Temperature.
    #[arg(long, default_value_t = 0.8)]
    pub temp: f32,

    /// Maximum tokens to generate (-1 = unlimited).
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    pub n_predict: i32,
}

#[derive(Debug, clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Display the current configuration.
    Show,
    /// Set a configuration value (empty value clears optional keys).
    Set { key: String, value: String },
}
