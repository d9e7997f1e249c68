use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;

use llm_core::{BackendOptions, PartialResult};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

use crate::cli::RunArgs;
use crate::config::AppConfig;

pub async fn execute(args: RunArgs) -> anyhow::Result<()> {
    let options = backend_options(&AppConfig::load_or_default()?, &args);
    info!(model = %args.model.display(), hint = %options.hint, "Loading model…");

    let mut session = Session::start(args.model.clone(), options).await?;

    if let Some(prompt) = args.prompt {
        session.ask(prompt).await?;
        return session.finish().await;
    }

    println!("Model loaded. Type your message (Ctrl-D to quit).\n");
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!();
            break; // EOF
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if !session.ask(format!("{line}\n")).await? {
            // Session ended early; its error is reported below.
            break;
        }
        println!();
    }

    session.finish().await
}

/// A model owned by a blocking thread for its whole lifetime: the runner
/// client and child process must not be driven from async code.
struct Session {
    prompts: std_mpsc::Sender<String>,
    replies: mpsc::Receiver<PartialResult>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl Session {
    /// Load the model and wait until it is ready. A load failure is
    /// returned here, before any prompt is read.
    async fn start(model_path: PathBuf, options: BackendOptions) -> anyhow::Result<Self> {
        let (prompt_tx, prompt_rx) = std_mpsc::channel::<String>();
        let (tx, replies) = mpsc::channel::<PartialResult>(64);
        let (ready_tx, ready_rx) = oneshot::channel::<()>();

        let task = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let mut model = llm_core::new_model(&model_path, &options)?;
            let _ = ready_tx.send(());
            let mut context: Vec<i32> = Vec::new();

            while let Ok(prompt) = prompt_rx.recv() {
                let mut next_context = None;
                model.predict(&context, &prompt, &mut |part| {
                    if part.done {
                        next_context = Some(part.context.clone());
                    }
                    let _ = tx.blocking_send(part);
                })?;
                if let Some(next) = next_context {
                    context = next;
                }
            }

            model.close();
            Ok(())
        });

        if ready_rx.await.is_err() {
            // The sender is dropped only when loading failed.
            task.await??;
            anyhow::bail!("model session ended before loading");
        }

        Ok(Self {
            prompts: prompt_tx,
            replies,
            task,
        })
    }

    /// Send one prompt and print its reply. Returns `false` when the
    /// session has ended; `finish` then reports why.
    async fn ask(&mut self, prompt: String) -> anyhow::Result<bool> {
        if self.prompts.send(prompt).is_err() {
            return Ok(false);
        }
        print_reply(&mut self.replies).await
    }

    async fn finish(self) -> anyhow::Result<()> {
        let Self {
            prompts,
            replies,
            task,
        } = self;
        drop(prompts);
        drop(replies);
        task.await?
    }
}

/// Print streamed pieces until the reply is done. Returns `false` when the
/// session stopped before finishing the reply.
async fn print_reply(rx: &mut mpsc::Receiver<PartialResult>) -> anyhow::Result<bool> {
    let mut stdout = io::stdout();
    while let Some(part) = rx.recv().await {
        print!("{}", part.content);
        stdout.flush()?;
        if part.done {
            println!();
            eprintln!(
                "  [prompt: {} tok, gen: {} tok]",
                part.prompt_tokens, part.completion_tokens
            );
            return Ok(true);
        }
    }
    Ok(false)
}

fn backend_options(cfg: &AppConfig, args: &RunArgs) -> BackendOptions {
    let mut options = cfg.backend_options();
    if let Some(hint) = &args.hint {
        options.hint = hint.clone();
    }
    if let Some(runner) = &args.runner {
        options.runner_path = Some(runner.clone());
    }
    if let Some(ctx_size) = args.ctx_size {
        options.ctx_size = ctx_size;
    }
    if let Some(n_gpu_layers) = args.n_gpu_layers {
        options.n_gpu_layers = n_gpu_layers;
    }
    if args.threads.is_some() {
        options.threads = args.threads;
    }
    options.sampling.temperature = args.temp;
    options.sampling.n_predict = args.n_predict;
    options
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::Parser;
    use llm_core::LlmError;
    use tempfile::NamedTempFile;

    use super::*;
    use crate::cli::{Cli, Commands};

    fn run_args(argv: &[&str]) -> RunArgs {
        match Cli::parse_from(argv).command {
            Commands::Run(args) => args,
            _ => panic!("expected run subcommand"),
        }
    }

    #[test]
    fn flags_override_config() {
        let args = run_args(&[
            "ggml-loader",
            "run",
            "model.bin",
            "--ctx-size",
            "512",
            "--n-gpu-layers",
            "0",
            "--runner",
            "/opt/server",
            "--temp",
            "0.1",
        ]);
        let options = backend_options(&AppConfig::default(), &args);

        assert_eq!(options.ctx_size, 512);
        assert_eq!(options.n_gpu_layers, 0);
        assert_eq!(options.runner_path, Some(PathBuf::from("/opt/server")));
        assert_eq!(options.sampling.temperature, 0.1);
        assert_eq!(options.hint, "llama");
    }

    #[test]
    fn config_used_when_flags_absent() {
        let mut cfg = AppConfig::default();
        cfg.set("default_ctx_size", "4096").unwrap();
        cfg.set("default_threads", "3").unwrap();

        let args = run_args(&["ggml-loader", "run", "model.bin", "-p", "hi"]);
        let options = backend_options(&cfg, &args);

        assert_eq!(options.ctx_size, 4096);
        assert_eq!(options.threads, Some(3));
        assert_eq!(options.sampling.n_predict, -1);
        assert_eq!(args.prompt.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn load_failure_is_reported_before_prompting() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world, not a model").unwrap();
        file.flush().unwrap();

        let err = Session::start(file.path().to_path_buf(), BackendOptions::default())
            .await
            .err()
            .unwrap();
        assert!(
            err.to_string().starts_with("invalid file magic"),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn missing_model_is_reported_before_prompting() {
        let dir = tempfile::tempdir().unwrap();
        let err = Session::start(dir.path().join("absent.bin"), BackendOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<LlmError>(),
            Some(LlmError::ModelFileUnavailable { .. })
        ));
    }
}
