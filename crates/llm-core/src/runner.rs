//! llama backend: a llama.cpp server runner driven over local HTTP.
//!
//! The runner is started as a child process bound to a free loopback
//! port, polled on `/health` until the model is loaded, and then asked
//! for streamed completions on `/completion`.

use std::io::{self, BufRead, BufReader};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use ggml_parser::ModelDescriptor;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{LlmError, Result};
use crate::generate::PartialResult;
use crate::model::Model;
use crate::options::{BackendOptions, SamplingOptions};

const DEFAULT_RUNNER: &str = "llama-server";
const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(250);
const HEALTH_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// A running llama.cpp server owning one loaded model.
pub struct LlamaServer {
    child: Option<Child>,
    base_url: String,
    client: Client,
    sampling: SamplingOptions,
}

impl LlamaServer {
    /// Backend constructor registered for `llama`.
    pub fn open(
        path: &Path,
        descriptor: &ModelDescriptor,
        options: &BackendOptions,
    ) -> Result<Box<dyn Model>> {
        Ok(Box::new(Self::start(path, descriptor, options)?))
    }

    /// Spawn the runner for `path` and block until it reports healthy.
    pub fn start(
        path: &Path,
        descriptor: &ModelDescriptor,
        options: &BackendOptions,
    ) -> Result<Self> {
        let runner = options
            .runner_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RUNNER));
        let port = free_port().map_err(LlmError::RunnerSpawn)?;

        info!(
            runner = %runner.display(),
            port,
            n_vocab = descriptor.num_vocab(),
            file_type = %descriptor.file_type(),
            "Starting llama runner…"
        );
        let child = runner_command(&runner, path, port, options)
            .spawn()
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    LlmError::RunnerNotFound(runner.display().to_string())
                } else {
                    LlmError::RunnerSpawn(e)
                }
            })?;

        // Completions stream for as long as generation runs.
        let client = Client::builder().timeout(None::<Duration>).build()?;

        // Dropping `server` on any error below stops the child.
        let mut server = Self {
            child: Some(child),
            base_url: format!("http://127.0.0.1:{port}"),
            client,
            sampling: options.sampling.clone(),
        };
        server.wait_until_ready(Duration::from_secs(options.load_timeout_secs))?;
        Ok(server)
    }

    fn wait_until_ready(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let url = format!("{}/health", self.base_url);

        loop {
            let exited = match self.child.as_mut() {
                Some(child) => child.try_wait().map_err(LlmError::RunnerSpawn)?,
                None => return Err(LlmError::Closed),
            };
            if let Some(status) = exited {
                warn!(%status, "llama runner exited during startup");
                self.child = None;
                return Err(LlmError::RunnerExited(status));
            }

            match self.client.get(&url).timeout(HEALTH_REQUEST_TIMEOUT).send() {
                Ok(resp) if resp.status().is_success() => {
                    info!(url = %self.base_url, "llama runner ready");
                    return Ok(());
                }
                // 503 while the model is still loading
                Ok(resp) => debug!(status = %resp.status(), "Runner not ready yet"),
                Err(e) => debug!(error = %e, "Health check failed, retrying"),
            }

            if Instant::now() >= deadline {
                return Err(LlmError::RunnerTimeout(timeout.as_secs()));
            }
            thread::sleep(HEALTH_POLL_INTERVAL);
        }
    }

    /// Tokens that continue the conversation after this exchange.
    fn next_context(&self, context: &[i32], prompt: &str, generated: &str) -> Result<Vec<i32>> {
        let response: TokenizeResponse = self
            .client
            .post(format!("{}/tokenize", self.base_url))
            .json(&TokenizeRequest {
                content: &format!("{prompt}{generated}"),
            })
            .send()?
            .error_for_status()?
            .json()?;

        let mut next = Vec::with_capacity(context.len() + response.tokens.len());
        next.extend_from_slice(context);
        next.extend(response.tokens);
        Ok(next)
    }

    /// Stream one completion from the runner, then tokenize the exchange
    /// for the final result's `context`.
    fn complete(
        &self,
        context: &[i32],
        prompt: &str,
        on_token: &mut dyn FnMut(PartialResult),
    ) -> Result<()> {
        let request = CompletionRequest::new(context, prompt, &self.sampling);
        let response = self
            .client
            .post(format!("{}/completion", self.base_url))
            .json(&request)
            .send()?
            .error_for_status()?;

        let mut generated = String::new();
        for line in BufReader::new(response).lines() {
            let line =
                line.map_err(|e| LlmError::Prediction(format!("reading stream: {e}")))?;
            let Some(chunk) = parse_stream_line(&line)? else {
                continue;
            };
            generated.push_str(&chunk.content);

            if chunk.stop {
                let context = self.next_context(context, prompt, &generated)?;
                on_token(PartialResult {
                    content: chunk.content,
                    done: true,
                    prompt_tokens: chunk.tokens_evaluated,
                    completion_tokens: chunk.tokens_predicted,
                    context,
                });
                return Ok(());
            }
            on_token(PartialResult::piece(chunk.content));
        }

        Err(LlmError::Prediction(
            "stream ended without a final chunk".into(),
        ))
    }
}

impl Model for LlamaServer {
    fn predict(
        &mut self,
        context: &[i32],
        prompt: &str,
        on_token: &mut dyn FnMut(PartialResult),
    ) -> Result<()> {
        if self.child.is_none() {
            return Err(LlmError::Closed);
        }
        self.complete(context, prompt, on_token)
    }

    fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                warn!(error = %e, "Failed to stop llama runner");
            }
            if let Err(e) = child.wait() {
                warn!(error = %e, "Failed to reap llama runner");
            }
            info!("llama runner stopped");
        }
    }
}

impl Drop for LlamaServer {
    fn drop(&mut self) {
        self.close();
    }
}

//  Runner process

/// Ask the OS for an unused loopback port.
///
/// The probe listener is closed before the runner binds, so another process
/// can take the port in between. The runner then fails to bind and exits,
/// which `wait_until_ready` reports as [`LlmError::RunnerExited`].
fn free_port() -> io::Result<u16> {
    Ok(TcpListener::bind(("127.0.0.1", 0))?.local_addr()?.port())
}

fn runner_command(runner: &Path, model: &Path, port: u16, options: &BackendOptions) -> Command {
    let mut cmd = Command::new(runner);
    cmd.arg("-m")
        .arg(model)
        .arg("--host")
        .arg("127.0.0.1")
        .arg("--port")
        .arg(port.to_string())
        .arg("--ctx-size")
        .arg(options.ctx_size.to_string())
        .arg("--n-gpu-layers")
        .arg(options.n_gpu_layers.to_string());

    if let Some(threads) = options.threads {
        cmd.arg("--threads").arg(threads.to_string());
    }
    if options.use_mlock {
        cmd.arg("--mlock");
    }
    if !options.use_mmap {
        cmd.arg("--no-mmap");
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd
}

//  Wire format

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: Vec<PromptPart<'a>>,
    stream: bool,
    cache_prompt: bool,
    #[serde(flatten)]
    sampling: &'a SamplingOptions,
}

/// The runner accepts a prompt mixing token ids and text.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum PromptPart<'a> {
    Token(i32),
    Text(&'a str),
}

impl<'a> CompletionRequest<'a> {
    fn new(context: &[i32], prompt: &'a str, sampling: &'a SamplingOptions) -> Self {
        let mut parts: Vec<PromptPart<'a>> =
            context.iter().copied().map(PromptPart::Token).collect();
        parts.push(PromptPart::Text(prompt));
        Self {
            prompt: parts,
            stream: true,
            cache_prompt: true,
            sampling,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    content: String,
    #[serde(default)]
    stop: bool,
    #[serde(default)]
    tokens_predicted: u32,
    #[serde(default)]
    tokens_evaluated: u32,
}

#[derive(Debug, Serialize)]
struct TokenizeRequest<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenizeResponse {
    tokens: Vec<i32>,
}

/// Parse one line of the server-sent event stream.
///
/// Blank and non-`data:` lines yield `None`; an `error:` line fails.
fn parse_stream_line(line: &str) -> Result<Option<CompletionChunk>> {
    if let Some(err) = line.strip_prefix("error:") {
        return Err(LlmError::Prediction(err.trim().to_string()));
    }
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(data)
        .map(Some)
        .map_err(|e| LlmError::Prediction(format!("invalid stream chunk: {e}")))
}
