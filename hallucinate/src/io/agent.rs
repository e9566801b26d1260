//! Live completion backend.
//!
//! The [`Agent`] trait decouples the request loop from the HTTP client. Tests
//! use scripted agents that return predetermined completions.

use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::io::config::AgentConfig;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("completion endpoint is rate limiting requests")]
    RateLimited,
    #[error("completion request failed")]
    Transport(#[source] reqwest::Error),
    #[error("completion endpoint returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("completion response had no choices")]
    MissingCompletion,
    #[error("API key variable {0} is not set")]
    MissingApiKey(String),
}

/// Abstraction over completion backends.
pub trait Agent {
    /// Complete `prompt`, stopping at the first of `stop`.
    fn complete(&mut self, prompt: &str, stop: &[&str]) -> Result<String, AgentError>;
}

/// Exponential backoff applied to rate-limited requests only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            max_attempts: 5,
        }
    }
}

impl Backoff {
    /// Delay after failed attempt number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.initial * 2u32.saturating_pow(attempt.min(16))
    }

    /// Run `op` until it succeeds, fails with a non-rate-limit error, or the
    /// attempts run out.
    pub fn retry<T>(
        &self,
        mut sleep: impl FnMut(Duration),
        mut op: impl FnMut() -> Result<T, AgentError>,
    ) -> Result<T, AgentError> {
        let mut attempt = 0;
        loop {
            match op() {
                Err(AgentError::RateLimited) if attempt + 1 < self.max_attempts => {
                    let delay = self.delay(attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, "rate limited");
                    sleep(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stop: &'a [&'a str],
    max_tokens: u32,
    n: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    text: String,
}

/// Agent backed by an OpenAI-compatible `/completions` endpoint.
pub struct CompletionClient {
    http: Client,
    config: AgentConfig,
    api_key: String,
    backoff: Backoff,
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient")
            .field("config", &self.config)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl CompletionClient {
    pub fn new(config: AgentConfig, api_key: String) -> Result<Self, AgentError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(AgentError::Transport)?;
        Ok(Self {
            http,
            config,
            api_key,
            backoff: Backoff::default(),
        })
    }

    /// Build a client reading the API key from the configured variable.
    pub fn from_env(config: AgentConfig) -> Result<Self, AgentError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| AgentError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(config, api_key)
    }

    fn endpoint(&self) -> String {
        format!("{}/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn request_once(&self, prompt: &str, stop: &[&str]) -> Result<String, AgentError> {
        let body = CompletionRequest {
            model: &self.config.model,
            prompt,
            stop,
            max_tokens: self.config.max_tokens,
            n: 1,
            temperature: 0.0,
        };
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(AgentError::Transport)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AgentError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AgentError::Status { status, body });
        }
        let parsed: CompletionResponse = response.json().map_err(AgentError::Transport)?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .ok_or(AgentError::MissingCompletion)
    }
}

impl Agent for CompletionClient {
    #[instrument(skip_all, fields(model = %self.config.model, prompt_bytes = prompt.len()))]
    fn complete(&mut self, prompt: &str, stop: &[&str]) -> Result<String, AgentError> {
        let text = self
            .backoff
            .retry(thread::sleep, || self.request_once(prompt, stop))?;
        debug!(bytes = text.len(), "completion received");
        Ok(text)
    }
}
