//! HTTP adapters implementing [`GenerationPort`](crate::GenerationPort).

mod lines;
mod ollama;
mod openai;
mod retry;

pub use lines::{byte_lines, sse_data};
pub use ollama::{OllamaConfig, OllamaGenerator, DEFAULT_OLLAMA_HOST, DEFAULT_OLLAMA_MODEL};
pub use openai::{OpenAiConfig, OpenAiGenerator, DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL};
pub use retry::RetryPolicy;

use crate::error::GenerationError;
use crate::generation::GenerationPort;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Which backend serves generation calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    #[default]
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
}

impl BackendKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" | "open_ai" => Ok(Self::OpenAi),
            other => Err(format!("Unknown backend '{other}' (expected ollama or openai)")),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend selection plus per-backend settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub ollama: OllamaConfig,
    pub openai: OpenAiConfig,
}

impl BackendConfig {
    /// Model of the selected backend
    #[must_use]
    pub fn model(&self) -> &str {
        match self.kind {
            BackendKind::Ollama => &self.ollama.model,
            BackendKind::OpenAi => &self.openai.model,
        }
    }

    /// Override the model of the selected backend
    pub fn set_model(&mut self, model: impl Into<String>) {
        match self.kind {
            BackendKind::Ollama => self.ollama.model = model.into(),
            BackendKind::OpenAi => self.openai.model = model.into(),
        }
    }

    /// Override the endpoint (host or base URL) of the selected backend
    pub fn set_endpoint(&mut self, endpoint: impl Into<String>) {
        match self.kind {
            BackendKind::Ollama => self.ollama.host = endpoint.into(),
            BackendKind::OpenAi => self.openai.base_url = endpoint.into(),
        }
    }

    /// Build the selected generator
    pub fn build(&self) -> Result<Arc<dyn GenerationPort>, GenerationError> {
        Ok(match self.kind {
            BackendKind::Ollama => Arc::new(OllamaGenerator::new(self.ollama.clone())?),
            BackendKind::OpenAi => Arc::new(OpenAiGenerator::new(self.openai.clone())?),
        })
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client, GenerationError> {
    let mut builder = reqwest::Client::builder().connect_timeout(Duration::from_secs(10));
    if timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(timeout_secs));
    }
    Ok(builder.build()?)
}

/// Turn a non-success status into [`GenerationError::Api`] carrying the body
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GenerationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(GenerationError::Api {
        status: status.as_u16(),
        message: message.trim().to_string(),
    })
}
