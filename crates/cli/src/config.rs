use anyhow::{Context as AnyhowContext, Result};
use recap_reducer::{BackendConfig, BackendKind, ReducerConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "recap.toml";

/// Everything the CLI can configure, as laid out in `recap.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecapConfig {
    pub reducer: ReducerConfig,
    pub backend: BackendConfig,
}

impl RecapConfig {
    /// Load `explicit` (which must exist), or `./recap.toml` when present,
    /// or defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
                candidate.is_file().then_some(candidate)
            }
        };

        let Some(path) = path else {
            log::debug!("No config file; using defaults");
            return Ok(Self::default());
        };

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply `RECAP_BACKEND`, `RECAP_MODEL`, `OLLAMA_HOST`, `OPENAI_BASE_URL`
    /// and `OPENAI_API_KEY` from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(kind) = var("RECAP_BACKEND") {
            self.backend.kind = kind
                .parse::<BackendKind>()
                .map_err(anyhow::Error::msg)
                .context("Invalid RECAP_BACKEND")?;
        }
        if let Some(host) = var("OLLAMA_HOST") {
            self.backend.ollama.host = normalize_host(&host);
        }
        if let Some(base_url) = var("OPENAI_BASE_URL") {
            self.backend.openai.base_url = base_url;
        }
        if let Some(key) = var("OPENAI_API_KEY") {
            self.backend.openai.api_key = Some(key);
        }
        if let Some(model) = var("RECAP_MODEL") {
            self.backend.set_model(model);
        }
        Ok(())
    }
}

/// `OLLAMA_HOST` is often given as bare `host:port`
fn normalize_host(host: &str) -> String {
    let host = host.trim();
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}
