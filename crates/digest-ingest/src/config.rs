//! Configuration for the ingestion queue

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::providers::{CredentialProvider, EnvToken, SessionFileToken};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IngestConfig {
    /// Backend API configuration
    #[serde(default)]
    pub backend: BackendConfig,
    /// Per-stage timeouts
    #[serde(default)]
    pub processing: ProcessingConfig,
    /// Where the bearer token comes from
    #[serde(default)]
    pub auth: AuthConfig,
}

impl IngestConfig {
    /// Load configuration from an optional TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings where the HTTP client would cut a stage short
    ///
    /// The reqwest timeout covers a whole request, so it must outlast the
    /// longest stage timeout or the stage limit never applies.
    pub fn validate(&self) -> Result<()> {
        let request = self.backend.request_timeout_secs;
        let stage = self
            .processing
            .upload_timeout_secs
            .max(self.processing.process_timeout_secs);

        if request < stage {
            return Err(Error::Config(format!(
                "backend.request_timeout_secs ({}) must be at least the longest stage timeout ({})",
                request, stage
            )));
        }
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Override file settings with `DIGEST_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("DIGEST_API_BASE_URL") {
            self.backend.base_url = url;
        }
        if let Some(secs) = env_secs("DIGEST_UPLOAD_TIMEOUT_SECS")? {
            self.processing.upload_timeout_secs = secs;
        }
        if let Some(secs) = env_secs("DIGEST_PROCESS_TIMEOUT_SECS")? {
            self.processing.process_timeout_secs = secs;
        }
        Ok(())
    }

    /// Credential provider selected by the `auth` section
    pub fn credential_provider(&self) -> Arc<dyn CredentialProvider> {
        match &self.auth.session_file {
            Some(path) => Arc::new(SessionFileToken::new(path)),
            None => Arc::new(EnvToken::new(&self.auth.token_env)),
        }
    }
}

fn env_secs(var: &str) -> Result<Option<u64>> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} must be a number of seconds, got '{}'", var, value))),
        Err(_) => Ok(None),
    }
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// API root, e.g. `http://localhost:8000/api/v1`
    pub base_url: String,
    /// Upload endpoint, relative to `base_url`
    pub upload_path: String,
    /// Pipeline endpoint, relative to `base_url`; `{id}` is replaced by the remote id
    pub pipeline_path_template: String,
    /// HTTP client timeout in seconds, an outer bound above both stage timeouts (default: 900)
    pub request_timeout_secs: u64,
    /// Maximum upload size in bytes (default: 100MB)
    pub max_upload_size: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/v1".to_string(),
            upload_path: "/pdfs/upload/".to_string(),
            pipeline_path_template: "/pipeline/{id}/pipeline".to_string(),
            request_timeout_secs: 900,
            max_upload_size: 100 * 1024 * 1024, // 100MB
        }
    }
}

impl BackendConfig {
    pub fn upload_url(&self) -> String {
        join_url(&self.base_url, &self.upload_path)
    }

    pub fn pipeline_url(&self, remote_id: &str) -> String {
        join_url(
            &self.base_url,
            &self.pipeline_path_template.replace("{id}", remote_id),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Stage timeouts applied by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Upload timeout in seconds (default: 120)
    pub upload_timeout_secs: u64,
    /// Extraction timeout in seconds (default: 600, OCR plus LLM passes are slow)
    pub process_timeout_secs: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            upload_timeout_secs: 120,
            process_timeout_secs: 600,
        }
    }
}

impl ProcessingConfig {
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }
}

/// Token source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Environment variable holding the token (default: `DIGEST_API_TOKEN`)
    pub token_env: String,
    /// Session file written by the login flow; takes precedence over `token_env`
    pub session_file: Option<PathBuf>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_env: "DIGEST_API_TOKEN".to_string(),
            session_file: None,
        }
    }
}
