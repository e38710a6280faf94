//! Bearer token providers
//!
//! Token acquisition and renewal belong to the login flow; the clients only
//! ask a provider for the current token before every request.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Supplies the bearer token attached to backend requests
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current access token; `Error::Auth` if none is available
    async fn bearer_token(&self) -> Result<String>;
}

fn non_empty(token: String, source: &str) -> Result<String> {
    let token = token.trim().to_string();
    if token.is_empty() {
        return Err(Error::auth(format!("no session token in {}", source)));
    }
    Ok(token)
}

/// Fixed token, e.g. passed on the command line
#[derive(Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken").field("token", &"<redacted>").finish()
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn bearer_token(&self) -> Result<String> {
        non_empty(self.token.clone(), "static credentials")
    }
}

/// Token read from an environment variable on every request
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl CredentialProvider for EnvToken {
    async fn bearer_token(&self) -> Result<String> {
        let token = std::env::var(&self.var)
            .map_err(|_| Error::auth(format!("environment variable {} is not set", self.var)))?;
        non_empty(token, &self.var)
    }
}

/// Persisted login response
#[derive(Deserialize)]
struct SessionFile {
    #[serde(alias = "token")]
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

/// Token read from the session file the login flow writes
///
/// The file holds the login response, `{"access_token": "...", "token_type": "bearer", ...}`.
/// It is re-read on every call so a renewed session is picked up mid-batch.
#[derive(Debug, Clone)]
pub struct SessionFileToken {
    path: PathBuf,
}

impl SessionFileToken {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl CredentialProvider for SessionFileToken {
    async fn bearer_token(&self) -> Result<String> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::auth(format!(
                "failed to read session file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let session: SessionFile = serde_json::from_str(&content).map_err(|e| {
            Error::auth(format!(
                "invalid session file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        if let Some(kind) = session.token_type.as_deref() {
            if !kind.eq_ignore_ascii_case("bearer") {
                return Err(Error::auth(format!("unsupported token type '{}'", kind)));
            }
        }

        non_empty(session.access_token, &self.path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_static_token() {
        assert_eq!(StaticToken::new("abc").bearer_token().await.unwrap(), "abc");
        assert!(matches!(
            StaticToken::new("  ").bearer_token().await,
            Err(Error::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_env_token() {
        let var = "DIGEST_INGEST_TEST_TOKEN_ENV";
        std::env::remove_var(var);
        assert!(EnvToken::new(var).bearer_token().await.is_err());

        std::env::set_var(var, "from-env");
        assert_eq!(EnvToken::new(var).bearer_token().await.unwrap(), "from-env");
        std::env::remove_var(var);
    }

    #[tokio::test]
    async fn test_session_file_token() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"access_token": "jwt-123", "token_type": "bearer", "role": "ANALYST", "full_name": "Test User"}}"#
        )
        .unwrap();

        let provider = SessionFileToken::new(file.path());
        assert_eq!(provider.bearer_token().await.unwrap(), "jwt-123");
    }

    #[tokio::test]
    async fn test_session_file_missing() {
        let provider = SessionFileToken::new("/nonexistent/session.json");
        let err = provider.bearer_token().await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }
}
