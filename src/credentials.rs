use std::{
    fmt, io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

/// Placeholder printed instead of the API token.
pub const REDACTED: &str = "**REDACTED**";

/// Result of a successful pairing. Immutable until the next pairing.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub api_token: String,
    pub instance_id: String,
    pub user_email: String,
    pub api_url: String,
}

impl Credentials {
    /// JSON view with the token replaced by [`REDACTED`].
    pub fn redacted(&self) -> serde_json::Value {
        serde_json::json!({
            "api_token": REDACTED,
            "instance_id": self.instance_id,
            "user_email": self.user_email,
            "api_url": self.api_url,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_token", &REDACTED)
            .field("instance_id", &self.instance_id)
            .field("user_email", &self.user_email)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// JSON file holding the credentials between restarts.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when nothing has been stored yet.
    pub async fn load(&self) -> Result<Option<Credentials>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No stored credentials");
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("failed to read credentials from {}", self.path.display())
                })
            }
        };

        let credentials = serde_json::from_slice(&bytes).with_context(|| {
            format!("credentials file {} is not valid JSON", self.path.display())
        })?;
        Ok(Some(credentials))
    }

    pub async fn save(&self, credentials: &Credentials) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }

        let content =
            serde_json::to_vec_pretty(credentials).context("failed to serialize credentials")?;
        fs::write(&self.path, content)
            .await
            .with_context(|| format!("failed to write credentials to {}", self.path.display()))?;

        info!(path = %self.path.display(), instance_id = %credentials.instance_id, "Credentials saved");
        Ok(())
    }

    /// Remove the stored credentials. Missing file is not an error.
    pub async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "Credentials removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!("failed to remove credentials at {}", self.path.display())
            }),
        }
    }
}
