use anyhow::{Context, Result};
use tracing::info;

use crate::{
    cloud::{CloudError, GreenEnergyClient},
    config::Config,
    credentials::{CredentialStore, Credentials},
};

/// Email recorded when the cloud does not return one.
pub const UNKNOWN_EMAIL: &str = "Unknown";

/// Return an authenticated client, pairing first if nothing is stored.
///
/// Stored credentials always win over a configured pairing code. A fresh
/// pairing is persisted before returning so the code is never needed again.
pub async fn ensure_paired(
    config: &Config,
    store: &CredentialStore,
) -> Result<(GreenEnergyClient, Credentials)> {
    if let Some(credentials) = store.load().await? {
        info!(
            instance_id = %credentials.instance_id,
            path = %store.path().display(),
            "Using stored credentials"
        );
        return Ok((GreenEnergyClient::with_credentials(&credentials), credentials));
    }

    let code = config.pairing_code.as_deref().with_context(|| {
        format!(
            "no credentials at {} and GREEN_ENERGY_PAIRING_CODE is not set",
            store.path().display()
        )
    })?;

    let client = GreenEnergyClient::new(&config.api_url);
    let paired = client.pair(code).await.map_err(|e| match e {
        CloudError::InvalidPairingCode => {
            anyhow::anyhow!("pairing failed: the pairing code is invalid or has expired")
        }
        CloudError::CannotConnect(msg) => {
            anyhow::anyhow!("pairing failed: cannot reach {}: {msg}", config.api_url)
        }
        other => anyhow::Error::new(other).context("pairing failed"),
    })?;

    let credentials = Credentials {
        api_token: paired.api_token,
        instance_id: paired.instance_id,
        user_email: paired
            .user_email
            .unwrap_or_else(|| UNKNOWN_EMAIL.to_owned()),
        api_url: client.base_url().to_owned(),
    };
    store
        .save(&credentials)
        .await
        .context("paired, but failed to persist credentials")?;

    Ok((client, credentials))
}
