use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};

use crate::cloud::DEFAULT_API_URL;

pub const MIN_SCAN_INTERVAL_SECS: u64 = 30;
pub const MAX_SCAN_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_CREDENTIALS_PATH: &str = "green_energy_credentials.json";

// ---------------------------------------------------------------------------
// MonitoredEntities
// ---------------------------------------------------------------------------

/// The optional solar / battery / grid sensors whose state changes are
/// forwarded to the cloud.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitoredEntities {
    pub solar: Option<String>,
    pub battery: Option<String>,
    pub grid: Option<String>,
}

impl MonitoredEntities {
    /// Configured entity IDs in solar, battery, grid order.
    pub fn ids(&self) -> Vec<String> {
        [&self.solar, &self.battery, &self.grid]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    /// One-time code, only used when no credentials are stored.
    pub pairing_code: Option<String>,
    pub credentials_path: PathBuf,
    pub entities: MonitoredEntities,
    pub scan_interval: Duration,
    pub server_host: String,
    pub server_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_url: optional("GREEN_ENERGY_API_URL", DEFAULT_API_URL)
                .trim_end_matches('/')
                .to_owned(),
            pairing_code: parse_pairing_code(std::env::var("GREEN_ENERGY_PAIRING_CODE").ok()),
            credentials_path: optional("GREEN_ENERGY_CREDENTIALS_PATH", DEFAULT_CREDENTIALS_PATH)
                .into(),
            entities: MonitoredEntities {
                solar: entity("SOLAR_ENTITY")?,
                battery: entity("BATTERY_ENTITY")?,
                grid: entity("GRID_ENTITY")?,
            },
            scan_interval: parse_scan_interval(&optional(
                "SCAN_INTERVAL_SECS",
                &DEFAULT_SCAN_INTERVAL_SECS.to_string(),
            ))?,
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
        })
    }
}

/// Blank codes count as absent.
fn parse_pairing_code(raw: Option<String>) -> Option<String> {
    raw.map(|code| code.trim().to_owned())
        .filter(|code| !code.is_empty())
}

/// Seconds between status polls, bounded to 30..=3600.
fn parse_scan_interval(raw: &str) -> Result<Duration> {
    let secs: u64 = raw
        .trim()
        .parse()
        .context("SCAN_INTERVAL_SECS must be a positive integer")?;
    if !(MIN_SCAN_INTERVAL_SECS..=MAX_SCAN_INTERVAL_SECS).contains(&secs) {
        bail!(
            "SCAN_INTERVAL_SECS must be between {MIN_SCAN_INTERVAL_SECS} and \
             {MAX_SCAN_INTERVAL_SECS}, got {secs}"
        );
    }
    Ok(Duration::from_secs(secs))
}

/// Entity IDs look like `domain.object_id`, e.g. `sensor.solar_power`.
fn parse_entity_id(raw: &str) -> Result<Option<String>> {
    let id = raw.trim();
    if id.is_empty() {
        return Ok(None);
    }
    let valid = id.split_once('.').is_some_and(|(domain, object)| {
        !domain.is_empty() && !object.is_empty() && !object.contains('.')
    });
    if !valid {
        bail!("entity id must look like 'domain.object_id', got: {id:?}");
    }
    Ok(Some(id.to_owned()))
}

fn entity(key: &str) -> Result<Option<String>> {
    parse_entity_id(&optional(key, "")).with_context(|| format!("invalid {key}"))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}
