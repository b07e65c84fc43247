use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::cloud::models::{StatusResponse, DEFAULT_RECOMMENDATION};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Synced,
    Syncing,
    Error,
    #[default]
    Unknown,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Error => "error",
            SyncStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Latest coordinator view, replaced wholesale after every successful poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SyncSnapshot {
    pub connected: bool,
    pub sync_status: SyncStatus,
    /// Time of the last successful poll.
    pub last_sync: Option<DateTime<Utc>>,
    pub readings_today: u64,
    pub recommendation: Option<String>,
    pub recommendation_reason: Option<String>,
    pub recommendation_expires: Option<String>,
    /// Minor currency units (pence).
    pub savings_today: i64,
    /// Pence per kWh.
    pub tariff_rate: Option<f64>,
}

impl SyncSnapshot {
    /// Snapshot for a successful poll at `now`.
    pub fn synced(status: StatusResponse, readings_today: u64, now: DateTime<Utc>) -> Self {
        Self {
            connected: true,
            sync_status: SyncStatus::Synced,
            last_sync: Some(now),
            readings_today,
            recommendation: Some(
                status
                    .recommendation
                    .unwrap_or_else(|| DEFAULT_RECOMMENDATION.to_owned()),
            ),
            recommendation_reason: status.recommendation_reason,
            recommendation_expires: status.recommendation_expires,
            savings_today: status.savings_today_pence.unwrap_or(0),
            tariff_rate: status.current_rate_pence,
        }
    }

    /// Previous values kept, marked stale. `last_sync` is left untouched.
    pub fn degraded(&self, readings_today: u64) -> Self {
        Self {
            connected: false,
            sync_status: SyncStatus::Error,
            readings_today,
            ..self.clone()
        }
    }

    /// Same values, flagged as refreshing.
    pub fn syncing(&self) -> Self {
        Self {
            sync_status: SyncStatus::Syncing,
            ..self.clone()
        }
    }

    /// Savings converted from minor to major currency units.
    pub fn savings_today_major(&self) -> f64 {
        self.savings_today as f64 / 100.0
    }
}
