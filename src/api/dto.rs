use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::sync::{SyncSnapshot, SyncStatus};

pub const CURRENCY: &str = "GBP";
pub const TARIFF_UNIT: &str = "p/kWh";

/// Response for `GET /status`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusDto {
    pub connected: bool,
    pub sync_status: SyncStatus,
    /// Time of the last successful poll.
    pub last_sync: Option<DateTime<Utc>>,
    /// Readings uploaded since local midnight.
    pub readings_today: u64,
    pub recommendation: Option<String>,
    pub recommendation_reason: Option<String>,
    /// When the recommendation expires, as sent by the cloud.
    pub valid_until: Option<String>,
    /// Savings in major currency units (e.g. 12.34 = £12.34).
    pub savings_today: f64,
    pub currency: String,
    pub tariff_rate: Option<f64>,
    pub tariff_unit: String,
}

impl From<SyncSnapshot> for StatusDto {
    fn from(s: SyncSnapshot) -> Self {
        Self {
            savings_today: s.savings_today_major(),
            connected: s.connected,
            sync_status: s.sync_status,
            last_sync: s.last_sync,
            readings_today: s.readings_today,
            recommendation: s.recommendation,
            recommendation_reason: s.recommendation_reason,
            valid_until: s.recommendation_expires,
            currency: CURRENCY.to_owned(),
            tariff_rate: s.tariff_rate,
            tariff_unit: TARIFF_UNIT.to_owned(),
        }
    }
}

/// Response for `POST /events/state_changed`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EventAcceptedDto {
    /// Number of subscribers the notification reached.
    pub delivered: usize,
}

/// Response for `DELETE /pairing`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UnpairDto {
    /// Whether the cloud confirmed the token was revoked.
    pub unpaired: bool,
    /// Whether the local credential file was removed.
    pub credentials_cleared: bool,
}
