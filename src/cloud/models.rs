use serde::{Deserialize, Serialize};

use crate::readings::Reading;

/// Recommendation shown when the cloud has nothing to suggest.
pub const DEFAULT_RECOMMENDATION: &str = "No action needed";

// ---------------------------------------------------------------------------
// Pairing: POST /api/ha/pair
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct PairRequest<'a> {
    pub pairing_code: &'a str,
}

/// Long-lived credentials handed out in exchange for a pairing code.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PairResponse {
    pub api_token: String,
    /// Partition key for every later call.
    pub instance_id: String,
    #[serde(default)]
    pub user_email: Option<String>,
}

/// Error payload returned alongside `400 Bad Request`.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Readings: POST /api/ha/readings
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ReadingsRequest<'a> {
    pub instance_id: &'a str,
    pub readings: &'a [Reading],
}

// ---------------------------------------------------------------------------
// Status: GET /api/ha/status?instance_id=
// ---------------------------------------------------------------------------

/// Current optimisation advice and savings for this installation.
///
/// Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub recommendation_reason: Option<String>,
    /// ISO-8601 timestamp, passed through untouched.
    #[serde(default)]
    pub recommendation_expires: Option<String>,
    /// Minor currency units (pence).
    #[serde(default)]
    pub savings_today_pence: Option<i64>,
    /// Pence per kWh.
    #[serde(default)]
    pub current_rate_pence: Option<f64>,
}

// ---------------------------------------------------------------------------
// Unpair: POST /api/ha/unpair
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct UnpairRequest<'a> {
    pub instance_id: &'a str,
}
