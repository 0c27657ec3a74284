use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Accepted,
    Rejected,
}

impl ResponseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseKind::Accepted => "accepted",
            ResponseKind::Rejected => "rejected",
        }
    }
}

/// One driver's reply to one request. Append-only history; unique per
/// (request_id, driver_id) and retained regardless of outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverResponse {
    pub request_id: i64,
    pub driver_id: i64,
    pub kind: ResponseKind,
    pub responded_at: DateTime<Utc>,
}
