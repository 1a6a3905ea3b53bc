use serde::Deserialize;

use crate::models::AttendanceStatus;

#[derive(Debug, Deserialize)]
pub struct UpcomingQuery {
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    5
}

#[derive(Debug, Deserialize)]
pub struct AttendanceRequest {
    pub status: AttendanceStatus,
    #[serde(default)]
    pub excuse: Option<String>,
}
