use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::Attachment;

#[derive(Debug, Deserialize)]
pub struct DirectRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct GroupRequest {
    pub title: String,
    pub participant_ids: Vec<Uuid>,
    #[serde(default)]
    pub lodge_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub before: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
pub struct ReadRequest {
    pub message_ids: Vec<Uuid>,
}
