use serde::Deserialize;
use uuid::Uuid;

use crate::models::MemberRole;

pub const DEFAULT_VALID_DAYS: i64 = 14;

#[derive(Debug, Deserialize)]
pub struct CreateInvitationRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: MemberRole,
    #[serde(default = "first_degree")]
    pub degree: i32,
    #[serde(default)]
    pub valid_days: Option<i64>,
}

fn first_degree() -> i32 {
    1
}

#[derive(Debug, Default, Deserialize)]
pub struct PendingQuery {
    #[serde(default)]
    pub pending: bool,
}

#[derive(Debug, Deserialize)]
pub struct InvitationPath {
    pub lodge_id: Uuid,
    pub invitation_id: Uuid,
}
