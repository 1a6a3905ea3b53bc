use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::membership::MemberRole;

/// Row of `invitations`. A code is consumed once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invitation {
    pub id: Uuid,
    pub lodge_id: Uuid,
    pub code: String,
    pub email: Option<String>,
    #[serde(default)]
    pub role: MemberRole,
    #[serde(default = "first_degree")]
    pub degree: i32,
    pub invited_by: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub used: bool,
    pub used_by: Option<Uuid>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

fn first_degree() -> i32 {
    1
}

impl Invitation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.used && !self.is_expired(now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewInvitation {
    pub lodge_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub role: MemberRole,
    #[serde(default = "first_degree")]
    pub degree: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invited_by: Option<Uuid>,
}
