use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lodge::Lodge;
use super::profile::Profile;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Officer,
    #[default]
    Member,
}

impl MemberRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MemberRole::Admin => "admin",
            MemberRole::Officer => "officer",
            MemberRole::Member => "member",
        }
    }

    /// Officers and admins may schedule tenues and issue invitations.
    pub fn can_manage(self) -> bool {
        matches!(self, MemberRole::Admin | MemberRole::Officer)
    }
}

/// Row of `lodge_memberships`. Deactivated, never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LodgeMembership {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lodge_id: Uuid,
    #[serde(default)]
    pub role: MemberRole,
    pub office: Option<String>,
    #[serde(default = "first_degree")]
    pub degree: i32,
    #[serde(default)]
    pub is_active: bool,
    pub joined_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

fn first_degree() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewMembership {
    pub user_id: Uuid,
    pub lodge_id: Uuid,
    pub role: MemberRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub office: Option<String>,
    pub degree: i32,
    pub is_active: bool,
    pub joined_at: DateTime<Utc>,
}

impl NewMembership {
    pub fn new(user_id: Uuid, lodge_id: Uuid, role: MemberRole, degree: i32) -> Self {
        Self {
            user_id,
            lodge_id,
            role,
            office: None,
            degree,
            is_active: true,
            joined_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MembershipUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<MemberRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub office: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degree: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MembershipWithLodge {
    pub membership: LodgeMembership,
    pub lodge: Option<Lodge>,
}

/// One row of a lodge's member directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberEntry {
    pub membership: LodgeMembership,
    pub profile: Option<Profile>,
}

/// Apprentice, fellow craft, master.
pub const MAX_DEGREE: i32 = 3;

pub(crate) fn check_degree(degree: i32) -> Result<(), crate::error::BackendError> {
    if (1..=MAX_DEGREE).contains(&degree) {
        Ok(())
    } else {
        Err(crate::error::BackendError::validation(format!(
            "degree must be between 1 and {}, got {}",
            MAX_DEGREE, degree
        )))
    }
}
