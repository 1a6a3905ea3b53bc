use serde::Deserialize;
use uuid::Uuid;

use crate::models::MemberRole;

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub role: MemberRole,
    #[serde(default)]
    pub office: Option<String>,
    #[serde(default = "first_degree")]
    pub degree: i32,
}

fn first_degree() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct MembershipPath {
    pub lodge_id: Uuid,
    pub membership_id: Uuid,
}
