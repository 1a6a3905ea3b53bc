pub mod auth;
pub mod conversations;
pub mod files;
pub mod invitations;
pub mod library;
pub mod lodges;
pub mod profile;
pub mod tenues;

use uuid::Uuid;

use crate::{
    AppState,
    error::{BackendError, ErrorKind},
    models::LodgeMembership,
};

/// The caller's active membership in `lodge_id`.
pub(crate) async fn require_member(
    state: &AppState,
    user_id: Uuid,
    lodge_id: Uuid,
) -> Result<LodgeMembership, BackendError> {
    match state
        .services
        .members
        .get_membership(user_id, lodge_id)
        .await
        .into_result()?
    {
        Some(membership) if membership.is_active => Ok(membership),
        _ => Err(BackendError::new(
            ErrorKind::PermissionDenied,
            format!("not a member of lodge {}", lodge_id),
        )),
    }
}

/// Like [`require_member`], for officers and admins only.
pub(crate) async fn require_manager(
    state: &AppState,
    user_id: Uuid,
    lodge_id: Uuid,
) -> Result<LodgeMembership, BackendError> {
    let membership = require_member(state, user_id, lodge_id).await?;
    if !membership.role.can_manage() {
        return Err(BackendError::new(
            ErrorKind::PermissionDenied,
            "officers and admins only",
        ));
    }
    Ok(membership)
}

/// Content above the member's degree stays hidden.
pub(crate) fn require_degree(membership: &LodgeMembership, degree: Option<i32>) -> Result<(), BackendError> {
    match degree {
        Some(degree) if degree > membership.degree => Err(BackendError::new(
            ErrorKind::PermissionDenied,
            format!("restricted to degree {}", degree),
        )),
        _ => Ok(()),
    }
}

/// The lower of the requested cap and the member's own degree.
pub(crate) fn cap_degree(membership: &LodgeMembership, requested: Option<i32>) -> Option<i32> {
    Some(requested.map_or(membership.degree, |d| d.min(membership.degree)))
}
