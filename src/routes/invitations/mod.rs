mod handler;
mod model;

pub use handler::{check_invitation, create_invitation, list_invitations, redeem_invitation, revoke_invitation};
