mod handler;
mod model;

pub use handler::{
    current_user, forgot_password, oauth_url, refresh, sign_in, sign_out, sign_up,
    update_password, update_user_data, verify_recovery,
};
