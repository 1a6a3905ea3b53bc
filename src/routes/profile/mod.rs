mod handler;

pub use handler::{get_profile, my_lodges, update_profile};
