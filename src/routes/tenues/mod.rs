mod handler;
mod model;

pub use handler::{
    cancel_tenue, create_tenue, delete_tenue, get_tenue, list_tenues, my_attendance,
    set_attendance, tenue_attendance, update_tenue, upcoming_tenues,
};
