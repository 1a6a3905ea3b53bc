mod handler;
mod model;

pub use handler::{
    add_member, create_lodge, deactivate_lodge, get_lodge, list_lodges, list_members,
    lodge_counts, remove_member, update_lodge, update_member,
};
