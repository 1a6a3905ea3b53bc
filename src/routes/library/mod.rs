mod handler;

pub use handler::{create_entry, delete_entry, get_entry, list_entries, update_entry};
