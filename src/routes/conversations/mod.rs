mod handler;
mod model;

pub use handler::{
    create_group, list_conversations, list_messages, mark_read, open_direct, send_message,
};
