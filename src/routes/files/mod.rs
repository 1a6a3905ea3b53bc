mod handler;
mod model;

pub use handler::{delete_file, download_file, list_files, public_file, public_url, upload_file};
