mod download;
mod filename;

pub use download::{PARTIAL_SUFFIX, download_to_file, partial_path};
pub use filename::{file_ending, sanitize_file_name, sanitize_file_path};
