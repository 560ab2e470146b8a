pub mod json_loader;

pub use json_loader::{load_posts_from_file, records_from_comment_forest};
