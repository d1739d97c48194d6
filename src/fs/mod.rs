pub mod atomic;

pub use atomic::{create_dir_all, fsync_dir, remove_dir_all, write_atomic};
