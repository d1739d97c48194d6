//! ctrstore - container image, layer and container bookkeeping
//!
//! keeps the records that describe images, layers and containers in plain
//! JSON files, one directory per entity kind, shared safely between processes
//! through an advisory lock file.
//!
//! # Core concepts
//!
//! - **Record**: an ID, unique names, free-form metadata, flags and "big data"
//!   blobs stored next to the JSON file
//! - **Store**: the in-memory collection of one kind of record plus its name
//!   and ID indexes, persisted as `<entity>.json`
//! - **Lock file**: `<entity>.lock`, the cross-process lock that also tells
//!   other handles when their copy is stale
//! - **Names**: image names are normalized references (`foo` is
//!   `docker.io/library/foo`) from which tags and digests are derived
//!
//! # Example usage
//!
//! ```no_run
//! use ctrstore::{ImageKind, ImageStore};
//! use std::path::Path;
//!
//! let mut images = ImageStore::open(Path::new("/var/lib/containers/storage/overlay-images")).unwrap();
//! images
//!     .with_lock(|s| {
//!         s.create("", &["fedora:latest".to_string()], ImageKind::new("layer-id"), "")?;
//!         Ok(())
//!     })
//!     .unwrap();
//! let image = images.get("fedora:latest").unwrap();
//! println!("{} {:?}", image.id, image.repo_tags());
//! ```

mod config;
mod digest;
mod error;
mod lockfile;
mod names;
mod reference;

pub mod fs;
pub mod store;
pub mod types;

pub use config::{Config, DEFAULT_DRIVER, DEFAULT_ROOT};
pub use digest::{Algorithm, Digest};
pub use error::{Error, Result};
pub use lockfile::{LockFile, LockGuard};
pub use names::{recompute_names, NameSet};
pub use reference::{is_full_identifier, parse_normalized_named, Named};
pub use store::{
    big_data_base_name, ContainerStore, ImageStore, LayerStore, RepositoryImages, Store,
};
pub use types::{
    generate_id, name_key, truncate_id, Container, ContainerKind, Image, ImageKind, Kind, Layer,
    LayerKind, Record,
};
