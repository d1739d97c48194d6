mod container;
mod image;
mod layer;
mod record;

pub use container::{Container, ContainerKind};
pub use image::{Image, ImageKind};
pub use layer::{Layer, LayerKind};
pub use record::{generate_id, name_key, truncate_id, Kind, Record};
