use serde::{Deserialize, Serialize};

use crate::types::record::{Kind, Record};

/// a container: an image plus the read-write layer created for it
pub type Container = Record<ContainerKind>;

/// container-specific fields of a record
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerKind {
    /// ID of the image the container was created from
    #[serde(default)]
    pub image: String,

    /// ID of the container's own read-write layer
    #[serde(default)]
    pub layer: String,
}

impl ContainerKind {
    pub fn new(image: impl Into<String>, layer: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            layer: layer.into(),
        }
    }
}

impl Kind for ContainerKind {
    const ENTITY: &'static str = "containers";
}

impl Record<ContainerKind> {
    pub fn image(&self) -> &str {
        &self.kind.image
    }

    pub fn layer(&self) -> &str {
        &self.kind.layer
    }
}
