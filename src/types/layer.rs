use serde::{Deserialize, Serialize};

use crate::types::record::{Kind, Record};

/// a layer record; the layer contents belong to the graph driver
pub type Layer = Record<LayerKind>;

/// layer-specific fields of a record
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerKind {
    /// ID of the layer this one is stacked on, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl LayerKind {
    pub fn new(parent: Option<String>) -> Self {
        Self { parent }
    }
}

impl Kind for LayerKind {
    const ENTITY: &'static str = "layers";
}

impl Record<LayerKind> {
    pub fn parent(&self) -> Option<&str> {
        self.kind.parent.as_deref()
    }
}
