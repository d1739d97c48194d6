use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::Result;
use crate::names::{recompute_names, NameSet};
use crate::types::record::{Kind, Record};

/// an image: a reference to its top layer plus naming data
pub type Image = Record<ImageKind>;

/// image-specific fields of a record
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageKind {
    /// ID of the topmost layer of the image; several images may share it
    #[serde(rename = "layer", default)]
    pub top_layer: String,

    /// digest that identifies the image without being part of any name,
    /// typically the digest of its manifest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<Digest>,

    #[serde(skip)]
    derived: NameSet,
}

impl ImageKind {
    pub fn new(top_layer: impl Into<String>) -> Self {
        Self {
            top_layer: top_layer.into(),
            ..Self::default()
        }
    }

    pub fn with_digest(mut self, digest: Digest) -> Self {
        self.digest = Some(digest);
        self
    }

    fn implicit_digests(&self) -> &[Digest] {
        self.digest.as_slice()
    }
}

impl Kind for ImageKind {
    const ENTITY: &'static str = "images";

    fn validate_names(names: &[String]) -> Result<()> {
        recompute_names(names, &[] as &[Digest]).map(|_| ())
    }

    fn refresh(&mut self, names: &[String]) -> Result<()> {
        self.derived = recompute_names(names, self.implicit_digests())?;
        Ok(())
    }
}

impl Record<ImageKind> {
    pub fn top_layer(&self) -> &str {
        &self.kind.top_layer
    }

    /// every digest known for the image, named or implicit
    pub fn digests(&self) -> &[Digest] {
        &self.kind.derived.digests
    }

    /// canonical repository -> tags
    pub fn tags(&self) -> &BTreeMap<String, Vec<String>> {
        &self.kind.derived.tags
    }

    pub fn repositories(&self) -> &[String] {
        &self.kind.derived.repositories
    }

    pub fn repo_tags(&self) -> &[String] {
        &self.kind.derived.repo_tags
    }

    pub fn repo_digests(&self) -> &[String] {
        &self.kind.derived.repo_digests
    }
}
