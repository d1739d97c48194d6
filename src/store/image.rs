use std::collections::BTreeMap;

use serde::Serialize;

use crate::digest::Digest;
use crate::error::Result;
use crate::reference::parse_normalized_named;
use crate::store::Store;
use crate::types::{Image, ImageKind};

/// what a repository name resolves to across the image store
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RepositoryImages {
    /// tag -> image ID
    pub tags: BTreeMap<String, String>,
    /// digest -> image ID
    pub digests: BTreeMap<String, String>,
}

impl Store<ImageKind> {
    /// copies of every image
    pub fn images(&self) -> Vec<Image> {
        self.list()
    }

    /// images known under `digest`, named or implicit
    pub fn by_digest(&self, digest: &Digest) -> Vec<Image> {
        self.iter()
            .filter(|image| image.digests().contains(digest))
            .cloned()
            .collect()
    }

    /// tags and digests of one repository
    ///
    /// `repository` is normalized first, so `foo` and
    /// `docker.io/library/foo:latest` select the same images.
    pub fn by_repository(&self, repository: &str) -> Result<RepositoryImages> {
        let named = parse_normalized_named(repository)?;
        let repository = named.name();
        let prefix = format!("{}@", repository);

        let mut found = RepositoryImages::default();
        for image in self.iter() {
            if let Some(tags) = image.tags().get(&repository) {
                for tag in tags {
                    found.tags.insert(tag.clone(), image.id.clone());
                }
            }
            for repo_digest in image.repo_digests() {
                if let Some(digest) = repo_digest.strip_prefix(&prefix) {
                    found.digests.insert(digest.to_string(), image.id.clone());
                }
            }
        }
        Ok(found)
    }

    /// set or clear the digest that identifies an image outside its names
    pub fn set_digest(&mut self, id_or_name: &str, digest: Option<Digest>) -> Result<()> {
        self.ensure_writable()?;
        let slot = self.slot(id_or_name)?;
        let image = &mut self.records[slot];
        image.kind.digest = digest;
        image.refresh()?;
        self.save()
    }
}
