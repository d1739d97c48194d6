//! named blobs stored next to a record
//!
//! each item lives in `<dir>/<id>/<base name>`; the record keeps the list of
//! keys and the size of the latest write per key.

use std::path::PathBuf;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use tracing::debug;

use crate::error::{Error, IoResultExt, Result};
use crate::fs;
use crate::store::Store;
use crate::types::Kind;

impl<K: Kind> Store<K> {
    fn data_path(&self, id: &str, key: &str) -> PathBuf {
        self.data_dir(id).join(big_data_base_name(key))
    }

    /// store a blob under `key` for a record
    ///
    /// the record is only re-saved when the key is new or the size changed;
    /// a rewrite with different bytes of the same length keeps the old
    /// bookkeeping on disk.
    pub fn set_big_data(&mut self, id_or_name: &str, key: &str, data: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        if key.is_empty() {
            return Err(Error::invalid_name(key, "big data key must not be empty"));
        }
        let slot = self.slot(id_or_name)?;
        let id = self.records[slot].id.clone();

        fs::create_dir_all(&self.data_dir(&id), 0o700)?;
        fs::write_atomic(&self.data_path(&id, key), data, 0o600)?;

        let size = data.len() as u64;
        let record = &mut self.records[slot];
        let mut save = record.big_data_sizes.insert(key.to_string(), size) != Some(size);
        if !record.big_data_names.iter().any(|name| name == key) {
            record.big_data_names.push(key.to_string());
            save = true;
        }

        debug!(entity = K::ENTITY, id = %id, key = %key, size, save, "stored big data");
        if save {
            self.save()?;
        }
        Ok(())
    }

    /// read a blob back
    pub fn big_data(&self, id_or_name: &str, key: &str) -> Result<Vec<u8>> {
        let id = &self.get(id_or_name)?.id;
        let path = self.data_path(id, key);
        std::fs::read(&path).with_path(&path)
    }

    /// size recorded by the latest write of `key`
    pub fn big_data_size(&self, id_or_name: &str, key: &str) -> Result<u64> {
        let record = self.get(id_or_name)?;
        record
            .big_data_sizes
            .get(key)
            .copied()
            .ok_or_else(|| Error::SizeUnknown {
                id: record.id.clone(),
                key: key.to_string(),
            })
    }

    /// keys stored for a record, in the order they were first written
    pub fn big_data_names(&self, id_or_name: &str) -> Result<Vec<String>> {
        Ok(self.get(id_or_name)?.big_data_names.clone())
    }
}

/// file name used for a big data key
///
/// plain keys are used as is; anything else is base64 encoded behind a '='
/// so it cannot clash with a plain key or escape the record directory.
pub fn big_data_base_name(key: &str) -> String {
    let plain = key
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.');
    if plain && key != "." && key != ".." {
        return key.to_string();
    }
    format!("={}", URL_SAFE.encode(key))
}
