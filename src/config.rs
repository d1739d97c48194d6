use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IoResultExt, Result};
use crate::store::Store;
use crate::types::Kind;

/// default location of all stores
pub const DEFAULT_ROOT: &str = "/var/lib/containers/storage";

/// default storage driver name, used as the store directory prefix
pub const DEFAULT_DRIVER: &str = "overlay";

/// storage configuration, usually read from a TOML file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// directory holding the per-driver store directories
    pub root: PathBuf,
    /// driver name; stores live in `<root>/<driver>-<entity>`
    pub driver: String,
    /// open stores without the right to change them
    pub read_only: bool,
}

impl Config {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_path(path)?;
        Ok(())
    }

    /// directory of the store for `entity` (`images`, `layers`, `containers`)
    pub fn store_dir(&self, entity: &str) -> PathBuf {
        self.root.join(format!("{}-{}", self.driver, entity))
    }

    /// open the store of kind `K`, read-only if so configured
    pub fn open_store<K: Kind>(&self) -> Result<Store<K>> {
        let dir = self.store_dir(K::ENTITY);
        if self.read_only {
            Store::open_read_only(&dir)
        } else {
            Store::open(&dir)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            driver: DEFAULT_DRIVER.to_string(),
            read_only: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::{ImageKind, LayerKind};
    use tempfile::tempdir;

    #[test]
    fn test_config_toml_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.toml");
        let config = Config {
            root: PathBuf::from("/srv/storage"),
            driver: "vfs".into(),
            read_only: true,
        };

        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_config_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());

        let config: Config = toml::from_str(r#"root = "/tmp/s""#).unwrap();
        assert_eq!(config.root, PathBuf::from("/tmp/s"));
        assert_eq!(config.driver, DEFAULT_DRIVER);
        assert!(!config.read_only);
    }

    #[test]
    fn test_config_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.toml");
        assert!(matches!(Config::load(&path), Err(Error::Io { .. })));

        std::fs::write(&path, "root = [").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_store_dirs() {
        let config = Config::new("/srv");
        assert_eq!(config.store_dir("images"), PathBuf::from("/srv/overlay-images"));
        assert_eq!(config.store_dir("layers"), PathBuf::from("/srv/overlay-layers"));
    }

    #[test]
    fn test_open_store() {
        let dir = tempdir().unwrap();
        let mut config = Config::new(dir.path());

        let mut images = config.open_store::<ImageKind>().unwrap();
        images.create("img", &[], ImageKind::new("l"), "").unwrap();
        let layers = config.open_store::<LayerKind>().unwrap();
        assert!(layers.is_empty());
        assert!(dir.path().join("overlay-images/images.json").is_file());
        assert!(dir.path().join("overlay-layers/layers.lock").is_file());

        config.read_only = true;
        let ro = config.open_store::<ImageKind>().unwrap();
        assert!(ro.is_read_only());
        assert!(ro.exists("img"));
    }
}
