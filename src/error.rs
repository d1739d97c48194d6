use std::path::PathBuf;

/// error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("record not known: {0}")]
    NotFound(String),

    #[error("that ID is already in use: {0}")]
    DuplicateId(String),

    #[error("that name is already in use: {0}")]
    DuplicateName(String),

    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("invalid digest {digest:?}: {reason}")]
    InvalidDigest { digest: String, reason: String },

    #[error("size of item {key:?} of {id} is not known")]
    SizeUnknown { id: String, key: String },

    #[error("lock is not a read-write lock: {0}")]
    ReadOnlyLock(PathBuf),

    #[error("corrupt store file {path}: {reason}")]
    CorruptStore { path: PathBuf, reason: String },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json serialization error: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

impl Error {
    pub(crate) fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_digest(digest: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidDigest {
            digest: digest.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}
