use std::path::PathBuf;

/// error type for subvol-pack operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("inode #{id} belongs to a different map")]
    WrongOwner { id: u64 },

    #[error("adding {0}, but its parent does not exist")]
    ParentMissing(PathBuf),

    #[error("path {path} has 2 inodes: {new} and {existing}")]
    PathCollision {
        path: PathBuf,
        new: u64,
        existing: u64,
    },

    #[error("cannot remove {0} since it has children")]
    NodeHasChildren(PathBuf),

    #[error("path not in map: {0}")]
    PathNotFound(PathBuf),

    #[error("cannot remove the root path")]
    RootPath,

    #[error("need a relative path, got {0}")]
    AbsolutePath(PathBuf),

    #[error("unknown format {name:?}, expected one of: {known}")]
    UnknownFormat { name: String, known: String },

    #[error("two formats share the name {0:?}")]
    DuplicateFormat(&'static str),

    #[error("output path already exists: {0}")]
    OutputExists(PathBuf),

    #[error("blob not found: {0}")]
    BlobNotFound(String),

    #[error("blob token collision at {0}")]
    TokenCollision(PathBuf),

    #[error("invalid blob token: {0:?}")]
    InvalidToken(String),

    #[error("invalid subvolume descriptor {path}: {message}")]
    Descriptor { path: PathBuf, message: String },

    #[error("subvolume was built on host {expected:?}, but this is {actual:?}")]
    HostnameMismatch { expected: String, actual: String },

    #[error("command `{command}` failed: {status}")]
    Command { command: String, status: String },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
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
