use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, IoResultExt, Result};

/// where a built subvolume lives, as described by its layer's JSON output
///
/// the JSON is produced by the image build; this crate only reads it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubvolumeOnDisk {
    pub btrfs_uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub btrfs_parent_uuid: Option<String>,
    /// host the subvolume was built on
    pub hostname: String,
    /// relative to the subvolumes directory
    pub subvolume_rel_path: PathBuf,
    #[serde(skip)]
    subvolumes_dir: PathBuf,
}

impl SubvolumeOnDisk {
    /// load and validate a descriptor file
    pub fn from_json_file(path: &Path, subvolumes_dir: &Path) -> Result<Self> {
        let file = File::open(path).with_path(path)?;
        Self::from_json_reader(BufReader::new(file), path, subvolumes_dir)
    }

    /// `origin` is only used in error messages
    pub fn from_json_reader(
        reader: impl Read,
        origin: &Path,
        subvolumes_dir: &Path,
    ) -> Result<Self> {
        let mut svod: SubvolumeOnDisk =
            serde_json::from_reader(reader).map_err(|source| Error::Json {
                path: origin.to_path_buf(),
                source,
            })?;
        svod.subvolumes_dir = subvolumes_dir.to_path_buf();
        svod.validate(origin)?;
        Ok(svod)
    }

    fn validate(&self, origin: &Path) -> Result<()> {
        let invalid = |message: &str| Error::Descriptor {
            path: origin.to_path_buf(),
            message: message.to_string(),
        };

        if self.btrfs_uuid.is_empty() {
            return Err(invalid("btrfs_uuid is empty"));
        }

        let rel = &self.subvolume_rel_path;
        if rel.as_os_str().is_empty() {
            return Err(invalid("subvolume_rel_path is empty"));
        }
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(invalid(
                "subvolume_rel_path must stay inside the subvolumes directory",
            ));
        }

        let actual = current_hostname()?;
        if self.hostname != actual {
            return Err(Error::HostnameMismatch {
                expected: self.hostname.clone(),
                actual,
            });
        }
        Ok(())
    }

    pub fn subvolumes_dir(&self) -> &Path {
        &self.subvolumes_dir
    }

    /// absolute location of the subvolume
    pub fn subvolume_path(&self) -> PathBuf {
        self.subvolumes_dir.join(&self.subvolume_rel_path)
    }
}

/// hostname of the machine we are running on
pub fn current_hostname() -> Result<String> {
    let name = nix::unistd::gethostname().map_err(|e| Error::Io {
        path: PathBuf::from("<hostname>"),
        source: std::io::Error::from(e),
    })?;
    Ok(name.to_string_lossy().into_owned())
}
