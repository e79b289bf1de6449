use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// random handle for one committed blob
///
/// 32 lowercase hex digits (a v4 uuid without dashes).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobToken(String);

impl BlobToken {
    pub const LEN: usize = 32;

    /// draw a fresh random token
    pub(crate) fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// parse a token, rejecting anything that could escape the shard layout
    pub fn parse(s: &str) -> Result<Self> {
        let valid = s.len() == Self::LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(Error::InvalidToken(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// split into the four path segments of the on-disk layout
    ///
    /// three levels of 3 hex digits cap every directory at 4096 subdirs;
    /// you'd need about 300 trillion blobs before the leaf directories
    /// average 4096 entries each.
    pub fn to_path_components(&self) -> [&str; 4] {
        let s = self.0.as_str();
        [&s[..3], &s[3..6], &s[6..9], &s[9..]]
    }

    /// location of this blob under `base_dir`
    pub fn path_under(&self, base_dir: &Path) -> PathBuf {
        let [a, b, c, leaf] = self.to_path_components();
        base_dir.join(a).join(b).join(c).join(leaf)
    }
}

impl fmt::Display for BlobToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for BlobToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobToken({})", &self.0[..12])
    }
}

impl FromStr for BlobToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for BlobToken {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for BlobToken {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
