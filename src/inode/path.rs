use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// the path every map binds at construction
pub const ROOT: &str = ".";

/// lexically normalize a relative path
///
/// `a/./b` becomes `a/b`, `a/../b` becomes `b`, and an empty path becomes `.`.
/// leading `..` components are kept. symlinks are never consulted.
pub fn normalize(path: &Path) -> Result<PathBuf> {
    let mut parts: Vec<&OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(last) if *last != OsStr::new("..") => {
                    parts.pop();
                }
                _ => parts.push(OsStr::new("..")),
            },
            Component::Normal(name) => parts.push(name),
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::AbsolutePath(path.to_path_buf()))
            }
        }
    }

    if parts.is_empty() {
        Ok(PathBuf::from(ROOT))
    } else {
        Ok(parts.into_iter().collect())
    }
}

/// parent of an already-normalized path, `None` for the root
///
/// single-component paths hang off `.`.
pub fn parent_of(path: &Path) -> Option<PathBuf> {
    if path == Path::new(ROOT) {
        return None;
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Some(parent.to_path_buf()),
        _ => Some(PathBuf::from(ROOT)),
    }
}
