//! serialize a built subvolume into a portable package
//!
//! formats are looked up by name in a table built once at startup. every
//! format produces a full, self-contained package.

mod builder;
mod format;
mod sendstream;

use std::path::Path;

pub use builder::{package_image, PackageDescriptor};
pub use format::{Format, FormatRegistry};
pub use sendstream::Sendstream;

use crate::error::{Error, Result};

/// fail unless nothing (not even a dangling symlink) exists at `path`
pub fn ensure_absent(path: &Path) -> Result<()> {
    if path.symlink_metadata().is_ok() {
        return Err(Error::OutputExists(path.to_path_buf()));
    }
    Ok(())
}
