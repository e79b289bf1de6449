use std::path::PathBuf;

use crate::error::Result;
use crate::package::{ensure_absent, FormatRegistry};
use crate::subvol::SubvolumeOnDisk;

/// everything one packaging run needs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageDescriptor {
    /// directory on a btrfs volume holding all the subvolume wrapper dirs
    pub subvolumes_dir: PathBuf,
    /// the layer's `SubvolumeOnDisk` JSON
    pub subvolume_json: PathBuf,
    /// registry name of the format to emit
    pub format: String,
    /// where the package goes; must not exist
    pub output_path: PathBuf,
}

/// serialize one subvolume into a full package
///
/// the format name and the output path are checked before anything is read
/// or written. only full packages are produced: an incremental package is
/// only safe against a base whose content hash is attested, which this tool
/// does not track.
pub fn package_image(registry: &FormatRegistry, descriptor: &PackageDescriptor) -> Result<()> {
    let format = registry.get(&descriptor.format)?;
    ensure_absent(&descriptor.output_path)?;

    let svod =
        SubvolumeOnDisk::from_json_file(&descriptor.subvolume_json, &descriptor.subvolumes_dir)?;

    tracing::info!(
        format = format.name(),
        subvolume = %svod.subvolume_path().display(),
        output = %descriptor.output_path.display(),
        "packaging subvolume"
    );
    format.package_full(&svod, &descriptor.output_path)?;
    tracing::info!(output = %descriptor.output_path.display(), "package written");
    Ok(())
}
