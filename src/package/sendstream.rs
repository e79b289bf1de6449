use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

use crate::config::BtrfsConfig;
use crate::error::{Error, Result};
use crate::package::{ensure_absent, Format};
use crate::subvol::{Subvol, SubvolumeOnDisk};

/// packages the subvolume as a stand-alone (non-incremental) send-stream
#[derive(Clone, Debug)]
pub struct Sendstream {
    btrfs: BtrfsConfig,
}

impl Sendstream {
    pub fn new(btrfs: BtrfsConfig) -> Self {
        Self { btrfs }
    }
}

impl Format for Sendstream {
    fn name(&self) -> &'static str {
        "sendstream"
    }

    fn description(&self) -> &'static str {
        "a full btrfs send-stream of the subvolume, as a single file"
    }

    fn package_full(&self, svod: &SubvolumeOnDisk, output_path: &Path) -> Result<()> {
        ensure_absent(output_path)?;
        let subvol = Subvol::existing(svod.subvolume_path(), self.btrfs.clone())?;

        let outfile = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(output_path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    Error::OutputExists(output_path.to_path_buf())
                } else {
                    Error::Io {
                        path: output_path.to_path_buf(),
                        source: e,
                    }
                }
            })?;

        if let Err(e) = subvol.mark_readonly_and_write_sendstream_to_file(outfile) {
            // leave nothing behind that could pass for a package
            if let Err(rm) = fs::remove_file(output_path) {
                tracing::warn!(path = %output_path.display(), error = %rm, "failed to remove partial output");
            }
            return Err(e);
        }
        Ok(())
    }
}
