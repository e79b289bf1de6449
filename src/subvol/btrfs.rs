use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::BtrfsConfig;
use crate::error::{Error, IoResultExt, Result};

/// an existing btrfs subvolume, driven through the `btrfs` tool
#[derive(Clone, Debug)]
pub struct Subvol {
    path: PathBuf,
    btrfs: BtrfsConfig,
}

impl Subvol {
    /// wrap a subvolume that must already exist
    pub fn existing(path: impl Into<PathBuf>, btrfs: BtrfsConfig) -> Result<Self> {
        let path = path.into();
        let meta = fs::metadata(&path).with_path(&path)?;
        if !meta.is_dir() {
            return Err(Error::Descriptor {
                message: "subvolume is not a directory".to_string(),
                path,
            });
        }
        Ok(Self { path, btrfs })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn btrfs(&self) -> Command {
        if self.btrfs.sudo {
            let mut cmd = Command::new("sudo");
            cmd.arg(&self.btrfs.program);
            cmd
        } else {
            Command::new(&self.btrfs.program)
        }
    }

    /// `btrfs property set -ts <path> ro true`
    pub fn set_readonly(&self) -> Result<()> {
        let mut cmd = self.btrfs();
        cmd.args(["property", "set", "-ts"])
            .arg(&self.path)
            .args(["ro", "true"]);
        run(cmd)
    }

    /// stream `btrfs send <path>` into `out`
    pub fn write_sendstream_to_file(&self, out: File) -> Result<()> {
        let mut cmd = self.btrfs();
        cmd.arg("send").arg(&self.path).stdout(Stdio::from(out));
        run(cmd)
    }

    /// `btrfs send` only accepts read-only subvolumes
    pub fn mark_readonly_and_write_sendstream_to_file(&self, out: File) -> Result<()> {
        self.set_readonly()?;
        self.write_sendstream_to_file(out)
    }
}

fn run(mut cmd: Command) -> Result<()> {
    let rendered = format!("{:?}", cmd);
    tracing::debug!(command = %rendered, "running");

    let program = PathBuf::from(cmd.get_program());
    let status = cmd.stdin(Stdio::null()).status().with_path(program)?;
    if !status.success() {
        return Err(Error::Command {
            command: rendered,
            status: status.to_string(),
        });
    }
    Ok(())
}
