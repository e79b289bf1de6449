//! built subvolumes: the JSON descriptor and the external btrfs tool

mod btrfs;
mod on_disk;

pub use btrfs::Subvol;
pub use on_disk::{current_hostname, SubvolumeOnDisk};

#[cfg(test)]
pub(crate) use btrfs::testing;
