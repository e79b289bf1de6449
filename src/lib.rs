//! subvol-pack - package built btrfs subvolumes
//!
//! serializes a subvolume produced by an image build into a portable artifact,
//! and provides the two structures the image tooling is built on.
//!
//! # Core concepts
//!
//! - **InodeIdMap**: relative paths bound to opaque inode ids, modelling a
//!   directory tree (hardlinks included) without touching a real filesystem
//! - **Storage**: blobs keyed by random tokens, written through a staged
//!   writer that either commits or leaves no trace
//! - **Format**: a named packaging strategy; `package_image` picks one from a
//!   `FormatRegistry` and writes one full package
//!
//! # Blob layout
//!
//! `base_dir/<tok[0:3]>/<tok[3:6]>/<tok[6:9]>/<tok[9:]>`
//!
//! # Example usage
//!
//! ```no_run
//! use std::io::Write;
//! use subvol_pack::{BlobWriter, FilesystemStorage, InodeIdMap, Storage};
//!
//! let mut map = InodeIdMap::new();
//! let etc = map.next_at("etc").unwrap();
//! map.next_at("etc/hosts").unwrap();
//! assert_eq!(map.get_id("etc"), Some(etc));
//!
//! let store = FilesystemStorage::new("/var/lib/blobs");
//! let mut writer = store.open_writer().unwrap();
//! writer.write_all(b"hello").unwrap();
//! let token = writer.commit().unwrap();
//! assert_eq!(store.read_blob(&token).unwrap(), b"hello");
//! ```

mod config;
mod error;

pub mod inode;
pub mod package;
pub mod storage;
pub mod subvol;

pub use config::{BtrfsConfig, Config, LogConfig};
pub use error::{Error, IoResultExt, Result};
pub use inode::{InodeId, InodeIdMap};
pub use package::{package_image, Format, FormatRegistry, PackageDescriptor, Sendstream};
pub use storage::{BlobToken, BlobWriter, FilesystemStorage, Storage};
pub use subvol::{Subvol, SubvolumeOnDisk};
