//! inode identity map
//!
//! models a directory tree as bindings between relative paths and opaque
//! inode ids, independent of any real filesystem. several paths may share one
//! id (hardlinks). ids are only meaningful against the map that minted them.

mod id_map;
mod path;

pub use id_map::{InodeId, InodeIdMap};
pub use path::{normalize, parent_of, ROOT};
