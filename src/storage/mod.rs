//! blob store
//!
//! keyed by random tokens rather than content hashes. a write is staged until
//! it is committed; dropping a writer without committing discards it and no
//! token is ever handed out.

mod filesystem;
mod token;

use std::io::{Read, Write};

pub use filesystem::{FilesystemReader, FilesystemStorage, FilesystemWriter};
pub use token::BlobToken;

use crate::error::{IoResultExt, Result};

/// an in-progress blob write
pub trait BlobWriter: Write {
    /// make the written bytes visible to readers and hand out their token
    fn commit(self) -> Result<BlobToken>;
}

/// "token -> large binary object" store
pub trait Storage {
    type Writer: BlobWriter;
    type Reader: Read;

    /// start a new blob; it stays invisible until `BlobWriter::commit`
    fn open_writer(&self) -> Result<Self::Writer>;

    /// open a committed blob
    fn open_reader(&self, token: &BlobToken) -> Result<Self::Reader>;

    /// delete a committed blob
    fn remove(&self, token: &BlobToken) -> Result<()>;

    /// store `content` as a new blob
    fn write_blob(&self, content: &[u8]) -> Result<BlobToken> {
        let mut writer = self.open_writer()?;
        writer.write_all(content).with_path("<blob writer>")?;
        writer.commit()
    }

    /// read a whole blob into memory
    fn read_blob(&self, token: &BlobToken) -> Result<Vec<u8>> {
        let mut reader = self.open_reader(token)?;
        let mut content = Vec::new();
        reader
            .read_to_end(&mut content)
            .with_path(format!("<blob {}>", token))?;
        Ok(content)
    }
}
