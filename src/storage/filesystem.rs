use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, IoResultExt, Result};
use crate::storage::{BlobToken, BlobWriter, Storage};

/// committed blobs are read-only for everyone
const BLOB_MODE: u32 = 0o444;

/// stores blobs on the local filesystem
///
/// layout: `base_dir/<tok[0:3]>/<tok[3:6]>/<tok[6:9]>/<tok[9:]>`. a write is
/// staged as a dot-file next to its final location and hardlinked into place
/// on commit, so readers never see a partial blob and a committed blob is
/// never overwritten.
#[derive(Clone, Debug)]
pub struct FilesystemStorage {
    base_dir: PathBuf,
}

impl FilesystemStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// final on-disk location of a blob
    pub fn blob_path(&self, token: &BlobToken) -> PathBuf {
        token.path_under(&self.base_dir)
    }

    /// every committed blob currently in the store
    pub fn tokens(&self) -> Result<Vec<BlobToken>> {
        if !self.base_dir.exists() {
            return Ok(vec![]);
        }

        let mut tokens = Vec::new();
        for entry in WalkDir::new(&self.base_dir).min_depth(4).max_depth(4) {
            let entry = entry.map_err(|e| Error::Io {
                path: self.base_dir.clone(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let rel = entry
                .path()
                .strip_prefix(&self.base_dir)
                .unwrap_or(entry.path());
            let joined: String = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect();
            // staging files and strays don't parse
            if let Ok(token) = BlobToken::parse(&joined) {
                tokens.push(token);
            }
        }
        tokens.sort();
        Ok(tokens)
    }

    fn writer_for(&self, token: BlobToken) -> Result<FilesystemWriter> {
        let dest = self.blob_path(&token);
        let shard_dir = dest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.base_dir.clone());

        // another process creating the same shard concurrently is fine
        fs::create_dir_all(&shard_dir).with_path(&shard_dir)?;

        // a collision means the token source is broken, never retry
        if dest.symlink_metadata().is_ok() {
            return Err(Error::TokenCollision(dest));
        }

        let staging = staging_path(&dest);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(BLOB_MODE)
            .open(&staging)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    Error::TokenCollision(staging.clone())
                } else {
                    Error::Io {
                        path: staging.clone(),
                        source: e,
                    }
                }
            })?;

        tracing::debug!(token = %token, "opened blob writer");
        Ok(FilesystemWriter {
            token,
            base_dir: self.base_dir.clone(),
            staging,
            dest,
            file: Some(file),
            committed: false,
        })
    }
}

impl Storage for FilesystemStorage {
    type Writer = FilesystemWriter;
    type Reader = FilesystemReader;

    fn open_writer(&self) -> Result<FilesystemWriter> {
        self.writer_for(BlobToken::generate())
    }

    fn open_reader(&self, token: &BlobToken) -> Result<FilesystemReader> {
        let path = self.blob_path(token);
        let file = File::open(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::BlobNotFound(token.to_string())
            } else {
                Error::Io {
                    path: path.clone(),
                    source: e,
                }
            }
        })?;
        Ok(FilesystemReader { file, path })
    }

    fn remove(&self, token: &BlobToken) -> Result<()> {
        let path = self.blob_path(token);
        fs::remove_file(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::BlobNotFound(token.to_string())
            } else {
                Error::Io {
                    path: path.clone(),
                    source: e,
                }
            }
        })?;
        tracing::debug!(token = %token, "removed blob");

        if let Some(shard_dir) = path.parent() {
            prune_empty_dirs(&self.base_dir, shard_dir);
        }
        Ok(())
    }
}

/// writer for one staged blob
///
/// dropping it without calling `commit` deletes the staged bytes and any
/// shard directories that are left empty.
#[derive(Debug)]
pub struct FilesystemWriter {
    token: BlobToken,
    base_dir: PathBuf,
    staging: PathBuf,
    dest: PathBuf,
    file: Option<File>,
    committed: bool,
}

impl FilesystemWriter {
    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("blob writer already finalized"))
    }
}

impl Write for FilesystemWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }
}

impl BlobWriter for FilesystemWriter {
    fn commit(mut self) -> Result<BlobToken> {
        if let Some(mut file) = self.file.take() {
            file.flush().with_path(&self.staging)?;
            file.sync_all().with_path(&self.staging)?;
        }

        // hard_link refuses to replace an existing blob
        fs::hard_link(&self.staging, &self.dest).map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                Error::TokenCollision(self.dest.clone())
            } else {
                Error::Io {
                    path: self.dest.clone(),
                    source: e,
                }
            }
        })?;
        self.committed = true;

        if let Err(e) = fs::remove_file(&self.staging) {
            tracing::warn!(path = %self.staging.display(), error = %e, "failed to remove staging file");
        }
        tracing::debug!(token = %self.token, "committed blob");
        Ok(self.token.clone())
    }
}

impl Drop for FilesystemWriter {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        drop(self.file.take());

        match fs::remove_file(&self.staging) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.staging.display(), error = %e, "failed to discard staged blob");
                return;
            }
        }
        tracing::debug!(token = %self.token, "discarded uncommitted blob");

        if let Some(shard_dir) = self.staging.parent() {
            prune_empty_dirs(&self.base_dir, shard_dir);
        }
    }
}

/// reader for one committed blob, closed on drop
#[derive(Debug)]
pub struct FilesystemReader {
    file: File,
    path: PathBuf,
}

impl FilesystemReader {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for FilesystemReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

fn staging_path(dest: &Path) -> PathBuf {
    let leaf = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{}.partial", leaf))
}

/// remove empty directories from `dir` up to (not including) `base_dir`
///
/// stops at the first directory that can't be removed, typically because
/// another writer just populated it.
fn prune_empty_dirs(base_dir: &Path, dir: &Path) {
    let mut current = Some(dir);
    while let Some(dir) = current {
        if dir == base_dir || !dir.starts_with(base_dir) {
            break;
        }
        if let Err(e) = fs::remove_dir(dir) {
            tracing::trace!(path = %dir.display(), error = %e, "stopped pruning");
            break;
        }
        current = dir.parent();
    }
}
