//! A module for bucket engines.
//!
//! An engine owns the bucket namespace. [`FsBucketStore`] keeps one file
//! per bucket under a single directory; the file length is the bucket's
//! capacity until the first upload, and its content size afterwards.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::{BucketError, LoftError, Result};
use crate::identifier::BucketId;
use crate::protocol::error_code;

/// Attempts at finding an unused identifier before giving up.
const MAX_GENERATE_ATTEMPTS: usize = 16;

const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// A trait for bucket store engines.
pub trait BucketEngine: Clone + Send + 'static {
    /// Stream over a bucket's content.
    type Content: Read;

    /// Reserve a zero-filled bucket of `capacity` bytes.
    fn generate(&self, capacity: i64) -> std::result::Result<BucketId, BucketError>;

    /// Decide whether `size` bytes may be uploaded into `id`.
    fn check_put(&self, id: &BucketId, size: i64) -> std::result::Result<(), BucketError>;

    /// Replace the content of `id` with exactly `size` bytes from `source`.
    ///
    /// On failure the partially written bucket is removed.
    fn write<R: Read>(
        &self,
        id: &BucketId,
        size: i64,
        source: &mut R,
    ) -> std::result::Result<u64, BucketError>;

    /// Current size of `id` and a stream over its content.
    fn get(&self, id: &BucketId) -> std::result::Result<(i64, Self::Content), BucketError>;

    /// Upload into `id`, reporting the accept/reject decision through
    /// `respond` before any byte is read from `source`.
    ///
    /// Returns the error code that was sent. A rejected upload leaves the
    /// bucket untouched; a transfer that fails after acceptance is an `Err`.
    fn put<R, F>(&self, id: &BucketId, size: i64, source: &mut R, respond: F) -> Result<i32>
    where
        R: Read,
        F: FnOnce(i32) -> Result<()>,
    {
        if let Err(e) = self.check_put(id, size) {
            warn!("rejecting upload of {size} bytes into {id}: {e}");
            let code = e.error_code();
            respond(code)?;
            return Ok(code);
        }
        respond(error_code::SUCCESS)?;
        let written = self.write(id, size, source)?;
        debug!("stored {written} bytes in {id}");
        Ok(error_code::SUCCESS)
    }
}

/// Filesystem bucket engine.
#[derive(Clone, Debug)]
pub struct FsBucketStore {
    bucket_dir: PathBuf,
}

impl FsBucketStore {
    /// Create a new engine over an existing directory.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        match fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => Ok(Self { bucket_dir: path }),
            Ok(_) => Err(LoftError::InvalidBucketPath(path)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(LoftError::InvalidBucketPath(path)),
            Err(e) => Err(e.into()),
        }
    }

    /// Directory holding the bucket files.
    pub fn bucket_dir(&self) -> &Path {
        &self.bucket_dir
    }

    /// File backing `id`, or `NotFound` for identifiers that are not safe file names.
    fn bucket_path(&self, id: &BucketId) -> std::result::Result<PathBuf, BucketError> {
        if !id.is_valid() {
            return Err(BucketError::NotFound(*id));
        }
        Ok(self.bucket_dir.join(id.as_str()))
    }

    fn capacity(&self, id: &BucketId) -> std::result::Result<(PathBuf, i64), BucketError> {
        let path = self.bucket_path(id)?;
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok((path, meta.len() as i64)),
            Ok(_) => Err(BucketError::NotFound(*id)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BucketError::NotFound(*id)),
            Err(e) => Err(BucketError::Storage(e)),
        }
    }
}

impl BucketEngine for FsBucketStore {
    type Content = File;

    fn generate(&self, capacity: i64) -> std::result::Result<BucketId, BucketError> {
        let mut last_err = None;
        for _ in 0..MAX_GENERATE_ATTEMPTS {
            let id = BucketId::generate();
            let path = self.bucket_dir.join(id.as_str());
            let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!("identifier {id} already taken, drawing again");
                    last_err = Some(e);
                    continue;
                }
                Err(e) => return Err(BucketError::CreateFailed(e)),
            };
            let sized = u64::try_from(capacity)
                .map_err(|_| BucketError::InvalidSize(capacity))
                .and_then(|len| file.set_len(len).map_err(BucketError::AllocateFailed));
            if let Err(e) = sized {
                drop(file);
                if let Err(rm) = fs::remove_file(&path) {
                    warn!("cannot remove unsized bucket {}: {rm}", path.display());
                }
                return Err(e);
            }
            debug!("generated bucket {id} with capacity {capacity}");
            return Ok(id);
        }
        Err(BucketError::CreateFailed(last_err.unwrap_or_else(|| {
            io::Error::new(ErrorKind::AlreadyExists, "no free bucket identifier")
        })))
    }

    fn check_put(&self, id: &BucketId, size: i64) -> std::result::Result<(), BucketError> {
        let (_, capacity) = self.capacity(id)?;
        if size < 0 {
            return Err(BucketError::InvalidSize(size));
        }
        if size > capacity {
            return Err(BucketError::CapacityExceeded {
                requested: size,
                capacity,
            });
        }
        Ok(())
    }

    fn write<R: Read>(
        &self,
        id: &BucketId,
        size: i64,
        source: &mut R,
    ) -> std::result::Result<u64, BucketError> {
        let path = self.bucket_path(id)?;
        let expected = u64::try_from(size).map_err(|_| BucketError::InvalidSize(size))?;
        let file = File::create(&path).map_err(BucketError::Storage)?;
        match copy_exact(source, file, expected) {
            Ok(()) => Ok(expected),
            Err(e) => {
                if let Err(rm) = fs::remove_file(&path) {
                    warn!("cannot remove partial bucket {}: {rm}", path.display());
                }
                Err(BucketError::TransferFailed(e))
            }
        }
    }

    fn get(&self, id: &BucketId) -> std::result::Result<(i64, File), BucketError> {
        let (path, size) = self.capacity(id)?;
        let file = File::open(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => BucketError::NotFound(*id),
            _ => BucketError::Storage(e),
        })?;
        Ok((size, file))
    }
}

/// Copy exactly `len` bytes from `source` into `file`, then sync it.
fn copy_exact<R: Read>(source: &mut R, mut file: File, len: u64) -> io::Result<()> {
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut remaining = len;
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = match source.read(&mut buf[..want]) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("source ended with {remaining} of {len} bytes outstanding"),
                ));
            }
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        file.write_all(&buf[..n])?;
        remaining -= n as u64;
    }
    file.sync_data()
}
