//! The file I/O boundary.
//!
//! The engine never touches disk; this module does, and it is where the
//! all-or-nothing guarantee is enforced: a pipeline's output is only ever
//! committed in full, atomically, and only if the file still matches the
//! content the pipeline read.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// File content captured at read time, with a fingerprint for detecting
/// out-of-band modification before commit.
#[derive(Debug, Clone)]
pub struct Source {
    pub text: String,
    pub fingerprint: u64,
}

#[derive(Error, Debug)]
pub enum FsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("refusing to write {path}: file changed on disk since it was read")]
    ModifiedSinceRead { path: PathBuf },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Read a patch target, fingerprinting its content.
pub fn read_source(path: &Path) -> Result<Source, FsError> {
    let text = fs::read_to_string(path).map_err(|source| FsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let fingerprint = xxh3_64(text.as_bytes());
    Ok(Source { text, fingerprint })
}

/// Atomically replace `path` with `new_text`, but only if its current
/// content still hashes to `expected_fingerprint`.
///
/// The write goes through a tempfile in the same directory, is fsynced,
/// then renamed over the target, so a crash leaves either the old file or
/// the new one, never a torn mix.
pub fn commit(path: &Path, expected_fingerprint: u64, new_text: &str) -> Result<(), FsError> {
    let current = fs::read(path).map_err(|source| FsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if xxh3_64(&current) != expected_fingerprint {
        return Err(FsError::ModifiedSinceRead {
            path: path.to_path_buf(),
        });
    }

    let parent = path.parent().ok_or_else(|| FsError::Write {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent"),
    })?;

    let io_err = |source: std::io::Error| FsError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
    temp.write_all(new_text.as_bytes()).map_err(io_err)?;
    temp.as_file().sync_all().map_err(io_err)?;
    temp.persist(path).map_err(|e| io_err(e.error))?;

    Ok(())
}
