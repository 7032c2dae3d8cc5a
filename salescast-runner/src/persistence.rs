//! Durable file writes shared by the checkpoint log and forecast table.
//!
//! - Whole-file rewrites are atomic: write to `.tmp`, fsync, rename into place
//! - Log appends are one line per call, flushed and synced before returning
//! - A torn final line is closed off before the next append so it cannot
//!   swallow the following record

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl PersistenceError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn ensure_parent(path: &Path) -> Result<(), PersistenceError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))
        }
        _ => Ok(()),
    }
}

/// Replace `path` with `bytes` atomically.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    ensure_parent(path)?;
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let written = (|| -> io::Result<()> {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(PersistenceError::io(&tmp_path, e));
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        PersistenceError::io(path, e)
    })
}

/// Append one line to `path`, creating it and its directory if needed.
pub fn append_line(path: &Path, line: &str) -> Result<(), PersistenceError> {
    ensure_parent(path)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| PersistenceError::io(path, e))?;

    writeln!(file, "{line}").map_err(|e| PersistenceError::io(path, e))?;
    file.flush().map_err(|e| PersistenceError::io(path, e))?;
    file.sync_data().map_err(|e| PersistenceError::io(path, e))
}

/// Terminate an unterminated last line of `path` with `\n`.
///
/// Returns `true` when a newline had to be written. Missing and empty files
/// are left alone.
pub fn close_partial_line(path: &Path) -> Result<bool, PersistenceError> {
    let mut file = match OpenOptions::new().read(true).append(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(PersistenceError::io(path, e)),
    };
    let len = file
        .metadata()
        .map_err(|e| PersistenceError::io(path, e))?
        .len();
    if len == 0 {
        return Ok(false);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))
        .and_then(|_| file.read_exact(&mut last))
        .map_err(|e| PersistenceError::io(path, e))?;
    if last[0] == b'\n' {
        return Ok(false);
    }

    file.write_all(b"\n")
        .and_then(|_| file.sync_data())
        .map_err(|e| PersistenceError::io(path, e))?;
    Ok(true)
}
