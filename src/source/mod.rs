//! Offline data sources.
//!
//! A fetched response can be written to disk with [`save_raw`] and turned
//! back into a dataset later with [`FileSource`], without touching the API.

mod file;

pub use file::FileSource;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use cpwatch_adapters::AdapterError;

/// Errors reading or writing saved responses.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Read error: {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Write error: {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file was read but is not a usable response.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// Write a raw response as pretty JSON.
pub fn save_raw(path: impl AsRef<Path>, raw: &serde_json::Value) -> Result<(), SourceError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(raw)
        .map_err(|e| AdapterError::Payload(format!("ERROR: {}", e)))?;
    fs::write(path, json).map_err(|source| SourceError::Write {
        path: path.to_path_buf(),
        source,
    })
}
