//! File-based data source.
//!
//! Replays a response saved by a previous fetch.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use cpwatch_adapters::catchpoint::parse_payload;
use cpwatch_adapters::extract::{extract, ExtractOptions};
use cpwatch_adapters::{Provenance, TestDataset};

use super::SourceError;

/// A saved explorer response on disk.
///
/// The file holds the JSON body exactly as the API returned it. Request
/// parameters are not part of the body, so replayed datasets carry empty
/// provenance.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    description: String,
}

impl FileSource {
    /// Create a new file source for the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let description = format!("file: {}", path.display());
        Self { path, description }
    }

    /// Returns the path being replayed.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Human-readable description of the source.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Read the file and extract it with `options`.
    pub fn load(&self, options: &ExtractOptions) -> Result<TestDataset, SourceError> {
        let content = fs::read_to_string(&self.path).map_err(|source| SourceError::Read {
            path: self.path.clone(),
            source,
        })?;
        debug!(source = %self.description, bytes = content.len(), "replaying response");

        let payload = parse_payload(&content)?;
        Ok(extract(payload, options, Provenance::default())?)
    }
}
