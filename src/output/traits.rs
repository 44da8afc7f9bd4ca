//! Record store trait and the JSON file implementation
//!
//! The result sink only talks to a `RecordStore`, so the persistence target
//! can be swapped (tests use an in-memory or deliberately failing store).

use crate::output::PageRecord;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to format output: {0}")]
    Format(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Existing output at {path} is not a valid record array: {message}")]
    Corrupt { path: String, message: String },
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Persistence target for page records
///
/// `write_all` always receives the complete record set. Implementations must
/// make the replacement atomic: after a failed write the previously stored
/// records must still be readable.
pub trait RecordStore: Send {
    /// Loads previously persisted records; an absent target yields an empty list
    fn load(&self) -> OutputResult<Vec<PageRecord>>;

    /// Replaces the stored records with `records`
    fn write_all(&mut self, records: &[PageRecord]) -> OutputResult<()>;

    /// Human-readable location used in log lines and errors
    fn location(&self) -> String;
}

/// Stores records as a pretty-printed JSON array in a single file
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so readers only ever see a complete array.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl RecordStore for JsonFileStore {
    fn load(&self) -> OutputResult<Vec<PageRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&contents).map_err(|e| OutputError::Corrupt {
            path: self.location(),
            message: e.to_string(),
        })
    }

    fn write_all(&mut self, records: &[PageRecord]) -> OutputResult<()> {
        let dir = self.parent_dir();
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, records)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;

        tmp.persist(&self.path)
            .map_err(|e| OutputError::Write(format!("rename failed: {}", e.error)))?;

        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
