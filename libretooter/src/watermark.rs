//! Persisted `since_id` watermark
//!
//! The watermark is the highest status ID already processed. It is stored as a
//! decimal string in a single file and rewritten every time it moves forward.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, WatermarkError};
use crate::types::StatusId;

/// Default file name, relative to the working directory
pub const SINCE_ID_FILE: &str = "since_id";

#[derive(Debug)]
pub struct Watermark {
    path: PathBuf,
    current: Option<StatusId>,
}

impl Watermark {
    /// Read the watermark from `path`
    ///
    /// A missing file or content that is not an integer yields an unset
    /// watermark. Other IO failures are errors.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let current = match fs::read_to_string(&path) {
            Ok(content) => match content.trim().parse::<StatusId>() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(path = %path.display(), "Ignoring non-numeric since_id file");
                    None
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(source) => {
                return Err(WatermarkError::Read {
                    path: path.display().to_string(),
                    source,
                }
                .into())
            }
        };

        debug!(since_id = ?current, "SINCE_ID read from cache");
        Ok(Self { path, current })
    }

    pub fn current(&self) -> Option<StatusId> {
        self.current
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the watermark up to `id` and write it out
    ///
    /// IDs at or below the current value leave the watermark untouched. Returns
    /// whether the watermark moved.
    pub fn advance(&mut self, id: StatusId) -> Result<bool> {
        if self.current.is_some_and(|current| id <= current) {
            return Ok(false);
        }

        self.current = Some(id);
        self.persist()?;
        Ok(true)
    }

    /// Write the current value to disk; an unset watermark writes nothing
    pub fn persist(&self) -> Result<()> {
        let Some(id) = self.current else {
            return Ok(());
        };

        fs::write(&self.path, id.to_string()).map_err(|source| WatermarkError::Write {
            path: self.path.display().to_string(),
            source,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_unset() {
        let dir = TempDir::new().unwrap();
        let watermark = Watermark::load(dir.path().join(SINCE_ID_FILE)).unwrap();
        assert_eq!(watermark.current(), None);
    }

    #[test]
    fn test_garbage_file_is_unset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SINCE_ID_FILE);
        fs::write(&path, "not-a-number").unwrap();

        let watermark = Watermark::load(&path).unwrap();
        assert_eq!(watermark.current(), None);
    }

    #[test]
    fn test_reads_existing_value_with_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SINCE_ID_FILE);
        fs::write(&path, "109876543210\n").unwrap();

        let watermark = Watermark::load(&path).unwrap();
        assert_eq!(watermark.current(), Some(109876543210));
    }

    #[test]
    fn test_advance_writes_through() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SINCE_ID_FILE);
        let mut watermark = Watermark::load(&path).unwrap();

        assert!(watermark.advance(100).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "100");

        assert!(watermark.advance(250).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "250");
    }

    #[test]
    fn test_advance_never_decreases() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SINCE_ID_FILE);
        let mut watermark = Watermark::load(&path).unwrap();

        watermark.advance(300).unwrap();
        assert!(!watermark.advance(200).unwrap());
        assert!(!watermark.advance(300).unwrap());
        assert_eq!(watermark.current(), Some(300));
        assert_eq!(fs::read_to_string(&path).unwrap(), "300");
    }

    #[test]
    fn test_persist_unset_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SINCE_ID_FILE);
        Watermark::load(&path).unwrap().persist().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_write_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing-dir").join(SINCE_ID_FILE);
        let mut watermark = Watermark::load(&path).unwrap();

        let result = watermark.advance(1);
        assert!(matches!(
            result,
            Err(crate::error::RetooterError::Watermark(WatermarkError::Write { .. }))
        ));
    }
}
