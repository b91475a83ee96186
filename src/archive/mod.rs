mod zip;

use crate::runtime::Runtime;
use anyhow::Result;
use std::path::Path;

pub use zip::ZipExtractor;

/// What an extraction produced under the destination directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractedArchive {
    /// Top-level entry names in archive order, without duplicates.
    pub root_entries: Vec<String>,
}

impl ExtractedArchive {
    /// The archive's single top-level entry, if it has exactly one.
    ///
    /// Branch archives wrap everything in one folder (`Pryzma-packages-std/`),
    /// which is what an install wants to move into place.
    pub fn single_root(&self) -> Option<&str> {
        match self.root_entries.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }
}

/// Trait for format-specific archive extractors
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExtractor: Send + Sync {
    /// Extract every entry of the archive below `extract_to`.
    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<ExtractedArchive>;
}
