use crate::runtime::Runtime;
use anyhow::{Context, Result, bail};
use log::{debug, info};
use std::io::Read;
use std::path::{Component, Path};
use zip::ZipArchive;

use super::{ArchiveExtractor, ExtractedArchive};

/// Extractor for .zip archives
pub struct ZipExtractor;

impl ArchiveExtractor for ZipExtractor {
    #[tracing::instrument(skip(self, runtime))]
    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<ExtractedArchive> {
        debug!("Extracting zip archive to {:?}...", extract_to);
        let mut reader = runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;

        // ZipArchive needs Read + Seek; the runtime only hands out Read.
        let mut buffer = Vec::new();
        reader
            .read_to_end(&mut buffer)
            .with_context(|| format!("Failed to read archive {:?}", archive_path))?;

        let mut archive = ZipArchive::new(std::io::Cursor::new(buffer))
            .with_context(|| format!("Failed to parse ZIP archive {:?}", archive_path))?;

        if archive.is_empty() {
            bail!("Archive {:?} appears to be empty.", archive_path);
        }

        runtime.create_dir_all(extract_to)?;

        let mut extracted = ExtractedArchive::default();

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .with_context(|| format!("Failed to read ZIP entry {}", i))?;

            let entry_path = match entry.enclosed_name() {
                Some(path) => path.to_path_buf(),
                None => {
                    debug!("Skipping entry with unsafe path {:?}", entry.name());
                    continue;
                }
            };

            if let Some(Component::Normal(first)) = entry_path.components().next() {
                let first = first.to_string_lossy().into_owned();
                if !extracted.root_entries.contains(&first) {
                    extracted.root_entries.push(first);
                }
            }

            let full_path = extract_to.join(&entry_path);

            if entry.is_dir() {
                runtime.create_dir_all(&full_path)?;
                continue;
            }

            if let Some(parent) = full_path.parent() {
                runtime.create_dir_all(parent)?;
            }
            let mut dest_file = runtime.create_file(&full_path)?;
            std::io::copy(&mut entry, &mut dest_file)
                .with_context(|| format!("Failed to extract file {:?}", full_path))?;

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode()
                && let Err(e) = runtime.set_permissions(&full_path, mode)
            {
                debug!("Failed to set permissions on {:?}: {}", full_path, e);
            }
        }

        info!(
            "Extracted {} entries from {:?}",
            archive.len(),
            archive_path.file_name().unwrap_or_default()
        );
        Ok(extracted)
    }
}
