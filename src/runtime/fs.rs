//! File system operations (read, write, directory, permissions).

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::RealRuntime;

impl RealRuntime {
    #[tracing::instrument(skip(self, contents))]
    pub(crate) fn write_impl(&self, path: &Path, contents: &[u8]) -> Result<()> {
        fs::write(path, contents).with_context(|| format!("Failed to write to {:?}", path))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn read_to_string_impl(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn rename_impl(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).with_context(|| format!("Failed to rename {:?} to {:?}", from, to))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn create_dir_all_impl(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory {:?}", path))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn remove_file_impl(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).with_context(|| format!("Failed to remove file {:?}", path))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn exists_impl(&self, path: &Path) -> bool {
        path.exists()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn read_dir_impl(&self, path: &Path) -> Result<Vec<PathBuf>> {
        fs::read_dir(path)
            .with_context(|| format!("Failed to read directory {:?}", path))?
            .map(|entry| Ok(entry?.path()))
            .collect()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn create_file_impl(&self, path: &Path) -> Result<Box<dyn std::io::Write + Send>> {
        let file = fs::File::create(path)
            .with_context(|| format!("Failed to create file {:?}", path))?;
        Ok(Box::new(file))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn open_impl(&self, path: &Path) -> Result<Box<dyn std::io::Read + Send>> {
        let file = fs::File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        Ok(Box::new(file))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn remove_dir_all_impl(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove directory {:?} and its contents", path))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn is_dir_impl(&self, path: &Path) -> bool {
        path.is_dir()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn set_permissions_impl(&self, path: &Path, mode: u32) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = fs::Permissions::from_mode(mode);
            fs::set_permissions(path, permissions).context("Failed to set permissions")?;
        }
        #[cfg(not(unix))]
        {
            let _ = (path, mode);
        }
        Ok(())
    }
}
