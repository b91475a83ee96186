//! On-disk layout of the package repository.
//!
//! ```text
//! <root>/
//!   <name>/
//!     metadata.json
//!     <file>...
//!   <name>.zip            (transient download)
//!   .<name>.extract/      (transient staging directory)
//! ```

use anyhow::{Result, bail};
use std::path::{Component, Path, PathBuf};

use crate::runtime::Runtime;

use super::{METADATA_FILE, PackageMetadata};

/// Filesystem view of one repository root.
pub struct PackageRepository<'a, R: Runtime> {
    runtime: &'a R,
    root: PathBuf,
}

impl<'a, R: Runtime> PackageRepository<'a, R> {
    pub fn new(runtime: &'a R, root: PathBuf) -> Self {
        Self { runtime, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_initialized(&self) -> bool {
        self.runtime.is_dir(&self.root)
    }

    /// Returns: `<root>/<name>`
    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Returns: `<root>/<name>/metadata.json`
    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.package_dir(name).join(METADATA_FILE)
    }

    /// Returns: `<root>/<name>.zip`
    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.zip", name))
    }

    /// Returns: `<root>/.<name>.extract`
    pub fn staging_dir(&self, name: &str) -> PathBuf {
        self.root.join(format!(".{}.extract", name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.runtime.exists(&self.package_dir(name))
    }

    /// Load `metadata.json` for a package, `None` if it has none.
    pub fn load(&self, name: &str) -> Result<Option<PackageMetadata>> {
        let path = self.metadata_path(name);
        if !self.runtime.exists(&path) {
            return Ok(None);
        }
        PackageMetadata::load(self.runtime, &path).map(Some)
    }

    /// Write `metadata.json`, creating the package directory if needed.
    pub fn save(&self, metadata: &PackageMetadata) -> Result<()> {
        let package_dir = self.package_dir(&metadata.name);
        if !self.runtime.exists(&package_dir) {
            self.runtime.create_dir_all(&package_dir)?;
        }
        metadata.save(self.runtime, &self.metadata_path(&metadata.name))
    }

    /// Names of the immediate subdirectories of the root, sorted. Hidden
    /// directories (leftover staging areas) are not packages.
    pub fn package_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in self.runtime.read_dir(&self.root)? {
            if !self.runtime.is_dir(&entry) {
                continue;
            }
            if let Some(name) = entry.file_name().and_then(|n| n.to_str())
                && !name.starts_with('.')
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove `<root>/<name>` recursively. Returns false if it did not exist.
    pub fn remove_package_dir(&self, name: &str) -> Result<bool> {
        let package_dir = self.package_dir(name);
        if !self.runtime.exists(&package_dir) {
            return Ok(false);
        }
        self.runtime.remove_dir_all(&package_dir)?;
        Ok(true)
    }
}

/// Reject names that would resolve outside the directory they are joined to.
pub fn ensure_relative(kind: &str, name: &str) -> Result<()> {
    let path = Path::new(name);
    if name.is_empty() {
        bail!("{} must not be empty", kind);
    }
    if !path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        bail!("{} {:?} must be a relative path inside the package", kind, name);
    }
    // "." and "./" would resolve to the directory itself.
    if !path.components().any(|c| matches!(c, Component::Normal(_))) {
        bail!("{} {:?} must name an entry, not the directory itself", kind, name);
    }
    Ok(())
}
