use anyhow::{Context, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::index::PackageIndex;
use crate::runtime::Runtime;

/// Prefix of the top-level folder inside branch archives
/// (`Pryzma-packages-<branch>/`).
pub const DEFAULT_ARCHIVE_PREFIX: &str = "Pryzma-packages-";

/// Everything the repository manager needs to know about its environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Repository root holding one directory per package
    pub root: PathBuf,
    /// Remote package index
    pub index: PackageIndex,
    /// Folder prefix stripped by the prefix normalization pass
    pub archive_prefix: String,
}

impl Config {
    pub fn new(root: impl Into<PathBuf>, index: PackageIndex) -> Self {
        Self {
            root: root.into(),
            index,
            archive_prefix: DEFAULT_ARCHIVE_PREFIX.to_string(),
        }
    }

    /// Build the configuration from CLI/environment overrides.
    ///
    /// `index_file` entries are layered on top of the built-in index.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(
        runtime: &R,
        root: Option<PathBuf>,
        index_file: Option<&Path>,
    ) -> Result<Self> {
        let root = match root {
            Some(path) => path,
            None => default_root(runtime)?,
        };
        debug!("Using repository root: {}", root.display());

        let mut index = PackageIndex::builtin();
        if let Some(path) = index_file {
            info!("Loading package index from {}", path.display());
            index.extend(PackageIndex::load_file(runtime, path)?);
        }

        Ok(Self::new(root, index))
    }
}

/// Default repository root: a system directory when privileged, otherwise
/// `~/.ppm`.
#[tracing::instrument(skip(runtime))]
pub fn default_root<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    if runtime.is_privileged() {
        Ok(system_root())
    } else {
        let home_dir = runtime
            .home_dir()
            .context("Could not find home directory")?;
        Ok(home_dir.join(".ppm"))
    }
}

#[cfg(target_os = "macos")]
fn system_root() -> PathBuf {
    PathBuf::from("/opt/ppm")
}

#[cfg(target_os = "windows")]
fn system_root() -> PathBuf {
    PathBuf::from(r"C:\ProgramData\ppm")
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn system_root() -> PathBuf {
    PathBuf::from("/usr/local/ppm")
}
