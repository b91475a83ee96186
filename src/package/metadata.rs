use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::runtime::Runtime;

/// File name of the metadata document inside a package directory.
pub const METADATA_FILE: &str = "metadata.json";

/// Contents of `<root>/<name>/metadata.json` for locally added packages.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct PackageMetadata {
    pub name: String,
    pub version: String,
    pub files: Vec<String>,
}

impl PackageMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>, files: Vec<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            files,
        }
    }

    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let content = runtime.read_to_string(path)?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse package metadata {:?}", path))
    }

    #[tracing::instrument(skip(self, runtime))]
    pub fn save<R: Runtime>(&self, runtime: &R, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        runtime
            .write(path, content.as_bytes())
            .with_context(|| format!("Failed to save metadata to {:?}", path))
    }
}
