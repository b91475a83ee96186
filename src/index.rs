//! Remote package index: package name -> archive download URL.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::runtime::Runtime;

const BUILTIN_BASE_URL: &str = "https://github.com/IgorCielniak/Pryzma-packages/archive/refs/heads";

/// Packages every installation knows about; each lives on its own branch.
const BUILTIN_PACKAGES: &[&str] = &["math", "std"];

/// Static mapping of package names to zip archive URLs.
///
/// Serialized as a plain JSON object, e.g. `{"std": "https://..../std.zip"}`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct PackageIndex {
    entries: BTreeMap<String, String>,
}

impl PackageIndex {
    /// The index compiled into the binary.
    pub fn builtin() -> Self {
        BUILTIN_PACKAGES
            .iter()
            .map(|name| (name.to_string(), format!("{}/{}.zip", BUILTIN_BASE_URL, name)))
            .collect()
    }

    /// Load an index file (a JSON object of name -> URL).
    #[tracing::instrument(skip(runtime))]
    pub fn load_file<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let content = runtime.read_to_string(path)?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse package index {:?}", path))
    }

    /// Overlay `other` on top of this index; entries in `other` win.
    pub fn extend(&mut self, other: PackageIndex) {
        self.entries.extend(other.entries);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PackageIndex {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
