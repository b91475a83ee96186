//! Package management module
//!
//! Metadata documents and the repository directory layout.

mod metadata;
mod repository;

pub use metadata::{METADATA_FILE, PackageMetadata};
pub use repository::{PackageRepository, ensure_relative};
