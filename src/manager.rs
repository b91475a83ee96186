//! Repository manager: every package lifecycle operation against one root.

use anyhow::{Result, bail};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive::ArchiveExtractor;
use crate::cleanup::{self, SharedCleanupContext};
use crate::config::Config;
use crate::download::Downloader;
use crate::package::{PackageMetadata, PackageRepository, ensure_relative};
use crate::runtime::Runtime;

/// Result of [`RepositoryManager::initialize_repository`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Created,
    AlreadyExists,
}

/// Result of [`RepositoryManager::remove_package`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
}

/// Result of installing one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Archive downloaded and unpacked; `path` is where its contents landed.
    Installed { name: String, path: PathBuf },
    /// The name is not in the remote index; nothing was touched.
    NotFound { name: String },
}

impl InstallOutcome {
    pub fn name(&self) -> &str {
        match self {
            InstallOutcome::Installed { name, .. } | InstallOutcome::NotFound { name } => name,
        }
    }
}

pub struct RepositoryManager<R, D, E>
where
    R: Runtime + 'static,
    D: Downloader,
    E: ArchiveExtractor,
{
    runtime: Arc<R>,
    downloader: D,
    extractor: E,
    config: Config,
    cleanup_ctx: SharedCleanupContext,
}

impl<R, D, E> RepositoryManager<R, D, E>
where
    R: Runtime + 'static,
    D: Downloader,
    E: ArchiveExtractor,
{
    pub fn new(runtime: Arc<R>, downloader: D, extractor: E, config: Config) -> Self {
        Self {
            runtime,
            downloader,
            extractor,
            config,
            cleanup_ctx: cleanup::new_shared(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Paths to remove if the process is interrupted mid-install.
    pub fn cleanup_context(&self) -> SharedCleanupContext {
        Arc::clone(&self.cleanup_ctx)
    }

    fn repository(&self) -> PackageRepository<'_, R> {
        PackageRepository::new(self.runtime.as_ref(), self.config.root.clone())
    }

    fn ensure_initialized(&self, repo: &PackageRepository<'_, R>) -> Result<()> {
        if !repo.is_initialized() {
            bail!(
                "Repository not initialized at {}. Run `ppm init` first.",
                repo.root().display()
            );
        }
        Ok(())
    }

    /// Create the repository root if it does not exist yet.
    #[tracing::instrument(skip(self))]
    pub fn initialize_repository(&self) -> Result<InitOutcome> {
        if self.runtime.exists(self.root()) {
            debug!("Repository already present at {:?}", self.root());
            return Ok(InitOutcome::AlreadyExists);
        }
        self.runtime.create_dir_all(self.root())?;
        Ok(InitOutcome::Created)
    }

    /// Create (or overwrite) a local package skeleton: `metadata.json` plus
    /// one empty file per entry in `files`.
    #[tracing::instrument(skip(self))]
    pub fn add_package(&self, name: &str, version: &str, files: &[String]) -> Result<PathBuf> {
        ensure_relative("Package name", name)?;
        for file in files {
            ensure_relative("File name", file)?;
        }

        let repo = self.repository();
        let package_dir = repo.package_dir(name);
        if !self.runtime.exists(&package_dir) {
            self.runtime.create_dir_all(&package_dir)?;
        }

        for file in files {
            let path = package_dir.join(file);
            if let Some(parent) = path.parent()
                && !self.runtime.exists(parent)
            {
                self.runtime.create_dir_all(parent)?;
            }
            self.runtime.write(&path, b"")?;
        }

        // Written last so a file literally named metadata.json cannot clobber it.
        repo.save(&PackageMetadata::new(name, version, files.to_vec()))?;

        info!("Added {} {} with {} file(s)", name, version, files.len());
        Ok(package_dir)
    }

    #[tracing::instrument(skip(self))]
    pub fn remove_package(&self, name: &str) -> Result<RemoveOutcome> {
        ensure_relative("Package name", name)?;
        if self.repository().remove_package_dir(name)? {
            Ok(RemoveOutcome::Removed)
        } else {
            Ok(RemoveOutcome::NotFound)
        }
    }

    /// Names of every package directory under the root.
    #[tracing::instrument(skip(self))]
    pub fn list_packages(&self) -> Result<Vec<String>> {
        let repo = self.repository();
        self.ensure_initialized(&repo)?;
        repo.package_names()
    }

    /// Metadata of a locally added package, `None` for installed archives.
    pub fn package_metadata(&self, name: &str) -> Result<Option<PackageMetadata>> {
        ensure_relative("Package name", name)?;
        self.repository().load(name)
    }

    pub fn package_exists(&self, name: &str) -> bool {
        self.repository().exists(name)
    }

    /// Look a package up in the remote index.
    pub fn get_package_index_url(&self, name: &str) -> Option<&str> {
        let url = self.config.index.get(name);
        if url.is_none() {
            warn!("Failed to determine package index URL for package {}", name);
        }
        url
    }

    /// Download and unpack `name` from the remote index.
    ///
    /// An archive with a single top-level folder becomes `<root>/<name>`,
    /// replacing any previous install; otherwise its entries are merged into
    /// the root, overwriting files but never removing existing directories.
    #[tracing::instrument(skip(self))]
    pub async fn install_package(&self, name: &str) -> Result<InstallOutcome> {
        let Some(url) = self.config.index.get(name) else {
            debug!("{} is not in the package index", name);
            return Ok(InstallOutcome::NotFound {
                name: name.to_string(),
            });
        };
        ensure_relative("Package name", name)?;

        let repo = self.repository();
        self.ensure_initialized(&repo)?;

        let archive_path = repo.archive_path(name);
        let staging_dir = repo.staging_dir(name);
        self.track(&archive_path);
        self.track(&staging_dir);

        println!("Downloading package: {}", name);
        let result = self
            .download_and_unpack(&repo, name, url, &archive_path, &staging_dir)
            .await;

        self.discard(&staging_dir);
        self.discard(&archive_path);

        let path = result?;
        Ok(InstallOutcome::Installed {
            name: name.to_string(),
            path,
        })
    }

    async fn download_and_unpack(
        &self,
        repo: &PackageRepository<'_, R>,
        name: &str,
        url: &str,
        archive_path: &Path,
        staging_dir: &Path,
    ) -> Result<PathBuf> {
        info!("Fetching {} from {}", name, url);
        self.downloader.download(url, archive_path).await?;

        if self.runtime.exists(staging_dir) {
            self.runtime.remove_dir_all(staging_dir)?;
        }
        let extracted = self
            .extractor
            .extract(self.runtime.as_ref(), archive_path, staging_dir)?;
        debug!("Archive top-level entries: {:?}", extracted.root_entries);

        if let Some(entry) = extracted.single_root()
            && self.runtime.is_dir(&staging_dir.join(entry))
        {
            let target = repo.package_dir(name);
            self.replace(&staging_dir.join(entry), &target)?;
            return Ok(target);
        }

        for entry in &extracted.root_entries {
            self.merge_into(&staging_dir.join(entry), &repo.root().join(entry))?;
        }
        Ok(repo.root().to_path_buf())
    }

    /// Re-install one package, or every package directory under the root.
    ///
    /// Locally added packages are looked up like any other name and come back
    /// as [`InstallOutcome::NotFound`] unless the index knows them.
    #[tracing::instrument(skip(self))]
    pub async fn update_package(&self, name: Option<&str>) -> Result<Vec<InstallOutcome>> {
        if let Some(name) = name {
            return Ok(vec![self.install_package(name).await?]);
        }

        let repo = self.repository();
        self.ensure_initialized(&repo)?;

        let names = repo.package_names()?;
        let mut outcomes = Vec::with_capacity(names.len());
        for name in names {
            outcomes.push(self.install_package(&name).await?);
        }
        Ok(outcomes)
    }

    /// Ask for confirmation, then install each dependency in order.
    ///
    /// Returns `None` when the user declines.
    #[tracing::instrument(skip(self))]
    pub async fn prompt_download_dependencies(
        &self,
        dependencies: &[String],
    ) -> Result<Option<Vec<InstallOutcome>>> {
        println!("This package has the following dependencies:");
        for dependency in dependencies {
            println!("- {}", dependency);
        }

        if !self
            .runtime
            .confirm("Do you want to download these dependencies?")?
        {
            println!("Dependencies not downloaded.");
            return Ok(None);
        }

        let mut outcomes = Vec::with_capacity(dependencies.len());
        for dependency in dependencies {
            outcomes.push(self.install_package(dependency).await?);
        }
        Ok(Some(outcomes))
    }

    /// Rename every subdirectory of `directory_path` whose name starts with
    /// the archive folder prefix to the name without it.
    ///
    /// Returns the `(from, to)` pairs that were renamed.
    #[tracing::instrument(skip(self))]
    pub fn delete_prefix(&self, directory_path: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
        let mut renamed = Vec::new();
        if !self.runtime.exists(directory_path) {
            return Ok(renamed);
        }

        let prefix = self.config.archive_prefix.as_str();
        for entry in self.runtime.read_dir(directory_path)? {
            let Some(dir_name) = entry.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(stripped) = dir_name.strip_prefix(prefix) else {
                continue;
            };
            if !self.runtime.is_dir(&entry) {
                continue;
            }
            if stripped.is_empty() {
                warn!("Not renaming {:?}: nothing left after the prefix", entry);
                continue;
            }

            let target = directory_path.join(stripped);
            if self.runtime.exists(&target) {
                warn!("Not renaming {:?}: {:?} already exists", entry, target);
                continue;
            }

            debug!("Renaming {:?} to {:?}", entry, target);
            self.runtime.rename(&entry, &target)?;
            renamed.push((entry, target));
        }

        Ok(renamed)
    }

    /// Move `from` to `to`, removing whatever is at `to` first.
    fn replace(&self, from: &Path, to: &Path) -> Result<()> {
        if self.runtime.exists(to) {
            debug!("Replacing existing {:?}", to);
            if self.runtime.is_dir(to) {
                self.runtime.remove_dir_all(to)?;
            } else {
                self.runtime.remove_file(to)?;
            }
        }
        self.runtime.rename(from, to)
    }

    /// Move `from` to `to`. Directories are merged entry by entry and
    /// existing files are overwritten.
    fn merge_into(&self, from: &Path, to: &Path) -> Result<()> {
        if !self.runtime.exists(to) {
            return self.runtime.rename(from, to);
        }

        match (self.runtime.is_dir(from), self.runtime.is_dir(to)) {
            (true, true) => {
                debug!("Merging {:?} into existing {:?}", from, to);
                for child in self.runtime.read_dir(from)? {
                    let Some(file_name) = child.file_name() else {
                        continue;
                    };
                    self.merge_into(&child, &to.join(file_name))?;
                }
                Ok(())
            }
            (false, false) => {
                self.runtime.remove_file(to)?;
                self.runtime.rename(from, to)
            }
            (true, false) => bail!("Cannot install directory {:?}: a file is in the way", to),
            (false, true) => bail!("Cannot install file {:?}: a directory is in the way", to),
        }
    }

    fn track(&self, path: &Path) {
        if let Ok(mut ctx) = self.cleanup_ctx.lock() {
            ctx.add(path.to_path_buf());
        }
    }

    /// Remove a transient path (if present) and stop tracking it.
    fn discard(&self, path: &Path) {
        if self.runtime.exists(path) {
            let result = if self.runtime.is_dir(path) {
                self.runtime.remove_dir_all(path)
            } else {
                self.runtime.remove_file(path)
            };
            if let Err(e) = result {
                warn!("Failed to remove {:?}: {:#}", path, e);
            }
        }
        if let Ok(mut ctx) = self.cleanup_ctx.lock() {
            ctx.remove(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ZipExtractor;
    use crate::download::MockDownloader;
    use crate::index::PackageIndex;
    use crate::runtime::{MockRuntime, RealRuntime};
    use mockall::predicate::{always, eq};
    use std::collections::BTreeSet;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;

    const STD_URL: &str = "https://github.com/IgorCielniak/Pryzma-packages/archive/refs/heads/std.zip";

    type TestManager = RepositoryManager<RealRuntime, MockDownloader, ZipExtractor>;

    fn manager(root: &Path, downloader: MockDownloader) -> TestManager {
        RepositoryManager::new(
            Arc::new(RealRuntime),
            downloader,
            ZipExtractor,
            Config::new(root, PackageIndex::builtin()),
        )
    }

    fn mock_manager(
        runtime: MockRuntime,
        downloader: MockDownloader,
    ) -> RepositoryManager<MockRuntime, MockDownloader, ZipExtractor> {
        RepositoryManager::new(
            Arc::new(runtime),
            downloader,
            ZipExtractor,
            Config::new("/packages", PackageIndex::builtin()),
        )
    }

    fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ::zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options: ::zip::write::FileOptions<()> = ::zip::write::FileOptions::default()
            .compression_method(::zip::CompressionMethod::Deflated);
        for (name, content) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    /// Downloader that "serves" `bytes` for every request.
    fn serving(bytes: Vec<u8>) -> MockDownloader {
        let mut downloader = MockDownloader::new();
        downloader.expect_download().returning(move |_, dest| {
            fs::write(dest, &bytes)?;
            Ok(bytes.len() as u64)
        });
        downloader
    }

    fn entry_names(dir: &Path) -> BTreeSet<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_initialize_repository_is_idempotent() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("packages");
        let manager = manager(&root, MockDownloader::new());

        assert_eq!(manager.initialize_repository().unwrap(), InitOutcome::Created);
        assert!(root.is_dir());
        assert_eq!(
            manager.initialize_repository().unwrap(),
            InitOutcome::AlreadyExists
        );
        assert!(root.is_dir());
    }

    #[test]
    fn test_add_package_writes_metadata_and_empty_files() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let manager = manager(&root, MockDownloader::new());

        let files = vec!["f1".to_string(), "f2".to_string()];
        let package_dir = manager.add_package("N", "V", &files).unwrap();

        assert_eq!(package_dir, root.join("N"));
        let content = fs::read_to_string(root.join("N/metadata.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "name": "N", "version": "V", "files": ["f1", "f2"] })
        );
        assert_eq!(fs::read(root.join("N/f1")).unwrap(), b"");
        assert_eq!(fs::read(root.join("N/f2")).unwrap(), b"");
    }

    #[test]
    fn test_add_package_overwrites_existing_files_and_metadata() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let manager = manager(&root, MockDownloader::new());

        manager
            .add_package("demo", "1.0", &["main.pryzma".to_string()])
            .unwrap();
        fs::write(root.join("demo/main.pryzma"), "content").unwrap();

        manager
            .add_package("demo", "2.0", &["main.pryzma".to_string()])
            .unwrap();

        assert_eq!(fs::read(root.join("demo/main.pryzma")).unwrap(), b"");
        let meta = manager.package_metadata("demo").unwrap().unwrap();
        assert_eq!(meta.version, "2.0");
    }

    #[test]
    fn test_add_package_nested_file_and_metadata_named_file() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let manager = manager(&root, MockDownloader::new());

        let files = vec!["src/lib.pryzma".to_string(), "metadata.json".to_string()];
        manager.add_package("demo", "1.0", &files).unwrap();

        assert!(root.join("demo/src/lib.pryzma").is_file());
        let meta = manager.package_metadata("demo").unwrap().unwrap();
        assert_eq!(meta.files, files);
    }

    #[test]
    fn test_add_package_rejects_escaping_paths() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("packages");
        let manager = manager(&root, MockDownloader::new());

        assert!(
            manager
                .add_package("demo", "1.0", &["../outside.txt".to_string()])
                .is_err()
        );
        assert!(manager.add_package("..", "1.0", &["a".to_string()]).is_err());
        assert!(!root.exists());
    }

    #[test]
    fn test_add_package_rejects_current_dir_names() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("packages");
        let manager = manager(&root, MockDownloader::new());

        assert!(manager.add_package("demo", "1.0", &[".".to_string()]).is_err());
        assert!(manager.add_package(".", "1.0", &["a".to_string()]).is_err());
        assert!(!root.exists());
    }

    #[test]
    fn test_remove_current_dir_keeps_packages() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("packages");
        let manager = manager(&root, MockDownloader::new());
        manager.initialize_repository().unwrap();
        manager.add_package("demo", "1.0", &["a".to_string()]).unwrap();

        assert!(manager.remove_package(".").is_err());
        assert!(manager.remove_package("./").is_err());
        assert!(root.join("demo/metadata.json").is_file());
        assert!(root.join("demo/a").is_file());
    }

    #[test]
    fn test_remove_package() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let manager = manager(&root, MockDownloader::new());
        manager.add_package("demo", "1.0", &["a".to_string()]).unwrap();

        assert_eq!(manager.remove_package("demo").unwrap(), RemoveOutcome::Removed);
        assert!(!root.join("demo").exists());
    }

    #[test]
    fn test_remove_missing_package_leaves_root_untouched() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let manager = manager(&root, MockDownloader::new());
        manager.add_package("keep", "1.0", &["a".to_string()]).unwrap();
        let before = entry_names(&root);

        assert_eq!(manager.remove_package("ghost").unwrap(), RemoveOutcome::NotFound);
        assert_eq!(entry_names(&root), before);
    }

    #[test]
    fn test_list_packages_returns_subdirectories() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let manager = manager(&root, MockDownloader::new());
        manager.add_package("demo", "1.0", &["file.txt".to_string()]).unwrap();
        manager.add_package("tools", "0.1", &["t".to_string()]).unwrap();
        fs::write(root.join("stray.txt"), "").unwrap();

        let names: BTreeSet<String> = manager.list_packages().unwrap().into_iter().collect();
        assert_eq!(names, BTreeSet::from(["demo".to_string(), "tools".to_string()]));
    }

    #[test]
    fn test_list_packages_requires_initialized_root() {
        let dir = tempdir().unwrap();
        let manager = manager(&dir.path().join("missing"), MockDownloader::new());

        let err = manager.list_packages().unwrap_err();
        assert!(err.to_string().contains("Repository not initialized"));
    }

    #[test]
    fn test_add_then_list_scenario() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("packages");
        let manager = manager(&root, MockDownloader::new());
        manager.initialize_repository().unwrap();

        manager.add_package("demo", "1.0", &["file.txt".to_string()]).unwrap();

        assert!(manager.list_packages().unwrap().contains(&"demo".to_string()));
        let meta: PackageMetadata =
            serde_json::from_str(&fs::read_to_string(root.join("demo/metadata.json")).unwrap())
                .unwrap();
        assert_eq!(meta.version, "1.0");
    }

    #[test]
    fn test_get_package_index_url() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path(), MockDownloader::new());

        assert_eq!(manager.get_package_index_url("std"), Some(STD_URL));
        assert_eq!(manager.get_package_index_url("left-pad"), None);
    }

    #[tokio::test]
    async fn test_install_unregistered_package_touches_nothing() {
        // No expectations: any filesystem or network call panics.
        let manager = mock_manager(MockRuntime::new(), MockDownloader::new());

        let outcome = manager.install_package("left-pad").await.unwrap();
        assert_eq!(
            outcome,
            InstallOutcome::NotFound {
                name: "left-pad".into()
            }
        );
    }

    #[tokio::test]
    async fn test_install_std_moves_archive_folder_into_place() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();

        let bytes = zip_bytes(&[
            ("Pryzma-packages-std/std.pryzma", "print 'std'"),
            ("Pryzma-packages-std/io/io.pryzma", "print 'io'"),
        ]);
        let mut downloader = MockDownloader::new();
        downloader
            .expect_download()
            .with(eq(STD_URL), eq(root.join("std.zip")))
            .times(1)
            .returning(move |_, dest| {
                fs::write(dest, &bytes)?;
                Ok(0)
            });
        let manager = manager(&root, downloader);

        let outcome = manager.install_package("std").await.unwrap();

        assert_eq!(
            outcome,
            InstallOutcome::Installed {
                name: "std".into(),
                path: root.join("std"),
            }
        );
        assert_eq!(fs::read_to_string(root.join("std/std.pryzma")).unwrap(), "print 'std'");
        assert!(root.join("std/io/io.pryzma").is_file());
        assert_eq!(entry_names(&root), BTreeSet::from(["std".to_string()]));
        assert!(manager.cleanup_context().lock().unwrap().paths().is_empty());
    }

    #[tokio::test]
    async fn test_install_replaces_previous_install() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        fs::create_dir_all(root.join("std")).unwrap();
        fs::write(root.join("std/old.pryzma"), "old").unwrap();

        let manager = manager(
            &root,
            serving(zip_bytes(&[("Pryzma-packages-std/new.pryzma", "new")])),
        );
        manager.install_package("std").await.unwrap();

        assert!(!root.join("std/old.pryzma").exists());
        assert_eq!(fs::read_to_string(root.join("std/new.pryzma")).unwrap(), "new");
    }

    #[tokio::test]
    async fn test_install_flat_archive_lands_in_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();

        let manager = manager(
            &root,
            serving(zip_bytes(&[("a.pryzma", "a"), ("b/b.pryzma", "b")])),
        );
        let outcome = manager.install_package("math").await.unwrap();

        assert_eq!(
            outcome,
            InstallOutcome::Installed {
                name: "math".into(),
                path: root.clone(),
            }
        );
        assert!(root.join("a.pryzma").is_file());
        assert!(root.join("b/b.pryzma").is_file());
        assert!(!root.join("math.zip").exists());
        assert!(!root.join(".math.extract").exists());
    }

    #[tokio::test]
    async fn test_install_flat_archive_merges_with_local_package() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();

        let manager = manager(
            &root,
            serving(zip_bytes(&[("demo/x.pryzma", "x"), ("README", "readme")])),
        );
        manager
            .add_package("demo", "1.0", &["mine.txt".to_string()])
            .unwrap();
        fs::write(root.join("README"), "old").unwrap();

        manager.install_package("math").await.unwrap();

        assert!(root.join("demo/mine.txt").is_file());
        assert!(root.join("demo/metadata.json").is_file());
        assert_eq!(fs::read_to_string(root.join("demo/x.pryzma")).unwrap(), "x");
        assert_eq!(fs::read_to_string(root.join("README")).unwrap(), "readme");
        assert_eq!(
            entry_names(&root),
            BTreeSet::from(["README".to_string(), "demo".to_string()])
        );
    }

    #[tokio::test]
    async fn test_install_flat_archive_file_over_directory_fails() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();

        let manager = manager(&root, serving(zip_bytes(&[("demo", "not a dir")])));
        manager.add_package("demo", "1.0", &["a".to_string()]).unwrap();

        let err = manager.install_package("math").await.unwrap_err();

        assert!(err.to_string().contains("a directory is in the way"));
        assert!(root.join("demo/metadata.json").is_file());
        assert!(!root.join(".math.extract").exists());
        assert!(!root.join("math.zip").exists());
    }

    #[tokio::test]
    async fn test_install_download_failure_cleans_up() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();

        let mut downloader = MockDownloader::new();
        downloader.expect_download().returning(|_, dest| {
            fs::write(dest, "partial")?;
            Err(anyhow::anyhow!("connection reset"))
        });
        let manager = manager(&root, downloader);

        let err = manager.install_package("std").await.unwrap_err();

        assert!(err.to_string().contains("connection reset"));
        assert!(entry_names(&root).is_empty());
        assert!(manager.cleanup_context().lock().unwrap().paths().is_empty());
    }

    #[tokio::test]
    async fn test_install_corrupt_archive_fails_and_cleans_up() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();

        let manager = manager(&root, serving(b"not a zip".to_vec()));
        assert!(manager.install_package("std").await.is_err());
        assert!(entry_names(&root).is_empty());
    }

    #[tokio::test]
    async fn test_install_requires_initialized_root() {
        let dir = tempdir().unwrap();
        let mut downloader = MockDownloader::new();
        downloader.expect_download().times(0);
        let manager = manager(&dir.path().join("missing"), downloader);

        let err = manager.install_package("std").await.unwrap_err();
        assert!(err.to_string().contains("Repository not initialized"));
    }

    #[tokio::test]
    async fn test_update_single_package() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let manager = manager(
            &root,
            serving(zip_bytes(&[("Pryzma-packages-math/math.pryzma", "m")])),
        );

        let outcomes = manager.update_package(Some("math")).await.unwrap();

        assert_eq!(outcomes.len(), 1);
        assert!(matches!(&outcomes[0], InstallOutcome::Installed { name, .. } if name == "math"));
        assert!(root.join("math/math.pryzma").is_file());
    }

    #[tokio::test]
    async fn test_update_all_reinstalls_every_directory() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();

        let bytes = zip_bytes(&[("Pryzma-packages-std/std.pryzma", "fresh")]);
        let mut downloader = MockDownloader::new();
        downloader
            .expect_download()
            .with(eq(STD_URL), always())
            .times(1)
            .returning(move |_, dest| {
                fs::write(dest, &bytes)?;
                Ok(0)
            });
        let manager = manager(&root, downloader);
        manager.add_package("demo", "1.0", &["a".to_string()]).unwrap();
        fs::create_dir_all(root.join("std")).unwrap();

        let mut outcomes = manager.update_package(None).await.unwrap();
        outcomes.sort_by(|a, b| a.name().cmp(b.name()));

        assert_eq!(
            outcomes,
            vec![
                InstallOutcome::NotFound {
                    name: "demo".into()
                },
                InstallOutcome::Installed {
                    name: "std".into(),
                    path: root.join("std"),
                },
            ]
        );
        assert_eq!(fs::read_to_string(root.join("std/std.pryzma")).unwrap(), "fresh");
        assert!(root.join("demo/metadata.json").is_file());
    }

    #[tokio::test]
    async fn test_prompt_download_dependencies_declined() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_confirm()
            .with(eq("Do you want to download these dependencies?"))
            .times(1)
            .returning(|_| Ok(false));
        let mut downloader = MockDownloader::new();
        downloader.expect_download().times(0);
        let manager = mock_manager(runtime, downloader);

        let result = manager
            .prompt_download_dependencies(&["std".to_string()])
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_prompt_download_dependencies_accepted() {
        let mut runtime = MockRuntime::new();
        runtime.expect_confirm().times(1).returning(|_| Ok(true));
        let manager = mock_manager(runtime, MockDownloader::new());

        let result = manager
            .prompt_download_dependencies(&["left-pad".to_string(), "right-pad".to_string()])
            .await
            .unwrap();

        assert_eq!(
            result,
            Some(vec![
                InstallOutcome::NotFound {
                    name: "left-pad".into()
                },
                InstallOutcome::NotFound {
                    name: "right-pad".into()
                },
            ])
        );
    }

    #[tokio::test]
    async fn test_prompt_download_dependencies_installs_in_order() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let mut downloader = MockDownloader::new();
        let mut seq = mockall::Sequence::new();
        for name in ["math", "std"] {
            let entry = format!("Pryzma-packages-{}/x", name);
            let bytes = zip_bytes(&[(entry.as_str(), "x")]);
            downloader
                .expect_download()
                .withf(move |url: &str, _: &Path| url.ends_with(&format!("/{}.zip", name)))
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_, dest| {
                    fs::write(dest, &bytes)?;
                    Ok(0)
                });
        }

        // Confirmation goes through the runtime; back the rest with the real filesystem.
        let mut runtime = MockRuntime::new();
        runtime.expect_confirm().returning(|_| Ok(true));
        runtime.expect_exists().returning(|p| p.exists());
        runtime.expect_is_dir().returning(|p| p.is_dir());
        runtime
            .expect_create_dir_all()
            .returning(|p| Ok(fs::create_dir_all(p)?));
        runtime
            .expect_open()
            .returning(|p| Ok(Box::new(fs::File::open(p)?)));
        runtime
            .expect_create_file()
            .returning(|p| Ok(Box::new(fs::File::create(p)?)));
        runtime.expect_set_permissions().returning(|_, _| Ok(()));
        runtime.expect_rename().returning(|a, b| Ok(fs::rename(a, b)?));
        runtime
            .expect_remove_file()
            .returning(|p| Ok(fs::remove_file(p)?));
        runtime
            .expect_remove_dir_all()
            .returning(|p| Ok(fs::remove_dir_all(p)?));

        let manager = RepositoryManager::new(
            Arc::new(runtime),
            downloader,
            ZipExtractor,
            Config::new(&root, PackageIndex::builtin()),
        );

        let outcomes = manager
            .prompt_download_dependencies(&["math".to_string(), "std".to_string()])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(root.join("math/x").is_file());
        assert!(root.join("std/x").is_file());
    }

    #[test]
    fn test_delete_prefix_renames_prefixed_directories() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        fs::create_dir_all(root.join("Pryzma-packages-math")).unwrap();
        fs::create_dir_all(root.join("demo")).unwrap();
        fs::write(root.join("Pryzma-packages-notes.txt"), "").unwrap();
        let manager = manager(&root, MockDownloader::new());

        let renamed = manager.delete_prefix(&root).unwrap();

        assert_eq!(
            renamed,
            vec![(root.join("Pryzma-packages-math"), root.join("math"))]
        );
        assert_eq!(
            entry_names(&root),
            BTreeSet::from([
                "demo".to_string(),
                "math".to_string(),
                "Pryzma-packages-notes.txt".to_string(),
            ])
        );

        // A second pass has nothing left to do.
        assert!(manager.delete_prefix(&root).unwrap().is_empty());
    }

    #[test]
    fn test_delete_prefix_skips_existing_targets_and_bare_prefix() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        fs::create_dir_all(root.join("Pryzma-packages-std")).unwrap();
        fs::create_dir_all(root.join("std")).unwrap();
        fs::create_dir_all(root.join("Pryzma-packages-")).unwrap();
        let manager = manager(&root, MockDownloader::new());

        assert!(manager.delete_prefix(&root).unwrap().is_empty());
        assert!(root.join("Pryzma-packages-std").is_dir());
        assert!(root.join("Pryzma-packages-").is_dir());
    }

    #[test]
    fn test_delete_prefix_missing_directory() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path(), MockDownloader::new());

        assert!(
            manager
                .delete_prefix(&dir.path().join("missing"))
                .unwrap()
                .is_empty()
        );
    }
}
