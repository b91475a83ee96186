//! CLI-facing commands: run a manager operation and print its report.

use anyhow::Result;
use log::debug;
use reqwest::Client;
use std::sync::Arc;

use crate::{
    archive::{ArchiveExtractor, ZipExtractor},
    cleanup::with_interrupt_cleanup,
    config::Config,
    download::{Downloader, HttpDownloader},
    http::HttpClient,
    manager::{InitOutcome, InstallOutcome, RemoveOutcome, RepositoryManager},
    runtime::Runtime,
};

/// Manager wired to the network and the zip extractor.
pub type DefaultManager<R> = RepositoryManager<R, HttpDownloader<R>, ZipExtractor>;

pub fn build_manager<R: Runtime + 'static>(
    runtime: Arc<R>,
    config: Config,
) -> Result<DefaultManager<R>> {
    let client = Client::builder().user_agent("ppm-cli").build()?;
    let downloader = HttpDownloader::new(Arc::clone(&runtime), HttpClient::new(client));
    Ok(RepositoryManager::new(runtime, downloader, ZipExtractor, config))
}

#[tracing::instrument(skip(manager))]
pub fn init<R, D, E>(manager: &RepositoryManager<R, D, E>) -> Result<()>
where
    R: Runtime + 'static,
    D: Downloader,
    E: ArchiveExtractor,
{
    let root = manager.root().display();
    match manager.initialize_repository()? {
        InitOutcome::Created => println!("Repository initialized at: {}", root),
        InitOutcome::AlreadyExists => println!("Repository already exists at: {}", root),
    }
    Ok(())
}

#[tracing::instrument(skip(manager))]
pub fn add<R, D, E>(
    manager: &RepositoryManager<R, D, E>,
    name: &str,
    version: &str,
    files: &[String],
) -> Result<()>
where
    R: Runtime + 'static,
    D: Downloader,
    E: ArchiveExtractor,
{
    manager.add_package(name, version, files)?;
    println!("Package {} added successfully.", name);
    Ok(())
}

#[tracing::instrument(skip(manager))]
pub fn remove<R, D, E>(manager: &RepositoryManager<R, D, E>, name: &str) -> Result<()>
where
    R: Runtime + 'static,
    D: Downloader,
    E: ArchiveExtractor,
{
    match manager.remove_package(name)? {
        RemoveOutcome::Removed => println!("Package {} removed successfully.", name),
        RemoveOutcome::NotFound => println!("Package {} not found.", name),
    }
    normalize_prefixes(manager)
}

#[tracing::instrument(skip(manager))]
pub fn list<R, D, E>(manager: &RepositoryManager<R, D, E>) -> Result<()>
where
    R: Runtime + 'static,
    D: Downloader,
    E: ArchiveExtractor,
{
    let packages = manager.list_packages()?;
    println!("Available packages:");
    for package in packages {
        println!("- {}", package);
    }
    Ok(())
}

#[tracing::instrument(skip(manager))]
pub fn info<R, D, E>(manager: &RepositoryManager<R, D, E>, name: &str) -> Result<()>
where
    R: Runtime + 'static,
    D: Downloader,
    E: ArchiveExtractor,
{
    match manager.package_metadata(name)? {
        Some(meta) => {
            println!("{} {}", meta.name, meta.version);
            for file in &meta.files {
                println!("- {}", file);
            }
        }
        None if manager.package_exists(name) => {
            println!("Package {} has no metadata.", name);
        }
        None => println!("Package {} not found.", name),
    }
    Ok(())
}

#[tracing::instrument(skip(manager))]
pub async fn install<R, D, E>(manager: &RepositoryManager<R, D, E>, name: &str) -> Result<()>
where
    R: Runtime + 'static,
    D: Downloader,
    E: ArchiveExtractor,
{
    let outcome =
        with_interrupt_cleanup(manager.cleanup_context(), manager.install_package(name)).await?;
    print_install_outcome(&outcome);
    normalize_prefixes(manager)
}

#[tracing::instrument(skip(manager))]
pub async fn update<R, D, E>(manager: &RepositoryManager<R, D, E>, name: Option<&str>) -> Result<()>
where
    R: Runtime + 'static,
    D: Downloader,
    E: ArchiveExtractor,
{
    let outcomes =
        with_interrupt_cleanup(manager.cleanup_context(), manager.update_package(name)).await?;
    if outcomes.is_empty() {
        println!("No packages installed.");
    }
    for outcome in &outcomes {
        print_install_outcome(outcome);
    }
    normalize_prefixes(manager)
}

fn print_install_outcome(outcome: &InstallOutcome) {
    match outcome {
        InstallOutcome::Installed { name, path } => {
            debug!("{} installed at {:?}", name, path);
            println!("Package {} downloaded and installed successfully.", name);
        }
        InstallOutcome::NotFound { name } => {
            println!("Package {} not found in the repository.", name);
        }
    }
}

/// Prefix normalization pass run after remove/install/update.
fn normalize_prefixes<R, D, E>(manager: &RepositoryManager<R, D, E>) -> Result<()>
where
    R: Runtime + 'static,
    D: Downloader,
    E: ArchiveExtractor,
{
    for (from, to) in manager.delete_prefix(manager.root())? {
        debug!("Renamed {:?} to {:?}", from, to);
    }
    Ok(())
}
