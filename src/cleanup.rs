use log::debug;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Tracks transient paths (downloaded archives, staging directories) that
/// must be removed if an install is interrupted.
#[derive(Default, Debug)]
pub struct CleanupContext {
    paths: Vec<PathBuf>,
}

impl CleanupContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a path for removal on interruption
    pub fn add(&mut self, path: PathBuf) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    /// Forget a path once the step that created it has finished
    pub fn remove(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Remove every registered path, ignoring failures
    pub fn cleanup(&self) {
        for path in &self.paths {
            debug!("Cleaning up: {:?}", path);
            if path.is_dir() {
                let _ = std::fs::remove_dir_all(path);
            } else {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}

pub type SharedCleanupContext = Arc<Mutex<CleanupContext>>;

pub fn new_shared() -> SharedCleanupContext {
    Arc::new(Mutex::new(CleanupContext::new()))
}

/// Runs `f` while a Ctrl-C handler is armed that cleans up `ctx` and exits
/// with status 130.
pub async fn with_interrupt_cleanup<F, T>(ctx: SharedCleanupContext, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let handler_ctx = Arc::clone(&ctx);
    let ctrl_c_handler = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, cleaning up...");
            if let Ok(guard) = handler_ctx.lock() {
                guard.cleanup();
            }
            std::process::exit(130);
        }
    });

    let result = f.await;
    ctrl_c_handler.abort();
    result
}
