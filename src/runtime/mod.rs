//! Runtime abstraction for system operations.
//!
//! This module provides a trait-based abstraction over system operations,
//! enabling dependency injection and testability.
//!
//! # Structure
//!
//! - `env` - Home directory and privilege information
//! - `fs` - File system operations (read, write, directory)
//! - `user` - User interaction (confirmation prompts)

mod env;
mod fs;
mod user;

use anyhow::Result;
use std::path::{Path, PathBuf};

#[cfg_attr(test, mockall::automock)]
pub trait Runtime: Send + Sync {
    // File System
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn remove_file(&self, path: &Path) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
    fn create_file(&self, path: &Path) -> Result<Box<dyn std::io::Write + Send>>;
    fn open(&self, path: &Path) -> Result<Box<dyn std::io::Read + Send>>;
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
    fn is_dir(&self, path: &Path) -> bool;

    /// Set file permissions (mode) on Unix systems. No-op on Windows.
    fn set_permissions(&self, path: &Path, mode: u32) -> Result<()>;

    // Directories
    fn home_dir(&self) -> Option<PathBuf>;

    // Privilege
    fn is_privileged(&self) -> bool;

    // User interaction
    /// Prompt user for confirmation. Returns true if user confirms (y/yes), false otherwise.
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

pub struct RealRuntime;

impl Runtime for RealRuntime {
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.write_impl(path, contents)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.read_to_string_impl(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.rename_impl(from, to)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.create_dir_all_impl(path)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.remove_file_impl(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.exists_impl(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        self.read_dir_impl(path)
    }

    fn create_file(&self, path: &Path) -> Result<Box<dyn std::io::Write + Send>> {
        self.create_file_impl(path)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn std::io::Read + Send>> {
        self.open_impl(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.remove_dir_all_impl(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.is_dir_impl(path)
    }

    fn set_permissions(&self, path: &Path, mode: u32) -> Result<()> {
        self.set_permissions_impl(path, mode)
    }

    fn home_dir(&self) -> Option<PathBuf> {
        self.home_dir_impl()
    }

    fn is_privileged(&self) -> bool {
        self.is_privileged_impl()
    }

    fn confirm(&self, prompt: &str) -> Result<bool> {
        self.confirm_impl(prompt)
    }
}
