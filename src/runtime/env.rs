//! Home directory and privilege information.

use std::path::PathBuf;

use super::RealRuntime;

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn home_dir_impl(&self) -> Option<PathBuf> {
        dirs::home_dir()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn is_privileged_impl(&self) -> bool {
        #[cfg(unix)]
        return nix::unistd::geteuid().as_raw() == 0;

        #[cfg(windows)]
        return is_elevated::is_elevated();
    }
}
