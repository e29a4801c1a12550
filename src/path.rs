// SPDX-License-Identifier: MIT

//! Path resolution for dotkeep's persisted state.
//!
//! All state lives under one per-user directory, by default
//! `$XDG_DATA_HOME/dotkeep`:
//!
//! - `repo.git`: Git metadata store whose work tree is the user's home.
//! - `config`: tool configuration in git-config format.
//! - `encrypt`: user-authored glob pattern file naming sensitive files.
//! - `files.gpg`: encrypted archive produced by the encrypt command.

use std::path::{Path, PathBuf};

/// Layout of the dotkeep state directory.
///
/// Construction does not touch the file system; call [`StateDir::ensure`]
/// before writing anything under it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateDir(PathBuf);

impl StateDir {
    /// State directory at the default XDG location.
    ///
    /// # Errors
    ///
    /// - Return [`Error::NoWayHome`] if the data directory cannot be
    ///   determined.
    pub fn locate() -> Result<Self> {
        dirs::data_dir()
            .map(|path| Self(path.join("dotkeep")))
            .ok_or(Error::NoWayHome)
    }

    /// State directory rooted at an explicit path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Create the state directory if it does not exist yet.
    ///
    /// # Errors
    ///
    /// - Return [`Error::CreateStateDir`] if the directory cannot be created.
    pub fn ensure(&self) -> Result<()> {
        mkdirp::mkdirp(&self.0).map_err(|err| Error::CreateStateDir {
            source: err,
            path: self.0.clone(),
        })?;
        Ok(())
    }

    pub fn as_path(&self) -> &Path {
        self.0.as_path()
    }

    /// Git metadata store for the tracked home directory.
    pub fn repo(&self) -> PathBuf {
        self.0.join("repo.git")
    }

    /// Tool configuration file, git-config format.
    pub fn config(&self) -> PathBuf {
        self.0.join("config")
    }

    /// Glob pattern file selecting files for encryption and hardening.
    pub fn encrypt_patterns(&self) -> PathBuf {
        self.0.join("encrypt")
    }

    /// Encrypted archive, overwritten by each encrypt run.
    pub fn archive(&self) -> PathBuf {
        self.0.join("files.gpg")
    }
}

/// Absolute path to the user's home directory, the default work tree.
///
/// Does not check that the path exists.
///
/// # Errors
///
/// - Return [`Error::NoWayHome`] if the home directory cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(Error::NoWayHome)
}

/// State path resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No way to determine the user's home or data directory.
    #[error("cannot determine per-user directory for dotkeep state")]
    NoWayHome,

    /// State directory cannot be created when missing.
    #[error("failed to create state directory at {:?}", path.display())]
    CreateStateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn state_dir_layout() {
        let state = StateDir::at("/data/dotkeep");
        assert_eq!(state.repo(), PathBuf::from("/data/dotkeep/repo.git"));
        assert_eq!(state.config(), PathBuf::from("/data/dotkeep/config"));
        assert_eq!(
            state.encrypt_patterns(),
            PathBuf::from("/data/dotkeep/encrypt")
        );
        assert_eq!(state.archive(), PathBuf::from("/data/dotkeep/files.gpg"));
    }

    #[test]
    fn ensure_creates_missing_directory() {
        let temp = tempfile::tempdir().unwrap();
        let state = StateDir::at(temp.path().join("nested").join("dotkeep"));
        state.ensure().unwrap();
        assert!(state.as_path().is_dir());

        // Second call is a no-op.
        state.ensure().unwrap();
        assert!(state.as_path().is_dir());
    }
}
