// SPDX-License-Identifier: MIT

//! Tool configuration store.
//!
//! Settings live in a dedicated file kept apart from the repository's own
//! Git configuration, but written in the same git-config format so the
//! external `git config` tool does all parsing and mutation. Keys sit under
//! the `dotkeep` section, e.g. `dotkeep.auto-alt`.
//!
//! Absence of a key is meaningful: every caller maps it to the documented
//! default for that specific key, not to a blanket value. The per-key
//! defaults for feature toggles live in [`Toggle`].

use crate::syscall;

use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Key/value store backed by a git-config formatted file.
#[derive(Clone, Debug)]
pub struct Settings {
    file: PathBuf,
}

impl Settings {
    /// Open the settings file, creating it empty on first access.
    ///
    /// # Errors
    ///
    /// - Return [`Error::CreateFile`] if the file cannot be created.
    pub fn open(file: impl Into<PathBuf>) -> Result<Self> {
        let file = file.into();

        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&file)
            .map_err(|err| Error::CreateFile {
                source: err,
                file: file.clone(),
            })?;

        Ok(Self { file })
    }

    pub fn file(&self) -> &Path {
        self.file.as_path()
    }

    /// Look up a key, returning `None` when it is not set.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Syscall`] if `git config` itself fails.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.query(key, false)
    }

    /// Look up a key as a git-normalized boolean.
    ///
    /// `git config --type=bool` canonicalizes every accepted spelling to
    /// exactly `true` or `false` and rejects anything else itself, so a
    /// malformed stored value surfaces as the tool's own failure.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Syscall`] if `git config` fails, a value that does
    ///   not normalize to a boolean included.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        Ok(self.query(key, true)?.map(|value| value == "true"))
    }

    /// Set a key to a value, creating or replacing it.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Syscall`] if `git config` fails.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        debug!("set {key} = {value} in {:?}", self.file.display());
        let file = self.file.to_string_lossy().into_owned();
        let args = vec![
            "config".to_string(),
            "--file".to_string(),
            file,
            section_key(key),
            value.to_string(),
        ];
        syscall::run_captured("git", args)?;

        Ok(())
    }

    fn query(&self, key: &str, as_bool: bool) -> Result<Option<String>> {
        let file = self.file.to_string_lossy().into_owned();
        let mut args = vec!["config".to_string(), "--file".to_string(), file];
        if as_bool {
            args.push("--type=bool".to_string());
        }
        args.push("--get".to_string());
        args.push(section_key(key));

        match syscall::run_captured("git", args) {
            Ok(value) => Ok(Some(value)),
            // git-config exits 1 for a key that is not set, which is the
            // expected "absent" answer rather than a tool failure.
            Err(syscall::Error::ToolFailure { code: 1, .. }) => Ok(None),
            Err(err) => Err(Error::Syscall(err)),
        }
    }
}

fn section_key(key: &str) -> String {
    format!("dotkeep.{key}")
}

/// Boolean feature toggles with per-key defaults.
///
/// Every toggle defaults to enabled when unset; an explicit `false` in the
/// settings file switches the behavior off.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Toggle {
    /// Run the alternate resolver after mutating commands.
    AutoAlt,
    /// Run the permission hardener after mutating commands.
    AutoPerms,
    /// Include `.ssh` and its immediate contents in hardening.
    SshPerms,
    /// Include `.gnupg` and its immediate contents in hardening.
    GpgPerms,
}

impl Toggle {
    pub fn key(&self) -> &'static str {
        match self {
            Self::AutoAlt => "auto-alt",
            Self::AutoPerms => "auto-perms",
            Self::SshPerms => "ssh-perms",
            Self::GpgPerms => "gpg-perms",
        }
    }

    /// Value to assume when the key is absent from the settings file.
    pub fn default_value(&self) -> bool {
        true
    }

    /// Effective value of this toggle given the settings file.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Syscall`] if `git config` fails.
    pub fn enabled(&self, settings: &Settings) -> Result<bool> {
        Ok(settings
            .get_bool(self.key())?
            .unwrap_or_else(|| self.default_value()))
    }
}

/// Configuration store error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Settings file cannot be created on first access.
    #[error("failed to create settings file at {:?}", file.display())]
    CreateFile {
        #[source]
        source: std::io::Error,
        file: PathBuf,
    },

    /// The external `git config` invocation failed.
    #[error(transparent)]
    Syscall(#[from] syscall::Error),
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn open_creates_missing_file() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("config");
        let settings = Settings::open(&file).unwrap();
        assert!(settings.file().is_file());
    }

    #[test]
    fn set_then_get_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let settings = Settings::open(temp.path().join("config")).unwrap();

        settings.set("gpg-recipient", "user@example.com").unwrap();
        let value = settings.get("gpg-recipient").unwrap();
        assert_eq!(value, Some("user@example.com".to_string()));
    }

    #[test]
    fn get_missing_key_is_absent() {
        let temp = tempfile::tempdir().unwrap();
        let settings = Settings::open(temp.path().join("config")).unwrap();
        assert_eq!(settings.get("no-such-key").unwrap(), None);
    }

    #[test]
    fn get_bool_normalizes_git_truthiness() {
        let temp = tempfile::tempdir().unwrap();
        let settings = Settings::open(temp.path().join("config")).unwrap();

        settings.set("auto-alt", "off").unwrap();
        assert_eq!(settings.get_bool("auto-alt").unwrap(), Some(false));

        settings.set("auto-alt", "yes").unwrap();
        assert_eq!(settings.get_bool("auto-alt").unwrap(), Some(true));
    }

    #[test]
    fn non_boolean_value_surfaces_git_failure() {
        let temp = tempfile::tempdir().unwrap();
        let settings = Settings::open(temp.path().join("config")).unwrap();

        settings.set("auto-alt", "sideways").unwrap();
        let result = settings.get_bool("auto-alt");
        assert!(matches!(result, Err(Error::Syscall(_))));
    }

    #[test]
    fn toggles_default_to_enabled_when_unset() {
        let temp = tempfile::tempdir().unwrap();
        let settings = Settings::open(temp.path().join("config")).unwrap();

        for toggle in [
            Toggle::AutoAlt,
            Toggle::AutoPerms,
            Toggle::SshPerms,
            Toggle::GpgPerms,
        ] {
            assert!(toggle.enabled(&settings).unwrap(), "{:?}", toggle);
        }
    }

    #[test]
    fn disabled_toggle_reads_false() {
        let temp = tempfile::tempdir().unwrap();
        let settings = Settings::open(temp.path().join("config")).unwrap();

        settings.set(Toggle::AutoPerms.key(), "false").unwrap();
        assert!(!Toggle::AutoPerms.enabled(&settings).unwrap());
        // Other toggles keep their own defaults.
        assert!(Toggle::AutoAlt.enabled(&settings).unwrap());
    }
}
