// SPDX-License-Identifier: MIT

//! Alternate file resolution.
//!
//! Tracked files may carry an alternate selector suffix on their basename:
//! `##<token>`, where the token is empty, a system kernel name, or
//! `system.host`. The resolver scans the tracked file set and symlinks each
//! suffixed file into place at the suffix-stripped path, so one repository
//! can hold per-system and per-host variants of the same dotfile.
//!
//! When several suffix variants of one base name match the local machine,
//! precedence is deterministic: host-qualified beats system-qualified beats
//! the bare `##` suffix. Candidates of equal specificity resolve in lexical
//! order with the last one winning. Token comparison ignores ASCII case.

use crate::syscall;

use std::{
    collections::BTreeMap,
    fs::remove_file,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Kernel and short host name of the machine running dotkeep.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalSystem {
    pub system: String,
    pub host: String,
}

impl LocalSystem {
    pub fn new(system: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            host: host.into(),
        }
    }

    /// Detect the local system via `uname`.
    ///
    /// The host name is shortened at the first dot so fully qualified names
    /// still match host tokens.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Syscall`] if `uname` fails.
    pub fn detect() -> Result<Self> {
        let system = syscall::run_captured("uname", ["-s"])?;
        let node = syscall::run_captured("uname", ["-n"])?;
        let host = node.split('.').next().unwrap_or(&node).to_string();

        Ok(Self { system, host })
    }

    /// Specificity of a selector token for this machine.
    ///
    /// Returns `None` when the token does not apply here; higher values win
    /// during planning.
    fn specificity(&self, token: &str) -> Option<u8> {
        if token.is_empty() {
            return Some(1);
        }

        if token.eq_ignore_ascii_case(&self.system) {
            return Some(2);
        }

        match token.split_once('.') {
            Some((system, host))
                if system.eq_ignore_ascii_case(&self.system)
                    && host.eq_ignore_ascii_case(&self.host) =>
            {
                Some(3)
            }
            _ => None,
        }
    }
}

/// One planned symlink, both paths relative to the work tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AltLink {
    /// Suffix-stripped path the symlink is created at.
    pub link: PathBuf,
    /// Suffixed tracked file the symlink points to.
    pub source: PathBuf,
}

/// Split a basename into its suffix-stripped form and selector token.
fn split_selector(name: &str) -> Option<(&str, &str)> {
    let (base, token) = name.split_once("##")?;
    if base.is_empty() {
        return None;
    }

    Some((base, token))
}

/// Plan the symlinks the local machine should have.
///
/// `tracked` is expected in lexically sorted order; planning keeps the most
/// specific candidate per link path and lets the later candidate win ties.
pub fn plan(tracked: &[PathBuf], local: &LocalSystem) -> Vec<AltLink> {
    let mut chosen: BTreeMap<PathBuf, (u8, PathBuf)> = BTreeMap::new();

    for path in tracked {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some((base, token)) = split_selector(name) else {
            continue;
        };
        let Some(specificity) = local.specificity(token) else {
            debug!("selector {token:?} does not match this machine, skipping {name:?}");
            continue;
        };

        let link = path.with_file_name(base);
        match chosen.get(&link) {
            Some((winner, _)) if *winner > specificity => {}
            _ => {
                chosen.insert(link, (specificity, path.clone()));
            }
        }
    }

    chosen
        .into_iter()
        .map(|(link, (_, source))| AltLink { link, source })
        .collect()
}

/// Create every planned symlink under the work tree, force-replacing
/// whatever sits at the link path.
///
/// Tracked files that are absent from the work tree are skipped without
/// error. Returns the links actually created.
///
/// # Errors
///
/// - Return [`Error::Symlink`] if a link cannot be replaced or created.
pub fn apply(work_dir: &Path, links: &[AltLink]) -> Result<Vec<AltLink>> {
    let mut created = Vec::new();

    for alt in links {
        let source = work_dir.join(&alt.source);
        if source.symlink_metadata().is_err() {
            debug!("tracked file {:?} not present, skipping", source.display());
            continue;
        }

        let link = work_dir.join(&alt.link);
        if link.symlink_metadata().is_ok() {
            remove_file(&link).map_err(|err| Error::Symlink {
                source: err,
                link: link.clone(),
            })?;
        }

        symlink(&source, &link).map_err(|err| Error::Symlink {
            source: err,
            link: link.clone(),
        })?;

        debug!("linked {:?} -> {:?}", alt.link.display(), alt.source.display());
        created.push(alt.clone());
    }

    Ok(created)
}

#[cfg(unix)]
fn symlink(source: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, link)
}

/// Alternate resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Symlink cannot be replaced or created.
    #[error("failed to link alternate at {:?}", link.display())]
    Symlink {
        #[source]
        source: std::io::Error,
        link: PathBuf,
    },

    /// Local system detection failed.
    #[error(transparent)]
    Syscall(#[from] syscall::Error),
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;
