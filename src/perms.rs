// SPDX-License-Identifier: MIT

//! Permission hardening for sensitive files.
//!
//! Builds a candidate list out of the encrypted archive, the `.ssh` and
//! `.gnupg` directories with their immediate contents, and every file the
//! encrypt pattern file matches, then strips group and other permissions
//! from each candidate that exists. Missing candidates are not errors, and
//! re-running over already-hardened files changes nothing.

use crate::patterns;

use std::{
    fs::{metadata, read_dir, set_permissions},
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// What to harden in one pass.
#[derive(Clone, Debug)]
pub struct HardenRequest<'a> {
    /// Work directory all relative candidates resolve against.
    pub work_dir: &'a Path,
    /// Encrypted archive path, hardened when present.
    pub archive: &'a Path,
    /// Glob pattern file; its matches are hardened when the file exists.
    pub pattern_file: &'a Path,
    /// Include `.ssh` and its immediate contents.
    pub ssh: bool,
    /// Include `.gnupg` and its immediate contents.
    pub gpg: bool,
}

/// Strip group/other permissions from every existing candidate.
///
/// Returns the paths whose permissions actually changed, so callers can
/// report work done rather than candidates visited.
///
/// # Errors
///
/// - Return [`Error::Patterns`] if the pattern file exists but cannot be
///   expanded.
/// - Return [`Error::Chmod`] if permissions cannot be changed on an
///   existing candidate.
pub fn harden(request: &HardenRequest<'_>) -> Result<Vec<PathBuf>> {
    let mut changed = Vec::new();

    for candidate in candidates(request)? {
        if strip_group_other(&candidate)? {
            info!("hardened {:?}", candidate.display());
            changed.push(candidate);
        }
    }

    Ok(changed)
}

fn candidates(request: &HardenRequest<'_>) -> Result<Vec<PathBuf>> {
    let mut paths = vec![request.archive.to_path_buf()];

    if request.ssh {
        paths.extend(dir_and_contents(&request.work_dir.join(".ssh")));
    }

    if request.gpg {
        paths.extend(dir_and_contents(&request.work_dir.join(".gnupg")));
    }

    if request.pattern_file.is_file() {
        for relative in patterns::collect(request.pattern_file, request.work_dir)? {
            paths.push(request.work_dir.join(relative));
        }
    }

    Ok(paths)
}

/// A directory plus its immediate contents, when the directory exists.
fn dir_and_contents(dir: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if !dir.is_dir() {
        return paths;
    }

    paths.push(dir.to_path_buf());
    if let Ok(entries) = read_dir(dir) {
        paths.extend(entries.flatten().map(|entry| entry.path()));
    }

    paths
}

/// Remove group/other read, write, and execute bits from one path.
///
/// Returns whether anything changed; a missing path changes nothing.
///
/// # Errors
///
/// - Return [`Error::Chmod`] if the permission change fails.
fn strip_group_other(path: &Path) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;

    let Ok(meta) = metadata(path) else {
        debug!("candidate {:?} absent, skipping", path.display());
        return Ok(false);
    };

    let mode = meta.permissions().mode() & 0o7777;
    let hardened = mode & !0o077;
    if hardened == mode {
        return Ok(false);
    }

    let mut perms = meta.permissions();
    perms.set_mode(hardened);
    set_permissions(path, perms).map_err(|err| Error::Chmod {
        source: err,
        path: path.to_path_buf(),
    })?;

    Ok(true)
}

/// Permission hardening error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Pattern file expansion failed.
    #[error(transparent)]
    Patterns(#[from] patterns::Error),

    /// Permission change failed on an existing candidate.
    #[error("failed to change permissions on {:?}", path.display())]
    Chmod {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;
