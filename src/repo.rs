// SPDX-License-Identifier: MIT

//! Repository handle for the tracked home directory.
//!
//! Dotkeep keeps Git metadata in a directory of its own (`repo.git` under
//! the state directory) while the work tree is the user's home. Git permits
//! this split through the `--git-dir`/`--work-tree` pair, so an entire
//! directory is treated as a repository without ever initializing it as one.
//!
//! All version-control work is delegated to the external `git` binary; this
//! module only composes invocations, enforces init/clone preconditions, and
//! reports whether a command may have mutated tracked state.

use crate::syscall;

use std::{
    env,
    ffi::OsString,
    fs::remove_dir_all,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// Summary of a command's effect on tracked or encrypted state.
///
/// Returned by every command instead of being tracked through a global
/// flag; the dispatcher inspects it once to decide whether automatic
/// post-actions run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[must_use]
pub enum Outcome {
    /// Nothing the command did could have changed tracked state.
    #[default]
    Clean,
    /// Tracked or encrypted state may have changed.
    Mutated,
}

impl Outcome {
    pub fn mutated(&self) -> bool {
        matches!(self, Self::Mutated)
    }
}

/// A repository whose metadata store and work tree live apart.
#[derive(Clone, Debug)]
pub struct Repository {
    gitdir: PathBuf,
    work_tree: PathBuf,
}

impl Repository {
    pub fn new(gitdir: impl Into<PathBuf>, work_tree: impl Into<PathBuf>) -> Self {
        Self {
            gitdir: gitdir.into(),
            work_tree: work_tree.into(),
        }
    }

    pub fn gitdir(&self) -> &Path {
        self.gitdir.as_path()
    }

    pub fn work_tree(&self) -> &Path {
        self.work_tree.as_path()
    }

    pub fn exists(&self) -> bool {
        self.gitdir.is_dir()
    }

    /// Export `GIT_DIR` for the remainder of the process.
    ///
    /// Pass-through commands and every child process then operate on the
    /// metadata store without explicit flags.
    pub fn export_env(&self) {
        debug!("export GIT_DIR={:?}", self.gitdir.display());
        env::set_var("GIT_DIR", &self.gitdir);
    }

    /// Initialize a fresh metadata store for the work tree.
    ///
    /// Refuses to touch an existing repository unless `force` is given, in
    /// which case the old metadata store is fully replaced.
    ///
    /// # Errors
    ///
    /// - Return [`Error::AlreadyInitialized`] if the store exists and
    ///   `force` is false.
    /// - Return [`Error::ReplaceRepo`] if the old store cannot be removed.
    /// - Return [`Error::Syscall`] if git fails.
    pub fn init(&self, force: bool) -> Result<Outcome> {
        syscall::require("git")?;
        self.replace_guard(force)?;

        info!("initialize repository at {:?}", self.gitdir.display());
        syscall::run_captured(
            "git",
            [
                "init".to_string(),
                "--bare".to_string(),
                self.gitdir.to_string_lossy().into_owned(),
            ],
        )?;
        self.configure()?;

        Ok(Outcome::Mutated)
    }

    /// Clone an existing repository as the metadata store.
    ///
    /// After cloning, the store is reconfigured for the split layout and a
    /// checkout into the work tree is attempted. Files already present in
    /// the work tree make the checkout fail; that is reported as a warning
    /// with remediation rather than rolled back.
    ///
    /// # Errors
    ///
    /// - Return [`Error::AlreadyInitialized`] if the store exists and
    ///   `force` is false.
    /// - Return [`Error::ReplaceRepo`] if the old store cannot be removed.
    /// - Return [`Error::Syscall`] if the clone itself fails.
    pub fn clone_from(&self, url: &str, force: bool) -> Result<Outcome> {
        syscall::require("git")?;
        self.replace_guard(force)?;

        info!("clone {url} into {:?}", self.gitdir.display());
        syscall::run_interactive(
            "git",
            [
                "clone".to_string(),
                "--bare".to_string(),
                url.to_string(),
                self.gitdir.to_string_lossy().into_owned(),
            ],
        )?;
        self.configure()?;

        if let Err(err) = syscall::run_captured_in(
            &self.work_tree,
            "git",
            self.expand_args(["checkout".to_string()]),
        ) {
            warn!("checkout into {:?} failed: {err}", self.work_tree.display());
            warn!("resolve conflicting local files, then run: dotkeep checkout");
        }

        Ok(Outcome::Mutated)
    }

    /// List tracked files, lexically sorted, relative to the work tree.
    ///
    /// # Errors
    ///
    /// - Return [`Error::NotInitialized`] if there is no metadata store.
    /// - Return [`Error::Syscall`] if git fails.
    pub fn tracked_files(&self) -> Result<Vec<PathBuf>> {
        self.open_guard()?;
        let output = syscall::run_captured_in(
            &self.work_tree,
            "git",
            self.expand_args(["ls-files".to_string()]),
        )?;

        let mut files: Vec<PathBuf> = output.lines().map(PathBuf::from).collect();
        files.sort();

        Ok(files)
    }

    /// List tracked files scoped to a directory inside the work tree.
    ///
    /// Paths are reported relative to `dir`, mirroring what git-ls-files
    /// prints when invoked from that directory.
    ///
    /// # Errors
    ///
    /// - Return [`Error::NotInitialized`] if there is no metadata store.
    /// - Return [`Error::Syscall`] if git fails.
    pub fn tracked_files_under(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        self.open_guard()?;
        let output =
            syscall::run_captured_in(dir, "git", self.expand_args(["ls-files".to_string()]))?;

        let mut files: Vec<PathBuf> = output.lines().map(PathBuf::from).collect();
        files.sort();

        Ok(files)
    }

    /// Work tree recorded in the metadata store's own configuration.
    ///
    /// Alternate resolution and permission hardening follow this value on
    /// every invocation, regardless of any work-tree override given on the
    /// command line.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Syscall`] if git fails for a reason other than the
    ///   key being unset.
    pub fn configured_work_tree(&self) -> Result<Option<PathBuf>> {
        let args = [
            "--git-dir".to_string(),
            self.gitdir.to_string_lossy().into_owned(),
            "config".to_string(),
            "core.worktree".to_string(),
        ];

        match syscall::run_captured("git", args) {
            Ok(value) => Ok(Some(PathBuf::from(value))),
            Err(syscall::Error::ToolFailure { code: 1, .. }) => Ok(None),
            Err(err) => Err(Error::Syscall(err)),
        }
    }

    /// Check whether a work-tree-relative path is tracked.
    ///
    /// # Errors
    ///
    /// - Return [`Error::NotInitialized`] if there is no metadata store.
    /// - Return [`Error::Syscall`] if git fails.
    pub fn is_tracked(&self, path: &Path) -> Result<bool> {
        self.open_guard()?;
        let mut args = self.expand_args(["ls-files".to_string(), "--error-unmatch".to_string()]);
        args.push(path.as_os_str().to_os_string());

        match syscall::run_captured_in(&self.work_tree, "git", args) {
            Ok(_) => Ok(true),
            Err(syscall::Error::ToolFailure { code: 1, .. }) => Ok(false),
            Err(err) => Err(Error::Syscall(err)),
        }
    }

    /// Pass an argument vector straight through to git.
    ///
    /// Runs interactively in the caller's working directory so relative
    /// paths, pagers, and editors behave exactly as under plain git. Any
    /// pass-through invocation may mutate tracked state.
    ///
    /// # Errors
    ///
    /// - Return [`Error::NotInitialized`] if there is no metadata store.
    /// - Return [`Error::Syscall`] if git exits non-zero.
    pub fn gitcall(&self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Result<Outcome> {
        self.open_guard()?;
        syscall::run_interactive("git", self.expand_args(args))?;

        Ok(Outcome::Mutated)
    }

    fn expand_args(
        &self,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Vec<OsString> {
        let mut bin_args: Vec<OsString> = vec![
            "--git-dir".into(),
            self.gitdir.as_os_str().to_os_string(),
            "--work-tree".into(),
            self.work_tree.as_os_str().to_os_string(),
        ];
        bin_args.extend(args.into_iter().map(Into::into));

        bin_args
    }

    fn configure(&self) -> Result<()> {
        let worktree = self.work_tree.to_string_lossy().into_owned();
        for (key, value) in [
            ("core.bare", "false"),
            ("core.worktree", worktree.as_str()),
            ("status.showUntrackedFiles", "no"),
        ] {
            syscall::run_captured(
                "git",
                [
                    "--git-dir".to_string(),
                    self.gitdir.to_string_lossy().into_owned(),
                    "config".to_string(),
                    key.to_string(),
                    value.to_string(),
                ],
            )?;
        }

        Ok(())
    }

    fn replace_guard(&self, force: bool) -> Result<()> {
        if !self.exists() {
            return Ok(());
        }

        if !force {
            return Err(Error::AlreadyInitialized {
                gitdir: self.gitdir.clone(),
            });
        }

        remove_dir_all(&self.gitdir).map_err(|err| Error::ReplaceRepo {
            source: err,
            gitdir: self.gitdir.clone(),
        })
    }

    fn open_guard(&self) -> Result<()> {
        if self.exists() {
            Ok(())
        } else {
            Err(Error::NotInitialized {
                gitdir: self.gitdir.clone(),
            })
        }
    }
}

/// Repository handling error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Metadata store already exists and force-replace was not requested.
    #[error(
        "repository already exists at {:?}; pass -f to replace it",
        gitdir.display()
    )]
    AlreadyInitialized { gitdir: PathBuf },

    /// Metadata store is missing for a command that needs one.
    #[error(
        "no repository at {:?}; run `dotkeep init` or `dotkeep clone <url>` first",
        gitdir.display()
    )]
    NotInitialized { gitdir: PathBuf },

    /// Existing metadata store cannot be removed for force-replacement.
    #[error("failed to replace repository at {:?}", gitdir.display())]
    ReplaceRepo {
        #[source]
        source: std::io::Error,
        gitdir: PathBuf,
    },

    /// The external git invocation failed.
    #[error(transparent)]
    Syscall(#[from] syscall::Error),
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs::write;

    fn fixture() -> (tempfile::TempDir, Repository) {
        let temp = tempfile::tempdir().unwrap();
        let work = temp.path().join("home");
        std::fs::create_dir(&work).unwrap();
        let repo = Repository::new(temp.path().join("repo.git"), work);
        (temp, repo)
    }

    fn seed_identity(repo: &Repository) {
        for (key, value) in [("user.name", "Test User"), ("user.email", "test@example.com")] {
            syscall::run_captured(
                "git",
                [
                    "--git-dir".to_string(),
                    repo.gitdir().to_string_lossy().into_owned(),
                    "config".to_string(),
                    key.to_string(),
                    value.to_string(),
                ],
            )
            .unwrap();
        }
    }

    /// Stage files from inside the work tree, without inheriting the test
    /// runner's working directory.
    fn stage(repo: &Repository, names: &[&str]) {
        let mut args = vec!["add".to_string()];
        args.extend(names.iter().map(ToString::to_string));
        syscall::run_captured_in(repo.work_tree(), "git", repo.expand_args(args)).unwrap();
    }

    // Forked into its own process because it pollutes the environment.
    #[sealed_test]
    fn export_env_points_git_at_the_metadata_store() {
        let (_temp, repo) = fixture();
        repo.export_env();
        assert_eq!(
            env::var_os("GIT_DIR"),
            Some(repo.gitdir().as_os_str().to_owned())
        );
    }

    #[test]
    fn init_twice_requires_force() {
        let (_temp, repo) = fixture();
        assert!(repo.init(false).unwrap().mutated());
        assert!(repo.exists());

        let result = repo.init(false);
        assert!(matches!(result, Err(Error::AlreadyInitialized { .. })));

        // Force replaces the store outright.
        assert!(repo.init(true).unwrap().mutated());
        assert!(repo.exists());
    }

    #[test]
    fn configure_records_work_tree() {
        let (_temp, repo) = fixture();
        let _ = repo.init(false).unwrap();
        assert_eq!(
            repo.configured_work_tree().unwrap(),
            Some(repo.work_tree().to_path_buf())
        );
    }

    #[test]
    fn tracked_files_requires_repository() {
        let (_temp, repo) = fixture();
        let result = repo.tracked_files();
        assert!(matches!(result, Err(Error::NotInitialized { .. })));
    }

    #[test]
    fn tracked_files_sorted_and_relative() {
        let (_temp, repo) = fixture();
        let _ = repo.init(false).unwrap();
        seed_identity(&repo);

        write(repo.work_tree().join(".bashrc"), "x").unwrap();
        write(repo.work_tree().join(".profile"), "y").unwrap();
        stage(&repo, &[".profile", ".bashrc"]);

        let files = repo.tracked_files().unwrap();
        assert_eq!(
            files,
            vec![PathBuf::from(".bashrc"), PathBuf::from(".profile")]
        );
    }

    #[test]
    fn is_tracked_distinguishes_index_membership() {
        let (_temp, repo) = fixture();
        let _ = repo.init(false).unwrap();
        seed_identity(&repo);

        write(repo.work_tree().join(".vimrc"), "set nocompatible").unwrap();
        stage(&repo, &[".vimrc"]);

        assert!(repo.is_tracked(Path::new(".vimrc")).unwrap());
        assert!(!repo.is_tracked(Path::new(".zshrc")).unwrap());
    }
}
