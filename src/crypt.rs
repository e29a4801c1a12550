// SPDX-License-Identifier: MIT

//! Encrypted archive pipeline.
//!
//! Sensitive files named by the encrypt pattern file are bundled with the
//! external tar tool and encrypted with the external OpenPGP tool into one
//! archive at a fixed path. Decryption reverses the composition, either
//! listing the archive's contents or extracting them into the work
//! directory.
//!
//! Each direction is a two-stage pipeline run through
//! [`syscall::run_pipeline`], so a failing decrypt is never masked by an
//! extraction stage that handles an empty stream without complaint.

use crate::{patterns, repo::Repository, syscall};

use std::{
    fs::remove_file,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

/// Yes/no question capability.
///
/// The pipeline never talks to a terminal itself; the binary injects an
/// interactive implementation and tests inject closures.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Archive pipeline over one work directory.
#[derive(Clone, Debug)]
pub struct Pipeline<'a> {
    /// Directory the pattern file and archive contents are relative to.
    pub work_dir: &'a Path,
    /// Glob pattern file naming the files to archive.
    pub pattern_file: &'a Path,
    /// Fixed archive path, overwritten by each encrypt.
    pub archive: &'a Path,
    /// OpenPGP recipient; symmetric encryption when absent.
    pub recipient: Option<String>,
}

impl Pipeline<'_> {
    /// Archive and encrypt everything the pattern file matches.
    ///
    /// Overwrites any existing archive. A failed run removes the partial
    /// output instead of leaving it in place looking valid.
    ///
    /// # Errors
    ///
    /// - Return [`Error::MissingPatternFile`] if the pattern file is absent.
    /// - Return [`Error::NothingToEncrypt`] if no pattern matches a file.
    /// - Return [`Error::Syscall`] if a required tool is missing or any
    ///   pipeline stage fails.
    pub fn encrypt(&self) -> Result<Vec<PathBuf>> {
        if !self.pattern_file.is_file() {
            return Err(Error::MissingPatternFile {
                pattern_file: self.pattern_file.to_path_buf(),
            });
        }
        syscall::require("gpg")?;
        syscall::require("tar")?;

        let files = patterns::collect(self.pattern_file, self.work_dir)?;
        if files.is_empty() {
            return Err(Error::NothingToEncrypt {
                pattern_file: self.pattern_file.to_path_buf(),
            });
        }

        info!("encrypting {} files to {:?}", files.len(), self.archive.display());
        let stages = vec![
            tar_create_stage(self.work_dir, &files),
            gpg_encrypt_stage(self.archive, self.recipient.as_deref()),
        ];
        if let Err(err) = syscall::run_pipeline(stages) {
            if remove_file(self.archive).is_ok() {
                warn!("removed partial archive at {:?}", self.archive.display());
            }
            return Err(err.into());
        }

        Ok(files)
    }

    /// Decrypt the archive and extract it, or only list its contents.
    ///
    /// Extraction lands in the work directory, verbosely. Listing never
    /// writes anything.
    ///
    /// # Errors
    ///
    /// - Return [`Error::MissingArchive`] if there is no archive.
    /// - Return [`Error::Syscall`] if a required tool is missing or any
    ///   pipeline stage fails, the decrypt stage included.
    pub fn decrypt(&self, list_only: bool) -> Result<()> {
        if !self.archive.is_file() {
            return Err(Error::MissingArchive {
                archive: self.archive.to_path_buf(),
            });
        }
        syscall::require("gpg")?;
        syscall::require("tar")?;

        info!(
            "{} archive {:?}",
            if list_only { "listing" } else { "extracting" },
            self.archive.display()
        );
        let stages = vec![
            gpg_decrypt_stage(self.archive),
            tar_read_stage(self.work_dir, list_only),
        ];
        syscall::run_pipeline(stages)?;

        Ok(())
    }
}

fn tar_create_stage(work_dir: &Path, files: &[PathBuf]) -> syscall::Stage {
    let mut args = vec![
        "-C".to_string(),
        work_dir.to_string_lossy().into_owned(),
        "-c".to_string(),
        "-f".to_string(),
        "-".to_string(),
    ];
    args.extend(files.iter().map(|file| file.to_string_lossy().into_owned()));

    syscall::Stage::new("tar", args)
}

fn gpg_encrypt_stage(archive: &Path, recipient: Option<&str>) -> syscall::Stage {
    let mut args = vec![
        "--yes".to_string(),
        "-o".to_string(),
        archive.to_string_lossy().into_owned(),
    ];
    match recipient {
        Some(recipient) => {
            args.push("-e".to_string());
            args.push("-r".to_string());
            args.push(recipient.to_string());
        }
        None => args.push("-c".to_string()),
    }

    syscall::Stage::new("gpg", args)
}

fn gpg_decrypt_stage(archive: &Path) -> syscall::Stage {
    syscall::Stage::new(
        "gpg",
        vec![
            "-d".to_string(),
            archive.to_string_lossy().into_owned(),
        ],
    )
}

fn tar_read_stage(work_dir: &Path, list_only: bool) -> syscall::Stage {
    let args = if list_only {
        vec!["-t".to_string(), "-f".to_string(), "-".to_string()]
    } else {
        vec![
            "-C".to_string(),
            work_dir.to_string_lossy().into_owned(),
            "-x".to_string(),
            "-v".to_string(),
            "-f".to_string(),
            "-".to_string(),
        ]
    };

    syscall::Stage::new("tar", args)
}

/// Offer to put a fresh archive under version control.
///
/// Only archives inside the work tree can be tracked; anything else is
/// skipped quietly, as is the whole offer when no repository exists yet.
/// Already-tracked archives are left alone. The caller's [`Confirm`]
/// decides whether `git add` runs.
///
/// # Errors
///
/// - Return [`crate::repo::Error`] if tracking state cannot be checked or
///   the add fails.
pub fn offer_archive_tracking(
    repo: &Repository,
    archive: &Path,
    confirm: &dyn Confirm,
) -> crate::repo::Result<()> {
    if !repo.exists() {
        return Ok(());
    }

    let Ok(relative) = archive.strip_prefix(repo.work_tree()) else {
        return Ok(());
    };

    if repo.is_tracked(relative)? {
        return Ok(());
    }

    let prompt = format!("add {:?} to the repository?", relative.display());
    if confirm.confirm(&prompt) {
        let _ = repo.gitcall(vec![
            "add".to_string(),
            archive.to_string_lossy().into_owned(),
        ])?;
    }

    Ok(())
}

/// Archive pipeline error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Encrypt pattern file does not exist.
    #[error(
        "no encrypt pattern file at {:?}; create it with one glob per line",
        pattern_file.display()
    )]
    MissingPatternFile { pattern_file: PathBuf },

    /// No pattern matched any file.
    #[error("patterns in {:?} matched no files", pattern_file.display())]
    NothingToEncrypt { pattern_file: PathBuf },

    /// Encrypted archive does not exist.
    #[error("no encrypted archive at {:?}; run `dotkeep encrypt` first", archive.display())]
    MissingArchive { archive: PathBuf },

    /// Pattern file expansion failed.
    #[error(transparent)]
    Patterns(#[from] patterns::Error),

    /// External tool missing or a pipeline stage failed.
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
    use std::ffi::OsString;
    use std::fs::{create_dir, create_dir_all, read_dir, read_to_string, write};

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    /// Shadow `gpg` with a pass-through script so the pipeline shape can be
    /// driven end to end without key material.
    fn stub_gpg(dir: &Path) {
        use std::os::unix::fs::PermissionsExt;

        create_dir(dir).unwrap();
        let script = dir.join("gpg");
        write(
            &script,
            "#!/bin/sh\ncase \"$1\" in\n  --yes) cat > \"$3\" ;;\n  -d) cat \"$2\" ;;\nesac\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let path = std::env::var("PATH").unwrap();
        std::env::set_var("PATH", format!("{}:{path}", dir.display()));
    }

    #[test]
    fn tar_create_stage_roots_at_work_dir() {
        let stage = tar_create_stage(
            Path::new("/home/user"),
            &[PathBuf::from(".ssh/config"), PathBuf::from("secret.conf")],
        );
        assert_eq!(stage.program(), "tar");
        assert_eq!(
            stage.args(),
            os(&["-C", "/home/user", "-c", "-f", "-", ".ssh/config", "secret.conf"]).as_slice()
        );
    }

    #[test]
    fn gpg_stage_symmetric_when_no_recipient() {
        let stage = gpg_encrypt_stage(Path::new("/state/files.gpg"), None);
        assert_eq!(
            stage.args(),
            os(&["--yes", "-o", "/state/files.gpg", "-c"]).as_slice()
        );
    }

    #[test]
    fn gpg_stage_uses_recipient_when_configured() {
        let stage = gpg_encrypt_stage(Path::new("/state/files.gpg"), Some("user@example.com"));
        assert_eq!(
            stage.args(),
            os(&["--yes", "-o", "/state/files.gpg", "-e", "-r", "user@example.com"]).as_slice()
        );
    }

    #[test]
    fn tar_read_stage_list_does_not_touch_work_dir() {
        let stage = tar_read_stage(Path::new("/home/user"), true);
        assert_eq!(stage.args(), os(&["-t", "-f", "-"]).as_slice());
    }

    #[test]
    fn tar_read_stage_extracts_verbosely() {
        let stage = tar_read_stage(Path::new("/home/user"), false);
        assert_eq!(
            stage.args(),
            os(&["-C", "/home/user", "-x", "-v", "-f", "-"]).as_slice()
        );
    }

    #[test]
    fn encrypt_requires_pattern_file() {
        let temp = tempfile::tempdir().unwrap();
        let pattern_file = temp.path().join("encrypt");
        let archive = temp.path().join("files.gpg");
        let pipeline = Pipeline {
            work_dir: temp.path(),
            pattern_file: &pattern_file,
            archive: &archive,
            recipient: None,
        };

        let result = pipeline.encrypt();
        assert!(matches!(result, Err(Error::MissingPatternFile { .. })));
    }

    #[test]
    fn decrypt_requires_archive() {
        let temp = tempfile::tempdir().unwrap();
        let pattern_file = temp.path().join("encrypt");
        let archive = temp.path().join("files.gpg");
        let pipeline = Pipeline {
            work_dir: temp.path(),
            pattern_file: &pattern_file,
            archive: &archive,
            recipient: None,
        };

        let result = pipeline.decrypt(true);
        assert!(matches!(result, Err(Error::MissingArchive { .. })));
    }

    #[test]
    fn closure_confirm_carries_the_prompt() {
        let seen = std::cell::RefCell::new(String::new());
        let confirm = |prompt: &str| {
            seen.borrow_mut().push_str(prompt);
            false
        };
        assert!(!confirm.confirm("add it?"));
        assert_eq!(seen.borrow().as_str(), "add it?");
    }

    // Forked into its own process because it rewrites PATH.
    #[sealed_test]
    fn encrypt_then_decrypt_round_trips_files() {
        if syscall::require("tar").is_err() {
            return;
        }

        let temp = tempfile::tempdir().unwrap();
        stub_gpg(&temp.path().join("bin"));

        let work = temp.path().join("home");
        create_dir_all(work.join(".ssh")).unwrap();
        write(work.join("one.conf"), "alpha").unwrap();
        write(work.join(".ssh/config"), "Host *").unwrap();

        let pattern_file = temp.path().join("encrypt");
        write(&pattern_file, "*.conf\n.ssh/*\n").unwrap();
        let archive = temp.path().join("files.gpg");

        let pipeline = Pipeline {
            work_dir: &work,
            pattern_file: &pattern_file,
            archive: &archive,
            recipient: None,
        };
        let files = pipeline.encrypt().unwrap();
        assert_eq!(
            files,
            vec![PathBuf::from(".ssh/config"), PathBuf::from("one.conf")]
        );
        assert!(archive.is_file());

        // Listing must not write anything into the target directory.
        let listed = temp.path().join("listed");
        create_dir(&listed).unwrap();
        let listing = Pipeline {
            work_dir: &listed,
            pattern_file: &pattern_file,
            archive: &archive,
            recipient: None,
        };
        listing.decrypt(true).unwrap();
        assert_eq!(read_dir(&listed).unwrap().count(), 0);

        // Extraction into an empty directory reproduces the files at the
        // same relative paths with identical contents.
        let restored = temp.path().join("restored");
        create_dir(&restored).unwrap();
        let extraction = Pipeline {
            work_dir: &restored,
            pattern_file: &pattern_file,
            archive: &archive,
            recipient: None,
        };
        extraction.decrypt(false).unwrap();
        assert_eq!(read_to_string(restored.join("one.conf")).unwrap(), "alpha");
        assert_eq!(
            read_to_string(restored.join(".ssh/config")).unwrap(),
            "Host *"
        );
    }

    #[test]
    fn tracking_offer_skipped_without_repository() {
        let temp = tempfile::tempdir().unwrap();
        let work = temp.path().join("home");
        create_dir(&work).unwrap();
        let repo = Repository::new(temp.path().join("repo.git"), &work);

        let asked = std::cell::Cell::new(false);
        let confirm = |_: &str| {
            asked.set(true);
            true
        };
        offer_archive_tracking(&repo, &work.join("files.gpg"), &confirm).unwrap();
        assert!(!asked.get());
    }

    #[test]
    fn empty_pattern_file_is_nothing_to_encrypt() {
        if syscall::require("gpg").is_err() || syscall::require("tar").is_err() {
            return;
        }

        let temp = tempfile::tempdir().unwrap();
        let pattern_file = temp.path().join("encrypt");
        write(&pattern_file, "# only a comment\nmatches-nothing-*\n").unwrap();
        let archive = temp.path().join("files.gpg");
        let pipeline = Pipeline {
            work_dir: temp.path(),
            pattern_file: &pattern_file,
            archive: &archive,
            recipient: None,
        };

        let result = pipeline.encrypt();
        assert!(matches!(result, Err(Error::NothingToEncrypt { .. })));
    }
}
