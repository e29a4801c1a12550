// SPDX-License-Identifier: MIT

//! Glob pattern file collection.
//!
//! The `encrypt` pattern file is a newline-delimited list of glob patterns
//! naming sensitive files relative to the work directory. Lines starting
//! with `#` are comments. Both the archive pipeline and the permission
//! hardener rebuild the collected file list fresh on every invocation, so
//! the result is never cached here.

use std::{
    collections::BTreeSet,
    fs::read_to_string,
    path::{Path, PathBuf},
};
use tracing::warn;

/// Expand every pattern in a pattern file against a work directory.
///
/// Returns matches as deduplicated, lexically sorted paths relative to
/// `work_dir`. Patterns that match nothing contribute nothing; they are not
/// kept as literal text.
///
/// # Errors
///
/// - Return [`Error::ReadPatternFile`] if the pattern file cannot be read.
/// - Return [`Error::BadPattern`] if a pattern is not valid glob syntax.
pub fn collect(pattern_file: &Path, work_dir: &Path) -> Result<Vec<PathBuf>> {
    let content = read_to_string(pattern_file).map_err(|err| Error::ReadPatternFile {
        source: err,
        pattern_file: pattern_file.to_path_buf(),
    })?;

    let mut matches = BTreeSet::new();
    for line in content.lines() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let rooted = work_dir.join(line);
        let entries =
            glob::glob(&rooted.to_string_lossy()).map_err(|err| Error::BadPattern {
                source: err,
                pattern: line.to_string(),
            })?;

        for entry in entries {
            match entry {
                Ok(path) => {
                    let relative = path
                        .strip_prefix(work_dir)
                        .map(Path::to_path_buf)
                        .unwrap_or(path);
                    matches.insert(relative);
                }
                // An unreadable directory during expansion counts as no
                // match for that entry, not a fatal error.
                Err(err) => warn!("skipping unreadable glob entry: {err}"),
            }
        }
    }

    Ok(matches.into_iter().collect())
}

/// Pattern collection error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Pattern file cannot be read.
    #[error("failed to read pattern file at {:?}", pattern_file.display())]
    ReadPatternFile {
        #[source]
        source: std::io::Error,
        pattern_file: PathBuf,
    },

    /// A line is not valid glob syntax.
    #[error("invalid glob pattern {pattern:?}")]
    BadPattern {
        #[source]
        source: glob::PatternError,
        pattern: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;
