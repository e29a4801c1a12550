// SPDX-License-Identifier: MIT

//! Dotfile management through a repository whose metadata lives elsewhere.
//!
//! Dotkeep tracks a user's configuration files with Git while keeping the
//! Git directory out of the tracked directory entirely. Git allows a bare
//! metadata store to designate any directory as its working tree through
//! the `--git-dir`/`--work-tree` pair, so the user's home becomes a
//! repository without ever containing one. Day-to-day version control is
//! passed straight through to the external `git` binary; dotkeep adds the
//! policy around it:
//!
//! - [`alt`] selects per-system and per-host variants of tracked files and
//!   symlinks them into place.
//! - [`crypt`] bundles sensitive files into a single encrypted archive via
//!   the external tar and OpenPGP tools, and unpacks it again.
//! - [`perms`] strips group/other permissions from sensitive files.
//! - [`patterns`] expands the user-authored glob pattern file both of the
//!   above consume.
//! - [`repo`] owns the split metadata-store/work-tree layout and all git
//!   invocations, and reports whether a command may have mutated state.
//! - [`settings`] stores tool configuration in git-config format.
//! - [`syscall`] runs every external tool, including the staged pipelines
//!   that compose archiving with encryption.
//! - [`path`] locates the per-user state directory holding all of it.
//!
//! # See Also
//!
//! 1. [ArchWiki - dotfiles](https://wiki.archlinux.org/title/Dotfiles#Tracking_dotfiles_directly_with_Git)

pub mod alt;
pub mod crypt;
pub mod path;
pub mod patterns;
pub mod perms;
pub mod repo;
pub mod settings;
pub mod syscall;

pub use crate::{
    path::StateDir,
    repo::{Outcome, Repository},
    settings::{Settings, Toggle},
};
