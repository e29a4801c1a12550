// SPDX-License-Identifier: MIT

use dotkeep::{
    alt::{self, LocalSystem},
    crypt::{self, Confirm, Pipeline},
    path,
    perms::{self, HardenRequest},
    Outcome, Repository, Settings, StateDir, Toggle,
};

use anyhow::{bail, ensure, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::{env, ffi::OsString, path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    disable_help_subcommand = true,
    override_usage = "\n  dotkeep [options] <dotkeep-command>\n  dotkeep [options] <git-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Absolute path to use as the work tree instead of the home directory.
    #[arg(short, long, global = true, value_name = "path")]
    pub work_tree: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let work_tree = resolve_work_tree(self.work_tree)?;
        let state = StateDir::locate()?;
        state.ensure()?;

        let repo = Repository::new(state.repo(), work_tree);
        repo.export_env();
        let settings = Settings::open(state.config())?;
        let ctx = Context { state, repo, settings };

        let outcome = match self.command {
            Command::Alt => {
                run_alt(&ctx, true)?;
                Outcome::Clean
            }
            Command::Clean => {
                bail!("clean is disabled: it deletes untracked files from the work tree")
            }
            Command::Clone(opts) => ctx.repo.clone_from(&opts.url, opts.force)?,
            Command::Config(opts) => run_config(&ctx, &opts)?,
            Command::Decrypt(opts) => run_decrypt(&ctx, opts.list)?,
            Command::Encrypt => run_encrypt(&ctx)?,
            Command::Gitconfig(opts) => run_gitconfig(&ctx, opts.args)?,
            Command::Help => {
                Cli::command().print_long_help()?;
                exit(1);
            }
            Command::Init(opts) => ctx.repo.init(opts.force)?,
            Command::List(opts) => {
                run_list(&ctx, opts.all)?;
                Outcome::Clean
            }
            Command::Perms => {
                run_perms(&ctx)?;
                Outcome::Clean
            }
            Command::Version => {
                println!("dotkeep {}", env!("CARGO_PKG_VERSION"));
                exit(1);
            }
            Command::Git(args) => ctx.repo.gitcall(args)?,
        };

        if outcome.mutated() {
            if Toggle::AutoAlt.enabled(&ctx.settings)? {
                run_alt(&ctx, false)?;
            }

            if Toggle::AutoPerms.enabled(&ctx.settings)? {
                run_perms(&ctx)?;
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Create symlinks for the alternate files matching this machine.
    #[command(override_usage = "dotkeep alt [options]")]
    Alt,

    /// Unsupported. Refused because it deletes untracked files.
    #[command(override_usage = "dotkeep clean")]
    Clean,

    /// Clone an existing repository from a remote.
    #[command(override_usage = "dotkeep clone [options] <url>")]
    Clone(CloneOptions),

    /// Read or write a dotkeep configuration key.
    #[command(override_usage = "dotkeep config [options] <key> [<value>]")]
    Config(ConfigOptions),

    /// Decrypt the archive into the work tree.
    #[command(override_usage = "dotkeep decrypt [options]")]
    Decrypt(DecryptOptions),

    /// Archive and encrypt the files named by the encrypt pattern file.
    #[command(override_usage = "dotkeep encrypt [options]")]
    Encrypt,

    /// Pass arguments through to git config against the repository.
    #[command(override_usage = "dotkeep gitconfig [options] [<git-config-args>]...")]
    Gitconfig(GitconfigOptions),

    /// Show this help output.
    #[command(override_usage = "dotkeep help")]
    Help,

    /// Initialize an empty repository for the work tree.
    #[command(override_usage = "dotkeep init [options]")]
    Init(InitOptions),

    /// List the files the repository tracks.
    #[command(override_usage = "dotkeep list [options]")]
    List(ListOptions),

    /// Strip group and other permissions from sensitive tracked paths.
    #[command(override_usage = "dotkeep perms [options]")]
    Perms,

    /// Print the dotkeep version.
    #[command(override_usage = "dotkeep version")]
    Version,

    /// Run the Git binary directly against the repository.
    #[command(external_subcommand)]
    Git(Vec<OsString>),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CloneOptions {
    /// URL of the remote to clone from.
    #[arg(required = true, value_name = "url")]
    pub url: String,

    /// Replace an already initialized repository.
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ConfigOptions {
    /// Configuration key to read or write.
    #[arg(required = true, value_name = "key")]
    pub key: String,

    /// New value; omit it to print the current one.
    #[arg(value_name = "value")]
    pub value: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DecryptOptions {
    /// List archive contents instead of extracting them.
    #[arg(short, long)]
    pub list: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct GitconfigOptions {
    /// Arguments forwarded to git config.
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "git_config_args"
    )]
    pub args: Vec<OsString>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// Replace an already initialized repository.
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ListOptions {
    /// List every tracked file, not just those under the current directory.
    #[arg(short, long)]
    pub all: bool,
}

/// Everything a command handler needs, resolved once per invocation.
struct Context {
    state: StateDir,
    repo: Repository,
    settings: Settings,
}

impl Context {
    /// Work tree the repository was configured with, falling back to the
    /// one this invocation was given when no repository exists yet.
    fn work_dir(&self) -> Result<PathBuf> {
        Ok(self
            .repo
            .configured_work_tree()?
            .unwrap_or_else(|| self.repo.work_tree().to_path_buf()))
    }
}

fn resolve_work_tree(flag: Option<PathBuf>) -> Result<PathBuf> {
    let Some(path) = flag else {
        return Ok(path::home_dir()?);
    };

    ensure!(
        path.is_absolute(),
        "work tree override {:?} must be an absolute path",
        path.display()
    );
    ensure!(
        path.is_dir(),
        "work tree override {:?} does not exist",
        path.display()
    );

    Ok(path)
}

fn run_alt(ctx: &Context, report: bool) -> Result<()> {
    let work = ctx.work_dir()?;
    let local = LocalSystem::detect()?;
    let tracked = ctx.repo.tracked_files()?;
    let created = alt::apply(&work, &alt::plan(&tracked, &local))?;

    if report {
        for link in &created {
            println!("{} -> {}", link.link.display(), link.source.display());
        }
    }

    Ok(())
}

fn run_perms(ctx: &Context) -> Result<()> {
    let work = ctx.work_dir()?;
    let archive = ctx.state.archive();
    let pattern_file = ctx.state.encrypt_patterns();
    let request = HardenRequest {
        work_dir: &work,
        archive: &archive,
        pattern_file: &pattern_file,
        ssh: Toggle::SshPerms.enabled(&ctx.settings)?,
        gpg: Toggle::GpgPerms.enabled(&ctx.settings)?,
    };
    perms::harden(&request)?;
    Ok(())
}

fn run_encrypt(ctx: &Context) -> Result<Outcome> {
    let work = ctx.work_dir()?;
    let pattern_file = ctx.state.encrypt_patterns();
    let archive = ctx.state.archive();
    let pipeline = Pipeline {
        work_dir: &work,
        pattern_file: &pattern_file,
        archive: &archive,
        recipient: ctx.settings.get("gpg-recipient")?,
    };

    let files = pipeline.encrypt()?;
    info!("encrypted {} file(s) into {:?}", files.len(), archive.display());
    crypt::offer_archive_tracking(&ctx.repo, &archive, &TerminalConfirm)?;

    Ok(Outcome::Mutated)
}

fn run_decrypt(ctx: &Context, list_only: bool) -> Result<Outcome> {
    let work = ctx.work_dir()?;
    let pattern_file = ctx.state.encrypt_patterns();
    let archive = ctx.state.archive();
    let pipeline = Pipeline {
        work_dir: &work,
        pattern_file: &pattern_file,
        archive: &archive,
        recipient: ctx.settings.get("gpg-recipient")?,
    };

    pipeline.decrypt(list_only)?;

    if list_only {
        Ok(Outcome::Clean)
    } else {
        Ok(Outcome::Mutated)
    }
}

fn run_config(ctx: &Context, opts: &ConfigOptions) -> Result<Outcome> {
    match &opts.value {
        Some(value) => ctx.settings.set(&opts.key, value)?,
        None => {
            if let Some(value) = ctx.settings.get(&opts.key)? {
                println!("{value}");
            }
        }
    }

    Ok(Outcome::Clean)
}

fn run_gitconfig(ctx: &Context, args: Vec<OsString>) -> Result<Outcome> {
    let mut forwarded: Vec<OsString> = vec!["config".into()];
    forwarded.extend(args);
    let _ = ctx.repo.gitcall(forwarded)?;
    Ok(Outcome::Clean)
}

fn run_list(ctx: &Context, all: bool) -> Result<()> {
    let files = if all {
        ctx.repo.tracked_files()?
    } else {
        let cwd = env::current_dir()?;
        if cwd.starts_with(ctx.repo.work_tree()) {
            ctx.repo.tracked_files_under(&cwd)?
        } else {
            ctx.repo.tracked_files()?
        }
    };

    for file in files {
        println!("{}", file.display());
    }

    Ok(())
}

/// Interactive yes/no prompt; anything but an explicit yes declines.
struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        inquire::Confirm::new(prompt)
            .with_default(false)
            .prompt()
            .unwrap_or(false)
    }
}

fn main() {
    let cli = Cli::try_parse().unwrap_or_else(|error| {
        let _ = error.print();
        exit(1);
    });

    let layer = fmt::layer().compact();
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new("info"))
            .unwrap()
    };
    tracing_subscriber::registry().with(layer).with(filter).init();

    if let Err(error) = cli.run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}
