// SPDX-FileCopyrightText: 2024 Mathieu Fenniak <mathieu@fenniak.net>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use log::{SetLoggerError, error, info, set_boxed_logger, set_max_level};
use serde::Serialize;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::scm::{Scm as _, ScmConfig, ScmDispatch, create_scm, get_scm_config};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
pub struct CommonOptions {
    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,

    /// Read backend configuration from this TOML file instead of `.config/vcsdrive.toml`
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub scm: ScmOptions,
}

/// Values given here override the configuration file.
#[derive(Args, Debug, Default)]
pub struct ScmOptions {
    /// Backend kind, eg. `mercurial`
    #[arg(long = "type", global = true)]
    pub kind: Option<String>,

    /// Source repository to clone and pull from
    #[arg(long, global = true)]
    pub repository: Option<String>,

    /// Existing working directory to operate on
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Backend executable to run, eg. a specific `hg` install
    #[arg(long, global = true)]
    pub executable: Option<String>,
}

impl From<&ScmOptions> for ScmConfig {
    fn from(value: &ScmOptions) -> Self {
        ScmConfig {
            kind: value.kind.clone().unwrap_or_default(),
            repository: value.repository.clone(),
            cwd: value.cwd.clone(),
            executable: value.executable.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Clone the source repository into a new working directory at a revision
    Clone {
        /// Destination working directory
        destination: PathBuf,

        /// Revision to check out; defaults to the backend's latest revision
        #[arg(short, long)]
        rev: Option<String>,
    },

    /// Fetch history up to a revision without touching the working directory
    Pull {
        #[arg(short, long)]
        rev: Option<String>,
    },

    /// Update the working directory to a revision
    Update {
        #[arg(short, long)]
        rev: Option<String>,
    },

    /// Print the revision checked out in the working directory
    Current,

    /// Print a single revision
    Rev { id: String },

    /// Print revisions after FROM up to TO, newest first
    Changes {
        from: String,

        /// Defaults to the backend's latest revision
        to: Option<String>,
    },
}

pub async fn run_cli() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = install_logger(&cli.common.verbose) {
        report_without_logger(&err);
        return ExitCode::FAILURE;
    }

    match run_command(&cli.common, &cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:?}");
            ExitCode::FAILURE
        }
    }
}

fn install_logger(verbose: &Verbosity<WarnLevel>) -> Result<(), SetLoggerError> {
    let logger = TermLogger::new(
        verbose.log_level_filter(),
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
    set_boxed_logger(logger)?;
    set_max_level(verbose.log_level_filter());
    Ok(())
}

fn load_scm(common: &CommonOptions) -> Result<ScmDispatch> {
    let config = get_scm_config(common.config.as_deref())
        .context("loading scm configuration")?
        .merge(ScmConfig::from(&common.scm));
    Ok(create_scm(&config)?)
}

async fn run_command(common: &CommonOptions, command: &Commands) -> Result<()> {
    let mut scm = load_scm(common)?;

    match command {
        Commands::Clone { destination, rev } => {
            let rev = rev.as_deref().unwrap_or(scm.default_rev()).to_string();
            scm.clone_to(destination, &rev)
                .await
                .with_context(|| format!("cloning {rev} into {destination:?}"))?;
            info!("working directory is now {:?}", scm.cwd());
        }
        Commands::Pull { rev } => {
            let rev = rev.as_deref().unwrap_or(scm.default_rev());
            scm.pull(rev)
                .await
                .with_context(|| format!("pulling {rev}"))?;
        }
        Commands::Update { rev } => {
            let rev = rev.as_deref().unwrap_or(scm.default_rev());
            scm.update(rev)
                .await
                .with_context(|| format!("updating to {rev}"))?;
        }
        Commands::Current => print_json(&scm.get_current().await?)?,
        Commands::Rev { id } => print_json(&scm.get_rev(id).await?)?,
        Commands::Changes { from, to } => {
            let to = to.as_deref().unwrap_or(scm.default_rev());
            let changes = scm
                .get_changes(from, to)
                .await
                .with_context(|| format!("listing changes from {from} to {to}"))?;
            print_json(&changes)?;
        }
    }
    Ok(())
}

#[allow(clippy::print_stderr)]
fn report_without_logger(err: &SetLoggerError) {
    eprintln!("unable to install terminal logger: {err}");
}

#[allow(clippy::print_stdout)]
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
