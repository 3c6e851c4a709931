// SPDX-FileCopyrightText: 2024 Mathieu Fenniak <mathieu@fenniak.net>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use enum_dispatch::enum_dispatch;
use log::debug;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use time::OffsetDateTime;

use crate::command::{CommandRunnerDispatch, SpawnCommandRunner};
use crate::errors::ScmError;

pub mod config;
pub mod mercurial;
pub mod revision_parser;

pub use config::{ScmConfig, get_scm_config};
pub use mercurial::MercurialScm;

/// One committed changeset, as reported by the backend.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    /// Full content-derived identifier; unique within a repository.
    pub id: String,
    pub parents: Vec<String>,
    pub author: Option<String>,
    #[serde(serialize_with = "crate::util::optional_rfc3339")]
    pub date: Option<OffsetDateTime>,
    pub message: Option<String>,
}

impl Revision {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parents: Vec::new(),
            author: None,
            date: None,
            message: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScmKind {
    Mercurial,
}

impl ScmKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ScmKind::Mercurial => "mercurial",
        }
    }
}

impl fmt::Display for ScmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScmKind {
    type Err = ScmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mercurial" | "hg" => Ok(ScmKind::Mercurial),
            _ => Err(ScmError::UnsupportedBackend(String::from(s))),
        }
    }
}

/// Operations every version-control backend supports.
///
/// An instance starts out either unattached (knowing only its source repository) or attached to an existing working
/// directory.  [`Scm::clone_to`] is the only way to attach an unattached instance, and it can only happen once; every
/// other operation except [`Scm::clone_to`] requires a working directory and fails without spawning anything if there
/// isn't one.
///
/// Each operation runs at most one external command.  Concurrent operations against the same working directory are
/// not serialized here; callers sharing a working directory between instances must coordinate themselves.
#[enum_dispatch]
#[allow(async_fn_in_trait)] // should be fine to the extent that this is only used internally to this project
pub trait Scm {
    fn kind(&self) -> ScmKind;

    /// The backend's symbol for its latest integrated revision (eg. `tip`); not resolved until used.
    fn default_rev(&self) -> &str;

    fn cwd(&self) -> Option<&Path>;

    fn repository(&self) -> Option<&str>;

    /// Materialize a fresh working directory at `destination`, checked out to `revision`, and attach to it.
    ///
    /// A failed clone may leave a partially written `destination`; it should be removed before retrying.
    async fn clone_to(&mut self, destination: &Path, revision: &str) -> Result<(), ScmError>;

    /// Fetch history up to `revision` without changing the working directory's contents.
    async fn pull(&self, revision: &str) -> Result<(), ScmError>;

    /// Rewrite the working directory to match `revision`.  Uncommitted changes cause a failure rather than being
    /// discarded.
    async fn update(&self, revision: &str) -> Result<(), ScmError>;

    /// The revision currently checked out in the working directory.
    async fn get_current(&self) -> Result<Revision, ScmError>;

    async fn get_rev(&self, id: &str) -> Result<Revision, ScmError>;

    /// Revisions after `from` (exclusive) up to `to` (inclusive), newest first.  Empty when `from == to`.
    async fn get_changes(&self, from: &str, to: &str) -> Result<Vec<Revision>, ScmError>;
}

#[enum_dispatch(Scm)]
#[derive(Debug)]
pub enum ScmDispatch {
    Mercurial(MercurialScm),
}

/// Construct the backend described by `config`, running commands as real processes.
pub fn create_scm(config: &ScmConfig) -> Result<ScmDispatch, ScmError> {
    create_scm_with_runner(config, SpawnCommandRunner.into())
}

/// Construct the backend described by `config` with an explicit command runner.
///
/// No I/O happens here; neither `repository` nor `cwd` is checked until an operation uses it.
pub fn create_scm_with_runner(
    config: &ScmConfig,
    runner: CommandRunnerDispatch,
) -> Result<ScmDispatch, ScmError> {
    let kind: ScmKind = config.kind.parse()?;
    debug!("creating {kind} scm from {config:?}");
    match kind {
        ScmKind::Mercurial => {
            let mut scm = MercurialScm::new(runner);
            if let Some(executable) = &config.executable {
                scm = scm.with_executable(executable.clone());
            }
            if let Some(repository) = &config.repository {
                scm = scm.with_repository(repository.clone());
            }
            if let Some(cwd) = &config.cwd {
                scm = scm.attached_to(cwd.clone());
            }
            Ok(scm.into())
        }
    }
}
