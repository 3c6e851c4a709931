// SPDX-FileCopyrightText: 2024 Mathieu Fenniak <mathieu@fenniak.net>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use enum_dispatch::enum_dispatch;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::SubcommandErrors;

pub mod scripted;
pub mod spawn;

pub use scripted::{ScriptedCommandRunner, ScriptedResponse};
pub use spawn::SpawnCommandRunner;

/// A single external process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<OsString>,
    /// Working directory for the process; the current directory is used when `None`.
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, cwd: &Path) -> Self {
        self.cwd = Some(cwd.to_path_buf());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Runs one external command to completion, returning its standard output.
///
/// Standard error is only surfaced through [`SubcommandErrors::SubcommandFailed`]; it is never mixed into the returned
/// output.  There is no retry and no timeout; a caller that needs a deadline can wrap the future in one.
#[enum_dispatch]
#[allow(async_fn_in_trait)] // should be fine to the extent that this is only used internally to this project
pub trait CommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<String, SubcommandErrors>;
}

#[enum_dispatch(CommandRunner)]
#[derive(Clone, Debug)]
pub enum CommandRunnerDispatch {
    SpawnCommandRunner,
    ScriptedCommandRunner,
}

impl Default for CommandRunnerDispatch {
    fn default() -> Self {
        SpawnCommandRunner.into()
    }
}
