// SPDX-FileCopyrightText: 2024 Mathieu Fenniak <mathieu@fenniak.net>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubcommandErrors {
    #[error("unable to start sub-command '{command}': {error}")]
    UnableToStart {
        command: String,
        #[source]
        error: std::io::Error,
    },

    #[error("sub-command '{command}' failed with exit code {code:?} and stderr {stderr:?}")]
    SubcommandFailed {
        command: String,
        /// `None` when the process was terminated by a signal.
        code: Option<i32>,
        stderr: String,
    },

    #[error("sub-command '{command}' produced output that was not valid UTF-8")]
    OutputNotUtf8 {
        command: String,
        #[source]
        error: std::string::FromUtf8Error,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RevisionParseError {
    #[error("revision entry {index} did not match the log grammar: {reason}")]
    MalformedEntry { index: usize, reason: String },

    #[error("revision entry {index} has an invalid date {raw:?}: {reason}")]
    InvalidDate {
        index: usize,
        raw: String,
        reason: String,
    },

    #[error("expected {expected} revision(s) in output but found {actual}")]
    UnexpectedCount { expected: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum ScmError {
    #[error(transparent)]
    Subcommand(#[from] SubcommandErrors),

    #[error("sub-command '{command}' had unparseable output; error: {error} output: {output:?}")]
    OutputParseFailed {
        command: String,
        #[source]
        error: RevisionParseError,
        output: String,
    },

    #[error("unknown revision {revision:?}")]
    UnknownRevision {
        revision: String,
        /// Diagnostic text from the tool, empty when the revision simply resolved to nothing.
        stderr: String,
    },

    #[error("unsupported scm backend type {0:?}")]
    UnsupportedBackend(String),

    #[error("{operation} cannot run: {requirement}")]
    PreconditionViolation {
        operation: &'static str,
        requirement: Precondition,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Precondition {
    #[error("no working directory is attached; clone first or configure `cwd`")]
    WorkingDirectoryRequired,

    #[error("already attached to working directory {0:?}")]
    AlreadyAttached(PathBuf),

    #[error("no source repository is configured")]
    RepositoryRequired,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("override config path {0:?} could not be opened")]
    MissingOverride(PathBuf),

    #[error("unable to read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("unable to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        error: toml::de::Error,
    },
}
