// SPDX-FileCopyrightText: 2024 Mathieu Fenniak <mathieu@fenniak.net>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use log::trace;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use super::{CommandRunner, CommandSpec};
use crate::errors::SubcommandErrors;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedResponse {
    /// Process exits zero with this standard output.
    Success(String),
    /// Process exits with `code` and this standard error.
    Failure { code: i32, stderr: String },
    /// The executable could not be started.
    SpawnFailure,
}

#[derive(Debug, Default)]
struct Script {
    responses: VecDeque<ScriptedResponse>,
    requests: Vec<CommandSpec>,
}

/// Replays queued responses in order, one per `run`, and records every request it receives.
///
/// Clones share the same script, so a test can keep a handle for inspection after moving the runner into a backend.
/// Running past the end of the script reports [`SubcommandErrors::UnableToStart`].
#[derive(Clone, Debug, Default)]
pub struct ScriptedCommandRunner {
    script: Arc<Mutex<Script>>,
}

impl ScriptedCommandRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: ScriptedResponse) -> &Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .responses
            .push_back(response);
        self
    }

    pub fn push_success(&self, stdout: impl Into<String>) -> &Self {
        self.push(ScriptedResponse::Success(stdout.into()))
    }

    pub fn push_failure(&self, code: i32, stderr: impl Into<String>) -> &Self {
        self.push(ScriptedResponse::Failure {
            code,
            stderr: stderr.into(),
        })
    }

    #[must_use]
    pub fn requests(&self) -> Vec<CommandSpec> {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .requests
            .clone()
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .responses
            .len()
    }
}

impl CommandRunner for ScriptedCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<String, SubcommandErrors> {
        let response = {
            let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
            script.requests.push(spec.clone());
            script.responses.pop_front()
        };
        trace!("scripted {spec} -> {response:?}");

        match response {
            Some(ScriptedResponse::Success(stdout)) => Ok(stdout),
            Some(ScriptedResponse::Failure { code, stderr }) => {
                Err(SubcommandErrors::SubcommandFailed {
                    command: spec.to_string(),
                    code: Some(code),
                    stderr,
                })
            }
            Some(ScriptedResponse::SpawnFailure) => Err(SubcommandErrors::UnableToStart {
                command: spec.to_string(),
                error: io::Error::new(io::ErrorKind::NotFound, "scripted spawn failure"),
            }),
            None => Err(SubcommandErrors::UnableToStart {
                command: spec.to_string(),
                error: io::Error::other("no scripted response left"),
            }),
        }
    }
}
