// SPDX-FileCopyrightText: 2024 Mathieu Fenniak <mathieu@fenniak.net>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use log::{debug, trace};
use tokio::process::Command;
use tracing::{Instrument as _, info_span};

use super::{CommandRunner, CommandSpec};
use crate::errors::SubcommandErrors;

/// Runs commands as real child processes.
#[derive(Clone, Debug, Default)]
pub struct SpawnCommandRunner;

impl CommandRunner for SpawnCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<String, SubcommandErrors> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        debug!("running {spec} in {:?}", spec.cwd);
        let output = cmd
            .output()
            .instrument(info_span!("subcommand",
                subcommand = true,
                subcommand_binary = ?spec.program,
                subcommand_args = ?spec.args,
            ))
            .await
            .map_err(|e| SubcommandErrors::UnableToStart {
                command: spec.to_string(),
                error: e,
            })?;

        if !output.status.success() {
            return Err(SubcommandErrors::SubcommandFailed {
                command: spec.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        if !output.stderr.is_empty() {
            trace!(
                "{spec} stderr: {}",
                String::from_utf8_lossy(&output.stderr).trim_end()
            );
        }

        String::from_utf8(output.stdout).map_err(|e| SubcommandErrors::OutputNotUtf8 {
            command: spec.to_string(),
            error: e,
        })
    }
}
