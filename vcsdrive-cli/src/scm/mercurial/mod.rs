// SPDX-FileCopyrightText: 2024 Mathieu Fenniak <mathieu@fenniak.net>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use log::{debug, info};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::command::{CommandRunner as _, CommandRunnerDispatch, CommandSpec};
use crate::errors::{Precondition, RevisionParseError, ScmError, SubcommandErrors};
use crate::scm::revision_parser::parse_revisions;
use crate::scm::{Revision, Scm, ScmKind};
use crate::util::quote_symbol;

pub mod template;

use template::{LOG_TEMPLATE, MercurialLogGrammar};

static UNKNOWN_REVISION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"unknown revision '([^']*)'").expect("valid regex"));

/// Drives a Mercurial repository through the `hg` command line.
///
/// Revision identifiers that `hg` evaluates as revsets are always passed as quoted string symbols, so an identifier
/// from an untrusted source can't be interpreted as a revset expression or an option.
#[derive(Debug)]
pub struct MercurialScm {
    runner: CommandRunnerDispatch,
    executable: String,
    repository: Option<String>,
    cwd: Option<PathBuf>,
}

impl MercurialScm {
    pub const DEFAULT_REV: &'static str = "tip";
    pub const DEFAULT_EXECUTABLE: &'static str = "hg";

    #[must_use]
    pub fn new(runner: CommandRunnerDispatch) -> Self {
        Self {
            runner,
            executable: String::from(Self::DEFAULT_EXECUTABLE),
            repository: None,
            cwd: None,
        }
    }

    #[must_use]
    pub fn with_executable(mut self, executable: String) -> Self {
        self.executable = executable;
        self
    }

    /// Source repository (path or URL) used by [`Scm::clone_to`] and [`Scm::pull`].
    #[must_use]
    pub fn with_repository(mut self, repository: String) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Attach to an already checked-out working directory.
    #[must_use]
    pub fn attached_to(mut self, cwd: PathBuf) -> Self {
        self.cwd = Some(cwd);
        self
    }

    fn hg(&self) -> CommandSpec {
        // HGPLAIN disables user configuration that changes output (aliases, i18n, default templates...); it doesn't
        // touch the output encoding, which otherwise follows the caller's locale
        CommandSpec::new(&self.executable)
            .env("HGPLAIN", "1")
            .env("HGENCODING", "UTF-8")
    }

    fn require_cwd(&self, operation: &'static str) -> Result<&Path, ScmError> {
        self.cwd
            .as_deref()
            .ok_or(ScmError::PreconditionViolation {
                operation,
                requirement: Precondition::WorkingDirectoryRequired,
            })
    }

    /// Run `spec`, turning "unknown revision" aborts into [`ScmError::UnknownRevision`] naming the symbol hg reported.
    async fn run(&self, spec: CommandSpec) -> Result<String, ScmError> {
        match self.runner.run(&spec).await {
            Ok(stdout) => Ok(stdout),
            Err(SubcommandErrors::SubcommandFailed {
                command,
                code,
                stderr,
            }) => {
                let unknown = UNKNOWN_REVISION
                    .captures(&stderr)
                    .and_then(|c| c.get(1))
                    .map(|m| String::from(m.as_str()));
                match unknown {
                    Some(revision) => {
                        debug!("{command} reported unknown revision {revision:?}");
                        Err(ScmError::UnknownRevision { revision, stderr })
                    }
                    None => Err(SubcommandErrors::SubcommandFailed {
                        command,
                        code,
                        stderr,
                    }
                    .into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Run `hg log` over `revset`, returning the command line and its raw output.
    async fn log_output(
        &self,
        operation: &'static str,
        revset: &str,
    ) -> Result<(String, String), ScmError> {
        let cwd = self.require_cwd(operation)?;
        let spec = self
            .hg()
            .args(["log", "--rev", revset, "--template", LOG_TEMPLATE])
            .current_dir(cwd);
        let command = spec.to_string();
        let output = self.run(spec).await?;
        Ok((command, output))
    }

    async fn log(
        &self,
        operation: &'static str,
        revset: &str,
    ) -> Result<Vec<Revision>, ScmError> {
        let (command, output) = self.log_output(operation, revset).await?;
        parse_revisions(&MercurialLogGrammar, &output).map_err(|error| {
            ScmError::OutputParseFailed {
                command,
                error,
                output,
            }
        })
    }

    async fn log_single(
        &self,
        operation: &'static str,
        revset: &str,
        revision: &str,
    ) -> Result<Revision, ScmError> {
        let (command, output) = self.log_output(operation, revset).await?;
        let mut revs = match parse_revisions(&MercurialLogGrammar, &output) {
            Ok(revs) => revs,
            Err(error) => {
                return Err(ScmError::OutputParseFailed {
                    command,
                    error,
                    output,
                });
            }
        };
        match revs.len() {
            0 => Err(ScmError::UnknownRevision {
                revision: String::from(revision),
                stderr: String::new(),
            }),
            1 => Ok(revs.remove(0)),
            actual => Err(ScmError::OutputParseFailed {
                command,
                error: RevisionParseError::UnexpectedCount {
                    expected: 1,
                    actual,
                },
                output,
            }),
        }
    }
}

impl Scm for MercurialScm {
    fn kind(&self) -> ScmKind {
        ScmKind::Mercurial
    }

    fn default_rev(&self) -> &str {
        Self::DEFAULT_REV
    }

    fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    fn repository(&self) -> Option<&str> {
        self.repository.as_deref()
    }

    async fn clone_to(&mut self, destination: &Path, revision: &str) -> Result<(), ScmError> {
        if let Some(cwd) = &self.cwd {
            return Err(ScmError::PreconditionViolation {
                operation: "clone",
                requirement: Precondition::AlreadyAttached(cwd.clone()),
            });
        }
        let Some(repository) = &self.repository else {
            return Err(ScmError::PreconditionViolation {
                operation: "clone",
                requirement: Precondition::RepositoryRequired,
            });
        };

        let spec = self
            .hg()
            .arg("clone")
            .arg(format!("--rev={revision}"))
            .arg(format!("--updaterev={revision}"))
            .arg("--")
            .arg(repository)
            .arg(destination);
        self.run(spec).await?;

        info!("cloned {repository} at {revision} into {destination:?}");
        self.cwd = Some(destination.to_path_buf());
        Ok(())
    }

    async fn pull(&self, revision: &str) -> Result<(), ScmError> {
        let cwd = self.require_cwd("pull")?;
        let mut spec = self
            .hg()
            .arg("pull")
            .arg(format!("--rev={revision}"))
            .current_dir(cwd);
        // without an explicit source, hg pulls from the working copy's default path
        if let Some(repository) = &self.repository {
            spec = spec.arg("--").arg(repository);
        }
        self.run(spec).await?;
        Ok(())
    }

    async fn update(&self, revision: &str) -> Result<(), ScmError> {
        let cwd = self.require_cwd("update")?;
        let spec = self
            .hg()
            .args(["update", "--check", "--rev"])
            .arg(quote_symbol(revision))
            .current_dir(cwd);
        self.run(spec).await?;
        Ok(())
    }

    async fn get_current(&self) -> Result<Revision, ScmError> {
        self.log_single("get_current", ".", ".").await
    }

    async fn get_rev(&self, id: &str) -> Result<Revision, ScmError> {
        self.log_single("get_rev", &quote_symbol(id), id).await
    }

    async fn get_changes(&self, from: &str, to: &str) -> Result<Vec<Revision>, ScmError> {
        // ancestors of `to` that aren't ancestors of `from`, highest local revision number (newest) first
        let revset = format!(
            "sort(only({}, {}), -rev)",
            quote_symbol(to),
            quote_symbol(from)
        );
        self.log("get_changes", &revset).await
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use std::ffi::OsString;
    use std::path::{Path, PathBuf};

    use super::MercurialScm;
    use super::template::LOG_TEMPLATE;
    use crate::command::{CommandSpec, ScriptedCommandRunner, ScriptedResponse};
    use crate::errors::{Precondition, RevisionParseError, ScmError, SubcommandErrors};
    use crate::scm::Scm as _;

    const REV0: &str = "1b5e7bd6c1dbe5d8d5b8f4c4b7a1a8b2f7fa6d41";
    const REV1: &str = "8c2f1e2a7c95e1c1c3b0e0bb8e8e9f5e5b7aa102";
    const NULL: &str = "0000000000000000000000000000000000000000";

    fn log_entry(node: &str, parent: &str, desc: &str) -> String {
        format!(
            "{node}\x1f{parent} {NULL}\x1f\"carol\"\x1f1700000000 0\x1f{}\x1e",
            serde_json::to_string(desc).expect("string serializes")
        )
    }

    fn args(spec: &CommandSpec) -> Vec<String> {
        spec.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn attached(runner: &ScriptedCommandRunner) -> MercurialScm {
        MercurialScm::new(runner.clone().into()).attached_to(PathBuf::from("/work/repo"))
    }

    #[tokio::test]
    async fn clone_builds_command_and_attaches() -> Result<()> {
        let runner = ScriptedCommandRunner::new();
        runner.push_success("");
        let mut scm =
            MercurialScm::new(runner.clone().into()).with_repository(String::from("/srv/source"));

        scm.clone_to(Path::new("/work/dst"), REV0).await?;
        assert_eq!(scm.cwd(), Some(Path::new("/work/dst")));

        let requests = runner.requests();
        let rev_arg = format!("--rev={REV0}");
        let updaterev_arg = format!("--updaterev={REV0}");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].program, "hg");
        assert_eq!(requests[0].cwd, None);
        assert_eq!(
            args(&requests[0]),
            vec![
                "clone",
                rev_arg.as_str(),
                updaterev_arg.as_str(),
                "--",
                "/srv/source",
                "/work/dst",
            ]
        );
        assert!(
            requests[0]
                .env
                .contains(&(String::from("HGPLAIN"), String::from("1")))
        );
        assert!(
            requests[0]
                .env
                .contains(&(String::from("HGENCODING"), String::from("UTF-8")))
        );
        Ok(())
    }

    #[tokio::test]
    async fn failed_clone_stays_unattached() {
        let runner = ScriptedCommandRunner::new();
        runner.push_failure(255, "abort: destination '/work/dst' is not empty\n");
        let mut scm =
            MercurialScm::new(runner.clone().into()).with_repository(String::from("/srv/source"));

        let result = scm.clone_to(Path::new("/work/dst"), "tip").await;
        assert!(matches!(
            result,
            Err(ScmError::Subcommand(SubcommandErrors::SubcommandFailed {
                code: Some(255),
                ..
            }))
        ));
        assert_eq!(scm.cwd(), None);
    }

    #[tokio::test]
    async fn clone_twice_is_a_precondition_violation() {
        let runner = ScriptedCommandRunner::new();
        let mut scm = attached(&runner).with_repository(String::from("/srv/source"));
        let result = scm.clone_to(Path::new("/work/other"), "tip").await;
        assert!(matches!(
            result,
            Err(ScmError::PreconditionViolation {
                operation: "clone",
                requirement: Precondition::AlreadyAttached(_),
            })
        ));
        assert!(runner.requests().is_empty());
    }

    #[tokio::test]
    async fn clone_without_repository() {
        let runner = ScriptedCommandRunner::new();
        let mut scm = MercurialScm::new(runner.clone().into());
        let result = scm.clone_to(Path::new("/work/dst"), "tip").await;
        assert!(matches!(
            result,
            Err(ScmError::PreconditionViolation {
                requirement: Precondition::RepositoryRequired,
                ..
            })
        ));
        assert!(runner.requests().is_empty());
    }

    #[tokio::test]
    async fn operations_need_working_directory() {
        let runner = ScriptedCommandRunner::new();
        let scm =
            MercurialScm::new(runner.clone().into()).with_repository(String::from("/srv/source"));

        for result in [
            scm.pull("tip").await.map(|()| ()),
            scm.update("tip").await.map(|()| ()),
            scm.get_current().await.map(|_| ()),
            scm.get_rev(REV0).await.map(|_| ()),
            scm.get_changes(REV0, "tip").await.map(|_| ()),
        ] {
            assert!(
                matches!(
                    result,
                    Err(ScmError::PreconditionViolation {
                        requirement: Precondition::WorkingDirectoryRequired,
                        ..
                    })
                ),
                "unexpected {result:?}"
            );
        }
        assert!(runner.requests().is_empty());
    }

    #[tokio::test]
    async fn pull_uses_configured_repository() -> Result<()> {
        let runner = ScriptedCommandRunner::new();
        runner.push_success("").push_success("");
        attached(&runner).pull("tip").await?;
        attached(&runner)
            .with_repository(String::from("/srv/source"))
            .pull("tip")
            .await?;

        let requests = runner.requests();
        assert_eq!(args(&requests[0]), vec!["pull", "--rev=tip"]);
        assert_eq!(
            args(&requests[1]),
            vec!["pull", "--rev=tip", "--", "/srv/source"]
        );
        assert_eq!(requests[0].cwd, Some(PathBuf::from("/work/repo")));
        Ok(())
    }

    #[tokio::test]
    async fn update_checks_and_quotes() -> Result<()> {
        let runner = ScriptedCommandRunner::new();
        runner.push_success("");
        attached(&runner).update("--config=x").await?;
        assert_eq!(
            args(&runner.requests()[0]),
            vec!["update", "--check", "--rev", "'--config=x'"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn update_with_local_changes_fails() {
        let runner = ScriptedCommandRunner::new();
        runner.push_failure(255, "abort: uncommitted changes\n");
        let result = attached(&runner).update("tip").await;
        match result {
            Err(ScmError::Subcommand(SubcommandErrors::SubcommandFailed { stderr, .. })) => {
                assert!(stderr.contains("uncommitted changes"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_current_logs_working_directory_parent() -> Result<()> {
        let runner = ScriptedCommandRunner::new();
        runner.push_success(log_entry(REV0, NULL, "rev0"));
        let rev = attached(&runner).get_current().await?;
        assert_eq!(rev.id, REV0);
        assert_eq!(rev.message.as_deref(), Some("rev0"));
        assert_eq!(
            args(&runner.requests()[0]),
            vec!["log", "--rev", ".", "--template", LOG_TEMPLATE]
        );
        Ok(())
    }

    #[tokio::test]
    async fn get_rev_quotes_identifier() -> Result<()> {
        let runner = ScriptedCommandRunner::new();
        runner.push_success(log_entry(REV1, REV0, "rev1"));
        let rev = attached(&runner).get_rev(REV1).await?;
        assert_eq!(rev.parents, vec![String::from(REV0)]);
        assert_eq!(
            runner.requests()[0].args[2],
            OsString::from(format!("'{REV1}'"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn get_rev_unknown_from_diagnostic() {
        let runner = ScriptedCommandRunner::new();
        runner.push_failure(255, "abort: unknown revision 'deadbeef'!\n");
        match attached(&runner).get_rev("deadbeef").await {
            Err(ScmError::UnknownRevision { revision, stderr }) => {
                assert_eq!(revision, "deadbeef");
                assert!(stderr.contains("unknown revision"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_rev_unknown_from_empty_output() {
        let runner = ScriptedCommandRunner::new();
        runner.push_success("");
        assert!(matches!(
            attached(&runner).get_rev("deadbeef").await,
            Err(ScmError::UnknownRevision { .. })
        ));
    }

    #[tokio::test]
    async fn get_rev_rejects_multiple_results() {
        let runner = ScriptedCommandRunner::new();
        let stdout = format!(
            "{}{}",
            log_entry(REV1, REV0, "rev1"),
            log_entry(REV0, NULL, "rev0")
        );
        runner.push_success(stdout.clone());
        let result = attached(&runner)
            .with_executable(String::from("/opt/hg/bin/hg"))
            .get_rev(REV1)
            .await;
        match result {
            Err(ScmError::OutputParseFailed {
                command,
                error:
                    RevisionParseError::UnexpectedCount {
                        expected: 1,
                        actual: 2,
                    },
                output,
            }) => {
                assert_eq!(command, runner.requests()[0].to_string());
                assert!(command.starts_with("/opt/hg/bin/hg log --rev"));
                assert!(command.contains("--template"));
                assert_eq!(output, stdout);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_changes_revset_and_order() -> Result<()> {
        let runner = ScriptedCommandRunner::new();
        runner.push_success(log_entry(REV1, REV0, "rev1"));
        let changes = attached(&runner).get_changes(REV0, "tip").await?;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].id, REV1);
        assert_eq!(
            runner.requests()[0].args[2],
            OsString::from(format!("sort(only('tip', '{REV0}'), -rev)"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn get_changes_names_the_unknown_endpoint() {
        let runner = ScriptedCommandRunner::new();
        runner.push_failure(255, "abort: unknown revision 'nope'\n");
        match attached(&runner).get_changes(REV0, "nope").await {
            Err(ScmError::UnknownRevision { revision, .. }) => assert_eq!(revision, "nope"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_output_is_parse_failure() {
        let runner = ScriptedCommandRunner::new();
        runner.push_success("changeset:   0:1b5e7bd6c1db\n");
        assert!(matches!(
            attached(&runner).get_changes(REV0, "tip").await,
            Err(ScmError::OutputParseFailed { .. })
        ));
    }

    #[tokio::test]
    async fn spawn_failure_is_distinct() {
        let runner = ScriptedCommandRunner::new();
        runner.push(ScriptedResponse::SpawnFailure);
        assert!(matches!(
            attached(&runner).get_current().await,
            Err(ScmError::Subcommand(SubcommandErrors::UnableToStart { .. }))
        ));
    }

    #[tokio::test]
    async fn custom_executable() -> Result<()> {
        let runner = ScriptedCommandRunner::new();
        runner.push_success(log_entry(REV0, NULL, "rev0"));
        attached(&runner)
            .with_executable(String::from("/opt/hg/bin/hg"))
            .get_current()
            .await?;
        assert_eq!(runner.requests()[0].program, "/opt/hg/bin/hg");
        Ok(())
    }
}
