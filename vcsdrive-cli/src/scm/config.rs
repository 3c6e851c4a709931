// SPDX-FileCopyrightText: 2024 Mathieu Fenniak <mathieu@fenniak.net>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = ".config/vcsdrive.toml";

/// Backend selection and location, usually loaded from TOML:
///
/// ```toml
/// type = "mercurial"
/// repository = "https://hg.example.com/project"
/// ```
///
/// Set `repository` to clone from a source, or `cwd` to operate on an existing working directory.
#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ScmConfig {
    /// Backend kind, eg. `mercurial`; validated when the backend is created, not when the config is read.
    #[serde(rename = "type", default)]
    pub kind: String,
    pub repository: Option<String>,
    pub cwd: Option<PathBuf>,
    /// Override for the backend's executable (eg. a specific `hg` install).
    pub executable: Option<String>,
}

impl ScmConfig {
    /// Layer explicitly provided values over this config.
    #[must_use]
    pub fn merge(mut self, overrides: ScmConfig) -> Self {
        if !overrides.kind.is_empty() {
            self.kind = overrides.kind;
        }
        if overrides.repository.is_some() {
            self.repository = overrides.repository;
        }
        if overrides.cwd.is_some() {
            self.cwd = overrides.cwd;
        }
        if overrides.executable.is_some() {
            self.executable = overrides.executable;
        }
        self
    }
}

/// Read the config at `override_config`, or at [`DEFAULT_CONFIG_PATH`] if it exists.
///
/// A missing default file yields an empty config; a missing override file is an error.
pub fn get_scm_config(override_config: Option<&Path>) -> Result<ScmConfig, ConfigError> {
    let path = override_config.unwrap_or(Path::new(DEFAULT_CONFIG_PATH));
    let exists = fs::exists(path).map_err(|error| ConfigError::Read {
        path: path.to_path_buf(),
        error,
    })?;
    if exists {
        let contents = fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.to_path_buf(),
            error,
        })?;
        toml::from_str(&contents).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    } else {
        if let Some(override_config) = override_config {
            return Err(ConfigError::MissingOverride(override_config.to_path_buf()));
        }
        Ok(ScmConfig::default())
    }
}
