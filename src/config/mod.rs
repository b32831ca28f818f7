mod auth;
mod descriptor;

use std::{
    env, io,
    path::{Path, PathBuf},
    process::ExitStatus,
};

use derive_getters::Getters;
use log::debug;
use serde::Deserialize;
use thiserror::Error;

pub use descriptor::ConnectionDescriptor;

use crate::imap::TlsMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("password_cmd is empty")]
    EmptyPasswordCommand,
    #[error("cannot run password_cmd: {0}")]
    PasswordCommand(io::Error),
    #[error("password_cmd exited with {0}")]
    PasswordCommandFailed(ExitStatus),
    #[error("password_cmd did not print a password")]
    NoPassword,
}

/// Settings from the optional config file. Command line options win over
/// everything in here.
#[derive(Debug, Default, Deserialize, Getters)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    #[getter(skip)]
    tls: Option<TlsMode>,
    #[getter(skip)]
    password_cmd: Option<String>,
    /// Mailboxes whose own messages are never archived.
    omit: Vec<String>,
    #[getter(skip)]
    days: Option<u32>,
}

impl Config {
    /// Reads `file`, or the default location if none is given. Only a
    /// missing default file is fine, it means defaults for everything.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(file) = file {
            return Self::read(file);
        }
        match default_location() {
            Some(file) if file.exists() => Self::read(&file),
            _ => {
                debug!("no config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        debug!("reading config from {}", path.display());
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn tls(&self) -> Option<TlsMode> {
        self.tls
    }

    pub fn days(&self) -> Option<u32> {
        self.days
    }

    /// Password printed by `password_cmd`, if one is configured.
    pub fn password(&self) -> Option<Result<String, ConfigError>> {
        self.password_cmd.as_deref().map(auth::run_password_cmd)
    }
}

fn default_location() -> Option<PathBuf> {
    let mut config_dir = match env::var_os("XDG_CONFIG_HOME") {
        Some(config_home) if !config_home.is_empty() => PathBuf::from(config_home),
        _ => {
            let mut config_home = PathBuf::from(env::var_os("HOME")?);
            config_home.push(".config");
            config_home
        }
    };
    config_dir.push(env!("CARGO_PKG_NAME"));
    config_dir.push("config.toml");
    Some(config_dir)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use assertables::*;
    use rstest::*;
    use tempfile::NamedTempFile;

    use super::*;

    fn config_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file should be creatable");
        file.write_all(contents.as_bytes())
            .expect("temp file should be writable");
        file
    }

    #[rstest]
    fn test_reads_all_keys() {
        let file = config_file(
            r#"
            tls = "starttls"
            password_cmd = "echo secret"
            omit = ["INBOX.Spam", "INBOX.Keep"]
            days = 90
            "#,
        );

        let config = assert_ok!(Config::load(Some(file.path())));

        assert_eq!(config.tls(), Some(TlsMode::Starttls));
        assert_eq!(config.omit(), &["INBOX.Spam", "INBOX.Keep"]);
        assert_eq!(config.days(), Some(90));
        assert_eq!(assert_some!(config.password()).ok().as_deref(), Some("secret"));
    }

    #[rstest]
    fn test_missing_keys_default() {
        let file = config_file("");

        let config = assert_ok!(Config::load(Some(file.path())));

        assert_none!(config.tls());
        assert!(config.omit().is_empty());
        assert_none!(config.password());
    }

    #[rstest]
    fn test_unknown_key_is_an_error() {
        let file = config_file("tsl = \"plain\"\n");

        let error = assert_err!(Config::load(Some(file.path())));

        assert!(matches!(error, ConfigError::Parse { .. }));
    }

    #[rstest]
    fn test_named_file_must_exist() {
        let dir = tempfile::tempdir().expect("temp dir should be creatable");

        let error = assert_err!(Config::load(Some(&dir.path().join("missing.toml"))));

        assert!(matches!(error, ConfigError::Read { .. }));
    }
}
