use std::process::Command;

use log::debug;

use super::ConfigError;

/// Runs `password_cmd` and returns the first line it prints.
pub fn run_password_cmd(password_cmd: &str) -> Result<String, ConfigError> {
    let mut cmd_parts = password_cmd.split_whitespace();
    let mut cmd = Command::new(cmd_parts.next().ok_or(ConfigError::EmptyPasswordCommand)?);
    cmd.args(cmd_parts);
    debug!("running password_cmd {password_cmd:?}");
    let output = cmd.output().map_err(ConfigError::PasswordCommand)?;
    if !output.status.success() {
        return Err(ConfigError::PasswordCommandFailed(output.status));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    match stdout.lines().next() {
        Some(password) if !password.is_empty() => Ok(password.to_string()),
        _ => Err(ConfigError::NoPassword),
    }
}
