//! Passwordless access to the privileged sampler.
//!
//! The grant is a sudoers drop-in scoped to the sampler's absolute path,
//! written once through the macOS administrator dialog.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::sampler::LaunchSpec;
use crate::config::{PermissionConfig, SamplerConfig};
use crate::error::{CollectorError, Result};

const OSASCRIPT: &str = "/usr/bin/osascript";

pub struct PermissionGate {
    sudo: PathBuf,
    binary: PathBuf,
    policy_file: PathBuf,
}

impl PermissionGate {
    pub fn new(sampler: &SamplerConfig, permission: &PermissionConfig) -> Self {
        PermissionGate {
            sudo: sampler.sudo.clone(),
            binary: sampler.binary.clone(),
            policy_file: permission.policy_file.clone(),
        }
    }

    pub fn check_spec(&self) -> LaunchSpec {
        LaunchSpec::single_sample(&self.sudo, &self.binary)
    }

    /// Run a one-shot 1 ms sample through `sudo -n`. Succeeds only when no
    /// password prompt would have been needed.
    pub fn check(&self) -> bool {
        let spec = self.check_spec();
        let status = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(status) => status.success(),
            Err(e) => {
                tracing::debug!("permission check could not run {}: {e}", self.sudo.display());
                false
            }
        }
    }

    /// Show the administrator dialog and install the policy file.
    ///
    /// Blocks until the dialog is dismissed. Not retried on failure.
    pub fn request_setup(&self) -> Result<()> {
        let user = current_user()?;
        let script = setup_script(&user, &self.binary, &self.policy_file)?;

        let output = Command::new(OSASCRIPT)
            .args(["-e", &script])
            .stdin(Stdio::null())
            .output()
            .map_err(|source| CollectorError::Launch {
                program: OSASCRIPT.to_string(),
                source,
            })?;

        if output.status.success() {
            tracing::info!(
                "installed sampler policy {} for {user}",
                self.policy_file.display()
            );
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(CollectorError::Setup(if stderr.is_empty() {
                format!("dialog exited with {}", output.status)
            } else {
                stderr
            }))
        }
    }
}

fn current_user() -> Result<String> {
    ["USER", "LOGNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .ok_or_else(|| CollectorError::Setup("cannot determine the current user".to_string()))
}

fn is_plain_account_name(user: &str) -> bool {
    !user.is_empty()
        && !user.starts_with('-')
        && user
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Absolute and free of characters that need quoting in sudoers or sh.
fn checked_path(path: &Path) -> Result<&str> {
    let text = path
        .to_str()
        .ok_or_else(|| CollectorError::InvalidPolicy(format!("{} is not UTF-8", path.display())))?;
    if !path.is_absolute() {
        return Err(CollectorError::InvalidPolicy(format!(
            "{text} is not an absolute path"
        )));
    }
    if text
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '\'' | '"' | '\\' | ',' | ':' | '=' | '*'))
    {
        return Err(CollectorError::InvalidPolicy(format!(
            "{text} contains characters that cannot be used in a policy"
        )));
    }
    Ok(text)
}

/// The sudoers line granting `user` passwordless use of exactly `binary`.
pub fn policy_entry(user: &str, binary: &Path) -> Result<String> {
    if !is_plain_account_name(user) {
        return Err(CollectorError::InvalidPolicy(format!(
            "{user:?} is not a plain account name"
        )));
    }
    let binary = checked_path(binary)?;
    Ok(format!("{user} ALL=(ALL) NOPASSWD: {binary}"))
}

/// Shell command run as root: write the entry, restrict it to 0440 and
/// validate it; an invalid file is removed again.
pub fn setup_command(user: &str, binary: &Path, policy_file: &Path) -> Result<String> {
    let entry = policy_entry(user, binary)?;
    let file = checked_path(policy_file)?;
    let dir = policy_file
        .parent()
        .and_then(Path::to_str)
        .ok_or_else(|| CollectorError::InvalidPolicy(format!("{file} has no parent directory")))?;

    Ok(format!(
        "/bin/mkdir -p {dir} && /usr/bin/printf '%s\\n' '{entry}' > {file} && \
         /bin/chmod 440 {file} && /usr/sbin/visudo -cf {file} || \
         {{ /bin/rm -f {file}; exit 1; }}"
    ))
}

fn applescript_quote(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn setup_script(user: &str, binary: &Path, policy_file: &Path) -> Result<String> {
    let command = setup_command(user, binary, policy_file)?;
    Ok(format!(
        "do shell script \"{}\" with administrator privileges",
        applescript_quote(&command)
    ))
}
