//! Interactive client sessions driven by a leased credential.
//!
//! Secrets are passed to the client through its environment (`MYSQL_PWD`,
//! `SSHPASS`) rather than its argument list.

use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::TargetError;
use crate::broker::SecretString;
use crate::credentials::{DatabaseLogin, RemoteShellKey};

/// A foreground client process attached to the operator's terminal.
#[derive(Debug)]
pub struct InteractiveSession {
    program: PathBuf,
    args: Vec<String>,
    env: Vec<(&'static str, SecretString)>,
}

impl InteractiveSession {
    /// `mysql -h HOST -u USER` with the password in `MYSQL_PWD`.
    pub fn mysql(host: &str, login: &DatabaseLogin) -> Result<Self, TargetError> {
        let program = which::which("mysql").map_err(|_| {
            TargetError::new("ClientNotFound", "mysql client not found on PATH")
        })?;

        Ok(Self {
            program,
            args: vec!["-h".into(), host.into(), "-u".into(), login.username.clone()],
            env: vec![("MYSQL_PWD", login.password.clone())],
        })
    }

    /// `ssh user@ip`, through `sshpass` when it is installed so the one-time key is typed for the operator.
    pub fn ssh(key: &RemoteShellKey) -> Self {
        Self::ssh_with(key, which::which("sshpass").ok())
    }

    fn ssh_with(key: &RemoteShellKey, sshpass: Option<PathBuf>) -> Self {
        let destination = format!("{}@{}", key.username, key.ip);
        let port = key.port.to_string();

        match sshpass {
            Some(sshpass) => Self {
                program: sshpass,
                args: [
                    "-e",
                    "ssh",
                    "-p",
                    port.as_str(),
                    "-o",
                    "PubkeyAuthentication=no",
                    "-o",
                    "UserKnownHostsFile=/dev/null",
                    "-o",
                    "StrictHostKeyChecking=no",
                    destination.as_str(),
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
                env: vec![("SSHPASS", key.key.clone())],
            },
            None => {
                warn!("Install `sshpass` to have the one-time password typed for you");
                info!("Enter the one-time password shown above when ssh prompts for it");
                Self {
                    program: PathBuf::from("ssh"),
                    args: vec!["-p".into(), port, destination],
                    env: Vec::new(),
                }
            }
        }
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Start the client with inherited stdio. The child is killed if its handle is dropped.
    pub fn spawn(&self) -> Result<Child, TargetError> {
        debug!(program = %self.program.display(), args = ?self.args, "Starting interactive client");

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        for (name, value) in &self.env {
            command.env(name, value.expose_secret());
        }

        command.spawn().map_err(|e| {
            TargetError::new("SpawnFailed", format!("Failed to start {}: {}", self.program.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_key() -> RemoteShellKey {
        RemoteShellKey {
            key: "0f1e2d3c".into(),
            key_type: Some("otp".into()),
            username: "breakglass".into(),
            ip: "10.0.0.5".into(),
            port: 22,
        }
    }

    #[test]
    fn test_ssh_through_sshpass_keeps_key_off_argv() {
        let session = InteractiveSession::ssh_with(&shell_key(), Some(PathBuf::from("/usr/bin/sshpass")));

        assert_eq!(session.program(), &PathBuf::from("/usr/bin/sshpass"));
        assert_eq!(session.args()[0], "-e");
        assert_eq!(session.args().last().unwrap(), "breakglass@10.0.0.5");
        assert!(!session.args().iter().any(|a| a.contains("0f1e2d3c")));
        assert_eq!(session.env[0].0, "SSHPASS");
    }

    #[test]
    fn test_plain_ssh_without_sshpass() {
        let session = InteractiveSession::ssh_with(&shell_key(), None);

        assert_eq!(session.program(), &PathBuf::from("ssh"));
        assert_eq!(session.args(), ["-p", "22", "breakglass@10.0.0.5"]);
        assert!(session.env.is_empty());
    }

    #[test]
    fn test_debug_redacts_environment() {
        let session = InteractiveSession::ssh_with(&shell_key(), Some(PathBuf::from("sshpass")));
        assert!(!format!("{:?}", session).contains("0f1e2d3c"));
    }

    #[tokio::test]
    async fn test_spawn_missing_program_is_reported() {
        let session = InteractiveSession {
            program: PathBuf::from("/nonexistent/breakglass-client"),
            args: vec![],
            env: vec![],
        };
        let err = session.spawn().unwrap_err();
        assert_eq!(err.code, "SpawnFailed");
    }
}
