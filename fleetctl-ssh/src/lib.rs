//! Remote access to cluster members through the system `ssh`/`scp` binaries.
//!
//! Nothing here implements a protocol: commands are passed through to the
//! standard tools with host-key checking disabled, the same invocation the
//! tool has always used for freshly created cloud hosts whose keys rotate on
//! every launch.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::debug;

use fleetctl_core::{FleetError, Result};

/// Interpreter used by `run` for a given script path, by extension
pub fn interpreter_for(script: &Path) -> Result<&'static str> {
    match script.extension().and_then(|e| e.to_str()) {
        Some("py") => Ok("python"),
        Some("sh") => Ok("bash"),
        _ => Err(FleetError::ScriptKind {
            path: script.to_path_buf(),
        }),
    }
}

/// Configured ssh/scp runner for one identity and login user
#[derive(Debug, Clone)]
pub struct RemoteShell {
    identity: PathBuf,
    user: String,
    ssh_program: OsString,
    scp_program: OsString,
}

impl RemoteShell {
    pub fn new(identity: impl Into<PathBuf>, user: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            user: user.into(),
            ssh_program: OsString::from("ssh"),
            scp_program: OsString::from("scp"),
        }
    }

    /// Substitute the programs to invoke (tests use recording stubs)
    pub fn with_programs(
        mut self,
        ssh: impl Into<OsString>,
        scp: impl Into<OsString>,
    ) -> Self {
        self.ssh_program = ssh.into();
        self.scp_program = scp.into();
        self
    }

    /// Verify both programs resolve on PATH before any remote work starts
    pub fn check_available(&self) -> Result<()> {
        for program in [&self.ssh_program, &self.scp_program] {
            which::which(program).map_err(|_| FleetError::MissingTool {
                name: program.to_string_lossy().into_owned(),
            })?;
        }
        Ok(())
    }

    /// Options shared by every invocation. Cluster hosts are created and
    /// destroyed freely, so host keys are neither checked nor recorded.
    fn common_options(&self) -> Vec<OsString> {
        vec![
            OsString::from("-o"),
            OsString::from("StrictHostKeyChecking=no"),
            OsString::from("-o"),
            OsString::from("UserKnownHostsFile=/dev/null"),
            OsString::from("-i"),
            self.identity.clone().into_os_string(),
        ]
    }

    fn target(&self, host: &str) -> String {
        format!("{}@{}", self.user, host)
    }

    async fn run_checked(&self, host: &str, mut command: Command) -> Result<String> {
        let program = command.as_std().get_program().to_string_lossy().into_owned();
        let output = command
            .output()
            .await
            .map_err(|e| FleetError::remote(host, format!("failed to spawn {}: {}", program, e)))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = match stderr.trim() {
                "" => format!("exit code {:?}", output.status.code()),
                detail => detail.to_string(),
            };
            Err(FleetError::remote(host, reason))
        }
    }

    /// Copy a local file into the remote home directory, overwriting
    pub async fn copy(&self, host: &str, path: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.scp_program);
        cmd.args(self.common_options())
            .arg(path)
            .arg(format!("{}:", self.target(host)));
        debug!(host, path = %path.display(), "scp");
        self.run_checked(host, cmd).await?;
        Ok(())
    }

    /// Run a command on the remote host and return its stdout
    pub async fn exec(&self, host: &str, remote_command: &str) -> Result<String> {
        let mut cmd = Command::new(&self.ssh_program);
        cmd.args(self.common_options())
            .arg(self.target(host))
            .arg(remote_command);
        debug!(host, remote_command, "ssh");
        self.run_checked(host, cmd).await
    }

    /// Start `command` on the host inside a detached tmux session, so it
    /// survives the ssh connection closing
    pub async fn launch_detached(&self, host: &str, session: &str, command: &str) -> Result<()> {
        let quoted = shlex::try_quote(command)
            .map_err(|e| FleetError::remote(host, format!("unquotable command: {}", e)))?;
        let remote = format!("tmux new-session -d -s {} {}", session, quoted);
        self.exec(host, &remote).await?;
        Ok(())
    }

    /// Kill the named tmux session on the host
    pub async fn kill_session(&self, host: &str, session: &str) -> Result<()> {
        self.exec(host, &format!("tmux kill-session -t {}", session))
            .await?;
        Ok(())
    }
}
