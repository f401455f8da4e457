//! Starting the privileged peer process

use super::channel::{BoxedReader, BoxedWriter};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use strap_errors::{ElevationError, Error};
use strap_types::WindowHandle;
use tokio::io::BufReader;
use tokio::process::{Child, Command};

/// Subcommand the host binary serves the peer protocol under
pub const PEER_SUBCOMMAND: &str = "elevated-peer";

/// Both ends of a freshly launched peer
pub struct PeerConnection {
    /// What was launched, for diagnostics
    pub program: String,
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
    /// Reaped on shutdown when the peer is a child process
    pub child: Option<Child>,
}

/// Launches the privileged peer and connects to it
#[async_trait]
pub trait PeerLauncher: Send + Sync {
    /// # Errors
    ///
    /// Returns `ElevationError::LaunchFailed` if the peer cannot be started.
    async fn launch(&self, parent: Option<WindowHandle>) -> Result<PeerConnection, Error>;
}

/// Spawns the peer as a child process speaking over stdin/stdout
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: String,
    args: Vec<String>,
}

impl ProcessLauncher {
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Run `exe elevated-peer` through an elevation prefix such as `sudo -n`
    ///
    /// An empty prefix runs the executable directly.
    #[must_use]
    pub fn with_prefix(prefix: &[String], exe: &Path) -> Self {
        let exe = exe.display().to_string();
        match prefix.split_first() {
            Some((program, rest)) => {
                let mut args = rest.to_vec();
                args.push(exe);
                args.push(PEER_SUBCOMMAND.to_string());
                Self::new(program.clone(), args)
            }
            None => Self::new(exe, vec![PEER_SUBCOMMAND.to_string()]),
        }
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait]
impl PeerLauncher for ProcessLauncher {
    async fn launch(&self, parent: Option<WindowHandle>) -> Result<PeerConnection, Error> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(parent) = parent {
            command.arg("--parent-window").arg(parent.0.to_string());
        }

        let launch_failed = |message: String| ElevationError::LaunchFailed {
            program: self.program.clone(),
            message,
        };

        let mut child = command.spawn().map_err(|e| launch_failed(e.to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| launch_failed("peer stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| launch_failed("peer stdout unavailable".to_string()))?;

        tracing::info!(program = %self.program, args = ?self.args, "launched elevated peer");
        Ok(PeerConnection {
            program: self.program.clone(),
            reader: Box::new(BufReader::new(stdout)),
            writer: Box::new(stdin),
            child: Some(child),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_wraps_the_executable() {
        let launcher =
            ProcessLauncher::with_prefix(&["sudo".into(), "-n".into()], Path::new("/usr/bin/strap"));
        assert_eq!(launcher.program(), "sudo");
        assert_eq!(launcher.args(), ["-n", "/usr/bin/strap", PEER_SUBCOMMAND]);

        let direct = ProcessLauncher::with_prefix(&[], Path::new("/usr/bin/strap"));
        assert_eq!(direct.program(), "/usr/bin/strap");
        assert_eq!(direct.args(), [PEER_SUBCOMMAND]);
    }

    #[tokio::test]
    async fn missing_program_fails_to_launch() {
        let launcher = ProcessLauncher::new("/nonexistent/strap-peer", Vec::new());
        let err = match launcher.launch(None).await {
            Ok(_) => panic!("launch should fail"),
            Err(err) => err,
        };
        assert!(matches!(
            err,
            Error::Elevation(ElevationError::LaunchFailed { .. })
        ));
    }
}
