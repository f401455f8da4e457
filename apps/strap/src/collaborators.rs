//! Shell-command backed probe, installer and restarter, and the console observer
//!
//! Catalog packages declare their commands in `properties`: `detect` for the
//! probe and one key per action for the installer. Commands run through
//! `sh -c` with the package described in `STRAP_*` environment variables.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strap_engine::{
    ActionOutcome, ActionRequest, Decision, Observer, PackageInstaller, ProgressSink, Restarter,
    StateProbe,
};
use strap_errors::{Error, PackageError};
use strap_types::{
    ActionState, Package, PackageState, ProbeResult, RestartDisposition, Status, Version,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Exit status installers use to say they succeeded but need a restart
pub const EXIT_RESTART_REQUIRED: i32 = 3010;

/// Status reported when an installer was killed by a signal
const EXIT_KILLED: i32 = 1603;

fn shell(script: &str, package: &Package) -> Command {
    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(script)
        .env("STRAP_PACKAGE_ID", &package.id)
        .env("STRAP_PACKAGE_KIND", package.kind.to_string())
        .stdin(Stdio::null())
        .kill_on_drop(true);
    if let Some(version) = &package.version {
        command.env("STRAP_PACKAGE_VERSION", version.to_string());
    }
    command
}

/// Probe running the package's `detect` command
///
/// Exit status 0 means present, 1 absent, 2 cached. A version printed on the
/// first stdout line is reported as the installed version.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandProbe;

#[async_trait]
impl StateProbe for CommandProbe {
    async fn probe(&self, package: &Package) -> Result<ProbeResult, Error> {
        let probe_failed = |message: String| PackageError::ProbeFailed {
            id: package.id.clone(),
            message,
        };
        let script = package
            .property("detect")
            .ok_or_else(|| probe_failed("no detect command declared".to_string()))?;

        let output = shell(script, package)
            .stderr(Stdio::inherit())
            .output()
            .await
            .map_err(|e| probe_failed(e.to_string()))?;

        let state = match output.status.code() {
            Some(0) => PackageState::Present,
            Some(1) => PackageState::Absent,
            Some(2) => PackageState::Cached,
            Some(code) => return Err(probe_failed(format!("detect exited with {code}")).into()),
            None => return Err(probe_failed("detect was killed".to_string()).into()),
        };
        let version = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .and_then(|line| Version::parse(line.trim()).ok());

        tracing::debug!(package = %package.id, %state, ?version, "probed");
        Ok(match version {
            Some(version) => ProbeResult::new(state).with_version(version),
            None => ProbeResult::new(state),
        })
    }
}

/// Installer running the package's command for each action
///
/// Stdout lines of the form `progress <percent>` are forwarded as progress
/// and a `restart` line marks the action as needing a restart. Exit status
/// 3010 means the same where the platform keeps full exit codes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandInstaller;

impl CommandInstaller {
    /// Property holding the command for `action`, with fallbacks for
    /// actions that usually share a command
    pub fn command_for(package: &Package, action: ActionState) -> Option<&str> {
        let keys: &[&str] = match action {
            ActionState::None => &[],
            ActionState::Install => &["install"],
            ActionState::AdminInstall => &["admin_install", "install"],
            ActionState::Uninstall => &["uninstall"],
            ActionState::Maintenance => &["repair"],
            ActionState::Recache => &["cache"],
            ActionState::MinorUpgrade | ActionState::MajorUpgrade => &["upgrade", "install"],
            ActionState::Patch => &["patch"],
        };
        keys.iter().find_map(|key| package.property(key))
    }
}

const RESTART_LINE: &str = "restart";

fn parse_progress(line: &str) -> Option<u8> {
    let percent: u16 = line.trim().strip_prefix("progress")?.trim().parse().ok()?;
    u8::try_from(percent.min(100)).ok()
}

#[async_trait]
impl PackageInstaller for CommandInstaller {
    async fn execute(
        &self,
        request: &ActionRequest,
        progress: &dyn ProgressSink,
    ) -> Result<ActionOutcome, Error> {
        let package = &request.package;
        let script = Self::command_for(package, request.action).ok_or_else(|| {
            PackageError::InstallerUnavailable {
                id: package.id.clone(),
                message: format!("no command declared for {}", request.action),
            }
        })?;

        let mut command = shell(script, package);
        command
            .env("STRAP_ACTION", request.action.as_str())
            .env("STRAP_ROLLBACK", if request.rollback { "1" } else { "0" })
            .env("STRAP_DISPLAY", format!("{:?}", request.display).to_lowercase())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(version) = &request.version {
            command.env("STRAP_TARGET_VERSION", version.to_string());
        }

        let unavailable = |message: String| PackageError::InstallerUnavailable {
            id: package.id.clone(),
            message,
        };
        let mut child = command.spawn().map_err(|e| unavailable(e.to_string()))?;
        tracing::info!(package = %package.id, action = %request.action, rollback = request.rollback, "running installer command");

        let mut restart_required = false;
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if line.trim() == RESTART_LINE {
                    restart_required = true;
                    continue;
                }
                let Some(percent) = parse_progress(&line) else {
                    continue;
                };
                if !progress.report(percent) {
                    tracing::warn!(package = %package.id, "cancelling installer command");
                    let _ = child.kill().await;
                    return Err(Error::Cancelled);
                }
            }
        }

        let status = child.wait().await?;
        Ok(match status.code() {
            Some(0) => ActionOutcome::success().with_restart(restart_required),
            Some(EXIT_RESTART_REQUIRED) => ActionOutcome::success().with_restart(true),
            Some(code) => ActionOutcome::failed(code),
            None => ActionOutcome::failed(EXIT_KILLED),
        })
    }
}

/// Restarter running a fixed command, `shutdown -r +1` by default
#[derive(Debug, Clone)]
pub struct CommandRestarter {
    program: String,
    args: Vec<String>,
}

impl Default for CommandRestarter {
    fn default() -> Self {
        Self {
            program: "shutdown".to_string(),
            args: vec!["-r".to_string(), "+1".to_string()],
        }
    }
}

#[async_trait]
impl Restarter for CommandRestarter {
    async fn initiate(&self) -> Result<(), Error> {
        let status = Command::new(&self.program).args(&self.args).status().await?;
        if status.success() {
            tracing::info!(program = %self.program, "restart scheduled");
            Ok(())
        } else {
            Err(Error::internal(format!(
                "{} exited with {status}",
                self.program
            )))
        }
    }
}

/// Observer for an interactive or scripted console session
///
/// Once the cancel flag is set (by Ctrl-C) every decision point answers
/// `Cancel`. Prompts are only shown when a user is attended.
pub struct ConsoleObserver {
    cancelled: Arc<AtomicBool>,
    interactive: bool,
}

impl ConsoleObserver {
    pub fn new(cancelled: Arc<AtomicBool>, interactive: bool) -> Self {
        Self {
            cancelled,
            interactive,
        }
    }

    fn decision(&self) -> Decision {
        if self.cancelled.load(Ordering::SeqCst) {
            Decision::Cancel
        } else {
            Decision::Continue
        }
    }
}

impl Observer for ConsoleObserver {
    fn on_detect_begin(&self, _package_count: usize) -> Decision {
        self.decision()
    }

    fn on_detect_package_begin(&self, _package_id: &str) -> Decision {
        self.decision()
    }

    fn on_plan_begin(&self, _package_count: usize) -> Decision {
        self.decision()
    }

    fn on_plan_package_begin(
        &self,
        _package_id: &str,
        _request: &mut strap_types::RequestState,
    ) -> Decision {
        self.decision()
    }

    fn on_apply_begin(&self) -> Decision {
        self.decision()
    }

    fn on_elevate_begin(&self) -> Decision {
        self.decision()
    }

    fn on_register_begin(&self) -> Decision {
        self.decision()
    }

    fn on_execute_begin(&self, _package_count: usize) -> Decision {
        self.decision()
    }

    fn on_execute_package_begin(
        &self,
        _package_id: &str,
        _action: ActionState,
        _rollback: bool,
    ) -> Decision {
        self.decision()
    }

    fn on_execute_progress(&self, _package_id: &str, _package: u8, _overall: u8) -> Decision {
        self.decision()
    }

    fn on_error(&self, package_id: &str, error: &Error, attempt: u32) -> Decision {
        if self.cancelled.load(Ordering::SeqCst) {
            return Decision::Cancel;
        }
        // One automatic retry for transient failures
        if attempt == 1 && strap_errors::UserFacingError::is_retryable(error) {
            tracing::info!(package = package_id, "retrying after transient failure");
            return Decision::Retry;
        }
        Decision::Continue
    }

    fn on_restart_required(&self) -> bool {
        if !self.interactive || self.cancelled.load(Ordering::SeqCst) {
            return false;
        }
        let term = console::Term::stderr();
        if term
            .write_str("A restart is required to finish. Restart now? [y/N] ")
            .is_err()
        {
            return false;
        }
        off_runtime(|| term.read_line()).is_ok_and(|answer| confirms_restart(&answer))
    }

    fn on_apply_complete(&self, status: Status, restart: RestartDisposition) {
        tracing::debug!(%status, ?restart, "apply finished");
    }
}

/// Run a blocking console read without stalling the other runtime tasks
fn off_runtime<T>(read: impl FnOnce() -> T) -> T {
    use tokio::runtime::{Handle, RuntimeFlavor};
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(read)
        }
        _ => read(),
    }
}

fn confirms_restart(answer: &str) -> bool {
    matches!(answer.trim(), "y" | "Y" | "yes")
}
