//! Scripted collaborators for exercising the engine without real installers

use crate::elevation::{serve_peer, PeerConnection, PeerLauncher};
use crate::installer::{
    ActionOutcome, ActionRequest, PackageInstaller, ProgressSink, Restarter, StateProbe,
};
use crate::observer::{Decision, Observer};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use strap_errors::{ElevationError, Error, PackageError};
use strap_types::{
    ActionState, Package, PackageOutcome, PackageState, PlanEntry, ProbeResult, RequestState,
    RestartDisposition, Status, Version, WindowHandle,
};
use tokio::io::BufReader;
use tokio::task::AbortHandle;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Probe answering from a fixed table; unlisted packages are `Absent`
#[derive(Default)]
pub struct ScriptedProbe {
    results: Mutex<HashMap<String, Result<ProbeResult, Error>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProbe {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_state(self, package_id: &str, state: PackageState) -> Self {
        self.set(package_id, Ok(ProbeResult::new(state)));
        self
    }

    #[must_use]
    pub fn with_version(self, package_id: &str, state: PackageState, version: Version) -> Self {
        self.set(package_id, Ok(ProbeResult::new(state).with_version(version)));
        self
    }

    #[must_use]
    pub fn with_failure(self, package_id: &str, message: &str) -> Self {
        let err = PackageError::ProbeFailed {
            id: package_id.to_string(),
            message: message.to_string(),
        };
        self.set(package_id, Err(err.into()));
        self
    }

    /// Change the answer for later probes
    pub fn set(&self, package_id: &str, result: Result<ProbeResult, Error>) {
        lock(&self.results).insert(package_id.to_string(), result);
    }

    /// Package ids in probe order
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl StateProbe for ScriptedProbe {
    async fn probe(&self, package: &Package) -> Result<ProbeResult, Error> {
        lock(&self.calls).push(package.id.clone());
        lock(&self.results)
            .get(&package.id)
            .cloned()
            .unwrap_or_else(|| Ok(ProbeResult::new(PackageState::Absent)))
    }
}

/// One request seen by a [`ScriptedInstaller`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerCall {
    pub package_id: String,
    pub action: ActionState,
    pub rollback: bool,
    pub version: Option<Version>,
}

/// Installer replaying queued outcomes per package and action
///
/// Each call first reports the configured progress steps, stopping with
/// `Error::Cancelled` when the sink asks to cancel, then pops the next
/// scripted result. An empty queue means success.
pub struct ScriptedInstaller {
    scripts: Mutex<HashMap<(String, ActionState), VecDeque<Result<ActionOutcome, Error>>>>,
    calls: Mutex<Vec<InstallerCall>>,
    progress: Vec<u8>,
}

impl Default for ScriptedInstaller {
    fn default() -> Self {
        Self {
            scripts: Mutex::default(),
            calls: Mutex::default(),
            progress: vec![50, 100],
        }
    }
}

impl ScriptedInstaller {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_progress(mut self, steps: Vec<u8>) -> Self {
        self.progress = steps;
        self
    }

    #[must_use]
    pub fn outcome(self, package_id: &str, action: ActionState, outcome: ActionOutcome) -> Self {
        self.push(package_id, action, Ok(outcome));
        self
    }

    /// Fail the next `times` calls with `status`
    #[must_use]
    pub fn fail(self, package_id: &str, action: ActionState, status: i32, times: usize) -> Self {
        for _ in 0..times {
            self.push(package_id, action, Ok(ActionOutcome::failed(status)));
        }
        self
    }

    #[must_use]
    pub fn error(self, package_id: &str, action: ActionState, err: Error) -> Self {
        self.push(package_id, action, Err(err));
        self
    }

    fn push(&self, package_id: &str, action: ActionState, result: Result<ActionOutcome, Error>) {
        lock(&self.scripts)
            .entry((package_id.to_string(), action))
            .or_default()
            .push_back(result);
    }

    #[must_use]
    pub fn calls(&self) -> Vec<InstallerCall> {
        lock(&self.calls).clone()
    }

    /// `(package, action)` pairs in call order
    #[must_use]
    pub fn actions(&self) -> Vec<(String, ActionState)> {
        lock(&self.calls)
            .iter()
            .map(|call| (call.package_id.clone(), call.action))
            .collect()
    }
}

#[async_trait]
impl PackageInstaller for ScriptedInstaller {
    async fn execute(
        &self,
        request: &ActionRequest,
        progress: &dyn ProgressSink,
    ) -> Result<ActionOutcome, Error> {
        lock(&self.calls).push(InstallerCall {
            package_id: request.package.id.clone(),
            action: request.action,
            rollback: request.rollback,
            version: request.version.clone(),
        });

        for &step in &self.progress {
            if !progress.report(step) {
                return Err(Error::Cancelled);
            }
        }

        lock(&self.scripts)
            .get_mut(&(request.package.id.clone(), request.action))
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(ActionOutcome::success()))
    }
}

/// Observer recording every callback as a short string
///
/// Callbacks are named `phase_event[:package][:detail]`, for example
/// `execute_package_begin:b` or `apply_complete:failed`. A callback whose
/// name equals the configured cancel point answers `Cancel`.
#[derive(Default)]
pub struct RecordingObserver {
    calls: Mutex<Vec<String>>,
    progress: Mutex<Vec<(String, u8, u8)>>,
    cancel_at: Option<String>,
    error_answers: Mutex<VecDeque<Decision>>,
    restart_now: bool,
    overrides: HashMap<String, RequestState>,
}

impl RecordingObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn cancel_at(mut self, point: impl Into<String>) -> Self {
        self.cancel_at = Some(point.into());
        self
    }

    /// Answers for successive `on_error` calls; `Continue` once exhausted
    #[must_use]
    pub fn on_error_answers(self, answers: impl IntoIterator<Item = Decision>) -> Self {
        lock(&self.error_answers).extend(answers);
        self
    }

    #[must_use]
    pub fn restart_now(mut self, restart_now: bool) -> Self {
        self.restart_now = restart_now;
        self
    }

    /// Replace the default request for one package during planning
    #[must_use]
    pub fn request(mut self, package_id: &str, request: RequestState) -> Self {
        self.overrides.insert(package_id.to_string(), request);
        self
    }

    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Calls starting with `prefix`, in order
    #[must_use]
    pub fn calls_matching(&self, prefix: &str) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter(|call| call.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// `(package, package percent, overall percent)` per progress report
    #[must_use]
    pub fn progress(&self) -> Vec<(String, u8, u8)> {
        lock(&self.progress).clone()
    }

    fn record(&self, call: String) -> Decision {
        let decision = self.decide(&call);
        lock(&self.calls).push(call);
        decision
    }

    fn decide(&self, call: &str) -> Decision {
        if self.cancel_at.as_deref() == Some(call) {
            Decision::Cancel
        } else {
            Decision::Continue
        }
    }
}

impl Observer for RecordingObserver {
    fn on_detect_begin(&self, _package_count: usize) -> Decision {
        self.record("detect_begin".to_string())
    }

    fn on_detect_package_begin(&self, package_id: &str) -> Decision {
        self.record(format!("detect_package_begin:{package_id}"))
    }

    fn on_detect_package_complete(&self, package_id: &str, _status: Status, state: PackageState) {
        self.record(format!("detect_package_complete:{package_id}:{state}"));
    }

    fn on_detect_complete(&self, status: Status) {
        self.record(format!("detect_complete:{status}"));
    }

    fn on_plan_begin(&self, _package_count: usize) -> Decision {
        self.record("plan_begin".to_string())
    }

    fn on_plan_package_begin(&self, package_id: &str, request: &mut RequestState) -> Decision {
        if let Some(requested) = self.overrides.get(package_id) {
            *request = *requested;
        }
        self.record(format!("plan_package_begin:{package_id}"))
    }

    fn on_plan_package_complete(&self, entry: &PlanEntry) {
        self.record(format!(
            "plan_package_complete:{}:{}",
            entry.package_id, entry.execute
        ));
    }

    fn on_plan_complete(&self, status: Status) {
        self.record(format!("plan_complete:{status}"));
    }

    fn on_apply_begin(&self) -> Decision {
        self.record("apply_begin".to_string())
    }

    fn on_elevate_begin(&self) -> Decision {
        self.record("elevate_begin".to_string())
    }

    fn on_elevate_complete(&self, status: Status) {
        self.record(format!("elevate_complete:{status}"));
    }

    fn on_register_begin(&self) -> Decision {
        self.record("register_begin".to_string())
    }

    fn on_register_complete(&self, status: Status) {
        self.record(format!("register_complete:{status}"));
    }

    fn on_execute_begin(&self, _package_count: usize) -> Decision {
        self.record("execute_begin".to_string())
    }

    fn on_execute_package_begin(
        &self,
        package_id: &str,
        _action: ActionState,
        rollback: bool,
    ) -> Decision {
        if rollback {
            self.record(format!("rollback_package_begin:{package_id}"))
        } else {
            self.record(format!("execute_package_begin:{package_id}"))
        }
    }

    fn on_execute_progress(
        &self,
        package_id: &str,
        package_percent: u8,
        overall_percent: u8,
    ) -> Decision {
        lock(&self.progress).push((package_id.to_string(), package_percent, overall_percent));
        self.decide(&format!("execute_progress:{package_id}"))
    }

    fn on_error(&self, package_id: &str, _error: &Error, attempt: u32) -> Decision {
        self.record(format!("error:{package_id}:{attempt}"));
        lock(&self.error_answers).pop_front().unwrap_or_default()
    }

    fn on_execute_package_complete(&self, outcome: &PackageOutcome) {
        self.record(format!(
            "execute_package_complete:{}:{}:{}",
            outcome.package_id,
            outcome.action,
            outcome.result.code()
        ));
    }

    fn on_execute_complete(&self, status: Status) {
        self.record(format!("execute_complete:{status}"));
    }

    fn on_unregister_begin(&self) -> Decision {
        self.record("unregister_begin".to_string())
    }

    fn on_unregister_complete(&self, status: Status) {
        self.record(format!("unregister_complete:{status}"));
    }

    fn on_restart_required(&self) -> bool {
        self.record("restart_required".to_string());
        self.restart_now
    }

    fn on_apply_complete(&self, status: Status, restart: RestartDisposition) {
        self.record(format!("apply_complete:{status}:{restart:?}"));
    }
}

/// Restarter counting initiations
#[derive(Default)]
pub struct RecordingRestarter {
    initiated: AtomicUsize,
    fail: bool,
}

impl RecordingRestarter {
    /// Restarter whose every initiation fails
    #[must_use]
    pub fn failing() -> Self {
        Self {
            initiated: AtomicUsize::new(0),
            fail: true,
        }
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.initiated.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Restarter for RecordingRestarter {
    async fn initiate(&self) -> Result<(), Error> {
        if self.fail {
            return Err(Error::internal("restart refused"));
        }
        self.initiated.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Launches an in-process peer over an in-memory duplex pipe
///
/// The peer runs [`serve_peer`] on a spawned task with the given installer,
/// so elevated execution can be tested without a second process.
pub struct DuplexLauncher {
    installer: Arc<dyn PackageInstaller>,
    refuse: bool,
    crash_on: Option<String>,
    launches: AtomicUsize,
}

impl DuplexLauncher {
    #[must_use]
    pub fn new(installer: Arc<dyn PackageInstaller>) -> Self {
        Self {
            installer,
            refuse: false,
            crash_on: None,
            launches: AtomicUsize::new(0),
        }
    }

    /// Every launch fails as if the user declined the credential prompt
    #[must_use]
    pub fn refusing(mut self) -> Self {
        self.refuse = true;
        self
    }

    /// The peer dies as soon as it is asked to act on `package_id`
    #[must_use]
    pub fn crash_on(mut self, package_id: &str) -> Self {
        self.crash_on = Some(package_id.to_string());
        self
    }

    #[must_use]
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerLauncher for DuplexLauncher {
    async fn launch(&self, _parent: Option<WindowHandle>) -> Result<PeerConnection, Error> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(ElevationError::LaunchFailed {
                program: "duplex-peer".to_string(),
                message: "refused".to_string(),
            }
            .into());
        }

        let (near, far) = tokio::io::duplex(64 * 1024);
        let (far_read, far_write) = tokio::io::split(far);
        let (near_read, near_write) = tokio::io::split(near);

        let abort = Arc::new(Mutex::new(None));
        let installer: Arc<dyn PackageInstaller> = Arc::new(CrashingInstaller {
            inner: Arc::clone(&self.installer),
            crash_on: self.crash_on.clone(),
            abort: Arc::clone(&abort),
        });
        let task = tokio::spawn(async move {
            if let Err(err) = serve_peer(BufReader::new(far_read), far_write, installer).await {
                tracing::debug!(error = %err, "duplex peer stopped");
            }
        });
        *lock(&abort) = Some(task.abort_handle());

        Ok(PeerConnection {
            program: "duplex-peer".to_string(),
            reader: Box::new(BufReader::new(near_read)),
            writer: Box::new(near_write),
            child: None,
        })
    }
}

struct CrashingInstaller {
    inner: Arc<dyn PackageInstaller>,
    crash_on: Option<String>,
    abort: Arc<Mutex<Option<AbortHandle>>>,
}

#[async_trait]
impl PackageInstaller for CrashingInstaller {
    async fn execute(
        &self,
        request: &ActionRequest,
        progress: &dyn ProgressSink,
    ) -> Result<ActionOutcome, Error> {
        if self.crash_on.as_deref() == Some(request.package_id()) {
            if let Some(abort) = lock(&self.abort).take() {
                abort.abort();
            }
            // The abort lands at this await; the pipe closes with the task.
            std::future::pending::<()>().await;
        }
        self.inner.execute(request, progress).await
    }
}
