//! The engine and its phase lifecycle

use crate::apply::{resolve_restart, Executor, Installers, RunEvents};
use crate::catalog::Catalog;
use crate::elevation::{is_privileged, ElevatedInstaller, ElevationBroker};
use crate::installer::{PackageInstaller, Restarter, StateProbe};
use crate::observer::{NoopObserver, Observer};
use crate::{detect, plan};
use std::fmt;
use std::sync::Arc;
use strap_errors::{ElevationError, EngineError, Error};
use strap_events::{AppEvent, ApplyEvent, ElevationEvent, EventEmitter, EventSender, FailureContext};
use strap_state::{MemoryResumeStore, ResumeStore, StateLock};
use strap_types::{
    ApplyReport, Command, DetectReport, Plan, PlanReport, Registration, RunOutcome, Status,
    TopLevelAction, WindowHandle,
};

/// Where an engine is in its Detect, Plan, Apply sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Detected,
    Planned,
    Applying,
    /// Terminal
    Applied,
    /// Terminal
    Cancelled,
}

impl Lifecycle {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Applied | Self::Cancelled)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Detected => "detected",
            Self::Planned => "planned",
            Self::Applying => "applying",
            Self::Applied => "applied",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Installation engine for one catalog and one host command
///
/// Phases take `&mut self`, so at most one phase runs at a time. Detect may
/// be repeated before Apply and discards any earlier plan; Plan may be
/// repeated after Detect. Apply runs once.
pub struct Engine {
    command: Command,
    catalog: Catalog,
    probe: Arc<dyn StateProbe>,
    installer: Arc<dyn PackageInstaller>,
    store: Arc<dyn ResumeStore>,
    observer: Arc<dyn Observer>,
    broker: Option<ElevationBroker>,
    restarter: Option<Arc<dyn Restarter>>,
    privileged: bool,
    max_retries: u32,
    events: Option<EventSender>,
    lifecycle: Lifecycle,
    detected: Option<DetectReport>,
    plan: Option<Arc<Plan>>,
    _lock: Option<StateLock>,
}

impl EventEmitter for Engine {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}

impl Engine {
    #[must_use]
    pub fn builder(command: Command, catalog: Catalog) -> EngineBuilder {
        EngineBuilder::new(command, catalog)
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    #[must_use]
    pub fn command(&self) -> Command {
        self.command
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Report of the latest successful Detect
    #[must_use]
    pub fn detected(&self) -> Option<&DetectReport> {
        self.detected.as_ref()
    }

    /// Plan Apply will execute
    #[must_use]
    pub fn planned(&self) -> Option<&Plan> {
        self.plan.as_deref()
    }

    /// Detect the current state of every catalog package
    ///
    /// With `command.resumed` the persisted marker of an interrupted run is
    /// reconciled first, so packages that run already changed are not
    /// probed as if nothing happened.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` outside Created, Detected or Planned, and
    /// any error reading the resume store. The lifecycle is unchanged on error.
    pub async fn detect(&mut self) -> Result<DetectReport, Error> {
        self.check(
            Lifecycle::Detected,
            &[Lifecycle::Created, Lifecycle::Detected, Lifecycle::Planned],
        )?;
        tracing::info!(
            packages = self.catalog.len(),
            resumed = self.command.resumed,
            "detecting package state"
        );

        let report = detect::run(
            &self.catalog,
            self.probe.as_ref(),
            self.store.as_ref(),
            self.command.resumed,
            self.observer.as_ref(),
            &*self,
        )
        .await?;

        self.plan = None;
        if report.status == Status::Cancelled {
            self.detected = None;
            self.lifecycle = Lifecycle::Cancelled;
        } else {
            self.detected = Some(report.clone());
            self.lifecycle = Lifecycle::Detected;
        }
        Ok(report)
    }

    /// Plan `action` against the detected state
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` before Detect, and `DetectionMismatch`
    /// when the detected packages do not match the catalog.
    pub fn plan(&mut self, action: TopLevelAction) -> Result<PlanReport, Error> {
        self.check(
            Lifecycle::Planned,
            &[Lifecycle::Detected, Lifecycle::Planned],
        )?;
        let detected = self
            .detected
            .as_ref()
            .ok_or_else(|| Error::internal("no detect report in detected state"))?;
        tracing::info!(%action, "planning");

        let planned = plan::run(
            &self.catalog,
            &detected.packages,
            action,
            self.observer.as_ref(),
            &*self,
        )?;

        match planned.plan {
            Some(plan) => {
                self.plan = Some(Arc::new(plan));
                self.lifecycle = Lifecycle::Planned;
            }
            None => {
                self.plan = None;
                self.lifecycle = Lifecycle::Cancelled;
            }
        }
        Ok(planned.report)
    }

    /// Execute the plan
    ///
    /// Package failures, cancellation and elevation failures are reported
    /// through the returned status, not as errors.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless planned, and resume store errors.
    /// The engine is `Applied` afterwards either way.
    pub async fn apply(&mut self, parent: Option<WindowHandle>) -> Result<ApplyReport, Error> {
        self.check(Lifecycle::Applying, &[Lifecycle::Planned])?;
        let plan = self
            .plan
            .clone()
            .ok_or_else(|| Error::internal("no plan in planned state"))?;
        self.lifecycle = Lifecycle::Applying;

        let result = self.run_apply(parent, &plan).await;
        self.lifecycle = match &result {
            Ok(report) if report.status == Status::Cancelled => Lifecycle::Cancelled,
            _ => Lifecycle::Applied,
        };
        result
    }

    async fn run_apply(
        &self,
        parent: Option<WindowHandle>,
        plan: &Plan,
    ) -> Result<ApplyReport, Error> {
        let events = RunEvents::new(self.events.clone());

        if self.observer.on_apply_begin().is_cancel() {
            tracing::info!("apply cancelled before it started");
            return Ok(self.finish_apply(&events, ApplyReport::aborted(Status::Cancelled)));
        }

        let needs_peer = plan.requires_elevation() && !self.privileged;
        tracing::info!(actionable = plan.actionable_count(), elevated = needs_peer, "applying plan");
        events.emit(AppEvent::Apply(ApplyEvent::Started {
            actionable: plan.actionable_count(),
            elevated: needs_peer,
        }));

        let elevated = match self.elevate(parent, plan, &events).await {
            Ok(elevated) => elevated,
            Err(err) => {
                tracing::error!(error = %err, "elevation failed; no package was executed");
                events.emit(AppEvent::Elevation(ElevationEvent::Failed {
                    failure: FailureContext::from_error(&err),
                }));
                self.observer.on_elevate_complete(Status::ElevationFailed);
                return Ok(self.finish_apply(&events, ApplyReport::aborted(Status::ElevationFailed)));
            }
        };

        let result = self.run_registered(plan, elevated.as_ref(), &events).await;

        if let Some(peer) = &elevated {
            peer.shutdown().await;
            events.emit(AppEvent::Elevation(ElevationEvent::PeerClosed));
        }

        match result {
            Ok(mut report) => {
                report.elevated = elevated.is_some();
                Ok(self.finish_apply(&events, report))
            }
            Err(err) => {
                tracing::error!(error = %err, "apply aborted");
                self.finish_apply(&events, ApplyReport::aborted(Status::Failed));
                Err(err)
            }
        }
    }

    async fn elevate(
        &self,
        parent: Option<WindowHandle>,
        plan: &Plan,
        events: &RunEvents,
    ) -> Result<Option<ElevatedInstaller>, Error> {
        if !plan.requires_elevation() {
            return Ok(None);
        }
        if self.privileged {
            tracing::debug!("already privileged; running per-machine packages in process");
            events.emit(AppEvent::Elevation(ElevationEvent::NotRequired));
            return Ok(None);
        }

        let per_machine_packages = plan
            .entries()
            .iter()
            .filter(|entry| entry.requires_elevation())
            .count();
        events.emit(AppEvent::Elevation(ElevationEvent::Requested {
            per_machine_packages,
        }));

        if self.observer.on_elevate_begin().is_cancel() {
            return Err(ElevationError::Declined.into());
        }
        let broker = self.broker.as_ref().ok_or_else(|| ElevationError::LaunchFailed {
            program: "elevated peer".to_string(),
            message: "no elevation broker configured".to_string(),
        })?;

        let installer = broker.elevate(parent, plan, self.command).await?;
        events.emit(AppEvent::Elevation(ElevationEvent::Established {
            program: installer.program().to_string(),
        }));
        self.observer.on_elevate_complete(Status::Success);
        Ok(Some(installer))
    }

    async fn run_registered(
        &self,
        plan: &Plan,
        elevated: Option<&ElevatedInstaller>,
        events: &RunEvents,
    ) -> Result<ApplyReport, Error> {
        let registration = Registration::new(plan.action());
        let run_id = registration.run_id;

        if self.observer.on_register_begin().is_cancel() {
            tracing::info!("apply cancelled before registration");
            return Ok(ApplyReport::aborted(Status::Cancelled));
        }
        if let Err(err) = self.store.register(&registration).await {
            self.observer.on_register_complete(Status::Failed);
            return Err(err);
        }
        self.observer.on_register_complete(Status::Success);

        let events = events.clone().with_run(run_id);
        tracing::info!(%run_id, "run registered");
        events.emit(AppEvent::Apply(ApplyEvent::Registered { run_id }));

        let executor = Executor {
            plan,
            catalog: &self.catalog,
            command: self.command,
            installers: Installers::new(
                self.installer.as_ref(),
                elevated.map(|peer| peer as &dyn PackageInstaller),
            ),
            store: self.store.as_ref(),
            observer: self.observer.as_ref(),
            events: &events,
            run_id,
            max_retries: self.max_retries,
        };
        let execution = executor.run().await?;

        let restart_required = execution.restart_required();
        let status = if execution.status == Status::Success && restart_required {
            Status::RestartRequired
        } else {
            execution.status
        };

        let keep_marker = self.observer.on_unregister_begin().is_cancel();
        let marker_cleared = execution.status == Status::Success && !keep_marker;
        let outcome = RunOutcome {
            status,
            restart_required,
        };
        if let Err(err) = self.store.unregister(run_id, outcome, marker_cleared).await {
            self.observer.on_unregister_complete(Status::Failed);
            return Err(err);
        }
        self.observer.on_unregister_complete(Status::Success);
        tracing::info!(%run_id, %status, marker_cleared, "run unregistered");
        events.emit(AppEvent::Apply(ApplyEvent::Unregistered {
            run_id,
            marker_cleared,
        }));

        let restart = resolve_restart(
            self.command.restart,
            restart_required,
            execution.status == Status::Cancelled,
            self.observer.as_ref(),
            self.restarter.as_deref(),
        )
        .await;
        events.emit(AppEvent::Apply(ApplyEvent::Restart {
            disposition: restart,
        }));

        Ok(ApplyReport {
            run_id: Some(run_id),
            status,
            executed: execution.executed,
            rolled_back: execution.rolled_back,
            failed_package: execution.failed_package,
            restart,
            elevated: elevated.is_some(),
        })
    }

    fn finish_apply(&self, events: &RunEvents, report: ApplyReport) -> ApplyReport {
        events.emit(AppEvent::Apply(ApplyEvent::Completed {
            status: report.status,
            executed: report.executed.len(),
            rolled_back: report.rolled_back.len(),
        }));
        self.observer.on_apply_complete(report.status, report.restart);
        report
    }

    fn check(&self, to: Lifecycle, allowed: &[Lifecycle]) -> Result<(), Error> {
        if allowed.contains(&self.lifecycle) {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                from: self.lifecycle.to_string(),
                to: to.to_string(),
            }
            .into())
        }
    }
}

/// Builder for [`Engine`]
pub struct EngineBuilder {
    command: Command,
    catalog: Catalog,
    probe: Option<Arc<dyn StateProbe>>,
    installer: Option<Arc<dyn PackageInstaller>>,
    store: Option<Arc<dyn ResumeStore>>,
    observer: Option<Arc<dyn Observer>>,
    broker: Option<ElevationBroker>,
    restarter: Option<Arc<dyn Restarter>>,
    privileged: Option<bool>,
    max_retries: u32,
    events: Option<EventSender>,
    lock: Option<StateLock>,
}

impl EngineBuilder {
    #[must_use]
    pub fn new(command: Command, catalog: Catalog) -> Self {
        Self {
            command,
            catalog,
            probe: None,
            installer: None,
            store: None,
            observer: None,
            broker: None,
            restarter: None,
            privileged: None,
            max_retries: 3,
            events: None,
            lock: None,
        }
    }

    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn StateProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    #[must_use]
    pub fn with_installer(mut self, installer: Arc<dyn PackageInstaller>) -> Self {
        self.installer = Some(installer);
        self
    }

    /// Defaults to an in-memory store that does not survive the process
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ResumeStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }

    #[must_use]
    pub fn with_broker(mut self, broker: ElevationBroker) -> Self {
        self.broker = Some(broker);
        self
    }

    #[must_use]
    pub fn with_restarter(mut self, restarter: Arc<dyn Restarter>) -> Self {
        self.restarter = Some(restarter);
        self
    }

    /// Override privilege detection
    #[must_use]
    pub fn with_privileged(mut self, privileged: bool) -> Self {
        self.privileged = Some(privileged);
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_event_sender(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Hold the state lock for the engine's lifetime
    #[must_use]
    pub fn with_lock(mut self, lock: StateLock) -> Self {
        self.lock = Some(lock);
        self
    }

    /// # Errors
    ///
    /// Returns `MissingComponent` without a state probe or package installer.
    pub fn build(self) -> Result<Engine, Error> {
        let probe = self.probe.ok_or_else(|| EngineError::MissingComponent {
            component: "state probe".to_string(),
        })?;
        let installer = self.installer.ok_or_else(|| EngineError::MissingComponent {
            component: "package installer".to_string(),
        })?;

        Ok(Engine {
            command: self.command,
            catalog: self.catalog,
            probe,
            installer,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryResumeStore::new())),
            observer: self.observer.unwrap_or_else(|| Arc::new(NoopObserver)),
            broker: self.broker,
            restarter: self.restarter,
            privileged: self.privileged.unwrap_or_else(is_privileged),
            max_retries: self.max_retries,
            events: self.events,
            lifecycle: Lifecycle::Created,
            detected: None,
            plan: None,
            _lock: self.lock,
        })
    }
}
