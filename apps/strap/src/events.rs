//! Event handling and progress display

use crate::logging::log_event_with_tracing;
use console::{style, Term};
use strap_events::{
    AppEvent, ApplyEvent, DetectEvent, ElevationEvent, EventMessage, GeneralEvent, PlanEvent,
};
use strap_types::PackageResult;

/// Event handler for progress display and user feedback
///
/// Status lines go to stderr so stdout only ever carries the final report.
pub struct EventHandler {
    term: Term,
    colors: bool,
    quiet: bool,
    /// Last overall percent printed, to print each step once
    last_percent: Option<u8>,
}

impl EventHandler {
    /// Create new event handler
    pub fn new(colors: bool) -> Self {
        Self {
            term: Term::stderr(),
            colors,
            quiet: false,
            last_percent: None,
        }
    }

    /// Log events without printing anything, for JSON output
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Handle incoming event
    pub fn handle_event(&mut self, message: EventMessage) {
        log_event_with_tracing(&message);
        if self.quiet {
            return;
        }
        if let Some(line) = self.describe(&message.event) {
            self.show_status(&line);
        }
    }

    fn describe(&mut self, event: &AppEvent) -> Option<String> {
        match event {
            AppEvent::Detect(DetectEvent::Started {
                package_count,
                resumed_run,
            }) => Some(match resumed_run {
                Some(run) => format!("Detecting {package_count} packages (resuming run {run})"),
                None => format!("Detecting {package_count} packages"),
            }),
            AppEvent::Detect(DetectEvent::PackageFailed {
                package_id,
                failure,
            }) => Some(self.warning(&format!("{package_id}: {}", failure.message))),

            AppEvent::Plan(PlanEvent::Completed {
                actionable,
                requires_elevation,
                ..
            }) => Some(if *requires_elevation {
                format!("Planned {actionable} actions (elevation required)")
            } else {
                format!("Planned {actionable} actions")
            }),

            AppEvent::Elevation(ElevationEvent::Requested {
                per_machine_packages,
            }) => Some(format!(
                "Requesting elevation for {per_machine_packages} per-machine packages"
            )),
            AppEvent::Elevation(ElevationEvent::Failed { failure }) => {
                Some(self.error(&format!("Elevation failed: {}", failure.message)))
            }

            AppEvent::Apply(ApplyEvent::Started { actionable, .. }) => {
                self.last_percent = None;
                Some(format!("Applying {actionable} actions"))
            }
            AppEvent::Apply(ApplyEvent::PackageStarted {
                package_id,
                action,
                rollback,
            }) => Some(if *rollback {
                self.warning(&format!("Rolling back {package_id} ({action})"))
            } else {
                format!("{} {package_id}", self.emphasis(action.as_str()))
            }),
            AppEvent::Apply(ApplyEvent::Progress {
                overall_percent, ..
            }) => {
                // Only every tenth percent reaches the console
                let step = overall_percent / 10;
                if self.last_percent.is_some_and(|last| last / 10 >= step) {
                    return None;
                }
                self.last_percent = Some(*overall_percent);
                Some(format!("  {overall_percent:>3}%"))
            }
            AppEvent::Apply(ApplyEvent::PackageCompleted {
                package_id, result, ..
            }) => match result {
                PackageResult::Succeeded => None,
                PackageResult::Ignored { status } => Some(self.warning(&format!(
                    "{package_id} failed with {status}, ignored"
                ))),
                PackageResult::Failed { status } => {
                    Some(self.error(&format!("{package_id} failed with {status}")))
                }
            },
            AppEvent::Apply(ApplyEvent::RollbackStarted { packages, .. }) => {
                Some(self.warning(&format!("Rolling back {packages} packages")))
            }

            AppEvent::General(GeneralEvent::Warning {
                message,
                package_id,
            }) => Some(match package_id {
                Some(id) => self.warning(&format!("{id}: {message}")),
                None => self.warning(message),
            }),
            AppEvent::General(GeneralEvent::Error { message }) => Some(self.error(message)),
            _ => None,
        }
    }

    fn warning(&self, message: &str) -> String {
        if self.colors {
            style(message).yellow().to_string()
        } else {
            format!("warning: {message}")
        }
    }

    fn error(&self, message: &str) -> String {
        if self.colors {
            style(message).red().bold().to_string()
        } else {
            format!("error: {message}")
        }
    }

    fn emphasis(&self, message: &str) -> String {
        if self.colors {
            style(message).cyan().to_string()
        } else {
            message.to_string()
        }
    }

    fn show_status(&self, message: &str) {
        let _ = self.term.write_line(message);
    }
}
