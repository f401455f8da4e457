//! Apply phase: execute the plan with rollback and restart handling

mod executor;
mod progress;
mod restart;

pub use executor::{Execution, Executor, Installers};
pub use progress::{overall_percent, ProgressTracker};
pub use restart::resolve_restart;

use strap_events::{EventEmitter, EventSender};
use strap_types::RunId;

/// Emits apply events tagged with the run they belong to
#[derive(Clone, Default)]
pub struct RunEvents {
    sender: Option<EventSender>,
    run_id: Option<RunId>,
}

impl RunEvents {
    #[must_use]
    pub fn new(sender: Option<EventSender>) -> Self {
        Self {
            sender,
            run_id: None,
        }
    }

    #[must_use]
    pub fn with_run(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }
}

impl EventEmitter for RunEvents {
    fn event_sender(&self) -> Option<&EventSender> {
        self.sender.as_ref()
    }

    fn correlation_id(&self) -> Option<String> {
        self.run_id.map(|id| id.to_string())
    }
}
