//! Collaborator interfaces the engine drives
//!
//! Real backends (MSI, patches, bundles) live behind these traits; the
//! engine only sees state probes, action outcomes and progress.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strap_errors::Error;
use strap_types::{ActionState, DisplayMode, Package, ProbeResult, Version};

/// Queries the installed state of one package
#[async_trait]
pub trait StateProbe: Send + Sync {
    /// # Errors
    ///
    /// A probe error leaves the package `Unknown`; it never aborts detection.
    async fn probe(&self, package: &Package) -> Result<ProbeResult, Error>;
}

/// One package action handed to an installer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub package: Package,
    pub action: ActionState,
    /// The action undoes an earlier forward action of the same run
    pub rollback: bool,
    pub display: DisplayMode,
    /// Version the action should leave installed, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}

impl ActionRequest {
    #[must_use]
    pub fn new(package: Package, action: ActionState, display: DisplayMode) -> Self {
        Self {
            package,
            action,
            rollback: false,
            display,
            version: None,
        }
    }

    #[must_use]
    pub fn with_rollback(mut self, rollback: bool) -> Self {
        self.rollback = rollback;
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: Option<Version>) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn package_id(&self) -> &str {
        &self.package.id
    }
}

/// Installer exit status and restart flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// 0 on success
    pub status: i32,
    pub restart_required: bool,
}

impl ActionOutcome {
    #[must_use]
    pub fn success() -> Self {
        Self {
            status: 0,
            restart_required: false,
        }
    }

    #[must_use]
    pub fn failed(status: i32) -> Self {
        Self {
            status,
            restart_required: false,
        }
    }

    #[must_use]
    pub fn with_restart(mut self, restart_required: bool) -> Self {
        self.restart_required = restart_required;
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

/// Receives progress while an installer runs
pub trait ProgressSink: Send + Sync {
    /// Report completion of the current action in percent.
    ///
    /// Returns `false` once the host asked to cancel; the installer should
    /// stop at the next safe point and return `Error::Cancelled`.
    fn report(&self, percent: u8) -> bool;
}

/// Performs package actions
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when the action could not be attempted at all. An
    /// installer that ran and failed reports a non-zero status instead.
    async fn execute(
        &self,
        request: &ActionRequest,
        progress: &dyn ProgressSink,
    ) -> Result<ActionOutcome, Error>;
}

/// Initiates a system restart once Apply asked for one
#[async_trait]
pub trait Restarter: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the restart could not be scheduled; the restart
    /// is then reported as deferred.
    async fn initiate(&self) -> Result<(), Error>;
}
