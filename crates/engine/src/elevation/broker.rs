//! Broker side of the elevated channel

use super::channel::{read_message, write_message, BoxedReader, BoxedWriter};
use super::launcher::{PeerConnection, PeerLauncher};
use super::protocol::{PeerRequest, PeerResponse};
use crate::installer::{ActionOutcome, ActionRequest, PackageInstaller, ProgressSink};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strap_errors::{ElevationError, Error};
use strap_types::{Command, Plan, WindowHandle};
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::time::timeout;

const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(600);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Obtains an elevated installer for one Apply
#[derive(Clone)]
pub struct ElevationBroker {
    launcher: Arc<dyn PeerLauncher>,
    response_timeout: Duration,
}

impl ElevationBroker {
    #[must_use]
    pub fn new(launcher: Arc<dyn PeerLauncher>) -> Self {
        Self {
            launcher,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    /// Longest silence tolerated from the peer, per message
    #[must_use]
    pub fn with_response_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = response_timeout;
        self
    }

    /// Launch the peer, transfer the plan and wait until it is ready
    ///
    /// # Errors
    ///
    /// Returns `LaunchFailed` or `HandshakeFailed`; either way no action has
    /// been sent to the peer.
    pub async fn elevate(
        &self,
        parent: Option<WindowHandle>,
        plan: &Plan,
        command: Command,
    ) -> Result<ElevatedInstaller, Error> {
        let mut connection = self.launcher.launch(parent).await?;
        tracing::debug!(program = %connection.program, "handshaking with elevated peer");

        let hello = PeerRequest::Hello {
            plan: plan.clone(),
            command,
            parent,
        };
        write_message(&mut connection.writer, &hello)
            .await
            .map_err(handshake_failed)?;

        let response = timeout(
            self.response_timeout,
            read_message::<PeerResponse, _>(&mut connection.reader),
        )
        .await
        .map_err(|_| ElevationError::HandshakeFailed {
            message: format!(
                "no answer within {}s",
                self.response_timeout.as_secs()
            ),
        })?
        .map_err(handshake_failed)?;

        match response {
            Some(PeerResponse::Ready { pid }) => {
                tracing::info!(pid, program = %connection.program, "elevated peer ready");
                Ok(ElevatedInstaller::new(connection, pid, self.response_timeout))
            }
            Some(PeerResponse::Error { message }) => {
                Err(ElevationError::HandshakeFailed { message }.into())
            }
            Some(other) => Err(ElevationError::HandshakeFailed {
                message: format!("unexpected handshake response {other:?}"),
            }
            .into()),
            None => Err(ElevationError::HandshakeFailed {
                message: "peer exited before it was ready".to_string(),
            }
            .into()),
        }
    }
}

fn handshake_failed(err: Error) -> Error {
    ElevationError::HandshakeFailed {
        message: err.to_string(),
    }
    .into()
}

struct ChannelIo {
    reader: BoxedReader,
    writer: BoxedWriter,
    child: Option<Child>,
}

/// Installer that forwards actions to the elevated peer
///
/// Requests go out one at a time in submission order. Once the channel
/// fails every later request fails with `PeerLost` without touching it.
pub struct ElevatedInstaller {
    io: Mutex<ChannelIo>,
    program: String,
    pid: u32,
    response_timeout: Duration,
    next_id: AtomicU64,
    lost: AtomicBool,
}

impl ElevatedInstaller {
    fn new(connection: PeerConnection, pid: u32, response_timeout: Duration) -> Self {
        Self {
            io: Mutex::new(ChannelIo {
                reader: connection.reader,
                writer: connection.writer,
                child: connection.child,
            }),
            program: connection.program,
            pid,
            response_timeout,
            next_id: AtomicU64::new(1),
            lost: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Ask the peer to exit and reap it
    pub async fn shutdown(&self) {
        let mut io = self.io.lock().await;
        if !self.lost.load(Ordering::SeqCst) {
            let _ = write_message(&mut io.writer, &PeerRequest::Shutdown).await;
        }
        if let Some(mut child) = io.child.take() {
            match timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(Ok(status)) => tracing::debug!(%status, "elevated peer exited"),
                _ => {
                    tracing::warn!(pid = self.pid, "elevated peer did not exit, killing it");
                    let _ = child.kill().await;
                }
            }
        }
    }

    async fn exchange(
        &self,
        io: &mut ChannelIo,
        id: u64,
        request: &ActionRequest,
        progress: &dyn ProgressSink,
    ) -> Result<ActionOutcome, Error> {
        let execute = PeerRequest::Execute {
            id,
            request: request.clone(),
        };
        write_message(&mut io.writer, &execute).await?;

        let mut cancel_sent = false;
        loop {
            let response = timeout(
                self.response_timeout,
                read_message::<PeerResponse, _>(&mut io.reader),
            )
            .await
            .map_err(|_| ElevationError::PeerUnresponsive {
                timeout_secs: self.response_timeout.as_secs(),
            })??;

            match response {
                None => return Err(ElevationError::PeerLost.into()),
                Some(PeerResponse::Progress { id: got, percent }) if got == id => {
                    if !progress.report(percent) && !cancel_sent {
                        write_message(&mut io.writer, &PeerRequest::Cancel { id }).await?;
                        cancel_sent = true;
                    }
                }
                Some(PeerResponse::Completed { id: got, outcome }) if got == id => {
                    return Ok(outcome)
                }
                Some(PeerResponse::Failed { id: got, error }) if got == id => return Err(error),
                Some(PeerResponse::Error { message }) => {
                    return Err(ElevationError::Protocol { message }.into())
                }
                Some(other) => {
                    return Err(ElevationError::Protocol {
                        message: format!("unexpected response {other:?} to request {id}"),
                    }
                    .into())
                }
            }
        }
    }
}

#[async_trait]
impl PackageInstaller for ElevatedInstaller {
    async fn execute(
        &self,
        request: &ActionRequest,
        progress: &dyn ProgressSink,
    ) -> Result<ActionOutcome, Error> {
        if self.lost.load(Ordering::SeqCst) {
            return Err(ElevationError::PeerLost.into());
        }
        let mut io = self.io.lock().await;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(id, package = %request.package_id(), action = %request.action, "forwarding to elevated peer");

        let result = self.exchange(&mut io, id, request, progress).await;
        if let Err(Error::Elevation(err)) = &result {
            if err.is_channel_failure() {
                tracing::error!(pid = self.pid, error = %err, "elevated channel failed");
                self.lost.store(true, Ordering::SeqCst);
            }
        }
        result
    }
}
