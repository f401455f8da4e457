//! Privileged side of the elevated channel

use super::channel::write_message;
use super::protocol::{PeerRequest, PeerResponse};
use crate::installer::{ActionRequest, PackageInstaller, ProgressSink};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strap_errors::{ElevationError, Error};
use strap_types::Plan;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, Lines};
use tokio::sync::mpsc;

/// Serve the peer protocol until the broker shuts the channel down
///
/// The first message must be `Hello`; every later `Execute` is checked
/// against the plan it carried before the installer sees it.
///
/// # Errors
///
/// Returns a protocol error for a malformed handshake, or `PeerLost` if the
/// broker disappears while a response is being written.
pub async fn serve_peer<R, W>(
    reader: R,
    mut writer: W,
    installer: Arc<dyn PackageInstaller>,
) -> Result<(), Error>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();

    let plan = match next_request(&mut lines).await? {
        Some(PeerRequest::Hello { plan, command, .. }) => {
            tracing::info!(
                action = %command.action,
                entries = plan.len(),
                "elevated peer accepted plan"
            );
            plan
        }
        Some(other) => {
            let message = format!("expected hello, got {other:?}");
            let _ = write_message(
                &mut writer,
                &PeerResponse::Error {
                    message: message.clone(),
                },
            )
            .await;
            return Err(ElevationError::Protocol { message }.into());
        }
        None => return Ok(()),
    };

    write_message(
        &mut writer,
        &PeerResponse::Ready {
            pid: std::process::id(),
        },
    )
    .await?;

    loop {
        match next_request(&mut lines).await {
            Ok(None | Some(PeerRequest::Shutdown)) => break,
            Ok(Some(PeerRequest::Execute { id, request })) => {
                let response = match validate(&plan, &request) {
                    Ok(()) => {
                        run_action(id, &request, installer.as_ref(), &mut lines, &mut writer)
                            .await?
                    }
                    Err(error) => {
                        tracing::warn!(package = %request.package_id(), action = %request.action, "rejected request outside the plan");
                        PeerResponse::Failed { id, error }
                    }
                };
                write_message(&mut writer, &response).await?;
            }
            // Nothing is in flight between actions
            Ok(Some(PeerRequest::Cancel { .. })) => {}
            Ok(Some(PeerRequest::Hello { .. })) => {
                write_message(
                    &mut writer,
                    &PeerResponse::Error {
                        message: "duplicate hello".to_string(),
                    },
                )
                .await?;
            }
            Err(err @ Error::Elevation(ElevationError::Protocol { .. })) => {
                write_message(
                    &mut writer,
                    &PeerResponse::Error {
                        message: err.to_string(),
                    },
                )
                .await?;
            }
            Err(err) => return Err(err),
        }
    }

    tracing::info!("elevated peer shutting down");
    Ok(())
}

/// Only actions the plan contains for a package, forward or rollback, are allowed
fn validate(plan: &Plan, request: &ActionRequest) -> Result<(), Error> {
    let id = request.package_id();
    let Some(entry) = plan.entry(id) else {
        return Err(ElevationError::Rejected {
            message: format!("{id} is not part of the plan"),
        }
        .into());
    };
    if !entry.permits(request.action) {
        return Err(ElevationError::Rejected {
            message: format!("{} is not planned for {id}", request.action),
        }
        .into());
    }
    Ok(())
}

async fn next_request<R>(lines: &mut Lines<R>) -> Result<Option<PeerRequest>, Error>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let line = lines
            .next_line()
            .await
            .map_err(|_| ElevationError::PeerLost)?;
        match line {
            None => return Ok(None),
            Some(line) if line.trim().is_empty() => {}
            Some(line) => {
                return serde_json::from_str(&line).map(Some).map_err(|e| {
                    ElevationError::Protocol {
                        message: e.to_string(),
                    }
                    .into()
                })
            }
        }
    }
}

struct PeerProgress {
    tx: mpsc::UnboundedSender<u8>,
    cancelled: Arc<AtomicBool>,
}

impl ProgressSink for PeerProgress {
    fn report(&self, percent: u8) -> bool {
        let _ = self.tx.send(percent);
        !self.cancelled.load(Ordering::SeqCst)
    }
}

/// Run one action, relaying progress and listening for a cancel meanwhile
async fn run_action<R, W>(
    id: u64,
    request: &ActionRequest,
    installer: &dyn PackageInstaller,
    lines: &mut Lines<R>,
    writer: &mut W,
) -> Result<PeerResponse, Error>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancelled = Arc::new(AtomicBool::new(false));
    let sink = PeerProgress {
        tx,
        cancelled: Arc::clone(&cancelled),
    };

    let action = installer.execute(request, &sink);
    tokio::pin!(action);
    let mut broker_gone = false;

    let result = loop {
        tokio::select! {
            result = &mut action => break result,
            Some(percent) = rx.recv() => {
                write_message(writer, &PeerResponse::Progress { id, percent }).await?;
            }
            line = lines.next_line(), if !broker_gone => match line {
                Ok(Some(line)) => match serde_json::from_str::<PeerRequest>(&line) {
                    Ok(PeerRequest::Cancel { id: target }) if target == id => {
                        tracing::info!(id, "broker cancelled the running action");
                        cancelled.store(true, Ordering::SeqCst);
                    }
                    Ok(other) => tracing::warn!(?other, "ignoring request while an action runs"),
                    Err(e) => tracing::warn!(error = %e, "ignoring malformed request"),
                },
                Ok(None) | Err(_) => {
                    tracing::warn!(id, "broker went away, cancelling the running action");
                    broker_gone = true;
                    cancelled.store(true, Ordering::SeqCst);
                }
            },
        }
    };

    while let Ok(percent) = rx.try_recv() {
        write_message(writer, &PeerResponse::Progress { id, percent }).await?;
    }

    Ok(match result {
        Ok(outcome) => PeerResponse::Completed { id, outcome },
        Err(error) => PeerResponse::Failed { id, error },
    })
}
