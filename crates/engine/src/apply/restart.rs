//! Restart aggregation once every package has run

use crate::installer::Restarter;
use crate::observer::Observer;
use strap_types::{RestartDisposition, RestartPolicy};

/// Decide and, where the policy allows, initiate a restart
///
/// `required` is the OR over every completed action. A restarter failure
/// or a missing restarter downgrades the decision to `Deferred`.
pub async fn resolve_restart(
    policy: RestartPolicy,
    required: bool,
    cancelled: bool,
    observer: &dyn Observer,
    restarter: Option<&dyn Restarter>,
) -> RestartDisposition {
    let initiate = match policy {
        RestartPolicy::Never => {
            return if required {
                RestartDisposition::Suppressed
            } else {
                RestartDisposition::NotRequired
            };
        }
        RestartPolicy::Prompt if required => observer.on_restart_required(),
        RestartPolicy::Automatic if required => true,
        RestartPolicy::Always => !cancelled,
        RestartPolicy::Prompt | RestartPolicy::Automatic => false,
    };

    if !initiate {
        return if required {
            RestartDisposition::Deferred
        } else {
            RestartDisposition::NotRequired
        };
    }

    let Some(restarter) = restarter else {
        tracing::warn!("restart requested but no restarter is configured");
        return RestartDisposition::Deferred;
    };
    match restarter.initiate().await {
        Ok(()) => {
            tracing::info!(?policy, required, "restart initiated");
            RestartDisposition::Initiated
        }
        Err(err) => {
            tracing::warn!(error = %err, "restart could not be initiated");
            RestartDisposition::Deferred
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use crate::testing::{RecordingObserver, RecordingRestarter};

    #[tokio::test]
    async fn never_suppresses_required_restart() {
        let restarter = RecordingRestarter::default();
        let disposition =
            resolve_restart(RestartPolicy::Never, true, false, &NoopObserver, Some(&restarter))
                .await;
        assert_eq!(disposition, RestartDisposition::Suppressed);
        assert_eq!(restarter.count(), 0);
    }

    #[tokio::test]
    async fn prompt_asks_the_observer() {
        let restarter = RecordingRestarter::default();
        let declines = NoopObserver;
        assert_eq!(
            resolve_restart(RestartPolicy::Prompt, true, false, &declines, Some(&restarter)).await,
            RestartDisposition::Deferred
        );

        let accepts = RecordingObserver::new().restart_now(true);
        assert_eq!(
            resolve_restart(RestartPolicy::Prompt, true, false, &accepts, Some(&restarter)).await,
            RestartDisposition::Initiated
        );
        assert_eq!(restarter.count(), 1);
    }

    #[tokio::test]
    async fn automatic_only_when_required() {
        let restarter = RecordingRestarter::default();
        assert_eq!(
            resolve_restart(RestartPolicy::Automatic, false, false, &NoopObserver, Some(&restarter))
                .await,
            RestartDisposition::NotRequired
        );
        assert_eq!(
            resolve_restart(RestartPolicy::Automatic, true, false, &NoopObserver, Some(&restarter))
                .await,
            RestartDisposition::Initiated
        );
    }

    #[tokio::test]
    async fn always_restarts_unless_cancelled() {
        let restarter = RecordingRestarter::default();
        assert_eq!(
            resolve_restart(RestartPolicy::Always, false, false, &NoopObserver, Some(&restarter))
                .await,
            RestartDisposition::Initiated
        );
        assert_eq!(
            resolve_restart(RestartPolicy::Always, false, true, &NoopObserver, Some(&restarter))
                .await,
            RestartDisposition::NotRequired
        );
    }

    #[tokio::test]
    async fn failing_or_missing_restarter_defers() {
        let failing = RecordingRestarter::failing();
        assert_eq!(
            resolve_restart(RestartPolicy::Automatic, true, false, &NoopObserver, Some(&failing))
                .await,
            RestartDisposition::Deferred
        );
        assert_eq!(
            resolve_restart(RestartPolicy::Automatic, true, false, &NoopObserver, None).await,
            RestartDisposition::Deferred
        );
    }
}
