//! Structured logging integration for events
//!
//! Converts engine events into tracing records with structured fields so a
//! debug log file carries the whole run, correlated by run id.

use strap_events::{AppEvent, EventMessage};
use tracing::{debug, error, info, trace, warn};

/// Log an `EventMessage` at its own level with structured fields
pub fn log_event_with_tracing(message: &EventMessage) {
    let event = &message.event;
    let meta = &message.meta;

    match event {
        AppEvent::Detect(detect_event) => {
            use strap_events::DetectEvent;
            match detect_event {
                DetectEvent::Started {
                    package_count,
                    resumed_run,
                } => {
                    info!(
                        source = meta.source.as_str(),
                        event_id = %meta.event_id,
                        correlation = ?meta.correlation_id,
                        package_count = package_count,
                        resumed_run = ?resumed_run,
                        "Detect started"
                    );
                }
                DetectEvent::PackageCompleted {
                    package_id,
                    state,
                    version,
                    reconciled,
                } => {
                    info!(
                        source = meta.source.as_str(),
                        event_id = %meta.event_id,
                        correlation = ?meta.correlation_id,
                        package = %package_id,
                        state = %state,
                        version = ?version,
                        reconciled = reconciled,
                        "Package detected"
                    );
                }
                DetectEvent::PackageFailed {
                    package_id,
                    failure,
                } => {
                    warn!(
                        source = meta.source.as_str(),
                        event_id = %meta.event_id,
                        correlation = ?meta.correlation_id,
                        package = %package_id,
                        code = ?failure.code,
                        message = %failure.message,
                        "Package probe failed"
                    );
                }
                _ => log_fallback(message, "Detect event"),
            }
        }

        AppEvent::Plan(plan_event) => {
            use strap_events::PlanEvent;
            match plan_event {
                PlanEvent::PackagePlanned {
                    package_id,
                    current,
                    request,
                    execute,
                    rollback,
                    failure,
                } => {
                    debug!(
                        source = meta.source.as_str(),
                        event_id = %meta.event_id,
                        correlation = ?meta.correlation_id,
                        package = %package_id,
                        current = %current,
                        request = %request,
                        execute = %execute,
                        rollback = %rollback,
                        failure = ?failure,
                        "Package planned"
                    );
                }
                PlanEvent::Completed {
                    status,
                    actionable,
                    requires_elevation,
                } => {
                    info!(
                        source = meta.source.as_str(),
                        event_id = %meta.event_id,
                        correlation = ?meta.correlation_id,
                        status = %status,
                        actionable = actionable,
                        requires_elevation = requires_elevation,
                        "Plan completed"
                    );
                }
                PlanEvent::Started { .. } => log_fallback(message, "Plan event"),
            }
        }

        AppEvent::Apply(apply_event) => {
            use strap_events::ApplyEvent;
            match apply_event {
                ApplyEvent::PackageStarted {
                    package_id,
                    action,
                    rollback,
                } => {
                    info!(
                        source = meta.source.as_str(),
                        event_id = %meta.event_id,
                        correlation = ?meta.correlation_id,
                        package = %package_id,
                        action = %action,
                        rollback = rollback,
                        "Package action started"
                    );
                }
                ApplyEvent::Progress {
                    package_id,
                    package_percent,
                    overall_percent,
                } => {
                    trace!(
                        source = meta.source.as_str(),
                        correlation = ?meta.correlation_id,
                        package = %package_id,
                        package_percent = package_percent,
                        overall_percent = overall_percent,
                        "Progress"
                    );
                }
                ApplyEvent::PackageFailed {
                    package_id,
                    action,
                    attempt,
                    failure,
                } => {
                    error!(
                        source = meta.source.as_str(),
                        event_id = %meta.event_id,
                        correlation = ?meta.correlation_id,
                        package = %package_id,
                        action = %action,
                        attempt = attempt,
                        retryable = failure.retryable,
                        code = ?failure.code,
                        message = %failure.message,
                        hint = ?failure.hint,
                        "Package action failed"
                    );
                }
                ApplyEvent::PackageCompleted {
                    package_id,
                    action,
                    result,
                    restart_required,
                    rollback,
                } => {
                    info!(
                        source = meta.source.as_str(),
                        event_id = %meta.event_id,
                        correlation = ?meta.correlation_id,
                        package = %package_id,
                        action = %action,
                        result = ?result,
                        restart_required = restart_required,
                        rollback = rollback,
                        "Package action completed"
                    );
                }
                ApplyEvent::Completed {
                    status,
                    executed,
                    rolled_back,
                } => {
                    info!(
                        source = meta.source.as_str(),
                        event_id = %meta.event_id,
                        correlation = ?meta.correlation_id,
                        status = %status,
                        executed = executed,
                        rolled_back = rolled_back,
                        "Apply completed"
                    );
                }
                _ => log_fallback(message, "Apply event"),
            }
        }

        AppEvent::Elevation(elevation_event) => {
            use strap_events::ElevationEvent;
            match elevation_event {
                ElevationEvent::Failed { failure } => {
                    error!(
                        source = meta.source.as_str(),
                        event_id = %meta.event_id,
                        correlation = ?meta.correlation_id,
                        retryable = failure.retryable,
                        code = ?failure.code,
                        message = %failure.message,
                        hint = ?failure.hint,
                        "Elevation failed"
                    );
                }
                ElevationEvent::Established { program } => {
                    info!(
                        source = meta.source.as_str(),
                        event_id = %meta.event_id,
                        correlation = ?meta.correlation_id,
                        program = %program,
                        "Elevated peer established"
                    );
                }
                _ => log_fallback(message, "Elevation event"),
            }
        }

        AppEvent::General(general_event) => {
            use strap_events::GeneralEvent;
            match general_event {
                GeneralEvent::Warning {
                    message,
                    package_id,
                } => {
                    warn!(
                        source = meta.source.as_str(),
                        event_id = %meta.event_id,
                        correlation = ?meta.correlation_id,
                        package_id = ?package_id,
                        "{message}"
                    );
                }
                GeneralEvent::Error { message } => {
                    error!(
                        source = meta.source.as_str(),
                        event_id = %meta.event_id,
                        correlation = ?meta.correlation_id,
                        "{message}"
                    );
                }
            }
        }
    }
}

fn log_fallback(message: &EventMessage, label: &'static str) {
    let meta = &message.meta;
    let event = &message.event;
    match meta.tracing_level() {
        tracing::Level::ERROR => {
            error!(source = meta.source.as_str(), event_id = %meta.event_id, correlation = ?meta.correlation_id, event = ?event, "{label}")
        }
        tracing::Level::WARN => {
            warn!(source = meta.source.as_str(), event_id = %meta.event_id, correlation = ?meta.correlation_id, event = ?event, "{label}")
        }
        tracing::Level::INFO => {
            info!(source = meta.source.as_str(), event_id = %meta.event_id, correlation = ?meta.correlation_id, event = ?event, "{label}")
        }
        tracing::Level::DEBUG => {
            debug!(source = meta.source.as_str(), event_id = %meta.event_id, correlation = ?meta.correlation_id, event = ?event, "{label}")
        }
        tracing::Level::TRACE => {
            trace!(source = meta.source.as_str(), event_id = %meta.event_id, correlation = ?meta.correlation_id, event = ?event, "{label}")
        }
    }
}
