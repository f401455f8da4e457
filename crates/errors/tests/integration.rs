//! Integration tests for error types

#[cfg(test)]
mod tests {
    use strap_errors::*;

    #[test]
    fn test_error_conversion() {
        let err: Error = ElevationError::PeerLost.into();
        assert!(matches!(err, Error::Elevation(_)));
    }

    #[test]
    fn test_error_display() {
        let err = PackageError::ActionFailed {
            id: "runtime".into(),
            action: "install".into(),
            status: 1603,
        };
        assert_eq!(err.to_string(), "install failed for runtime with status 1603");
    }

    #[test]
    fn test_channel_failures() {
        assert!(ElevationError::PeerLost.is_channel_failure());
        assert!(ElevationError::PeerUnresponsive { timeout_secs: 30 }.is_channel_failure());
        assert!(ElevationError::Protocol {
            message: "bad frame".into(),
        }
        .is_channel_failure());

        assert!(!ElevationError::Declined.is_channel_failure());
        assert!(!ElevationError::Rejected {
            message: "not in plan".into(),
        }
        .is_channel_failure());
    }

    #[test]
    fn test_user_codes() {
        let err: Error = StateError::Locked {
            path: "/tmp/strap.lock".into(),
        }
        .into();
        assert_eq!(err.user_code(), Some("state.locked"));
        assert!(err.is_retryable());
        assert!(err.user_hint().is_some());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test");
        let err: Error = io_err.into();
        assert!(matches!(
            err,
            Error::Io {
                kind: std::io::ErrorKind::PermissionDenied,
                ..
            }
        ));
    }
}
