//! CLI error handling

use std::fmt;

use strap_errors::UserFacingError;
use strap_types::Status;

/// CLI-specific error type
#[derive(Debug)]
pub enum CliError {
    /// Configuration error
    Config(strap_errors::ConfigError),
    /// Engine error
    Engine(strap_errors::Error),
    /// Invalid command arguments
    InvalidArguments(String),
    /// I/O error
    Io(std::io::Error),
}

impl CliError {
    /// Process exit code; engine failures map through their terminal status
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Engine(e) => host_exit_code(Status::from_error(e)),
            _ => 1,
        }
    }
}

/// Exit code the process reports for a terminal status
///
/// Unix truncates exit statuses to one byte, so installer codes such as
/// 3010 become distinct small codes there.
pub fn host_exit_code(status: Status) -> i32 {
    if cfg!(unix) {
        status.posix_exit_code()
    } else {
        status.exit_code()
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "Configuration error: {e}"),
            CliError::Engine(e) => {
                let message = e.user_message();
                write!(f, "{message}")?;
                if let Some(code) = e.user_code() {
                    write!(f, "\n  Code: {code}")?;
                }
                if let Some(hint) = e.user_hint() {
                    write!(f, "\n  Hint: {hint}")?;
                }
                if e.is_retryable() {
                    write!(f, "\n  Retry: safe to retry this operation.")?;
                }
                Ok(())
            }
            CliError::InvalidArguments(msg) => write!(f, "Invalid arguments: {msg}"),
            CliError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Engine(e) => Some(e),
            CliError::Io(e) => Some(e),
            CliError::InvalidArguments(_) => None,
        }
    }
}

impl From<strap_errors::ConfigError> for CliError {
    fn from(e: strap_errors::ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<strap_errors::Error> for CliError {
    fn from(e: strap_errors::Error) -> Self {
        CliError::Engine(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strap_errors::{ElevationError, StateError};

    #[test]
    fn engine_errors_render_code_and_hint() {
        let err = CliError::from(strap_errors::Error::from(StateError::Locked {
            path: "/var/lib/strap/strap.lock".into(),
        }));
        let text = err.to_string();
        assert!(text.contains("locked"));
        assert!(text.contains("Code: state.locked"));
        assert!(text.contains("Hint:"));
        assert!(text.contains("Retry:"));
    }

    #[test]
    fn exit_code_follows_terminal_status() {
        let declined = CliError::from(strap_errors::Error::from(ElevationError::Declined));
        assert_eq!(declined.exit_code(), host_exit_code(Status::ElevationFailed));
        assert_eq!(
            CliError::from(strap_errors::Error::Cancelled).exit_code(),
            host_exit_code(Status::Cancelled)
        );
        assert_eq!(CliError::InvalidArguments("x".into()).exit_code(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn unix_exit_codes_fit_in_a_byte() {
        assert_eq!(host_exit_code(Status::RestartRequired), 10);
        assert_eq!(host_exit_code(Status::Failed), 3);
        assert_eq!(host_exit_code(Status::Success), 0);
    }
}
