use serde::{Deserialize, Serialize};

/// Messages that do not belong to a single phase event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeneralEvent {
    /// Something the run worked around but the host should see
    Warning {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        package_id: Option<String>,
    },

    /// Failure outside any single package action
    Error { message: String },
}

impl GeneralEvent {
    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
            package_id: None,
        }
    }

    /// Warning about one package
    pub fn package_warning(package_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
            package_id: Some(package_id.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
