//! Package descriptor and detected-state definitions

use crate::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Installer technology a package declares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    Msi,
    Msp,
    Exe,
    Msu,
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Msi => "msi",
            Self::Msp => "msp",
            Self::Exe => "exe",
            Self::Msu => "msu",
        };
        f.write_str(s)
    }
}

/// A unit of software the engine can install, remove or repair
///
/// Owned by the catalog and never mutated after load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub id: String,
    pub kind: PackageKind,
    /// Version the catalog would install
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    /// Actions on this package need administrative privilege
    #[serde(default)]
    pub per_machine: bool,
    /// Install as an administrative image instead of a registered product
    #[serde(default)]
    pub administrative: bool,
    /// Opaque data handed to probe and installer collaborators
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl Package {
    pub fn new(id: impl Into<String>, kind: PackageKind) -> Self {
        Self {
            id: id.into(),
            kind,
            version: None,
            per_machine: false,
            administrative: false,
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    #[must_use]
    pub fn with_per_machine(mut self, per_machine: bool) -> Self {
        self.per_machine = per_machine;
        self
    }

    #[must_use]
    pub fn with_administrative(mut self, administrative: bool) -> Self {
        self.administrative = administrative;
        self
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Look up a collaborator property
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Detected installed state of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PackageState {
    #[default]
    Unknown,
    Absent,
    Cached,
    Present,
}

impl fmt::Display for PackageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Absent => "absent",
            Self::Cached => "cached",
            Self::Present => "present",
        };
        f.write_str(s)
    }
}

/// What a state probe found for one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub state: PackageState,
    /// Installed version, when the probe can tell
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}

impl ProbeResult {
    #[must_use]
    pub fn new(state: PackageState) -> Self {
        Self {
            state,
            version: None,
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }
}
