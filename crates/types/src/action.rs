//! Requested, planned and engine-wide action types

use crate::PackageState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strap_errors::ConfigError;

/// Engine-wide operation requested by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopLevelAction {
    Help,
    Uninstall,
    Install,
    Modify,
    Repair,
}

impl TopLevelAction {
    /// Default request for a package given this action and its detected state.
    ///
    /// `Modify` keeps whatever the package currently is; an unknown package
    /// gets no request.
    #[must_use]
    pub fn default_request(self, current: PackageState) -> RequestState {
        match self {
            Self::Help => RequestState::None,
            Self::Install => RequestState::Present,
            Self::Uninstall => RequestState::Absent,
            Self::Repair => RequestState::Repair,
            Self::Modify => match current {
                PackageState::Present => RequestState::Present,
                PackageState::Cached => RequestState::Cache,
                PackageState::Absent => RequestState::Absent,
                PackageState::Unknown => RequestState::None,
            },
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Uninstall => "uninstall",
            Self::Install => "install",
            Self::Modify => "modify",
            Self::Repair => "repair",
        }
    }
}

impl fmt::Display for TopLevelAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopLevelAction {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "help" => Ok(Self::Help),
            "uninstall" => Ok(Self::Uninstall),
            "install" => Ok(Self::Install),
            "modify" => Ok(Self::Modify),
            "repair" => Ok(Self::Repair),
            _ => Err(ConfigError::InvalidValue {
                field: "action".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl clap::ValueEnum for TopLevelAction {
    fn value_variants<'a>() -> &'a [Self] {
        &[
            Self::Help,
            Self::Uninstall,
            Self::Install,
            Self::Modify,
            Self::Repair,
        ]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.as_str()))
    }
}

/// Desired end state for a single package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    None,
    Absent,
    Cache,
    Present,
    Repair,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Absent => "absent",
            Self::Cache => "cache",
            Self::Present => "present",
            Self::Repair => "repair",
        };
        f.write_str(s)
    }
}

/// Concrete operation chosen for a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    None,
    Uninstall,
    Install,
    AdminInstall,
    Maintenance,
    Recache,
    MinorUpgrade,
    MajorUpgrade,
    Patch,
}

impl ActionState {
    /// Every action, in declaration order.
    pub const ALL: [ActionState; 9] = [
        Self::None,
        Self::Uninstall,
        Self::Install,
        Self::AdminInstall,
        Self::Maintenance,
        Self::Recache,
        Self::MinorUpgrade,
        Self::MajorUpgrade,
        Self::Patch,
    ];

    /// The structural inverse used to undo this action after a later failure.
    ///
    /// Upgrades roll back by reinstalling the pre-upgrade version; repairs,
    /// cache refreshes and administrative images have nothing to undo.
    #[must_use]
    pub fn rollback(self) -> ActionState {
        match self {
            Self::Install | Self::Patch => Self::Uninstall,
            Self::Uninstall | Self::MinorUpgrade | Self::MajorUpgrade => Self::Install,
            Self::None | Self::AdminInstall | Self::Maintenance | Self::Recache => Self::None,
        }
    }

    /// State a package is left in once this action completed successfully.
    #[must_use]
    pub fn resulting_state(self) -> Option<PackageState> {
        match self {
            Self::None => None,
            Self::Uninstall => Some(PackageState::Absent),
            Self::Recache => Some(PackageState::Cached),
            Self::Install
            | Self::AdminInstall
            | Self::Maintenance
            | Self::MinorUpgrade
            | Self::MajorUpgrade
            | Self::Patch => Some(PackageState::Present),
        }
    }

    #[must_use]
    pub fn is_none(self) -> bool {
        self == Self::None
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Uninstall => "uninstall",
            Self::Install => "install",
            Self::AdminInstall => "admin_install",
            Self::Maintenance => "maintenance",
            Self::Recache => "recache",
            Self::MinorUpgrade => "minor_upgrade",
            Self::MajorUpgrade => "major_upgrade",
            Self::Patch => "patch",
        }
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much UI the host shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    None,
    Passive,
    Full,
}

impl Default for DisplayMode {
    fn default() -> Self {
        Self::Full
    }
}

impl FromStr for DisplayMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "passive" => Ok(Self::Passive),
            "full" => Ok(Self::Full),
            _ => Err(ConfigError::InvalidValue {
                field: "display".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl clap::ValueEnum for DisplayMode {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::None, Self::Passive, Self::Full]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::None => clap::builder::PossibleValue::new("none"),
            Self::Passive => clap::builder::PossibleValue::new("passive"),
            Self::Full => clap::builder::PossibleValue::new("full"),
        })
    }
}

/// What to do when packages report that a restart is required
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartPolicy {
    Never,
    Prompt,
    Automatic,
    Always,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::Prompt
    }
}

impl FromStr for RestartPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(Self::Never),
            "prompt" => Ok(Self::Prompt),
            "automatic" => Ok(Self::Automatic),
            "always" => Ok(Self::Always),
            _ => Err(ConfigError::InvalidValue {
                field: "restart".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl clap::ValueEnum for RestartPolicy {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Never, Self::Prompt, Self::Automatic, Self::Always]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Never => clap::builder::PossibleValue::new("never"),
            Self::Prompt => clap::builder::PossibleValue::new("prompt"),
            Self::Automatic => clap::builder::PossibleValue::new("automatic"),
            Self::Always => clap::builder::PossibleValue::new("always"),
        })
    }
}

/// Input to one Detect/Plan/Apply cycle, constructed once by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub action: TopLevelAction,
    pub display: DisplayMode,
    pub restart: RestartPolicy,
    /// Reconcile against previously persisted progress instead of starting fresh
    pub resumed: bool,
}

impl Command {
    #[must_use]
    pub fn new(action: TopLevelAction) -> Self {
        Self {
            action,
            display: DisplayMode::default(),
            restart: RestartPolicy::default(),
            resumed: false,
        }
    }

    #[must_use]
    pub fn with_display(mut self, display: DisplayMode) -> Self {
        self.display = display;
        self
    }

    #[must_use]
    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    #[must_use]
    pub fn with_resumed(mut self, resumed: bool) -> Self {
        self.resumed = resumed;
        self
    }
}
