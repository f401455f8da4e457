//! Command line interface definition

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use strap_types::{ColorChoice, DisplayMode, RestartPolicy, TopLevelAction};

/// strap - Detect, plan and apply package installations
#[derive(Parser)]
#[command(name = "strap")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Detect, plan and apply package installations with rollback")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging to the state directory
    #[arg(long, global = true)]
    pub debug: bool,

    /// Color output control
    #[arg(long, global = true, value_enum)]
    pub color: Option<ColorChoice>,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Probe the installed state of every catalog package
    Detect {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Detect, then compute the actions a top-level request needs
    Plan {
        #[command(flatten)]
        run: RunArgs,

        /// Requested top-level action
        #[arg(long, value_enum, default_value = "install")]
        action: TopLevelAction,
    },

    /// Detect, plan and execute the plan
    Apply {
        #[command(flatten)]
        run: RunArgs,

        /// Requested top-level action
        #[arg(long, value_enum, default_value = "install")]
        action: TopLevelAction,

        /// Restart handling once packages ask for one
        #[arg(long, value_enum)]
        restart: Option<RestartPolicy>,
    },

    /// Serve the privileged peer protocol on stdin/stdout
    #[command(name = "elevated-peer", hide = true)]
    ElevatedPeer {
        /// Window that owns the elevation prompt
        #[arg(long, value_name = "HANDLE")]
        parent_window: Option<u64>,
    },
}

/// Arguments shared by the phase commands
#[derive(Args, Clone)]
pub struct RunArgs {
    /// Package catalog (TOML, one [[package]] table per package)
    #[arg(long, value_name = "FILE")]
    pub catalog: PathBuf,

    /// How much installer UI to show
    #[arg(long, value_enum)]
    pub display: Option<DisplayMode>,

    /// Reconcile against an interrupted run before probing
    #[arg(long)]
    pub resume: bool,

    /// Window that owns any elevation prompt
    #[arg(long, value_name = "HANDLE")]
    pub parent_window: Option<u64>,
}

impl Commands {
    /// Phase arguments, absent for the peer subcommand
    pub fn run_args(&self) -> Option<&RunArgs> {
        match self {
            Self::Detect { run } | Self::Plan { run, .. } | Self::Apply { run, .. } => Some(run),
            Self::ElevatedPeer { .. } => None,
        }
    }

    /// Top-level action the command plans for; detection alone plans nothing
    pub fn action(&self) -> TopLevelAction {
        match self {
            Self::Plan { action, .. } | Self::Apply { action, .. } => *action,
            Self::Detect { .. } | Self::ElevatedPeer { .. } => TopLevelAction::Help,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_takes_phase_and_restart_flags() {
        let cli = Cli::try_parse_from([
            "strap",
            "--json",
            "apply",
            "--catalog",
            "bundle.toml",
            "--action",
            "uninstall",
            "--restart",
            "never",
            "--resume",
            "--parent-window",
            "42",
        ])
        .unwrap();

        assert!(cli.global.json);
        let Commands::Apply {
            run,
            action,
            restart,
        } = cli.command
        else {
            panic!("expected apply");
        };
        assert_eq!(action, TopLevelAction::Uninstall);
        assert_eq!(restart, Some(RestartPolicy::Never));
        assert!(run.resume);
        assert_eq!(run.parent_window, Some(42));
        assert_eq!(run.catalog, PathBuf::from("bundle.toml"));
    }

    #[test]
    fn detect_plans_nothing() {
        let cli = Cli::try_parse_from(["strap", "detect", "--catalog", "c.toml"]).unwrap();
        assert_eq!(cli.command.action(), TopLevelAction::Help);
        let cli = Cli::try_parse_from(["strap", "plan", "--catalog", "c.toml"]).unwrap();
        assert_eq!(cli.command.action(), TopLevelAction::Install);
    }

    #[test]
    fn catalog_is_required() {
        assert!(Cli::try_parse_from(["strap", "detect"]).is_err());
    }

    #[test]
    fn peer_subcommand_has_no_run_args() {
        let cli = Cli::try_parse_from(["strap", "elevated-peer", "--parent-window", "7"]).unwrap();
        assert!(cli.command.run_args().is_none());
    }
}
