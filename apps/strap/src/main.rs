//! strap - Detect, plan and apply package installations
//!
//! The CLI host of the strap engine: it loads a package catalog, wires the
//! shell-command collaborators, the resumable state store and the elevation
//! broker into an engine, runs the requested phases and renders the report.
//! The exit code is the terminal status code of the last phase.

mod cli;
mod collaborators;
mod display;
mod error;
mod events;
mod logging;

use crate::cli::{Cli, Commands, RunArgs};
use crate::collaborators::{CommandInstaller, CommandProbe, CommandRestarter, ConsoleObserver};
use crate::display::{OutputRenderer, RunReport};
use crate::error::{host_exit_code, CliError};
use crate::events::EventHandler;
use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strap_config::Config;
use strap_engine::{Catalog, ElevationBroker, Engine, ProcessLauncher};
use strap_events::EventReceiver;
use strap_state::{SqliteResumeStore, StateLock};
use strap_types::{ColorChoice, Command, Status, TopLevelAction, WindowHandle};
use tokio::io::BufReader;
use tokio::select;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Parse command line arguments first to check for JSON mode
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    if let Commands::ElevatedPeer { parent_window } = cli.command {
        process::exit(run_peer(parent_window, cli.global.debug).await);
    }

    init_tracing(json_mode, cli.global.debug);

    match run(cli).await {
        Ok(status) => process::exit(host_exit_code(status)),
        Err(e) => {
            error!("Application error: {}", e);
            if !json_mode {
                eprintln!("Error: {e}");
            }
            process::exit(e.exit_code());
        }
    }
}

/// Main application logic
async fn run(cli: Cli) -> Result<Status, CliError> {
    info!("Starting strap v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration with proper precedence:
    // 1. Start with file config (or defaults)
    let mut config = Config::load_or_default(cli.global.config.as_deref()).await?;

    // 2. Merge environment variables
    config.merge_env()?;

    // 3. Apply CLI flags (highest precedence)
    apply_cli_config(&mut config, &cli.global, &cli.command);

    let run_args = cli
        .command
        .run_args()
        .cloned()
        .ok_or_else(|| CliError::InvalidArguments("command takes no catalog".to_string()))?;

    let catalog = Catalog::load(&run_args.catalog).await?;
    let lock = StateLock::acquire(&config.lock_path()?)?;
    let store = Arc::new(SqliteResumeStore::open(&config.db_path()?).await?);

    let (event_sender, event_receiver) = strap_events::channel();

    let cancelled = Arc::new(AtomicBool::new(false));
    spawn_ctrl_c_handler(cancelled.clone());

    let color = config.general.color;
    let colors_enabled = match color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => console::Term::stderr().features().colors_supported(),
    };
    let interactive = !cli.global.json && console::user_attended_stderr();
    let renderer = OutputRenderer::new(cli.global.json, color);
    let mut event_handler = EventHandler::new(colors_enabled);
    if cli.global.json {
        event_handler = event_handler.quiet();
    }

    let engine = build_engine(
        &config,
        catalog,
        cli.command.action(),
        &run_args,
        store.clone(),
        Arc::new(ConsoleObserver::new(cancelled, interactive)),
        event_sender,
        lock,
    )?;

    let parent = run_args.parent_window.map(WindowHandle);
    let result =
        execute_command_with_events(cli.command, engine, parent, event_receiver, &mut event_handler)
            .await;
    store.close().await;
    let report = result?;

    renderer.render_report(&report)?;

    let status = report.status();
    info!(%status, "Command completed");
    Ok(status)
}

#[allow(clippy::too_many_arguments)]
fn build_engine(
    config: &Config,
    catalog: Catalog,
    action: TopLevelAction,
    run_args: &RunArgs,
    store: Arc<SqliteResumeStore>,
    observer: Arc<ConsoleObserver>,
    event_sender: strap_events::EventSender,
    lock: StateLock,
) -> Result<Engine, CliError> {
    let command = Command::new(action)
        .with_display(config.engine.display)
        .with_restart(config.engine.restart)
        .with_resumed(run_args.resume);

    let exe = std::env::current_exe()?;
    let launcher = ProcessLauncher::with_prefix(&config.elevation.launcher, &exe);
    let broker = ElevationBroker::new(Arc::new(launcher))
        .with_response_timeout(config.elevation.response_timeout());

    Ok(Engine::builder(command, catalog)
        .with_probe(Arc::new(CommandProbe))
        .with_installer(Arc::new(CommandInstaller))
        .with_store(store)
        .with_observer(observer)
        .with_broker(broker)
        .with_restarter(Arc::new(CommandRestarter::default()))
        .with_max_retries(config.engine.max_retries)
        .with_event_sender(event_sender)
        .with_lock(lock)
        .build()?)
}

/// Execute command with concurrent event handling
async fn execute_command_with_events(
    command: Commands,
    engine: Engine,
    parent: Option<WindowHandle>,
    mut event_receiver: EventReceiver,
    event_handler: &mut EventHandler,
) -> Result<RunReport, CliError> {
    let mut command_future = Box::pin(execute_command(command, engine, parent));

    // Handle events concurrently with command execution
    loop {
        select! {
            // Command completed
            result = &mut command_future => {
                // Drain any remaining events
                while let Ok(event) = event_receiver.try_recv() {
                    event_handler.handle_event(event);
                }
                return result;
            }

            // Event received
            event = event_receiver.recv() => {
                match event {
                    Some(event) => event_handler.handle_event(event),
                    None => { /* Channel closed: keep waiting for command to finish */ }
                }
            }
        }
    }
}

/// Run the phases the command asks for, stopping at the first that does not succeed
async fn execute_command(
    command: Commands,
    mut engine: Engine,
    parent: Option<WindowHandle>,
) -> Result<RunReport, CliError> {
    let detected = engine.detect().await?;
    let action = match command {
        Commands::Detect { .. } => return Ok(RunReport::Detect(detected)),
        Commands::Plan { action, .. } | Commands::Apply { action, .. } => action,
        Commands::ElevatedPeer { .. } => {
            return Err(CliError::InvalidArguments(
                "the peer subcommand cannot run phases".to_string(),
            ))
        }
    };
    if detected.status == Status::Cancelled {
        return Ok(RunReport::Detect(detected));
    }

    let planned = engine.plan(action)?;
    if planned.status != Status::Success || matches!(command, Commands::Plan { .. }) {
        return Ok(RunReport::Plan(planned));
    }

    let applied = engine.apply(parent).await?;
    Ok(RunReport::Apply(applied))
}

/// Serve the privileged peer on stdin/stdout; returns the exit code
async fn run_peer(parent_window: Option<u64>, debug: bool) -> i32 {
    init_peer_tracing(debug);
    info!(parent = ?parent_window.map(WindowHandle), "elevated peer starting");

    let reader = BufReader::new(tokio::io::stdin());
    let writer = tokio::io::stdout();
    match strap_engine::serve_peer(reader, writer, Arc::new(CommandInstaller)).await {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "elevated peer failed");
            host_exit_code(Status::from_error(&e))
        }
    }
}

fn spawn_ctrl_c_handler(cancelled: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling at the next safe point");
            cancelled.store(true, Ordering::SeqCst);
        }
    });
}

/// Directory debug logs are written to
fn log_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("strap")
        .join("logs")
}

fn log_file(prefix: &str) -> Option<std::fs::File> {
    let log_dir = log_dir();
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory: {e}");
        return None;
    }
    let path = log_dir.join(format!(
        "{prefix}-{}.log",
        chrono::Utc::now().format("%Y%m%d-%H%M%S")
    ));
    match std::fs::File::create(&path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("Warning: Failed to create log file {}: {e}", path.display());
            None
        }
    }
}

fn debug_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("info,strap=debug,strap_engine=debug,strap_state=info")
    })
}

/// Initialize tracing/logging
fn init_tracing(json_mode: bool, debug_enabled_flag: bool) {
    // Check if debug logging is enabled
    let debug_enabled = std::env::var("RUST_LOG").is_ok() || debug_enabled_flag;

    if json_mode {
        // JSON mode: suppress all console output to avoid contaminating JSON
        if debug_enabled {
            if let Some(file) = log_file("strap") {
                tracing_subscriber::fmt()
                    .json()
                    .with_writer(file)
                    .with_env_filter(debug_filter())
                    .init();
                return;
            }
        }
        tracing_subscriber::fmt()
            .with_writer(std::io::sink)
            .with_env_filter("off")
            .init();
    } else if debug_enabled {
        // Debug mode: structured JSON logs to file
        if let Some(file) = log_file("strap") {
            tracing_subscriber::fmt()
                .json()
                .with_writer(file)
                .with_env_filter(debug_filter())
                .init();
            eprintln!("Debug logging enabled: {}", log_dir().display());
        } else {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(debug_filter())
                .init();
        }
    } else {
        // Normal mode: minimal logging to stderr
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new("warn,strap=warn,strap_engine=warn")
                }),
            )
            .init();
    }
}

/// The peer's stdout carries the protocol, so it only ever logs to stderr or a file
fn init_peer_tracing(debug: bool) {
    if debug {
        if let Some(file) = log_file("strap-peer") {
            tracing_subscriber::fmt()
                .json()
                .with_writer(file)
                .with_env_filter(debug_filter())
                .init();
            return;
        }
    }
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
}

/// Apply CLI configuration overrides (highest precedence)
fn apply_cli_config(config: &mut Config, global: &cli::GlobalArgs, command: &cli::Commands) {
    // Global CLI flags override everything
    if let Some(color) = global.color {
        config.general.color = color;
    }

    // Command-specific CLI flags
    if let Some(display) = command.run_args().and_then(|run| run.display) {
        config.engine.display = display;
    }
    if let Commands::Apply {
        restart: Some(restart),
        ..
    } = command
    {
        config.engine.restart = *restart;
    }
}
