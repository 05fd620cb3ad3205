use std::io;
use std::path::Path;
use std::sync::Arc;

use canary::config::{self, CliArgs, Command, Config, RadioAction};
use canary::network::{
    LocalBroadcaster, LocalContext, NetworkStateWatcher, NmHost, NmMobileDecoder, Notification,
    StateChangeEvent, StateCode, StateKind, StateListener,
};
use canary::{CanaryService, FeatureSet};
use chrono::{DateTime, Local};
use clap::Parser;
use color_eyre::eyre::{eyre, Result, WrapErr};
use color_eyre::Section;
use serde::Serialize;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

/// Context id the CLI uses for whichever host it binds to
const CLI_CONTEXT: u64 = 1;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = CliArgs::parse();

    if cli.print_default_config {
        print!("{}", config::default_config_toml());
        return Ok(());
    }

    let config = config::load(&cli)?;
    let _log_guard = init_logging(&config)?;

    info!("canary starting");

    let command = cli.command.clone().unwrap_or(Command::Watch {
        wifi: false,
        mobile: false,
        json: false,
    });

    match command {
        Command::Watch { .. } => watch(&config).await?,
        Command::Simulate { .. } => simulate(&config).await?,
        Command::Radio { kind, action } => radio(kind, action).await?,
        Command::Status => status().await?,
    }

    info!("canary exiting");
    Ok(())
}

/// Initialize tracing to stderr, or to a file through a non-blocking writer
fn init_logging(config: &Config) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    match config.log_file() {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre!("Log file path has no file name: {}", path.display()))?;
            std::fs::create_dir_all(dir)
                .wrap_err_with(|| format!("Failed to create log directory: {}", dir.display()))?;

            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
            Ok(None)
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────

async fn watch(config: &Config) -> Result<()> {
    let host = Arc::new(connect().await?);

    let features = config.features();
    if features.is_empty() {
        warn!("No radios enabled for watching; nothing will be reported.");
    }

    for kind in features.kinds() {
        let state = host
            .radio_enabled(kind)
            .await
            .map(StateCode::from_enabled)
            .unwrap_or(StateCode::Unknown);
        println!("{} radio is {}", kind, state);
    }

    let mut watcher = NetworkStateWatcher::bound(host);
    watcher.set_mobile_decoder(Some(Arc::new(NmMobileDecoder)));
    let printer = event_printer(config.watch.json);
    for kind in features.kinds() {
        watcher.add_listener(kind, printer.clone());
    }
    watcher.enable(features);
    let mut service = CanaryService::host(watcher);

    info!("Watching [{}]; press Ctrl-C to stop", features);
    tokio::signal::ctrl_c()
        .await
        .wrap_err("Failed to listen for Ctrl-C")?;

    service.shutdown();
    Ok(())
}

async fn connect() -> Result<NmHost> {
    NmHost::connect(CLI_CONTEXT)
        .await
        .wrap_err("Failed to connect to NetworkManager D-Bus")
        .suggestion("Is NetworkManager running? Try: systemctl status NetworkManager")
}

async fn simulate(config: &Config) -> Result<()> {
    let broadcaster = Arc::new(LocalBroadcaster::new());
    let context = Arc::new(LocalContext::new(CLI_CONTEXT, broadcaster.clone()));

    let mut service = CanaryService::kickoff(context, FeatureSet::WIFI);
    let binder = service.binder();
    binder.with_watcher(|watcher| watcher.add_wifi_listener(event_printer(config.watch.json)));

    let script = [
        (StateCode::Enabling, StateCode::Disabled),
        (StateCode::Enabled, StateCode::Enabling),
        (StateCode::Disabling, StateCode::Enabled),
        (StateCode::Disabled, StateCode::Disabling),
    ];

    let mut interval = tokio::time::interval(config.step_delay());
    for (current, previous) in script {
        interval.tick().await;
        broadcaster.send(CLI_CONTEXT, &Notification::wifi_state_changed(current, previous));
    }

    // With WiFi monitoring toggled off the same broadcast reaches nobody.
    binder.with_watcher(|watcher| watcher.toggle(FeatureSet::WIFI));
    interval.tick().await;
    let reached = broadcaster.send(
        CLI_CONTEXT,
        &Notification::wifi_state_changed(StateCode::Enabling, StateCode::Disabled),
    );
    info!("Broadcast after toggling WiFi off reached {} receiver(s)", reached);

    service.shutdown();
    Ok(())
}

async fn radio(kind: StateKind, action: RadioAction) -> Result<()> {
    let host = connect().await?;

    let enabled = match action {
        RadioAction::On => {
            host.set_radio_enabled(kind, true).await?;
            true
        }
        RadioAction::Off => {
            host.set_radio_enabled(kind, false).await?;
            false
        }
        RadioAction::Toggle => host.toggle_radio(kind).await?,
    };

    println!("{} radio is now {}", kind, if enabled { "on" } else { "off" });
    Ok(())
}

async fn status() -> Result<()> {
    let host = connect().await?;

    println!(
        "NetworkManager v{}",
        host.version().await.unwrap_or_default()
    );
    for kind in FeatureSet::ALL.kinds() {
        let state = host
            .radio_enabled(kind)
            .await
            .map(StateCode::from_enabled)
            .unwrap_or(StateCode::Unknown);
        let hardware = match host.radio_hardware_enabled(kind).await {
            Ok(true) => "hardware switch on",
            Ok(false) => "hardware switch off",
            Err(_) => "hardware switch unknown",
        };
        println!("{:<6} {} ({})", kind.to_string(), state, hardware);
    }
    Ok(())
}

// ── Output ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct EventLine<'a> {
    at: DateTime<Local>,
    #[serde(flatten)]
    event: &'a StateChangeEvent,
}

/// A listener that prints each event to stdout
fn event_printer(json: bool) -> Arc<dyn StateListener> {
    Arc::new(move |event: &StateChangeEvent| {
        let at = Local::now();
        if json {
            match serde_json::to_string(&EventLine { at, event }) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to encode event: {}", e),
            }
        } else {
            println!("{} {}", at.format("%H:%M:%S"), event);
        }
    })
}
