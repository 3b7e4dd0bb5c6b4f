use std::path::PathBuf;
use std::time::Duration;

use asistat::app::App;
use asistat::config::{self, Config, load_config, load_config_from_path};
use asistat::event::EventHandler;
use asistat::format::snapshot_line;
use asistat::logging;
use asistat::system::permission::PermissionGate;
use clap::{Parser, ValueEnum};
use color_eyre::Result;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(
    name = "asistat",
    about = "Apple-Silicon power and utilization collector"
)]
struct Cli {
    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Poll interval in milliseconds
    #[arg(long)]
    refresh_rate: Option<u64>,

    /// File the sampler writes its plist samples to
    #[arg(long)]
    output_file: Option<PathBuf>,

    /// Log level: error, warn, info, debug, trace
    #[arg(long)]
    log_level: Option<String>,

    /// Write JSON-lines logs to this file instead of stderr.
    #[arg(long)]
    log_json: Option<PathBuf>,

    /// Snapshot output on stdout.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Print whether passwordless sampling is available and exit.
    #[arg(long, default_value_t = false)]
    check_permission: bool,

    /// Ask for administrator approval to enable passwordless sampling.
    #[arg(long, default_value_t = false)]
    setup: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = load_config_for_cli(&cli);

    let level = logging::parse_level(&config.general.log_level);
    match &cli.log_json {
        Some(path) => logging::init_json(path, level)?,
        None => logging::init_stderr(level)?,
    }

    if cli.check_permission {
        let gate = PermissionGate::new(&config.sampler, &config.permission);
        let granted = gate.check();
        println!("{}", if granted { "granted" } else { "not granted" });
        return Ok(());
    }

    run(config, &cli).await
}

async fn run(config: Config, cli: &Cli) -> Result<()> {
    let tick_rate = Duration::from_millis(config.general.refresh_rate_ms.max(1));
    let mut app = App::new(&config);
    let events = EventHandler::new(tick_rate);
    let handle = events.handle();

    if cli.setup {
        handle.request_setup();
    }

    let ctrl_c_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping");
            ctrl_c_handle.stop();
        }
    });

    let format = cli.format;
    let mut snapshots = app.collector.subscribe();
    let mut permission = app.collector.permission();
    let printer = tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            match format {
                OutputFormat::Text => {
                    let lock = if *permission.borrow_and_update() { "" } else { " [host only]" };
                    println!("{}{lock}", snapshot_line(&snapshot));
                }
                OutputFormat::Json => match serde_json::to_string(&snapshot) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!("failed to encode snapshot: {e}"),
                },
            }
        }
    });

    app.run(events).await;
    // Dropping the app closes the snapshot channel and ends the printer.
    drop(app);
    let _ = printer.await;
    Ok(())
}

fn load_config_for_cli(cli: &Cli) -> config::Config {
    let mut config = match &cli.config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    };

    if let Some(rate) = cli.refresh_rate {
        config.general.refresh_rate_ms = rate;
    }
    if let Some(ref path) = cli.output_file {
        config.sampler.output_file = path.clone();
    }
    if let Some(ref level) = cli.log_level {
        config.general.log_level = level.clone();
    }

    config
}
