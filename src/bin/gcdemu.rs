use anyhow::Context;
use cdemu::{applet, gui, panic_handler, BusType, Config};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "gcdemu")]
#[command(author, version, about = "Tray applet for controlling CDEmu devices", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// D-Bus bus to use ("session" or "system"); defaults to the saved setting
    #[arg(short, long, global = true)]
    bus: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tray applet (default)
    Applet,

    /// Open the properties window of one device
    Properties {
        /// Device number
        device: i32,
    },
}

/// Log to stderr and to a daily file in the data directory.
///
/// The returned guard flushes the file writer and must live until exit.
fn init_logging(verbose: bool) -> Option<WorkerGuard> {
    let filter = if verbose {
        EnvFilter::new("cdemu=debug,gcdemu=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("cdemu=info,gcdemu=info"))
    };

    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match Config::data_dir() {
        Ok(dir) => {
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "gcdemu.log"));
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

fn main() -> anyhow::Result<()> {
    panic_handler::install();

    let cli = Cli::parse();
    let _guard = init_logging(cli.verbose);

    let (config, warning) = Config::load();
    if let Some(warning) = warning {
        warn!("{}", warning);
    }

    let bus = resolve_bus(cli.bus.as_deref(), config.applet.bus());

    match cli.command.unwrap_or(Commands::Applet) {
        Commands::Applet => {
            let mut config = config;
            config.applet.use_system_bus = bus == BusType::System;
            info!("Starting gCDEmu {}", env!("CARGO_PKG_VERSION"));

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(applet::run(config))
        }
        Commands::Properties { device } => gui::run_properties(device, bus),
    }
}

/// Bus from the command line; an unknown name falls back to the saved setting.
fn resolve_bus(flag: Option<&str>, saved: BusType) -> BusType {
    let Some(name) = flag else {
        return saved;
    };
    match BusType::resolve(name) {
        (bus, None) => bus,
        (_, Some(warning)) => {
            warn!("{}", warning);
            saved
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_bus() {
        assert_eq!(resolve_bus(None, BusType::Session), BusType::Session);
        assert_eq!(resolve_bus(Some("system"), BusType::Session), BusType::System);
        assert_eq!(resolve_bus(Some("tram"), BusType::Session), BusType::Session);
    }

    #[test]
    fn test_unknown_bus_is_accepted_by_parser() {
        let cli = Cli::try_parse_from(["gcdemu", "--bus", "tram", "properties", "3"]).unwrap();
        assert_eq!(cli.bus.as_deref(), Some("tram"));
        assert!(matches!(cli.command, Some(Commands::Properties { device: 3 })));
    }
}
