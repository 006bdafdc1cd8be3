use std::process::ExitCode;

use cdemu::cli::{self, Console, Outcome};
use cdemu::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Diagnostics go to stderr so command output on stdout stays parseable.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cdemu=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_logging();

    let mut console = Console::stdout();

    let (config, warning) = Config::load();
    if let Some(warning) = warning {
        console.warning(warning);
    }

    let outcome = match cli::parse(std::env::args_os(), &mut console) {
        Some(cli) => cli::run(&cli, &config, &mut console).await,
        None => Outcome::Failure,
    };
    console.flush();

    if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
