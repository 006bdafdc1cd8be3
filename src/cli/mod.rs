//! The `cdemu` command-line client.
//!
//! Flags are parsed with clap; the command keyword and its parameters are
//! matched against a static command table and validated before the client
//! connects to the daemon. One invocation runs exactly one command.

mod commands;
mod console;
mod handlers;

pub use commands::{find, ArgError, CommandKind, CommandSpec, Request, Target, COMMANDS};
pub use console::{absolute_path, parse_mask, parse_number, Console, PasswordPrompt, TerminalPrompt};
pub use handlers::{execute, Outcome};

use std::ffi::OsString;
use std::io::Write;

use clap::Parser;
use tracing::debug;

use crate::config::Config;
use crate::dbus::{BusType, DaemonError, Session};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Command-line flags. Help and version are handled by hand to keep the
/// traditional output.
#[derive(Parser, Debug, Default)]
#[command(name = "cdemu", disable_help_flag = true, disable_version_flag = true)]
pub struct Cli {
    /// Display help message
    #[arg(short, long)]
    pub help: bool,

    /// Display program version
    #[arg(short = 'v', long)]
    pub version: bool,

    /// D-Bus bus type to use: "session" or "system"
    #[arg(short, long, value_name = "BUS")]
    pub bus: Option<String>,

    /// Command to run
    pub command: Option<String>,

    /// Command parameters
    #[arg(allow_negative_numbers = true)]
    pub args: Vec<String>,
}

/// What to do after looking at the command line.
#[derive(Debug, PartialEq, Eq)]
pub enum Plan {
    /// Nothing left to do; the invocation ends with this outcome.
    Exit(Outcome),
    /// Connect to the daemon on `bus` and run `request`.
    Run { request: Request, bus: BusType },
}

/// Parse the process arguments, printing usage on unknown options.
pub fn parse<I, T, W>(args: I, console: &mut Console<W>) -> Option<Cli>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    W: Write,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => Some(cli),
        Err(e) => {
            debug!("Argument parsing failed: {}", e);
            console.error("Unknown option");
            print_full_usage(console);
            None
        }
    }
}

/// Decide what to run without touching the bus.
pub fn plan<W: Write>(cli: &Cli, config: &Config, console: &mut Console<W>) -> Plan {
    if cli.version {
        console.line(format_args!("cdemu {}", VERSION));
        return Plan::Exit(Outcome::Success);
    }

    let Some(name) = cli.command.as_deref() else {
        print_full_usage(console);
        return Plan::Exit(if cli.help {
            Outcome::Success
        } else {
            Outcome::Failure
        });
    };

    let Some(spec) = find(name) else {
        console.error(format_args!("Unknown command: {}", name));
        print_full_usage(console);
        return Plan::Exit(Outcome::Failure);
    };

    if cli.help {
        print_command_usage(console, spec);
        return Plan::Exit(Outcome::Success);
    }

    let request = match spec.parse(&cli.args) {
        Ok(request) => request,
        Err(e) => {
            console.error(&e);
            if matches!(e, ArgError::Count(_)) {
                print_command_usage(console, spec);
            }
            return Plan::Exit(Outcome::Failure);
        }
    };

    let (bus, warning) = match cli.bus.as_deref() {
        Some(name) => BusType::resolve(name),
        None => config.bus(),
    };
    if let Some(warning) = warning {
        console.warning(warning);
    }

    Plan::Run { request, bus }
}

/// Run one invocation to completion.
pub async fn run<W: Write>(cli: &Cli, config: &Config, console: &mut Console<W>) -> Outcome {
    let (request, bus) = match plan(cli, config, console) {
        Plan::Exit(outcome) => return outcome,
        Plan::Run { request, bus } => (request, bus),
    };

    let session = match Session::connect(bus).await {
        Ok(session) => session,
        Err(e) => {
            report_connect_error(console, bus, &e);
            return Outcome::Failure;
        }
    };

    execute(session.api(), &request, console, &TerminalPrompt).await
}

fn report_connect_error<W: Write>(console: &mut Console<W>, bus: BusType, error: &DaemonError) {
    match error {
        DaemonError::ServiceNotRunning(_) => console.warning(error),
        DaemonError::VersionMismatch { .. } | DaemonError::VersionUnavailable(_) => {
            console.error(error)
        }
        other => console.error(format_args!("Failed to connect to CDEmu daemon: {}", other)),
    }
    console.error(format_args!("Failed to connect to daemon (bus: '{}')!", bus));
}

pub fn print_full_usage<W: Write>(console: &mut Console<W>) {
    console.line("Usage: cdemu [options] <command> <command parameters>");
    console.blank();
    console.line("Commands:");
    for spec in COMMANDS {
        console.line(format_args!("  {:<25} {}", spec.name, spec.help));
    }
    console.blank();
    console.line("Options:");
    console.line(format_args!("  {:<25} {}", "-h, --help", "displays help message"));
    console.line(format_args!(
        "  {:<25} {}",
        "-v, --version", "displays program version"
    ));
    console.line(format_args!(
        "  {:<25} {}",
        "-b, --bus",
        "sets D-BUS bus type to use; valid values are 'session' and 'system'"
    ));
}

pub fn print_command_usage<W: Write>(console: &mut Console<W>, spec: &CommandSpec) {
    let line = format!("Usage: cdemu {} {}", spec.name, spec.usage);
    console.line(line.trim_end());
}
