//! Clients for the CDEmu optical disc emulation daemon.
//!
//! The `cdemu` binary is a one-shot command-line client; `gcdemu` is a tray
//! applet with a per-device properties window. Both talk to the daemon only
//! through the D-Bus client in [`dbus`].

pub mod applet;
pub mod cli;
pub mod config;
pub mod dbus;
pub mod gui;
pub mod notify;
pub mod panic_handler;
pub mod tray;

#[cfg(test)]
mod testing;

// Re-export commonly used types for convenience
pub use config::Config;
pub use dbus::{BusType, DaemonApi, DaemonError, Session};
