//! System tray icon and menu using D-Bus StatusNotifierItem.
//!
//! Uses the ksni crate for cross-desktop tray support (KDE, GNOME with extensions, etc.)
//! without requiring GTK dependencies. The menu is rendered from a [`TrayModel`]
//! snapshot; clicks come back as [`TrayEvent`]s.

use thiserror::Error;

mod sni;

pub use sni::TrayManager;

#[derive(Error, Debug)]
pub enum TrayError {
    #[error("System tray not supported: no D-Bus session bus")]
    NotSupported,

    #[error("D-Bus error: {0}")]
    DBus(String),
}

/// Events from the system tray menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayEvent {
    LoadDevice(i32),
    UnloadDevice(i32),
    SetDpmEmulation(i32, bool),
    SetTrEmulation(i32, bool),
    /// Device number and catalog index of the entry to flip.
    ToggleDaemonMaskBit(i32, usize),
    ToggleLibraryMaskBit(i32, usize),
    ShowProperties(i32),
    SetSystemBus(bool),
    SetNotifications(bool),
    Quit,
}

/// Menu state for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub number: i32,
    pub label: String,
    /// The device's state could be fetched.
    pub available: bool,
    pub loaded: bool,
    pub dpm_emulation: bool,
    pub tr_emulation: bool,
    /// One state per daemon debug mask catalog entry.
    pub daemon_mask: Vec<bool>,
    pub library_mask: Vec<bool>,
}

impl DeviceEntry {
    pub fn status_text(&self) -> &'static str {
        match (self.available, self.loaded) {
            (false, _) => "Status: Unavailable",
            (true, true) => "Status: Loaded",
            (true, false) => "Status: Empty",
        }
    }
}

/// Everything the tray menu shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrayModel {
    pub connected: bool,
    pub use_system_bus: bool,
    pub show_notifications: bool,
    pub daemon_masks: Vec<String>,
    pub library_masks: Vec<String>,
    pub devices: Vec<DeviceEntry>,
}

impl TrayModel {
    pub fn icon_name(&self) -> &'static str {
        if self.connected {
            "media-optical"
        } else {
            "media-optical-symbolic"
        }
    }

    pub fn status_text(&self) -> String {
        if !self.connected {
            return "Not connected to CDEmu daemon".to_string();
        }
        let loaded = self.devices.iter().filter(|d| d.loaded).count();
        format!("{} device(s), {} loaded", self.devices.len(), loaded)
    }
}

/// Check if system tray is likely to be supported
pub fn is_tray_supported() -> bool {
    std::env::var("DBUS_SESSION_BUS_ADDRESS").is_ok()
}
