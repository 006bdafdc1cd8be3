//! Error model for calls into the CDEmu daemon.

use super::session::BusType;
use thiserror::Error;
use zbus::DBusError;

/// D-Bus error name the GLib bindings of older daemons use for an encrypted image.
pub const LEGACY_NEEDS_PASSWORD_ERROR: &str =
    "org.freedesktop.DBus.GLib.UnmappedError.MirageErrorQuark.Code233492496";

/// Suffix of the registered libMirage error name for an encrypted image.
pub const NEEDS_PASSWORD_ERROR_SUFFIX: &str = ".encrypted-image";

/// D-Bus error name reported when nobody owns the requested service.
pub const SERVICE_UNKNOWN_ERROR: &str = "org.freedesktop.DBus.Error.ServiceUnknown";

#[derive(Error, Debug)]
pub enum DaemonError {
    /// The bus itself could not be reached or the transport failed.
    #[error("D-Bus error: {0}")]
    Bus(zbus::Error),

    /// Nobody owns the daemon's well-known name on the selected bus.
    #[error("CDEmu daemon is not running on the {0} bus")]
    ServiceNotRunning(BusType),

    #[error("Failed to acquire daemon interface version (this most likely means your daemon is out-of-date): {0}")]
    VersionUnavailable(String),

    #[error("CDEmu daemon interface version {found} detected, but at least version {required} is required!")]
    VersionMismatch { found: i32, required: i32 },

    /// The image is encrypted; retry the load with a password.
    #[error("The image is encrypted and requires a password")]
    NeedsPassword,

    /// The daemon rejected the call.
    #[error("{message}")]
    Remote { name: String, message: String },

    #[error("Unexpected reply from daemon: {0}")]
    InvalidReply(String),

    #[error("Invalid device number {0}")]
    InvalidDevice(i32),

    #[error("Not connected to daemon")]
    NotConnected,
}

impl DaemonError {
    /// Build a remote error, falling back to the error name when the daemon sent no text.
    pub fn remote(name: impl Into<String>, message: Option<&str>) -> Self {
        let name = name.into();
        let message = match message {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => name.clone(),
        };
        Self::Remote { name, message }
    }

    /// Whether the given D-Bus error name signals an encrypted image.
    pub fn is_needs_password_name(name: &str) -> bool {
        name == LEGACY_NEEDS_PASSWORD_ERROR || name.ends_with(NEEDS_PASSWORD_ERROR_SUFFIX)
    }

    /// Whether this error means the daemon went away rather than refused the call.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::Bus(_) | Self::ServiceNotRunning(_) | Self::NotConnected => true,
            Self::Remote { name, .. } => {
                name == SERVICE_UNKNOWN_ERROR
                    || name == "org.freedesktop.DBus.Error.NoReply"
                    || name == "org.freedesktop.DBus.Error.Disconnected"
            }
            _ => false,
        }
    }
}

impl From<zbus::Error> for DaemonError {
    fn from(err: zbus::Error) -> Self {
        match err {
            zbus::Error::MethodError(name, message, _) => {
                if Self::is_needs_password_name(name.as_str()) {
                    Self::NeedsPassword
                } else {
                    Self::remote(name.as_str(), message.as_deref())
                }
            }
            zbus::Error::FDO(fdo) => {
                let name = fdo.name().to_string();
                if Self::is_needs_password_name(&name) {
                    Self::NeedsPassword
                } else {
                    Self::remote(name, fdo.description())
                }
            }
            zbus::Error::Variant(e) => Self::InvalidReply(e.to_string()),
            other => Self::Bus(other),
        }
    }
}

impl From<zbus::fdo::Error> for DaemonError {
    fn from(err: zbus::fdo::Error) -> Self {
        zbus::Error::FDO(Box::new(err)).into()
    }
}
