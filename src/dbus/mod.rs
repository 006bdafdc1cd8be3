//! Client side of the CDEmu daemon's D-Bus interface.
//!
//! ```text
//! ┌──────────────┐   net.sf.cdemu.CDEMUD_Daemon   ┌──────────────┐
//! │ cdemu        │ ─────── method calls ────────> │ CDEmu daemon │
//! │ gcdemu       │ <──────── signals ──────────── │              │
//! └──────────────┘                                └──────────────┘
//! ```
//!
//! All calls go through [`DaemonApi`]. The binaries obtain one only from a
//! [`Session`], which checks that the daemon is present and speaks a
//! supported interface version.
//!
//! ```ignore
//! let session = Session::connect(BusType::System).await?;
//! let devices = session.api().number_of_devices().await?;
//! ```

mod api;
mod error;
mod proxy;
mod session;
mod signals;
mod types;

pub use api::{verify_version, DaemonApi, LoadParams};
pub use error::{DaemonError, SERVICE_UNKNOWN_ERROR};
pub use session::{BusType, DaemonClient, Session, BUS_NAME, MIN_INTERFACE_VERSION, OBJECT_PATH};
pub use signals::{DaemonEvent, SignalPump};
pub use types::{
    DebugMask, DebugMaskCatalog, DeviceId, DeviceMapping, DeviceStatus, FragmentInfo, OptionKind,
    OptionValue, ParserInfo, PRODUCT_ID_LEN, REVISION_LEN, VENDOR_ID_LEN, VENDOR_SPECIFIC_LEN,
};
