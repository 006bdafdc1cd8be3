//! Bus selection, connection setup and the D-Bus backed `DaemonApi`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zbus::zvariant::Value;
use zbus::Connection;

use super::api::{verify_version, DaemonApi, LoadParams};
use super::error::DaemonError;
use super::proxy::CdemuDaemonProxy;
use super::types::{
    DebugMask, DeviceMapping, DeviceStatus, FragmentInfo, OptionKind, OptionValue, ParserInfo,
};

/// Well-known bus name of the CDEmu daemon.
pub const BUS_NAME: &str = "net.sf.cdemu.CDEMUD_Daemon";

/// Object path of the daemon interface.
pub const OBJECT_PATH: &str = "/CDEMUD_Daemon";

/// Lowest daemon interface version these clients understand.
pub const MIN_INTERFACE_VERSION: i32 = 4;

/// Message bus the daemon is expected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusType {
    Session,
    #[default]
    System,
}

impl BusType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::System => "system",
        }
    }

    /// Resolve a user supplied bus name.
    ///
    /// Unknown names fall back to the default bus and come with a warning to show.
    pub fn resolve(name: &str) -> (Self, Option<String>) {
        match name.parse() {
            Ok(bus) => (bus, None),
            Err(_) => (
                Self::default(),
                Some(format!("Invalid bus parameter '{}', using default!", name)),
            ),
        }
    }

    /// Open a new connection to this bus.
    pub async fn open(self) -> zbus::Result<Connection> {
        match self {
            Self::Session => Connection::session().await,
            Self::System => Connection::system().await,
        }
    }
}

impl fmt::Display for BusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BusType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session" => Ok(Self::Session),
            "system" => Ok(Self::System),
            other => Err(format!("unknown bus '{}'", other)),
        }
    }
}

/// Whether somebody owns the daemon's well-known name on this connection.
pub async fn daemon_present(connection: &Connection) -> Result<bool, DaemonError> {
    let dbus = zbus::fdo::DBusProxy::new(connection).await?;
    let name = zbus::names::BusName::try_from(BUS_NAME).map_err(zbus::Error::from)?;
    Ok(dbus.name_has_owner(name).await?)
}

/// `DaemonApi` over a live D-Bus connection.
#[derive(Clone)]
pub struct DaemonClient {
    proxy: CdemuDaemonProxy<'static>,
}

impl DaemonClient {
    async fn new(connection: &Connection) -> Result<Self, DaemonError> {
        let proxy = CdemuDaemonProxy::builder(connection)
            .destination(BUS_NAME)?
            .path(OBJECT_PATH)?
            .build()
            .await?;
        Ok(Self { proxy })
    }
}

#[async_trait]
impl DaemonApi for DaemonClient {
    async fn interface_version(&self) -> Result<i32, DaemonError> {
        Ok(self.proxy.get_daemon_interface_version().await?)
    }

    async fn daemon_version(&self) -> Result<String, DaemonError> {
        Ok(self.proxy.get_daemon_version().await?)
    }

    async fn library_version(&self) -> Result<String, DaemonError> {
        Ok(self.proxy.get_library_version().await?)
    }

    async fn number_of_devices(&self) -> Result<i32, DaemonError> {
        Ok(self.proxy.get_number_of_devices().await?)
    }

    async fn device_status(&self, device: i32) -> Result<DeviceStatus, DaemonError> {
        debug!("DeviceGetStatus({})", device);
        Ok(self.proxy.device_get_status(device).await?.into())
    }

    async fn device_mapping(&self, device: i32) -> Result<DeviceMapping, DaemonError> {
        Ok(self.proxy.device_get_mapping(device).await?.into())
    }

    async fn device_load(
        &self,
        device: i32,
        filenames: &[String],
        params: &LoadParams,
    ) -> Result<(), DaemonError> {
        debug!("DeviceLoad({}, {:?})", device, filenames);
        let filenames: Vec<&str> = filenames.iter().map(String::as_str).collect();
        let parameters: HashMap<&str, Value<'_>> = params
            .entries()
            .into_iter()
            .map(|(key, value)| (key, Value::from(value)))
            .collect();
        Ok(self.proxy.device_load(device, &filenames, parameters).await?)
    }

    async fn device_unload(&self, device: i32) -> Result<(), DaemonError> {
        debug!("DeviceUnload({})", device);
        Ok(self.proxy.device_unload(device).await?)
    }

    async fn device_option(
        &self,
        device: i32,
        kind: OptionKind,
    ) -> Result<OptionValue, DaemonError> {
        let values = self.proxy.device_get_option(device, kind.name()).await?;
        OptionValue::from_values(kind, &values)
    }

    async fn set_device_option(
        &self,
        device: i32,
        value: &OptionValue,
    ) -> Result<(), DaemonError> {
        debug!("DeviceSetOption({}, {}, {})", device, value.kind(), value);
        let values = value.to_values();
        Ok(self
            .proxy
            .device_set_option(device, value.kind().name(), &values)
            .await?)
    }

    async fn supported_parsers(&self) -> Result<Vec<ParserInfo>, DaemonError> {
        let parsers = self.proxy.enum_supported_parsers().await?;
        Ok(parsers.into_iter().map(ParserInfo::from).collect())
    }

    async fn supported_fragments(&self) -> Result<Vec<FragmentInfo>, DaemonError> {
        let fragments = self.proxy.enum_supported_fragments().await?;
        Ok(fragments.into_iter().map(FragmentInfo::from).collect())
    }

    async fn daemon_debug_masks(&self) -> Result<Vec<DebugMask>, DaemonError> {
        let masks = self.proxy.enum_daemon_debug_masks().await?;
        Ok(masks.into_iter().map(DebugMask::from).collect())
    }

    async fn library_debug_masks(&self) -> Result<Vec<DebugMask>, DaemonError> {
        let masks = self.proxy.enum_library_debug_masks().await?;
        Ok(masks.into_iter().map(DebugMask::from).collect())
    }
}

/// A connected daemon whose interface version has been verified.
///
/// The only way to reach a `DaemonApi` from the binaries is through a session,
/// so no call is made before the version check passes.
pub struct Session<A = DaemonClient> {
    bus: BusType,
    api: A,
    interface_version: i32,
}

impl Session<DaemonClient> {
    /// Connect to the daemon on the given bus and verify its interface version.
    pub async fn connect(bus: BusType) -> Result<Self, DaemonError> {
        debug!("Connecting to the {} bus", bus);
        let connection = bus.open().await.map_err(DaemonError::Bus)?;

        if !daemon_present(&connection).await? {
            return Err(DaemonError::ServiceNotRunning(bus));
        }

        let client = DaemonClient::new(&connection).await?;
        Self::establish(bus, client).await
    }
}

impl<A: DaemonApi> Session<A> {
    /// Verify the interface version of an already reachable daemon.
    pub async fn establish(bus: BusType, api: A) -> Result<Self, DaemonError> {
        let interface_version = verify_version(&api, MIN_INTERFACE_VERSION).await?;
        info!(
            "Connected to CDEmu daemon on the {} bus (interface version {})",
            bus, interface_version
        );
        Ok(Self {
            bus,
            api,
            interface_version,
        })
    }

    pub fn bus(&self) -> BusType {
        self.bus
    }

    pub fn interface_version(&self) -> i32 {
        self.interface_version
    }

    pub fn api(&self) -> &A {
        &self.api
    }
}
