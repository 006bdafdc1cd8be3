//! Async abstraction over the daemon's remote interface.

use async_trait::async_trait;

use super::error::DaemonError;
use super::types::{
    DebugMask, DeviceMapping, DeviceStatus, FragmentInfo, OptionKind, OptionValue, ParserInfo,
};

/// Optional parameters for `DeviceLoad`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadParams {
    pub password: Option<String>,
}

impl LoadParams {
    pub fn with_password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
        }
    }

    /// Parameter pairs in the order they are sent.
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        let mut entries = Vec::new();
        if let Some(password) = &self.password {
            entries.push(("password", password.as_str()));
        }
        entries
    }
}

/// Every remote call the clients make, with typed results.
///
/// Implemented by the D-Bus session and by the in-memory daemon used in tests.
#[async_trait]
pub trait DaemonApi: Send + Sync {
    async fn interface_version(&self) -> Result<i32, DaemonError>;
    async fn daemon_version(&self) -> Result<String, DaemonError>;
    async fn library_version(&self) -> Result<String, DaemonError>;

    async fn number_of_devices(&self) -> Result<i32, DaemonError>;
    async fn device_status(&self, device: i32) -> Result<DeviceStatus, DaemonError>;
    async fn device_mapping(&self, device: i32) -> Result<DeviceMapping, DaemonError>;

    async fn device_load(
        &self,
        device: i32,
        filenames: &[String],
        params: &LoadParams,
    ) -> Result<(), DaemonError>;
    async fn device_unload(&self, device: i32) -> Result<(), DaemonError>;

    async fn device_option(&self, device: i32, kind: OptionKind)
        -> Result<OptionValue, DaemonError>;
    async fn set_device_option(&self, device: i32, value: &OptionValue)
        -> Result<(), DaemonError>;

    async fn supported_parsers(&self) -> Result<Vec<ParserInfo>, DaemonError>;
    async fn supported_fragments(&self) -> Result<Vec<FragmentInfo>, DaemonError>;
    async fn daemon_debug_masks(&self) -> Result<Vec<DebugMask>, DaemonError>;
    async fn library_debug_masks(&self) -> Result<Vec<DebugMask>, DaemonError>;
}

/// Check the daemon speaks at least interface version `required`.
///
/// Returns the version found.
pub async fn verify_version(api: &dyn DaemonApi, required: i32) -> Result<i32, DaemonError> {
    let found = api
        .interface_version()
        .await
        .map_err(|e| DaemonError::VersionUnavailable(e.to_string()))?;

    if found < required {
        return Err(DaemonError::VersionMismatch { found, required });
    }
    Ok(found)
}
