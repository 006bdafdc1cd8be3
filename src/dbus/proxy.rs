//! Generated proxy for the daemon's D-Bus interface.

use std::collections::HashMap;

use zbus::zvariant::{OwnedValue, Value};

use super::types::{FragmentTuple, ParserTuple};

#[zbus::proxy(
    interface = "net.sf.cdemu.CDEMUD_Daemon",
    default_service = "net.sf.cdemu.CDEMUD_Daemon",
    default_path = "/CDEMUD_Daemon",
    gen_blocking = false
)]
pub trait CdemuDaemon {
    fn get_daemon_version(&self) -> zbus::Result<String>;
    fn get_library_version(&self) -> zbus::Result<String>;
    fn get_daemon_interface_version(&self) -> zbus::Result<i32>;

    fn enum_daemon_debug_masks(&self) -> zbus::Result<Vec<(String, i32)>>;
    fn enum_library_debug_masks(&self) -> zbus::Result<Vec<(String, i32)>>;
    fn enum_supported_parsers(&self) -> zbus::Result<Vec<ParserTuple>>;
    fn enum_supported_fragments(&self) -> zbus::Result<Vec<FragmentTuple>>;

    fn get_number_of_devices(&self) -> zbus::Result<i32>;
    fn device_get_status(&self, device_number: i32) -> zbus::Result<(bool, String, Vec<String>)>;
    fn device_get_mapping(&self, device_number: i32) -> zbus::Result<(String, String)>;
    fn device_load(
        &self,
        device_number: i32,
        filenames: &[&str],
        parameters: HashMap<&str, Value<'_>>,
    ) -> zbus::Result<()>;
    fn device_unload(&self, device_number: i32) -> zbus::Result<()>;
    fn device_get_option(
        &self,
        device_number: i32,
        option_name: &str,
    ) -> zbus::Result<Vec<OwnedValue>>;
    fn device_set_option(
        &self,
        device_number: i32,
        option_name: &str,
        option_values: &[Value<'_>],
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    fn daemon_started(&self) -> zbus::Result<()>;

    #[zbus(signal)]
    fn daemon_stopped(&self) -> zbus::Result<()>;

    #[zbus(signal)]
    fn device_status_changed(&self, device_number: i32) -> zbus::Result<()>;

    #[zbus(signal)]
    fn device_option_changed(&self, device_number: i32, option: &str) -> zbus::Result<()>;
}
