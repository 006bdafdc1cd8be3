//! In-memory daemon for unit tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::dbus::{
    DaemonApi, DaemonError, DebugMask, DeviceId, DeviceMapping, DeviceStatus, FragmentInfo,
    LoadParams, OptionKind, OptionValue, ParserInfo, MIN_INTERFACE_VERSION, SERVICE_UNKNOWN_ERROR,
};

pub type CallLog = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeDevice {
    pub status: DeviceStatus,
    pub mapping: DeviceMapping,
    pub device_id: DeviceId,
    pub dpm_emulation: bool,
    pub tr_emulation: bool,
    pub daemon_debug_mask: u32,
    pub library_debug_mask: u32,
}

impl FakeDevice {
    fn new(index: usize) -> Self {
        Self {
            status: DeviceStatus::default(),
            mapping: DeviceMapping {
                cdrom: format!("/dev/sr{}", index),
                generic: format!("/dev/sg{}", index + 1),
            },
            device_id: DeviceId::new("CDEmu", "Virt. CD/DVD-ROM", "1.10", "    cdemu.sf.net    "),
            dpm_emulation: false,
            tr_emulation: false,
            daemon_debug_mask: 0,
            library_debug_mask: 0,
        }
    }
}

struct State {
    devices: Vec<FakeDevice>,
    interface_version: Option<i32>,
    failing: HashSet<i32>,
    password: Option<String>,
    version_answers: Option<usize>,
    gone: bool,
}

/// Scriptable stand-in for the CDEmu daemon.
pub struct FakeDaemon {
    state: Mutex<State>,
    calls: CallLog,
}

impl FakeDaemon {
    pub fn new(devices: usize) -> Self {
        Self {
            state: Mutex::new(State {
                devices: (0..devices).map(FakeDevice::new).collect(),
                interface_version: Some(MIN_INTERFACE_VERSION),
                failing: HashSet::new(),
                password: None,
                version_answers: None,
                gone: false,
            }),
            calls: CallLog::default(),
        }
    }

    pub fn with_interface_version(self, version: i32) -> Self {
        self.state().interface_version = Some(version);
        self
    }

    pub fn without_interface_version(self) -> Self {
        self.state().interface_version = None;
        self
    }

    /// Answer `GetDaemonInterfaceVersion` only `count` times, then fail.
    pub fn with_version_answers(self, count: usize) -> Self {
        self.state().version_answers = Some(count);
        self
    }

    /// Every per-device call on `device` fails with a remote error.
    pub fn with_failing_device(self, device: i32) -> Self {
        self.state().failing.insert(device);
        self
    }

    /// Images only load when `password` is supplied.
    pub fn with_encrypted_images(self, password: &str) -> Self {
        self.state().password = Some(password.to_string());
        self
    }

    pub fn with_loaded(self, device: usize, filename: &str) -> Self {
        if let Some(dev) = self.state().devices.get_mut(device) {
            dev.status = DeviceStatus {
                loaded: true,
                image_type: "ISO".to_string(),
                filenames: vec![filename.to_string()],
            };
        }
        self
    }

    /// Make `GetDaemonInterfaceVersion` answer differently from now on.
    pub fn set_interface_version(&self, version: Option<i32>) {
        self.state().interface_version = version;
    }

    /// Behave like a daemon that left the bus: every call fails as unreachable.
    pub fn vanish(&self) {
        let mut state = self.state();
        state.gone = true;
        state.interface_version = None;
    }

    pub fn call_log(&self) -> CallLog {
        self.calls.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == method).count()
    }

    pub fn device(&self, device: usize) -> FakeDevice {
        self.state().devices[device].clone()
    }

    /// Change a device behind the clients' back, as another client would.
    pub fn update_device(&self, device: usize, update: impl FnOnce(&mut FakeDevice)) {
        update(&mut self.state().devices[device]);
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn record(&self, method: &str) {
        self.calls.lock().unwrap().push(method.to_string());
    }

    fn with_device<T>(
        &self,
        device: i32,
        f: impl FnOnce(&mut FakeDevice) -> Result<T, DaemonError>,
    ) -> Result<T, DaemonError> {
        let mut state = self.state();
        if state.gone {
            return Err(DaemonError::remote(
                SERVICE_UNKNOWN_ERROR,
                Some("The name net.sf.cdemu.CDEmuDaemon was not provided by any .service files"),
            ));
        }
        if state.failing.contains(&device) {
            return Err(DaemonError::remote(
                "net.sf.cdemu.CDEMUD_Daemon.CDEmuDaemon.Error",
                Some("Device is busy"),
            ));
        }
        let index = usize::try_from(device).map_err(|_| invalid_device(device))?;
        let dev = state
            .devices
            .get_mut(index)
            .ok_or_else(|| invalid_device(device))?;
        f(dev)
    }
}

fn invalid_device(device: i32) -> DaemonError {
    DaemonError::remote(
        "net.sf.cdemu.CDEMUD_Daemon.CDEmuDaemon.invalid-argument",
        Some(&format!("Invalid device number {}!", device)),
    )
}

#[async_trait]
impl DaemonApi for FakeDaemon {
    async fn interface_version(&self) -> Result<i32, DaemonError> {
        self.record("GetDaemonInterfaceVersion");
        let mut state = self.state();
        let answer = state.interface_version;
        let version = match &mut state.version_answers {
            Some(0) => None,
            Some(left) => {
                *left -= 1;
                answer
            }
            None => answer,
        };
        version.ok_or_else(|| {
            DaemonError::remote(
                "org.freedesktop.DBus.Error.UnknownMethod",
                Some("No such method 'GetDaemonInterfaceVersion'"),
            )
        })
    }

    async fn daemon_version(&self) -> Result<String, DaemonError> {
        self.record("GetDaemonVersion");
        Ok("3.2.6".to_string())
    }

    async fn library_version(&self) -> Result<String, DaemonError> {
        self.record("GetLibraryVersion");
        Ok("3.2.6".to_string())
    }

    async fn number_of_devices(&self) -> Result<i32, DaemonError> {
        self.record("GetNumberOfDevices");
        Ok(self.state().devices.len() as i32)
    }

    async fn device_status(&self, device: i32) -> Result<DeviceStatus, DaemonError> {
        self.record("DeviceGetStatus");
        self.with_device(device, |dev| Ok(dev.status.clone()))
    }

    async fn device_mapping(&self, device: i32) -> Result<DeviceMapping, DaemonError> {
        self.record("DeviceGetMapping");
        self.with_device(device, |dev| Ok(dev.mapping.clone()))
    }

    async fn device_load(
        &self,
        device: i32,
        filenames: &[String],
        params: &LoadParams,
    ) -> Result<(), DaemonError> {
        self.record("DeviceLoad");
        let required = self.state().password.clone();
        if let Some(required) = required {
            match &params.password {
                None => return Err(DaemonError::NeedsPassword),
                Some(given) if *given != required => {
                    return Err(DaemonError::remote(
                        "net.sf.cdemu.CDEMUD_Daemon.libMirage.wrong-password",
                        Some("Wrong password"),
                    ))
                }
                Some(_) => {}
            }
        }
        self.with_device(device, |dev| {
            if dev.status.loaded {
                return Err(DaemonError::remote(
                    "net.sf.cdemu.CDEMUD_Daemon.CDEmuDaemon.already-loaded",
                    Some("Device is already loaded!"),
                ));
            }
            dev.status = DeviceStatus {
                loaded: true,
                image_type: "ISO".to_string(),
                filenames: filenames.to_vec(),
            };
            Ok(())
        })
    }

    async fn device_unload(&self, device: i32) -> Result<(), DaemonError> {
        self.record("DeviceUnload");
        self.with_device(device, |dev| {
            dev.status = DeviceStatus::default();
            Ok(())
        })
    }

    async fn device_option(
        &self,
        device: i32,
        kind: OptionKind,
    ) -> Result<OptionValue, DaemonError> {
        self.record("DeviceGetOption");
        self.with_device(device, |dev| {
            Ok(match kind {
                OptionKind::DaemonDebugMask => OptionValue::DaemonDebugMask(dev.daemon_debug_mask),
                OptionKind::LibraryDebugMask => {
                    OptionValue::LibraryDebugMask(dev.library_debug_mask)
                }
                OptionKind::DpmEmulation => OptionValue::DpmEmulation(dev.dpm_emulation),
                OptionKind::TrEmulation => OptionValue::TrEmulation(dev.tr_emulation),
                OptionKind::DeviceId => OptionValue::DeviceId(dev.device_id.clone()),
            })
        })
    }

    async fn set_device_option(
        &self,
        device: i32,
        value: &OptionValue,
    ) -> Result<(), DaemonError> {
        self.record("DeviceSetOption");
        self.with_device(device, |dev| {
            match value.clone() {
                OptionValue::DaemonDebugMask(mask) => dev.daemon_debug_mask = mask,
                OptionValue::LibraryDebugMask(mask) => dev.library_debug_mask = mask,
                OptionValue::DpmEmulation(flag) => dev.dpm_emulation = flag,
                OptionValue::TrEmulation(flag) => dev.tr_emulation = flag,
                OptionValue::DeviceId(id) => dev.device_id = id,
            }
            Ok(())
        })
    }

    async fn supported_parsers(&self) -> Result<Vec<ParserInfo>, DaemonError> {
        self.record("EnumSupportedParsers");
        Ok(vec![
            ParserInfo {
                id: "PARSER-ISO".to_string(),
                name: "ISO Image Parser".to_string(),
                version: "3.2.6".to_string(),
                author: "Rok Mandeljc".to_string(),
                multi_file: false,
                description: "ISO images".to_string(),
                suffixes: vec![".iso".to_string(), ".bin".to_string(), ".img".to_string()],
            },
            ParserInfo {
                id: "PARSER-CUE".to_string(),
                name: "CUE Image Parser".to_string(),
                version: "3.2.6".to_string(),
                author: "Rok Mandeljc".to_string(),
                multi_file: false,
                description: "CUE images".to_string(),
                suffixes: vec![".cue".to_string()],
            },
        ])
    }

    async fn supported_fragments(&self) -> Result<Vec<FragmentInfo>, DaemonError> {
        self.record("EnumSupportedFragments");
        Ok(vec![FragmentInfo {
            id: "FRAGMENT-BINARY".to_string(),
            name: "Binary Fragment".to_string(),
            version: "3.2.6".to_string(),
            author: "Rok Mandeljc".to_string(),
            interface: "MirageFragmentIfaceBinary".to_string(),
            suffixes: vec![],
        }])
    }

    async fn daemon_debug_masks(&self) -> Result<Vec<DebugMask>, DaemonError> {
        self.record("EnumDaemonDebugMasks");
        Ok(masks(&[
            ("DAEMON_DEBUG_DEVICE", 0x1),
            ("DAEMON_DEBUG_MMC", 0x2),
            ("DAEMON_DEBUG_DELAY", 0x4),
            ("DAEMON_DEBUG_AUDIOPLAY", 0x8),
            ("DAEMON_DEBUG_KERNEL_IO", 0x10),
        ]))
    }

    async fn library_debug_masks(&self) -> Result<Vec<DebugMask>, DaemonError> {
        self.record("EnumLibraryDebugMasks");
        Ok(masks(&[
            ("MIRAGE_DEBUG_PARSER", 0x1),
            ("MIRAGE_DEBUG_DISC", 0x2),
            ("MIRAGE_DEBUG_SESSION", 0x4),
            ("MIRAGE_DEBUG_TRACK", 0x8),
        ]))
    }
}

fn masks(entries: &[(&str, u32)]) -> Vec<DebugMask> {
    entries
        .iter()
        .map(|(label, value)| DebugMask {
            label: label.to_string(),
            value: *value,
        })
        .collect()
}
