//! Per-device mirror of the daemon's state.

use std::path::Path;

use tracing::{debug, warn};

use crate::dbus::{
    DaemonApi, DaemonError, DeviceId, DeviceStatus, LoadParams, OptionKind, OptionValue,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    /// Not fetched yet, or the last full fetch failed.
    Uninitialized,
    Synced,
    /// The session went away; the view must not talk to the daemon again.
    Detached,
}

/// Local copy of one device's status and options.
///
/// Remote changes are pulled in with [`DeviceView::refresh_status`] and
/// [`DeviceView::refresh_option`]; local edits go out through the setters,
/// which skip the call when the value already matches the mirror.
#[derive(Debug, Clone)]
pub struct DeviceView {
    number: i32,
    state: ViewState,
    status: DeviceStatus,
    device_id: DeviceId,
    dpm_emulation: bool,
    tr_emulation: bool,
    daemon_debug_mask: u32,
    library_debug_mask: u32,
}

impl DeviceView {
    pub fn new(number: i32) -> Self {
        Self {
            number,
            state: ViewState::Uninitialized,
            status: DeviceStatus::default(),
            device_id: DeviceId::default(),
            dpm_emulation: false,
            tr_emulation: false,
            daemon_debug_mask: 0,
            library_debug_mask: 0,
        }
    }

    pub fn number(&self) -> i32 {
        self.number
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn status(&self) -> &DeviceStatus {
        &self.status
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn dpm_emulation(&self) -> bool {
        self.dpm_emulation
    }

    pub fn tr_emulation(&self) -> bool {
        self.tr_emulation
    }

    pub fn daemon_debug_mask(&self) -> u32 {
        self.daemon_debug_mask
    }

    pub fn library_debug_mask(&self) -> u32 {
        self.library_debug_mask
    }

    fn ensure_attached(&self) -> Result<(), DaemonError> {
        if self.state == ViewState::Detached {
            Err(DaemonError::NotConnected)
        } else {
            Ok(())
        }
    }

    /// Fetch everything; the mirror only changes if every call succeeds.
    pub async fn sync(&mut self, api: &dyn DaemonApi) -> Result<(), DaemonError> {
        self.ensure_attached()?;

        let status = api.device_status(self.number).await?;
        let mut fetched = Vec::with_capacity(OptionKind::ALL.len());
        for kind in OptionKind::ALL {
            fetched.push(api.device_option(self.number, kind).await?);
        }

        self.status = status;
        for value in fetched {
            self.apply(value);
        }
        self.state = ViewState::Synced;
        debug!("Device {} synced", self.number);
        Ok(())
    }

    /// Re-read the load state after a status change signal.
    pub async fn refresh_status(&mut self, api: &dyn DaemonApi) -> Result<(), DaemonError> {
        self.ensure_attached()?;
        if self.state == ViewState::Uninitialized {
            return self.sync(api).await;
        }

        self.status = api.device_status(self.number).await?;
        Ok(())
    }

    /// Re-read a single option after an option change signal.
    pub async fn refresh_option(
        &mut self,
        api: &dyn DaemonApi,
        kind: OptionKind,
    ) -> Result<(), DaemonError> {
        self.ensure_attached()?;
        if self.state == ViewState::Uninitialized {
            return self.sync(api).await;
        }

        let value = api.device_option(self.number, kind).await?;
        self.apply(value);
        Ok(())
    }

    pub async fn load(
        &self,
        api: &dyn DaemonApi,
        filenames: &[String],
        params: &LoadParams,
    ) -> Result<(), DaemonError> {
        self.ensure_attached()?;
        api.device_load(self.number, filenames, params).await
    }

    pub async fn unload(&self, api: &dyn DaemonApi) -> Result<(), DaemonError> {
        self.ensure_attached()?;
        api.device_unload(self.number).await
    }

    /// Push a local edit.
    ///
    /// Returns `false` without calling the daemon when a synced mirror
    /// already holds `value`.
    pub async fn set_option(
        &mut self,
        api: &dyn DaemonApi,
        value: OptionValue,
    ) -> Result<bool, DaemonError> {
        self.ensure_attached()?;

        if self.state == ViewState::Synced && self.value_of(value.kind()) == value {
            debug!(
                "Device {}: {} already {}, not sending",
                self.number,
                value.kind(),
                value
            );
            return Ok(false);
        }

        api.set_device_option(self.number, &value).await?;
        self.apply(value);
        Ok(true)
    }

    pub async fn set_dpm_emulation(
        &mut self,
        api: &dyn DaemonApi,
        enabled: bool,
    ) -> Result<bool, DaemonError> {
        self.set_option(api, OptionValue::DpmEmulation(enabled)).await
    }

    pub async fn set_tr_emulation(
        &mut self,
        api: &dyn DaemonApi,
        enabled: bool,
    ) -> Result<bool, DaemonError> {
        self.set_option(api, OptionValue::TrEmulation(enabled)).await
    }

    pub async fn set_daemon_debug_mask(
        &mut self,
        api: &dyn DaemonApi,
        mask: u32,
    ) -> Result<bool, DaemonError> {
        self.set_option(api, OptionValue::DaemonDebugMask(mask)).await
    }

    pub async fn set_library_debug_mask(
        &mut self,
        api: &dyn DaemonApi,
        mask: u32,
    ) -> Result<bool, DaemonError> {
        self.set_option(api, OptionValue::LibraryDebugMask(mask)).await
    }

    pub async fn set_device_id(
        &mut self,
        api: &dyn DaemonApi,
        id: DeviceId,
    ) -> Result<bool, DaemonError> {
        self.set_option(api, OptionValue::DeviceId(id)).await
    }

    /// Current mirrored value of an option.
    pub fn value_of(&self, kind: OptionKind) -> OptionValue {
        match kind {
            OptionKind::DaemonDebugMask => OptionValue::DaemonDebugMask(self.daemon_debug_mask),
            OptionKind::LibraryDebugMask => OptionValue::LibraryDebugMask(self.library_debug_mask),
            OptionKind::DpmEmulation => OptionValue::DpmEmulation(self.dpm_emulation),
            OptionKind::TrEmulation => OptionValue::TrEmulation(self.tr_emulation),
            OptionKind::DeviceId => OptionValue::DeviceId(self.device_id.clone()),
        }
    }

    fn apply(&mut self, value: OptionValue) {
        match value {
            OptionValue::DaemonDebugMask(mask) => self.daemon_debug_mask = mask,
            OptionValue::LibraryDebugMask(mask) => self.library_debug_mask = mask,
            OptionValue::DpmEmulation(flag) => self.dpm_emulation = flag,
            OptionValue::TrEmulation(flag) => self.tr_emulation = flag,
            OptionValue::DeviceId(id) => self.device_id = id,
        }
    }

    /// Drop all mirrored state; the view is dead afterwards.
    pub fn detach(&mut self) {
        if self.state != ViewState::Detached {
            debug!("Device {} detached", self.number);
        }
        *self = Self {
            state: ViewState::Detached,
            ..Self::new(self.number)
        };
    }

    /// Menu label, e.g. `Device 00: disc.cue, ...` or `Device 01: Empty`.
    pub fn label(&self) -> String {
        format!("Device {:02}: {}", self.number, self.short_description())
    }

    fn short_description(&self) -> String {
        if !self.status.loaded {
            return "Empty".to_string();
        }

        let Some(first) = self.status.filenames.first() else {
            warn!("Device {} is loaded but reports no files", self.number);
            return "Loaded".to_string();
        };

        let name = Path::new(first)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| first.clone());

        if self.status.filenames.len() > 1 {
            format!("{}, ...", name)
        } else {
            name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDaemon;

    #[tokio::test]
    async fn test_sync_fetches_everything() {
        let daemon = FakeDaemon::new(2).with_loaded(1, "/images/disc.iso");
        daemon.update_device(1, |dev| {
            dev.tr_emulation = true;
            dev.library_debug_mask = 0x6;
        });

        let mut view = DeviceView::new(1);
        assert_eq!(view.state(), ViewState::Uninitialized);

        view.sync(&daemon).await.unwrap();
        assert_eq!(view.state(), ViewState::Synced);
        assert!(view.status().loaded);
        assert!(view.tr_emulation());
        assert!(!view.dpm_emulation());
        assert_eq!(view.library_debug_mask(), 0x6);
        assert_eq!(view.device_id().vendor_id, "CDEmu");
    }

    #[tokio::test]
    async fn test_failed_sync_stays_uninitialized() {
        let daemon = FakeDaemon::new(2).with_failing_device(0);
        let mut view = DeviceView::new(0);

        assert!(view.sync(&daemon).await.is_err());
        assert_eq!(view.state(), ViewState::Uninitialized);
        assert_eq!(view.device_id(), &DeviceId::default());
    }

    #[tokio::test]
    async fn test_setter_suppresses_echo() {
        let daemon = FakeDaemon::new(1);
        let mut view = DeviceView::new(0);
        view.sync(&daemon).await.unwrap();

        assert!(!view.set_dpm_emulation(&daemon, false).await.unwrap());
        assert_eq!(daemon.count_calls("DeviceSetOption"), 0);

        assert!(view.set_dpm_emulation(&daemon, true).await.unwrap());
        assert_eq!(daemon.count_calls("DeviceSetOption"), 1);
        assert!(daemon.device(0).dpm_emulation);
        assert!(view.dpm_emulation());
    }

    #[tokio::test]
    async fn test_uninitialized_view_always_sends() {
        let daemon = FakeDaemon::new(1);
        daemon.update_device(0, |dev| dev.dpm_emulation = true);
        let mut view = DeviceView::new(0);

        // The mirror holds defaults, not the daemon's value.
        assert!(view.set_dpm_emulation(&daemon, false).await.unwrap());
        assert_eq!(daemon.count_calls("DeviceSetOption"), 1);
        assert!(!daemon.device(0).dpm_emulation);
        assert_eq!(view.state(), ViewState::Uninitialized);
    }

    #[tokio::test]
    async fn test_remote_change_does_not_send_set_option() {
        let daemon = FakeDaemon::new(1);
        let mut view = DeviceView::new(0);
        view.sync(&daemon).await.unwrap();

        daemon.update_device(0, |dev| dev.daemon_debug_mask = 0x10);
        view.refresh_option(&daemon, OptionKind::DaemonDebugMask)
            .await
            .unwrap();
        assert_eq!(view.daemon_debug_mask(), 0x10);

        // Writing back what the daemon just told us is a no-op.
        assert!(!view.set_daemon_debug_mask(&daemon, 0x10).await.unwrap());
        assert_eq!(daemon.count_calls("DeviceSetOption"), 0);
    }

    #[tokio::test]
    async fn test_refresh_status() {
        let daemon = FakeDaemon::new(1);
        let mut view = DeviceView::new(0);
        view.sync(&daemon).await.unwrap();
        assert_eq!(view.label(), "Device 00: Empty");

        daemon.update_device(0, |dev| {
            dev.status.loaded = true;
            dev.status.filenames = vec!["/x/a.cue".to_string(), "/x/a.bin".to_string()];
        });
        view.refresh_status(&daemon).await.unwrap();
        assert!(view.status().loaded);
        assert_eq!(view.label(), "Device 00: a.cue, ...");
        assert_eq!(daemon.count_calls("DeviceSetOption"), 0);
    }

    #[tokio::test]
    async fn test_refresh_on_uninitialized_view_syncs() {
        let daemon = FakeDaemon::new(1);
        let mut view = DeviceView::new(0);

        view.refresh_status(&daemon).await.unwrap();
        assert_eq!(view.state(), ViewState::Synced);
        assert_eq!(daemon.count_calls("DeviceGetOption"), OptionKind::ALL.len());
    }

    #[tokio::test]
    async fn test_detached_view_refuses_calls() {
        let daemon = FakeDaemon::new(1).with_loaded(0, "/a.iso");
        let mut view = DeviceView::new(0);
        view.sync(&daemon).await.unwrap();

        view.detach();
        assert_eq!(view.state(), ViewState::Detached);
        assert!(!view.status().loaded);
        assert!(matches!(
            view.unload(&daemon).await,
            Err(DaemonError::NotConnected)
        ));
        assert!(matches!(
            view.refresh_status(&daemon).await,
            Err(DaemonError::NotConnected)
        ));
        assert_eq!(daemon.count_calls("DeviceUnload"), 0);
    }

    #[test]
    fn test_label_single_file() {
        let mut view = DeviceView::new(7);
        view.status = DeviceStatus {
            loaded: true,
            image_type: "ISO".to_string(),
            filenames: vec!["/home/user/My Disc.iso".to_string()],
        };
        assert_eq!(view.label(), "Device 07: My Disc.iso");
    }
}
