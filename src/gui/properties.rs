//! State behind the device properties window.
//!
//! The form holds what the widgets edit. It is reset from the device view
//! whenever the daemon reports a change, and only pushed back when the user
//! asks, so applying a remote change never causes a `DeviceSetOption`.

use tracing::debug;

use crate::applet::DeviceView;
use crate::dbus::{
    DaemonApi, DaemonError, DaemonEvent, DebugMaskCatalog, DeviceId, OptionKind,
};

/// Widget state of the properties window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Form {
    pub vendor_id: String,
    pub product_id: String,
    pub revision: String,
    pub vendor_specific: String,
    pub dpm_emulation: bool,
    pub tr_emulation: bool,
    pub daemon_mask: Vec<bool>,
    pub library_mask: Vec<bool>,
}

pub struct DeviceProperties {
    view: DeviceView,
    daemon_masks: DebugMaskCatalog,
    library_masks: DebugMaskCatalog,
    pub form: Form,
}

impl DeviceProperties {
    /// Fetch the catalogs and the device's state.
    pub async fn open(api: &dyn DaemonApi, number: i32) -> Result<Self, DaemonError> {
        let count = api.number_of_devices().await?;
        if !(0..count).contains(&number) {
            return Err(DaemonError::InvalidDevice(number));
        }

        let daemon_masks = DebugMaskCatalog::new(api.daemon_debug_masks().await?);
        let library_masks = DebugMaskCatalog::new(api.library_debug_masks().await?);
        let mut view = DeviceView::new(number);
        view.sync(api).await?;

        let mut properties = Self {
            view,
            daemon_masks,
            library_masks,
            form: Form::default(),
        };
        properties.reset_form();
        Ok(properties)
    }

    pub fn view(&self) -> &DeviceView {
        &self.view
    }

    pub fn daemon_masks(&self) -> &DebugMaskCatalog {
        &self.daemon_masks
    }

    pub fn library_masks(&self) -> &DebugMaskCatalog {
        &self.library_masks
    }

    pub fn reset_form(&mut self) {
        for kind in OptionKind::ALL {
            self.reset_field(kind);
        }
    }

    fn reset_field(&mut self, kind: OptionKind) {
        let view = &self.view;
        let form = &mut self.form;
        match kind {
            OptionKind::DeviceId => {
                let id = view.device_id();
                form.vendor_id = id.vendor_id.clone();
                form.product_id = id.product_id.clone();
                form.revision = id.revision.clone();
                form.vendor_specific = id.vendor_specific.clone();
            }
            OptionKind::DpmEmulation => form.dpm_emulation = view.dpm_emulation(),
            OptionKind::TrEmulation => form.tr_emulation = view.tr_emulation(),
            OptionKind::DaemonDebugMask => {
                form.daemon_mask = self.daemon_masks.decompose(view.daemon_debug_mask())
            }
            OptionKind::LibraryDebugMask => {
                form.library_mask = self.library_masks.decompose(view.library_debug_mask())
            }
        }
    }

    /// Apply a daemon signal. Returns whether this device was affected.
    pub async fn handle_event(
        &mut self,
        api: &dyn DaemonApi,
        event: &DaemonEvent,
    ) -> Result<bool, DaemonError> {
        match event {
            DaemonEvent::StatusChanged(number) if *number == self.view.number() => {
                self.view.refresh_status(api).await?;
                Ok(true)
            }
            DaemonEvent::OptionChanged(number, name) if *number == self.view.number() => {
                let Ok(kind) = name.parse::<OptionKind>() else {
                    debug!("Ignoring unknown option '{}'", name);
                    return Ok(false);
                };
                self.view.refresh_option(api, kind).await?;
                self.reset_field(kind);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn detach(&mut self) {
        self.view.detach();
    }

    /// Send the device ID fields; each is truncated to its maximum length.
    pub async fn apply_device_id(&mut self, api: &dyn DaemonApi) -> Result<bool, DaemonError> {
        let id = DeviceId::new(
            &self.form.vendor_id,
            &self.form.product_id,
            &self.form.revision,
            &self.form.vendor_specific,
        );
        let result = self.view.set_device_id(api, id).await;
        self.reset_field(OptionKind::DeviceId);
        result
    }

    pub async fn apply_dpm_emulation(&mut self, api: &dyn DaemonApi) -> Result<bool, DaemonError> {
        let result = self.view.set_dpm_emulation(api, self.form.dpm_emulation).await;
        self.reset_field(OptionKind::DpmEmulation);
        result
    }

    pub async fn apply_tr_emulation(&mut self, api: &dyn DaemonApi) -> Result<bool, DaemonError> {
        let result = self.view.set_tr_emulation(api, self.form.tr_emulation).await;
        self.reset_field(OptionKind::TrEmulation);
        result
    }

    pub async fn apply_daemon_mask(&mut self, api: &dyn DaemonApi) -> Result<bool, DaemonError> {
        let mask = self.daemon_masks.compose(&self.form.daemon_mask);
        let result = self.view.set_daemon_debug_mask(api, mask).await;
        self.reset_field(OptionKind::DaemonDebugMask);
        result
    }

    pub async fn apply_library_mask(&mut self, api: &dyn DaemonApi) -> Result<bool, DaemonError> {
        let mask = self.library_masks.compose(&self.form.library_mask);
        let result = self.view.set_library_debug_mask(api, mask).await;
        self.reset_field(OptionKind::LibraryDebugMask);
        result
    }
}
