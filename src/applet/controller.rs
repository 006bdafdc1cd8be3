//! Applet state: one daemon session, its device views and the notification sink.

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::device::{DeviceView, ViewState};
use crate::dbus::{
    BusType, DaemonApi, DaemonClient, DaemonError, DaemonEvent, DebugMaskCatalog, DeviceId,
    FragmentInfo, LoadParams, OptionKind, ParserInfo, Session,
};
use crate::notify::{Notifier, Urgency};
use crate::tray::{DeviceEntry, TrayModel};

/// Opens sessions for the controller.
#[async_trait]
pub trait Connector: Send + Sync {
    type Api: DaemonApi + 'static;

    async fn connect(&self, bus: BusType) -> Result<Session<Self::Api>, DaemonError>;
}

/// Connects over the real bus.
pub struct DbusConnector;

#[async_trait]
impl Connector for DbusConnector {
    type Api = DaemonClient;

    async fn connect(&self, bus: BusType) -> Result<Session<DaemonClient>, DaemonError> {
        Session::connect(bus).await
    }
}

/// Which debug mask a tray toggle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskKind {
    Daemon,
    Library,
}

/// Open-file filter: description and suffixes without the leading dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFilter {
    pub name: String,
    pub extensions: Vec<String>,
}

pub struct Controller<C: Connector> {
    connector: C,
    bus: BusType,
    session: Option<Session<C::Api>>,
    devices: Vec<DeviceView>,
    parsers: Vec<ParserInfo>,
    fragments: Vec<FragmentInfo>,
    daemon_masks: DebugMaskCatalog,
    library_masks: DebugMaskCatalog,
    notifier: Box<dyn Notifier>,
    show_notifications: bool,
}

impl<C: Connector> Controller<C> {
    pub fn new(
        connector: C,
        bus: BusType,
        notifier: Box<dyn Notifier>,
        show_notifications: bool,
    ) -> Self {
        Self {
            connector,
            bus,
            session: None,
            devices: Vec::new(),
            parsers: Vec::new(),
            fragments: Vec::new(),
            daemon_masks: DebugMaskCatalog::default(),
            library_masks: DebugMaskCatalog::default(),
            notifier,
            show_notifications,
        }
    }

    pub fn bus(&self) -> BusType {
        self.bus
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn devices(&self) -> &[DeviceView] {
        &self.devices
    }

    pub fn fragments(&self) -> &[FragmentInfo] {
        &self.fragments
    }

    pub fn show_notifications(&self) -> bool {
        self.show_notifications
    }

    pub fn set_show_notifications(&mut self, enabled: bool) {
        self.show_notifications = enabled;
    }

    /// Open a session and run the setup burst.
    ///
    /// Any previous session is torn down first. On failure the controller
    /// stays disconnected and the error is returned. Devices whose state
    /// cannot be fetched stay `Uninitialized` as long as the daemon still
    /// answers a ping.
    pub async fn connect(&mut self) -> Result<(), DaemonError> {
        self.teardown();

        let session = self.connector.connect(self.bus).await?;
        let api = session.api();

        let parsers = api.supported_parsers().await?;
        let fragments = api.supported_fragments().await?;
        let daemon_masks = DebugMaskCatalog::new(api.daemon_debug_masks().await?);
        let library_masks = DebugMaskCatalog::new(api.library_debug_masks().await?);
        let count = api.number_of_devices().await?;

        let mut devices: Vec<DeviceView> = (0..count).map(DeviceView::new).collect();
        let mut failed = false;
        for view in &mut devices {
            if let Err(e) = view.sync(api).await {
                warn!("Failed to fetch state of device {}: {}", view.number(), e);
                failed = true;
            }
        }

        // Ping only: the caller decides whether to retry.
        if failed {
            if let Err(e) = api.interface_version().await {
                warn!("CDEmu daemon stopped responding during setup: {}", e);
                return Err(e);
            }
        }

        info!(
            "Connected on the {} bus: {} device(s), {} parser(s)",
            self.bus,
            devices.len(),
            parsers.len()
        );

        self.parsers = parsers;
        self.fragments = fragments;
        self.daemon_masks = daemon_masks;
        self.library_masks = library_masks;
        self.devices = devices;
        self.session = Some(session);
        Ok(())
    }

    /// Drop the session and every per-session facility.
    pub fn teardown(&mut self) {
        if self.session.take().is_some() {
            info!("Disconnected from CDEmu daemon");
        }
        for view in &mut self.devices {
            view.detach();
        }
        self.devices.clear();
        self.parsers.clear();
        self.fragments.clear();
        self.daemon_masks = DebugMaskCatalog::default();
        self.library_masks = DebugMaskCatalog::default();
    }

    /// Connect, logging instead of returning the failure.
    pub async fn try_connect(&mut self) {
        if let Err(e) = self.connect().await {
            warn!("Failed to connect to CDEmu daemon on the {} bus: {}", self.bus, e);
        }
    }

    /// Tear down and reconnect on another bus.
    pub async fn switch_bus(&mut self, bus: BusType) {
        info!("Switching to the {} bus", bus);
        self.teardown();
        self.bus = bus;
        self.try_connect().await;
    }

    pub async fn handle_event(&mut self, event: DaemonEvent) {
        debug!("Handling daemon event: {:?}", event);
        match event {
            DaemonEvent::Started => {
                self.announce("Daemon started", "CDEmu daemon has been started.");
                if self.is_connected() {
                    debug!("Daemon started while a session is open; resetting");
                }
                self.teardown();
                self.try_connect().await;
            }
            DaemonEvent::Stopped => {
                self.announce("Daemon stopped", "CDEmu daemon has been stopped.");
                self.teardown();
            }
            DaemonEvent::StatusChanged(number) => self.on_status_changed(number).await,
            DaemonEvent::OptionChanged(number, name) => {
                self.on_option_changed(number, &name).await
            }
        }
    }

    async fn on_status_changed(&mut self, number: i32) {
        let Some(session) = &self.session else {
            debug!("Ignoring status change of device {} while disconnected", number);
            return;
        };
        let Some(view) = view_mut(&mut self.devices, number) else {
            warn!("Status change for unknown device {}", number);
            return;
        };

        if let Err(e) = view.refresh_status(session.api()).await {
            warn!("Failed to refresh status of device {}: {}", number, e);
            self.check_connection().await;
            return;
        }

        let body = if view.status().loaded {
            format!("Device {} has been loaded.", number)
        } else {
            format!("Device {} has been emptied.", number)
        };
        self.announce("Device change", &body);
    }

    async fn on_option_changed(&mut self, number: i32, name: &str) {
        let kind: OptionKind = match name.parse() {
            Ok(kind) => kind,
            Err(_) => {
                warn!("Device {} changed unknown option '{}'", number, name);
                return;
            }
        };
        let Some(session) = &self.session else {
            debug!("Ignoring option change of device {} while disconnected", number);
            return;
        };
        let Some(view) = view_mut(&mut self.devices, number) else {
            warn!("Option change for unknown device {}", number);
            return;
        };

        if let Err(e) = view.refresh_option(session.api(), kind).await {
            warn!("Failed to refresh option '{}' of device {}: {}", name, number, e);
            self.check_connection().await;
            return;
        }

        let body = format!("Device {} has changed its {}.", number, option_noun(kind));
        self.announce("Device change", &body);
    }

    /// Ping the daemon; tear down and reconnect if it does not answer.
    ///
    /// Returns whether the original session survived.
    pub async fn check_connection(&mut self) -> bool {
        let Some(session) = &self.session else {
            self.try_connect().await;
            return false;
        };
        match session.api().interface_version().await {
            Ok(_) => return true,
            Err(e) => warn!("CDEmu daemon does not respond: {}", e),
        }

        self.notify(
            "Connection lost",
            "Lost connection to CDEmu daemon; reconnecting.",
            Urgency::Critical,
        );
        self.try_connect().await;
        false
    }

    pub async fn load(&mut self, number: i32, filenames: Vec<String>) {
        let result = match self.session_and_view(number) {
            Ok((session, view)) => {
                view.load(session.api(), &filenames, &LoadParams::default())
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            let body = format!(
                "Failed to load image {} to device {}:\n{}",
                filenames.join(";"),
                number,
                e
            );
            self.report_failure(&body, &e).await;
        }
    }

    pub async fn unload(&mut self, number: i32) {
        let result = match self.session_and_view(number) {
            Ok((session, view)) => view.unload(session.api()).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            let body = format!("Failed to unload device {}:\n{}", number, e);
            self.report_failure(&body, &e).await;
        }
    }

    pub async fn set_dpm_emulation(&mut self, number: i32, enabled: bool) {
        let result = match self.session_and_view(number) {
            Ok((session, view)) => view.set_dpm_emulation(session.api(), enabled).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            let body = format!(
                "Failed to set DPM emulation for device {} to {}:\n{}",
                number, enabled as i32, e
            );
            self.report_failure(&body, &e).await;
        }
    }

    pub async fn set_tr_emulation(&mut self, number: i32, enabled: bool) {
        let result = match self.session_and_view(number) {
            Ok((session, view)) => view.set_tr_emulation(session.api(), enabled).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            let body = format!(
                "Failed to set TR emulation for device {} to {}:\n{}",
                number, enabled as i32, e
            );
            self.report_failure(&body, &e).await;
        }
    }

    pub async fn set_device_id(&mut self, number: i32, id: DeviceId) {
        let result = match self.session_and_view(number) {
            Ok((session, view)) => view.set_device_id(session.api(), id.clone()).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            let body = format!(
                "Failed to set device ID for device {} to {}:\n{}",
                number, id, e
            );
            self.report_failure(&body, &e).await;
        }
    }

    /// Flip one catalog entry of a device's debug mask.
    pub async fn toggle_mask_bit(&mut self, number: i32, kind: MaskKind, index: usize) {
        let catalog = match kind {
            MaskKind::Daemon => &self.daemon_masks,
            MaskKind::Library => &self.library_masks,
        };
        let Some(current) = self.devices.get(number as usize).map(|view| match kind {
            MaskKind::Daemon => view.daemon_debug_mask(),
            MaskKind::Library => view.library_debug_mask(),
        }) else {
            warn!("Mask toggle for unknown device {}", number);
            return;
        };
        let value = catalog.toggle(current, index);
        self.set_debug_mask(number, kind, value).await;
    }

    pub async fn set_debug_mask(&mut self, number: i32, kind: MaskKind, value: u32) {
        let result = match self.session_and_view(number) {
            Ok((session, view)) => match kind {
                MaskKind::Daemon => view.set_daemon_debug_mask(session.api(), value).await,
                MaskKind::Library => view.set_library_debug_mask(session.api(), value).await,
            },
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            let type_name = match kind {
                MaskKind::Daemon => "daemon",
                MaskKind::Library => "library",
            };
            let body = format!(
                "Failed to set debug mask (type: '{}') for device {} to 0x{:X}:\n{}",
                type_name, number, value, e
            );
            self.report_failure(&body, &e).await;
        }
    }

    fn session_and_view(
        &mut self,
        number: i32,
    ) -> Result<(&Session<C::Api>, &mut DeviceView), DaemonError> {
        let session = self.session.as_ref().ok_or(DaemonError::NotConnected)?;
        let view =
            view_mut(&mut self.devices, number).ok_or(DaemonError::InvalidDevice(number))?;
        Ok((session, view))
    }

    /// Show a failed user action; a lost connection is also re-checked.
    async fn report_failure(&mut self, body: &str, cause: &DaemonError) {
        error!("{}", body);
        self.notify("Error", body, Urgency::Critical);
        if cause.is_connection_lost() {
            self.check_connection().await;
        }
    }

    /// Event notification, subject to the user's notification setting.
    fn announce(&self, title: &str, body: &str) {
        info!("{}: {}", title, body);
        if self.show_notifications {
            self.notify(title, body, Urgency::Normal);
        }
    }

    fn notify(&self, title: &str, body: &str, urgency: Urgency) {
        if let Err(e) = self.notifier.notify(title, body, urgency) {
            warn!("Failed to show notification: {}", e);
        }
    }

    /// Filters for the open-image dialog, one per parser plus a catch-all.
    pub fn file_filters(&self) -> Vec<FileFilter> {
        let mut filters: Vec<FileFilter> = self
            .parsers
            .iter()
            .filter(|parser| !parser.suffixes.is_empty())
            .map(|parser| FileFilter {
                name: parser.description.clone(),
                extensions: parser
                    .suffixes
                    .iter()
                    .map(|suffix| suffix.trim_start_matches('.').to_string())
                    .collect(),
            })
            .collect();

        let all: Vec<String> = filters
            .iter()
            .flat_map(|filter| filter.extensions.iter().cloned())
            .collect();
        if !all.is_empty() {
            filters.insert(
                0,
                FileFilter {
                    name: "All supported images".to_string(),
                    extensions: all,
                },
            );
        }
        filters
    }

    /// Snapshot for the tray menu.
    pub fn tray_model(&self) -> TrayModel {
        TrayModel {
            connected: self.is_connected(),
            use_system_bus: self.bus == BusType::System,
            show_notifications: self.show_notifications,
            daemon_masks: self
                .daemon_masks
                .entries()
                .iter()
                .map(|m| m.label.clone())
                .collect(),
            library_masks: self
                .library_masks
                .entries()
                .iter()
                .map(|m| m.label.clone())
                .collect(),
            devices: self
                .devices
                .iter()
                .map(|view| DeviceEntry {
                    number: view.number(),
                    label: view.label(),
                    available: view.state() == ViewState::Synced,
                    loaded: view.status().loaded,
                    dpm_emulation: view.dpm_emulation(),
                    tr_emulation: view.tr_emulation(),
                    daemon_mask: self.daemon_masks.decompose(view.daemon_debug_mask()),
                    library_mask: self.library_masks.decompose(view.library_debug_mask()),
                })
                .collect(),
        }
    }
}

fn view_mut(devices: &mut [DeviceView], number: i32) -> Option<&mut DeviceView> {
    usize::try_from(number)
        .ok()
        .and_then(move |index| devices.get_mut(index))
}

fn option_noun(kind: OptionKind) -> &'static str {
    match kind {
        OptionKind::DaemonDebugMask => "daemon debug mask",
        OptionKind::LibraryDebugMask => "library debug mask",
        OptionKind::DpmEmulation => "DPM emulation setting",
        OptionKind::TrEmulation => "transfer rate emulation setting",
        OptionKind::DeviceId => "device ID",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyError;
    use crate::testing::FakeDaemon;
    use std::sync::{Arc, Mutex};

    type Sent = Arc<Mutex<Vec<(String, String, Urgency)>>>;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Sent,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, title: &str, body: &str, urgency: Urgency) -> Result<(), NotifyError> {
            self.sent
                .lock()
                .unwrap()
                .push((title.to_string(), body.to_string(), urgency));
            Ok(())
        }
    }

    /// Hands out fresh fakes built by `factory`; fails while `down` is set.
    struct FakeConnector {
        factory: Box<dyn Fn() -> FakeDaemon + Send + Sync>,
        down: Arc<Mutex<bool>>,
        connects: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        type Api = FakeDaemon;

        async fn connect(&self, bus: BusType) -> Result<Session<FakeDaemon>, DaemonError> {
            *self.connects.lock().unwrap() += 1;
            if *self.down.lock().unwrap() {
                return Err(DaemonError::ServiceNotRunning(bus));
            }
            Session::establish(bus, (self.factory)()).await
        }
    }

    struct Harness {
        controller: Controller<FakeConnector>,
        sent: Sent,
        down: Arc<Mutex<bool>>,
        connects: Arc<Mutex<usize>>,
    }

    fn harness(factory: impl Fn() -> FakeDaemon + Send + Sync + 'static) -> Harness {
        let notifier = RecordingNotifier::default();
        let sent = notifier.sent.clone();
        let down = Arc::new(Mutex::new(false));
        let connects = Arc::new(Mutex::new(0));
        let connector = FakeConnector {
            factory: Box::new(factory),
            down: down.clone(),
            connects: connects.clone(),
        };
        Harness {
            controller: Controller::new(connector, BusType::Session, Box::new(notifier), true),
            sent,
            down,
            connects,
        }
    }

    fn daemon(h: &Harness) -> &FakeDaemon {
        h.controller.session.as_ref().unwrap().api()
    }

    fn titles(sent: &Sent) -> Vec<String> {
        sent.lock().unwrap().iter().map(|(t, _, _)| t.clone()).collect()
    }

    // ===== Connection Tests =====

    #[tokio::test]
    async fn test_connect_builds_views() {
        let mut h = harness(|| FakeDaemon::new(3).with_loaded(2, "/img/disc.iso"));
        h.controller.connect().await.unwrap();

        assert!(h.controller.is_connected());
        assert_eq!(h.controller.devices().len(), 3);
        assert!(h
            .controller
            .devices()
            .iter()
            .all(|v| v.state() == ViewState::Synced));
        assert_eq!(h.controller.devices()[2].label(), "Device 02: disc.iso");
        assert_eq!(h.controller.fragments().len(), 1);

        let model = h.controller.tray_model();
        assert!(model.connected);
        assert_eq!(model.daemon_masks.len(), 5);
        assert_eq!(model.library_masks[0], "MIRAGE_DEBUG_PARSER");
        assert_eq!(model.devices[0].daemon_mask, vec![false; 5]);
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_disconnected() {
        let mut h = harness(|| FakeDaemon::new(1));
        *h.down.lock().unwrap() = true;

        assert!(matches!(
            h.controller.connect().await,
            Err(DaemonError::ServiceNotRunning(BusType::Session))
        ));
        assert!(!h.controller.is_connected());
        assert!(h.controller.tray_model().devices.is_empty());
    }

    #[tokio::test]
    async fn test_version_mismatch_refuses_session() {
        let mut h = harness(|| FakeDaemon::new(1).with_interface_version(3));
        assert!(matches!(
            h.controller.connect().await,
            Err(DaemonError::VersionMismatch {
                found: 3,
                required: 4
            })
        ));
        assert!(!h.controller.is_connected());
    }

    #[tokio::test]
    async fn test_failed_view_triggers_health_check() {
        let mut h = harness(|| FakeDaemon::new(2).with_failing_device(1));
        h.controller.connect().await.unwrap();

        assert_eq!(h.controller.devices()[0].state(), ViewState::Synced);
        assert_eq!(h.controller.devices()[1].state(), ViewState::Uninitialized);
        assert_eq!(daemon(&h).count_calls("GetDaemonInterfaceVersion"), 2);
        assert!(!h.controller.tray_model().devices[1].available);
    }

    // ===== Signal Tests =====

    #[tokio::test]
    async fn test_daemon_stopped_tears_down() {
        let mut h = harness(|| FakeDaemon::new(2));
        h.controller.connect().await.unwrap();

        h.controller.handle_event(DaemonEvent::Stopped).await;
        assert!(!h.controller.is_connected());
        assert!(h.controller.devices().is_empty());
        assert_eq!(
            h.sent.lock().unwrap()[0],
            (
                "Daemon stopped".to_string(),
                "CDEmu daemon has been stopped.".to_string(),
                Urgency::Normal
            )
        );
    }

    #[tokio::test]
    async fn test_daemon_started_reconnects() {
        let mut h = harness(|| FakeDaemon::new(2));
        *h.down.lock().unwrap() = true;
        h.controller.try_connect().await;
        assert!(!h.controller.is_connected());

        *h.down.lock().unwrap() = false;
        h.controller.handle_event(DaemonEvent::Started).await;
        assert!(h.controller.is_connected());
        assert_eq!(*h.connects.lock().unwrap(), 2);
        assert_eq!(titles(&h.sent), vec!["Daemon started"]);
    }

    #[tokio::test]
    async fn test_status_changed_refreshes_view() {
        let mut h = harness(|| FakeDaemon::new(2));
        h.controller.connect().await.unwrap();

        daemon(&h).update_device(1, |dev| {
            dev.status.loaded = true;
            dev.status.filenames = vec!["/img/a.iso".to_string()];
        });
        h.controller.handle_event(DaemonEvent::StatusChanged(1)).await;

        assert_eq!(h.controller.devices()[1].label(), "Device 01: a.iso");
        assert_eq!(daemon(&h).count_calls("DeviceSetOption"), 0);
        let sent = h.sent.lock().unwrap();
        assert_eq!(sent[0].0, "Device change");
        assert_eq!(sent[0].1, "Device 1 has been loaded.");
    }

    #[tokio::test]
    async fn test_option_changed_refreshes_only_that_option() {
        let mut h = harness(|| FakeDaemon::new(1));
        h.controller.connect().await.unwrap();
        let before = daemon(&h).count_calls("DeviceGetOption");

        daemon(&h).update_device(0, |dev| dev.tr_emulation = true);
        h.controller
            .handle_event(DaemonEvent::OptionChanged(0, "tr-emulation".to_string()))
            .await;

        assert!(h.controller.devices()[0].tr_emulation());
        assert_eq!(daemon(&h).count_calls("DeviceGetOption"), before + 1);
        assert_eq!(
            h.sent.lock().unwrap()[0].1,
            "Device 0 has changed its transfer rate emulation setting."
        );
    }

    #[tokio::test]
    async fn test_unknown_option_is_ignored() {
        let mut h = harness(|| FakeDaemon::new(1));
        h.controller.connect().await.unwrap();
        let before = daemon(&h).calls().len();

        h.controller
            .handle_event(DaemonEvent::OptionChanged(0, "bogus".to_string()))
            .await;
        h.controller.handle_event(DaemonEvent::StatusChanged(9)).await;

        assert_eq!(daemon(&h).calls().len(), before);
        assert!(h.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notifications_can_be_disabled() {
        let mut h = harness(|| FakeDaemon::new(1));
        h.controller.connect().await.unwrap();
        h.controller.set_show_notifications(false);

        h.controller.handle_event(DaemonEvent::StatusChanged(0)).await;
        assert!(h.sent.lock().unwrap().is_empty());
    }

    // ===== User Action Tests =====

    #[tokio::test]
    async fn test_load_and_unload() {
        let mut h = harness(|| FakeDaemon::new(1));
        h.controller.connect().await.unwrap();

        h.controller
            .load(0, vec!["/img/disc.cue".to_string()])
            .await;
        assert!(daemon(&h).device(0).status.loaded);

        h.controller.unload(0).await;
        assert!(!daemon(&h).device(0).status.loaded);
        assert!(h.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refused_action_notifies_without_ping() {
        let mut h = harness(|| FakeDaemon::new(1).with_failing_device(0));
        h.controller.connect().await.unwrap();
        let pings = daemon(&h).count_calls("GetDaemonInterfaceVersion");

        h.controller.unload(0).await;

        let sent = h.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "Error");
        assert!(sent[0].1.starts_with("Failed to unload device 0:\n"));
        assert_eq!(sent[0].2, Urgency::Critical);
        assert_eq!(daemon(&h).count_calls("GetDaemonInterfaceVersion"), pings);
        assert!(h.controller.is_connected());
    }

    #[tokio::test]
    async fn test_action_on_vanished_daemon_reconnects() {
        let mut h = harness(|| FakeDaemon::new(1));
        h.controller.connect().await.unwrap();

        daemon(&h).vanish();
        *h.down.lock().unwrap() = true;
        h.controller.set_dpm_emulation(0, true).await;

        assert_eq!(titles(&h.sent), vec!["Error", "Connection lost"]);
        assert_eq!(*h.connects.lock().unwrap(), 2);
        assert!(!h.controller.is_connected());
    }

    #[tokio::test]
    async fn test_setup_ping_failure_does_not_loop() {
        // Version check passes, device 1 fails, then the daemon stops answering.
        let mut h = harness(|| {
            FakeDaemon::new(2)
                .with_failing_device(1)
                .with_version_answers(1)
        });

        assert!(h.controller.connect().await.is_err());
        assert!(!h.controller.is_connected());
        assert_eq!(*h.connects.lock().unwrap(), 1);

        h.controller.handle_event(DaemonEvent::Started).await;
        assert!(!h.controller.is_connected());
        assert_eq!(*h.connects.lock().unwrap(), 2);

        assert!(!h.controller.check_connection().await);
        assert_eq!(*h.connects.lock().unwrap(), 3);
        assert_eq!(titles(&h.sent), vec!["Daemon started"]);
    }

    #[tokio::test]
    async fn test_lost_daemon_reconnects() {
        let mut h = harness(|| FakeDaemon::new(1));
        h.controller.connect().await.unwrap();
        assert_eq!(*h.connects.lock().unwrap(), 1);

        // The daemon vanishes: pings fail and it cannot be reached again.
        daemon(&h).set_interface_version(None);
        *h.down.lock().unwrap() = true;

        assert!(!h.controller.check_connection().await);
        assert_eq!(*h.connects.lock().unwrap(), 2);
        assert!(!h.controller.is_connected());
        assert_eq!(titles(&h.sent), vec!["Connection lost"]);
    }

    #[tokio::test]
    async fn test_toggle_mask_bit_preserves_other_bits() {
        let mut h = harness(|| FakeDaemon::new(1));
        h.controller.connect().await.unwrap();
        daemon(&h).update_device(0, |dev| dev.daemon_debug_mask = 0x1);
        h.controller
            .handle_event(DaemonEvent::OptionChanged(
                0,
                "daemon-debug-mask".to_string(),
            ))
            .await;

        h.controller.toggle_mask_bit(0, MaskKind::Daemon, 4).await;
        assert_eq!(daemon(&h).device(0).daemon_debug_mask, 0x11);
        assert_eq!(
            h.controller.tray_model().devices[0].daemon_mask,
            vec![true, false, false, false, true]
        );
    }

    #[tokio::test]
    async fn test_echoed_setting_is_not_sent() {
        let mut h = harness(|| FakeDaemon::new(1));
        h.controller.connect().await.unwrap();

        h.controller.set_dpm_emulation(0, false).await;
        h.controller
            .set_device_id(
                0,
                DeviceId::new("CDEmu", "Virt. CD/DVD-ROM", "1.10", "    cdemu.sf.net    "),
            )
            .await;
        assert_eq!(daemon(&h).count_calls("DeviceSetOption"), 0);

        h.controller.set_dpm_emulation(0, true).await;
        assert_eq!(daemon(&h).count_calls("DeviceSetOption"), 1);
    }

    #[tokio::test]
    async fn test_action_while_disconnected_reports_error() {
        let mut h = harness(|| FakeDaemon::new(1));
        *h.down.lock().unwrap() = true;

        h.controller.unload(0).await;
        let sent = h.sent.lock().unwrap().clone();
        assert_eq!(sent[0].0, "Error");
        assert!(sent[0].1.contains("Not connected"));
        assert_eq!(*h.connects.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_switch_bus() {
        let mut h = harness(|| FakeDaemon::new(1));
        h.controller.connect().await.unwrap();

        h.controller.switch_bus(BusType::System).await;
        assert_eq!(h.controller.bus(), BusType::System);
        assert!(h.controller.tray_model().use_system_bus);
        assert!(h.controller.is_connected());
    }

    #[tokio::test]
    async fn test_file_filters() {
        let mut h = harness(|| FakeDaemon::new(1));
        h.controller.connect().await.unwrap();

        let filters = h.controller.file_filters();
        assert_eq!(filters.len(), 3);
        assert_eq!(filters[0].name, "All supported images");
        assert_eq!(filters[0].extensions, vec!["iso", "bin", "img", "cue"]);
        assert_eq!(filters[2].name, "CUE images");
    }
}
