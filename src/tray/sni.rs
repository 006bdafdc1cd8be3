//! Tray implementation using ksni (D-Bus StatusNotifierItem).

use super::{DeviceEntry, TrayError, TrayEvent, TrayModel};
use ksni::menu::*;
use ksni::{Handle, ToolTip, Tray, TrayMethods};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

struct CdemuTray {
    model: TrayModel,
    event_tx: UnboundedSender<TrayEvent>,
}

impl CdemuTray {
    fn send(&self, event: TrayEvent) {
        debug!("Tray: {:?}", event);
        // The loop is gone when the applet is shutting down.
        let _ = self.event_tx.send(event);
    }

    fn device_menu(&self, device: &DeviceEntry) -> MenuItem<Self> {
        let number = device.number;
        let enabled = device.available;

        let mut items: Vec<MenuItem<Self>> = vec![
            StandardItem {
                label: device.status_text().into(),
                enabled: false,
                ..Default::default()
            }
            .into(),
            MenuItem::Separator,
            StandardItem {
                label: "Load...".into(),
                enabled: enabled && !device.loaded,
                activate: Box::new(move |tray: &mut Self| tray.send(TrayEvent::LoadDevice(number))),
                ..Default::default()
            }
            .into(),
            StandardItem {
                label: "Unload".into(),
                enabled: enabled && device.loaded,
                activate: Box::new(move |tray: &mut Self| {
                    tray.send(TrayEvent::UnloadDevice(number))
                }),
                ..Default::default()
            }
            .into(),
            MenuItem::Separator,
        ];

        let dpm = device.dpm_emulation;
        items.push(
            CheckmarkItem {
                label: "DPM emulation".into(),
                enabled,
                checked: dpm,
                activate: Box::new(move |tray: &mut Self| {
                    tray.send(TrayEvent::SetDpmEmulation(number, !dpm))
                }),
                ..Default::default()
            }
            .into(),
        );
        let tr = device.tr_emulation;
        items.push(
            CheckmarkItem {
                label: "Transfer rate emulation".into(),
                enabled,
                checked: tr,
                activate: Box::new(move |tray: &mut Self| {
                    tray.send(TrayEvent::SetTrEmulation(number, !tr))
                }),
                ..Default::default()
            }
            .into(),
        );

        items.push(mask_menu(
            "Daemon debug mask",
            &self.model.daemon_masks,
            &device.daemon_mask,
            enabled,
            move |index| TrayEvent::ToggleDaemonMaskBit(number, index),
        ));
        items.push(mask_menu(
            "Library debug mask",
            &self.model.library_masks,
            &device.library_mask,
            enabled,
            move |index| TrayEvent::ToggleLibraryMaskBit(number, index),
        ));

        items.push(MenuItem::Separator);
        items.push(
            StandardItem {
                label: "Properties...".into(),
                activate: Box::new(move |tray: &mut Self| {
                    tray.send(TrayEvent::ShowProperties(number))
                }),
                ..Default::default()
            }
            .into(),
        );

        SubMenu {
            label: device.label.clone(),
            submenu: items,
            ..Default::default()
        }
        .into()
    }
}

fn mask_menu(
    label: &str,
    names: &[String],
    states: &[bool],
    enabled: bool,
    event: impl Fn(usize) -> TrayEvent + Copy + Send + Sync + 'static,
) -> MenuItem<CdemuTray> {
    let submenu = names
        .iter()
        .enumerate()
        .map(|(index, name)| {
            CheckmarkItem {
                label: name.clone(),
                enabled,
                checked: states.get(index).copied().unwrap_or(false),
                activate: Box::new(move |tray: &mut CdemuTray| tray.send(event(index))),
                ..Default::default()
            }
            .into()
        })
        .collect();

    SubMenu {
        label: label.into(),
        enabled: enabled && !names.is_empty(),
        submenu,
        ..Default::default()
    }
    .into()
}

impl Tray for CdemuTray {
    fn id(&self) -> String {
        "gcdemu".into()
    }

    fn icon_name(&self) -> String {
        self.model.icon_name().into()
    }

    fn title(&self) -> String {
        "gCDEmu".into()
    }

    fn tool_tip(&self) -> ToolTip {
        ToolTip {
            title: "gCDEmu".into(),
            description: self.model.status_text(),
            icon_name: self.model.icon_name().into(),
            icon_pixmap: Vec::new(),
        }
    }

    fn menu(&self) -> Vec<MenuItem<Self>> {
        let mut items: Vec<MenuItem<Self>> = Vec::new();

        if self.model.connected {
            items.extend(self.model.devices.iter().map(|d| self.device_menu(d)));
            if self.model.devices.is_empty() {
                items.push(
                    StandardItem {
                        label: "No devices".into(),
                        enabled: false,
                        ..Default::default()
                    }
                    .into(),
                );
            }
        } else {
            items.push(
                StandardItem {
                    label: "Daemon not running".into(),
                    enabled: false,
                    ..Default::default()
                }
                .into(),
            );
        }

        let system_bus = self.model.use_system_bus;
        let notifications = self.model.show_notifications;
        items.extend([
            MenuItem::Separator,
            CheckmarkItem {
                label: "Use system bus".into(),
                checked: system_bus,
                activate: Box::new(move |tray: &mut Self| {
                    tray.send(TrayEvent::SetSystemBus(!system_bus))
                }),
                ..Default::default()
            }
            .into(),
            CheckmarkItem {
                label: "Show notifications".into(),
                checked: notifications,
                activate: Box::new(move |tray: &mut Self| {
                    tray.send(TrayEvent::SetNotifications(!notifications))
                }),
                ..Default::default()
            }
            .into(),
            MenuItem::Separator,
            StandardItem {
                label: "Quit".into(),
                icon_name: "application-exit".into(),
                activate: Box::new(|tray: &mut Self| tray.send(TrayEvent::Quit)),
                ..Default::default()
            }
            .into(),
        ]);

        items
    }
}

/// Manages the system tray icon and menu
pub struct TrayManager {
    handle: Handle<CdemuTray>,
}

impl TrayManager {
    /// Register the tray icon; menu clicks are sent to `event_tx`.
    pub async fn new(
        model: TrayModel,
        event_tx: UnboundedSender<TrayEvent>,
    ) -> Result<Self, TrayError> {
        if !super::is_tray_supported() {
            return Err(TrayError::NotSupported);
        }

        let tray = CdemuTray { model, event_tx };
        let handle = tray
            .spawn()
            .await
            .map_err(|e: ksni::Error| TrayError::DBus(e.to_string()))?;

        info!("System tray initialized (D-Bus StatusNotifierItem)");
        Ok(Self { handle })
    }

    /// Replace the menu contents.
    pub async fn update(&self, model: TrayModel) {
        debug!("Updating tray: {}", model.status_text());
        self.handle.update(move |tray| tray.model = model).await;
    }
}
