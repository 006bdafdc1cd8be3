//! The `gcdemu` tray applet.
//!
//! One current-thread loop owns the [`Controller`] and multiplexes daemon
//! signals, tray menu clicks and Ctrl+C. After every event the tray menu is
//! re-rendered from the controller's state.

mod controller;
mod device;

pub use controller::{Connector, Controller, DbusConnector, FileFilter, MaskKind};
pub use device::{DeviceView, ViewState};

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;
use crate::dbus::{BusType, DaemonEvent, SignalPump};
use crate::gui;
use crate::notify::DesktopNotifier;
use crate::tray::{TrayEvent, TrayManager};

/// Run the applet until the user quits.
pub async fn run(mut config: Config) -> anyhow::Result<()> {
    let bus = config.applet.bus();
    let notifier = Box::new(DesktopNotifier::new("gCDEmu"));
    let mut controller = Controller::new(
        DbusConnector,
        bus,
        notifier,
        config.applet.show_notifications,
    );

    let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();
    let mut pump = subscribe(bus, &signal_tx).await;
    controller.try_connect().await;

    let (tray_tx, mut tray_rx) = mpsc::unbounded_channel();
    let tray = TrayManager::new(controller.tray_model(), tray_tx).await?;

    info!("gCDEmu running on the {} bus", bus);

    loop {
        tokio::select! {
            Some(event) = signal_rx.recv() => {
                controller.handle_event(event).await;
            }
            Some(event) = tray_rx.recv() => {
                if event == TrayEvent::Quit {
                    info!("Quit requested from tray");
                    break;
                }
                handle_tray_event(&mut controller, &mut config, &mut pump, &signal_tx, event).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; shutting down");
                break;
            }
        }

        tray.update(controller.tray_model()).await;
    }

    controller.teardown();
    Ok(())
}

/// Subscribe to daemon signals; the applet keeps running without them.
async fn subscribe(
    bus: BusType,
    signal_tx: &mpsc::UnboundedSender<DaemonEvent>,
) -> Option<SignalPump> {
    match SignalPump::subscribe(bus, signal_tx.clone()).await {
        Ok(pump) => Some(pump),
        Err(e) => {
            warn!("Failed to subscribe to daemon signals on the {} bus: {}", bus, e);
            None
        }
    }
}

async fn handle_tray_event(
    controller: &mut Controller<DbusConnector>,
    config: &mut Config,
    pump: &mut Option<SignalPump>,
    signal_tx: &mpsc::UnboundedSender<DaemonEvent>,
    event: TrayEvent,
) {
    match event {
        TrayEvent::LoadDevice(number) => {
            if let Some(filenames) = pick_images(controller.file_filters(), number).await {
                controller.load(number, filenames).await;
            }
        }
        TrayEvent::UnloadDevice(number) => controller.unload(number).await,
        TrayEvent::SetDpmEmulation(number, enabled) => {
            controller.set_dpm_emulation(number, enabled).await
        }
        TrayEvent::SetTrEmulation(number, enabled) => {
            controller.set_tr_emulation(number, enabled).await
        }
        TrayEvent::ToggleDaemonMaskBit(number, index) => {
            controller
                .toggle_mask_bit(number, MaskKind::Daemon, index)
                .await
        }
        TrayEvent::ToggleLibraryMaskBit(number, index) => {
            controller
                .toggle_mask_bit(number, MaskKind::Library, index)
                .await
        }
        TrayEvent::ShowProperties(number) => gui::spawn_properties(number, controller.bus()),
        TrayEvent::SetSystemBus(system) => {
            let bus = if system {
                BusType::System
            } else {
                BusType::Session
            };
            if bus == controller.bus() {
                return;
            }
            // Drop the old subscription before opening the new one.
            *pump = None;
            *pump = subscribe(bus, signal_tx).await;
            controller.switch_bus(bus).await;

            config.applet.use_system_bus = system;
            save(config);
        }
        TrayEvent::SetNotifications(enabled) => {
            controller.set_show_notifications(enabled);
            config.applet.show_notifications = enabled;
            save(config);
        }
        TrayEvent::Quit => {}
    }
}

fn save(config: &Config) {
    if let Err(e) = config.save() {
        warn!("Failed to save configuration: {}", e);
    }
}

/// Ask the user for image files.
async fn pick_images(filters: Vec<FileFilter>, number: i32) -> Option<Vec<String>> {
    let mut dialog =
        rfd::AsyncFileDialog::new().set_title(format!("Open image for device {}", number));
    for filter in &filters {
        dialog = dialog.add_filter(filter.name.as_str(), filter.extensions.as_slice());
    }
    dialog = dialog.add_filter("All files", &["*"]);

    let files = dialog.pick_files().await?;
    let filenames: Vec<String> = files
        .iter()
        .map(|file| file.path().to_string_lossy().into_owned())
        .collect();
    (!filenames.is_empty()).then_some(filenames)
}
