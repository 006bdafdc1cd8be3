//! GUI components using egui.
//!
//! - Device properties window, one process per device

mod properties;

pub use properties::{DeviceProperties, Form};

use std::time::Duration;

use crate::dbus::{BusType, DaemonApi, DaemonError, DaemonEvent, Session, SignalPump};
use crate::dbus::{PRODUCT_ID_LEN, REVISION_LEN, VENDOR_ID_LEN, VENDOR_SPECIFIC_LEN};
use eframe::egui;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Signals are polled at this interval while the window is open.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Run the properties window for one device as a standalone window
pub fn run_properties(device: i32, bus: BusType) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;

    let (event_tx, events) = mpsc::unbounded_channel();
    let pump = runtime.block_on(SignalPump::subscribe(bus, event_tx))?;
    let (session, properties) = runtime.block_on(open(bus, device))?;

    let app = PropertiesApp {
        runtime,
        bus,
        device,
        session: Some(session),
        properties: Some(properties),
        events,
        _pump: pump,
        active_tab: Tab::Status,
        status_message: None,
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([460.0, 420.0])
            .with_min_inner_size([380.0, 320.0]),
        ..Default::default()
    };

    eframe::run_native(
        &format!("Device #{:02} properties", device),
        options,
        Box::new(move |_cc| Ok(Box::new(app))),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run properties window: {}", e))
}

async fn open(bus: BusType, device: i32) -> Result<(Session, DeviceProperties), DaemonError> {
    let session = Session::connect(bus).await?;
    let properties = DeviceProperties::open(session.api(), device).await?;
    Ok((session, properties))
}

/// Spawn the properties window as a separate process (for use from the applet)
pub fn spawn_properties(device: i32, bus: BusType) {
    // Launch a new process because GUI frameworks require the main thread
    let exe = std::env::current_exe().unwrap_or_else(|_| "gcdemu".into());
    match std::process::Command::new(exe)
        .args(["--bus", bus.as_str(), "properties", &device.to_string()])
        .spawn()
    {
        Ok(_) => info!("Properties window for device {} spawned", device),
        Err(e) => tracing::error!("Failed to spawn properties window: {}", e),
    }
}

#[derive(PartialEq, Clone, Copy)]
enum Tab {
    Status,
    Options,
    DaemonDebug,
    LibraryDebug,
}

struct PropertiesApp {
    runtime: Runtime,
    bus: BusType,
    device: i32,
    session: Option<Session>,
    properties: Option<DeviceProperties>,
    events: mpsc::UnboundedReceiver<DaemonEvent>,
    _pump: SignalPump,
    active_tab: Tab,
    status_message: Option<(String, std::time::Instant)>,
}

/// A remote edit the user asked for this frame.
#[derive(Clone, Copy)]
enum Edit {
    DeviceId,
    Dpm,
    Tr,
    DaemonMask,
    LibraryMask,
}

impl PropertiesApp {
    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                DaemonEvent::Stopped => {
                    info!("Daemon stopped; properties window detached");
                    if let Some(properties) = &mut self.properties {
                        properties.detach();
                    }
                    self.session = None;
                    self.set_message("CDEmu daemon has been stopped.".to_string());
                }
                DaemonEvent::Started => self.reconnect(),
                other => self.apply_event(other),
            }
        }
    }

    fn apply_event(&mut self, event: DaemonEvent) {
        let (Some(session), Some(properties)) = (&self.session, &mut self.properties) else {
            return;
        };
        if let Err(e) = self
            .runtime
            .block_on(properties.handle_event(session.api(), &event))
        {
            warn!("Failed to refresh device {}: {}", self.device, e);
            self.set_message(format!("Failed to refresh device: {}", e));
        }
    }

    fn reconnect(&mut self) {
        match self.runtime.block_on(open(self.bus, self.device)) {
            Ok((session, properties)) => {
                self.session = Some(session);
                self.properties = Some(properties);
                self.set_message("Reconnected to CDEmu daemon.".to_string());
            }
            Err(e) => {
                warn!("Failed to reconnect: {}", e);
                self.set_message(format!("Failed to reconnect: {}", e));
            }
        }
    }

    fn apply(&mut self, edit: Edit) {
        let (Some(session), Some(properties)) = (&self.session, &mut self.properties) else {
            return;
        };
        let api: &dyn DaemonApi = session.api();
        let result = self.runtime.block_on(async {
            match edit {
                Edit::DeviceId => properties.apply_device_id(api).await,
                Edit::Dpm => properties.apply_dpm_emulation(api).await,
                Edit::Tr => properties.apply_tr_emulation(api).await,
                Edit::DaemonMask => properties.apply_daemon_mask(api).await,
                Edit::LibraryMask => properties.apply_library_mask(api).await,
            }
        });
        if let Err(e) = result {
            warn!("Failed to change device {}: {}", self.device, e);
            self.set_message(format!("Error: {}", e));
        }
    }

    fn set_message(&mut self, message: String) {
        self.status_message = Some((message, std::time::Instant::now()));
    }

    fn show_status_tab(ui: &mut egui::Ui, properties: &DeviceProperties) {
        ui.heading("Status");
        ui.add_space(10.0);

        let status = properties.view().status();
        egui::Grid::new("status").num_columns(2).show(ui, |ui| {
            ui.label("Loaded:");
            ui.label(if status.loaded { "Yes" } else { "No" });
            ui.end_row();

            if status.loaded {
                ui.label("Image type:");
                ui.label(&status.image_type);
                ui.end_row();
            }
        });

        if status.loaded {
            ui.add_space(10.0);
            ui.label("Filename(s):");
            for filename in &status.filenames {
                ui.monospace(filename);
            }
        }
    }

    fn show_options_tab(ui: &mut egui::Ui, form: &mut Form) -> Option<Edit> {
        let mut edit = None;

        ui.heading("Device ID");
        ui.add_space(10.0);
        egui::Grid::new("device_id").num_columns(2).show(ui, |ui| {
            for (label, value, limit) in [
                ("Vendor ID:", &mut form.vendor_id, VENDOR_ID_LEN),
                ("Product ID:", &mut form.product_id, PRODUCT_ID_LEN),
                ("Revision:", &mut form.revision, REVISION_LEN),
                ("Vendor specific:", &mut form.vendor_specific, VENDOR_SPECIFIC_LEN),
            ] {
                ui.label(label);
                ui.add(egui::TextEdit::singleline(value).char_limit(limit));
                ui.end_row();
            }
        });
        if ui.button("Set device ID").clicked() {
            edit = Some(Edit::DeviceId);
        }

        ui.add_space(15.0);
        ui.heading("Emulation");
        ui.add_space(10.0);
        if ui
            .checkbox(&mut form.dpm_emulation, "DPM emulation")
            .changed()
        {
            edit = Some(Edit::Dpm);
        }
        if ui
            .checkbox(&mut form.tr_emulation, "Transfer rate emulation")
            .changed()
        {
            edit = Some(Edit::Tr);
        }

        edit
    }

    fn show_mask_tab(
        ui: &mut egui::Ui,
        heading: &str,
        labels: &[String],
        states: &mut [bool],
    ) -> bool {
        ui.heading(heading);
        ui.add_space(10.0);

        if labels.is_empty() {
            ui.label("The daemon reports no debug masks.");
            return false;
        }

        for (label, state) in labels.iter().zip(states.iter_mut()) {
            ui.checkbox(state, label);
        }
        ui.add_space(10.0);
        ui.button("Set debug mask").clicked()
    }
}

impl eframe::App for PropertiesApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events();

        egui::TopBottomPanel::top("tabs").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.active_tab, Tab::Status, "Status");
                ui.selectable_value(&mut self.active_tab, Tab::Options, "Options");
                ui.selectable_value(&mut self.active_tab, Tab::DaemonDebug, "Daemon debug mask");
                ui.selectable_value(&mut self.active_tab, Tab::LibraryDebug, "Library debug mask");
            });
        });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if let Some((msg, time)) = &self.status_message {
                    if time.elapsed().as_secs() < 5 {
                        ui.label(msg);
                    } else {
                        self.status_message = None;
                    }
                }
            });
        });

        let connected = self.session.is_some();
        let active_tab = self.active_tab;
        let mut edit = None;
        egui::CentralPanel::default().show(ctx, |ui| {
            let Some(properties) = &mut self.properties else {
                ui.label("Not connected to CDEmu daemon.");
                return;
            };
            ui.add_enabled_ui(connected, |ui| match active_tab {
                Tab::Status => Self::show_status_tab(ui, properties),
                Tab::Options => edit = Self::show_options_tab(ui, &mut properties.form),
                Tab::DaemonDebug => {
                    let labels: Vec<String> = properties
                        .daemon_masks()
                        .entries()
                        .iter()
                        .map(|m| m.label.clone())
                        .collect();
                    if Self::show_mask_tab(
                        ui,
                        "Daemon debug mask",
                        &labels,
                        &mut properties.form.daemon_mask,
                    ) {
                        edit = Some(Edit::DaemonMask);
                    }
                }
                Tab::LibraryDebug => {
                    let labels: Vec<String> = properties
                        .library_masks()
                        .entries()
                        .iter()
                        .map(|m| m.label.clone())
                        .collect();
                    if Self::show_mask_tab(
                        ui,
                        "Library debug mask",
                        &labels,
                        &mut properties.form.library_mask,
                    ) {
                        edit = Some(Edit::LibraryMask);
                    }
                }
            });
        });

        if let Some(edit) = edit {
            self.apply(edit);
        }

        ctx.request_repaint_after(POLL_INTERVAL);
    }
}
