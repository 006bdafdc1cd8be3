//! Execution of validated requests against the daemon.

use std::io::Write;
use std::path::Path;

use tracing::debug;

use super::commands::{Request, Target};
use super::console::{absolute_path, Console, PasswordPrompt};
use crate::dbus::{DaemonApi, DaemonError, LoadParams, OptionKind, OptionValue};

/// Result of running one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    fn failed_if(failed: bool) -> Self {
        if failed {
            Self::Failure
        } else {
            Self::Success
        }
    }
}

/// Wording used when printing an option.
struct OptionText {
    noun: &'static str,
    title: &'static str,
    column: &'static str,
}

fn option_text(kind: OptionKind) -> OptionText {
    match kind {
        OptionKind::DaemonDebugMask => OptionText {
            noun: "daemon debug mask",
            title: "Devices' daemon debug masks:",
            column: "DEBUG MASK",
        },
        OptionKind::LibraryDebugMask => OptionText {
            noun: "library debug mask",
            title: "Devices' library debug masks:",
            column: "DEBUG MASK",
        },
        OptionKind::DpmEmulation => OptionText {
            noun: "DPM emulation flag",
            title: "Devices' DPM emulation flag:",
            column: "ENABLED",
        },
        OptionKind::TrEmulation => OptionText {
            noun: "transfer rate emulation flag",
            title: "Devices' transfer rate emulation flag:",
            column: "ENABLED",
        },
        OptionKind::DeviceId => OptionText {
            noun: "device ID",
            title: "Devices' IDs:",
            column: "DEVICE ID",
        },
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Value as shown in an `all` table row.
fn table_cell(value: &OptionValue) -> String {
    match value {
        OptionValue::DaemonDebugMask(mask) | OptionValue::LibraryDebugMask(mask) => {
            format!("0x{:08X}", mask)
        }
        other => other.to_string(),
    }
}

pub async fn execute<W: Write>(
    api: &dyn DaemonApi,
    request: &Request,
    console: &mut Console<W>,
    prompt: &dyn PasswordPrompt,
) -> Outcome {
    debug!("Executing {:?}", request);

    match request {
        Request::Load { device, filenames } => {
            let cwd = match std::env::current_dir() {
                Ok(cwd) => cwd,
                Err(e) => {
                    console.error(format_args!("Failed to get current directory: {}", e));
                    return Outcome::Failure;
                }
            };
            load(api, console, prompt, *device, filenames, &cwd).await
        }
        Request::Unload(target) => unload(api, console, *target).await,
        Request::Status => status(api, console).await,
        Request::DeviceMapping => device_mapping(api, console).await,
        Request::GetOption { target, kind } => get_option(api, console, *target, *kind).await,
        Request::SetOption {
            target,
            value,
            truncated,
        } => {
            if *truncated {
                console.warning(format_args!(
                    "Device ID fields were truncated to {}!",
                    value
                ));
            }
            set_option(api, console, *target, value).await
        }
        Request::EnumParsers(id) => enum_parsers(api, console, id.as_deref()).await,
        Request::EnumFragments(id) => enum_fragments(api, console, id.as_deref()).await,
        Request::EnumDaemonDebugMasks => {
            let masks = api.daemon_debug_masks().await;
            enum_debug_masks(console, "daemon", masks)
        }
        Request::EnumLibraryDebugMasks => {
            let masks = api.library_debug_masks().await;
            enum_debug_masks(console, "library", masks)
        }
        Request::Version => version(api, console).await,
    }
}

async fn device_count<W: Write>(api: &dyn DaemonApi, console: &mut Console<W>) -> Option<i32> {
    match api.number_of_devices().await {
        Ok(count) => Some(count),
        Err(e) => {
            console.error(format_args!("Failed to get number of devices: {}", e));
            None
        }
    }
}

/// Expand a target into device numbers.
async fn devices<W: Write>(
    api: &dyn DaemonApi,
    console: &mut Console<W>,
    target: Target,
) -> Option<Vec<i32>> {
    match target {
        Target::All => device_count(api, console).await.map(|n| (0..n).collect()),
        Target::Device(device) => Some(vec![device]),
    }
}

pub(crate) async fn load<W: Write>(
    api: &dyn DaemonApi,
    console: &mut Console<W>,
    prompt: &dyn PasswordPrompt,
    device: Option<i32>,
    filenames: &[String],
    cwd: &Path,
) -> Outcome {
    // The daemon's working directory is not ours.
    let filenames: Vec<String> = filenames.iter().map(|f| absolute_path(cwd, f)).collect();

    let device = match device {
        Some(device) => device,
        None => match first_empty_device(api, console).await {
            Some(device) => device,
            None => return Outcome::Failure,
        },
    };

    load_with_password(api, console, prompt, device, &filenames).await
}

async fn first_empty_device<W: Write>(
    api: &dyn DaemonApi,
    console: &mut Console<W>,
) -> Option<i32> {
    let count = device_count(api, console).await?;

    for device in 0..count {
        match api.device_status(device).await {
            Ok(status) if !status.loaded => return Some(device),
            Ok(_) => {}
            Err(e) => console.error(format_args!(
                "Failed to get status of device {}: {}",
                device, e
            )),
        }
    }

    console.error("No empty device found");
    None
}

/// Load, asking once for a password if the image turns out to be encrypted.
async fn load_with_password<W: Write>(
    api: &dyn DaemonApi,
    console: &mut Console<W>,
    prompt: &dyn PasswordPrompt,
    device: i32,
    filenames: &[String],
) -> Outcome {
    let first = api
        .device_load(device, filenames, &LoadParams::default())
        .await;

    let result = match first {
        Err(DaemonError::NeedsPassword) => {
            console.line("The image you are trying to load is encrypted.");
            console.flush();
            let password = match prompt.read_password("Password: ") {
                Ok(password) => password,
                Err(e) => {
                    console.error(format_args!("Failed to read password: {}", e));
                    return Outcome::Failure;
                }
            };
            api.device_load(device, filenames, &LoadParams::with_password(password))
                .await
        }
        other => other,
    };

    match result {
        Ok(()) => Outcome::Success,
        Err(e) => {
            console.error(format_args!("Failed to load image: {}", e));
            Outcome::Failure
        }
    }
}

async fn unload<W: Write>(api: &dyn DaemonApi, console: &mut Console<W>, target: Target) -> Outcome {
    let Some(devices) = devices(api, console, target).await else {
        return Outcome::Failure;
    };

    let mut failed = false;
    for device in devices {
        if let Err(e) = api.device_unload(device).await {
            console.error(format_args!("Failed to unload device {}: {}", device, e));
            failed = true;
        }
    }
    Outcome::failed_if(failed)
}

async fn status<W: Write>(api: &dyn DaemonApi, console: &mut Console<W>) -> Outcome {
    let Some(count) = device_count(api, console).await else {
        return Outcome::Failure;
    };

    console.line("Devices' status:");
    console.line(format_args!(
        "{:<5} {:<10} {:<10} {}",
        "DEV", "LOADED", "TYPE", "FILENAME"
    ));

    let mut failed = false;
    for device in 0..count {
        let status = match api.device_status(device).await {
            Ok(status) => status,
            Err(e) => {
                console.error(format_args!(
                    "Failed to get status of device {}: {}",
                    device, e
                ));
                failed = true;
                continue;
            }
        };

        let loaded = if status.loaded { "True" } else { "False" };
        let mut filenames = status.filenames.iter();
        let first = filenames.next().map(String::as_str).unwrap_or("");
        console.line(format_args!(
            "{:<5} {:<10} {:<10} {}",
            device, loaded, status.image_type, first
        ));
        for filename in filenames {
            console.line(format_args!("{:<5} {:<10} {:<10} {}", "", "", "", filename));
        }
    }
    Outcome::failed_if(failed)
}

async fn device_mapping<W: Write>(api: &dyn DaemonApi, console: &mut Console<W>) -> Outcome {
    let Some(count) = device_count(api, console).await else {
        return Outcome::Failure;
    };

    console.line("Device mapping:");
    console.line(format_args!(
        "{:<5} {:<15} {:<15}",
        "DEV", "SCSI CD-ROM", "SCSI generic"
    ));

    let mut failed = false;
    for device in 0..count {
        match api.device_mapping(device).await {
            Ok(mapping) => console.line(format_args!(
                "{:<5} {:<15} {:<15}",
                device, mapping.cdrom, mapping.generic
            )),
            Err(e) => {
                console.error(format_args!(
                    "Failed to get device mapping of device {}: {}",
                    device, e
                ));
                failed = true;
            }
        }
    }
    Outcome::failed_if(failed)
}

async fn get_option<W: Write>(
    api: &dyn DaemonApi,
    console: &mut Console<W>,
    target: Target,
    kind: OptionKind,
) -> Outcome {
    let text = option_text(kind);
    let Some(devices) = devices(api, console, target).await else {
        return Outcome::Failure;
    };

    if target == Target::All {
        console.line(text.title);
        console.line(format_args!("{:<5} {}", "DEV", text.column));
    }

    let mut failed = false;
    for device in devices {
        match api.device_option(device, kind).await {
            Ok(value) => match target {
                Target::All => console.line(format_args!("{:<5} {}", device, table_cell(&value))),
                Target::Device(_) => console.line(format_args!(
                    "{} of device {}: {}",
                    capitalize(text.noun),
                    device,
                    value
                )),
            },
            Err(e) => {
                console.error(format_args!(
                    "Failed to get {} of device {}: {}",
                    text.noun, device, e
                ));
                failed = true;
            }
        }
    }
    Outcome::failed_if(failed)
}

async fn set_option<W: Write>(
    api: &dyn DaemonApi,
    console: &mut Console<W>,
    target: Target,
    value: &OptionValue,
) -> Outcome {
    let text = option_text(value.kind());
    let Some(devices) = devices(api, console, target).await else {
        return Outcome::Failure;
    };

    match target {
        Target::All => console.line(format_args!(
            "Setting {} of all devices to {}.",
            text.noun, value
        )),
        Target::Device(device) => console.line(format_args!(
            "Setting {} of device {} to {}.",
            text.noun, device, value
        )),
    }

    let mut failed = false;
    for device in devices {
        if let Err(e) = api.set_device_option(device, value).await {
            console.error(format_args!(
                "Failed to set {} of device {} to {}: {}",
                text.noun, device, value, e
            ));
            failed = true;
        }
    }
    Outcome::failed_if(failed)
}

fn suffix_list(suffixes: &[String]) -> String {
    suffixes.iter().map(|s| format!(" {}", s)).collect()
}

async fn enum_parsers<W: Write>(
    api: &dyn DaemonApi,
    console: &mut Console<W>,
    id: Option<&str>,
) -> Outcome {
    let parsers = match api.supported_parsers().await {
        Ok(parsers) => parsers,
        Err(e) => {
            console.error(format_args!("Failed to enumerate supported parsers: {}", e));
            return Outcome::Failure;
        }
    };

    let Some(id) = id else {
        console.line("Supported parsers:");
        for parser in &parsers {
            console.line(format_args!(
                "  {}: {}:{}",
                parser.id,
                parser.description,
                suffix_list(&parser.suffixes)
            ));
        }
        return Outcome::Success;
    };

    let Some(parser) = parsers.iter().find(|p| p.id == id) else {
        console.error(format_args!("Parser with ID '{}' not found!", id));
        return Outcome::Failure;
    };

    console.line(format_args!("Parser information: '{}'", parser.id));
    console.line(format_args!(" - Name: {}", parser.name));
    console.line(format_args!(" - Version: {}", parser.version));
    console.line(format_args!(" - Author: {}", parser.author));
    console.line(format_args!(
        " - Multiple files support: {}",
        parser.multi_file as i32
    ));
    console.line(format_args!(
        " - Image files description: {}",
        parser.description
    ));
    console.line(format_args!(
        " - Image files suffixes:{}",
        suffix_list(&parser.suffixes)
    ));
    Outcome::Success
}

async fn enum_fragments<W: Write>(
    api: &dyn DaemonApi,
    console: &mut Console<W>,
    id: Option<&str>,
) -> Outcome {
    let fragments = match api.supported_fragments().await {
        Ok(fragments) => fragments,
        Err(e) => {
            console.error(format_args!("Failed to enumerate supported fragments: {}", e));
            return Outcome::Failure;
        }
    };

    let Some(id) = id else {
        console.line("Supported fragments:");
        for fragment in &fragments {
            console.line(format_args!(
                "  {}: {}:{}",
                fragment.id,
                fragment.interface,
                suffix_list(&fragment.suffixes)
            ));
        }
        return Outcome::Success;
    };

    let Some(fragment) = fragments.iter().find(|f| f.id == id) else {
        console.error(format_args!("Fragment with ID '{}' not found!", id));
        return Outcome::Failure;
    };

    console.line(format_args!("Fragment information: '{}'", fragment.id));
    console.line(format_args!(" - Name: {}", fragment.name));
    console.line(format_args!(" - Version: {}", fragment.version));
    console.line(format_args!(" - Author: {}", fragment.author));
    console.line(format_args!(" - Interface: {}", fragment.interface));
    console.line(format_args!(
        " - Data files suffixes:{}",
        suffix_list(&fragment.suffixes)
    ));
    Outcome::Success
}

fn enum_debug_masks<W: Write>(
    console: &mut Console<W>,
    which: &str,
    masks: Result<Vec<crate::dbus::DebugMask>, DaemonError>,
) -> Outcome {
    match masks {
        Ok(masks) => {
            console.line(format_args!("Supported {} debug masks:", which));
            for mask in masks {
                console.line(format_args!("  {:<25}: 0x{:04X}", mask.label, mask.value));
            }
            Outcome::Success
        }
        Err(e) => {
            console.error(format_args!(
                "Failed to enumerate supported {} debug masks: {}",
                which, e
            ));
            Outcome::Failure
        }
    }
}

async fn version<W: Write>(api: &dyn DaemonApi, console: &mut Console<W>) -> Outcome {
    let library = match api.library_version().await {
        Ok(version) => version,
        Err(e) => {
            console.error(format_args!("Failed to get library version: {}", e));
            return Outcome::Failure;
        }
    };
    let daemon = match api.daemon_version().await {
        Ok(version) => version,
        Err(e) => {
            console.error(format_args!("Failed to get daemon version: {}", e));
            return Outcome::Failure;
        }
    };

    console.line(format_args!("Library version: {}", library));
    console.line(format_args!("Daemon version: {}", daemon));
    Outcome::Success
}
