//! Command table and argument parsing.
//!
//! Arguments are validated into a [`Request`] before any connection is made,
//! so usage errors never reach the daemon.

use thiserror::Error;

use super::console::{parse_mask, parse_number};
use crate::dbus::{DeviceId, OptionKind, OptionValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Load,
    Unload,
    Status,
    DeviceMapping,
    DaemonDebugMask,
    LibraryDebugMask,
    DpmEmulation,
    TrEmulation,
    DeviceId,
    EnumParsers,
    EnumFragments,
    EnumDaemonDebugMasks,
    EnumLibraryDebugMasks,
    Version,
}

#[derive(Debug)]
pub struct CommandSpec {
    pub name: &'static str,
    /// Older spellings still accepted on the command line.
    pub aliases: &'static [&'static str],
    pub usage: &'static str,
    pub help: &'static str,
    pub kind: CommandKind,
}

pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "load",
        aliases: &[],
        usage: "<device> <image file> [...]",
        help: "loads the device",
        kind: CommandKind::Load,
    },
    CommandSpec {
        name: "unload",
        aliases: &[],
        usage: "<device>",
        help: "unloads the device",
        kind: CommandKind::Unload,
    },
    CommandSpec {
        name: "status",
        aliases: &[],
        usage: "",
        help: "displays the devices' status",
        kind: CommandKind::Status,
    },
    CommandSpec {
        name: "device-mapping",
        aliases: &[],
        usage: "",
        help: "displays the device mapping information",
        kind: CommandKind::DeviceMapping,
    },
    CommandSpec {
        name: "daemon-debug-mask",
        aliases: &[],
        usage: "<device> [new value]",
        help: "displays/sets daemon debug mask",
        kind: CommandKind::DaemonDebugMask,
    },
    CommandSpec {
        name: "library-debug-mask",
        aliases: &[],
        usage: "<device> [new value]",
        help: "displays/sets library debug mask",
        kind: CommandKind::LibraryDebugMask,
    },
    CommandSpec {
        name: "dpm-emulation",
        aliases: &[],
        usage: "<device> [new value]",
        help: "displays/sets DPM emulation flag",
        kind: CommandKind::DpmEmulation,
    },
    CommandSpec {
        name: "tr-emulation",
        aliases: &[],
        usage: "<device> [new value]",
        help: "displays/sets transfer rate emulation flag",
        kind: CommandKind::TrEmulation,
    },
    CommandSpec {
        name: "device-id",
        aliases: &[],
        usage: "<device> [new vendor_id] [new product_id] [new revision] [new vendor_specific]",
        help: "displays/sets device ID",
        kind: CommandKind::DeviceId,
    },
    CommandSpec {
        name: "enum-parsers",
        aliases: &["enum-supported-parsers"],
        usage: "[parser_id]",
        help: "enumerates supported parsers",
        kind: CommandKind::EnumParsers,
    },
    CommandSpec {
        name: "enum-fragments",
        aliases: &["enum-supported-fragments"],
        usage: "[fragment_id]",
        help: "enumerates supported fragments",
        kind: CommandKind::EnumFragments,
    },
    CommandSpec {
        name: "enum-daemon-debug-masks",
        aliases: &[],
        usage: "",
        help: "enumerates valid daemon debug masks",
        kind: CommandKind::EnumDaemonDebugMasks,
    },
    CommandSpec {
        name: "enum-library-debug-masks",
        aliases: &[],
        usage: "",
        help: "enumerates valid library debug masks",
        kind: CommandKind::EnumLibraryDebugMasks,
    },
    CommandSpec {
        name: "version",
        aliases: &[],
        usage: "",
        help: "displays version information",
        kind: CommandKind::Version,
    },
];

/// Look up a command by name or alias.
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|spec| spec.name == name || spec.aliases.contains(&name))
}

/// Which devices a per-device command addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    All,
    Device(i32),
}

/// A fully validated command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `device` is `None` for the first empty device.
    Load {
        device: Option<i32>,
        filenames: Vec<String>,
    },
    Unload(Target),
    Status,
    DeviceMapping,
    GetOption {
        target: Target,
        kind: OptionKind,
    },
    SetOption {
        target: Target,
        value: OptionValue,
        /// Device ID fields had to be shortened to fit.
        truncated: bool,
    },
    EnumParsers(Option<String>),
    EnumFragments(Option<String>),
    EnumDaemonDebugMasks,
    EnumLibraryDebugMasks,
    Version,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ArgError {
    #[error("Invalid number of parameters for command '{0}'!")]
    Count(&'static str),

    #[error("Invalid device number '{0}'!")]
    Device(String),

    #[error("Invalid value '{0}'!")]
    Value(String),
}

impl CommandSpec {
    /// Validate `args` for this command.
    pub fn parse(&self, args: &[String]) -> Result<Request, ArgError> {
        let count = || ArgError::Count(self.name);

        match self.kind {
            CommandKind::Load => {
                let (device, filenames) = args.split_first().ok_or_else(count)?;
                if filenames.is_empty() {
                    return Err(count());
                }
                let device = match device.as_str() {
                    "any" => None,
                    other => Some(parse_device(other)?),
                };
                Ok(Request::Load {
                    device,
                    filenames: filenames.to_vec(),
                })
            }
            CommandKind::Unload => match args {
                [device] => Ok(Request::Unload(parse_target(device)?)),
                _ => Err(count()),
            },
            CommandKind::Status => no_args(args, self.name, Request::Status),
            CommandKind::DeviceMapping => no_args(args, self.name, Request::DeviceMapping),
            CommandKind::DaemonDebugMask | CommandKind::LibraryDebugMask => {
                let kind = if self.kind == CommandKind::DaemonDebugMask {
                    OptionKind::DaemonDebugMask
                } else {
                    OptionKind::LibraryDebugMask
                };
                match args {
                    [device] => Ok(Request::GetOption {
                        target: parse_target(device)?,
                        kind,
                    }),
                    [device, mask] => {
                        let target = parse_target(device)?;
                        let mask = parse_mask(mask).ok_or_else(|| ArgError::Value(mask.clone()))?;
                        let value = if kind == OptionKind::DaemonDebugMask {
                            OptionValue::DaemonDebugMask(mask)
                        } else {
                            OptionValue::LibraryDebugMask(mask)
                        };
                        Ok(Request::SetOption {
                            target,
                            value,
                            truncated: false,
                        })
                    }
                    _ => Err(count()),
                }
            }
            CommandKind::DpmEmulation | CommandKind::TrEmulation => {
                let kind = if self.kind == CommandKind::DpmEmulation {
                    OptionKind::DpmEmulation
                } else {
                    OptionKind::TrEmulation
                };
                match args {
                    [device] => Ok(Request::GetOption {
                        target: parse_target(device)?,
                        kind,
                    }),
                    [device, flag] => {
                        let target = parse_target(device)?;
                        let enabled = parse_number(flag)
                            .ok_or_else(|| ArgError::Value(flag.clone()))?
                            != 0;
                        let value = if kind == OptionKind::DpmEmulation {
                            OptionValue::DpmEmulation(enabled)
                        } else {
                            OptionValue::TrEmulation(enabled)
                        };
                        Ok(Request::SetOption {
                            target,
                            value,
                            truncated: false,
                        })
                    }
                    _ => Err(count()),
                }
            }
            CommandKind::DeviceId => match args {
                [device] => Ok(Request::GetOption {
                    target: parse_target(device)?,
                    kind: OptionKind::DeviceId,
                }),
                [device, vendor_id, product_id, revision, vendor_specific] => {
                    let id = DeviceId::new(vendor_id, product_id, revision, vendor_specific);
                    let truncated = id
                        .fields()
                        .iter()
                        .zip(&args[1..])
                        .any(|(kept, given)| *kept != given.as_str());
                    Ok(Request::SetOption {
                        target: parse_target(device)?,
                        value: OptionValue::DeviceId(id),
                        truncated,
                    })
                }
                _ => Err(count()),
            },
            CommandKind::EnumParsers => match args {
                [] => Ok(Request::EnumParsers(None)),
                [id] => Ok(Request::EnumParsers(Some(id.clone()))),
                _ => Err(count()),
            },
            CommandKind::EnumFragments => match args {
                [] => Ok(Request::EnumFragments(None)),
                [id] => Ok(Request::EnumFragments(Some(id.clone()))),
                _ => Err(count()),
            },
            CommandKind::EnumDaemonDebugMasks => {
                no_args(args, self.name, Request::EnumDaemonDebugMasks)
            }
            CommandKind::EnumLibraryDebugMasks => {
                no_args(args, self.name, Request::EnumLibraryDebugMasks)
            }
            CommandKind::Version => no_args(args, self.name, Request::Version),
        }
    }
}

fn no_args(args: &[String], name: &'static str, request: Request) -> Result<Request, ArgError> {
    if args.is_empty() {
        Ok(request)
    } else {
        Err(ArgError::Count(name))
    }
}

fn parse_device(text: &str) -> Result<i32, ArgError> {
    parse_number(text)
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(|| ArgError::Device(text.to_string()))
}

fn parse_target(text: &str) -> Result<Target, ArgError> {
    if text == "all" {
        Ok(Target::All)
    } else {
        parse_device(text).map(Target::Device)
    }
}
