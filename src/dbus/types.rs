//! Typed values exchanged with the CDEmu daemon.

use std::fmt;
use std::str::FromStr;

use zbus::zvariant::{OwnedValue, Value};

use super::error::DaemonError;

/// Load state of one device as reported by `DeviceGetStatus`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceStatus {
    pub loaded: bool,
    pub image_type: String,
    pub filenames: Vec<String>,
}

impl From<(bool, String, Vec<String>)> for DeviceStatus {
    fn from((loaded, image_type, filenames): (bool, String, Vec<String>)) -> Self {
        Self {
            loaded,
            image_type,
            filenames,
        }
    }
}

/// Host device nodes backing one emulated device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceMapping {
    /// SCSI CD-ROM device, e.g. `/dev/sr0`.
    pub cdrom: String,
    /// SCSI generic device, e.g. `/dev/sg2`.
    pub generic: String,
}

impl From<(String, String)> for DeviceMapping {
    fn from((cdrom, generic): (String, String)) -> Self {
        Self { cdrom, generic }
    }
}

/// Wire shape of one `EnumSupportedParsers` entry.
pub type ParserTuple = (String, String, String, String, bool, String, Vec<String>);

/// Wire shape of one `EnumSupportedFragments` entry.
pub type FragmentTuple = (String, String, String, String, String, Vec<String>);

/// Image parser supported by the daemon's library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub author: String,
    pub multi_file: bool,
    pub description: String,
    pub suffixes: Vec<String>,
}

impl From<ParserTuple> for ParserInfo {
    fn from(
        (id, name, version, author, multi_file, description, suffixes): ParserTuple,
    ) -> Self {
        Self {
            id,
            name,
            version,
            author,
            multi_file,
            description,
            suffixes,
        }
    }
}

/// Data fragment (file access backend) supported by the daemon's library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub author: String,
    pub interface: String,
    pub suffixes: Vec<String>,
}

impl From<FragmentTuple> for FragmentInfo {
    fn from((id, name, version, author, interface, suffixes): FragmentTuple) -> Self {
        Self {
            id,
            name,
            version,
            author,
            interface,
            suffixes,
        }
    }
}

/// One named bit (or bit group) of a debug mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugMask {
    pub label: String,
    pub value: u32,
}

impl From<(String, i32)> for DebugMask {
    fn from((label, value): (String, i32)) -> Self {
        Self {
            label,
            value: value as u32,
        }
    }
}

/// Ordered list of debug mask entries, as enumerated by the daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugMaskCatalog {
    entries: Vec<DebugMask>,
}

impl DebugMaskCatalog {
    pub fn new(entries: Vec<DebugMask>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[DebugMask] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Split an aggregate mask into one on/off state per catalog entry.
    pub fn decompose(&self, mask: u32) -> Vec<bool> {
        self.entries
            .iter()
            .map(|entry| mask & entry.value != 0)
            .collect()
    }

    /// OR together the values of every entry whose state is on.
    ///
    /// Missing trailing states count as off.
    pub fn compose(&self, states: &[bool]) -> u32 {
        self.entries
            .iter()
            .zip(states)
            .filter(|(_, on)| **on)
            .fold(0, |mask, (entry, _)| mask | entry.value)
    }

    /// Flip the entry at `index` within `mask`; out-of-range indices leave it untouched.
    pub fn toggle(&self, mask: u32, index: usize) -> u32 {
        let mut states = self.decompose(mask);
        match states.get_mut(index) {
            Some(state) => {
                *state = !*state;
                // Bits the catalog does not know about are preserved.
                (mask & !self.known_bits()) | self.compose(&states)
            }
            None => mask,
        }
    }

    fn known_bits(&self) -> u32 {
        self.entries.iter().fold(0, |bits, entry| bits | entry.value)
    }
}

pub const VENDOR_ID_LEN: usize = 8;
pub const PRODUCT_ID_LEN: usize = 16;
pub const REVISION_LEN: usize = 4;
pub const VENDOR_SPECIFIC_LEN: usize = 20;

/// INQUIRY identification strings reported by an emulated device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceId {
    pub vendor_id: String,
    pub product_id: String,
    pub revision: String,
    pub vendor_specific: String,
}

impl DeviceId {
    /// Build a device ID, truncating each field to its maximum length in characters.
    pub fn new(vendor_id: &str, product_id: &str, revision: &str, vendor_specific: &str) -> Self {
        Self {
            vendor_id: truncate_chars(vendor_id, VENDOR_ID_LEN),
            product_id: truncate_chars(product_id, PRODUCT_ID_LEN),
            revision: truncate_chars(revision, REVISION_LEN),
            vendor_specific: truncate_chars(vendor_specific, VENDOR_SPECIFIC_LEN),
        }
    }

    pub fn fields(&self) -> [&str; 4] {
        [
            &self.vendor_id,
            &self.product_id,
            &self.revision,
            &self.vendor_specific,
        ]
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.fields();
        write!(f, "['{}', '{}', '{}', '{}']", a, b, c, d)
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Per-device options exposed through `DeviceGetOption` / `DeviceSetOption`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKind {
    DaemonDebugMask,
    LibraryDebugMask,
    DpmEmulation,
    TrEmulation,
    DeviceId,
}

impl OptionKind {
    pub const ALL: [OptionKind; 5] = [
        OptionKind::DaemonDebugMask,
        OptionKind::LibraryDebugMask,
        OptionKind::DpmEmulation,
        OptionKind::TrEmulation,
        OptionKind::DeviceId,
    ];

    /// Option name on the wire.
    pub fn name(self) -> &'static str {
        match self {
            Self::DaemonDebugMask => "daemon-debug-mask",
            Self::LibraryDebugMask => "library-debug-mask",
            Self::DpmEmulation => "dpm-emulation",
            Self::TrEmulation => "tr-emulation",
            Self::DeviceId => "device-id",
        }
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OptionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown option '{}'", s))
    }
}

/// A typed option value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    DaemonDebugMask(u32),
    LibraryDebugMask(u32),
    DpmEmulation(bool),
    TrEmulation(bool),
    DeviceId(DeviceId),
}

impl OptionValue {
    pub fn kind(&self) -> OptionKind {
        match self {
            Self::DaemonDebugMask(_) => OptionKind::DaemonDebugMask,
            Self::LibraryDebugMask(_) => OptionKind::LibraryDebugMask,
            Self::DpmEmulation(_) => OptionKind::DpmEmulation,
            Self::TrEmulation(_) => OptionKind::TrEmulation,
            Self::DeviceId(_) => OptionKind::DeviceId,
        }
    }

    /// Variant list sent as the `av` argument of `DeviceSetOption`.
    pub fn to_values(&self) -> Vec<Value<'static>> {
        match self {
            // The daemon reads masks as signed 32-bit integers.
            Self::DaemonDebugMask(mask) | Self::LibraryDebugMask(mask) => {
                vec![Value::I32(*mask as i32)]
            }
            Self::DpmEmulation(flag) | Self::TrEmulation(flag) => vec![Value::Bool(*flag)],
            Self::DeviceId(id) => id
                .fields()
                .into_iter()
                .map(|field| Value::from(field.to_string()))
                .collect(),
        }
    }

    /// Decode the `av` reply of `DeviceGetOption` for the given option.
    pub fn from_values(kind: OptionKind, values: &[OwnedValue]) -> Result<Self, DaemonError> {
        let invalid = || {
            DaemonError::InvalidReply(format!("unexpected value for option '{}'", kind))
        };

        match kind {
            OptionKind::DaemonDebugMask | OptionKind::LibraryDebugMask => {
                let mask = values.first().and_then(|v| as_u32(v)).ok_or_else(invalid)?;
                Ok(if kind == OptionKind::DaemonDebugMask {
                    Self::DaemonDebugMask(mask)
                } else {
                    Self::LibraryDebugMask(mask)
                })
            }
            OptionKind::DpmEmulation | OptionKind::TrEmulation => {
                let flag = values.first().and_then(|v| as_bool(v)).ok_or_else(invalid)?;
                Ok(if kind == OptionKind::DpmEmulation {
                    Self::DpmEmulation(flag)
                } else {
                    Self::TrEmulation(flag)
                })
            }
            OptionKind::DeviceId => {
                let fields: Vec<String> = values
                    .iter()
                    .map(|v| as_string(v))
                    .collect::<Option<_>>()
                    .ok_or_else(invalid)?;
                match fields.as_slice() {
                    [a, b, c, d] => Ok(Self::DeviceId(DeviceId::new(a, b, c, d))),
                    _ => Err(invalid()),
                }
            }
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DaemonDebugMask(mask) | Self::LibraryDebugMask(mask) => {
                write!(f, "0x{:X}", mask)
            }
            Self::DpmEmulation(flag) | Self::TrEmulation(flag) => write!(f, "{}", *flag as i32),
            Self::DeviceId(id) => write!(f, "{}", id),
        }
    }
}

fn as_u32(value: &Value<'_>) -> Option<u32> {
    match value {
        Value::I32(v) => Some(*v as u32),
        Value::U32(v) => Some(*v),
        Value::I16(v) => Some(*v as u32),
        Value::U16(v) => Some(*v as u32),
        Value::U8(v) => Some(*v as u32),
        Value::I64(v) => Some(*v as u32),
        Value::U64(v) => Some(*v as u32),
        Value::Value(inner) => as_u32(inner),
        _ => None,
    }
}

fn as_bool(value: &Value<'_>) -> Option<bool> {
    match value {
        Value::Bool(v) => Some(*v),
        Value::Value(inner) => as_bool(inner),
        other => as_u32(other).map(|v| v != 0),
    }
}

fn as_string(value: &Value<'_>) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.as_str().to_string()),
        Value::Value(inner) => as_string(inner),
        _ => None,
    }
}
