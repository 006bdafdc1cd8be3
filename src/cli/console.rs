//! Output and input helpers for the command-line client.

use std::fmt::Display;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

/// Line-oriented writer for command output.
///
/// Errors and warnings go to the same stream as regular output, prefixed so
/// scripts can tell them apart.
pub struct Console<W: Write> {
    out: W,
}

impl<W: Write> Console<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn line(&mut self, text: impl Display) {
        // Nothing sensible to do if stdout is gone.
        let _ = writeln!(self.out, "{}", text);
    }

    pub fn blank(&mut self) {
        let _ = writeln!(self.out);
    }

    pub fn error(&mut self, text: impl Display) {
        self.line(format_args!("ERROR: {}", text));
    }

    pub fn warning(&mut self, text: impl Display) {
        self.line(format_args!("WARNING: {}", text));
    }

    pub fn flush(&mut self) {
        let _ = self.out.flush();
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl Console<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

/// Source of the password for encrypted images.
pub trait PasswordPrompt {
    fn read_password(&self, prompt: &str) -> io::Result<String>;
}

/// Reads the password from the terminal without echoing it.
pub struct TerminalPrompt;

impl PasswordPrompt for TerminalPrompt {
    fn read_password(&self, prompt: &str) -> io::Result<String> {
        rpassword::prompt_password(prompt)
    }
}

/// Parse an integer the way C's `strtol(s, NULL, 0)` does:
/// `0x` prefix for hex, a leading `0` for octal, decimal otherwise.
pub fn parse_number(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    if !digits.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }

    let value = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };

    Some(if negative { -value } else { value })
}

/// Parse a 32-bit mask; values above `i32::MAX` are accepted as unsigned.
pub fn parse_mask(text: &str) -> Option<u32> {
    let value = parse_number(text)?;
    if value < i64::from(i32::MIN) || value > i64::from(u32::MAX) {
        return None;
    }
    Some(value as u32)
}

/// Make `path` absolute against `cwd` and drop `.` / `..` components.
pub fn absolute_path(cwd: &Path, path: &str) -> String {
    let joined = cwd.join(path);
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized.to_string_lossy().into_owned()
}
