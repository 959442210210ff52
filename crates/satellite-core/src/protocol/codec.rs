//! Text line codec for the Companion satellite protocol.
//!
//! Wire format:
//! ```text
//! COMMAND [STATUS] [KEY=VALUE ...]\n
//! ```
//! Values are bare tokens, double-quoted strings (spaces permitted, a
//! backslash escapes the next character), or absent (a bare flag, read as
//! boolean `true`).  Lines end in `\n`; a trailing `\r` is tolerated.

use std::fmt;

use thiserror::Error;

/// Errors that can occur while interpreting a protocol line.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// A field the command cannot be processed without is absent.
    #[error("{command}: missing required field {field}")]
    MissingField {
        command: &'static str,
        field: &'static str,
    },

    /// A field is present but its value could not be interpreted.
    #[error("{command}: invalid value for {field}: {value:?}")]
    InvalidField {
        command: &'static str,
        field: &'static str,
        value: String,
    },

    /// A field that should carry base64 did not decode.
    #[error("{command}: field {field} is not valid base64")]
    InvalidBase64 {
        command: &'static str,
        field: &'static str,
    },

    /// A version string did not have the `major.minor[.patch]` shape.
    #[error("invalid version string: {0:?}")]
    InvalidVersion(String),
}

// ── Parsed values ─────────────────────────────────────────────────────────────

/// The value half of one `KEY=VALUE` fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// `KEY=VALUE`, with quotes removed and escapes resolved.
    Text(String),
    /// A bare `KEY` without `=`.
    Flag,
}

/// Ordered key → value mapping parsed from the body of a line.
///
/// Insertion order is preserved.  Re-inserting an existing key replaces the
/// value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolArgs {
    entries: Vec<(String, ParamValue)>,
}

impl ProtocolArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: ParamValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns the text value of `key`; flags yield `None`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(ParamValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns `true` if `key` is present as a bare flag.
    pub fn has_flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some(ParamValue::Flag))
    }

    /// Interprets `key` as a boolean.
    ///
    /// A bare flag, `1` and `true` are true; any other text is false.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            ParamValue::Flag => Some(true),
            ParamValue::Text(s) => Some(s == "1" || s.eq_ignore_ascii_case("true")),
        }
    }

    /// Interprets `key` as an unsigned decimal integer.
    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get_str(key).and_then(|s| s.trim().parse().ok())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// One parsed line: the command token plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolMessage {
    pub command: String,
    pub args: ProtocolArgs,
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Splits a line into its command token and the remaining body.
///
/// The command is everything before the first space.
pub fn split_command(line: &str) -> (&str, &str) {
    match line.split_once(' ') {
        Some((command, body)) => (command, body),
        None => (line, ""),
    }
}

/// Parses a full line (without its terminator) into a [`ProtocolMessage`].
///
/// # Examples
///
/// ```rust
/// use satellite_core::protocol::codec::{parse_line, ParamValue};
///
/// let msg = parse_line("KEY-PRESS KEY=\"3/2\" PRESSED=1");
/// assert_eq!(msg.command, "KEY-PRESS");
/// assert_eq!(msg.args.get_str("KEY"), Some("3/2"));
/// assert_eq!(msg.args.get("PRESSED"), Some(&ParamValue::Text("1".into())));
/// ```
pub fn parse_line(line: &str) -> ProtocolMessage {
    let (command, body) = split_command(line);
    ProtocolMessage {
        command: command.to_string(),
        args: parse_params(body),
    }
}

/// Scans a line body into ordered `KEY=VALUE` / `FLAG` fragments.
///
/// Fragments split on spaces that are neither escaped nor inside quotes.  A
/// backslash copies the following character literally.  An unescaped `"`
/// toggles quoting and is itself dropped.  Each fragment splits on its first
/// `=`; a fragment without `=` becomes a [`ParamValue::Flag`].
pub fn parse_params(body: &str) -> ProtocolArgs {
    let mut fragments: Vec<String> = vec![String::new()];
    let mut in_quotes = false;
    let mut chars = body.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    push_char(&mut fragments, escaped);
                }
            }
            '"' => in_quotes = !in_quotes,
            ' ' if !in_quotes => fragments.push(String::new()),
            _ => push_char(&mut fragments, c),
        }
    }

    let mut args = ProtocolArgs::new();
    for fragment in fragments.into_iter().filter(|f| !f.is_empty()) {
        match fragment.split_once('=') {
            Some((key, value)) => args.insert(key, ParamValue::Text(value.to_string())),
            None => args.insert(fragment, ParamValue::Flag),
        }
    }
    args
}

fn push_char(fragments: &mut [String], c: char) {
    if let Some(last) = fragments.last_mut() {
        last.push(c);
    }
}

// ── Serialization ─────────────────────────────────────────────────────────────

/// A value that can be written as the right-hand side of `KEY=VALUE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    /// Rendered as decimal text.
    Int(i64),
    /// Rendered as `1` or `0`.
    Bool(bool),
    /// Rendered inside double quotes.
    Str(String),
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Int(n) => write!(f, "{n}"),
            ArgValue::Bool(b) => f.write_str(if *b { "1" } else { "0" }),
            // Embedded quotes are written as-is; callers send pre-sanitised
            // (typically base64) text.  Backslashes are doubled so the
            // receiving scanner reads them back literally.
            ArgValue::Str(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\")),
        }
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Bool(value)
    }
}

impl From<u32> for ArgValue {
    fn from(value: u32) -> Self {
        ArgValue::Int(i64::from(value))
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        ArgValue::Int(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Str(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::Str(value)
    }
}

/// Serializes one outbound line, including the trailing `\n`.
///
/// `status` is written as a bare token directly after the command.
/// `device_id`, when present, is always written quoted as `DEVICEID="..."`.
///
/// # Examples
///
/// ```rust
/// use satellite_core::protocol::codec::{serialize_line, ArgValue};
///
/// let line = serialize_line(
///     "KEY-PRESS",
///     None,
///     Some("deck-1"),
///     &[("KEY", ArgValue::from("3/2")), ("PRESSED", ArgValue::Bool(true))],
/// );
/// assert_eq!(line, "KEY-PRESS DEVICEID=\"deck-1\" KEY=\"3/2\" PRESSED=1\n");
/// ```
pub fn serialize_line(
    command: &str,
    status: Option<&str>,
    device_id: Option<&str>,
    args: &[(&str, ArgValue)],
) -> String {
    let mut line = String::from(command);
    if let Some(status) = status.filter(|s| !s.is_empty()) {
        line.push(' ');
        line.push_str(status);
    }
    if let Some(id) = device_id {
        line.push_str(" DEVICEID=");
        line.push_str(&ArgValue::from(id).to_string());
    }
    for (key, value) in args {
        line.push(' ');
        line.push_str(key);
        line.push('=');
        line.push_str(&value.to_string());
    }
    line.push('\n');
    line
}

// ── Stream framing ────────────────────────────────────────────────────────────

/// Accumulates raw reads and yields complete lines.
///
/// A single read may carry part of a line, or several lines at once.  Bytes
/// after the last `\n` are held until the next [`push_bytes`](Self::push_bytes).
/// Buffering bytes (not text) keeps multi-byte UTF-8 sequences intact when a
/// read boundary falls inside one.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` and returns every line completed by them.
    ///
    /// Returned lines have `\n` and any trailing `\r` removed.  Empty lines are
    /// skipped.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut raw: Vec<u8> = self.pending.drain(..=pos).collect();
            raw.pop();
            if raw.last() == Some(&b'\r') {
                raw.pop();
            }
            if !raw.is_empty() {
                lines.push(String::from_utf8_lossy(&raw).into_owned());
            }
        }
        lines
    }

    /// Text convenience wrapper over [`push_bytes`](Self::push_bytes).
    pub fn push_str(&mut self, text: &str) -> Vec<String> {
        self.push_bytes(text.as_bytes())
    }

    /// Number of buffered bytes not yet terminated by `\n`.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drops any partial line, e.g. when the transport is replaced.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
