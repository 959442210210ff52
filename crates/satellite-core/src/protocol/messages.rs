//! Typed inbound and outbound protocol messages.
//!
//! Inbound lines are parsed with [`InboundMessage::parse`]; outbound commands
//! are built as [`OutboundMessage`] values and rendered with
//! [`OutboundMessage::to_line`].  Field names and command tokens match what a
//! Companion server sends and expects.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::codec::{parse_params, serialize_line, split_command, ArgValue, ProtocolArgs, ProtocolError};
use super::version::ApiVersion;
use crate::domain::surface::{ControlKey, GridPos, RegisterProps};

// ── Command tokens ────────────────────────────────────────────────────────────

pub const CMD_PING: &str = "PING";
pub const CMD_PONG: &str = "PONG";
pub const CMD_BEGIN: &str = "BEGIN";
pub const CMD_KEY_STATE: &str = "KEY-STATE";
pub const CMD_KEYS_CLEAR: &str = "KEYS-CLEAR";
pub const CMD_VARIABLE_VALUE: &str = "VARIABLE-VALUE";
pub const CMD_LOCKED_STATE: &str = "LOCKED-STATE";
pub const CMD_BRIGHTNESS: &str = "BRIGHTNESS";
pub const CMD_ADD_DEVICE: &str = "ADD-DEVICE";
pub const CMD_REMOVE_DEVICE: &str = "REMOVE-DEVICE";
pub const CMD_KEY_PRESS: &str = "KEY-PRESS";
pub const CMD_KEY_ROTATE: &str = "KEY-ROTATE";
pub const CMD_SET_VARIABLE_VALUE: &str = "SET-VARIABLE-VALUE";
pub const CMD_PINCODE_KEY: &str = "PINCODE-KEY";

// ── Inbound payloads ──────────────────────────────────────────────────────────

/// Everything the server says about one key in `KEY-STATE`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyState {
    pub surface_id: String,
    pub key: Option<ControlKey>,
    /// Decoded image bytes, if the server sent one.
    pub bitmap: Option<Vec<u8>>,
    /// Background colour, e.g. `#ff0000`.
    pub color: Option<String>,
    /// Decoded key text.
    pub text: Option<String>,
    pub text_color: Option<String>,
    pub font_size: Option<String>,
    /// `TYPE`: button, pageup, pagedown, pagenum, ...
    pub control_type: Option<String>,
    pub pressed: bool,
}

/// Outcome carried by an `ADD-DEVICE` acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddDeviceResult {
    Ok,
    Error(String),
}

/// A parsed line received from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// `PING <payload>`; answered with `PONG <payload>`.
    Ping { payload: String },
    Pong,
    /// Session gate.  Versions that are missing or do not parse are `None`.
    Begin {
        companion_version: Option<String>,
        api_version: Option<ApiVersion>,
    },
    KeyState(KeyState),
    KeysClear { surface_id: String },
    VariableValue {
        surface_id: String,
        name: String,
        value: String,
    },
    LockedState {
        surface_id: String,
        locked: bool,
        character_count: u32,
    },
    Brightness { surface_id: String, percent: u32 },
    AddDevice {
        surface_id: String,
        result: AddDeviceResult,
    },
    RemoveDevice { surface_id: String },
}

impl InboundMessage {
    /// Parses one complete line (terminator already removed).
    ///
    /// Returns `Ok(None)` for commands this client does not handle.  Returns
    /// an error when a known command lacks a required field or carries a
    /// value that cannot be decoded.
    pub fn parse(line: &str) -> Result<Option<Self>, ProtocolError> {
        let (command, body) = split_command(line);

        // PING/PONG bodies are opaque echo payloads, not KEY=VALUE pairs.
        match command {
            CMD_PING => {
                return Ok(Some(InboundMessage::Ping {
                    payload: body.to_string(),
                }))
            }
            CMD_PONG => return Ok(Some(InboundMessage::Pong)),
            _ => {}
        }

        let args = parse_params(body);
        let msg = match command {
            CMD_BEGIN => InboundMessage::Begin {
                companion_version: args.get_str("CompanionVersion").map(str::to_string),
                api_version: args.get_str("ApiVersion").and_then(|v| match v.parse() {
                    Ok(version) => Some(version),
                    Err(e) => {
                        debug!("BEGIN carried an unreadable ApiVersion: {e}");
                        None
                    }
                }),
            },
            CMD_KEY_STATE => InboundMessage::KeyState(parse_key_state(&args)?),
            CMD_KEYS_CLEAR => InboundMessage::KeysClear {
                surface_id: device_id(CMD_KEYS_CLEAR, &args)?,
            },
            CMD_VARIABLE_VALUE => {
                let surface_id = device_id(CMD_VARIABLE_VALUE, &args)?;
                let name = required(CMD_VARIABLE_VALUE, &args, "VARIABLE")?.to_string();
                let raw = required(CMD_VARIABLE_VALUE, &args, "VALUE")?;
                InboundMessage::VariableValue {
                    surface_id,
                    name,
                    value: decode_text(CMD_VARIABLE_VALUE, "VALUE", raw)?,
                }
            }
            CMD_LOCKED_STATE => {
                let surface_id = device_id(CMD_LOCKED_STATE, &args)?;
                let locked = args.get_bool("LOCKED").ok_or(ProtocolError::MissingField {
                    command: CMD_LOCKED_STATE,
                    field: "LOCKED",
                })?;
                InboundMessage::LockedState {
                    surface_id,
                    locked,
                    character_count: args.get_u32("CHARACTER_COUNT").unwrap_or(0),
                }
            }
            CMD_BRIGHTNESS => {
                let surface_id = device_id(CMD_BRIGHTNESS, &args)?;
                let raw = required(CMD_BRIGHTNESS, &args, "VALUE")?;
                let percent = raw.trim().parse::<u32>().map_err(|_| ProtocolError::InvalidField {
                    command: CMD_BRIGHTNESS,
                    field: "VALUE",
                    value: raw.to_string(),
                })?;
                InboundMessage::Brightness {
                    surface_id,
                    percent: percent.min(100),
                }
            }
            CMD_ADD_DEVICE => {
                let surface_id = device_id(CMD_ADD_DEVICE, &args)?;
                let result = if args.has_flag("ERROR") {
                    AddDeviceResult::Error(
                        args.get_str("MESSAGE").unwrap_or("unknown error").to_string(),
                    )
                } else {
                    AddDeviceResult::Ok
                };
                InboundMessage::AddDevice { surface_id, result }
            }
            CMD_REMOVE_DEVICE => InboundMessage::RemoveDevice {
                surface_id: device_id(CMD_REMOVE_DEVICE, &args)?,
            },
            _ => return Ok(None),
        };
        Ok(Some(msg))
    }
}

fn required<'a>(
    command: &'static str,
    args: &'a ProtocolArgs,
    field: &'static str,
) -> Result<&'a str, ProtocolError> {
    args.get_str(field)
        .ok_or(ProtocolError::MissingField { command, field })
}

fn device_id(command: &'static str, args: &ProtocolArgs) -> Result<String, ProtocolError> {
    required(command, args, "DEVICEID").map(str::to_string)
}

fn decode_bytes(
    command: &'static str,
    field: &'static str,
    raw: &str,
) -> Result<Vec<u8>, ProtocolError> {
    BASE64_STANDARD
        .decode(raw.trim())
        .map_err(|_| ProtocolError::InvalidBase64 { command, field })
}

fn decode_text(
    command: &'static str,
    field: &'static str,
    raw: &str,
) -> Result<String, ProtocolError> {
    let bytes = decode_bytes(command, field, raw)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn parse_key_state(args: &ProtocolArgs) -> Result<KeyState, ProtocolError> {
    let surface_id = device_id(CMD_KEY_STATE, args)?;
    let key = required(CMD_KEY_STATE, args, "KEY")?;

    let bitmap = match args.get_str("BITMAP") {
        Some(raw) if !raw.is_empty() => Some(decode_bytes(CMD_KEY_STATE, "BITMAP", raw)?),
        _ => None,
    };
    let text = match args.get_str("TEXT") {
        Some(raw) => Some(decode_text(CMD_KEY_STATE, "TEXT", raw)?),
        None => None,
    };

    Ok(KeyState {
        surface_id,
        key: Some(ControlKey::parse(key)),
        bitmap,
        color: args.get_str("COLOR").map(str::to_string),
        text,
        text_color: args.get_str("TEXT_COLOR").map(str::to_string),
        font_size: args.get_str("FONT_SIZE").map(str::to_string),
        control_type: args.get_str("TYPE").map(str::to_string),
        pressed: args.get_bool("PRESSED").unwrap_or(false),
    })
}

// ── Outbound ──────────────────────────────────────────────────────────────────

/// A command this client sends to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Ping {
        payload: String,
    },
    Pong {
        payload: String,
    },
    AddDevice {
        surface_id: String,
        product_name: String,
        props: RegisterProps,
        /// Ask the server to drive the lock screen (`PINCODE_LOCK="FULL"`).
        pincode_lock: bool,
    },
    RemoveDevice {
        surface_id: String,
    },
    KeyPress {
        surface_id: String,
        position: GridPos,
        pressed: bool,
    },
    KeyRotate {
        surface_id: String,
        position: GridPos,
        /// `true` for clockwise.
        right: bool,
    },
    /// `value` is plain text; it is base64-encoded on the wire.
    SetVariableValue {
        surface_id: String,
        name: String,
        value: String,
    },
    PincodeKey {
        surface_id: String,
        digit: u8,
    },
}

impl OutboundMessage {
    pub fn command(&self) -> &'static str {
        match self {
            OutboundMessage::Ping { .. } => CMD_PING,
            OutboundMessage::Pong { .. } => CMD_PONG,
            OutboundMessage::AddDevice { .. } => CMD_ADD_DEVICE,
            OutboundMessage::RemoveDevice { .. } => CMD_REMOVE_DEVICE,
            OutboundMessage::KeyPress { .. } => CMD_KEY_PRESS,
            OutboundMessage::KeyRotate { .. } => CMD_KEY_ROTATE,
            OutboundMessage::SetVariableValue { .. } => CMD_SET_VARIABLE_VALUE,
            OutboundMessage::PincodeKey { .. } => CMD_PINCODE_KEY,
        }
    }

    /// Renders the newline-terminated wire line.
    pub fn to_line(&self) -> String {
        let command = self.command();
        match self {
            OutboundMessage::Ping { payload } | OutboundMessage::Pong { payload } => {
                serialize_line(command, Some(payload), None, &[])
            }
            OutboundMessage::AddDevice {
                surface_id,
                product_name,
                props,
                pincode_lock,
            } => {
                let mut args = vec![
                    ("PRODUCT_NAME", ArgValue::from(product_name.as_str())),
                    ("KEYS_TOTAL", ArgValue::from(props.keys_total)),
                    ("KEYS_PER_ROW", ArgValue::from(props.columns)),
                    ("BITMAPS", ArgValue::from(props.bitmap_size.unwrap_or(0))),
                    ("COLORS", ArgValue::from(props.colours)),
                    ("TEXT", ArgValue::from(props.text)),
                    ("TEXT_STYLE", ArgValue::from(props.text_style)),
                    ("BRIGHTNESS", ArgValue::from(props.brightness)),
                ];
                if *pincode_lock {
                    args.push(("PINCODE_LOCK", ArgValue::from("FULL")));
                }
                serialize_line(command, None, Some(surface_id), &args)
            }
            OutboundMessage::RemoveDevice { surface_id } => {
                serialize_line(command, None, Some(surface_id), &[])
            }
            OutboundMessage::KeyPress {
                surface_id,
                position,
                pressed,
            } => serialize_line(
                command,
                None,
                Some(surface_id),
                &[
                    ("KEY", ArgValue::from(position.to_string())),
                    ("PRESSED", ArgValue::from(*pressed)),
                ],
            ),
            OutboundMessage::KeyRotate {
                surface_id,
                position,
                right,
            } => serialize_line(
                command,
                None,
                Some(surface_id),
                &[
                    ("KEY", ArgValue::from(position.to_string())),
                    ("DIRECTION", ArgValue::from(*right)),
                ],
            ),
            OutboundMessage::SetVariableValue {
                surface_id,
                name,
                value,
            } => serialize_line(
                command,
                None,
                Some(surface_id),
                &[
                    ("VARIABLE", ArgValue::from(name.as_str())),
                    ("VALUE", ArgValue::from(BASE64_STANDARD.encode(value))),
                ],
            ),
            OutboundMessage::PincodeKey { surface_id, digit } => serialize_line(
                command,
                None,
                Some(surface_id),
                &[("KEY", ArgValue::from(u32::from(*digit)))],
            ),
        }
    }
}
