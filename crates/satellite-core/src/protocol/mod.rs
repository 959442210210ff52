//! Protocol module containing the line codec, message types, and API versions.

pub mod codec;
pub mod messages;
pub mod version;

pub use codec::{
    parse_line, parse_params, serialize_line, split_command, ArgValue, LineBuffer, ParamValue,
    ProtocolArgs, ProtocolError, ProtocolMessage,
};
pub use messages::*;
pub use version::{ApiVersion, Capabilities};
