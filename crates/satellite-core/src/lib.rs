//! # satellite-core
//!
//! Shared library for the surface satellite containing the line protocol
//! codec, the typed protocol messages, and the surface domain model.
//!
//! It has zero dependencies on sockets, timers, or device drivers.
//!
//! # Architecture overview (for beginners)
//!
//! A *surface* is a physical control panel: a grid of buttons, maybe some
//! rotary encoders, maybe LCD keys.  The satellite daemon connects one or more
//! surfaces to a remote show-control server ("Companion") over a single text
//! connection.  Button presses travel up to the server; images, colours and
//! text travel back down to the hardware.
//!
//! This crate (`satellite-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – How lines travel over the network.  Each message is one
//!   newline-terminated line of the form `COMMAND [STATUS] [KEY=VALUE ...]`.
//!   The codec turns lines into typed Rust enums and back.
//!
//! - **`domain`** – Pure surface logic with no I/O: grid coordinates, the
//!   registration properties a surface advertises, and the pincode map used to
//!   draw a numeric lock screen on the hardware itself.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `satellite_core::GridPos` instead of `satellite_core::domain::surface::GridPos`.
pub use domain::pincode::{PincodeAction, PincodeMap};
pub use domain::surface::{ControlKey, GridPos, RegisterProps};
pub use protocol::codec::{parse_line, serialize_line, ArgValue, LineBuffer, ProtocolError};
pub use protocol::messages::{InboundMessage, OutboundMessage};
pub use protocol::version::{ApiVersion, Capabilities};
