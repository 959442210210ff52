//! Events the connection layer emits to the rest of the client.
//!
//! The `ConnectionManager` owns the sending half of an unbounded channel of
//! [`ClientEvent`]s; the [`SurfaceRegistry`](super::surface_registry::SurfaceRegistry)
//! consumes the receiving half.  A slow or failing consumer can therefore
//! never re-enter or stall the socket task.

use satellite_core::protocol::messages::KeyState;
use satellite_core::Capabilities;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A transport attempt has started.
    Connecting,
    /// The server sent an acceptable `BEGIN`; surfaces may be registered.
    Connected(Capabilities),
    /// A session that had reached `Connected` ended.
    Disconnected,
    /// A transport or protocol problem worth surfacing to the user.
    Error(String),
    /// `KEY-STATE` for one key.
    Draw(KeyState),
    Brightness {
        surface_id: String,
        percent: u32,
    },
    /// The server accepted an `ADD-DEVICE`.
    NewDevice {
        surface_id: String,
    },
    /// `KEYS-CLEAR`.
    ClearDeck {
        surface_id: String,
    },
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
    /// The server rejected an `ADD-DEVICE`.
    DeviceErrored {
        surface_id: String,
        message: String,
    },
    /// The server dropped a surface with `REMOVE-DEVICE`.
    DeviceRemoved {
        surface_id: String,
    },
}
