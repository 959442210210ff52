//! Infrastructure layer for the satellite client.
//!
//! Contains everything that touches the outside world: sockets, timers,
//! config files and surface drivers.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `satellite_core`, but MUST NOT be imported by the `application` layer
//! outside of tests.
//!
//! # Sub-modules
//!
//! - **`network`** – TCP/WebSocket transports and the `ConnectionManager`
//!   that runs the handshake, heartbeat and reconnect loop.  It implements the
//!   application's `SurfaceLink` trait.
//!
//! - **`config`** – TOML configuration persistence.
//!
//! - **`driver`** – `SurfaceDriver` implementations: a recording mock and a
//!   flat-colour status card renderer.

pub mod config;
pub mod driver;
pub mod network;
