//! satellite-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the satellite do? (for beginners)
//!
//! A *satellite* runs next to physical control surfaces (button grids, LCD
//! keypads, jog wheels) and connects them to a Companion server somewhere on
//! the network.  The server decides what every key looks like and what a
//! press does; the satellite only moves data in both directions:
//!
//! 1. Connects to the server over TCP or WebSocket and waits for `BEGIN`.
//! 2. Announces every attached surface with `ADD-DEVICE`.
//! 3. Draws the images, colours and text the server pushes (`KEY-STATE`),
//!    through a small per-surface write pipeline so a slow device never falls
//!    behind on stale frames.
//! 4. Reports presses, releases and rotations back as `KEY-PRESS` /
//!    `KEY-ROTATE`, or as `PINCODE-KEY` while the surface is locked.
//! 5. Shows a "Connecting..." card whenever the server is unreachable and
//!    re-registers everything when it comes back.

/// Application layer: draw pipeline, surfaces and the seams they use.
pub mod application;

/// Infrastructure layer: network, config and drivers.
pub mod infrastructure;
