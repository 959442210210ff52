//! Application layer for the satellite client.
//!
//! # What lives here?
//!
//! - **`events`** – `ClientEvent`, the typed stream the connection layer
//!   produces.
//!
//! - **`surface_link`** – the outbound seam to the server.  Implemented by
//!   the network layer, mocked in tests.
//!
//! - **`surface_driver`** – the seam to hardware: the `SurfaceDriver` trait,
//!   draw properties and lazily converted key images.
//!
//! - **`write_queue`** / **`drawing_state`** – the bounded, cancellable draw
//!   pipeline that each surface owns.
//!
//! - **`surface_proxy`** – per-surface façade: input translation, the
//!   pincode lock overlay, and all drawing.
//!
//! - **`surface_registry`** – routes events to surfaces by id and keeps them
//!   registered across reconnects.
//!
//! Nothing here opens sockets or files; timers are limited to the status
//! animation.

pub mod drawing_state;
pub mod events;
pub mod surface_driver;
pub mod surface_link;
pub mod surface_proxy;
pub mod surface_registry;
pub mod write_queue;
