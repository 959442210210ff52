//! The outbound half of the server connection, as seen by surfaces.
//!
//! [`SurfaceLink`] is implemented by the network layer's `ConnectionManager`.
//! Surfaces and the registry only ever talk to the server through this trait,
//! so the socket stays owned by one place and the application layer can be
//! tested against a mock.

use satellite_core::{Capabilities, GridPos, RegisterProps};

/// Commands a surface can send to the server.
///
/// Input methods are fire-and-forget: while no session is established they do
/// nothing.  Only [`add_device`](Self::add_device) reports failure, and only
/// for caller misuse (registering a surface twice).
#[cfg_attr(test, mockall::automock)]
pub trait SurfaceLink: Send + Sync {
    /// Announces a surface to the server (`ADD-DEVICE`).
    fn add_device(
        &self,
        surface_id: &str,
        product_name: &str,
        props: &RegisterProps,
    ) -> anyhow::Result<()>;

    /// Withdraws a surface (`REMOVE-DEVICE`) and forgets its registration.
    fn remove_device(&self, surface_id: &str);

    fn key_down_xy(&self, surface_id: &str, position: GridPos);

    fn key_up_xy(&self, surface_id: &str, position: GridPos);

    fn rotate_left_xy(&self, surface_id: &str, position: GridPos);

    fn rotate_right_xy(&self, surface_id: &str, position: GridPos);

    /// Sends one digit typed on the lock screen (`PINCODE-KEY`).
    fn pincode_key(&self, surface_id: &str, digit: u8);

    /// Sends a variable edit made on the surface; `value` is plain text.
    fn send_variable_value(&self, surface_id: &str, name: &str, value: &str);

    /// Negotiated server features, once a session is ready.
    fn capabilities(&self) -> Option<Capabilities>;

    /// Human-readable server address shown on status cards.
    fn host(&self) -> String;
}
