//! Surface driver implementations.
//!
//! Vendor drivers (USB/HID button grids, LCD keypads) plug in here by
//! implementing [`SurfaceDriver`](crate::application::surface_driver::SurfaceDriver).
//! This crate ships a recording [`mock::MockSurfaceDriver`] used by the tests
//! and the demo daemon, and a [`SolidCardRenderer`] for status cards.

pub mod mock;

use crate::application::surface_driver::CardRenderer;

/// Renders status cards as a single flat colour.
///
/// Text rasterization belongs to a real renderer; drivers that only need a
/// correctly sized buffer (or that draw status text themselves) can use this.
#[derive(Debug, Clone)]
pub struct SolidCardRenderer {
    pub rgb: [u8; 3],
}

impl Default for SolidCardRenderer {
    fn default() -> Self {
        Self {
            rgb: [0x10, 0x10, 0x10],
        }
    }
}

impl CardRenderer for SolidCardRenderer {
    fn render_status(&self, width: u32, height: u32, _host: &str, _status: &str) -> Vec<u8> {
        self.rgb.repeat(width as usize * height as usize)
    }
}
