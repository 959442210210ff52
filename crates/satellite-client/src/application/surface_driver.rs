//! The device-driver seam.
//!
//! Each hardware family (button grids, jog-wheel panels, LCD keypads) supplies
//! a [`SurfaceDriver`].  The application layer never talks to USB or HID
//! directly: it tells the driver *what* to show and the driver decides *how*.
//!
//! Optional driver features are default trait methods, so a driver only
//! overrides what its hardware supports.

use std::sync::Arc;

use async_trait::async_trait;
use satellite_core::{GridPos, RegisterProps};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::surface_proxy::SurfaceContext;

/// Errors a driver can report.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The device was unplugged or its handle closed.
    #[error("device disconnected")]
    Disconnected,

    /// A write to the device failed.
    #[error("device write failed: {0}")]
    Write(String),

    /// The device cannot perform the request.
    #[error("operation not supported by this surface: {0}")]
    Unsupported(&'static str),
}

// ── Images ────────────────────────────────────────────────────────────────────

/// Byte layout a driver wants its key images in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb,
    Rgba,
    Bgr,
    Bgra,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
            PixelFormat::Rgba | PixelFormat::Bgra => 4,
        }
    }
}

/// A key image as received from the server (8-bit RGB), converted on demand.
///
/// Conversion happens when the driver calls [`render`](Self::render) from
/// inside a running draw job, so images for jobs that are replaced or aborted
/// are never converted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LazyImage {
    rgb: Arc<[u8]>,
    width: u32,
    height: u32,
}

impl LazyImage {
    /// Wraps packed RGB bytes for a square image.
    ///
    /// Returns `None` when the byte count is not a square number of pixels.
    pub fn from_square_rgb(rgb: Vec<u8>) -> Option<Self> {
        if rgb.is_empty() || rgb.len() % 3 != 0 {
            return None;
        }
        let pixels = rgb.len() / 3;
        let edge = (pixels as f64).sqrt().round() as usize;
        if edge * edge != pixels {
            return None;
        }
        Some(Self {
            rgb: rgb.into(),
            width: edge as u32,
            height: edge as u32,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGB bytes as received.
    pub fn raw(&self) -> &[u8] {
        &self.rgb
    }

    /// Scales to `width`×`height` (nearest neighbour) and converts to `format`.
    pub fn render(&self, width: u32, height: u32, format: PixelFormat) -> Vec<u8> {
        let bpp = format.bytes_per_pixel();
        let mut out = Vec::with_capacity(width as usize * height as usize * bpp);

        for y in 0..height {
            let src_y = (y as u64 * self.height as u64 / height.max(1) as u64) as usize;
            for x in 0..width {
                let src_x = (x as u64 * self.width as u64 / width.max(1) as u64) as usize;
                let i = (src_y * self.width as usize + src_x) * 3;
                let (r, g, b) = (self.rgb[i], self.rgb[i + 1], self.rgb[i + 2]);
                match format {
                    PixelFormat::Rgb => out.extend_from_slice(&[r, g, b]),
                    PixelFormat::Rgba => out.extend_from_slice(&[r, g, b, 0xff]),
                    PixelFormat::Bgr => out.extend_from_slice(&[b, g, r]),
                    PixelFormat::Bgra => out.extend_from_slice(&[b, g, r, 0xff]),
                }
            }
        }
        out
    }
}

// ── Draw requests ─────────────────────────────────────────────────────────────

/// Everything needed to paint one control.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawProps {
    /// Grid position, for keys on the grid.
    pub position: Option<GridPos>,
    /// Opaque control id, for controls off the grid.
    pub control_id: Option<String>,
    pub image: Option<LazyImage>,
    /// Background colour, `#rrggbb`.
    pub color: Option<String>,
    pub text: Option<String>,
    pub text_color: Option<String>,
    pub font_size: Option<String>,
}

impl DrawProps {
    /// A black, empty key at `position`.
    pub fn blank(position: GridPos) -> Self {
        Self {
            position: Some(position),
            color: Some("#000000".to_string()),
            ..Self::default()
        }
    }

    /// A key showing `text` on black at `position`.
    pub fn label(position: GridPos, text: impl Into<String>) -> Self {
        Self {
            position: Some(position),
            color: Some("#000000".to_string()),
            text: Some(text.into()),
            text_color: Some("#ffffff".to_string()),
            font_size: Some("auto".to_string()),
            ..Self::default()
        }
    }
}

/// Renders the full-surface status card ("Connecting...", errors).
///
/// Pixel-level rasterization lives outside this crate; implementations only
/// need to produce RGB bytes of the requested size.
pub trait CardRenderer: Send + Sync {
    fn render_status(&self, width: u32, height: u32, host: &str, status: &str) -> Vec<u8>;
}

// ── The driver trait ──────────────────────────────────────────────────────────

#[async_trait]
pub trait SurfaceDriver: Send + Sync {
    /// Globally unique id, stable across reconnects.
    fn surface_id(&self) -> &str;

    fn product_name(&self) -> &str;

    fn register_props(&self) -> &RegisterProps;

    /// Called once after the surface is attached.  `context` routes the
    /// device's input back through the surface (and its lock overlay).
    async fn init_device(&self, context: SurfaceContext) -> Result<(), DriverError>;

    async fn close(&self) -> Result<(), DriverError>;

    /// The server accepted this surface.
    async fn device_added(&self) -> Result<(), DriverError>;

    async fn set_brightness(&self, percent: u32) -> Result<(), DriverError>;

    async fn blank_device(&self) -> Result<(), DriverError>;

    /// Paints one control.  Implementations should check `cancel` before any
    /// slow step.
    async fn draw(&self, cancel: &CancellationToken, props: DrawProps) -> Result<(), DriverError>;

    /// Shows a full-surface status card.
    async fn show_status(
        &self,
        cancel: &CancellationToken,
        renderer: &dyn CardRenderer,
        host: &str,
        status: &str,
    ) -> Result<(), DriverError>;

    async fn on_variable_value(&self, _name: &str, _value: &str) -> Result<(), DriverError> {
        Ok(())
    }

    /// `true` for hardware with its own lock screen; lock updates are then
    /// passed to [`on_locked_status`](Self::on_locked_status) instead of being
    /// drawn from the pincode map.
    fn handles_lock_natively(&self) -> bool {
        false
    }

    async fn on_locked_status(
        &self,
        _locked: bool,
        _character_count: u32,
    ) -> Result<(), DriverError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker_2x2() -> LazyImage {
        // red, green / blue, white
        LazyImage::from_square_rgb(vec![
            255, 0, 0, 0, 255, 0, //
            0, 0, 255, 255, 255, 255,
        ])
        .unwrap()
    }

    #[test]
    fn test_from_square_rgb_rejects_non_square() {
        assert!(LazyImage::from_square_rgb(vec![0; 6]).is_none());
        assert!(LazyImage::from_square_rgb(vec![0; 5]).is_none());
        assert!(LazyImage::from_square_rgb(Vec::new()).is_none());
    }

    #[test]
    fn test_render_same_size_bgr_swaps_channels() {
        let out = checker_2x2().render(2, 2, PixelFormat::Bgr);
        assert_eq!(&out[0..3], &[0, 0, 255]);
        assert_eq!(&out[6..9], &[255, 0, 0]);
    }

    #[test]
    fn test_render_upscales_nearest_neighbour() {
        // Arrange
        let img = checker_2x2();

        // Act
        let out = img.render(4, 4, PixelFormat::Rgba);

        // Assert
        assert_eq!(out.len(), 4 * 4 * 4);
        assert_eq!(&out[0..4], &[255, 0, 0, 255]);
        assert_eq!(&out[4..8], &[255, 0, 0, 255]);
        assert_eq!(&out[8..12], &[0, 255, 0, 255]);
        let last = out.len() - 4;
        assert_eq!(&out[last..], &[255, 255, 255, 255]);
    }

    #[test]
    fn test_label_props_are_white_on_black() {
        let props = DrawProps::label(GridPos::new(1, 2), "7");
        assert_eq!(props.text.as_deref(), Some("7"));
        assert_eq!(props.color.as_deref(), Some("#000000"));
        assert_eq!(props.position, Some(GridPos::new(1, 2)));
    }
}
