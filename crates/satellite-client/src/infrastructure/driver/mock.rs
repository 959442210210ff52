//! Mock surface driver for tests and the demo daemon.
//!
//! # Why a mock driver?
//!
//! Real drivers talk to USB/HID hardware that is not present on a build
//! machine.  `MockSurfaceDriver` records every call in order so assertions can
//! check exactly what would have been written to the device, and it keeps the
//! [`SurfaceContext`] it was initialised with so a test can simulate button
//! presses.
//!
//! # Usage in tests
//!
//! ```ignore
//! let driver = Arc::new(MockSurfaceDriver::new("deck", RegisterProps::grid(8, 4)));
//! registry.add_surface(driver.clone()).await?;
//!
//! driver.press(3);               // key index 3 goes down and up
//! assert_eq!(driver.calls()[0], DriverCall::Init);
//! ```
//!
//! # `should_fail` flag
//!
//! Set `should_fail` to make every drawing call return
//! [`DriverError::Write`], to exercise error paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use satellite_core::{GridPos, RegisterProps};
use tokio_util::sync::CancellationToken;

use crate::application::surface_driver::{CardRenderer, DrawProps, DriverError, SurfaceDriver};
use crate::application::surface_proxy::SurfaceContext;

/// One recorded driver call.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Init,
    Close,
    DeviceAdded,
    Brightness(u32),
    Blank,
    Draw(DrawProps),
    /// `(host, status)`.
    Status(String, String),
    VariableValue(String, String),
    LockedStatus(bool, u32),
}

/// A driver that records calls instead of touching hardware.
pub struct MockSurfaceDriver {
    surface_id: String,
    product_name: String,
    props: RegisterProps,
    native_lock: bool,
    calls: Mutex<Vec<DriverCall>>,
    context: Mutex<Option<SurfaceContext>>,
    draw_delay: Mutex<Option<Duration>>,
    /// When `true`, drawing calls fail with [`DriverError::Write`].
    pub should_fail: AtomicBool,
}

impl MockSurfaceDriver {
    pub fn new(surface_id: impl Into<String>, props: RegisterProps) -> Self {
        Self {
            surface_id: surface_id.into(),
            product_name: "Mock Surface".to_string(),
            props,
            native_lock: false,
            calls: Mutex::new(Vec::new()),
            context: Mutex::new(None),
            draw_delay: Mutex::new(None),
            should_fail: AtomicBool::new(false),
        }
    }

    /// Reports lock state to the driver instead of drawing a keypad.
    pub fn with_native_lock(mut self) -> Self {
        self.native_lock = true;
        self
    }

    pub fn with_product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = name.into();
        self
    }

    /// Makes each `draw` take `delay` (cut short by cancellation).
    pub fn set_draw_delay(&self, delay: Duration) {
        *self.draw_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// `(position, text)` for every labelled key drawn.
    pub fn drawn_labels(&self) -> Vec<(GridPos, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DriverCall::Draw(DrawProps {
                    position: Some(pos),
                    text: Some(text),
                    ..
                }) => Some((pos, text)),
                _ => None,
            })
            .collect()
    }

    /// Positions drawn as plain black keys.
    pub fn drawn_blanks(&self) -> Vec<GridPos> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DriverCall::Draw(props) => props
                    .position
                    .filter(|pos| props == DrawProps::blank(*pos)),
                _ => None,
            })
            .collect()
    }

    /// The context handed over by `init_device`, if any.
    pub fn context(&self) -> Option<SurfaceContext> {
        self.context.lock().unwrap().clone()
    }

    /// Simulates a full press (down then up) of the key at `index`.
    pub fn press(&self, index: u32) {
        if let Some(ctx) = self.context() {
            ctx.key_down(index);
            ctx.key_up(index);
        }
    }

    fn record(&self, call: DriverCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_fail(&self) -> Result<(), DriverError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(DriverError::Write("mock failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SurfaceDriver for MockSurfaceDriver {
    fn surface_id(&self) -> &str {
        &self.surface_id
    }

    fn product_name(&self) -> &str {
        &self.product_name
    }

    fn register_props(&self) -> &RegisterProps {
        &self.props
    }

    async fn init_device(&self, context: SurfaceContext) -> Result<(), DriverError> {
        *self.context.lock().unwrap() = Some(context);
        self.record(DriverCall::Init);
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.context.lock().unwrap().take();
        self.record(DriverCall::Close);
        Ok(())
    }

    async fn device_added(&self) -> Result<(), DriverError> {
        self.record(DriverCall::DeviceAdded);
        Ok(())
    }

    async fn set_brightness(&self, percent: u32) -> Result<(), DriverError> {
        self.record(DriverCall::Brightness(percent));
        Ok(())
    }

    async fn blank_device(&self) -> Result<(), DriverError> {
        self.check_fail()?;
        self.record(DriverCall::Blank);
        Ok(())
    }

    async fn draw(&self, cancel: &CancellationToken, props: DrawProps) -> Result<(), DriverError> {
        self.check_fail()?;
        let delay = *self.draw_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        self.record(DriverCall::Draw(props));
        Ok(())
    }

    async fn show_status(
        &self,
        _cancel: &CancellationToken,
        renderer: &dyn CardRenderer,
        host: &str,
        status: &str,
    ) -> Result<(), DriverError> {
        self.check_fail()?;
        if let Some(edge) = self.props.bitmap_size {
            let width = edge * self.props.columns;
            let height = edge * self.props.rows();
            let _card = renderer.render_status(width, height, host, status);
        }
        self.record(DriverCall::Status(host.to_string(), status.to_string()));
        Ok(())
    }

    async fn on_variable_value(&self, name: &str, value: &str) -> Result<(), DriverError> {
        self.record(DriverCall::VariableValue(name.to_string(), value.to_string()));
        Ok(())
    }

    fn handles_lock_natively(&self) -> bool {
        self.native_lock
    }

    async fn on_locked_status(&self, locked: bool, character_count: u32) -> Result<(), DriverError> {
        self.record(DriverCall::LockedStatus(locked, character_count));
        Ok(())
    }
}
