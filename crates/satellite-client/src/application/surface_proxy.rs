//! Per-surface façade: input translation, pincode lock overlay, drawing.
//!
//! Every attached surface gets one [`SurfaceProxy`].  It sits between the
//! device driver and the server connection:
//!
//! ```text
//!   driver input ──► SurfaceContext ──► SurfaceProxy ──► SurfaceLink (server)
//!   server output ──► SurfaceRegistry ──► SurfaceProxy ──► DrawingState ──► driver
//! ```
//!
//! # The lock overlay (for beginners)
//!
//! The server can lock a surface until a pincode is typed.  While locked the
//! proxy draws a numeric keypad from the surface's [`PincodeMap`] and turns
//! presses on those keys into `PINCODE-KEY` digits instead of normal key
//! events.  Key releases and rotations are swallowed so the server never sees
//! half an interaction.  Small surfaces show the keypad over several pages;
//! the next-page key flips between them locally without telling the server.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use satellite_core::protocol::messages::KeyState;
use satellite_core::{ControlKey, GridPos, PincodeAction, PincodeMap, RegisterProps};
use tracing::{debug, warn};

use super::drawing_state::{DrawState, DrawingState};
use super::surface_driver::{CardRenderer, DrawProps, LazyImage, SurfaceDriver};
use super::surface_link::SurfaceLink;

/// Key for draw jobs within one surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DrawKey {
    Position(GridPos),
    Control(String),
    /// The full-surface status card.
    Status,
}

#[derive(Debug, Default)]
struct LockState {
    is_locked: bool,
    page: usize,
    character_count: u32,
    /// Positions painted by the last keypad redraw.
    last_drawn: HashSet<GridPos>,
}

pub struct SurfaceProxy {
    surface_id: String,
    driver: Arc<dyn SurfaceDriver>,
    link: Arc<dyn SurfaceLink>,
    card_renderer: Arc<dyn CardRenderer>,
    drawing: DrawingState<DrawKey>,
    lock: Mutex<LockState>,
}

impl SurfaceProxy {
    pub fn new(
        driver: Arc<dyn SurfaceDriver>,
        link: Arc<dyn SurfaceLink>,
        card_renderer: Arc<dyn CardRenderer>,
    ) -> Arc<Self> {
        Arc::new(Self {
            surface_id: driver.surface_id().to_string(),
            driver,
            link,
            card_renderer,
            drawing: DrawingState::new(DrawState::Blank),
            lock: Mutex::new(LockState::default()),
        })
    }

    /// Callback handle for the driver.
    pub fn context(self: &Arc<Self>) -> SurfaceContext {
        SurfaceContext {
            proxy: Arc::downgrade(self),
        }
    }

    pub fn surface_id(&self) -> &str {
        &self.surface_id
    }

    pub fn driver(&self) -> &Arc<dyn SurfaceDriver> {
        &self.driver
    }

    pub fn register_props(&self) -> &RegisterProps {
        self.driver.register_props()
    }

    pub fn draw_state(&self) -> DrawState {
        self.drawing.state()
    }

    pub fn is_locked(&self) -> bool {
        self.lock_state().is_locked
    }

    /// Resolves once all pending state transitions have completed.
    pub fn settled(&self) -> BoxFuture<'static, ()> {
        self.drawing.settled()
    }

    fn pincode_map(&self) -> Option<&PincodeMap> {
        self.driver.register_props().pincode_map.as_ref()
    }

    fn columns(&self) -> u32 {
        self.driver.register_props().columns
    }

    // ── Input ─────────────────────────────────────────────────────────────────

    pub fn key_down(&self, index: u32) {
        if let Some(pos) = GridPos::from_index(index, self.columns()) {
            self.key_down_xy(pos);
        }
    }

    pub fn key_up(&self, index: u32) {
        if let Some(pos) = GridPos::from_index(index, self.columns()) {
            self.key_up_xy(pos);
        }
    }

    pub fn key_down_xy(&self, pos: GridPos) {
        if self.is_locked() {
            self.pincode_press(pos);
            return;
        }
        self.link.key_down_xy(&self.surface_id, pos);
    }

    pub fn key_up_xy(&self, pos: GridPos) {
        if self.is_locked() {
            return;
        }
        self.link.key_up_xy(&self.surface_id, pos);
    }

    pub fn rotate_left_xy(&self, pos: GridPos) {
        if self.is_locked() {
            return;
        }
        self.link.rotate_left_xy(&self.surface_id, pos);
    }

    pub fn rotate_right_xy(&self, pos: GridPos) {
        if self.is_locked() {
            return;
        }
        self.link.rotate_right_xy(&self.surface_id, pos);
    }

    pub fn send_variable_value(&self, name: &str, value: &str) {
        self.link.send_variable_value(&self.surface_id, name, value);
    }

    fn pincode_press(&self, pos: GridPos) {
        let Some(map) = self.pincode_map() else {
            return;
        };
        let page = self.lock_state().page;
        match map.resolve(page, pos) {
            Some(PincodeAction::Digit(digit)) => self.link.pincode_key(&self.surface_id, digit),
            Some(PincodeAction::NextPage) => {
                {
                    let mut lock = self.lock_state();
                    lock.page = (lock.page + 1) % map.page_count();
                }
                self.draw_keypad(map);
            }
            None => {}
        }
    }

    // ── Server output ─────────────────────────────────────────────────────────

    /// Paints one key from a `KEY-STATE`.  Ignored while the keypad is shown.
    pub fn draw(&self, state: KeyState) {
        if self.is_locked() {
            debug!(surface = %self.surface_id, "ignoring draw while locked");
            return;
        }

        let (key, position, control_id) = match state.key {
            Some(ControlKey::ControlId(id)) => (DrawKey::Control(id.clone()), None, Some(id)),
            Some(key) => match key.to_grid_pos(self.columns()) {
                Some(pos) => (DrawKey::Position(pos), Some(pos), None),
                None => return,
            },
            None => return,
        };

        if self.drawing.state() != DrawState::Draw {
            let _ = self
                .drawing
                .abort_queued(DrawState::Draw, Some(self.blank_step()));
        }

        let bitmap = state.bitmap;
        let props = DrawProps {
            position,
            control_id,
            image: None,
            color: state.color,
            text: state.text,
            text_color: state.text_color,
            font_size: state.font_size,
        };
        let driver = Arc::clone(&self.driver);
        self.drawing.queue_job(key, move |token| async move {
            if token.is_cancelled() {
                return Ok(());
            }
            let image = bitmap.and_then(LazyImage::from_square_rgb);
            driver.draw(&token, DrawProps { image, ..props }).await?;
            Ok(())
        });
    }

    /// `KEYS-CLEAR`: blank the surface unless the keypad is showing.
    pub fn clear_deck(&self) {
        if self.is_locked() {
            return;
        }
        self.blank_device();
    }

    /// Blanks the whole surface.  No-op if already blank.
    pub fn blank_device(&self) {
        if self.drawing.state() == DrawState::Blank {
            return;
        }
        let _ = self
            .drawing
            .abort_queued(DrawState::Blank, Some(self.blank_step()));
    }

    /// Shows a full-surface status card.
    ///
    /// A status card replaces any lock overlay: it is only shown when there is
    /// no live server session to enforce the lock.
    pub fn show_status(&self, status: &str) {
        {
            let mut lock = self.lock_state();
            if lock.is_locked {
                *lock = LockState::default();
            }
        }
        if self.drawing.state() != DrawState::Status {
            let _ = self
                .drawing
                .abort_queued(DrawState::Status, Some(self.blank_step()));
        }

        let driver = Arc::clone(&self.driver);
        let renderer = Arc::clone(&self.card_renderer);
        let host = self.link.host();
        let status = status.to_string();
        self.drawing.queue_job(DrawKey::Status, move |token| async move {
            if token.is_cancelled() {
                return Ok(());
            }
            driver
                .show_status(&token, renderer.as_ref(), &host, &status)
                .await?;
            Ok(())
        });
    }

    pub async fn set_brightness(&self, percent: u32) {
        if let Err(e) = self.driver.set_brightness(percent).await {
            warn!(surface = %self.surface_id, "set brightness failed: {e}");
        }
    }

    pub async fn on_variable_value(&self, name: &str, value: &str) {
        if let Err(e) = self.driver.on_variable_value(name, value).await {
            warn!(surface = %self.surface_id, "variable update failed: {e}");
        }
    }

    /// The server accepted this surface.
    pub async fn device_added(&self) {
        if let Err(e) = self.driver.device_added().await {
            warn!(surface = %self.surface_id, "device_added hook failed: {e}");
        }
    }

    /// `LOCKED-STATE` from the server.
    ///
    /// Entering the lock blanks the surface and draws the first keypad page.
    /// Further updates while locked only redraw the status readout.  Leaving
    /// the lock blanks the surface so the server can repaint it.
    pub async fn on_locked_status(&self, locked: bool, character_count: u32) {
        if self.driver.handles_lock_natively() {
            if let Err(e) = self.driver.on_locked_status(locked, character_count).await {
                warn!(surface = %self.surface_id, "lock update failed: {e}");
            }
            return;
        }
        let Some(map) = self.pincode_map() else {
            debug!(surface = %self.surface_id, "no pincode map; ignoring lock state");
            return;
        };

        let was_locked = {
            let mut lock = self.lock_state();
            let was_locked = lock.is_locked;
            lock.character_count = character_count;
            if locked && !was_locked {
                lock.is_locked = true;
                lock.page = 0;
                lock.last_drawn.clear();
            } else if !locked && was_locked {
                *lock = LockState::default();
            }
            was_locked
        };

        match (was_locked, locked) {
            (false, true) => {
                let _ = self
                    .drawing
                    .abort_queued(DrawState::Locked, Some(self.blank_step()));
                self.draw_keypad(map);
            }
            (true, true) => self.draw_lock_status(map),
            (true, false) => {
                let _ = self
                    .drawing
                    .abort_queued(DrawState::Draw, Some(self.blank_step()));
            }
            (false, false) => {}
        }
    }

    /// Stops drawing, waits for in-flight writes, then closes the driver.
    pub async fn close(&self) {
        self.drawing.abort_queued(DrawState::Closed, None).await;
        if let Err(e) = self.driver.close().await {
            warn!(surface = %self.surface_id, "closing driver failed: {e}");
        }
    }

    // ── Lock overlay drawing ──────────────────────────────────────────────────

    /// Draws the active keypad page and blanks whatever the previous page drew
    /// that this one does not.
    fn draw_keypad(&self, map: &PincodeMap) {
        let (page, stale) = {
            let mut lock = self.lock_state();
            let now: HashSet<GridPos> = map.page_positions(lock.page).into_iter().collect();
            let stale: Vec<GridPos> = lock.last_drawn.difference(&now).copied().collect();
            lock.last_drawn = now;
            (lock.page, stale)
        };

        for (digit, pos) in map.digit_positions(page) {
            self.queue_props(DrawProps::label(pos, digit.to_string()));
        }
        if let Some(pos) = map.next_page_position() {
            self.queue_props(DrawProps::label(pos, "..."));
        }
        for pos in stale {
            self.queue_props(DrawProps::blank(pos));
        }
        self.draw_lock_status(map);
    }

    fn draw_lock_status(&self, map: &PincodeMap) {
        let Some(pos) = map.status_position() else {
            return;
        };
        let count = self.lock_state().character_count as usize;
        let text = if count == 0 {
            "Locked".to_string()
        } else {
            "*".repeat(count)
        };
        self.queue_props(DrawProps::label(pos, text));
    }

    fn queue_props(&self, props: DrawProps) {
        let Some(pos) = props.position else {
            return;
        };
        let driver = Arc::clone(&self.driver);
        self.drawing
            .queue_job(DrawKey::Position(pos), move |token| async move {
                if token.is_cancelled() {
                    return Ok(());
                }
                driver.draw(&token, props).await?;
                Ok(())
            });
    }

    /// The pre-queue step used by every state change.
    fn blank_step(&self) -> BoxFuture<'static, ()> {
        let driver = Arc::clone(&self.driver);
        let surface_id = self.surface_id.clone();
        async move {
            if let Err(e) = driver.blank_device().await {
                warn!(surface = %surface_id, "blanking failed: {e}");
            }
        }
        .boxed()
    }

    fn lock_state(&self) -> MutexGuard<'_, LockState> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Driver callbacks ──────────────────────────────────────────────────────────

/// Handle a driver uses to report input.
///
/// Holds a weak reference so a driver that outlives its surface cannot keep
/// the proxy alive; calls after the surface is gone are dropped.
#[derive(Clone)]
pub struct SurfaceContext {
    proxy: Weak<SurfaceProxy>,
}

impl SurfaceContext {
    fn with<F: FnOnce(&SurfaceProxy)>(&self, f: F) {
        if let Some(proxy) = self.proxy.upgrade() {
            f(&proxy);
        }
    }

    pub fn key_down(&self, index: u32) {
        self.with(|p| p.key_down(index));
    }

    pub fn key_up(&self, index: u32) {
        self.with(|p| p.key_up(index));
    }

    pub fn key_down_xy(&self, x: u32, y: u32) {
        self.with(|p| p.key_down_xy(GridPos::new(x, y)));
    }

    pub fn key_up_xy(&self, x: u32, y: u32) {
        self.with(|p| p.key_up_xy(GridPos::new(x, y)));
    }

    pub fn rotate_left(&self, index: u32) {
        self.with(|p| {
            if let Some(pos) = GridPos::from_index(index, p.columns()) {
                p.rotate_left_xy(pos);
            }
        });
    }

    pub fn rotate_right(&self, index: u32) {
        self.with(|p| {
            if let Some(pos) = GridPos::from_index(index, p.columns()) {
                p.rotate_right_xy(pos);
            }
        });
    }

    pub fn rotate_left_xy(&self, x: u32, y: u32) {
        self.with(|p| p.rotate_left_xy(GridPos::new(x, y)));
    }

    pub fn rotate_right_xy(&self, x: u32, y: u32) {
        self.with(|p| p.rotate_right_xy(GridPos::new(x, y)));
    }

    pub fn send_variable_value(&self, name: &str, value: &str) {
        self.with(|p| p.send_variable_value(name, value));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use mockall::predicate::{always, eq};

    use crate::application::surface_link::MockSurfaceLink;
    use crate::infrastructure::driver::mock::{DriverCall, MockSurfaceDriver};
    use crate::infrastructure::driver::SolidCardRenderer;

    fn pincode_props() -> RegisterProps {
        let mut props = RegisterProps::grid(8, 4);
        props.pincode_map = PincodeMap::single_page_for_grid(8, 4);
        props
    }

    fn multi_page_props() -> RegisterProps {
        let p = |x, y| Some(GridPos::new(x, y));
        let mut props = RegisterProps::grid(3, 2);
        props.pincode_map = Some(PincodeMap::MultiplePage {
            status: None,
            next_page: GridPos::new(2, 1),
            pages: vec![
                [p(0, 0), p(1, 0), p(2, 0), p(0, 1), p(1, 1), None, None, None, None, None],
                [None, None, None, None, None, p(0, 0), p(1, 0), None, None, None],
            ],
        });
        props
    }

    fn proxy_with(
        props: RegisterProps,
        link: MockSurfaceLink,
    ) -> (Arc<SurfaceProxy>, Arc<MockSurfaceDriver>) {
        let driver = Arc::new(MockSurfaceDriver::new("deck", props));
        let proxy = SurfaceProxy::new(
            Arc::clone(&driver) as Arc<dyn SurfaceDriver>,
            Arc::new(link),
            Arc::new(SolidCardRenderer::default()),
        );
        (proxy, driver)
    }

    async fn settle(proxy: &SurfaceProxy) {
        proxy.settled().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    fn key_state(key: &str) -> KeyState {
        KeyState {
            surface_id: "deck".into(),
            key: Some(ControlKey::parse(key)),
            color: Some("#ff0000".into()),
            ..KeyState::default()
        }
    }

    // ── Input ─────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_key_index_translates_to_row_column() {
        // Arrange
        let mut link = MockSurfaceLink::new();
        link.expect_key_down_xy()
            .with(eq("deck"), eq(GridPos::new(1, 2)))
            .times(1)
            .return_const(());
        let (proxy, _driver) = proxy_with(RegisterProps::grid(8, 4), link);

        // Act
        proxy.context().key_down(17);
    }

    #[tokio::test]
    async fn test_locked_press_on_digit_sends_pincode_not_key() {
        // Arrange
        let mut link = MockSurfaceLink::new();
        link.expect_pincode_key()
            .with(eq("deck"), eq(7u8))
            .times(1)
            .return_const(());
        link.expect_key_down_xy().never();
        link.expect_key_up_xy().never();
        let (proxy, _driver) = proxy_with(pincode_props(), link);
        proxy.on_locked_status(true, 0).await;

        // Act: digit 7 sits at column 0, row 2 on the single-page keypad.
        proxy.key_down_xy(GridPos::new(0, 2));
        proxy.key_up_xy(GridPos::new(0, 2));
    }

    #[tokio::test]
    async fn test_locked_press_off_keypad_is_ignored() {
        let mut link = MockSurfaceLink::new();
        link.expect_pincode_key().never();
        link.expect_key_down_xy().never();
        let (proxy, _driver) = proxy_with(pincode_props(), link);
        proxy.on_locked_status(true, 0).await;

        proxy.key_down_xy(GridPos::new(7, 3));
    }

    #[tokio::test]
    async fn test_rotation_suppressed_while_locked() {
        let mut link = MockSurfaceLink::new();
        link.expect_rotate_left_xy().never();
        link.expect_rotate_right_xy()
            .with(eq("deck"), always())
            .times(1)
            .return_const(());
        let (proxy, _driver) = proxy_with(pincode_props(), link);

        proxy.on_locked_status(true, 0).await;
        proxy.rotate_left_xy(GridPos::new(0, 0));
        proxy.on_locked_status(false, 0).await;
        proxy.rotate_right_xy(GridPos::new(0, 0));
    }

    #[tokio::test]
    async fn test_next_page_key_flips_page() {
        // Arrange
        let mut link = MockSurfaceLink::new();
        link.expect_pincode_key()
            .with(eq("deck"), eq(6u8))
            .times(1)
            .return_const(());
        let (proxy, driver) = proxy_with(multi_page_props(), link);
        proxy.on_locked_status(true, 0).await;
        settle(&proxy).await;
        driver.clear_calls();

        // Act
        proxy.key_down_xy(GridPos::new(2, 1));
        settle(&proxy).await;
        proxy.key_down_xy(GridPos::new(1, 0));

        // Assert: page 2 shows 5 and 6, blanks the three keys it no longer uses.
        let labels = driver.drawn_labels();
        assert!(labels.contains(&(GridPos::new(0, 0), "5".to_string())));
        assert!(labels.contains(&(GridPos::new(1, 0), "6".to_string())));
        let blanks = driver.drawn_blanks();
        for pos in [GridPos::new(2, 0), GridPos::new(0, 1), GridPos::new(1, 1)] {
            assert!(blanks.contains(&pos), "expected {pos} blanked");
        }
    }

    // ── Lock transitions ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_entering_lock_blanks_then_draws_keypad() {
        // Arrange
        let (proxy, driver) = proxy_with(pincode_props(), MockSurfaceLink::new());

        // Act
        proxy.on_locked_status(true, 0).await;
        settle(&proxy).await;

        // Assert
        let calls = driver.calls();
        assert_eq!(calls.first(), Some(&DriverCall::Blank));
        let labels = driver.drawn_labels();
        assert_eq!(labels.len(), 11, "ten digits plus the status readout");
        assert!(labels.contains(&(GridPos::new(3, 0), "Locked".to_string())));
        assert_eq!(proxy.draw_state(), DrawState::Locked);
    }

    #[tokio::test]
    async fn test_lock_update_only_redraws_status() {
        // Arrange
        let (proxy, driver) = proxy_with(pincode_props(), MockSurfaceLink::new());
        proxy.on_locked_status(true, 0).await;
        settle(&proxy).await;
        driver.clear_calls();

        // Act
        proxy.on_locked_status(true, 3).await;
        settle(&proxy).await;

        // Assert
        assert_eq!(
            driver.calls(),
            vec![DriverCall::Draw(DrawProps::label(GridPos::new(3, 0), "***"))]
        );
    }

    #[tokio::test]
    async fn test_draw_ignored_while_locked() {
        let (proxy, driver) = proxy_with(pincode_props(), MockSurfaceLink::new());
        proxy.on_locked_status(true, 0).await;
        settle(&proxy).await;
        driver.clear_calls();

        proxy.draw(key_state("0/5"));
        settle(&proxy).await;

        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unlock_blanks_and_returns_to_draw() {
        let (proxy, driver) = proxy_with(pincode_props(), MockSurfaceLink::new());
        proxy.on_locked_status(true, 2).await;
        settle(&proxy).await;
        driver.clear_calls();

        proxy.on_locked_status(false, 0).await;
        settle(&proxy).await;

        assert!(!proxy.is_locked());
        assert_eq!(proxy.draw_state(), DrawState::Draw);
        assert_eq!(driver.calls(), vec![DriverCall::Blank]);
    }

    #[tokio::test]
    async fn test_native_lock_driver_receives_lock_state() {
        let driver = Arc::new(MockSurfaceDriver::new("deck", pincode_props()).with_native_lock());
        let proxy = SurfaceProxy::new(
            Arc::clone(&driver) as Arc<dyn SurfaceDriver>,
            Arc::new(MockSurfaceLink::new()),
            Arc::new(SolidCardRenderer::default()),
        );

        proxy.on_locked_status(true, 4).await;

        assert_eq!(driver.calls(), vec![DriverCall::LockedStatus(true, 4)]);
        assert!(!proxy.is_locked());
    }

    // ── Draw pipeline ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_first_draw_blanks_before_painting() {
        // Arrange
        let (proxy, driver) = proxy_with(RegisterProps::grid(8, 4), MockSurfaceLink::new());

        // Act
        proxy.draw(key_state("1/2"));
        proxy.draw(key_state("1/3"));
        settle(&proxy).await;

        // Assert
        let calls = driver.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], DriverCall::Blank);
        assert_eq!(proxy.draw_state(), DrawState::Draw);
    }

    #[tokio::test]
    async fn test_draw_resolves_index_key_with_columns() {
        let (proxy, driver) = proxy_with(RegisterProps::grid(4, 2), MockSurfaceLink::new());

        proxy.draw(key_state("6"));
        settle(&proxy).await;

        let positions: Vec<_> = driver
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::Draw(props) => props.position,
                _ => None,
            })
            .collect();
        assert_eq!(positions, vec![GridPos::new(2, 1)]);
    }

    #[tokio::test]
    async fn test_blank_device_short_circuits() {
        let (proxy, driver) = proxy_with(RegisterProps::grid(8, 4), MockSurfaceLink::new());

        // The proxy starts blank, so nothing happens.
        proxy.blank_device();
        settle(&proxy).await;
        assert!(driver.calls().is_empty());

        proxy.draw(key_state("0/0"));
        proxy.blank_device();
        proxy.blank_device();
        settle(&proxy).await;
        let blanks = driver
            .calls()
            .into_iter()
            .filter(|c| *c == DriverCall::Blank)
            .count();
        assert_eq!(blanks, 2, "one for entering draw, one for entering blank");
    }

    #[tokio::test]
    async fn test_show_status_transitions_once() {
        // Arrange
        let mut link = MockSurfaceLink::new();
        link.expect_host().return_const("10.0.0.5:16622".to_string());
        let (proxy, driver) = proxy_with(RegisterProps::grid(8, 4), link);

        // Act
        proxy.show_status("Connecting.");
        settle(&proxy).await;
        proxy.show_status("Connecting..");
        settle(&proxy).await;

        // Assert
        assert_eq!(
            driver.calls(),
            vec![
                DriverCall::Blank,
                DriverCall::Status("10.0.0.5:16622".into(), "Connecting.".into()),
                DriverCall::Status("10.0.0.5:16622".into(), "Connecting..".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_close_waits_for_in_flight_draw() {
        let (proxy, driver) = proxy_with(RegisterProps::grid(8, 4), MockSurfaceLink::new());
        driver.set_draw_delay(Duration::from_millis(50));

        proxy.draw(key_state("0/1"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        proxy.close().await;

        let calls = driver.calls();
        assert_eq!(calls.last(), Some(&DriverCall::Close));
        assert_eq!(proxy.draw_state(), DrawState::Closed);
    }

    #[tokio::test]
    async fn test_context_after_drop_is_noop() {
        let (proxy, _driver) = proxy_with(RegisterProps::grid(8, 4), MockSurfaceLink::new());
        let ctx = proxy.context();
        drop(proxy);

        // MockSurfaceLink has no expectations: any call would panic.
        ctx.key_down(0);
    }
}
